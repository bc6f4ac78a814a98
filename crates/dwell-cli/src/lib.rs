//! Browser dwell-time tracker CLI library.
//!
//! Hosts the event dispatcher, its event sources and the `dwell` subcommands.

mod cli;
pub mod commands;
mod config;
pub mod dispatcher;
pub mod source;
pub mod state;

pub use cli::{Cli, Commands, GroupBy, TokenAction};
pub use config::Config;
