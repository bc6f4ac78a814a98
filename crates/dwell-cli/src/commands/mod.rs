//! CLI subcommand implementations.

pub mod flush;
pub mod report;
pub mod status;
pub mod token;
pub mod track;
