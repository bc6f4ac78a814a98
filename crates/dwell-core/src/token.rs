//! Upload credential and its validity rules.
//!
//! The credential is a JWT-style bearer token. Only its `exp` claim is read;
//! signatures are the collector's concern. A token whose expiry cannot be
//! decoded is invalid, never an error.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{StateStore, StoreError, load_json, save_json};

/// Storage key for the credential.
pub const CREDENTIAL_KEY: &str = "credential";

/// Bearer token with an embedded expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    token: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at())
            .finish()
    }
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// The raw bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Decodes the `exp` claim. `None` if the token is malformed.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        decode_expiry(&self.token)
    }

    /// A credential is usable strictly before its expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| now < expiry)
    }
}

fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    #[derive(Deserialize)]
    struct Claims {
        exp: f64,
    }

    let mut parts = token.split('.');
    let (_header, payload) = (parts.next()?, parts.next()?);
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    if !claims.exp.is_finite() {
        return None;
    }
    let millis = (claims.exp * 1000.0) as i64;
    DateTime::from_timestamp_millis(millis)
}

/// Holds the current credential, persisted under [`CREDENTIAL_KEY`].
///
/// There is no refresh: an expired credential is only replaced by an
/// explicit [`TokenStore::set`].
#[derive(Debug)]
pub struct TokenStore<S> {
    store: S,
    credential: Option<Credential>,
}

impl<S: StateStore> TokenStore<S> {
    /// Loads the stored credential. A corrupt entry is treated as absent.
    pub fn load(store: S) -> Result<Self, StoreError> {
        let credential = match load_json::<Credential, _>(&store, CREDENTIAL_KEY) {
            Ok(credential) => credential,
            Err(err @ StoreError::Corrupt { .. }) => {
                tracing::warn!(error = %err, "ignoring unreadable stored credential");
                None
            }
            Err(err) => return Err(err),
        };
        tracing::debug!(has_credential = credential.is_some(), "credential loaded");
        Ok(Self { store, credential })
    }

    /// Replaces the current credential.
    pub fn set(&mut self, credential: Credential) {
        if let Err(err) = save_json(&self.store, CREDENTIAL_KEY, &credential) {
            tracing::warn!(error = %err, "failed to persist credential");
        }
        self.credential = Some(credential);
        tracing::info!("credential set");
    }

    /// Forgets the current credential.
    pub fn clear(&mut self) {
        if let Err(err) = self.store.remove(CREDENTIAL_KEY) {
            tracing::warn!(error = %err, "failed to remove persisted credential");
        }
        self.credential = None;
        tracing::info!("credential cleared");
    }

    /// The stored credential, valid or not.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Whether a credential is present and unexpired at `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.credential
            .as_ref()
            .is_some_and(|credential| credential.is_valid_at(now))
    }

    /// Returns the credential if it can be used at `now`.
    ///
    /// A stored credential that is expired or malformed is cleared as a side
    /// effect so it is not tried again.
    pub fn usable(&mut self, now: DateTime<Utc>) -> Option<Credential> {
        let credential = self.credential.as_ref()?;
        if credential.is_valid_at(now) {
            return Some(credential.clone());
        }
        tracing::warn!("stored credential expired or malformed, clearing");
        self.clear();
        None
    }
}
