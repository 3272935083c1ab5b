//! Signing credential shared read-only by every unlock attempt.

use crate::config::UnlockConfig;
use crate::error::{UnlockError, UnlockResult};
use russh::keys::ssh_key::HashAlg;
use russh::keys::{decode_secret_key, PrivateKey};
use std::fmt;
use std::sync::Arc;

/// Username plus decoded private key used for public-key authentication.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    key: Arc<PrivateKey>,
}

impl Credentials {
    /// Decode the key material embedded in `config`.
    ///
    /// # Errors
    /// Returns `UnlockError::Key` when the PEM block is malformed or the
    /// passphrase does not decrypt it.
    pub fn from_config(config: &UnlockConfig) -> UnlockResult<Self> {
        Self::decode(
            &config.username,
            &config.private_key,
            config.private_key_pass.as_ref().map(|pass| pass.as_str()),
        )
    }

    pub fn decode(username: &str, pem: &str, passphrase: Option<&str>) -> UnlockResult<Self> {
        let key = decode_secret_key(pem.trim(), passphrase).map_err(UnlockError::Key)?;
        Ok(Self {
            username: username.to_string(),
            key: Arc::new(key),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn key(&self) -> Arc<PrivateKey> {
        Arc::clone(&self.key)
    }

    /// SHA-256 fingerprint of the public half, for log lines.
    pub fn fingerprint(&self) -> String {
        self.key.public_key().fingerprint(HashAlg::Sha256).to_string()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("algorithm", &self.key.algorithm().as_str())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}
