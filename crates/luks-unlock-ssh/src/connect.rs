//! Transport setup and public-key authentication for one host.

use log::warn;
use luks_unlock_core::{Credentials, Host, UnlockError, UnlockResult};
use russh::client::{self, Handle};
use russh::keys::ssh_key::{HashAlg, PublicKey};
use russh::keys::PrivateKeyWithHashAlg;
use russh::Disconnect;
use std::sync::Arc;
use std::time::Duration;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const KEEPALIVE_MAX: usize = 4;

/// Client-side callbacks for one connection.
///
/// Hosts with a pinned fingerprint must present exactly that key. Hosts
/// without one are trusted on sight, which is logged on every dial.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    host: String,
    pinned: Option<String>,
}

impl ClientHandler {
    pub fn for_host(host: &Host) -> Self {
        Self {
            host: host.name.clone(),
            pinned: host
                .fingerprint
                .as_deref()
                .map(str::trim)
                .filter(|fp| !fp.is_empty())
                .map(str::to_string),
        }
    }

    fn verify(&self, server_key: &PublicKey) -> UnlockResult<bool> {
        let actual = server_key.fingerprint(HashAlg::Sha256).to_string();
        match &self.pinned {
            Some(expected) if *expected == actual => Ok(true),
            Some(expected) => Err(UnlockError::HostKeyMismatch {
                host: self.host.clone(),
                expected: expected.clone(),
                actual,
            }),
            None => {
                warn!(
                    "{}: accepting unverified host key {actual}; pin it with `fingerprint`",
                    self.host
                );
                Ok(true)
            }
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = UnlockError;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        self.verify(server_public_key)
    }
}

/// Dial `host` and authenticate with the shared credential.
///
/// # Errors
/// `Connect` for transport failures, `HostKeyMismatch` for a pinned key that
/// does not match, `AuthRejected` when the server refuses the key.
pub async fn connect(host: &Host, credentials: &Credentials) -> UnlockResult<Handle<ClientHandler>> {
    let endpoint = host.endpoint();
    let config = Arc::new(client::Config {
        keepalive_interval: Some(KEEPALIVE_INTERVAL),
        keepalive_max: KEEPALIVE_MAX,
        ..Default::default()
    });

    let mut handle = client::connect(
        config,
        (host.addr.as_str(), host.port),
        ClientHandler::for_host(host),
    )
    .await
    .map_err(|err| match err {
        UnlockError::Ssh(source) => dial_error(&endpoint, source),
        other => other,
    })?;

    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .map_err(|source| dial_error(&endpoint, source))?
        .flatten();
    let auth = handle
        .authenticate_publickey(
            credentials.username(),
            PrivateKeyWithHashAlg::new(credentials.key(), hash_alg),
        )
        .await
        .map_err(|source| dial_error(&endpoint, source))?;

    if !auth.success() {
        let _ = handle
            .disconnect(Disconnect::ByApplication, "authentication rejected", "en")
            .await;
        return Err(UnlockError::AuthRejected {
            host: host.name.clone(),
            user: credentials.username().to_string(),
        });
    }

    Ok(handle)
}

fn dial_error(endpoint: &str, source: russh::Error) -> UnlockError {
    UnlockError::Connect {
        addr: endpoint.to_string(),
        source,
    }
}
