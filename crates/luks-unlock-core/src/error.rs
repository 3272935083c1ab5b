//! Error type shared across the luks-unlock crates.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type UnlockResult<T> = Result<T, UnlockError>;

/// Which part of an attempt ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    Connect,
    Session,
}

impl fmt::Display for AttemptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStage::Connect => f.write_str("connect"),
            AttemptStage::Session => f.write_str("session"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UnlockError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("private key error: {0}")]
    Key(#[source] russh::keys::Error),

    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("dial {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: russh::Error,
    },

    #[error("{host} rejected public key authentication for user {user}")]
    AuthRejected { host: String, user: String },

    #[error("host key for {host} is {actual}, expected pinned {expected}")]
    HostKeyMismatch {
        host: String,
        expected: String,
        actual: String,
    },

    #[error("{stage} failed: {source}")]
    Session {
        stage: &'static str,
        #[source]
        source: russh::Error,
    },

    #[error("{0} refused to start a shell")]
    ShellRejected(String),

    #[error("remote shell exited with status {0}")]
    ShellExited(u32),

    #[error("remote shell terminated by signal {0}")]
    ShellSignalled(String),

    #[error("remote side closed the session without an exit status")]
    SessionDropped,

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: AttemptStage, after: Duration },

    #[error("concurrency gate closed")]
    GateClosed,
}

impl UnlockError {
    /// True when the attempt never got an authenticated connection.
    ///
    /// Such failures feed per-host backoff; everything else counts as a
    /// reached host and is followed by the post-session cooldown.
    pub fn is_pre_connection(&self) -> bool {
        matches!(
            self,
            UnlockError::Connect { .. }
                | UnlockError::AuthRejected { .. }
                | UnlockError::HostKeyMismatch { .. }
                | UnlockError::Timeout {
                    stage: AttemptStage::Connect,
                    ..
                }
        )
    }
}
