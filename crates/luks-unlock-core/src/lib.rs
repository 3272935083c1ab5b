//! Core building blocks shared by the luks-unlock binaries.
//!
//! Configuration, credentials, prompt watching, and host dispatch live here so the
//! SSH integration crate only has to supply the transport.

pub mod backoff;
pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod prompt;

pub use config::{DispatchCfg, Host, RetryCfg, SessionCfg, UnlockConfig, DEFAULT_CONFIG_PATH};
pub use credential::Credentials;
pub use dispatch::{AttemptReport, Dispatcher, HostUnlocker};
pub use error::{AttemptStage, UnlockError, UnlockResult};
pub use prompt::{OutputHistory, PromptWatcher, WatchReport};
