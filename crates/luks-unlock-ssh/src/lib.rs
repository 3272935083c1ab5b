#![forbid(unsafe_code)]

//! SSH integration for luks-unlock.
//!
//! Integrates with remote hosts via:
//! - `connect`: transport, host key policy, public-key authentication
//! - `session`: PTY shell supervision with the prompt watcher attached
//! - `unlocker`: the `HostUnlocker` used by the dispatcher, with deadlines

mod connect;
mod session;
mod unlocker;

pub use connect::{connect, ClientHandler};
pub use session::{unlock_session, SessionReport, Termination};
pub use unlocker::SshUnlocker;
