//! `HostUnlocker` backed by a real SSH connection.

use crate::connect::connect;
use crate::session::unlock_session;
use log::{debug, info, log_enabled, Level};
use luks_unlock_core::{
    AttemptReport, AttemptStage, Credentials, Host, HostUnlocker, SessionCfg, UnlockError,
    UnlockResult,
};
use russh::Disconnect;
use std::sync::Arc;
use tokio::time::{timeout, Instant};

/// Transcript lines logged at debug level after each session.
const TRANSCRIPT_TAIL: usize = 20;

/// Dials hosts with the shared credential and answers their unlock prompts.
#[derive(Debug, Clone)]
pub struct SshUnlocker {
    credentials: Arc<Credentials>,
    session: SessionCfg,
}

impl SshUnlocker {
    pub fn new(credentials: Arc<Credentials>, session: SessionCfg) -> Self {
        Self {
            credentials,
            session,
        }
    }
}

impl HostUnlocker for SshUnlocker {
    async fn unlock(&self, host: &Host) -> UnlockResult<AttemptReport> {
        let started = Instant::now();
        let connect_timeout = self.session.connect_timeout();
        let handle = timeout(connect_timeout, connect(host, &self.credentials))
            .await
            .map_err(|_| UnlockError::Timeout {
                stage: AttemptStage::Connect,
                after: connect_timeout,
            })??;
        info!("dial: {}", host.name);

        let attempt_timeout = self.session.attempt_timeout();
        let remaining = attempt_timeout.saturating_sub(started.elapsed());
        let outcome = timeout(
            remaining,
            unlock_session(&handle, host, self.session.history_bytes),
        )
        .await;

        if let Err(err) = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("{}: disconnect failed: {err}", host.name);
        }

        let report = outcome.map_err(|_| UnlockError::Timeout {
            stage: AttemptStage::Session,
            after: attempt_timeout,
        })??;

        if log_enabled!(Level::Debug) {
            if report.history.dropped() > 0 {
                debug!(
                    "{}: transcript truncated, {} early bytes dropped",
                    host.name,
                    report.history.dropped()
                );
            }
            for line in report.history.tail_lines(TRANSCRIPT_TAIL) {
                debug!("{} | {line}", host.name);
            }
        }

        Ok(AttemptReport {
            prompts_answered: report.prompts_answered,
            termination: report.termination.into_error(),
        })
    }
}
