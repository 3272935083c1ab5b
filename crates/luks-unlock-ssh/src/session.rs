//! Interactive shell supervision with the prompt watcher attached.
//!
//! The channel's stdout is copied into an in-memory pipe read by a spawned
//! `PromptWatcher`, which answers prompts through the channel's writer. The
//! supervising loop owns the channel and returns once the remote side closes
//! it; dropping the pipe then ends the watcher.

use log::{debug, warn};
use luks_unlock_core::{Host, OutputHistory, PromptWatcher, UnlockError, UnlockResult, WatchReport};
use russh::client::{Handle, Handler, Msg};
use russh::{Channel, ChannelMsg, Pty};
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

pub const TERM: &str = "xterm";
const COLUMNS: u32 = 80;
const ROWS: u32 = 40;
const LINE_SPEED: u32 = 14_400;
const PIPE_CAPACITY: usize = 16 * 1024;
const TERMINAL_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 0),
    (Pty::TTY_OP_ISPEED, LINE_SPEED),
    (Pty::TTY_OP_OSPEED, LINE_SPEED),
];

/// How the remote shell ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Exited(u32),
    Signalled(String),
    /// Channel closed or connection lost without an exit status.
    Dropped,
}

impl Termination {
    /// Anything but a zero exit status is reported as an error.
    pub fn into_error(self) -> Option<UnlockError> {
        match self {
            Termination::Exited(0) => None,
            Termination::Exited(status) => Some(UnlockError::ShellExited(status)),
            Termination::Signalled(signal) => Some(UnlockError::ShellSignalled(signal)),
            Termination::Dropped => Some(UnlockError::SessionDropped),
        }
    }
}

#[derive(Debug)]
pub struct SessionReport {
    pub prompts_answered: usize,
    pub termination: Termination,
    pub history: OutputHistory,
}

/// Open a PTY shell on `handle` and answer unlock prompts until it ends.
///
/// The channel is closed on every path; the connection itself belongs to
/// the caller.
pub async fn unlock_session<H: Handler>(
    handle: &Handle<H>,
    host: &Host,
    history_limit: usize,
) -> UnlockResult<SessionReport> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|source| UnlockError::Session {
            stage: "open session",
            source,
        })?;

    let result = run_shell(&mut channel, host, history_limit).await;
    if let Err(err) = channel.close().await {
        debug!("{}: channel close failed: {err}", host.name);
    }
    result
}

async fn run_shell(
    channel: &mut Channel<Msg>,
    host: &Host,
    history_limit: usize,
) -> UnlockResult<SessionReport> {
    channel
        .request_pty(false, TERM, COLUMNS, ROWS, 0, 0, TERMINAL_MODES)
        .await
        .map_err(|source| UnlockError::Session {
            stage: "request pty",
            source,
        })?;
    let input = channel.make_writer();
    channel
        .request_shell(true)
        .await
        .map_err(|source| UnlockError::Session {
            stage: "start shell",
            source,
        })?;

    let (output, watcher_output) = duplex(PIPE_CAPACITY);
    let watcher = PromptWatcher::new(host.pass.clone(), history_limit);
    let watch = tokio::spawn(watcher.watch(watcher_output, input));

    let termination = supervise(channel, &host.name, output).await?;

    let report = watch.await.unwrap_or_else(|err| {
        warn!("{}: prompt watcher failed: {err}", host.name);
        WatchReport {
            prompts_answered: 0,
            history: OutputHistory::new(history_limit),
        }
    });

    Ok(SessionReport {
        prompts_answered: report.prompts_answered,
        termination,
        history: report.history,
    })
}

/// Pump channel events until the remote side closes the channel.
async fn supervise(
    channel: &mut Channel<Msg>,
    host: &str,
    output: DuplexStream,
) -> UnlockResult<Termination> {
    let mut output = Some(output);
    let mut shell_started = false;
    let mut termination = Termination::Dropped;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Success => shell_started = true,
            ChannelMsg::Failure if !shell_started => {
                return Err(UnlockError::ShellRejected(host.to_string()));
            }
            ChannelMsg::Data { data } => {
                if let Some(pipe) = output.as_mut() {
                    if pipe.write_all(&data).await.is_err() {
                        // watcher is gone; keep draining the channel
                        output = None;
                    }
                }
            }
            ChannelMsg::Eof => output = None,
            ChannelMsg::ExitStatus { exit_status } => {
                termination = Termination::Exited(exit_status);
            }
            ChannelMsg::ExitSignal { signal_name, .. } => {
                termination = Termination::Signalled(format!("{signal_name:?}"));
            }
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    Ok(termination)
}
