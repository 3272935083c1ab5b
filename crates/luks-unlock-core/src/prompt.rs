//! Disk-unlock prompt detection over a remote shell's output stream.
//!
//! The watcher reassembles output into lines, tests the line in progress after
//! every byte, and answers a matching prompt by writing the host passphrase
//! into the shell's input. Lines are matched before their newline arrives
//! because the remote side waits for the answer on the same line.

use log::debug;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zeroize::Zeroizing;

pub const PROMPT_PREFIX: &[u8] = b"Please unlock disk ";
pub const PROMPT_SUFFIX: &[u8] = b": ";

/// Longest line kept for matching; longer lines are ignored until the next newline.
const LINE_LIMIT: usize = 4 * 1024;
const READ_CHUNK: usize = 1024;

/// True when `line` is a complete disk-unlock prompt.
pub fn is_unlock_prompt(line: &[u8]) -> bool {
    line.starts_with(PROMPT_PREFIX) && line.ends_with(PROMPT_SUFFIX)
}

/// Bounded transcript of everything the remote shell printed.
///
/// Once `limit` bytes are held the oldest bytes are discarded.
#[derive(Debug, Clone)]
pub struct OutputHistory {
    bytes: VecDeque<u8>,
    limit: usize,
    dropped: u64,
}

impl OutputHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(limit.min(READ_CHUNK * 4)),
            limit: limit.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, byte: u8) {
        if self.bytes.len() == self.limit {
            self.bytes.pop_front();
            self.dropped += 1;
        }
        self.bytes.push_back(byte);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes discarded to stay within the limit.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }

    /// Last `count` lines, lossily decoded, without trailing carriage returns.
    pub fn tail_lines(&self, count: usize) -> Vec<String> {
        let text = String::from_utf8_lossy(&self.to_vec()).into_owned();
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(count);
        lines[start..]
            .iter()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect()
    }
}

/// The line currently being printed by the remote shell.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
    answered: bool,
    overflowed: bool,
}

impl LineBuffer {
    /// Feed one byte; returns true the first time the line becomes a prompt.
    fn push(&mut self, byte: u8) -> bool {
        if byte == b'\n' {
            self.bytes.clear();
            self.answered = false;
            self.overflowed = false;
            return false;
        }

        if self.overflowed {
            return false;
        }
        if self.bytes.len() == LINE_LIMIT {
            self.overflowed = true;
            self.bytes.clear();
            return false;
        }

        self.bytes.push(byte);
        if !self.answered && is_unlock_prompt(&self.bytes) {
            self.answered = true;
            return true;
        }
        false
    }
}

/// What the watcher observed before its stream ended.
#[derive(Debug, Clone)]
pub struct WatchReport {
    pub prompts_answered: usize,
    pub history: OutputHistory,
}

/// Answers disk-unlock prompts with a single host's passphrase.
pub struct PromptWatcher {
    passphrase: Zeroizing<String>,
    history_limit: usize,
}

impl PromptWatcher {
    pub fn new(passphrase: Zeroizing<String>, history_limit: usize) -> Self {
        Self {
            passphrase,
            history_limit,
        }
    }

    /// Watch `output` until it ends, answering prompts on `input`.
    ///
    /// Read and write failures end the watch quietly; the report still carries
    /// whatever was observed up to that point.
    pub async fn watch<R, W>(self, mut output: R, mut input: W) -> WatchReport
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut history = OutputHistory::new(self.history_limit);
        let mut line = LineBuffer::default();
        let mut prompts_answered = 0;
        let mut chunk = [0u8; READ_CHUNK];

        'read: loop {
            let read = match output.read(&mut chunk).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) => {
                    debug!("session output read failed: {err}");
                    break;
                }
            };

            for &byte in &chunk[..read] {
                history.push(byte);
                if !line.push(byte) {
                    continue;
                }

                if let Err(err) = self.answer(&mut input).await {
                    debug!("writing passphrase to session failed: {err}");
                    break 'read;
                }
                prompts_answered += 1;
            }
        }

        WatchReport {
            prompts_answered,
            history,
        }
    }

    async fn answer<W>(&self, input: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut reply = Zeroizing::new(Vec::with_capacity(self.passphrase.len() + 1));
        reply.extend_from_slice(self.passphrase.as_bytes());
        reply.push(b'\n');
        input.write_all(&reply).await?;
        input.flush().await
    }
}
