//! Response correlation over an unframed text stream.
//!
//! The correlator turns a socket that emits arbitrary chunks into a
//! request/response API. Each [`Correlator::send`] writes one command line
//! and waits for inbound data matching a [`ResponsePattern`], or for its own
//! timeout, whichever comes first.
//!
//! A single driver task owns the socket, the pending set and every timer:
//!
//! ```text
//! ┌──────────────┐  command   ┌──────────────┐   line    ┌──────────┐
//! │  Correlator  │───────────▶│    Driver    │──────────▶│  socket  │
//! │   (handle)   │◀───────────│ pending+timer│◀──────────│          │
//! └──────────────┘   settle   └──────────────┘   chunk   └──────────┘
//! ```
//!
//! Every inbound chunk is tested against all pending matchers in the order
//! they were registered. Each one that matches is settled and removed; the
//! rest stay pending.

use bytes::BytesMut;
use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, trace, warn};

use crate::error::ClientError;
use crate::matcher::{MatchMode, MatchResult, ResponsePattern};

/// Default time to wait for a response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Longest timeout a response waits for. Longer timeouts are clamped to it.
///
/// The timer wheel behind the correlator cannot hold deadlines much beyond
/// two years.
pub const MAX_RESPONSE_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default cap on buffered inbound text (64 KiB).
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 64 * 1024;

const READ_CHUNK_SIZE: usize = 4096;

/// Correlator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelatorConfig {
    /// How inbound data is presented to matchers.
    pub mode: MatchMode,
    /// Buffer cap for [`MatchMode::Buffered`]. Oldest text is dropped first.
    pub max_buffer_bytes: usize,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            mode: MatchMode::PerChunk,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

type Reply = oneshot::Sender<Result<MatchResult, ClientError>>;

enum Command {
    Send {
        line: String,
        pattern: ResponsePattern,
        timeout: Duration,
        reply: Reply,
    },
    Close,
    #[cfg(test)]
    Counts {
        reply: oneshot::Sender<(usize, usize)>,
    },
}

/// Handle to a correlated socket.
///
/// Cloning the handle shares the same socket and pending set.
#[derive(Debug, Clone)]
pub struct Correlator {
    commands: mpsc::UnboundedSender<Command>,
}

impl Correlator {
    /// Take ownership of `stream` and start the driver task.
    pub fn spawn<S>(stream: S, config: CorrelatorConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let (reader, writer) = tokio::io::split(stream);

        let driver = Driver {
            reader,
            writer,
            commands: rx,
            pending: BTreeMap::new(),
            timers: DelayQueue::new(),
            next_seq: 0,
            config,
            buffer: String::new(),
        };
        tokio::spawn(driver.run());

        Self { commands }
    }

    /// Check if the socket is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Write `command` followed by a newline and wait for a response
    /// matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] at once if the socket is closed,
    /// or later if it closes while waiting; [`ClientError::Timeout`] if
    /// nothing matched within `timeout` (at most [`MAX_RESPONSE_TIMEOUT`]);
    /// [`ClientError::Transport`] if the write failed.
    pub async fn send(
        &self,
        command: &str,
        pattern: impl Into<ResponsePattern>,
        timeout: Duration,
    ) -> Result<MatchResult, ClientError> {
        if !self.is_open() {
            return Err(ClientError::NotConnected);
        }

        let (reply, settled) = oneshot::channel();
        self.commands
            .send(Command::Send {
                line: format!("{command}\n"),
                pattern: pattern.into(),
                timeout,
                reply,
            })
            .map_err(|_| ClientError::NotConnected)?;

        settled.await.unwrap_or(Err(ClientError::NotConnected))
    }

    /// Close the socket. Pending responses fail with
    /// [`ClientError::NotConnected`].
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Number of pending responses and armed timers in the driver.
    #[cfg(test)]
    async fn counts(&self) -> Option<(usize, usize)> {
        let (reply, counts) = oneshot::channel();
        self.commands.send(Command::Counts { reply }).ok()?;
        counts.await.ok()
    }
}

struct Pending {
    pattern: ResponsePattern,
    reply: Reply,
    timer: delay_queue::Key,
}

struct Driver<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Pending responses by sequence number, so iteration follows
    /// registration order.
    pending: BTreeMap<u64, Pending>,
    timers: DelayQueue<u64>,
    next_seq: u64,
    config: CorrelatorConfig,
    /// Unconsumed text, used in buffered mode only.
    buffer: String,
}

impl<S> Driver<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn run(mut self) {
        let mut read_buf = BytesMut::with_capacity(READ_CHUNK_SIZE);

        loop {
            // Readable data is handled before expired timers, so a chunk that
            // has already arrived wins a tie with its deadline.
            tokio::select! {
                biased;

                read = self.reader.read_buf(&mut read_buf) => match read {
                    Ok(0) => {
                        debug!("Socket closed by peer");
                        break;
                    }
                    Ok(n) => {
                        let chunk = read_buf.split();
                        trace!(bytes = n, "Received chunk");
                        self.on_chunk(&String::from_utf8_lossy(&chunk));
                        read_buf.reserve(READ_CHUNK_SIZE);
                    }
                    Err(e) => {
                        warn!(error = %e, "Socket read failed");
                        break;
                    }
                },

                command = self.commands.recv() => match command {
                    Some(Command::Send { line, pattern, timeout, reply }) => {
                        if !self.on_send(line, pattern, timeout, reply).await {
                            break;
                        }
                    }
                    Some(Command::Close) | None => {
                        debug!("Closing socket");
                        break;
                    }
                    #[cfg(test)]
                    Some(Command::Counts { reply }) => {
                        let _ = reply.send((self.pending.len(), self.timers.len()));
                    }
                },

                Some(expired) = self.timers.next(), if !self.timers.is_empty() => {
                    let seq = expired.into_inner();
                    if let Some(pending) = self.pending.remove(&seq) {
                        debug!(seq, pattern = %pending.pattern, "Response timed out");
                        let _ = pending.reply.send(Err(ClientError::Timeout));
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Write the command and register its pending response.
    ///
    /// Returns `false` if the socket can no longer be written.
    async fn on_send(
        &mut self,
        line: String,
        pattern: ResponsePattern,
        timeout: Duration,
        reply: Reply,
    ) -> bool {
        if let Err(e) = self.writer.write_all(line.as_bytes()).await {
            warn!(error = %e, "Socket write failed");
            let _ = reply.send(Err(ClientError::Transport(e.into())));
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let timer = self.timers.insert(seq, timeout.min(MAX_RESPONSE_TIMEOUT));
        trace!(seq, %pattern, command = line.trim_end(), "Awaiting response");
        self.pending.insert(
            seq,
            Pending {
                pattern,
                reply,
                timer,
            },
        );
        true
    }

    fn on_chunk(&mut self, chunk: &str) {
        match self.config.mode {
            MatchMode::PerChunk => {
                self.settle_matches(chunk);
            }
            MatchMode::Buffered => {
                self.buffer.push_str(chunk);
                self.trim_buffer();

                let buffer = std::mem::take(&mut self.buffer);
                let consumed = self.settle_matches(&buffer);
                self.buffer = buffer[consumed..].to_string();
            }
        }
    }

    /// Settle every pending response whose pattern matches `text`.
    ///
    /// Returns the byte offset just past the furthest match, or 0.
    fn settle_matches(&mut self, text: &str) -> usize {
        let matched: Vec<(u64, MatchResult)> = self
            .pending
            .iter()
            .filter_map(|(seq, pending)| pending.pattern.find(text).map(|m| (*seq, m)))
            .collect();

        let mut furthest = 0;
        for (seq, result) in matched {
            if let Some(pending) = self.pending.remove(&seq) {
                self.timers.remove(&pending.timer);
                furthest = furthest.max(result.end());
                trace!(seq, "Response matched");
                let _ = pending.reply.send(Ok(result));
            }
        }
        furthest
    }

    /// Drop the oldest buffered text beyond the configured cap.
    fn trim_buffer(&mut self) {
        let cap = self.config.max_buffer_bytes;
        if self.buffer.len() <= cap {
            return;
        }

        let mut cut = self.buffer.len() - cap;
        while !self.buffer.is_char_boundary(cut) {
            cut += 1;
        }
        self.buffer.drain(..cut);
    }

    async fn shutdown(mut self) {
        let _ = self.writer.shutdown().await;

        let failed = self.pending.len();
        for (_, pending) in std::mem::take(&mut self.pending) {
            let _ = pending.reply.send(Err(ClientError::NotConnected));
        }
        self.timers.clear();

        if failed > 0 {
            debug!(failed, "Failed pending responses on close");
        }
    }
}
