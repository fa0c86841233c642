//! Chunked transfer of a resolved byte window.
//!
//! A transfer owns one cursor bounded to exactly the window it serves and
//! moves it to the client in reads of at most `read_buffer_size` bytes. The
//! body is pull-based: hyper only polls for the next chunk once the previous
//! one has been accepted by the connection, so a slow viewer slows the reads
//! down instead of growing a buffer.
//!
//! The first chunk is read before any header is produced. A storage failure
//! at that point can still become a 500; afterwards the only option left is
//! to abort the connection.
//!
//! A client that stops reading stops the polling too, so a stalled body would
//! hold its cursor forever. Each body stream therefore has a watchdog task
//! that takes the transfer away once no chunk has been handed to the
//! connection for `idle_timeout`.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use futures::{Stream, stream};
use tokio::io::{AsyncReadExt, Take};
use tokio::sync::{Mutex, watch};
use tracing::{Span, debug, error, trace, warn};

use super::engine::StreamOutcome;
use super::range::ResolvedRange;
use super::source::{ByteCursor, ByteSource, SourceError, SourceResult};
use super::stats::StreamStats;
use crate::config::StreamingConfig;

/// Tunables for a single transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    /// Maximum bytes read from the source per chunk
    pub read_buffer_size: usize,
    /// Maximum time a single storage operation, or the client between two
    /// chunks, may take
    pub idle_timeout: Duration,
}

impl From<&StreamingConfig> for TransferSettings {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            read_buffer_size: config.read_buffer_size.max(1),
            idle_timeout: config.idle_timeout,
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from(&StreamingConfig::default())
    }
}

/// Records the terminal state of a transfer when it is dropped.
///
/// Dropping without an explicit outcome before every byte was handed over
/// means the body was abandoned by the connection, which is how a client
/// disconnect surfaces.
struct TransferGuard {
    stats: Arc<StreamStats>,
    span: Span,
    expected: u64,
    delivered: u64,
    started_at: Instant,
    outcome: Option<StreamOutcome>,
}

impl TransferGuard {
    fn new(stats: Arc<StreamStats>, span: Span, expected: u64) -> Self {
        stats.transfer_started();
        Self {
            stats,
            span,
            expected,
            delivered: 0,
            started_at: Instant::now(),
            outcome: None,
        }
    }

    fn record_chunk(&mut self, len: u64) {
        self.delivered += len;
        self.stats.record_bytes(len);
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        let outcome = self.outcome.unwrap_or(if self.delivered == self.expected {
            StreamOutcome::Completed
        } else {
            StreamOutcome::ClientDisconnected
        });
        let elapsed_ms = self.started_at.elapsed().as_millis() as u64;
        self.span.in_scope(|| match outcome {
            StreamOutcome::Completed => debug!(
                bytes = self.delivered,
                elapsed_ms, "Transfer completed"
            ),
            StreamOutcome::ClientDisconnected => debug!(
                "Client disconnected after {} of {} bytes ({} ms)",
                self.delivered, self.expected, elapsed_ms
            ),
            StreamOutcome::ClientStalled => warn!(
                "Client stopped reading after {} of {} bytes, releasing cursor",
                self.delivered, self.expected
            ),
            _ => {}
        });
        self.stats.record_outcome(outcome);
    }
}

/// An open, primed transfer of one resolved window.
pub struct Transfer {
    cursor: Take<ByteCursor>,
    range: ResolvedRange,
    settings: TransferSettings,
    read_so_far: u64,
    primed: Option<Bytes>,
    guard: TransferGuard,
}

impl Transfer {
    /// Opens a cursor at the start of `range` and reads the first chunk.
    ///
    /// Nothing has been sent to the client when this returns an error, so the
    /// caller is still free to choose the status code.
    ///
    /// # Errors
    ///
    /// - `SourceError::Io` - The cursor could not be opened or the first read failed
    /// - `SourceError::IdleTimeout` - Opening or the first read stalled
    /// - `SourceError::Ended` - The source holds no bytes at `range.start()`
    pub async fn open(
        source: &dyn ByteSource,
        range: ResolvedRange,
        settings: TransferSettings,
        stats: Arc<StreamStats>,
        span: Span,
    ) -> SourceResult<Self> {
        let mut guard = TransferGuard::new(stats, span, range.chunk_length());
        let opened = tokio::time::timeout(settings.idle_timeout, source.open_cursor(range.start()))
            .await
            .map_err(|_| idle_timeout(settings.idle_timeout))
            .and_then(|opened| opened);
        let cursor = match opened {
            Ok(cursor) => cursor,
            Err(e) => {
                guard.outcome = Some(StreamOutcome::SourceFailed);
                return Err(e);
            }
        };

        let mut transfer = Self {
            cursor: cursor.take(range.chunk_length()),
            range,
            settings,
            read_so_far: 0,
            primed: None,
            guard,
        };

        match transfer.read_chunk().await {
            Ok(first) => {
                transfer.primed = first;
                Ok(transfer)
            }
            Err(e) => {
                transfer.guard.outcome = Some(StreamOutcome::SourceFailed);
                Err(e)
            }
        }
    }

    /// Window this transfer serves.
    pub fn range(&self) -> ResolvedRange {
        self.range
    }

    /// Reads the next chunk, or `None` once the whole window has been read.
    async fn read_chunk(&mut self) -> SourceResult<Option<Bytes>> {
        let expected = self.range.chunk_length();
        let remaining = expected - self.read_so_far;
        if remaining == 0 {
            return Ok(None);
        }

        let want = remaining.min(self.settings.read_buffer_size as u64) as usize;
        let mut buffer = BytesMut::zeroed(want);
        let read = tokio::time::timeout(self.settings.idle_timeout, self.cursor.read(&mut buffer[..]))
            .await
            .map_err(|_| idle_timeout(self.settings.idle_timeout))??;
        buffer.truncate(read);

        if read == 0 {
            return Err(SourceError::Ended {
                delivered: self.read_so_far,
                expected,
            });
        }

        self.read_so_far += read as u64;
        Ok(Some(buffer.freeze()))
    }

    /// Yields the next chunk destined for the client, recording progress.
    ///
    /// Returns `None` when the window is complete or after an error has been
    /// reported once.
    pub async fn next_chunk(&mut self) -> Option<SourceResult<Bytes>> {
        if self.guard.outcome.is_some() {
            return None;
        }

        let next = match self.primed.take() {
            Some(chunk) => Ok(Some(chunk)),
            None => self.read_chunk().await,
        };

        match next {
            Ok(Some(chunk)) => {
                self.guard.record_chunk(chunk.len() as u64);
                self.guard
                    .span
                    .in_scope(|| trace!(len = chunk.len(), delivered = self.guard.delivered, "Chunk ready"));
                Some(Ok(chunk))
            }
            Ok(None) => {
                self.guard.outcome = Some(StreamOutcome::Completed);
                None
            }
            Err(e) => {
                self.guard.outcome = Some(StreamOutcome::SourceFailed);
                self.guard.span.in_scope(|| {
                    error!(
                        "Storage failure after {} of {} bytes sent, aborting connection: {}",
                        self.guard.delivered,
                        self.range.chunk_length(),
                        e
                    )
                });
                Some(Err(e))
            }
        }
    }

    /// Converts the transfer into a body stream.
    ///
    /// Dropping the stream drops the cursor and records a client disconnect
    /// unless the transfer already reached a terminal state. If the stream is
    /// not polled for `idle_timeout` after handing out a chunk, the cursor is
    /// released, the stall is recorded and the stream ends on its next poll.
    ///
    /// Must be called within a tokio runtime.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
        let idle_timeout = self.settings.idle_timeout;
        let slot = Arc::new(Mutex::new(Some(self)));
        let (progress, watched) = watch::channel(());
        tokio::spawn(watch_client_progress(Arc::downgrade(&slot), watched, idle_timeout));

        stream::unfold((slot, progress), |(slot, progress)| async move {
            let item = {
                let mut held = slot.lock().await;
                let next = match held.as_mut() {
                    Some(transfer) => transfer.next_chunk().await,
                    None => None,
                };
                if next.is_none() {
                    held.take();
                }
                next?
            };
            progress.send_replace(());
            Some((item.map_err(std::io::Error::other), (slot, progress)))
        })
    }
}

/// Takes the transfer out of `slot` once the body has gone `idle_timeout`
/// without handing out a chunk. Exits as soon as the body stream is dropped.
async fn watch_client_progress(
    slot: Weak<Mutex<Option<Transfer>>>,
    mut progress: watch::Receiver<()>,
    idle_timeout: Duration,
) {
    loop {
        match tokio::time::timeout(idle_timeout, progress.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) => return,
            Err(_) => {
                let Some(slot) = slot.upgrade() else {
                    return;
                };
                // A held lock means a storage read is in flight; it has its own timeout.
                let Ok(mut held) = slot.try_lock() else {
                    continue;
                };
                if let Some(mut transfer) = held.take() {
                    transfer.guard.outcome = Some(StreamOutcome::ClientStalled);
                }
                return;
            }
        }
    }
}

fn idle_timeout(timeout: Duration) -> SourceError {
    SourceError::IdleTimeout {
        timeout_ms: timeout.as_millis() as u64,
    }
}
