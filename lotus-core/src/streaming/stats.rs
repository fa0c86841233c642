//! Transfer statistics shared by all in-flight streams.
//!
//! Counters are plain atomics so recording an event never blocks a transfer.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::engine::StreamOutcome;

/// Process-wide streaming counters.
#[derive(Debug)]
pub struct StreamStats {
    started_at: DateTime<Utc>,
    total_requests: AtomicU64,
    active_transfers: AtomicU64,
    completed_transfers: AtomicU64,
    client_aborts: AtomicU64,
    stalled_clients: AtomicU64,
    storage_aborts: AtomicU64,
    server_errors: AtomicU64,
    not_found: AtomicU64,
    denied: AtomicU64,
    range_rejected: AtomicU64,
    bad_requests: AtomicU64,
    head_requests: AtomicU64,
    bytes_sent: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub total_requests: u64,
    pub active_transfers: u64,
    pub completed_transfers: u64,
    pub client_aborts: u64,
    pub stalled_clients: u64,
    pub storage_aborts: u64,
    pub server_errors: u64,
    pub not_found: u64,
    pub denied: u64,
    pub range_rejected: u64,
    pub bad_requests: u64,
    pub head_requests: u64,
    pub bytes_sent: u64,
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamStats {
    /// Creates zeroed counters stamped with the current time.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            total_requests: AtomicU64::new(0),
            active_transfers: AtomicU64::new(0),
            completed_transfers: AtomicU64::new(0),
            client_aborts: AtomicU64::new(0),
            stalled_clients: AtomicU64::new(0),
            storage_aborts: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            range_rejected: AtomicU64::new(0),
            bad_requests: AtomicU64::new(0),
            head_requests: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transfer_started(&self) {
        self.active_transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bytes(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a terminal state. Transfer outcomes also release the active slot.
    pub(crate) fn record_outcome(&self, outcome: StreamOutcome) {
        let counter = match outcome {
            StreamOutcome::Completed => &self.completed_transfers,
            StreamOutcome::ClientDisconnected => &self.client_aborts,
            StreamOutcome::ClientStalled => &self.stalled_clients,
            StreamOutcome::SourceFailed => &self.storage_aborts,
            StreamOutcome::ServerError => &self.server_errors,
            StreamOutcome::NotFound => &self.not_found,
            StreamOutcome::Denied => &self.denied,
            StreamOutcome::RangeRejected => &self.range_rejected,
            StreamOutcome::BadRequest => &self.bad_requests,
            StreamOutcome::HeadersOnly => &self.head_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if outcome.is_transfer_end() {
            self.active_transfers.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Number of transfers currently holding an open cursor.
    pub fn active_transfers(&self) -> u64 {
        self.active_transfers.load(Ordering::Relaxed)
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            active_transfers: self.active_transfers.load(Ordering::Relaxed),
            completed_transfers: self.completed_transfers.load(Ordering::Relaxed),
            client_aborts: self.client_aborts.load(Ordering::Relaxed),
            stalled_clients: self.stalled_clients.load(Ordering::Relaxed),
            storage_aborts: self.storage_aborts.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            range_rejected: self.range_rejected.load(Ordering::Relaxed),
            bad_requests: self.bad_requests.load(Ordering::Relaxed),
            head_requests: self.head_requests.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}
