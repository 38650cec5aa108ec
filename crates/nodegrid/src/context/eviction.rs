//! Background sweep that removes expired evictable entries.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{SessionContextStore, SessionIndex};

pub(crate) const EVICTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::eviction");

/// Errors surfaced while starting or stopping an eviction job.
#[derive(Debug, Error)]
pub enum EvictionError {
    /// The sweep thread could not start.
    #[error("failed to spawn eviction thread for {label}: {source}")]
    Spawn {
        /// Job label, usually the node id.
        label: String,
        /// Spawn failure.
        #[source]
        source: io::Error,
    },
    /// A zero interval would make the sweep spin.
    #[error("eviction sweep interval must be greater than zero")]
    ZeroInterval,
    /// The sweep thread panicked.
    #[error("eviction thread panicked")]
    ThreadPanic,
}

/// Outcome of a single sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries whose timestamp was past the TTL when the sweep began.
    pub examined: usize,
    /// Keys actually removed.
    pub evicted: Vec<String>,
}

/// Periodic sweep over one node's store.
#[derive(Debug, Clone)]
pub struct EvictionJob {
    store: Arc<SessionContextStore>,
    index: Option<Arc<SessionIndex>>,
    ttl: Duration,
    interval: Duration,
    label: String,
}

impl EvictionJob {
    /// Creates a job sweeping `store` every `interval`, evicting entries
    /// untouched for longer than `ttl`.
    #[must_use]
    pub fn new(store: Arc<SessionContextStore>, ttl: Duration, interval: Duration) -> Self {
        Self {
            store,
            index: None,
            ttl,
            interval,
            label: String::from("anonymous"),
        }
    }

    /// Drops session index pairs whose session id or instance id is evicted.
    #[must_use]
    pub fn with_index(mut self, index: Arc<SessionIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Names the job in log output, usually after the owning node.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Runs one sweep as of `now`.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let (examined, evicted) = self.store.evict_expired(now, self.ttl);
        if let Some(index) = &self.index {
            for key in &evicted {
                index.forget(key);
            }
        }
        if !evicted.is_empty() {
            debug!(
                target: EVICTION_TARGET,
                node = %self.label,
                evicted = evicted.len(),
                "evicted expired context entries"
            );
        }
        SweepReport { examined, evicted }
    }

    /// Starts sweeping on a background thread.
    pub fn spawn(self) -> Result<EvictionHandle, EvictionError> {
        if self.interval.is_zero() {
            return Err(EvictionError::ZeroInterval);
        }
        let (cancel, cancelled) = mpsc::channel();
        let label = self.label.clone();
        let thread = thread::Builder::new()
            .name(format!("eviction-{label}"))
            .spawn(move || run_sweep_loop(&self, &cancelled))
            .map_err(|source| EvictionError::Spawn { label, source })?;
        Ok(EvictionHandle {
            cancel: Some(cancel),
            thread: Some(thread),
        })
    }
}

/// Handle to a running eviction thread.
#[derive(Debug)]
pub struct EvictionHandle {
    cancel: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl EvictionHandle {
    /// Signals the sweep loop to stop after its current tick.
    pub fn shutdown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            // The loop may already have exited; a closed channel is fine.
            let _ = cancel.send(());
        }
    }

    /// Stops the loop and waits for the thread to exit.
    pub fn join(mut self) -> Result<(), EvictionError> {
        self.shutdown();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| EvictionError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for EvictionHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!(target: EVICTION_TARGET, "eviction thread panicked");
        }
    }
}

fn run_sweep_loop(job: &EvictionJob, cancelled: &Receiver<()>) {
    info!(
        target: EVICTION_TARGET,
        node = %job.label,
        ttl_ms = job.ttl.as_millis(),
        interval_ms = job.interval.as_millis(),
        "eviction job running"
    );
    loop {
        match cancelled.recv_timeout(job.interval) {
            Err(RecvTimeoutError::Timeout) => {
                job.sweep(Instant::now());
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(target: EVICTION_TARGET, node = %job.label, "eviction job stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextValue;
    use serde_json::json;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn sweep_reports_evicted_keys() {
        let store = Arc::new(SessionContextStore::new());
        let start = Instant::now();
        store.insert_evictable("tmp1", ContextValue::data(json!(1)), start);
        store.insert("n1", ContextValue::text("keep"));
        let job = EvictionJob::new(Arc::clone(&store), Duration::from_secs(1), Duration::from_secs(1));

        let report = job.sweep(start + Duration::from_secs(2));

        assert_eq!(report.examined, 1);
        assert_eq!(report.evicted, vec![String::from("tmp1")]);
        assert!(store.contains("n1"));
    }

    #[test]
    fn sweep_forgets_index_pairs_of_evicted_keys() {
        let store = Arc::new(SessionContextStore::new());
        let index = Arc::new(SessionIndex::new());
        let start = Instant::now();
        store.insert_evictable("tmp1", ContextValue::data(json!(1)), start);
        index.bind("tmp1", "iid-1");
        index.bind("alpha", "iid-2");
        let job = EvictionJob::new(Arc::clone(&store), Duration::from_secs(1), Duration::from_secs(1))
            .with_index(Arc::clone(&index));

        job.sweep(start + Duration::from_secs(2));

        assert_eq!(index.instance_of("tmp1"), None);
        assert_eq!(index.session_of("iid-1"), None);
        assert_eq!(index.instance_of("alpha").as_deref(), Some("iid-2"));
    }

    #[test]
    fn background_job_evicts_and_stops() {
        let store = Arc::new(SessionContextStore::new());
        store.insert_evictable("tmp1", ContextValue::data(json!(1)), Instant::now());
        let handle = EvictionJob::new(Arc::clone(&store), Duration::ZERO, Duration::from_millis(10))
            .with_label("n1")
            .spawn()
            .expect("spawn eviction job");

        assert!(wait_until(|| !store.contains("tmp1")));
        handle.join().expect("join eviction job");
    }

    #[test]
    fn dropping_the_handle_stops_the_thread() {
        let store = Arc::new(SessionContextStore::new());
        let handle = EvictionJob::new(Arc::clone(&store), Duration::ZERO, Duration::from_millis(10))
            .spawn()
            .expect("spawn eviction job");

        drop(handle);

        assert_eq!(Arc::strong_count(&store), 1);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let store = Arc::new(SessionContextStore::new());
        let error = EvictionJob::new(store, Duration::ZERO, Duration::ZERO)
            .spawn()
            .expect_err("zero interval must be rejected");
        assert!(matches!(error, EvictionError::ZeroInterval));
    }
}
