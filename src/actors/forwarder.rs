//! Forwarder pool - delivers completed readings off the ingest path
//!
//! ## Message Flow
//!
//! ```text
//! IngestActor ── try_send ──► shard[hash(module) % N] ──► worker ──► Forwarder::forward
//!                   │
//!                   └── queue full → reading dropped, counted
//! ```
//!
//! Sharding by module keeps readings of one module in order. Workers never
//! retry: a failed reading is logged, counted and dropped. Shutdown drains
//! the queues for at most `drain_timeout_secs`, then aborts the workers.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::Reading;
use crate::config::ForwarderConfig;
use crate::forwarder::{ForwardError, Forwarder};

use super::messages::ForwarderStats;

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    forwarded: AtomicU64,
    queue_full: AtomicU64,
    unreachable: AtomicU64,
    timeout: AtomicU64,
    rejected: AtomicU64,
    abandoned: AtomicU64,
}

impl Counters {
    fn record_failure(&self, error: &ForwardError) {
        let counter = match error {
            ForwardError::Unreachable(_) => &self.unreachable,
            ForwardError::Timeout(_) => &self.timeout,
            ForwardError::Rejected { .. } => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Accepted readings that never reached the forwarder
    fn unsettled(&self) -> u64 {
        let settled = self.forwarded.load(Ordering::Relaxed)
            + self.unreachable.load(Ordering::Relaxed)
            + self.timeout.load(Ordering::Relaxed)
            + self.rejected.load(Ordering::Relaxed);
        self.accepted.load(Ordering::Relaxed).saturating_sub(settled)
    }

    fn snapshot(&self) -> ForwarderStats {
        ForwarderStats {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            unreachable: self.unreachable.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// One worker draining one shard
struct ForwardWorker {
    shard: usize,
    forwarder: Arc<dyn Forwarder>,
    queue_rx: mpsc::Receiver<Reading>,
    counters: Arc<Counters>,
}

impl ForwardWorker {
    /// Runs until every sender of the shard queue is dropped
    #[instrument(skip(self), fields(shard = self.shard))]
    async fn run(mut self) {
        debug!("starting forward worker");

        while let Some(reading) = self.queue_rx.recv().await {
            match self.forwarder.forward(&reading).await {
                Ok(ack) => {
                    self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
                    info!(
                        "forwarded reading {} for {} (HTTP {})",
                        reading.id, reading.module_id, ack.status
                    );
                }
                Err(e) => {
                    self.counters.record_failure(&e);
                    let (id, module_id) = (reading.id, &reading.module_id);
                    match e {
                        ForwardError::Rejected { .. } => {
                            error!("dropping reading {id} for {module_id}: {e}");
                        }
                        _ => warn!("dropping reading {id} for {module_id}: {e}"),
                    }
                }
            }
        }

        debug!("forward worker stopped");
    }
}

/// Submission side of the pool
///
/// Cheap to clone. The shard queues close once every handle is dropped.
#[derive(Clone)]
pub struct ForwarderHandle {
    shards: Vec<mpsc::Sender<Reading>>,
    counters: Arc<Counters>,
}

impl ForwarderHandle {
    fn shard_for(&self, module_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        module_id.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Queue a reading without waiting
    ///
    /// Returns `false` if the reading was dropped.
    pub fn submit(&self, reading: Reading) -> bool {
        let shard = self.shard_for(&reading.module_id);

        match self.shards[shard].try_send(reading) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(reading)) => {
                self.counters.queue_full.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "forward queue {shard} full, dropping reading {} for {}",
                    reading.id, reading.module_id
                );
                false
            }
            Err(TrySendError::Closed(reading)) => {
                warn!("forwarder pool stopped, dropping reading {}", reading.id);
                false
            }
        }
    }

    pub fn stats(&self) -> ForwarderStats {
        self.counters.snapshot()
    }
}

/// Owns the worker tasks
pub struct ForwarderPool {
    handle: ForwarderHandle,
    workers: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl ForwarderPool {
    /// Spawn `config.workers` workers, each with a queue of `config.queue_capacity`
    pub fn spawn(forwarder: Arc<dyn Forwarder>, config: &ForwarderConfig) -> Self {
        let counters = Arc::new(Counters::default());
        let worker_count = config.workers.max(1);

        let mut shards = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);

        for shard in 0..worker_count {
            let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
            let worker = ForwardWorker {
                shard,
                forwarder: forwarder.clone(),
                queue_rx,
                counters: counters.clone(),
            };

            shards.push(queue_tx);
            workers.push(tokio::spawn(worker.run()));
        }

        Self {
            handle: ForwarderHandle { shards, counters },
            workers,
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
        }
    }

    pub fn handle(&self) -> ForwarderHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> ForwarderStats {
        self.handle.stats()
    }

    /// Close the queues and give the workers `drain_timeout` to empty them
    ///
    /// Workers still busy after that are aborted and whatever they had
    /// queued is counted as abandoned. The queues only close once every
    /// other [`ForwarderHandle`] has been dropped.
    pub async fn shutdown(mut self) -> ForwarderStats {
        let counters = self.handle.counters.clone();
        drop(self.handle);

        let drain = futures::future::join_all(self.workers.iter_mut());
        let results = match tokio::time::timeout(self.drain_timeout, drain).await {
            Ok(results) => results,
            Err(_) => {
                for worker in &self.workers {
                    worker.abort();
                }
                let results = futures::future::join_all(self.workers.iter_mut()).await;

                let abandoned = counters.unsettled();
                counters.abandoned.fetch_add(abandoned, Ordering::Relaxed);
                warn!(
                    "forward queues not drained within {:?}, abandoning {abandoned} readings",
                    self.drain_timeout
                );
                results
            }
        };

        for result in results {
            match result {
                Err(e) if e.is_panic() => error!("forward worker panicked: {e}"),
                _ => {}
            }
        }

        counters.snapshot()
    }
}
