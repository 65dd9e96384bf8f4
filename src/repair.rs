// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background read repair.
//!
//! Records found only through the source store are pushed back into the
//! month shard they belong to. The read path hands records over with
//! [`SyncRepairer::schedule`], which never waits; a fixed pool of tokio
//! workers drains a bounded queue and writes through the index client with
//! retry and exponential backoff.
//!
//! # Overflow
//!
//! The queue holds at most `capacity` records. When full, the oldest queued
//! record is dropped to make room. Repair is best effort: a dropped record is
//! picked up again the next time a fallback read returns it.
//!
//! # Idempotence
//!
//! Documents are keyed by record id, so concurrent repairs of the same record
//! converge on one document without any locking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ExposureEngineConfig;
use crate::index_client::SearchIndexClient;
use crate::metrics;
use crate::record::CanonicalRecord;
use crate::resilience::retry::{retry_while, RetryConfig};
use crate::shard::shard_name;
use crate::storage::traits::StorageError;

/// Repair pool settings.
#[derive(Debug, Clone)]
pub struct RepairOptions {
    pub shard_prefix: String,
    pub workers: usize,
    pub capacity: usize,
    pub retry: RetryConfig,
}

impl RepairOptions {
    pub fn from_config(config: &ExposureEngineConfig) -> Self {
        Self {
            shard_prefix: config.shard_prefix.clone(),
            workers: config.repair_workers,
            capacity: config.repair_queue_capacity,
            retry: config.repair_retry(),
        }
    }
}

/// Counters since the repairer started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairStats {
    /// Records accepted onto the queue
    pub scheduled: u64,
    /// Records written to the index
    pub succeeded: u64,
    /// Records given up on after retries (or a permanent error)
    pub dropped: u64,
    /// Records evicted from a full queue before being attempted
    pub overflowed: u64,
}

struct Shared {
    queue: Mutex<VecDeque<CanonicalRecord>>,
    capacity: usize,
    client: Arc<SearchIndexClient>,
    shard_prefix: String,
    retry: RetryConfig,
    /// Wakes workers when work arrives or on shutdown
    work: Notify,
    /// Wakes `wait_idle` callers when a job finishes
    idle: Notify,
    /// Jobs popped but not finished. Incremented under the queue lock.
    in_flight: AtomicUsize,
    /// Only flipped while holding the queue lock
    closed: AtomicBool,

    scheduled: AtomicU64,
    succeeded: AtomicU64,
    dropped: AtomicU64,
    overflowed: AtomicU64,
}

enum NextJob {
    Run(CanonicalRecord),
    Wait,
    Stop,
}

impl Shared {
    fn next_job(&self) -> NextJob {
        let mut queue = self.queue.lock();
        match queue.pop_front() {
            Some(record) => {
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                metrics::set_repair_queue_depth(queue.len());
                NextJob::Run(record)
            }
            // Empty and closed under the same lock: nothing can be pushed after this
            None if self.closed.load(Ordering::Acquire) => NextJob::Stop,
            None => NextJob::Wait,
        }
    }

    fn is_idle(&self) -> bool {
        let queue = self.queue.lock();
        queue.is_empty() && self.in_flight.load(Ordering::Acquire) == 0
    }

    async fn repair(&self, record: CanonicalRecord) {
        let shard = shard_name(&self.shard_prefix, record.shard_time());
        let doc = record.to_index_document();

        let client = &self.client;
        let target = shard.as_str();
        let doc_ref = &doc;
        let mut attempt = 0usize;

        let result = retry_while(
            "index_repair",
            &self.retry,
            move || {
                attempt += 1;
                if attempt > 1 {
                    metrics::record_repair("retry");
                }
                client.upsert(target, doc_ref)
            },
            StorageError::is_transient,
        )
        .await;

        match result {
            Ok(()) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                metrics::record_repair("success");
                debug!(id = %doc.id, shard = %shard, "Repaired index document");
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_repair("dropped");
                warn!(id = %doc.id, shard = %shard, error = %e, "Index repair failed, dropping");
            }
        }
    }
}

/// Bounded repair queue with a fixed worker pool.
pub struct SyncRepairer {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncRepairer {
    /// Start the worker pool. Must be called inside a tokio runtime.
    pub fn start(client: Arc<SearchIndexClient>, options: RepairOptions) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            capacity: options.capacity.max(1),
            client,
            shard_prefix: options.shard_prefix,
            retry: options.retry,
            work: Notify::new(),
            idle: Notify::new(),
            in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            scheduled: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            overflowed: AtomicU64::new(0),
        });

        let worker_count = options.workers.max(1);
        let workers = (0..worker_count)
            .map(|worker| tokio::spawn(run_worker(worker, shared.clone())))
            .collect();

        debug!(workers = worker_count, capacity = shared.capacity, "Repair pool started");
        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Queue a record for re-indexing. Returns immediately.
    ///
    /// Returns `false` if the repairer has been shut down.
    pub fn schedule(&self, record: CanonicalRecord) -> bool {
        let evicted = {
            let mut queue = self.shared.queue.lock();
            if self.shared.closed.load(Ordering::Acquire) {
                drop(queue);
                debug!(id = %record.id, "Repairer closed, ignoring record");
                return false;
            }
            let evicted = if queue.len() >= self.shared.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(record);
            metrics::set_repair_queue_depth(queue.len());
            evicted
        };

        self.shared.scheduled.fetch_add(1, Ordering::Relaxed);
        metrics::record_repair("scheduled");

        if let Some(old) = evicted {
            self.shared.overflowed.fetch_add(1, Ordering::Relaxed);
            metrics::record_repair("overflow");
            warn!(id = %old.id, capacity = self.shared.capacity, "Repair queue full, dropped oldest record");
        }

        self.shared.work.notify_one();
        true
    }

    /// Schedule every record in order.
    pub fn schedule_all(&self, records: impl IntoIterator<Item = CanonicalRecord>) {
        for record in records {
            self.schedule(record);
        }
    }

    /// Queued plus in-flight jobs.
    pub fn pending(&self) -> usize {
        let queue = self.shared.queue.lock();
        queue.len() + self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RepairStats {
        RepairStats {
            scheduled: self.shared.scheduled.load(Ordering::Relaxed),
            succeeded: self.shared.succeeded.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            overflowed: self.shared.overflowed.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Wait until the queue is empty and no job is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting records, finish what is queued, then join the workers.
    pub async fn shutdown(&self) {
        {
            let _queue = self.shared.queue.lock();
            if self.shared.closed.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        self.shared.work.notify_waiters();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Repair worker ended abnormally");
            }
        }

        let stats = self.stats();
        info!(
            scheduled = stats.scheduled,
            succeeded = stats.succeeded,
            dropped = stats.dropped,
            overflowed = stats.overflowed,
            "Repair pool stopped"
        );
    }
}

async fn run_worker(worker: usize, shared: Arc<Shared>) {
    loop {
        let notified = shared.work.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        match shared.next_job() {
            NextJob::Run(record) => {
                shared.repair(record).await;
                shared.in_flight.fetch_sub(1, Ordering::AcqRel);
                shared.idle.notify_waiters();
            }
            NextJob::Wait => notified.await,
            NextJob::Stop => break,
        }
    }
    debug!(worker, "Repair worker exiting");
}
