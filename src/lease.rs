// src/lease.rs

//! Bounded pool of worker leases.
//!
//! A lease is the right to run one node's work. The pool never hands out more
//! leases than its capacity, and acquisition never waits: the coordinator asks,
//! and either gets a lease or is told to come back after a completion.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Host parallelism, falling back to 1 when it cannot be determined.
pub fn host_parallelism() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

#[derive(Debug, Default)]
struct LeaseStats {
    outstanding: AtomicUsize,
    peak: AtomicUsize,
}

/// Fixed-size pool of worker leases, owned by one execution session.
#[derive(Debug)]
pub struct WorkerLeaseService {
    semaphore: Arc<Semaphore>,
    capacity: NonZeroUsize,
    stats: Arc<LeaseStats>,
}

/// One outstanding worker lease.
///
/// Released when dropped, so every exit path of the node's execution gives it
/// back exactly once.
#[derive(Debug)]
pub struct WorkerLease {
    _permit: OwnedSemaphorePermit,
    stats: Arc<LeaseStats>,
}

impl WorkerLeaseService {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.get())),
            capacity,
            stats: Arc::new(LeaseStats::default()),
        }
    }

    /// Take a lease if one is free. Never waits.
    pub fn try_acquire_lease(&self) -> Option<WorkerLease> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        let now = self.stats.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(now, Ordering::SeqCst);
        trace!(outstanding = now, capacity = self.capacity.get(), "worker lease acquired");
        Some(WorkerLease {
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Leases currently held.
    pub fn outstanding(&self) -> usize {
        self.stats.outstanding.load(Ordering::SeqCst)
    }

    /// Highest number of leases held at the same time so far.
    pub fn peak(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }
}

impl WorkerLease {
    /// Give the lease back now rather than at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        // Runs before the permit field is dropped, so `outstanding` never
        // exceeds the semaphore's capacity.
        let left = self.stats.outstanding.fetch_sub(1, Ordering::SeqCst) - 1;
        trace!(outstanding = left, "worker lease released");
    }
}
