//! Shared board topology snapshot and its background refresher.
//!
//! Readers call [`SnapshotProvider::current`] and get an `Arc` to an
//! immutable [`ConfigSnapshot`]. The lock is only held to clone or swap that
//! `Arc`; traversal happens on the reader's own handle.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::errors::AppError;
use crate::models::{ConfigSnapshot, Topology};

/// Source of the current board topology.
pub trait SnapshotProvider: Send + Sync {
    fn current(&self) -> Arc<ConfigSnapshot>;
}

/// Anything able to fetch the complete topology in one consistent read.
#[async_trait]
pub trait TopologySource: Send + Sync {
    async fn fetch_topology(&self) -> Result<Topology, AppError>;
}

/// Snapshot slot published by the refresher and read by every request.
#[derive(Debug, Default)]
pub struct SharedSnapshot {
    slot: RwLock<Arc<ConfigSnapshot>>,
    generation: AtomicI64,
}

impl SharedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a freshly fetched topology. Returns `false` when it is
    /// identical to the current one and nothing was swapped.
    pub fn publish(&self, topology: Topology) -> bool {
        let generation = self.generation.load(Ordering::Acquire) + 1;
        let next = ConfigSnapshot::from_topology(topology, generation, Utc::now());
        if next.same_topology(&self.current()) {
            return false;
        }
        self.generation.store(generation, Ordering::Release);
        let next = Arc::new(next);
        match self.slot.write() {
            Ok(mut slot) => *slot = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        true
    }
}

impl SnapshotProvider for SharedSnapshot {
    fn current(&self) -> Arc<ConfigSnapshot> {
        match self.slot.read() {
            Ok(slot) => Arc::clone(&slot),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}

/// Provider returning one fixed snapshot.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct FixedSnapshot(pub Arc<ConfigSnapshot>);

#[cfg(test)]
impl FixedSnapshot {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self(Arc::new(snapshot))
    }
}

#[cfg(test)]
impl SnapshotProvider for FixedSnapshot {
    fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.0)
    }
}

/// Periodically replaces the shared snapshot with a full fetch.
#[derive(Clone)]
pub struct Refresher {
    source: Arc<dyn TopologySource>,
    snapshot: Arc<SharedSnapshot>,
    timeout: Duration,
}

impl Refresher {
    pub fn new(
        source: Arc<dyn TopologySource>,
        snapshot: Arc<SharedSnapshot>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            snapshot,
            timeout,
        }
    }

    /// Fetch and publish once. On failure the previous snapshot stays.
    pub async fn refresh(&self) -> Result<(), AppError> {
        let topology = tokio::time::timeout(self.timeout, self.source.fetch_topology())
            .await
            .map_err(|_| {
                AppError::Internal(format!(
                    "topology fetch timed out after {:?}",
                    self.timeout
                ))
            })??;

        let boards = topology.boards.len();
        let users = topology.users.len();
        if self.snapshot.publish(topology) {
            let current = self.snapshot.current();
            tracing::info!(
                boards,
                users,
                generation = current.generation,
                fetched_at = ?current.fetched_at,
                "Published board snapshot"
            );
        } else {
            tracing::debug!("Board topology unchanged");
        }
        Ok(())
    }

    /// Run [`Refresher::refresh`] every `period`, starting one period from now.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    tracing::warn!("Board snapshot refresh failed, keeping previous: {}", e);
                }
            }
        })
    }
}
