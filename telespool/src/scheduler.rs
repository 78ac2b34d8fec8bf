//! The periodic tick loop that moves records between memory and disk.
//!
//! A [`SpillScheduler`] owns one [`SpillTarget`] per route and wakes on a
//! fixed interval. Each tick checks every target: a route over its memory
//! budget spills oldest records to its [`DiskRetentionPolicy`] (or drops
//! them when spilling is disabled), a route at or under budget recovers
//! previously spilled records back into memory.
//!
//! A tick never fails the loop. Every per-record problem — a full disk, a
//! name collision, a poisoned file — is logged and absorbed so one bad
//! route cannot stall the others.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::config::{BufferConfig, ExecutionFormat};
use crate::error::{DiskError, Result};
use crate::estimate::estimated_size;
use crate::registry::BufferRegistry;
use crate::retention::DiskRetentionPolicy;

/// One route's spill policy: its disk tier plus the budgets the scheduler
/// enforces against it.
pub struct SpillTarget {
    route: String,
    policy: DiskRetentionPolicy,
    memory_limit: u64,
    disk_limit: u64,
    file_count_limit: u64,
    spill_to_disk: bool,
}

impl SpillTarget {
    /// Creates a target with explicit budgets.
    pub fn new(
        route: impl Into<String>,
        policy: DiskRetentionPolicy,
        memory_limit: u64,
        disk_limit: u64,
        file_count_limit: u64,
        spill_to_disk: bool,
    ) -> Self {
        SpillTarget {
            route: route.into(),
            policy,
            memory_limit,
            disk_limit,
            file_count_limit,
            spill_to_disk,
        }
    }

    /// Builds the target for `route` from its [`BufferConfig`].
    ///
    /// Creates the spill directory if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if a size string in the configuration is malformed
    /// or the spill directory cannot be prepared.
    pub fn from_config(route: &str, config: &BufferConfig) -> Result<Self> {
        let policy =
            DiskRetentionPolicy::with_prefix(&config.buffer_path, &config.file_prefix_for(route))?;
        Ok(SpillTarget {
            route: route.to_string(),
            policy,
            memory_limit: config.memory_limit_bytes()?,
            disk_limit: config.disk_limit_bytes()?,
            file_count_limit: config.allowed_file_count,
            spill_to_disk: config.buffer_to_disk,
        })
    }

    /// The route this target watches.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// The disk tier backing this target.
    pub fn policy(&self) -> &DiskRetentionPolicy {
        &self.policy
    }

    /// The memory budget in estimated bytes.
    pub fn memory_limit(&self) -> u64 {
        self.memory_limit
    }

    /// Runs one balance pass for this target.
    ///
    /// Over budget: dequeue oldest records and spill (or drop) them until
    /// the route is back under its memory limit. At or under budget, with
    /// spilling enabled: recover spilled records that still fit. A target
    /// with spilling disabled never reads the disk tier, so files left by
    /// an earlier configuration stay where they are. The two phases never
    /// run in the same pass, so a tick cannot bounce a record
    /// memory → disk → memory.
    fn check(&self, registry: &BufferRegistry) {
        let route = self.route.as_str();
        if registry.size_of(route) > self.memory_limit {
            self.spill_overflow(registry);
        } else if self.spill_to_disk {
            self.recover(registry);
        }
    }

    fn spill_overflow(&self, registry: &BufferRegistry) {
        let route = self.route.as_str();
        while registry.size_of(route) > self.memory_limit {
            let Some(record) = registry.try_dequeue(route) else {
                break;
            };
            if !self.spill_to_disk {
                warn!(route, "memory buffer over budget with spilling disabled, dropping record");
                continue;
            }

            let estimate = estimated_size(&record);
            match self
                .policy
                .make_room(estimate, self.disk_limit, self.file_count_limit)
            {
                Ok(true) => {
                    warn!(route, "evicted old spill data for new overflow, check downstream flow");
                }
                Ok(false) => {}
                Err(e) => {
                    error!(route, error = %e, "cannot make room on disk, dropping record");
                    continue;
                }
            }

            match self.policy.write(&record) {
                Ok(path) => debug!(route, path = %path.display(), "spilled overflow record"),
                Err(DiskError::FileExists { path }) => {
                    warn!(route, path, "spill file name collision, record lost");
                }
                Err(e) => error!(route, error = %e, "spill write failed, record lost"),
            }
        }
    }

    fn recover(&self, registry: &BufferRegistry) {
        let route = self.route.as_str();
        match self
            .policy
            .recover_eligible(self.memory_limit, registry.size_of(route))
        {
            Ok(records) => {
                for record in records {
                    registry.broadcast_enqueue(route, record);
                }
            }
            Err(e) => error!(route, error = %e, "disk recovery failed"),
        }
    }
}

/// The periodic loop balancing every configured route between its memory
/// and disk tiers.
pub struct SpillScheduler {
    registry: Arc<BufferRegistry>,
    targets: Vec<Arc<SpillTarget>>,
    interval: Duration,
    format: ExecutionFormat,
}

impl SpillScheduler {
    /// Creates a scheduler over `targets`, ticking every `interval`.
    pub fn new(
        registry: Arc<BufferRegistry>,
        targets: Vec<SpillTarget>,
        interval: Duration,
        format: ExecutionFormat,
    ) -> Self {
        SpillScheduler {
            registry,
            targets: targets.into_iter().map(Arc::new).collect(),
            interval,
            format,
        }
    }

    /// The configured tick period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs the tick loop until `shutdown` flips to `true` or its sender
    /// is dropped.
    ///
    /// The tick's own duration is subtracted from the sleep, so the period
    /// stays fixed; a tick that overruns the interval is followed
    /// immediately by the next one rather than skipped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let started = Instant::now();
            self.tick().await;
            let elapsed = started.elapsed();
            if elapsed > self.interval {
                warn!(?elapsed, interval = ?self.interval, "tick overran its interval");
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval.saturating_sub(elapsed)) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("spill scheduler stopped");
    }

    /// Runs one balance pass over all targets.
    ///
    /// In [`ExecutionFormat::Parallel`] each target runs as its own
    /// blocking task and the tick ends with a wait-all barrier; in
    /// [`ExecutionFormat::Sequence`] targets run strictly one after
    /// another. Target failures are logged, never propagated.
    pub async fn tick(&self) {
        match self.format {
            ExecutionFormat::Parallel => {
                let mut tasks = JoinSet::new();
                for target in &self.targets {
                    let registry = Arc::clone(&self.registry);
                    let target = Arc::clone(target);
                    tasks.spawn_blocking(move || target.check(&registry));
                }
                while let Some(joined) = tasks.join_next().await {
                    if let Err(e) = joined {
                        error!(error = %e, "spill task failed");
                    }
                }
            }
            ExecutionFormat::Sequence => {
                for target in &self.targets {
                    let registry = Arc::clone(&self.registry);
                    let target = Arc::clone(target);
                    let joined =
                        tokio::task::spawn_blocking(move || target.check(&registry)).await;
                    if let Err(e) = joined {
                        error!(error = %e, "spill task failed");
                    }
                }
            }
        }
    }
}
