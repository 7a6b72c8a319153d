//! Maintenance client.
//!
//! Drives the atomic transition procedures on behalf of the collaborators
//! that own the cadence: worker pools claim jobs, the scheduler promotes due
//! jobs, operators requeue the dead set. Nothing here runs on its own timer.

use std::sync::Arc;

use tracing::{debug, info, warn};

use redwork_models::Job;

use crate::clock::{Clock, SystemClock};
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::keys::KeyNamespace;
use crate::metrics;
use crate::store::{ClaimedJob, JobStore, PromoteOutcome, RedisStore};

/// Batch size used by [`Client::retry_all_dead_jobs`].
pub const DEAD_REQUEUE_BATCH: u64 = 1000;

/// Sorted sets holding jobs that are not yet ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZSet {
    Scheduled,
    Retry,
}

impl ZSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZSet::Scheduled => "scheduled",
            ZSet::Retry => "retry",
        }
    }
}

/// Totals from [`Client::promote_all_due`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromoteSummary {
    pub requeued: u64,
    pub dead: u64,
}

impl PromoteSummary {
    pub fn total(&self) -> u64 {
        self.requeued + self.dead
    }
}

/// A sorted-set member decoded along with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredJob {
    pub score: f64,
    pub job: Job,
}

pub struct Client {
    keys: KeyNamespace,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
}

impl Client {
    pub fn new(namespace: impl Into<String>, store: Arc<dyn JobStore>) -> Self {
        Self {
            keys: KeyNamespace::new(namespace),
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a Redis-backed client.
    pub fn from_config(config: &QueueConfig) -> QueueResult<Self> {
        config.validate()?;
        let store = RedisStore::open(&config.redis_url)?;
        Ok(Self::new(config.namespace.clone(), Arc::new(store)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn keys(&self) -> &KeyNamespace {
        &self.keys
    }

    fn set_key(&self, set: ZSet) -> String {
        match set {
            ZSet::Scheduled => self.keys.scheduled(),
            ZSet::Retry => self.keys.retry(),
        }
    }

    fn known_queues(&self, job_names: &[&str]) -> Vec<String> {
        self.keys.job_queues(job_names.iter().copied())
    }

    /// Job names announced by any producer, sorted.
    pub async fn known_job_names(&self) -> QueueResult<Vec<String>> {
        let mut names = self.store.smembers(&self.keys.known_jobs()).await?;
        names.sort();
        Ok(names)
    }

    /// Move the oldest job from the first non-empty ready queue onto this
    /// pool's in-progress list. `job_names` is in priority order.
    pub async fn claim_next(
        &self,
        pool_id: &str,
        job_names: &[&str],
    ) -> QueueResult<Option<ClaimedJob>> {
        let pairs: Vec<(String, String)> = job_names
            .iter()
            .map(|name| (self.keys.jobs(name), self.keys.jobs_in_progress(pool_id, name)))
            .collect();
        self.store.claim_next(&pairs).await
    }

    /// Promote the earliest due job of `set`, if any.
    pub async fn promote_due(&self, set: ZSet, job_names: &[&str]) -> QueueResult<PromoteOutcome> {
        let now = self.clock.now_epoch_seconds();
        let outcome = self
            .store
            .promote_due(
                &self.set_key(set),
                &self.keys.dead(),
                &self.known_queues(job_names),
                &self.keys.jobs_prefix(),
                now,
            )
            .await?;

        metrics::record_promoted(set.as_str(), outcome);
        match outcome {
            PromoteOutcome::Dead => {
                warn!(set = set.as_str(), now, "Due job has no known queue; moved to dead set")
            }
            PromoteOutcome::Requeued => debug!(set = set.as_str(), now, "Promoted due job"),
            PromoteOutcome::Nothing => {}
        }
        Ok(outcome)
    }

    /// Promote due jobs until none remain or `max_iterations` is reached.
    pub async fn promote_all_due(
        &self,
        set: ZSet,
        job_names: &[&str],
        max_iterations: usize,
    ) -> QueueResult<PromoteSummary> {
        let mut summary = PromoteSummary::default();
        for _ in 0..max_iterations {
            match self.promote_due(set, job_names).await? {
                PromoteOutcome::Nothing => break,
                PromoteOutcome::Requeued => summary.requeued += 1,
                PromoteOutcome::Dead => summary.dead += 1,
            }
        }

        if summary.total() > 0 {
            info!(
                set = set.as_str(),
                requeued = summary.requeued,
                dead = summary.dead,
                "Promoted due jobs"
            );
        }
        Ok(summary)
    }

    /// Requeue up to `max` dead jobs that died at or before `cutoff`.
    pub async fn requeue_dead(&self, cutoff: i64, max: u64, job_names: &[&str]) -> QueueResult<u64> {
        let requeued = self
            .store
            .requeue_dead(
                &self.keys.dead(),
                &self.known_queues(job_names),
                &self.keys.jobs_prefix(),
                cutoff,
                max,
            )
            .await?;
        metrics::record_dead_requeued(requeued);
        debug!(cutoff, max, requeued, "Requeued dead jobs");
        Ok(requeued)
    }

    /// Requeue the whole dead set, in batches, as of now.
    pub async fn retry_all_dead_jobs(&self, job_names: &[&str]) -> QueueResult<u64> {
        let cutoff = self.clock.now_epoch_seconds();
        let mut total = 0;
        loop {
            let requeued = self
                .requeue_dead(cutoff, DEAD_REQUEUE_BATCH, job_names)
                .await?;
            total += requeued;
            if requeued < DEAD_REQUEUE_BATCH {
                break;
            }
        }
        info!(requeued = total, "Retried all dead jobs");
        Ok(total)
    }

    pub async fn scheduled_jobs(&self) -> QueueResult<Vec<ScoredJob>> {
        self.scored_jobs(&self.keys.scheduled()).await
    }

    pub async fn retry_jobs(&self) -> QueueResult<Vec<ScoredJob>> {
        self.scored_jobs(&self.keys.retry()).await
    }

    pub async fn dead_jobs(&self) -> QueueResult<Vec<ScoredJob>> {
        self.scored_jobs(&self.keys.dead()).await
    }

    /// Jobs waiting on a ready queue, newest first.
    pub async fn queued_jobs(&self, job_name: &str) -> QueueResult<Vec<Job>> {
        let raw = self.store.lrange(&self.keys.jobs(job_name), 0, -1).await?;
        raw.iter()
            .map(|payload| Job::from_json(payload).map_err(QueueError::from))
            .collect()
    }

    async fn scored_jobs(&self, key: &str) -> QueueResult<Vec<ScoredJob>> {
        let members = self.store.zrange_with_scores(key).await?;
        members
            .into_iter()
            .map(|(payload, score)| {
                let job = Job::from_json(&payload)?;
                Ok::<_, QueueError>(ScoredJob { score, job })
            })
            .collect()
    }
}
