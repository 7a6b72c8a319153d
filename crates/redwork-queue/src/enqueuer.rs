//! Producer API.
//!
//! An `Enqueuer` is cheap to share: wrap it in an `Arc` and call it from any
//! number of tasks. Each call builds and serializes its own `Job`, issues its
//! store writes, and then makes sure the job name is listed in `known_jobs`.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use redwork_models::{Args, Job};

use crate::clock::{Clock, SystemClock};
use crate::config::{QueueConfig, MAX_UNIQUE_TTL_SECS, UNIQUE_TTL_SECS};
use crate::error::{QueueError, QueueResult};
use crate::keys::KeyNamespace;
use crate::known_jobs::{KnownJobRegistry, KNOWN_JOBS_TTL_SECS};
use crate::metrics;
use crate::store::{JobStore, RedisStore};

/// Submits jobs to a namespace.
pub struct Enqueuer {
    keys: KeyNamespace,
    store: Arc<dyn JobStore>,
    known_jobs: KnownJobRegistry,
    clock: Arc<dyn Clock>,
    unique_ttl_secs: u64,
}

impl Enqueuer {
    /// Create an enqueuer for `namespace` on top of `store`.
    pub fn new(namespace: impl Into<String>, store: Arc<dyn JobStore>) -> Self {
        Self {
            keys: KeyNamespace::new(namespace),
            store,
            known_jobs: KnownJobRegistry::new(KNOWN_JOBS_TTL_SECS),
            clock: Arc::new(SystemClock),
            unique_ttl_secs: UNIQUE_TTL_SECS,
        }
    }

    /// Create a Redis-backed enqueuer.
    pub fn from_config(config: &QueueConfig) -> QueueResult<Self> {
        config.validate()?;
        let store = RedisStore::open(&config.redis_url)?;
        Ok(Self::new(config.namespace.clone(), Arc::new(store))
            .with_known_jobs_ttl(config.known_jobs_ttl)
            .with_unique_ttl(config.unique_ttl))
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::from_config(&QueueConfig::from_env())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Expiry applied to uniqueness keys, clamped to what Redis accepts.
    pub fn with_unique_ttl(mut self, ttl: Duration) -> Self {
        self.unique_ttl_secs = ttl.as_secs().clamp(1, MAX_UNIQUE_TTL_SECS);
        self
    }

    /// Replace the known_jobs debounce window. Drops any recorded announcements.
    pub fn with_known_jobs_ttl(mut self, ttl: Duration) -> Self {
        let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.known_jobs = KnownJobRegistry::new(secs);
        self
    }

    pub fn keys(&self) -> &KeyNamespace {
        &self.keys
    }

    /// Push a job onto the head of its ready queue.
    ///
    /// Returns the job as written. If the job was queued but the known_jobs
    /// announcement failed, the store error is returned even though the job
    /// will run.
    pub async fn enqueue(&self, job_name: &str, args: Args) -> QueueResult<Job> {
        validate_job_name(job_name)?;
        let job = Job::new(job_name, args, self.clock.now_epoch_seconds());
        let payload = job.to_json()?;

        self.store.lpush(&self.keys.jobs(job_name), &payload).await?;
        metrics::record_enqueued("immediate");
        debug!(job_name, job_id = %job.id, "Enqueued job");

        self.add_to_known_jobs(job_name).await?;
        Ok(job)
    }

    /// Add a job to the scheduled set, due `delay_secs` from now. A delay of
    /// zero or less makes it due immediately.
    pub async fn enqueue_in(&self, job_name: &str, delay_secs: i64, args: Args) -> QueueResult<Job> {
        validate_job_name(job_name)?;
        let now = self.clock.now_epoch_seconds();
        let job = Job::new(job_name, args, now);
        let payload = job.to_json()?;
        let run_at = now.saturating_add(delay_secs);

        self.store
            .zadd(&self.keys.scheduled(), run_at, &payload)
            .await?;
        metrics::record_enqueued("scheduled");
        debug!(job_name, job_id = %job.id, run_at, "Scheduled job");

        self.add_to_known_jobs(job_name).await?;
        Ok(job)
    }

    /// Enqueue unless an identical job (same name and arguments) is still
    /// outstanding.
    ///
    /// Returns `true` if the job was queued, `false` if it was a duplicate.
    /// The uniqueness check and the push happen in one atomic script.
    pub async fn enqueue_unique(&self, job_name: &str, args: Args) -> QueueResult<bool> {
        validate_job_name(job_name)?;
        let unique_key = self.keys.unique_job(job_name, &args)?;
        let job = Job::unique(job_name, args, self.clock.now_epoch_seconds());
        let payload = job.to_json()?;

        self.add_to_known_jobs(job_name).await?;

        let queued = self
            .store
            .enqueue_unique(
                &self.keys.jobs(job_name),
                &unique_key,
                &payload,
                self.unique_ttl_secs,
            )
            .await?;
        self.record_unique_result(job_name, &job, queued, "unique");
        Ok(queued)
    }

    /// Schedule unless an identical job is still outstanding.
    pub async fn enqueue_unique_in(
        &self,
        job_name: &str,
        delay_secs: i64,
        args: Args,
    ) -> QueueResult<bool> {
        validate_job_name(job_name)?;
        let unique_key = self.keys.unique_job(job_name, &args)?;
        let now = self.clock.now_epoch_seconds();
        let job = Job::unique(job_name, args, now);
        let payload = job.to_json()?;

        self.add_to_known_jobs(job_name).await?;

        let queued = self
            .store
            .enqueue_unique_in(
                &self.keys.scheduled(),
                &unique_key,
                now.saturating_add(delay_secs),
                &payload,
                self.unique_ttl_secs,
            )
            .await?;
        self.record_unique_result(job_name, &job, queued, "unique_scheduled");
        Ok(queued)
    }

    fn record_unique_result(&self, job_name: &str, job: &Job, queued: bool, mode: &'static str) {
        if queued {
            metrics::record_enqueued(mode);
            debug!(job_name, job_id = %job.id, mode, "Enqueued unique job");
        } else {
            metrics::record_unique_duplicate();
            debug!(job_name, job_id = %job.id, mode, "Duplicate unique job rejected");
        }
    }

    async fn add_to_known_jobs(&self, job_name: &str) -> QueueResult<()> {
        let now = self.clock.now_epoch_seconds();
        if !self.known_jobs.needs_announce(job_name, now) {
            return Ok(());
        }

        self.store.sadd(&self.keys.known_jobs(), job_name).await?;
        self.known_jobs.mark_announced(job_name, now);
        metrics::record_known_job_announced();
        Ok(())
    }
}

fn validate_job_name(job_name: &str) -> QueueResult<()> {
    if job_name.is_empty() {
        return Err(QueueError::InvalidJobName(job_name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{MemoryStore, MockJobStore};

    const NOW: i64 = 1_700_000_000;

    fn memory_enqueuer() -> (Arc<MemoryStore>, Arc<ManualClock>, Enqueuer) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let enqueuer = Enqueuer::new("work", store.clone()).with_clock(clock.clone());
        (store, clock, enqueuer)
    }

    fn email_args() -> Args {
        Args::new().with("addr", "a@b.com")
    }

    #[tokio::test]
    async fn test_enqueue_end_to_end() {
        let (store, _, enqueuer) = memory_enqueuer();

        let job = enqueuer.enqueue("send_email", email_args()).await.unwrap();
        assert_eq!(job.enqueued_at, NOW);

        let queued = store.lrange("work:jobs:send_email", 0, -1).await.unwrap();
        assert_eq!(queued.len(), 1);
        let decoded = Job::from_json(&queued[0]).unwrap();
        assert_eq!(decoded.name, "send_email");
        assert_eq!(decoded.args, email_args());
        assert!(!decoded.unique);
        assert_eq!(decoded, job);

        let known = store.smembers("work:known_jobs").await.unwrap();
        assert_eq!(known, vec!["send_email"]);
    }

    #[tokio::test]
    async fn test_enqueue_pushes_newest_first() {
        let (store, _, enqueuer) = memory_enqueuer();
        let first = enqueuer.enqueue("a", Args::new()).await.unwrap();
        let second = enqueuer.enqueue("a", Args::new()).await.unwrap();
        assert_ne!(first.id, second.id);

        let queued = store.lrange("work:jobs:a", 0, -1).await.unwrap();
        assert_eq!(Job::from_json(&queued[0]).unwrap().id, second.id);
        assert_eq!(Job::from_json(&queued[1]).unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_known_jobs_debounce() {
        let clock = Arc::new(ManualClock::new(NOW));
        let mut mock = MockJobStore::new();
        mock.expect_lpush().times(3).returning(|_, _| Ok(()));
        mock.expect_sadd().times(2).returning(|_, _| Ok(()));

        let enqueuer = Enqueuer::new("work", Arc::new(mock)).with_clock(clock.clone());

        enqueuer.enqueue("email", Args::new()).await.unwrap();
        clock.advance(299);
        enqueuer.enqueue("email", Args::new()).await.unwrap();
        clock.advance(1);
        enqueuer.enqueue("email", Args::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_announce_failure_is_surfaced_and_retried() {
        let mut mock = MockJobStore::new();
        mock.expect_lpush().times(2).returning(|_, _| Ok(()));
        let mut sadd_calls = 0;
        mock.expect_sadd().times(2).returning(move |_, _| {
            sadd_calls += 1;
            if sadd_calls == 1 {
                Err(QueueError::store("connection reset"))
            } else {
                Ok(())
            }
        });

        let enqueuer = Enqueuer::new("work", Arc::new(mock))
            .with_clock(Arc::new(ManualClock::new(NOW)));

        let err = enqueuer.enqueue("email", Args::new()).await.unwrap_err();
        assert!(err.is_store());
        // The failed announcement was not recorded, so the next call retries it.
        enqueuer.enqueue("email", Args::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_failure_skips_announce() {
        let mut mock = MockJobStore::new();
        mock.expect_lpush()
            .times(1)
            .returning(|_, _| Err(QueueError::store("connection refused")));
        mock.expect_sadd().times(0);

        let enqueuer = Enqueuer::new("work", Arc::new(mock));
        let err = enqueuer.enqueue("email", Args::new()).await.unwrap_err();
        assert!(err.is_store());
    }

    #[tokio::test]
    async fn test_empty_name_rejected_before_store() {
        let enqueuer = Enqueuer::new("work", Arc::new(MockJobStore::new()));

        assert!(matches!(
            enqueuer.enqueue("", Args::new()).await,
            Err(QueueError::InvalidJobName(_))
        ));
        assert!(matches!(
            enqueuer.enqueue_in("", 10, Args::new()).await,
            Err(QueueError::InvalidJobName(_))
        ));
        assert!(matches!(
            enqueuer.enqueue_unique("", Args::new()).await,
            Err(QueueError::InvalidJobName(_))
        ));
    }

    #[tokio::test]
    async fn test_enqueue_in_scores_by_delay() {
        let (store, _, enqueuer) = memory_enqueuer();

        enqueuer.enqueue_in("x", 0, Args::new()).await.unwrap();
        enqueuer.enqueue_in("y", 60, Args::new()).await.unwrap();
        enqueuer.enqueue_in("z", -30, Args::new()).await.unwrap();

        let scheduled = store.zrange_with_scores("work:scheduled").await.unwrap();
        let scores: Vec<(String, f64)> = scheduled
            .into_iter()
            .map(|(raw, score)| (Job::from_json(&raw).unwrap().name, score))
            .collect();
        assert_eq!(
            scores,
            vec![
                ("z".to_string(), (NOW - 30) as f64),
                ("x".to_string(), NOW as f64),
                ("y".to_string(), (NOW + 60) as f64),
            ]
        );
        assert_eq!(store.llen("work:jobs:x").await, 0);

        let mut known = store.smembers("work:known_jobs").await.unwrap();
        known.sort();
        assert_eq!(known, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn test_enqueue_unique_dedup() {
        let (store, _, enqueuer) = memory_enqueuer();

        assert!(enqueuer.enqueue_unique("send_email", email_args()).await.unwrap());
        assert!(!enqueuer.enqueue_unique("send_email", email_args()).await.unwrap());
        assert_eq!(store.llen("work:jobs:send_email").await, 1);

        // Different args are a different job.
        assert!(enqueuer
            .enqueue_unique("send_email", Args::new().with("addr", "c@d.com"))
            .await
            .unwrap());

        // The worker pool clears the key when the job completes.
        let unique_key = enqueuer
            .keys()
            .unique_job("send_email", &email_args())
            .unwrap();
        assert!(store.del(&unique_key).await.unwrap());
        assert!(enqueuer.enqueue_unique("send_email", email_args()).await.unwrap());
        assert_eq!(store.llen("work:jobs:send_email").await, 3);

        let raw = store.lrange("work:jobs:send_email", 0, 0).await.unwrap().remove(0);
        assert!(Job::from_json(&raw).unwrap().unique);
    }

    #[tokio::test]
    async fn test_enqueue_unique_announces_even_for_duplicates() {
        let mut mock = MockJobStore::new();
        mock.expect_sadd().times(1).returning(|_, _| Ok(()));
        mock.expect_enqueue_unique()
            .times(2)
            .returning(|_, _, _, ttl| {
                assert_eq!(ttl, UNIQUE_TTL_SECS);
                Ok(false)
            });

        let enqueuer = Enqueuer::new("work", Arc::new(mock));
        assert!(!enqueuer.enqueue_unique("a", Args::new()).await.unwrap());
        assert!(!enqueuer.enqueue_unique("a", Args::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_enqueue_unique_in() {
        let (store, _, enqueuer) = memory_enqueuer();

        assert!(enqueuer.enqueue_unique_in("report", 120, email_args()).await.unwrap());
        assert!(!enqueuer.enqueue_unique_in("report", 5, email_args()).await.unwrap());
        // Immediate and scheduled unique submissions share one key.
        assert!(!enqueuer.enqueue_unique("report", email_args()).await.unwrap());

        let scheduled = store.zrange_with_scores("work:scheduled").await.unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].1, (NOW + 120) as f64);
        assert!(Job::from_json(&scheduled[0].0).unwrap().unique);
    }

    #[tokio::test]
    async fn test_concurrent_enqueue() {
        let store = Arc::new(MemoryStore::new());
        let enqueuer = Arc::new(Enqueuer::new("work", store.clone()));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let enqueuer = Arc::clone(&enqueuer);
                tokio::spawn(async move {
                    enqueuer
                        .enqueue("resize", Args::new().with("n", i))
                        .await
                        .map(|job| job.id)
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.llen("work:jobs:resize").await, 32);
        assert_eq!(store.smembers("work:known_jobs").await.unwrap(), vec!["resize"]);
    }

    #[test]
    fn test_unique_ttl_clamped() {
        let enqueuer = Enqueuer::new("w", Arc::new(MemoryStore::new()))
            .with_unique_ttl(Duration::from_millis(10));
        assert_eq!(enqueuer.unique_ttl_secs, 1);

        let enqueuer = Enqueuer::new("w", Arc::new(MemoryStore::new()))
            .with_unique_ttl(Duration::from_secs(u64::MAX));
        assert_eq!(enqueuer.unique_ttl_secs, MAX_UNIQUE_TTL_SECS);
    }

    #[tokio::test]
    async fn test_enqueue_unique_with_huge_ttl() {
        let store = Arc::new(MemoryStore::new());
        let enqueuer =
            Enqueuer::new("w", store.clone()).with_unique_ttl(Duration::from_secs(u64::MAX));

        assert!(enqueuer.enqueue_unique("a", Args::new()).await.unwrap());
        assert!(!enqueuer.enqueue_unique("a", Args::new()).await.unwrap());
        assert!(enqueuer.enqueue_unique_in("b", 10, Args::new()).await.unwrap());
        assert_eq!(store.llen("w:jobs:a").await, 1);
    }

    #[test]
    fn test_from_config_rejects_oversized_unique_ttl() {
        let config = QueueConfig {
            unique_ttl: Duration::from_secs(u64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            Enqueuer::from_config(&config),
            Err(QueueError::Config(_))
        ));
    }
}
