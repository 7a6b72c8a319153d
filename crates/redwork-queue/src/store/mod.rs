//! Backing store for queue state.
//!
//! `JobStore` is the connection collaborator: plain commands plus the atomic
//! transition procedures. Each atomic method must run as one indivisible
//! step against the store; [`RedisStore`] does this with Lua scripts and
//! [`MemoryStore`] with a single lock.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;

use crate::error::QueueResult;

/// A job taken by claim-next, with the list pair that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    /// Raw payload as stored
    pub payload: String,
    /// List it was popped from
    pub source: String,
    /// List it was pushed onto
    pub destination: String,
}

/// Result of one promote-due-job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    /// No member was due.
    Nothing,
    /// The due job was pushed onto its ready queue.
    Requeued,
    /// The job's queue is unknown; it was moved to the dead set.
    Dead,
}

impl PromoteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromoteOutcome::Nothing => "nothing",
            PromoteOutcome::Requeued => "ok",
            PromoteOutcome::Dead => "dead",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Push onto the head of a list.
    async fn lpush(&self, key: &str, payload: &str) -> QueueResult<()>;

    /// Add to a sorted set with the given score.
    async fn zadd(&self, key: &str, score: i64, payload: &str) -> QueueResult<()>;

    /// Add to an unordered set.
    async fn sadd(&self, key: &str, member: &str) -> QueueResult<()>;

    async fn smembers(&self, key: &str) -> QueueResult<Vec<String>>;

    /// List range with Redis index semantics (negative counts from the tail).
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>>;

    /// Whole sorted set, lowest score first.
    async fn zrange_with_scores(&self, key: &str) -> QueueResult<Vec<(String, f64)>>;

    /// Delete a key, returning whether it existed.
    async fn del(&self, key: &str) -> QueueResult<bool>;

    /// If `unique_key` is unset, set it (expiring after `ttl_secs`) and push
    /// `payload` onto `queue`. Returns false without writing otherwise.
    async fn enqueue_unique(
        &self,
        queue: &str,
        unique_key: &str,
        payload: &str,
        ttl_secs: u64,
    ) -> QueueResult<bool>;

    /// Like [`JobStore::enqueue_unique`], but adds to the sorted set
    /// `scheduled` at `score` instead of pushing onto a ready queue.
    async fn enqueue_unique_in(
        &self,
        scheduled: &str,
        unique_key: &str,
        score: i64,
        payload: &str,
        ttl_secs: u64,
    ) -> QueueResult<bool>;

    /// Pop the tail of the first non-empty source and push it onto the
    /// paired destination. Pairs are tried in order.
    async fn claim_next(&self, pairs: &[(String, String)]) -> QueueResult<Option<ClaimedJob>>;

    /// Move the lowest-scored member of `due_set` with score <= `now` onto
    /// `jobs_prefix + name` if that queue is in `known_queues`, stamping
    /// `t = now`; otherwise mark it failed and add it to `dead_set` at `now`.
    async fn promote_due(
        &self,
        due_set: &str,
        dead_set: &str,
        known_queues: &[String],
        jobs_prefix: &str,
        now: i64,
    ) -> QueueResult<PromoteOutcome>;

    /// Requeue up to `max` dead jobs with score <= `cutoff`, stripping their
    /// failure fields. Jobs with an unknown queue are re-added to the dead
    /// set at `cutoff + 5`. Returns the number requeued.
    async fn requeue_dead(
        &self,
        dead_set: &str,
        known_queues: &[String],
        jobs_prefix: &str,
        cutoff: i64,
        max: u64,
    ) -> QueueResult<u64>;
}
