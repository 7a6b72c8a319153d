//! Redis-backed store.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::debug;

use super::{ClaimedJob, JobStore, PromoteOutcome};
use crate::error::{QueueError, QueueResult};
use crate::scripts;

/// Compiled transition scripts; each hashes its body once.
struct Scripts {
    claim_next: Script,
    promote_due: Script,
    requeue_dead: Script,
    enqueue_unique: Script,
    enqueue_unique_in: Script,
}

impl Scripts {
    fn new() -> Self {
        Self {
            claim_next: Script::new(scripts::CLAIM_NEXT),
            promote_due: Script::new(scripts::PROMOTE_DUE),
            requeue_dead: Script::new(scripts::REQUEUE_DEAD),
            enqueue_unique: Script::new(scripts::ENQUEUE_UNIQUE),
            enqueue_unique_in: Script::new(scripts::ENQUEUE_UNIQUE_IN),
        }
    }
}

/// Store talking to Redis. A connection is opened per call and dropped when
/// the call returns, on success and error alike.
pub struct RedisStore {
    client: redis::Client,
    scripts: Scripts,
}

impl RedisStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            scripts: Scripts::new(),
        }
    }

    pub fn open(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(client))
    }

    async fn connection(&self) -> QueueResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

fn unique_reply(reply: &str) -> QueueResult<bool> {
    match reply {
        "ok" => Ok(true),
        "dup" => Ok(false),
        other => Err(QueueError::unexpected_reply(format!(
            "unique enqueue returned {other:?}"
        ))),
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn lpush(&self, key: &str, payload: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(key, payload).await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, score: i64, payload: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        conn.zadd::<_, _, _, ()>(key, payload, score).await?;
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        conn.sadd::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> QueueResult<Vec<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.smembers(key).await?)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.lrange(key, start, stop).await?)
    }

    async fn zrange_with_scores(&self, key: &str) -> QueueResult<Vec<(String, f64)>> {
        let mut conn = self.connection().await?;
        Ok(conn.zrange_withscores(key, 0, -1).await?)
    }

    async fn del(&self, key: &str) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn enqueue_unique(
        &self,
        queue: &str,
        unique_key: &str,
        payload: &str,
        ttl_secs: u64,
    ) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let reply: String = self
            .scripts
            .enqueue_unique
            .key(queue)
            .key(unique_key)
            .arg(payload)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        unique_reply(&reply)
    }

    async fn enqueue_unique_in(
        &self,
        scheduled: &str,
        unique_key: &str,
        score: i64,
        payload: &str,
        ttl_secs: u64,
    ) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let reply: String = self
            .scripts
            .enqueue_unique_in
            .key(scheduled)
            .key(unique_key)
            .arg(payload)
            .arg(ttl_secs)
            .arg(score)
            .invoke_async(&mut conn)
            .await?;
        unique_reply(&reply)
    }

    async fn claim_next(&self, pairs: &[(String, String)]) -> QueueResult<Option<ClaimedJob>> {
        if pairs.is_empty() {
            return Ok(None);
        }

        let mut conn = self.connection().await?;
        let mut invocation = self.scripts.claim_next.prepare_invoke();
        for (source, destination) in pairs {
            invocation.key(source).key(destination);
        }

        let reply: Option<(String, String, String)> = invocation.invoke_async(&mut conn).await?;
        Ok(reply.map(|(payload, source, destination)| {
            debug!(source = %source, destination = %destination, "Claimed job");
            ClaimedJob {
                payload,
                source,
                destination,
            }
        }))
    }

    async fn promote_due(
        &self,
        due_set: &str,
        dead_set: &str,
        known_queues: &[String],
        jobs_prefix: &str,
        now: i64,
    ) -> QueueResult<PromoteOutcome> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = self
            .scripts
            .promote_due
            .key(due_set)
            .key(dead_set)
            .key(known_queues)
            .arg(jobs_prefix)
            .arg(now)
            .invoke_async(&mut conn)
            .await?;

        match reply.as_deref() {
            None => Ok(PromoteOutcome::Nothing),
            Some("ok") => Ok(PromoteOutcome::Requeued),
            Some("dead") => Ok(PromoteOutcome::Dead),
            Some(other) => Err(QueueError::unexpected_reply(format!(
                "promote-due returned {other:?}"
            ))),
        }
    }

    async fn requeue_dead(
        &self,
        dead_set: &str,
        known_queues: &[String],
        jobs_prefix: &str,
        cutoff: i64,
        max: u64,
    ) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let requeued: u64 = self
            .scripts
            .requeue_dead
            .key(dead_set)
            .key(known_queues)
            .arg(jobs_prefix)
            .arg(cutoff)
            .arg(max)
            .invoke_async(&mut conn)
            .await?;
        Ok(requeued)
    }
}
