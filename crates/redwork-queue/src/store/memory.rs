//! In-process store.
//!
//! Holds lists, sets, sorted sets and expiring strings behind one lock. Every
//! trait method runs entirely under that lock, so the transition procedures
//! are as indivisible here as the Lua scripts are in Redis. Sorted-set ranges
//! order by score, then by member bytes, like Redis.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use redwork_models::UNKNOWN_JOB_ERROR;

use super::{ClaimedJob, JobStore, PromoteOutcome};
use crate::error::{QueueError, QueueResult};
use crate::config::MAX_UNIQUE_TTL_SECS;
use crate::scripts::UNKNOWN_JOB_COOLDOWN_SECS;

#[derive(Debug, Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, BTreeSet<String>>,
    zsets: HashMap<String, BTreeMap<String, f64>>,
    strings: HashMap<String, Instant>,
}

impl State {
    fn zadd(&mut self, key: &str, score: f64, member: String) {
        self.zsets
            .entry(key.to_string())
            .or_default()
            .insert(member, score);
    }

    fn zrem(&mut self, key: &str, member: &str) {
        if let Some(zset) = self.zsets.get_mut(key) {
            zset.remove(member);
            if zset.is_empty() {
                self.zsets.remove(key);
            }
        }
    }

    /// Members with score <= `max`, ascending, at most `limit` of them.
    fn zrange_by_score(&self, key: &str, max: f64, limit: usize) -> Vec<String> {
        let Some(zset) = self.zsets.get(key) else {
            return Vec::new();
        };
        let mut due: Vec<(&String, f64)> = zset
            .iter()
            .map(|(member, &score)| (member, score))
            .filter(|&(_, score)| score <= max)
            .collect();
        due.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        due.into_iter()
            .take(limit)
            .map(|(member, _)| member.clone())
            .collect()
    }

    fn lpush(&mut self, key: &str, payload: String) {
        self.lists
            .entry(key.to_string())
            .or_default()
            .push_front(payload);
    }

    fn rpop(&mut self, key: &str) -> Option<String> {
        let list = self.lists.get_mut(key)?;
        let popped = list.pop_back();
        if list.is_empty() {
            self.lists.remove(key);
        }
        popped
    }

    /// SET NX EX: true if the key was absent (or expired) and is now set.
    /// Expiries Redis would refuse are rejected the same way.
    fn set_nx(&mut self, key: &str, ttl_secs: u64) -> QueueResult<bool> {
        if ttl_secs == 0 || ttl_secs > MAX_UNIQUE_TTL_SECS {
            return Err(QueueError::store(format!(
                "invalid expire time {ttl_secs} in 'set' command"
            )));
        }
        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(ttl_secs))
            .ok_or_else(|| QueueError::store(format!("expire time {ttl_secs} out of range")))?;

        if let Some(&current) = self.strings.get(key) {
            if current > now {
                return Ok(false);
            }
        }
        self.strings.insert(key.to_string(), expires_at);
        Ok(true)
    }
}

/// Decoded payload plus the ready queue its name maps to.
fn decode_with_queue(raw: &str, jobs_prefix: &str) -> QueueResult<(Map<String, Value>, String)> {
    let decoded = serde_json::from_str::<Value>(raw)
        .map_err(|e| QueueError::store(format!("job payload is not valid JSON: {e}")))?;
    let job = match decoded {
        Value::Object(job) => job,
        _ => return Err(QueueError::store("job payload is not an object")),
    };
    let name = job
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| QueueError::store("job payload has no name"))?;
    let queue = format!("{jobs_prefix}{name}");
    Ok((job, queue))
}

fn mark_unknown(job: &mut Map<String, Value>, now: i64) {
    job.insert("err".to_string(), Value::from(UNKNOWN_JOB_ERROR));
    job.insert("failed_at".to_string(), Value::from(now));
}

/// Store kept entirely in memory, for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a string key (such as a uniqueness key) is currently set.
    pub async fn exists(&self, key: &str) -> bool {
        let state = self.state.lock().await;
        state
            .strings
            .get(key)
            .is_some_and(|&expires_at| expires_at > Instant::now())
    }

    /// Number of members of a sorted set.
    pub async fn zcard(&self, key: &str) -> usize {
        let state = self.state.lock().await;
        state.zsets.get(key).map_or(0, BTreeMap::len)
    }

    pub async fn llen(&self, key: &str) -> usize {
        let state = self.state.lock().await;
        state.lists.get(key).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn lpush(&self, key: &str, payload: &str) -> QueueResult<()> {
        self.state.lock().await.lpush(key, payload.to_string());
        Ok(())
    }

    async fn zadd(&self, key: &str, score: i64, payload: &str) -> QueueResult<()> {
        self.state
            .lock()
            .await
            .zadd(key, score as f64, payload.to_string());
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> QueueResult<()> {
        self.state
            .lock()
            .await
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn smembers(&self, key: &str) -> QueueResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>> {
        let state = self.state.lock().await;
        let Some(list) = state.lists.get(key) else {
            return Ok(Vec::new());
        };

        let len = list.len() as isize;
        let resolve = |i: isize| if i < 0 { len + i } else { i };
        let start = resolve(start).max(0);
        let stop = resolve(stop).min(len - 1);
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn zrange_with_scores(&self, key: &str) -> QueueResult<Vec<(String, f64)>> {
        let state = self.state.lock().await;
        let mut members: Vec<(String, f64)> = state
            .zsets
            .get(key)
            .map(|zset| zset.iter().map(|(m, &s)| (m.clone(), s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }

    async fn del(&self, key: &str) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        let existed = state.lists.remove(key).is_some()
            | state.sets.remove(key).is_some()
            | state.zsets.remove(key).is_some()
            | state.strings.remove(key).is_some();
        Ok(existed)
    }

    async fn enqueue_unique(
        &self,
        queue: &str,
        unique_key: &str,
        payload: &str,
        ttl_secs: u64,
    ) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        if !state.set_nx(unique_key, ttl_secs)? {
            return Ok(false);
        }
        state.lpush(queue, payload.to_string());
        Ok(true)
    }

    async fn enqueue_unique_in(
        &self,
        scheduled: &str,
        unique_key: &str,
        score: i64,
        payload: &str,
        ttl_secs: u64,
    ) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        if !state.set_nx(unique_key, ttl_secs)? {
            return Ok(false);
        }
        state.zadd(scheduled, score as f64, payload.to_string());
        Ok(true)
    }

    async fn claim_next(&self, pairs: &[(String, String)]) -> QueueResult<Option<ClaimedJob>> {
        let mut state = self.state.lock().await;
        for (source, destination) in pairs {
            if let Some(payload) = state.rpop(source) {
                state.lpush(destination, payload.clone());
                return Ok(Some(ClaimedJob {
                    payload,
                    source: source.clone(),
                    destination: destination.clone(),
                }));
            }
        }
        Ok(None)
    }

    async fn promote_due(
        &self,
        due_set: &str,
        dead_set: &str,
        known_queues: &[String],
        jobs_prefix: &str,
        now: i64,
    ) -> QueueResult<PromoteOutcome> {
        let mut state = self.state.lock().await;
        let Some(raw) = state.zrange_by_score(due_set, now as f64, 1).pop() else {
            return Ok(PromoteOutcome::Nothing);
        };

        let (mut job, queue) = decode_with_queue(&raw, jobs_prefix)?;
        state.zrem(due_set, &raw);

        if known_queues.contains(&queue) {
            job.insert("t".to_string(), Value::from(now));
            state.lpush(&queue, Value::Object(job).to_string());
            Ok(PromoteOutcome::Requeued)
        } else {
            mark_unknown(&mut job, now);
            state.zadd(dead_set, now as f64, Value::Object(job).to_string());
            Ok(PromoteOutcome::Dead)
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
        let mut state = self.state.lock().await;
        let limit = usize::try_from(max).unwrap_or(usize::MAX);
        let selected = state.zrange_by_score(dead_set, cutoff as f64, limit);

        let decoded = selected
            .iter()
            .map(|raw| decode_with_queue(raw, jobs_prefix))
            .collect::<QueueResult<Vec<_>>>()?;

        let mut requeued = 0;
        for (raw, (mut job, queue)) in selected.iter().zip(decoded) {
            state.zrem(dead_set, raw);
            if known_queues.contains(&queue) {
                job.insert("t".to_string(), Value::from(cutoff));
                job.remove("fails");
                job.remove("failed_at");
                job.remove("err");
                state.lpush(&queue, Value::Object(job).to_string());
                requeued += 1;
            } else {
                mark_unknown(&mut job, cutoff);
                let score = (cutoff + UNKNOWN_JOB_COOLDOWN_SECS) as f64;
                state.zadd(dead_set, score, Value::Object(job).to_string());
            }
        }
        Ok(requeued)
    }
}
