//! Lua bodies of the atomic queue transitions.
//!
//! Worker pools and schedulers written against the same namespace run these
//! exact scripts, so the KEYS/ARGV layout documented on each one is part of
//! the wire contract.

/// Pop the tail of the first non-empty source list onto its paired destination.
///
/// `KEYS[1], KEYS[2]`, `KEYS[3], KEYS[4]`, ... -> (source, destination) pairs,
/// in priority order
///
/// Returns `{payload, source, destination}`, or nil if every source is empty.
pub const CLAIM_NEXT: &str = r#"
local res
local keylen = #KEYS
for i = 1, keylen, 2 do
  res = redis.call('rpoplpush', KEYS[i], KEYS[i + 1])
  if res then
    return {res, KEYS[i], KEYS[i + 1]}
  end
end
return nil
"#;

/// Move the earliest due member of a scheduled/retry set onto its ready queue.
///
/// `KEYS[1]` -> due set, eg `work:scheduled` or `work:retry`
/// `KEYS[2]` -> dead set, eg `work:dead`
/// `KEYS[3...]` -> known ready queues, eg `work:jobs:send_email`
/// `ARGV[1]` -> ready queue prefix, eg `work:jobs:`
/// `ARGV[2]` -> now, epoch seconds
///
/// Returns `'ok'` when requeued, `'dead'` when the job's queue is unknown,
/// nil when nothing is due.
pub const PROMOTE_DUE: &str = r#"
local res, j, queue
res = redis.call('zrangebyscore', KEYS[1], '-inf', ARGV[2], 'LIMIT', 0, 1)
if #res > 0 then
  j = cjson.decode(res[1])
  queue = ARGV[1] .. j['name']
  redis.call('zrem', KEYS[1], res[1])
  for i = 3, #KEYS do
    if KEYS[i] == queue then
      j['t'] = tonumber(ARGV[2])
      redis.call('lpush', queue, cjson.encode(j))
      return 'ok'
    end
  end
  j['err'] = 'unknown job when requeueing'
  j['failed_at'] = tonumber(ARGV[2])
  redis.call('zadd', KEYS[2], ARGV[2], cjson.encode(j))
  return 'dead'
end
return nil
"#;

/// Requeue up to N dead jobs whose failure time is at or before a cutoff.
///
/// `KEYS[1]` -> dead set, eg `work:dead`
/// `KEYS[2...]` -> known ready queues
/// `ARGV[1]` -> ready queue prefix
/// `ARGV[2]` -> cutoff, epoch seconds
/// `ARGV[3]` -> max number of jobs to requeue
///
/// Jobs with an unknown queue go back on the dead set at `cutoff + 5`.
/// Returns the number of jobs requeued.
pub const REQUEUE_DEAD: &str = r#"
local jobs = redis.call('zrangebyscore', KEYS[1], '-inf', ARGV[2], 'LIMIT', 0, ARGV[3])
local decoded = {}
for i = 1, #jobs do
  local j = cjson.decode(jobs[i])
  decoded[i] = {j, ARGV[1] .. j['name']}
end
local requeued = 0
for i = 1, #jobs do
  local j, queue = decoded[i][1], decoded[i][2]
  local found = false
  redis.call('zrem', KEYS[1], jobs[i])
  for k = 2, #KEYS do
    if KEYS[k] == queue then
      found = true
      break
    end
  end
  if found then
    j['t'] = tonumber(ARGV[2])
    j['fails'] = nil
    j['failed_at'] = nil
    j['err'] = nil
    redis.call('lpush', queue, cjson.encode(j))
    requeued = requeued + 1
  else
    j['err'] = 'unknown job when requeueing'
    j['failed_at'] = tonumber(ARGV[2])
    redis.call('zadd', KEYS[1], tonumber(ARGV[2]) + 5, cjson.encode(j))
  end
end
return requeued
"#;

/// Set the uniqueness key if absent and push onto the ready queue.
///
/// `KEYS[1]` -> ready queue
/// `KEYS[2]` -> uniqueness key
/// `ARGV[1]` -> job payload
/// `ARGV[2]` -> uniqueness key expiry, seconds
///
/// Returns `'ok'` when enqueued, `'dup'` otherwise.
pub const ENQUEUE_UNIQUE: &str = r#"
if redis.call('set', KEYS[2], '1', 'NX', 'EX', ARGV[2]) then
  redis.call('lpush', KEYS[1], ARGV[1])
  return 'ok'
end
return 'dup'
"#;

/// Set the uniqueness key if absent and add to the scheduled set.
///
/// `KEYS[1]` -> scheduled set
/// `KEYS[2]` -> uniqueness key
/// `ARGV[1]` -> job payload
/// `ARGV[2]` -> uniqueness key expiry, seconds
/// `ARGV[3]` -> run at, epoch seconds
///
/// Returns `'ok'` when scheduled, `'dup'` otherwise.
pub const ENQUEUE_UNIQUE_IN: &str = r#"
if redis.call('set', KEYS[2], '1', 'NX', 'EX', ARGV[2]) then
  redis.call('zadd', KEYS[1], ARGV[3], ARGV[1])
  return 'ok'
end
return 'dup'
"#;

/// Cooldown added to the cutoff when a dead job still has no known queue.
pub const UNKNOWN_JOB_COOLDOWN_SECS: i64 = 5;
