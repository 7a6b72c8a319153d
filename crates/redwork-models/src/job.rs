//! Job record and its wire encoding.
//!
//! The JSON field names (`name`, `id`, `t`, `args`, `unique`, `fails`, `err`,
//! `failed_at`) are shared with every worker, scheduler and dashboard reading
//! the same namespace and must not change.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::args::{ArgError, Args};

/// Error message written by the transition scripts when a job's queue is unknown.
pub const UNKNOWN_JOB_ERROR: &str = "unknown job when requeueing";

/// Current time in epoch seconds.
pub fn now_epoch_seconds() -> i64 {
    Utc::now().timestamp()
}

/// Opaque job identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of work.
///
/// Failure fields are only ever written by the queue transition scripts and
/// the worker pool; producers leave them zeroed. Absent fields decode as
/// their zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Handler queue name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Fresh for every submission
    #[serde(default)]
    pub id: JobId,

    /// Epoch seconds the job was enqueued, or became ready after promotion
    #[serde(rename = "t", default)]
    pub enqueued_at: i64,

    #[serde(default, skip_serializing_if = "Args::is_empty")]
    pub args: Args,

    /// Submitted through the dedup path
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub fails: i64,

    #[serde(rename = "err", default, skip_serializing_if = "String::is_empty")]
    pub last_err: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub failed_at: i64,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Job {
    /// Create a new job with a fresh ID.
    pub fn new(name: impl Into<String>, args: Args, now: i64) -> Self {
        Self {
            name: name.into(),
            id: JobId::new(),
            enqueued_at: now,
            args,
            ..Default::default()
        }
    }

    /// Create a new job marked for the dedup path.
    pub fn unique(name: impl Into<String>, args: Args, now: i64) -> Self {
        Self {
            unique: true,
            ..Self::new(name, args, now)
        }
    }

    /// Canonical wire encoding.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn is_failed(&self) -> bool {
        self.fails > 0 || self.failed_at != 0 || !self.last_err.is_empty()
    }

    /// Strip failure tracking, as done when a dead job is requeued.
    pub fn clear_failure(&mut self) {
        self.fails = 0;
        self.last_err.clear();
        self.failed_at = 0;
    }

    /// Record a failure without touching the fail count.
    pub fn mark_dead(&mut self, err: impl Into<String>, now: i64) {
        self.last_err = err.into();
        self.failed_at = now;
    }

    pub fn arg_string(&self, key: &str) -> Result<&str, ArgError> {
        self.args.string(key)
    }

    pub fn arg_i64(&self, key: &str) -> Result<i64, ArgError> {
        self.args.i64(key)
    }

    pub fn arg_f64(&self, key: &str) -> Result<f64, ArgError> {
        self.args.f64(key)
    }

    pub fn arg_bool(&self, key: &str) -> Result<bool, ArgError> {
        self.args.bool(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failed_job() -> Job {
        Job {
            name: "send_email".to_string(),
            id: JobId::from_string("abc123"),
            enqueued_at: 1_700_000_000,
            args: Args::new().with("addr", "a@b.com").with("n", 3),
            unique: true,
            fails: 2,
            last_err: "boom".to_string(),
            failed_at: 1_700_000_100,
        }
    }

    #[test]
    fn test_job_id_is_random() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_wire_field_names() {
        let raw = failed_job().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "send_email",
                "id": "abc123",
                "t": 1_700_000_000,
                "args": {"addr": "a@b.com", "n": 3},
                "unique": true,
                "fails": 2,
                "err": "boom",
                "failed_at": 1_700_000_100
            })
        );
    }

    #[test]
    fn test_round_trip_both_directions() {
        let job = failed_job();
        let raw = job.to_json().unwrap();
        let decoded = Job::from_json(&raw).unwrap();
        assert_eq!(decoded, job);
        assert_eq!(decoded.to_json().unwrap(), raw);
    }

    #[test]
    fn test_round_trip_structured_args() {
        let args = Args::new()
            .with(
                "user",
                json!({"id": 42, "tags": ["a", "b"], "profile": {"locale": "en", "tz": null}}),
            )
            .with("ids", json!([1, 2.5, null, "x", [true, false]]))
            .with("ratio", 0.75)
            .with("tiny", -3.0e-7)
            .with("big", i64::MAX)
            .with("nothing", serde_json::Value::Null);

        for unique in [false, true] {
            let job = Job {
                unique,
                ..Job::new("import", args.clone(), 1_700_000_000)
            };
            let raw = job.to_json().unwrap();
            let decoded = Job::from_json(&raw).unwrap();
            assert_eq!(decoded, job);
            assert_eq!(decoded.to_json().unwrap(), raw);
        }
    }

    #[test]
    fn test_encoding_of_decoded_payload_is_stable() {
        let raw = r#"{"name":"x","id":"1","t":5,"args":{"a":[1,{"b":null}],"f":1.5,"s":"q"},"fails":1,"err":"e","failed_at":6}"#;
        let job = Job::from_json(raw).unwrap();
        assert_eq!(job.args.get("f"), Some(&json!(1.5)));
        assert_eq!(job.to_json().unwrap(), raw);
    }

    #[test]
    fn test_fresh_job_omits_optional_fields() {
        let job = Job::new("cleanup", Args::new(), 10);
        let value: serde_json::Value = serde_json::from_str(&job.to_json().unwrap()).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(obj.contains_key("name"));
        assert!(obj.contains_key("id"));
        assert_eq!(obj["t"], json!(10));
        assert!(!job.is_failed());
    }

    #[test]
    fn test_decode_tolerates_missing_and_unknown_fields() {
        let job = Job::from_json(r#"{"name":"x","id":"1","t":5,"args":null,"extra":true}"#).unwrap();
        assert_eq!(job.name, "x");
        assert!(job.args.is_empty());
        assert!(!job.unique);
        assert_eq!(job.fails, 0);
        assert!(job.last_err.is_empty());

        let bare = Job::from_json("{}").unwrap();
        assert_eq!(bare, Job::default());
    }

    #[test]
    fn test_clear_failure_and_mark_dead() {
        let mut job = failed_job();
        job.clear_failure();
        assert!(!job.is_failed());
        assert_eq!(job.name, "send_email");

        job.mark_dead(UNKNOWN_JOB_ERROR, 99);
        assert!(job.is_failed());
        assert_eq!(job.last_err, UNKNOWN_JOB_ERROR);
        assert_eq!(job.failed_at, 99);
        assert_eq!(job.fails, 0);
    }

    #[test]
    fn test_unique_constructor() {
        let job = Job::unique("x", Args::new().with("k", "v"), 1);
        assert!(job.unique);
        assert_eq!(job.arg_string("k").unwrap(), "v");
    }
}
