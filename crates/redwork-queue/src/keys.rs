//! Redis key naming scheme.
//!
//! Every process sharing a namespace (producers, worker pools, schedulers,
//! dashboards) must derive byte-identical keys, so the formats here are a
//! wire contract.

use redwork_models::Args;

/// Separator appended to a non-empty namespace.
const SEPARATOR: char = ':';

/// Derives all keys for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    /// Normalized prefix, either empty or ending in `:`
    prefix: String,
}

impl KeyNamespace {
    pub fn new(namespace: impl Into<String>) -> Self {
        let mut prefix = namespace.into();
        if !prefix.is_empty() && !prefix.ends_with(SEPARATOR) {
            prefix.push(SEPARATOR);
        }
        Self { prefix }
    }

    /// The normalized namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn known_jobs(&self) -> String {
        format!("{}known_jobs", self.prefix)
    }

    /// `<ns>jobs:`; append a job name to get its ready queue.
    pub fn jobs_prefix(&self) -> String {
        format!("{}jobs:", self.prefix)
    }

    /// Ready queue for `job_name`.
    pub fn jobs(&self, job_name: &str) -> String {
        format!("{}jobs:{}", self.prefix, job_name)
    }

    /// In-progress list of one worker pool for `job_name`.
    pub fn jobs_in_progress(&self, pool_id: &str, job_name: &str) -> String {
        format!("{}:{}:inprogress", self.jobs(job_name), pool_id)
    }

    pub fn retry(&self) -> String {
        format!("{}retry", self.prefix)
    }

    pub fn dead(&self) -> String {
        format!("{}dead", self.prefix)
    }

    pub fn scheduled(&self) -> String {
        format!("{}scheduled", self.prefix)
    }

    pub fn worker_observation(&self, worker_id: &str) -> String {
        format!("{}worker:{}", self.prefix, worker_id)
    }

    pub fn worker_pools(&self) -> String {
        format!("{}worker_pools", self.prefix)
    }

    pub fn heartbeat(&self, pool_id: &str) -> String {
        format!("{}worker_pools:{}", self.prefix, pool_id)
    }

    pub fn last_periodic_enqueue(&self) -> String {
        format!("{}last_periodic_enqueue", self.prefix)
    }

    /// Uniqueness guard for a job name and argument set.
    ///
    /// Arguments are rendered as compact, key-sorted JSON with no further
    /// normalization: `{"n":1}` and `{"n":1.0}` are different keys.
    pub fn unique_job(&self, job_name: &str, args: &Args) -> Result<String, serde_json::Error> {
        let mut key = format!("{}unique:{}:", self.prefix, job_name);
        if !args.is_empty() {
            key.push_str(&args.canonical_json()?);
        }
        Ok(key)
    }

    /// Ready-queue keys for a list of job names, in the same order.
    pub fn job_queues<'a>(&self, job_names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        job_names.into_iter().map(|name| self.jobs(name)).collect()
    }
}
