//! Redis-backed background job queue core.
//!
//! This crate provides:
//! - Job submission: immediate, delayed, and deduplicated ([`Enqueuer`])
//! - The atomic state transitions shared with worker pools and schedulers
//!   (claim-next, promote-due, bulk-requeue-dead) behind [`JobStore`]
//! - A maintenance [`Client`] that drives those transitions
//!
//! Redis keys and the job payload encoding are a wire contract; see [`keys`]
//! and [`redwork_models::Job`].

pub mod client;
pub mod clock;
pub mod config;
pub mod enqueuer;
pub mod error;
pub mod keys;
pub mod known_jobs;
pub mod logging;
pub mod metrics;
pub mod scripts;
pub mod store;

pub use client::{Client, PromoteSummary, ScoredJob, ZSet, DEAD_REQUEUE_BATCH};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{QueueConfig, MAX_UNIQUE_TTL_SECS, UNIQUE_TTL_SECS};
pub use enqueuer::Enqueuer;
pub use error::{QueueError, QueueResult};
pub use keys::KeyNamespace;
pub use known_jobs::{KnownJobRegistry, KNOWN_JOBS_TTL_SECS};
pub use store::{ClaimedJob, JobStore, MemoryStore, PromoteOutcome, RedisStore};

pub use redwork_models::{Args, Job, JobId};
