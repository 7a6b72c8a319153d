//! Shared data models for redwork.
//!
//! This crate provides Serde-serializable types for:
//! - Job records and their wire encoding
//! - Job arguments with typed accessors

pub mod args;
pub mod job;

// Re-export common types
pub use args::{ArgError, ArgValue, Args};
pub use job::{now_epoch_seconds, Job, JobId, UNKNOWN_JOB_ERROR};
