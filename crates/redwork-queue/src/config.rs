//! Queue configuration.

use std::time::Duration;

use crate::error::{QueueError, QueueResult};
use crate::known_jobs::KNOWN_JOBS_TTL_SECS;

/// Default expiry of a uniqueness key (24 hours).
pub const UNIQUE_TTL_SECS: u64 = 86_400;

/// Largest uniqueness-key expiry accepted. Redis stores `EX` as an absolute
/// millisecond deadline in an i64; half that range leaves room for the clock.
pub const MAX_UNIQUE_TTL_SECS: u64 = (i64::MAX / 1000 / 2) as u64;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key namespace shared by every producer and worker of one deployment
    pub namespace: String,
    /// How long a job name stays announced before it is re-added to known_jobs
    pub known_jobs_ttl: Duration,
    /// Expiry of uniqueness keys, in case the worker pool never clears them
    pub unique_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            namespace: "redwork".to_string(),
            known_jobs_ttl: Duration::from_secs(KNOWN_JOBS_TTL_SECS as u64),
            unique_ttl: Duration::from_secs(UNIQUE_TTL_SECS),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            namespace: lookup("REDWORK_NAMESPACE").unwrap_or(defaults.namespace),
            known_jobs_ttl: lookup("REDWORK_KNOWN_JOBS_TTL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.known_jobs_ttl),
            unique_ttl: lookup("REDWORK_UNIQUE_TTL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.unique_ttl),
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Reject settings no store can be opened with.
    pub fn validate(&self) -> QueueResult<()> {
        if self.redis_url.trim().is_empty() {
            return Err(QueueError::config("REDIS_URL is empty"));
        }
        if self.known_jobs_ttl.is_zero() {
            return Err(QueueError::config("known_jobs TTL must be at least one second"));
        }
        if self.unique_ttl.as_secs() > MAX_UNIQUE_TTL_SECS {
            return Err(QueueError::config(format!(
                "unique TTL must be at most {MAX_UNIQUE_TTL_SECS} seconds"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.namespace, "redwork");
        assert_eq!(config.known_jobs_ttl, Duration::from_secs(300));
        assert_eq!(config.unique_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn test_from_lookup_overrides_and_ignores_garbage() {
        let env: HashMap<&str, &str> = [
            ("REDIS_URL", "redis://cache:6380/2"),
            ("REDWORK_NAMESPACE", "myapp-work"),
            ("REDWORK_KNOWN_JOBS_TTL_SECS", "60"),
            ("REDWORK_UNIQUE_TTL_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = QueueConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.redis_url, "redis://cache:6380/2");
        assert_eq!(config.namespace, "myapp-work");
        assert_eq!(config.known_jobs_ttl, Duration::from_secs(60));
        assert_eq!(config.unique_ttl, Duration::from_secs(UNIQUE_TTL_SECS));
    }

    #[test]
    fn test_validate() {
        assert!(QueueConfig::default().validate().is_ok());

        let config = QueueConfig {
            redis_url: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(QueueError::Config(_))));

        let config = QueueConfig {
            known_jobs_ttl: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_unique_ttl() {
        let config = QueueConfig {
            unique_ttl: Duration::from_secs(u64::MAX),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(QueueError::Config(_))));

        let config = QueueConfig {
            unique_ttl: Duration::from_secs(MAX_UNIQUE_TTL_SECS + 1),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = QueueConfig {
            unique_ttl: Duration::from_secs(MAX_UNIQUE_TTL_SECS),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
