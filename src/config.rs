//! Reporting configuration.
//!
//! One explicit configuration value is built per process (or per CLI
//! invocation) and passed down by parameter; nothing reads global state.
//! Every field has a default and can be overridden from `REPORTFORGE_*`
//! environment variables or the `with_*` builder methods.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration shared by the orchestrators, template engine and queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportingConfig {
    // Execution mode
    /// Complexity above which a generation is dispatched asynchronously.
    pub async_threshold: u64,
    /// Estimated seconds of work per complexity unit.
    pub seconds_per_complexity_unit: u64,

    // Deadlines
    /// TTL of the single-flight lock; renewed while a generation runs and
    /// never shorter than `generation_deadline`.
    pub lock_ttl: Duration,
    /// Overall deadline for one generation.
    pub generation_deadline: Duration,
    /// Timeout for a single collaborator call.
    pub collaborator_timeout: Duration,
    /// Timeout for rendering one chart.
    pub chart_timeout: Duration,
    /// Timeout for rendering all charts of one render call.
    pub chart_group_timeout: Duration,

    // Status projection and retention
    /// TTL of cached status projections.
    pub status_ttl: Duration,
    /// Finished reports kept per owner and report type.
    pub retention_keep: usize,

    // Concurrency
    /// Concurrent collaborator calls within one generation.
    pub max_concurrent_calls: usize,
    /// Concurrent detached generations.
    pub max_async_generations: usize,

    // Partial-failure policy
    /// Successful items required in a mandatory category.
    pub min_successful_items: usize,

    // FTO search
    /// Minimum structural similarity for FTO candidates.
    pub similarity_threshold: f64,
    /// Maximum candidates per molecule and jurisdiction.
    pub candidate_limit: usize,

    // Infrastructure
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    /// Root directory for filesystem artifact storage.
    pub storage_root: PathBuf,
    /// Directory of YAML template definitions.
    pub template_dir: Option<PathBuf>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            async_threshold: 10,
            seconds_per_complexity_unit: 6,
            lock_ttl: Duration::from_secs(30 * 60),
            generation_deadline: Duration::from_secs(30 * 60),
            collaborator_timeout: Duration::from_secs(60),
            chart_timeout: Duration::from_secs(10),
            chart_group_timeout: Duration::from_secs(30),
            status_ttl: Duration::from_secs(24 * 60 * 60),
            retention_keep: 20,
            max_concurrent_calls: 8,
            max_async_generations: 4,
            min_successful_items: 1,
            similarity_threshold: 0.65,
            candidate_limit: 50,
            redis_url: None,
            database_url: None,
            storage_root: PathBuf::from("./report-artifacts"),
            template_dir: None,
        }
    }
}

impl ReportingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the process environment and validates it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup and validates it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("REPORTFORGE_ASYNC_THRESHOLD") {
            config.async_threshold = parse_env_value(&val, "REPORTFORGE_ASYNC_THRESHOLD")?;
        }
        if let Some(val) = lookup("REPORTFORGE_SECONDS_PER_UNIT") {
            config.seconds_per_complexity_unit =
                parse_env_value(&val, "REPORTFORGE_SECONDS_PER_UNIT")?;
        }

        if let Some(val) = lookup("REPORTFORGE_LOCK_TTL_SECS") {
            config.lock_ttl = parse_env_secs(&val, "REPORTFORGE_LOCK_TTL_SECS")?;
        }
        if let Some(val) = lookup("REPORTFORGE_DEADLINE_SECS") {
            config.generation_deadline = parse_env_secs(&val, "REPORTFORGE_DEADLINE_SECS")?;
        }
        if let Some(val) = lookup("REPORTFORGE_COLLABORATOR_TIMEOUT_SECS") {
            config.collaborator_timeout =
                parse_env_secs(&val, "REPORTFORGE_COLLABORATOR_TIMEOUT_SECS")?;
        }
        if let Some(val) = lookup("REPORTFORGE_CHART_TIMEOUT_SECS") {
            config.chart_timeout = parse_env_secs(&val, "REPORTFORGE_CHART_TIMEOUT_SECS")?;
        }
        if let Some(val) = lookup("REPORTFORGE_CHART_GROUP_TIMEOUT_SECS") {
            config.chart_group_timeout =
                parse_env_secs(&val, "REPORTFORGE_CHART_GROUP_TIMEOUT_SECS")?;
        }
        if let Some(val) = lookup("REPORTFORGE_STATUS_TTL_SECS") {
            config.status_ttl = parse_env_secs(&val, "REPORTFORGE_STATUS_TTL_SECS")?;
        }

        if let Some(val) = lookup("REPORTFORGE_RETENTION_KEEP") {
            config.retention_keep = parse_env_value(&val, "REPORTFORGE_RETENTION_KEEP")?;
        }
        if let Some(val) = lookup("REPORTFORGE_MAX_CONCURRENT_CALLS") {
            config.max_concurrent_calls =
                parse_env_value(&val, "REPORTFORGE_MAX_CONCURRENT_CALLS")?;
        }
        if let Some(val) = lookup("REPORTFORGE_MAX_ASYNC_GENERATIONS") {
            config.max_async_generations =
                parse_env_value(&val, "REPORTFORGE_MAX_ASYNC_GENERATIONS")?;
        }
        if let Some(val) = lookup("REPORTFORGE_MIN_SUCCESSFUL_ITEMS") {
            config.min_successful_items =
                parse_env_value(&val, "REPORTFORGE_MIN_SUCCESSFUL_ITEMS")?;
        }
        if let Some(val) = lookup("REPORTFORGE_SIMILARITY_THRESHOLD") {
            config.similarity_threshold =
                parse_env_value(&val, "REPORTFORGE_SIMILARITY_THRESHOLD")?;
        }
        if let Some(val) = lookup("REPORTFORGE_CANDIDATE_LIMIT") {
            config.candidate_limit = parse_env_value(&val, "REPORTFORGE_CANDIDATE_LIMIT")?;
        }

        config.redis_url = lookup("REPORTFORGE_REDIS_URL").or_else(|| lookup("REDIS_URL"));
        config.database_url =
            lookup("REPORTFORGE_DATABASE_URL").or_else(|| lookup("DATABASE_URL"));
        if let Some(val) = lookup("REPORTFORGE_STORAGE_ROOT") {
            config.storage_root = PathBuf::from(val);
        }
        if let Some(val) = lookup("REPORTFORGE_TEMPLATE_DIR") {
            config.template_dir = Some(PathBuf::from(val));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("lock_ttl", self.lock_ttl),
            ("generation_deadline", self.generation_deadline),
            ("collaborator_timeout", self.collaborator_timeout),
            ("chart_timeout", self.chart_timeout),
            ("chart_group_timeout", self.chart_group_timeout),
            ("status_ttl", self.status_ttl),
        ];
        for (name, value) in positive {
            if value.is_zero() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.lock_ttl < self.generation_deadline {
            return Err(ConfigError::ValidationFailed(format!(
                "lock_ttl ({}s) must be at least generation_deadline ({}s)",
                self.lock_ttl.as_secs(),
                self.generation_deadline.as_secs()
            )));
        }
        if self.chart_timeout > self.chart_group_timeout {
            return Err(ConfigError::ValidationFailed(
                "chart_timeout must not exceed chart_group_timeout".to_string(),
            ));
        }
        if self.retention_keep == 0 {
            return Err(ConfigError::ValidationFailed(
                "retention_keep must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_calls == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrent_calls must be at least 1".to_string(),
            ));
        }
        if self.max_async_generations == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_async_generations must be at least 1".to_string(),
            ));
        }
        if self.min_successful_items == 0 {
            return Err(ConfigError::ValidationFailed(
                "min_successful_items must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::ValidationFailed(
                "similarity_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.candidate_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "candidate_limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_async_threshold(mut self, threshold: u64) -> Self {
        self.async_threshold = threshold;
        self
    }

    pub fn with_seconds_per_complexity_unit(mut self, seconds: u64) -> Self {
        self.seconds_per_complexity_unit = seconds;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_generation_deadline(mut self, deadline: Duration) -> Self {
        self.generation_deadline = deadline;
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    pub fn with_chart_timeouts(mut self, per_chart: Duration, group: Duration) -> Self {
        self.chart_timeout = per_chart;
        self.chart_group_timeout = group;
        self
    }

    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }

    pub fn with_retention_keep(mut self, keep: usize) -> Self {
        self.retention_keep = keep;
        self
    }

    pub fn with_max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max;
        self
    }

    pub fn with_max_async_generations(mut self, max: usize) -> Self {
        self.max_async_generations = max;
        self
    }

    pub fn with_min_successful_items(mut self, min: usize) -> Self {
        self.min_successful_items = min;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = Some(dir.into());
        self
    }
}

fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot parse '{}'", value),
    })
}

fn parse_env_secs(value: &str, key: &str) -> Result<Duration, ConfigError> {
    parse_env_value::<u64>(value, key).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ReportingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.async_threshold, 10);
        assert_eq!(config.min_successful_items, 1);
        assert_eq!(config.lock_ttl, Duration::from_secs(1800));
        assert!(config.lock_ttl >= config.generation_deadline);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ReportingConfig::from_lookup(lookup_from(&[
            ("REPORTFORGE_ASYNC_THRESHOLD", "25"),
            ("REPORTFORGE_LOCK_TTL_SECS", "60"),
            ("REPORTFORGE_DEADLINE_SECS", "45"),
            ("REPORTFORGE_SIMILARITY_THRESHOLD", "0.8"),
            ("DATABASE_URL", "postgres://localhost/reports"),
            ("REPORTFORGE_TEMPLATE_DIR", "/etc/reportforge/templates"),
        ]))
        .unwrap();

        assert_eq!(config.async_threshold, 25);
        assert_eq!(config.lock_ttl, Duration::from_secs(60));
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/reports")
        );
        assert_eq!(
            config.template_dir,
            Some(PathBuf::from("/etc/reportforge/templates"))
        );
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = ReportingConfig::from_lookup(lookup_from(&[(
            "REPORTFORGE_RETENTION_KEEP",
            "many",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(err.to_string().contains("REPORTFORGE_RETENTION_KEEP"));
    }

    #[test]
    fn test_validation_failures() {
        let config = ReportingConfig::default().with_min_successful_items(0);
        assert!(config.validate().is_err());

        let config = ReportingConfig::default()
            .with_chart_timeouts(Duration::from_secs(20), Duration::from_secs(5));
        assert!(config.validate().is_err());

        let config = ReportingConfig::default().with_similarity_threshold(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lock_ttl_must_cover_deadline() {
        let config = ReportingConfig::default()
            .with_lock_ttl(Duration::from_secs(15 * 60))
            .with_generation_deadline(Duration::from_secs(30 * 60));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lock_ttl"), "{}", err);

        let config = ReportingConfig::default()
            .with_lock_ttl(Duration::from_secs(120))
            .with_generation_deadline(Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }
}
