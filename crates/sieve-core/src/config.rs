//! Pipeline configuration
//!
//! Loaded from TOML or built in code. Every section has defaults, so an
//! empty file is a valid configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Worker pool limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers scoring at once; further submissions queue
    pub max_concurrent_workers: usize,
    /// Hard lifetime of one worker
    pub worker_lifetime_ms: u64,
    /// Minimum delay between two spawns for the same document
    pub spawn_spacing_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: 4,
            worker_lifetime_ms: 60_000,
            spawn_spacing_ms: 0,
        }
    }
}

impl PoolConfig {
    /// Worker lifetime bound
    #[inline]
    #[must_use]
    pub fn worker_lifetime(&self) -> Duration {
        Duration::from_millis(self.worker_lifetime_ms)
    }

    /// Spawn spacing, `None` when disabled
    #[inline]
    #[must_use]
    pub fn spawn_spacing(&self) -> Option<Duration> {
        (self.spawn_spacing_ms > 0).then(|| Duration::from_millis(self.spawn_spacing_ms))
    }
}

/// What happens when a fragment would breach the global ceiling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CeilingPolicy {
    /// Withhold the offending criterion and continue with the rest
    #[default]
    WithholdCriterion,
    /// Fail the whole run before any content is handed out
    AbortRun,
}

/// Whether analyzers that quote their input may do so
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum AnalyzerEchoPolicy {
    /// Reports carry rule ids and positions, never text
    #[default]
    Redacted,
    /// Reports may quote offending sentences
    Echo {
        /// Count echoing analyzers' fragments as metered exposure
        metered: bool,
    },
}

impl AnalyzerEchoPolicy {
    /// Whether excerpts are allowed
    #[inline]
    #[must_use]
    pub fn allows_excerpts(self) -> bool {
        matches!(self, AnalyzerEchoPolicy::Echo { .. })
    }

    /// Whether echoing analyzers are metered
    #[inline]
    #[must_use]
    pub fn is_metered(self) -> bool {
        matches!(self, AnalyzerEchoPolicy::Echo { metered: true })
    }
}

/// Exposure limits and accounting rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposurePolicy {
    /// Largest fraction of the document all metered consumers may see together.
    /// Independent of the per-criterion bounds and never derived from them.
    pub global_ceiling: f64,
    /// Reaction to a ceiling breach
    pub ceiling_policy: CeilingPolicy,
    /// Grammar excerpt handling
    pub analyzer_echo: AnalyzerEchoPolicy,
}

impl Default for ExposurePolicy {
    fn default() -> Self {
        Self {
            global_ceiling: 1.0,
            ceiling_policy: CeilingPolicy::default(),
            analyzer_echo: AnalyzerEchoPolicy::default(),
        }
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker pool
    pub pool: PoolConfig,
    /// Exposure accounting
    pub exposure: ExposurePolicy,
    /// Fixed shuffle seed. Leave unset in production: a fixed seed is
    /// reused across runs, which lets repeated runs be correlated.
    pub shuffle_seed: Option<u64>,
    /// Logging
    pub telemetry: TelemetryConfig,
}

impl PipelineConfig {
    /// Parse and validate TOML
    ///
    /// # Errors
    /// [`ConfigError::Toml`] or [`ConfigError::Invalid`]
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// I/O, parse or validation errors
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check limits
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_concurrent_workers == 0 {
            return Err(ConfigError::invalid(
                "pool.max_concurrent_workers",
                "must be at least 1",
            ));
        }
        if self.pool.worker_lifetime_ms == 0 {
            return Err(ConfigError::invalid(
                "pool.worker_lifetime_ms",
                "must be positive",
            ));
        }
        let ceiling = self.exposure.global_ceiling;
        if !(ceiling.is_finite() && ceiling > 0.0 && ceiling <= 1.0) {
            return Err(ConfigError::invalid(
                "exposure.global_ceiling",
                format!("{ceiling} outside (0, 1]"),
            ));
        }
        Ok(())
    }

    /// Replace the pool section
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the concurrency cap
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.pool.max_concurrent_workers = workers;
        self
    }

    /// Set the worker lifetime bound
    #[must_use]
    pub fn with_worker_lifetime(mut self, lifetime: Duration) -> Self {
        self.pool.worker_lifetime_ms = u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the inter-spawn delay
    #[must_use]
    pub fn with_spawn_spacing(mut self, spacing: Duration) -> Self {
        self.pool.spawn_spacing_ms = u64::try_from(spacing.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the global exposure ceiling
    #[must_use]
    pub fn with_global_ceiling(mut self, ceiling: f64) -> Self {
        self.exposure.global_ceiling = ceiling;
        self
    }

    /// Set the ceiling policy
    #[must_use]
    pub fn with_ceiling_policy(mut self, policy: CeilingPolicy) -> Self {
        self.exposure.ceiling_policy = policy;
        self
    }

    /// Set the analyzer echo policy
    #[must_use]
    pub fn with_analyzer_echo(mut self, policy: AnalyzerEchoPolicy) -> Self {
        self.exposure.analyzer_echo = policy;
        self
    }

    /// Pin the shuffle seed
    #[must_use]
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.pool.max_concurrent_workers, 4);
        assert_eq!(config.pool.worker_lifetime(), Duration::from_secs(60));
        assert_eq!(config.pool.spawn_spacing(), None);
        assert_eq!(config.exposure.global_ceiling, 1.0);
        assert_eq!(config.exposure.ceiling_policy, CeilingPolicy::WithholdCriterion);
        assert_eq!(config.exposure.analyzer_echo, AnalyzerEchoPolicy::Redacted);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(PipelineConfig::from_toml_str("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn parses_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            shuffle_seed = 42

            [pool]
            max_concurrent_workers = 8
            spawn_spacing_ms = 25

            [exposure]
            global_ceiling = 0.6
            ceiling_policy = "abort-run"

            [exposure.analyzer_echo]
            mode = "echo"
            metered = true
            "#,
        )
        .unwrap();

        assert_eq!(config.shuffle_seed, Some(42));
        assert_eq!(config.pool.max_concurrent_workers, 8);
        assert_eq!(config.pool.worker_lifetime_ms, 60_000);
        assert_eq!(config.pool.spawn_spacing(), Some(Duration::from_millis(25)));
        assert_eq!(config.exposure.ceiling_policy, CeilingPolicy::AbortRun);
        assert!(config.exposure.analyzer_echo.is_metered());
    }

    #[test]
    fn rejects_invalid_limits() {
        assert!(matches!(
            PipelineConfig::default().with_max_workers(0).validate(),
            Err(ConfigError::Invalid { field: "pool.max_concurrent_workers", .. })
        ));
        assert!(PipelineConfig::default().with_global_ceiling(0.0).validate().is_err());
        assert!(PipelineConfig::default().with_global_ceiling(1.5).validate().is_err());
        assert!(PipelineConfig::default()
            .with_worker_lifetime(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pool]\nmax_concurrent_workers = 2").unwrap();
        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pool.max_concurrent_workers, 2);
    }
}
