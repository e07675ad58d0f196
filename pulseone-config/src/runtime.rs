use crate::error::{ConfigError, Result};
use crate::util::{parse_bool_var, parse_u32_var};
use serde::Deserialize;

/// Bounded-mailbox sizing for the pipeline's asynchronous sinks (§4.3).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub live_cache_mailbox_capacity: usize,
    pub historian_mailbox_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            live_cache_mailbox_capacity: 1024,
            historian_mailbox_capacity: 4096,
        }
    }
}

/// Live Value Cache external-mirror tuning (§4.3, §6).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub redis_url: Option<String>,
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            default_ttl_secs: 300,
        }
    }
}

/// Historian batcher tuning (§4.3).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistorianConfig {
    pub database_url: Option<String>,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub retry_backoff_ms: u64,
    pub max_retry_backoff_ms: u64,
}

impl Default for HistorianConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            batch_size: 200,
            flush_interval_ms: 500,
            retry_backoff_ms: 1000,
            max_retry_backoff_ms: 30_000,
        }
    }
}

/// Read-only introspection HTTP surface (§6).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IntrospectionConfig {
    pub host: String,
    pub port: u16,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8088,
        }
    }
}

/// Ambient, process-level tuning knobs for the PulseOne runtime. This is
/// distinct from the configuration-persistence layer named out of scope
/// in §1 — it never carries device/point/rule definitions, only the
/// runtime's own dials.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    pub pipeline: PipelineConfig,
    pub cache: CacheConfig,
    pub historian: HistorianConfig,
    pub introspection: IntrospectionConfig,
    pub dev_mode: bool,
}

impl RuntimeConfig {
    /// Loads defaults, then an optional `pulseone.toml`, then
    /// `PULSEONE_*` environment overrides — the teacher's
    /// `Config::from_env` layering, generalized with the `config` crate.
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("pulseone").required(false))
            .add_source(
                config::Environment::with_prefix("PULSEONE")
                    .separator("__")
                    .try_parsing(true),
            );
        let mut runtime: RuntimeConfig = builder.build()?.try_deserialize()?;
        runtime.apply_legacy_env_overrides();
        Ok(runtime)
    }

    /// A handful of single-variable overrides kept for operational
    /// convenience, mirroring the teacher's mixed `Config::from_env` +
    /// CLI-arg override style.
    fn apply_legacy_env_overrides(&mut self) {
        if let Some(url) = std::env::var("REDIS_URL").ok() {
            self.cache.redis_url = Some(url);
        }
        if let Some(url) = std::env::var("DATABASE_URL").ok() {
            self.historian.database_url = Some(url);
        }
        if let Some(ttl) = parse_u32_var("PULSEONE_CACHE_TTL_SECS") {
            self.cache.default_ttl_secs = ttl as u64;
        }
        if let Some(dev) = parse_bool_var("PULSEONE_DEV_MODE") {
            self.dev_mode = dev;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.live_cache_mailbox_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "pipeline.live_cache_mailbox_capacity",
                reason: "must be nonzero".to_string(),
            });
        }
        if self.historian.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "historian.batch_size",
                reason: "must be nonzero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.cache.default_ttl_secs, 300);
    }

    #[test]
    fn rejects_zero_mailbox_capacity() {
        let mut cfg = RuntimeConfig::default();
        cfg.pipeline.live_cache_mailbox_capacity = 0;
        assert!(cfg.validate().is_err());
    }
}
