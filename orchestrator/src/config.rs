use crate::cascade::{
    default_themes, CascadeConfig, RateLimitKey, RateLimitPolicy, RetryPolicy, Theme,
    DEFAULT_MAX_CONCURRENT_THEMES, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TOP_K_PER_THEME,
};
use crate::error::ConfigError;
use crate::rate_limiter::RateLimiterConfig;
use crate::upstream::http::HttpClientSettings;
use serde::Deserialize;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "CASCADE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "cascade.toml";
pub const ENV_PREFIX: &str = "CASCADE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamMode {
    Http,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub upstream_mode: UpstreamMode,
    pub embedding_service_url: String,
    pub vector_db_service_url: String,
    pub embedding_dimension: usize,
    pub upstream_timeout_ms: u64,
    pub upstream_requests_per_second: Option<u32>,
    pub redis_url: Option<String>,
    pub embedding_cache_ttl_secs: u64,
    pub rate_limit: RateLimitSettings,
    pub cascade: CascadeSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            upstream_mode: UpstreamMode::Http,
            embedding_service_url: "http://localhost:8002".to_string(),
            vector_db_service_url: "http://localhost:8003".to_string(),
            embedding_dimension: 384,
            upstream_timeout_ms: 5_000,
            upstream_requests_per_second: None,
            redis_url: None,
            embedding_cache_ttl_secs: 3_600,
            rate_limit: RateLimitSettings::default(),
            cascade: CascadeSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub capacity: u32,
    pub refill_interval_ms: u64,
    /// Defaults to `capacity`, i.e. a full reset every interval.
    pub refill_amount: Option<u32>,
    pub idle_retention_secs: Option<u64>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 30,
            refill_interval_ms: 60_000,
            refill_amount: None,
            idle_retention_secs: Some(900),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeSettings {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CascadeSettings {
    pub top_k_per_theme: usize,
    pub max_concurrent_themes: usize,
    /// Fixed bucket shared by every request; unset means one bucket per caller.
    pub rate_limit_key: Option<String>,
    pub on_rate_limited: RateLimitPolicy,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub themes: Vec<ThemeSettings>,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            top_k_per_theme: DEFAULT_TOP_K_PER_THEME,
            max_concurrent_themes: DEFAULT_MAX_CONCURRENT_THEMES,
            rate_limit_key: None,
            on_rate_limited: RateLimitPolicy::default(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            max_retries: RetryPolicy::default().max_retries,
            retry_backoff_ms: RetryPolicy::default().base_backoff.as_millis() as u64,
            themes: Vec::new(),
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `CASCADE_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse settings from a TOML document. Missing keys take defaults.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks on top-level settings. Rate limit and cascade sections are
    /// validated when converted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::invalid("embedding_dimension", "must be at least 1"));
        }
        if self.upstream_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "upstream_timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn rate_limiter(&self) -> Result<RateLimiterConfig, ConfigError> {
        let limits = &self.rate_limit;
        let config = RateLimiterConfig {
            capacity: limits.capacity,
            refill_interval: Duration::from_millis(limits.refill_interval_ms),
            refill_amount: limits.refill_amount.unwrap_or(limits.capacity),
            idle_retention: limits.idle_retention_secs.map(Duration::from_secs),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn cascade(&self) -> Result<CascadeConfig, ConfigError> {
        let settings = &self.cascade;
        let themes = if settings.themes.is_empty() {
            default_themes()
        } else {
            settings
                .themes
                .iter()
                .map(|t| Theme::from_pattern(t.name.clone(), &t.template))
                .collect::<Result<Vec<_>, _>>()?
        };

        let rate_limit_key = match &settings.rate_limit_key {
            Some(key) => RateLimitKey::Fixed(key.clone()),
            None => RateLimitKey::Caller,
        };

        CascadeConfig::builder(themes)
            .top_k_per_theme(settings.top_k_per_theme)
            .max_concurrent_themes(settings.max_concurrent_themes)
            .rate_limit_key(rate_limit_key)
            .on_rate_limited(settings.on_rate_limited)
            .request_timeout(Duration::from_millis(settings.request_timeout_ms))
            .retry(RetryPolicy {
                max_retries: settings.max_retries,
                base_backoff: Duration::from_millis(settings.retry_backoff_ms),
            })
            .build()
    }

    pub fn http_client(&self) -> HttpClientSettings {
        HttpClientSettings {
            timeout: Duration::from_millis(self.upstream_timeout_ms),
            requests_per_second: self.upstream_requests_per_second,
        }
    }
}
