pub mod aggregator;
pub mod orchestrator;
pub mod planner;
pub mod retriever;

pub use orchestrator::Orchestrator;
pub use planner::{default_themes, Theme};
pub use retriever::RetryPolicy;

use crate::error::ConfigError;
use crate::models::Query;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_TOP_K_PER_THEME: usize = 5;
pub const DEFAULT_MAX_CONCURRENT_THEMES: usize = 3;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const ANONYMOUS_CALLER: &str = "anonymous";

/// What to do when the rate limiter denies a theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitPolicy {
    /// Fail the whole request with `RateLimited`.
    Fail,
    /// Mark this theme skipped and continue with the others.
    #[default]
    Skip,
    /// Wait one refill interval, then try once more before skipping.
    Defer,
}

/// Which bucket a request draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitKey {
    Fixed(String),
    Caller,
}

impl RateLimitKey {
    pub fn resolve(&self, query: &Query) -> String {
        match self {
            RateLimitKey::Fixed(key) => key.clone(),
            RateLimitKey::Caller => query
                .caller
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(ANONYMOUS_CALLER)
                .to_string(),
        }
    }
}

/// Validated cascade settings. Only obtainable through [`CascadeConfigBuilder`].
#[derive(Debug, Clone)]
pub struct CascadeConfig {
    themes: Vec<Theme>,
    top_k_per_theme: usize,
    max_concurrent_themes: usize,
    rate_limit_key: RateLimitKey,
    on_rate_limited: RateLimitPolicy,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl CascadeConfig {
    pub fn builder(themes: Vec<Theme>) -> CascadeConfigBuilder {
        CascadeConfigBuilder {
            config: CascadeConfig {
                themes,
                top_k_per_theme: DEFAULT_TOP_K_PER_THEME,
                max_concurrent_themes: DEFAULT_MAX_CONCURRENT_THEMES,
                rate_limit_key: RateLimitKey::Caller,
                on_rate_limited: RateLimitPolicy::default(),
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
                retry: RetryPolicy::default(),
            },
        }
    }

    pub fn themes(&self) -> &[Theme] {
        &self.themes
    }

    pub fn top_k_per_theme(&self) -> usize {
        self.top_k_per_theme
    }

    pub fn max_concurrent_themes(&self) -> usize {
        self.max_concurrent_themes
    }

    pub fn rate_limit_key(&self) -> &RateLimitKey {
        &self.rate_limit_key
    }

    pub fn on_rate_limited(&self) -> RateLimitPolicy {
        self.on_rate_limited
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.themes.is_empty() {
            return Err(ConfigError::NoThemes);
        }
        let mut seen = HashSet::new();
        for theme in &self.themes {
            if theme.name().trim().is_empty() {
                return Err(ConfigError::BlankThemeName);
            }
            if !seen.insert(theme.name()) {
                return Err(ConfigError::DuplicateTheme(theme.name().to_string()));
            }
        }
        if self.top_k_per_theme == 0 {
            return Err(ConfigError::invalid("cascade.top_k_per_theme", "must be at least 1"));
        }
        if self.max_concurrent_themes == 0 {
            return Err(ConfigError::invalid(
                "cascade.max_concurrent_themes",
                "must be at least 1",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "cascade.request_timeout_ms",
                "must be greater than zero",
            ));
        }
        if let RateLimitKey::Fixed(key) = &self.rate_limit_key {
            if key.trim().is_empty() {
                return Err(ConfigError::invalid("cascade.rate_limit_key", "must not be blank"));
            }
        }
        Ok(())
    }
}

pub struct CascadeConfigBuilder {
    config: CascadeConfig,
}

impl CascadeConfigBuilder {
    pub fn top_k_per_theme(mut self, top_k: usize) -> Self {
        self.config.top_k_per_theme = top_k;
        self
    }

    pub fn max_concurrent_themes(mut self, limit: usize) -> Self {
        self.config.max_concurrent_themes = limit;
        self
    }

    pub fn rate_limit_key(mut self, key: RateLimitKey) -> Self {
        self.config.rate_limit_key = key;
        self
    }

    pub fn on_rate_limited(mut self, policy: RateLimitPolicy) -> Self {
        self.config.on_rate_limited = policy;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn build(self) -> Result<CascadeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CascadeConfig::builder(default_themes()).build().unwrap();
        assert_eq!(config.top_k_per_theme(), DEFAULT_TOP_K_PER_THEME);
        assert_eq!(config.on_rate_limited(), RateLimitPolicy::Skip);
    }

    #[test]
    fn rejects_empty_and_duplicate_themes() {
        assert!(matches!(
            CascadeConfig::builder(vec![]).build(),
            Err(ConfigError::NoThemes)
        ));

        let themes = vec![
            Theme::new("Crisis", |q| q.to_string()),
            Theme::new("Crisis", |q| q.to_uppercase()),
        ];
        assert!(matches!(
            CascadeConfig::builder(themes).build(),
            Err(ConfigError::DuplicateTheme(name)) if name == "Crisis"
        ));
    }

    #[test]
    fn rejects_zero_limits() {
        assert!(CascadeConfig::builder(default_themes())
            .top_k_per_theme(0)
            .build()
            .is_err());
        assert!(CascadeConfig::builder(default_themes())
            .max_concurrent_themes(0)
            .build()
            .is_err());
        assert!(CascadeConfig::builder(default_themes())
            .request_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn caller_key_falls_back_to_anonymous() {
        let key = RateLimitKey::Caller;
        assert_eq!(key.resolve(&Query::new("q")), ANONYMOUS_CALLER);
        assert_eq!(key.resolve(&Query::new("q").with_caller("  ")), ANONYMOUS_CALLER);
        assert_eq!(key.resolve(&Query::new("q").with_caller("team-a")), "team-a");
        assert_eq!(
            RateLimitKey::Fixed("shared".into()).resolve(&Query::new("q").with_caller("x")),
            "shared"
        );
    }
}
