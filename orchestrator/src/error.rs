use thiserror::Error;
use warp::http::StatusCode;
use warp::{reject::Reject, Rejection, Reply};

/// Failures reported by an embedding provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("embedding quota exhausted: {0}")]
    Quota(String),

    #[error("embedding provider rejected credentials: {0}")]
    Auth(String),

    #[error("embedding provider unreachable: {0}")]
    Network(String),

    #[error("embedding provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether another attempt has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Quota(_) | ProviderError::Network(_))
    }
}

/// Failures reported by a vector index.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),

    #[error("vector index rejected the search: {0}")]
    Rejected(String),

    #[error("vector index returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl IndexError {
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexError::Unavailable(_))
    }
}

/// Misconfiguration detected while loading or validating settings.
///
/// These are raised at startup; a running orchestrator never produces them.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("at least one theme must be configured")]
    NoThemes,

    #[error("theme name must not be blank")]
    BlankThemeName,

    #[error("duplicate theme name: {0}")]
    DuplicateTheme(String),

    #[error("template for theme '{0}' has no {{query}} placeholder")]
    MissingPlaceholder(String),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("embedding provider produces {provider} dimensions but the index expects {index}")]
    DimensionMismatch { provider: usize, index: usize },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Request-level failures of a cascade.
///
/// Per-theme upstream failures do not show up here; they are reported as
/// failed slots inside the response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CascadeError {
    #[error("query text is empty")]
    InvalidQuery,

    #[error("rate limit exceeded while retrieving theme '{theme}'")]
    RateLimited { theme: String },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Cascade(#[from] CascadeError),
}

impl Reject for ApiError {}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(api_err) = err.find::<ApiError>() {
        let (code, message) = match api_err {
            ApiError::Cascade(CascadeError::InvalidQuery) => (StatusCode::BAD_REQUEST, "Bad request"),
            ApiError::Cascade(CascadeError::RateLimited { .. }) => {
                (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
            }
            ApiError::Cascade(CascadeError::UpstreamUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Upstream unavailable")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let json = warp::reply::json(&serde_json::json!({
            "error": message,
            "details": api_err.to_string(),
        }));

        Ok(warp::reply::with_status(json, code))
    } else {
        Err(err)
    }
}
