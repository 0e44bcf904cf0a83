use std::time::Duration;
use warp::http::Method;

/// Headers a browser client sends with a cascade request.
const CASCADE_HEADERS: [&str; 4] = ["Content-Type", "Accept", "Authorization", "X-Request-Id"];

/// How long browsers may cache a preflight answer.
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(600);

/// CORS for the cascade API: JSON POSTs from any origin, GETs for health and metrics.
pub fn cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_headers(CASCADE_HEADERS)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .max_age(PREFLIGHT_MAX_AGE)
}
