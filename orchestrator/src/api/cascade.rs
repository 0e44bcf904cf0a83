use crate::cascade::{CascadeConfig, Orchestrator};
use crate::error::ApiError;
use crate::models::{CascadeRequest, Query};
use std::sync::Arc;
use tracing::info;
use warp::{Rejection, Reply};

pub async fn handle_cascade(
    request: CascadeRequest,
    orchestrator: Arc<Orchestrator>,
    cascade_config: Arc<CascadeConfig>,
) -> Result<impl Reply, Rejection> {
    let query = Query::from(request);
    info!(caller = ?query.caller, "Processing cascade query");

    let response = orchestrator
        .cascade(&query, &cascade_config)
        .await
        .map_err(|e| warp::reject::custom(ApiError::from(e)))?;

    Ok(warp::reply::json(&response))
}

#[cfg(test)]
mod tests {
    use crate::api::routes;
    use crate::cascade::{default_themes, CascadeConfig, Orchestrator, RateLimitPolicy};
    use crate::models::CascadeResponse;
    use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
    use crate::upstream::memory::{HashingEmbedder, InMemoryIndex};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use warp::http::StatusCode;

    fn setup(capacity: u32, policy: RateLimitPolicy) -> (Arc<Orchestrator>, Arc<CascadeConfig>) {
        let embedder = Arc::new(HashingEmbedder::new(32));
        let index = Arc::new(InMemoryIndex::new(32));
        for (id, text) in [
            ("d1", "factory fire halts production"),
            ("d2", "insurance exposure after the fire"),
        ] {
            index
                .insert(id, embedder.vectorize(text), BTreeMap::new())
                .unwrap();
        }
        let limiter = Arc::new(
            RateLimiter::new(RateLimiterConfig::per_interval(capacity, Duration::from_secs(60)))
                .unwrap(),
        );
        let orchestrator = Orchestrator::new(embedder, index, limiter).unwrap();
        let config = CascadeConfig::builder(default_themes())
            .on_rate_limited(policy)
            .build()
            .unwrap();
        (Arc::new(orchestrator), Arc::new(config))
    }

    #[tokio::test]
    async fn returns_one_result_per_theme() {
        let (orchestrator, config) = setup(10, RateLimitPolicy::Skip);
        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/cascade")
            .json(&serde_json::json!({ "query": "factory fire", "caller": "ops" }))
            .reply(&routes(orchestrator, config))
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: CascadeResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.theme_names(), vec!["Crisis", "Exposure", "Opportunity"]);
    }

    #[tokio::test]
    async fn blank_query_is_a_bad_request() {
        let (orchestrator, config) = setup(10, RateLimitPolicy::Skip);
        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/cascade")
            .json(&serde_json::json!({ "query": "   " }))
            .reply(&routes(orchestrator, config))
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn denied_request_maps_to_429_under_fail_policy() {
        let (orchestrator, config) = setup(1, RateLimitPolicy::Fail);
        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/cascade")
            .json(&serde_json::json!({ "query": "factory fire", "caller": "ops" }))
            .reply(&routes(orchestrator, config))
            .await;

        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
