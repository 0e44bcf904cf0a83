use crate::cascade::{CascadeConfig, Orchestrator};
use crate::error::handle_rejection;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

mod cascade;

pub fn routes(
    orchestrator: Arc<Orchestrator>,
    cascade_config: Arc<CascadeConfig>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let api = warp::path("api").and(warp::path("v1"));

    let cascade_route = api
        .and(warp::path("cascade"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(64 * 1024))
        .and(warp::body::json())
        .and(with_orchestrator(orchestrator))
        .and(with_config(cascade_config))
        .and_then(cascade::handle_cascade);

    cascade_route.recover(handle_rejection)
}

fn with_orchestrator(
    orchestrator: Arc<Orchestrator>,
) -> impl Filter<Extract = (Arc<Orchestrator>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || orchestrator.clone())
}

fn with_config(
    cascade_config: Arc<CascadeConfig>,
) -> impl Filter<Extract = (Arc<CascadeConfig>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || cascade_config.clone())
}
