#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use routes::{
    jobs::{cancel_job, create_job, get_job, list_jobs},
    liveness::live,
    readiness::ready,
};

pub mod api_state;
pub mod error;
mod routes;

/// Upper bound for a create-job body: prompt, overrides and image urls.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Probes (for k8s/systemd)
    let probes = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let jobs = Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    probes.merge(jobs)
}
