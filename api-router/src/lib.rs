use api_state::ApiState;
use axum::{
    extract::FromRef,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    documents::{create_document, delete_document},
    health::{live, ready},
    search::search_knowledge,
    submissions::{create_submission, record_vote},
    thread_settings::{get_search_mode, set_search_mode},
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let protected = Router::new()
        .route("/search", post(search_knowledge))
        .route(
            "/threads/{thread_id}/search-mode",
            get(get_search_mode).put(set_search_mode),
        )
        .route("/submissions", post(create_submission))
        .route("/reviews/votes", post(record_vote))
        .route("/documents", post(create_document))
        .route("/documents/{id}", delete(delete_document))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}
