use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub fn create_app(state: AppState) -> Router {
    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.max_request_body()));

    crate::routes::configure_routes(&state)
        .layer(layers)
        .with_state(state)
}
