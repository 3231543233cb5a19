use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::cookie::owner_cookie;
use crate::handlers::{
    delete_user_urls_handler, health_handler, list_user_urls_handler, ping_handler,
    redirect_handler, shorten_batch_handler, shorten_json_handler, shorten_text_handler,
    stats_handler,
};
use crate::state::AppState;

pub struct App {}

impl App {
    /// Builds the HTTP router with request tracing and the owner cookie layer.
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/", post(shorten_text_handler))
            .route("/{hash}", get(redirect_handler))
            .route("/ping", get(ping_handler))
            .route("/health", get(health_handler))
            .nest(
                "/api",
                Router::new()
                    .route("/shorten", post(shorten_json_handler))
                    .route("/shorten/batch", post(shorten_batch_handler))
                    .route(
                        "/user/urls",
                        get(list_user_urls_handler).delete(delete_user_urls_handler),
                    )
                    .route("/internal/stats", get(stats_handler)),
            )
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::from_fn_with_state(state.clone(), owner_cookie)),
            )
            .with_state(state)
    }
}
