use crate::handlers;
use crate::AppState;
use axum::{
    routing::{post, put},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

/// Builds the HTTP router with tracing and panic recovery applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(handlers::register_handler))
        .route("/auth/activate", put(handlers::activate_handler))
        .route(
            "/auth/resend-activation-token",
            post(handlers::resend_activation_token_handler),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
