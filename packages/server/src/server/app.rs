//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::kernel::ServerDeps;
use crate::server::routes::{health_handler, media_callback_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
}

/// Build the Axum application router
pub fn build_app(deps: Arc<ServerDeps>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/media/callbacks", post(media_callback_handler))
        .layer(Extension(AppState { deps }))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::kernel::TestDependencies;

    #[tokio::test]
    async fn health_is_ok_with_a_reachable_store() {
        let test = TestDependencies::new();
        let app = build_app(Arc::new(test.deps()));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn garbage_callback_is_a_validation_error() {
        let test = TestDependencies::new();
        let app = build_app(Arc::new(test.deps()));

        let response = app
            .oneshot(
                Request::post("/media/callbacks")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(test.store.snapshot().await.callback_audits.len(), 1);
    }
}
