pub mod invocations;
pub mod webhooks;

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::responses::JsonResponse;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    JsonResponse::success("ok")
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/recruiting", post(webhooks::recruiting_webhook))
        .route("/api/invocations", get(invocations::list_invocations))
        .route("/api/invocations/{id}", get(invocations::get_invocation))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock_invocation_repository::MockInvocationRepository;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router(test_support::state(&MockInvocationRepository::default()));

        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "ok");
    }
}
