use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::db::invocation_repository::RECENT_INVOCATIONS_LIMIT;
use crate::responses::JsonResponse;
use crate::state::AppState;

pub async fn list_invocations(State(app_state): State<AppState>) -> Response {
    match app_state
        .invocation_repo
        .list_recent(RECENT_INVOCATIONS_LIMIT)
        .await
    {
        Ok(invocations) => (
            StatusCode::OK,
            Json(json!({ "success": true, "invocations": invocations })),
        )
            .into_response(),
        Err(e) => {
            error!(?e, "failed to list invocations");
            JsonResponse::server_error("Failed to load invocations").into_response()
        }
    }
}

pub async fn get_invocation(
    State(app_state): State<AppState>,
    Path(invocation_id): Path<String>,
) -> Response {
    let Ok(invocation_id) = Uuid::parse_str(&invocation_id) else {
        return JsonResponse::not_found("Invocation not found").into_response();
    };

    match app_state.invocation_repo.find(invocation_id).await {
        Ok(Some(invocation)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "invocation": invocation })),
        )
            .into_response(),
        Ok(None) => JsonResponse::not_found("Invocation not found").into_response(),
        Err(e) => {
            error!(?e, %invocation_id, "failed to load invocation");
            JsonResponse::server_error("Failed to load invocation").into_response()
        }
    }
}
