use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header::USER_AGENT, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Extension,
};
use tracing::info;

use crate::engine::InboundWebhook;
use crate::state::AppState;
use crate::utils::ip::extract_client_ip;
use crate::utils::request_id::{request_id_or_generate, REQUEST_ID_HEADER};

/// Inbound hire webhook from the recruiting system. The body is taken raw so
/// malformed JSON reaches the pipeline instead of failing extraction.
pub async fn recruiting_webhook(
    State(app_state): State<AppState>,
    connect_info: Option<Extension<ConnectInfo<SocketAddr>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let peer = connect_info.map(|Extension(ConnectInfo(addr))| addr);
    let request_id = request_id_or_generate(&headers);
    let remote_ip = extract_client_ip(&headers, peer).map(|ip| ip.to_string());
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    info!(%request_id, remote_ip = remote_ip.as_deref(), bytes = body.len(), "recruiting webhook received");

    let inbound = InboundWebhook {
        body: body.to_vec(),
        request_id: Some(request_id.clone()),
        remote_ip,
        user_agent,
    };
    let mut response = app_state.pipeline.handle(inbound).await.into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
