use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Caller address: first valid `x-forwarded-for` entry, then `x-real-ip`,
/// then the socket peer.
pub fn extract_client_ip(headers: &HeaderMap, connect_info: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .find_map(|part| part.parse::<IpAddr>().ok())
        });

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<IpAddr>().ok())
        })
        .or_else(|| connect_info.map(|addr| addr.ip()))
}
