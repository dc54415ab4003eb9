//! Client identification for admission control.
//!
//! The identifier is the first hop of `X-Forwarded-For`, else the peer IP,
//! else `"unknown"`. It is a best-effort grouping key, not an identity:
//! any caller can forge the header.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::net::SocketAddr;

/// Identifier used when neither the header nor the peer address is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Extractor yielding the request's client identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl<S> FromRequestParts<S> for ClientId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(client_id_from(&parts.headers, peer)))
    }
}

/// Derive the identifier from request headers and the socket peer.
pub fn client_id_from(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());

    match (forwarded, peer) {
        (Some(hop), _) => hop.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_CLIENT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.7:51234".parse().unwrap())
    }

    #[test]
    fn first_forwarded_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"),
        );
        assert_eq!(client_id_from(&headers, peer()), "203.0.113.9");
    }

    #[test]
    fn falls_back_to_peer_ip() {
        assert_eq!(client_id_from(&HeaderMap::new(), peer()), "10.0.0.7");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        assert_eq!(client_id_from(&headers, peer()), "10.0.0.7");
    }

    #[test]
    fn unknown_without_any_source() {
        assert_eq!(client_id_from(&HeaderMap::new(), None), UNKNOWN_CLIENT);
    }
}
