//! Protocol bridge between the client dialect and the backend dialect.
//!
//! # Responsibilities
//! - Terminate the inbound request into a [`PendingRequest`]
//! - Re-originate it as a backend request in the backend's protocol
//! - Translate the backend response back into the inbound framing
//!
//! # Design Decisions
//! - Never relays raw bytes: HTTP/1.1 framing and HTTP/2 frames are
//!   incompatible, so both directions go through parsed `http` types
//! - Hop-by-hop headers are dropped in both directions; hyper re-frames
//!   (chunked / content-length / DATA frames) for each side
//! - Client `Authorization`, `Host` and `Content-Length` are never trusted

use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    BoxError,
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        uri::PathAndQuery,
        Method, Request, Response, Uri, Version,
    },
};
use hyper::body::Body as HttpBody;

use crate::config::BackendProtocol;
use crate::error::ProxyError;
use crate::session::Session;

/// Connection-scoped headers that must not cross the bridge (RFC 9110 §7.6.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A fully terminated inbound request awaiting dispatch.
#[derive(Debug)]
pub struct PendingRequest {
    pub method: Method,
    pub path: PathAndQuery,
    pub headers: HeaderMap,
    pub body: Body,
    pub version: Version,
    pub received_at: Instant,
}

impl PendingRequest {
    /// Take ownership of an inbound request, dropping everything that is
    /// either connection-scoped or re-derived on the way out.
    pub fn from_inbound(request: Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::AUTHORIZATION);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let path = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Self {
            method: parts.method,
            path,
            headers,
            body,
            version: parts.version,
            received_at: Instant::now(),
        }
    }
}

/// The parts of a [`PendingRequest`] needed to build each attempt.
#[derive(Debug, Clone)]
pub struct OutboundHead {
    pub method: Method,
    pub path: PathAndQuery,
    pub headers: HeaderMap,
}

/// Build one backend request attempt.
///
/// `body` is the fully reconstructed inbound body, so `Content-Length` is
/// recomputed from it rather than copied from the client.
pub fn build_outbound(
    head: &OutboundHead,
    body: Bytes,
    session: &Session,
    authorization: HeaderValue,
    protocol: BackendProtocol,
) -> Result<Request<Body>, ProxyError> {
    let uri: Uri = format!("http://{}{}", session.authority(), head.path)
        .parse()
        .map_err(|e| ProxyError::BadRequest(format!("cannot build backend URI: {}", e)))?;

    let version = match protocol {
        BackendProtocol::Http1 => Version::HTTP_11,
        BackendProtocol::Http2 => Version::HTTP_2,
    };

    let mut headers = head.headers.clone();
    headers.insert(header::AUTHORIZATION, authorization);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

    let mut request = Request::builder()
        .method(head.method.clone())
        .uri(uri)
        .version(version)
        .body(Body::from(body))
        .map_err(|e| ProxyError::BadRequest(e.to_string()))?;
    *request.headers_mut() = headers;
    Ok(request)
}

/// Re-frame a backend response for the client.
///
/// Status, end-to-end headers and the body stream are preserved; the body is
/// passed through unchanged so the client sees the backend's bytes exactly.
pub fn translate_response<B>(response: Response<B>, inbound_version: Version) -> Response<Body>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    parts.version = inbound_version;
    Response::from_parts(parts, Body::new(body))
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Token;

    fn inbound() -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/graphql?op=ping")
            .header(header::HOST, "localhost:9999")
            .header(header::AUTHORIZATION, "Bearer client-secret")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, "999")
            .header(header::TRANSFER_ENCODING, "chunked")
            .header(header::CONNECTION, "keep-alive, x-hop")
            .header("x-hop", "1")
            .header("x-end-to-end", "kept")
            .body(Body::from("{\"query\":\"{ping}\"}"))
            .unwrap()
    }

    #[test]
    fn inbound_termination_drops_untrusted_headers() {
        let pending = PendingRequest::from_inbound(inbound());
        assert_eq!(pending.method, Method::POST);
        assert_eq!(pending.path.as_str(), "/graphql?op=ping");

        let h = &pending.headers;
        assert!(h.get(header::AUTHORIZATION).is_none());
        assert!(h.get(header::HOST).is_none());
        assert!(h.get(header::CONTENT_LENGTH).is_none());
        assert!(h.get(header::TRANSFER_ENCODING).is_none());
        assert!(h.get(header::CONNECTION).is_none());
        assert!(h.get("x-hop").is_none());
        assert_eq!(h.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(h.get("x-end-to-end").unwrap(), "kept");
    }

    #[test]
    fn outbound_carries_session_credentials() {
        let pending = PendingRequest::from_inbound(inbound());
        let head = OutboundHead {
            method: pending.method.clone(),
            path: pending.path.clone(),
            headers: pending.headers.clone(),
        };
        let session = Session::new("localhost", 59066, Token::new("abc"));
        let auth = HeaderValue::from_static("Basic YWJjOg==");
        let body = Bytes::from_static(b"{\"query\":\"{ping}\"}");

        let request =
            build_outbound(&head, body.clone(), &session, auth, BackendProtocol::Http2).unwrap();

        assert_eq!(request.uri(), "http://localhost:59066/graphql?op=ping");
        assert_eq!(request.version(), Version::HTTP_2);
        assert_eq!(request.headers()[header::AUTHORIZATION], "Basic YWJjOg==");
        assert_eq!(request.headers()[header::CONTENT_LENGTH], body.len().to_string().as_str());
        assert_eq!(request.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn outbound_http1_version() {
        let head = OutboundHead {
            method: Method::GET,
            path: PathAndQuery::from_static("/"),
            headers: HeaderMap::new(),
        };
        let session = Session::new("127.0.0.1", 8080, Token::new("t"));
        let request = build_outbound(
            &head,
            Bytes::new(),
            &session,
            HeaderValue::from_static("Basic dDo="),
            BackendProtocol::Http1,
        )
        .unwrap();
        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(request.headers()[header::CONTENT_LENGTH], "0");
    }
}
