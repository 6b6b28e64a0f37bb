//! Bounded request body reconstruction, and the deadline on response bodies.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::BoxError;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use tokio::time::{Instant, Sleep};

use crate::error::ProxyError;

/// Read the whole inbound body, refusing to buffer more than `limit` bytes.
///
/// hyper has already decoded any chunked transfer-encoding, so the result is
/// the reconstructed payload regardless of how the client framed it.
pub async fn collect_bounded(body: Body, limit: usize) -> Result<Bytes, ProxyError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ProxyError::PayloadTooLarge { limit })
        }
        Err(e) => Err(ProxyError::BadRequest(format!(
            "failed to read request body: {}",
            e
        ))),
    }
}

/// The backend response body outlived the request deadline.
#[derive(Debug, thiserror::Error)]
#[error("backend response body not finished within {timeout_ms} ms")]
pub struct BodyDeadlineElapsed {
    pub timeout_ms: u64,
}

/// A response body that fails once the request deadline passes.
///
/// Response headers may arrive well inside the deadline while the body
/// stalls; the error makes hyper abort the client connection instead of
/// leaving it open.
#[derive(Debug)]
pub struct DeadlineBody<B> {
    inner: B,
    sleep: Pin<Box<Sleep>>,
    timeout_ms: u64,
}

impl<B> DeadlineBody<B> {
    pub fn new(inner: B, deadline: Instant, timeout_ms: u64) -> Self {
        Self {
            inner,
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
            timeout_ms,
        }
    }
}

impl<B> HttpBody for DeadlineBody<B>
where
    B: HttpBody + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = B::Data;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.sleep.as_mut().poll(cx).is_ready() {
            let timeout_ms = this.timeout_ms;
            return Poll::Ready(Some(Err(Box::new(BodyDeadlineElapsed { timeout_ms }))));
        }
        Pin::new(&mut this.inner)
            .poll_frame(cx)
            .map(|frame| frame.map(|result| result.map_err(Into::into)))
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use http_body_util::{Full, StreamBody};
    use std::convert::Infallible;
    use std::time::Duration;

    #[tokio::test]
    async fn reassembles_streamed_chunks() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = (0..64)
            .map(|i| Ok(Bytes::from(vec![i as u8; 32 * 1024])))
            .collect();
        let body = Body::from_stream(stream::iter(chunks));

        let bytes = collect_bounded(body, 4 * 1024 * 1024).await.unwrap();
        assert_eq!(bytes.len(), 64 * 32 * 1024);
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[bytes.len() - 1], 63);
    }

    #[tokio::test]
    async fn rejects_oversized_body() {
        let body = Body::from(vec![0u8; 1024]);
        let err = collect_bounded(body, 100).await.unwrap_err();
        assert!(matches!(err, ProxyError::PayloadTooLarge { limit: 100 }));
    }

    #[tokio::test]
    async fn empty_body_is_fine() {
        assert!(collect_bounded(Body::empty(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stalled_response_body_fails_at_deadline() {
        let stalled = StreamBody::new(stream::pending::<Result<Frame<Bytes>, Infallible>>());
        let deadline = Instant::now() + Duration::from_millis(50);
        let body = DeadlineBody::new(stalled, deadline, 50);

        let started = std::time::Instant::now();
        let err = tokio::time::timeout(Duration::from_secs(2), body.collect())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.downcast_ref::<BodyDeadlineElapsed>().is_some());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn body_within_deadline_passes_through() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let body = DeadlineBody::new(Full::new(Bytes::from_static(b"done")), deadline, 5_000);
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"done");
    }
}
