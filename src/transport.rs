//! The HTTP transport seam and the per-request executor.
//!
//! Connection pooling, TLS, proxies and redirects all live behind
//! [`Transport`]. The engine only requires that one transport value can be
//! cloned into every worker and driven concurrently, which is what
//! [`reqwest::Client`] provides out of the box.

use std::{
    future::Future,
    time::{Instant, SystemTime},
};

use reqwest::{Request, Response};

use crate::metric::{ErrorKind, Outcome};

/// Sends one request and yields the response head.
///
/// Implementations must be safe to drive from many workers at once and should
/// reuse connections between calls. Cloning must be cheap: every worker gets
/// its own clone.
pub trait Transport: Clone + Send + Sync + 'static {
    fn execute(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Response, reqwest::Error>> + Send;
}

impl Transport for reqwest::Client {
    fn execute(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Response, reqwest::Error>> + Send {
        reqwest::Client::execute(self, request)
    }
}

/// Perform one round trip and turn it into an [`Outcome`].
///
/// The response body is always read to the end and dropped, which hands the
/// connection back to the pool. Skipping that would leak a connection per
/// request and quietly shrink the effective concurrency.
pub async fn perform<T: Transport>(transport: &T, seq: u64, request: Request) -> Outcome {
    let start = SystemTime::now();
    let clock = Instant::now();

    let (status, bytes, error) = match transport.execute(request).await {
        Ok(response) => {
            let status = response.status().as_u16();
            let (bytes, error) = drain(response).await;
            (Some(status), bytes, error)
        }
        Err(e) => {
            tracing::debug!(seq, error = %e, "Request failed.");
            (None, 0, Some(ErrorKind::from(&e)))
        }
    };

    Outcome {
        seq,
        start,
        duration: clock.elapsed(),
        success: error.is_none(),
        status,
        error,
        bytes,
    }
}

async fn drain(mut response: Response) -> (u64, Option<ErrorKind>) {
    let mut bytes = 0;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => bytes += chunk.len() as u64,
            Ok(None) => return (bytes, None),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to drain response body.");
                return (bytes, Some(ErrorKind::from(&e)));
            }
        }
    }
}
