use std::{
    fmt,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};

/// A `Metric` is a single observation produced by one dispatch.
///
/// Metrics are the most granular data volley produces. They are consumed by an
/// [`crate::Aggregate`] on the worker that produced them, and later turned into
/// something readable by a [`crate::Report`] and [`crate::Reporter`].
///
/// Metrics must be cheap to clone and safe to move between worker tasks.
pub trait Metric
where
    Self: PartialOrd + PartialEq + Send + Sync + Clone + fmt::Debug,
{
}

/// The outcome record of one request attempt.
///
/// Every claimed dispatch produces exactly one `Outcome`. Records carry their
/// own timing, so nothing downstream depends on the order they arrive in.
///
/// `success` only says the transport delivered a response: a 404 or a 503 is
/// still a successful attempt, with the status left for reporting to judge.
#[derive(Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Outcome {
    /// Zero-based claim sequence number
    pub seq: u64,
    /// Wall-clock time the request was handed to the transport
    pub start: SystemTime,
    /// Time until the response body was fully drained, or the failure
    pub duration: Duration,
    pub success: bool,
    /// Status code, when a response head was received
    pub status: Option<u16>,
    pub error: Option<ErrorKind>,
    /// Response body bytes read
    pub bytes: u64,
}

impl Metric for Outcome {}

impl Outcome {
    /// End of the attempt on the wall clock.
    pub fn end(&self) -> SystemTime {
        self.start + self.duration
    }
}

/// Transport-level failure classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connecting failed: refused, unreachable, DNS or TLS handshake
    Connect,
    /// The request or response did not complete in time
    Timeout,
    /// Redirect loop or policy violation
    Redirect,
    /// The response body could not be read to the end
    Body,
    /// The request could not be sent or the response was malformed
    Request,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connect => "connect",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Redirect => "redirect",
            ErrorKind::Body => "body",
            ErrorKind::Request => "request",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&reqwest::Error> for ErrorKind {
    fn from(err: &reqwest::Error) -> Self {
        // timeouts can also look like connect or body errors, check them first
        if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Connect
        } else if err.is_redirect() {
            ErrorKind::Redirect
        } else if err.is_body() || err.is_decode() {
            ErrorKind::Body
        } else if err.is_request() {
            ErrorKind::Request
        } else {
            ErrorKind::Other
        }
    }
}
