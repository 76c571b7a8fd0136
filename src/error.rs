use thiserror::Error;

/// Errors surfaced by volley.
///
/// Everything a run can fail with is discovered before the first request is
/// dispatched. Transport failures never show up here: they are recorded as
/// failed [`crate::metric::Outcome`]s and the run carries on.
#[derive(Debug, Error)]
pub enum Error {
    /// The target URL could not be parsed
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Only http and https targets can be loaded
    #[error("unsupported url scheme `{0}`")]
    UnsupportedScheme(String),

    /// The HTTP method is not a valid token
    #[error("invalid method `{0}`")]
    InvalidMethod(String),

    /// A header name or value is not valid HTTP
    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// The body source could not be read into memory
    #[error("failed to read request body: {0}")]
    Body(#[source] std::io::Error),

    /// A run with pending requests needs at least one worker
    #[error("concurrency must be at least 1 when requests are pending")]
    ZeroConcurrency,

    /// Qps must be a finite, non-negative number
    #[error("invalid qps {0}: expected a finite number >= 0")]
    InvalidQps(f64),

    /// Writing a report failed
    #[error("report I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing a report failed
    #[error("report serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
