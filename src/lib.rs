//! volley, a fixed-count HTTP load generator.
//!
//! Given a request template, a total request count `N`, a concurrency `C` and
//! an optional global rate cap, volley issues exactly `N` requests from `C`
//! concurrent workers and hands back one outcome record per request.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`RequestTemplate`]: the immutable prototype request. Every dispatch gets
//!   its own clone; the body is buffered once and shared read-only.
//! - [`Scenario`]: what to hit, the template plus the [`Transport`] that
//!   sends it.
//! - [`Executor`]: responsible for actually running the scenario. The built-in
//!   [`CountExecutor`] owns the worker pool, the dispatch counter that
//!   guarantees exactly `N` requests, and the shared admission gate that
//!   enforces the rate cap.
//! - [`Metric`]: one observation. Every request yields an
//!   [`Outcome`](metric::Outcome) with its start time, duration, status and
//!   error class.
//! - [`Aggregate`]: the result sink. Each worker fills its own aggregate and
//!   the executor merges them at the end.
//! - [`Report`]: derives summary numbers from an aggregate.
//! - [`Reporter`]: renders a report somewhere (text, JSON, CSV).
//!
//! # Guarantees
//!
//! - Exactly `N` requests are attempted and exactly `N` outcomes are recorded,
//!   whatever the interleaving of workers. `N = 0` returns at once.
//! - With a Qps cap, all workers share one ticket source; the aggregate rate
//!   never exceeds the cap, no matter how many workers there are.
//! - A transport failure is a failed outcome, never a failed run. Any HTTP
//!   status, 4xx and 5xx included, is a successful attempt.
//! - Nothing is retried.
//!
//! # Example
//!
//! ```rust,no_run
//! use volley::{
//!     CountExecutor, Executor, Reporter, Scenario,
//!     aggregate::Records,
//!     report::{Summary, TextReporter},
//!     template::RequestTemplate,
//! };
//!
//! #[tokio::main]
//! async fn main() -> volley::Result<()> {
//!     // NEVER build a client per request: it owns the connection pool.
//!     let client = reqwest::Client::new();
//!     let scenario = Scenario::builder()
//!         .name("HTTP scenario")
//!         .template(
//!             RequestTemplate::builder("http://localhost:3000")
//!                 .method("POST")
//!                 .body("Body")
//!                 .build()?,
//!         )
//!         .transport(client)
//!         .build();
//!
//!     let records: Records = CountExecutor::builder()
//!         .requests(20)
//!         .concurrency(2)
//!         .qps(5.0)
//!         .build()
//!         .exec(&scenario)
//!         .await?;
//!
//!     TextReporter::stdout().report(&Summary::from(records)).await
//! }
//! ```
//!
//! # Feature flags
//! - `internals`: expose the executor's execution context and worker spawning.

/// Result sinks
pub mod aggregate;
pub mod error;
/// Dispatch and admission control
pub mod executor;
/// Outcome records
pub mod metric;
/// Reports and Reporters
pub mod report;
pub mod scenario;
/// Request templates and cloning
pub mod template;
/// HTTP transport seam and request execution
pub mod transport;

pub use aggregate::Aggregate;
pub use error::{Error, Result};
pub use executor::{CountExecutor, Executor};
pub use metric::Metric;
pub use report::{Report, Reporter};
pub use scenario::Scenario;
pub use template::RequestTemplate;
pub use transport::Transport;
