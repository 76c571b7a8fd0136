//! Executor: dispatch and admission control for a run.
//!
//! The [`Executor`] trait is the runtime that executes a [`Scenario`]. It
//! decides when each request is issued and on which worker, and it hands the
//! collected [`Aggregate`] back once every worker is done.
//!
//! volley ships [`CountExecutor`], which issues an exact number of requests
//! from a fixed pool of workers, optionally paced by a global Qps cap.
//!
//! # Building blocks
//! - [`DispatchCounter`]: lock-free bound on the total number of claims.
//!   Exactly `N` claims ever succeed, whatever the interleaving.
//! - [`AdmissionGate`]: one shared ticket source for every worker. A single
//!   governor task mints tickets at the configured rate; workers never run
//!   private limiters, which would multiply the rate by the worker count.
//! - Workers: `C` Tokio tasks, each looping admit → claim → clone the
//!   template → send → record, into a worker-local aggregate.
//!
//! # Suspension points
//! A worker only ever waits in two places: for a ticket at the gate and on the
//! network. Claiming is a single CAS and never blocks.
//!
//! # Stopping early
//! A run goes to completion by default. Passing a `watch::Receiver<bool>` as
//! the executor's `stop` signal lets the caller end it early: workers check it
//! before each claim and while waiting for a ticket. Requests already in
//! flight are allowed to finish and are recorded.
pub mod count;
pub mod counter;
pub mod gate;

pub use count::CountExecutor;
pub use counter::DispatchCounter;
pub use gate::{AdmissionGate, Cadence};

use crate::{aggregate::Aggregate, metric::Outcome, scenario::Scenario, transport::Transport};
use std::future::Future;

/// The runtime hook that executes a [`Scenario`].
///
/// The returned future resolves only after the whole run is over. Callers
/// that want the run in the background spawn that future themselves.
pub trait Executor<A, T>
where
    Self: Send + Sync + Sized,
    A: Aggregate<Metric = Outcome>,
    T: Transport,
{
    type Error;

    /// Execute the scenario and return the final aggregate.
    ///
    /// Configuration problems are reported before any request is sent.
    /// Failed requests are not errors; they are recorded in the aggregate.
    fn exec(&self, scenario: &Scenario<T>) -> impl Future<Output = Result<A, Self::Error>> + Send;
}
