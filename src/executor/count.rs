use std::sync::Arc;

use futures::future::join_all;
use tokio::{
    sync::watch::{Receiver, channel},
    task::JoinHandle,
};
use typed_builder::TypedBuilder;

use super::{
    Executor,
    counter::DispatchCounter,
    gate::{AdmissionGate, Cadence, ticket_governor_task},
};
use crate::{
    aggregate::Aggregate,
    error::{Error, Result},
    metric::Outcome,
    scenario::Scenario,
    transport::{Transport, perform},
};
#[cfg(not(feature = "internals"))]
use internals::*;

/// Issues exactly `requests` requests from `concurrency` workers.
///
/// - Every worker loops: wait for a ticket, claim one unit from the shared
///   [`DispatchCounter`], clone the template, send it, record the outcome.
/// - A worker stops as soon as no unit is left to claim, so with more workers
///   than requests some workers simply issue nothing.
/// - With `qps` set, all workers draw tickets from one shared governor. With
///   `qps` unset or `0.0` the gate is open and workers go as fast as the
///   target answers.
///
/// # Example
/// ```rust,no_run
/// use volley::{CountExecutor, Executor, Scenario, aggregate::Records, template::RequestTemplate};
///
/// # async fn run() -> volley::Result<()> {
/// let scenario = Scenario::builder()
///     .name("ping")
///     .template(RequestTemplate::builder("http://localhost:3000").build()?)
///     .transport(reqwest::Client::new())
///     .build();
///
/// let records: Records = CountExecutor::builder()
///     .requests(200)
///     .concurrency(10)
///     .qps(50.0)
///     .build()
///     .exec(&scenario)
///     .await?;
/// assert_eq!(records.len(), 200);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct CountExecutor {
    /// Total number of requests to issue.
    pub requests: u64,
    /// Number of concurrent worker tasks.
    #[builder(default = 50)]
    pub concurrency: usize,
    /// Global cap in requests per second. `None` or `0.0` means unlimited.
    #[builder(default, setter(strip_option))]
    pub qps: Option<f64>,
    /// Optional early-stop signal. The run winds down once it reads `true`.
    #[builder(default, setter(strip_option))]
    pub stop: Option<Receiver<bool>>,
}

impl CountExecutor {
    /// Ticket cadence for the configured rate, `None` when unlimited.
    pub fn cadence(&self) -> Result<Option<Cadence>> {
        match self.qps {
            None => Ok(None),
            Some(qps) if !qps.is_finite() || qps < 0.0 => Err(Error::InvalidQps(qps)),
            Some(qps) if qps == 0.0 => Ok(None),
            Some(qps) => Ok(Some(Cadence::from_qps(qps))),
        }
    }
}

impl<A, T> Executor<A, T> for CountExecutor
where
    A: Aggregate<Metric = Outcome> + 'static,
    T: Transport,
{
    type Error = Error;

    async fn exec(&self, scenario: &Scenario<T>) -> Result<A> {
        let cadence = self.cadence()?;
        if self.requests == 0 {
            tracing::info!("Nothing to dispatch for scenario: {}.", scenario.name);
            return Ok(A::new());
        }
        if self.concurrency == 0 {
            return Err(Error::ZeroConcurrency);
        }

        // must outlive the workers: a dropped sender reads as shutdown
        let (shutdown_tx, shutdown_rx) = channel(false);
        let (gate, governor) = match cadence {
            None => (AdmissionGate::Open, None),
            Some(cadence) => {
                tracing::info!(period = ?cadence.period, per_tick = cadence.per_tick, "Spawning ticket governor task...");
                let (gate, tokens) = AdmissionGate::paced();
                let governor = tokio::spawn(ticket_governor_task(tokens, cadence, shutdown_rx));
                (gate, Some(governor))
            }
        };

        let ctx = ExecutionContext {
            counter: Arc::new(DispatchCounter::new(self.requests)),
            gate: Arc::new(gate),
            template: Arc::new(scenario.template.clone()),
            stop: self.stop.clone(),
        };

        tracing::info!("Spawning {} workers...", self.concurrency);
        let handles: Vec<JoinHandle<A>> =
            spawn_workers(ctx.clone(), self.concurrency, scenario.transport.clone());

        tracing::info!(requests = self.requests, "Running scenario: {}!", scenario.name);
        let aggs: Vec<A> = join_all(handles)
            .await
            .into_iter()
            .map(|res| match res {
                Ok(agg) => agg,
                Err(e) => {
                    tracing::error!("Worker panicked with error: {e}");
                    A::new()
                }
            })
            .collect();

        tracing::debug!("Workers finished, signaling shutdown...");
        shutdown_tx.send_replace(true);
        ctx.gate.close();
        if let Some(governor) = governor {
            if let Err(e) = governor.await {
                tracing::error!("Ticket governor task failed: {e}");
            }
        }

        tracing::info!("Processing results...");
        let mut final_agg = A::new();
        for agg in aggs {
            final_agg.merge(agg);
        }

        tracing::info!(
            claimed = ctx.counter.claimed(),
            "Done running scenario: {}!",
            scenario.name
        );
        Ok(final_agg)
    }
}

#[cfg(feature = "internals")]
pub use internals::*;

/// Internal components for the `CountExecutor`.
/// Encapsulated in a module to allow conditional exposure via `#[cfg(feature = "internals")]`.
mod internals {
    use super::*;
    use crate::template::RequestTemplate;

    /// Shared state of one run. Cloned into every worker.
    #[derive(Clone, Debug)]
    pub struct ExecutionContext {
        pub counter: Arc<DispatchCounter>,
        pub gate: Arc<AdmissionGate>,
        /// Read-only for the whole run; workers only touch their clones.
        pub template: Arc<RequestTemplate>,
        pub stop: Option<Receiver<bool>>,
    }

    impl ExecutionContext {
        /// Wait for a ticket, then claim the next unit of work.
        ///
        /// `None` means the worker is done: the counter is exhausted, the gate
        /// was closed or the run was stopped.
        pub async fn next_claim(&self) -> Option<u64> {
            if self.counter.is_exhausted() || self.is_stopped() {
                return None;
            }

            let admitted = match &self.stop {
                None => self.gate.admit().await,
                Some(stop) => {
                    let mut stop = stop.clone();
                    tokio::select! {
                        biased;
                        _ = stopped(&mut stop) => false,
                        admitted = self.gate.admit() => admitted,
                    }
                }
            };
            if !admitted || self.is_stopped() {
                return None;
            }

            let seq = self.counter.try_claim()?;
            if self.counter.is_last(seq) {
                // release workers parked on the gate, there is nothing left for them
                self.gate.close();
            }
            Some(seq)
        }

        pub fn is_stopped(&self) -> bool {
            self.stop.as_ref().is_some_and(|stop| *stop.borrow())
        }
    }

    /// Resolves once the stop signal reads `true`. A sender that goes away
    /// without ever stopping does not count.
    async fn stopped(stop: &mut Receiver<bool>) {
        if stop.wait_for(|b| *b).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Spawns `workers` Tokio tasks, each looping over
    /// [`ExecutionContext::next_claim`] until it returns `None`.
    pub fn spawn_workers<A, T>(
        ctx: ExecutionContext,
        workers: usize,
        transport: T,
    ) -> Vec<JoinHandle<A>>
    where
        A: Aggregate<Metric = Outcome> + 'static,
        T: Transport,
    {
        (0..workers)
            .map(|i| {
                let ctx = ctx.clone();
                let transport = transport.clone();
                tokio::spawn(async move {
                    let mut agg = A::new();
                    let mut issued = 0u64;
                    tracing::debug!("Worker {i} started.");

                    while let Some(seq) = ctx.next_claim().await {
                        let outcome = perform(&transport, seq, ctx.template.instantiate()).await;
                        agg.consume(&outcome);
                        issued += 1;
                    }

                    tracing::debug!(issued, "Worker {i} shutting down.");
                    agg
                })
            })
            .collect()
    }
}
