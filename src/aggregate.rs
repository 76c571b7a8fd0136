use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::{Metric, metric::Outcome};

/// The `Aggregate` trait is the result sink of a run: it defines how the
/// [`Metric`]s produced by workers are collected and combined.
///
/// Every worker owns a private aggregate and feeds it with
/// [`consume`](Aggregate::consume), so the hot path never contends on a shared
/// collection. When the run is over the executor folds all worker aggregates
/// together with [`merge`](Aggregate::merge). Nothing is pushed concurrently,
/// so nothing can be lost or duplicated on the way.
///
/// **Important:** aggregates should not compute final statistics such as
/// averages or percentiles. That belongs in a [`crate::Report`], which is
/// converted from an aggregate once the run has finished.
///
/// # Example
/// ```rust
/// use volley::{Aggregate, metric::Outcome};
///
/// #[derive(Debug, Default)]
/// struct Failures(u64);
///
/// impl Aggregate for Failures {
///     type Metric = Outcome;
///
///     fn new() -> Self {
///         Self::default()
///     }
///
///     fn consume(&mut self, outcome: &Outcome) {
///         self.0 += u64::from(!outcome.success);
///     }
///
///     fn merge(&mut self, other: Self) {
///         self.0 += other.0;
///     }
/// }
/// ```
///
/// # Implementor notes
/// - `merge` must be associative and commutative: worker aggregates are merged
///   in whatever order the workers finish.
pub trait Aggregate
where
    Self: Send + Sync + Debug,
{
    /// The metric type this aggregate collects.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Aggregate multiple metrics into the current instance.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Keeps every [`Outcome`] of a run.
///
/// This is what reporting needs to compute latency distributions. Records are
/// not sorted; sort by [`Outcome::seq`] or [`Outcome::start`] if order matters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Records {
    pub outcomes: Vec<Outcome>,
}

impl Records {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter()
    }
}

impl Aggregate for Records {
    type Metric = Outcome;

    fn new() -> Self {
        Self::default()
    }

    fn consume(&mut self, metric: &Self::Metric) {
        self.outcomes.push(metric.clone());
    }

    fn merge(&mut self, mut other: Self) {
        if self.outcomes.len() < other.outcomes.len() {
            std::mem::swap(&mut self.outcomes, &mut other.outcomes);
        }
        self.outcomes.append(&mut other.outcomes);
    }
}
