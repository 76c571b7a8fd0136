//! The admission gate: one ticket per request, shared by every worker.
//!
//! With no Qps cap the gate is [`AdmissionGate::Open`] and admits
//! unconditionally. With a cap of `q` requests per second it becomes a single
//! ticket dispenser for the whole run: a governor task adds tickets to a
//! [`Semaphore`] every `1/q` seconds and each worker must take one before it
//! may claim work. The limit is global; `C` workers together never get more
//! than `q` tickets per second, no matter how many of them are waiting.
//!
//! # Cadence
//! The ideal period is `1/q`. Periods shorter than [`MIN_PERIOD`] are clamped
//! to it and the governor hands out `q * MIN_PERIOD` tickets per tick instead,
//! carrying the fractional part across ticks:
//!
//! ```text
//! add_f     = per_tick + fractional
//! add_total = floor(add_f)
//! fractional = add_f - add_total
//! ```
//!
//! The long-run rate is preserved; spacing finer than a millisecond is
//! coalesced into per-millisecond batches.
//!
//! # Bursts
//! The bucket holds at most one tick's worth of tickets. Tickets that nobody
//! picks up are dropped, so a slow target does not build up credit that would
//! be spent in a burst once it recovers.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Semaphore, watch::Receiver},
    time::Instant,
};

/// Finest spacing the governor schedules tickets at.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Coarsest spacing; tiny rates are capped here so deadlines never overflow.
pub const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How often the governor ticks and how many tickets each tick is worth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cadence {
    pub period: Duration,
    pub per_tick: f64,
}

impl Cadence {
    /// Cadence for `qps` admissions per second. `qps` must be finite and > 0.
    pub fn from_qps(qps: f64) -> Self {
        let ideal = Duration::try_from_secs_f64(qps.recip()).unwrap_or(MAX_PERIOD);
        if ideal < MIN_PERIOD {
            Self {
                period: MIN_PERIOD,
                per_tick: qps * MIN_PERIOD.as_secs_f64(),
            }
        } else {
            Self {
                period: ideal.min(MAX_PERIOD),
                per_tick: 1.0,
            }
        }
    }

    /// Most tickets that may sit unclaimed in the bucket.
    pub fn burst(&self) -> usize {
        calc_tokens(self.per_tick.ceil(), 0.0).0.max(1)
    }
}

/// Ticket source consulted by every worker before it claims work.
#[derive(Debug)]
pub enum AdmissionGate {
    /// No rate cap: every call is admitted immediately.
    Open,
    /// Tickets are minted by [`ticket_governor_task`].
    Paced { tokens: Arc<Semaphore> },
}

impl AdmissionGate {
    /// A paced gate with an empty bucket. Nothing is admitted until a governor
    /// is started on the returned semaphore.
    pub fn paced() -> (Self, Arc<Semaphore>) {
        let tokens = Arc::new(Semaphore::new(0));
        (
            Self::Paced {
                tokens: Arc::clone(&tokens),
            },
            tokens,
        )
    }

    /// Wait for a ticket.
    ///
    /// Returns `false` only for a paced gate that has been [closed](Self::close).
    pub async fn admit(&self) -> bool {
        match self {
            AdmissionGate::Open => true,
            AdmissionGate::Paced { tokens } => match tokens.acquire().await {
                Ok(permit) => {
                    // the governor is the only one allowed to put tickets back
                    permit.forget();
                    true
                }
                Err(_) => false,
            },
        }
    }

    /// Wake every waiting worker with a refusal. Used once no work is left.
    pub fn close(&self) {
        if let AdmissionGate::Paced { tokens } = self {
            tokens.close();
        }
    }
}

/// Mint tickets into `tokens` at `cadence` until shutdown or until the gate is
/// closed. The first ticket is available immediately.
pub async fn ticket_governor_task(
    tokens: Arc<Semaphore>,
    cadence: Cadence,
    mut shutdown: Receiver<bool>,
) {
    let capacity = cadence.burst();
    let main_task = async {
        let mut fractional = 0.0;
        let mut next_tick = Instant::now();
        tracing::debug!(period = ?cadence.period, per_tick = cadence.per_tick, "Governor started.");

        while !tokens.is_closed() {
            let (add_total, f) = calc_tokens(cadence.per_tick, fractional);
            fractional = f;

            let avail = tokens.available_permits();
            if avail < capacity {
                let add = add_total.min(capacity - avail);
                if add > 0 {
                    tokens.add_permits(add);
                }
            }

            next_tick += cadence.period;
            tokio::time::sleep_until(next_tick).await;
        }
    };

    tokio::select! {
        _ = main_task => {
            tracing::debug!("Governor stopped: gate closed.");
        }
        _ = shutdown.wait_for(|b| *b) => {
            tracing::debug!("Governor received shutdown signal.");
        }
    };
}

/// Pure function to calculate how many whole tickets to mint this tick.
///
/// Carries the fractional part over so the long-term average matches
/// `per_tick`. Returns `(tickets_to_add, next_fractional_part)`.
pub fn calc_tokens(per_tick: f64, fractional: f64) -> (usize, f64) {
    let add_f = per_tick + fractional;
    let add_total_f = add_f.floor();
    let fractional = add_f - add_total_f;

    // saturate at the semaphore's hard limit instead of panicking
    let add_total = if add_total_f >= Semaphore::MAX_PERMITS as f64 {
        Semaphore::MAX_PERMITS
    } else if add_total_f < 0.0 || add_total_f.is_nan() {
        0
    } else {
        add_total_f as usize
    };

    (add_total, fractional)
}
