use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    collections::BTreeMap,
    fmt::{self, Debug},
    future::Future,
    io::{self, Write},
    sync::Mutex,
    time::{Duration, SystemTime},
};

use crate::{
    Aggregate,
    aggregate::Records,
    error::Result,
    metric::{ErrorKind, Outcome},
};

/// A [`Report`] represents the processed form of an [`Aggregate`].
///
/// Reports derive the numbers people actually read (rates, latency
/// distributions, failure breakdowns) from the raw data an aggregate kept.
/// They are plain data: no I/O happens here.
///
/// Implementors define how to construct the report from an aggregate through
/// a [`From<A>`] implementation. Once created, a report is handed to a
/// [`Reporter`].
///
/// See also: [`Reporter`].
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// A [`Reporter`] consumes a [`Report`] and performs side effects: printing
/// it, writing it to a file or shipping it somewhere.
///
/// Reporters are the I/O boundary of volley. Keeping them apart from reports
/// lets the same numbers be rendered as text, JSON or anything else.
pub trait Reporter<A: Aggregate, R: Report<A>> {
    fn report(&self, report: &R) -> impl Future<Output = Result<()>>;
}

/// Percentiles listed in a [`Summary`].
pub const PERCENTILES: [u8; 7] = [10, 25, 50, 75, 90, 95, 99];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentile {
    pub percentile: u8,
    pub latency: Duration,
}

/// Run-level summary computed from every [`Outcome`].
///
/// Latency figures only cover successful attempts; a refused connection says
/// nothing about how fast the target answers. Throughput counts every attempt
/// over the wall-clock span from the first start to the last completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub elapsed: Duration,
    pub requests_per_sec: f64,
    pub fastest: Duration,
    pub slowest: Duration,
    pub average: Duration,
    /// Response body bytes received
    pub bytes: u64,
    pub latency: Vec<Percentile>,
    pub status_codes: BTreeMap<u16, usize>,
    pub errors: BTreeMap<ErrorKind, usize>,
}

impl From<Records> for Summary {
    fn from(records: Records) -> Self {
        let total = records.len();
        let mut latencies: Vec<Duration> = records
            .iter()
            .filter(|o| o.success)
            .map(|o| o.duration)
            .collect();
        latencies.sort_unstable();

        let mut status_codes = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for outcome in records.iter() {
            if let Some(status) = outcome.status {
                *status_codes.entry(status).or_insert(0) += 1;
            }
            if let Some(kind) = outcome.error {
                *errors.entry(kind).or_insert(0) += 1;
            }
        }

        let elapsed = wall_clock_span(&records.outcomes);
        let requests_per_sec = if elapsed.is_zero() {
            0.0
        } else {
            total as f64 / elapsed.as_secs_f64()
        };
        let average = if latencies.is_empty() {
            Duration::ZERO
        } else {
            latencies.iter().sum::<Duration>().div_f64(latencies.len() as f64)
        };

        Self {
            total,
            successes: latencies.len(),
            failures: total - latencies.len(),
            elapsed,
            requests_per_sec,
            fastest: latencies.first().copied().unwrap_or_default(),
            slowest: latencies.last().copied().unwrap_or_default(),
            average,
            bytes: records.iter().map(|o| o.bytes).sum(),
            latency: PERCENTILES
                .iter()
                .filter_map(|&p| {
                    percentile(&latencies, p).map(|latency| Percentile {
                        percentile: p,
                        latency,
                    })
                })
                .collect(),
            status_codes,
            errors,
        }
    }
}

impl Report<Records> for Summary {}

// every record set is its own report, which is what CSV output wants
impl Report<Records> for Records {}

/// Nearest-rank percentile over sorted latencies.
fn percentile(sorted: &[Duration], p: u8) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((f64::from(p) / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}

fn origin(outcomes: &[Outcome]) -> Option<SystemTime> {
    outcomes.iter().map(|o| o.start).min()
}

fn wall_clock_span(outcomes: &[Outcome]) -> Duration {
    let Some(first) = origin(outcomes) else {
        return Duration::ZERO;
    };
    outcomes
        .iter()
        .map(Outcome::end)
        .max()
        .and_then(|last| last.duration_since(first).ok())
        .unwrap_or_default()
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        writeln!(f, "  Total:\t{:.4} secs", self.elapsed.as_secs_f64())?;
        writeln!(f, "  Slowest:\t{:.4} secs", self.slowest.as_secs_f64())?;
        writeln!(f, "  Fastest:\t{:.4} secs", self.fastest.as_secs_f64())?;
        writeln!(f, "  Average:\t{:.4} secs", self.average.as_secs_f64())?;
        writeln!(f, "  Requests/sec:\t{:.4}", self.requests_per_sec)?;
        writeln!(f, "  Total data:\t{} bytes", self.bytes)?;
        writeln!(f, "  Succeeded:\t{} of {}", self.successes, self.total)?;

        if !self.latency.is_empty() {
            writeln!(f, "\nLatency distribution:")?;
            for p in &self.latency {
                writeln!(f, "  {}% in {:.4} secs", p.percentile, p.latency.as_secs_f64())?;
            }
        }

        if !self.status_codes.is_empty() {
            writeln!(f, "\nStatus code distribution:")?;
            for (status, count) in &self.status_codes {
                writeln!(f, "  [{status}]\t{count} responses")?;
            }
        }

        if !self.errors.is_empty() {
            writeln!(f, "\nError distribution:")?;
            for (kind, count) in &self.errors {
                writeln!(f, "  [{count}]\t{kind}")?;
            }
        }
        Ok(())
    }
}

/// Prints a [`Summary`] as human-readable text.
#[derive(Debug)]
pub struct TextReporter<W = io::Stdout> {
    out: Mutex<W>,
}

/// Prints a [`Summary`] as pretty JSON.
#[derive(Debug)]
pub struct JsonReporter<W = io::Stdout> {
    out: Mutex<W>,
}

/// Prints one CSV line per [`Outcome`], ordered by sequence number.
///
/// Columns: `seq,offset,response-time,status-code,error,bytes`. Times are in
/// seconds; `offset` is relative to the earliest start in the run.
#[derive(Debug)]
pub struct CsvReporter<W = io::Stdout> {
    out: Mutex<W>,
}

macro_rules! writer_ctors {
    ($($reporter:ident),*) => {$(
        impl $reporter<io::Stdout> {
            pub fn stdout() -> Self {
                Self::new(io::stdout())
            }
        }

        impl<W: Write> $reporter<W> {
            pub fn new(out: W) -> Self {
                Self { out: Mutex::new(out) }
            }

            pub fn into_inner(self) -> W {
                self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
            }

            fn with_out<T>(&self, f: impl FnOnce(&mut W) -> io::Result<T>) -> io::Result<T> {
                let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let res = f(&mut out)?;
                out.flush()?;
                Ok(res)
            }
        }
    )*};
}

writer_ctors!(TextReporter, JsonReporter, CsvReporter);

impl<W: Write> Reporter<Records, Summary> for TextReporter<W> {
    async fn report(&self, report: &Summary) -> Result<()> {
        self.with_out(|out| write!(out, "{report}"))?;
        Ok(())
    }
}

impl<W: Write> Reporter<Records, Summary> for JsonReporter<W> {
    async fn report(&self, report: &Summary) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        self.with_out(|out| writeln!(out, "{json}"))?;
        Ok(())
    }
}

impl<W: Write> Reporter<Records, Records> for CsvReporter<W> {
    async fn report(&self, report: &Records) -> Result<()> {
        let mut outcomes: Vec<&Outcome> = report.iter().collect();
        outcomes.sort_unstable_by_key(|o| o.seq);
        let origin = origin(&report.outcomes).unwrap_or(SystemTime::UNIX_EPOCH);

        self.with_out(|out| {
            writeln!(out, "seq,offset,response-time,status-code,error,bytes")?;
            for o in outcomes {
                let offset = o.start.duration_since(origin).unwrap_or_default();
                let status = o.status.map(|s| s.to_string()).unwrap_or_default();
                let error = o.error.as_ref().map(ErrorKind::as_str).unwrap_or_default();
                writeln!(
                    out,
                    "{},{:.6},{:.6},{},{},{}",
                    o.seq,
                    offset.as_secs_f64(),
                    o.duration.as_secs_f64(),
                    status,
                    error,
                    o.bytes
                )?;
            }
            Ok(())
        })?;
        Ok(())
    }
}
