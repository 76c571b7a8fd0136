use std::sync::atomic::{AtomicU64, Ordering};

/// Shared bound on how many requests a run may dispatch.
///
/// Workers call [`try_claim`](DispatchCounter::try_claim) before every
/// request. The claimed count only moves forward, never past `total`, and the
/// check and the increment happen in one CAS step, so racing workers can
/// neither overshoot nor skip a claim near the boundary: exactly `total`
/// calls ever succeed.
#[derive(Debug)]
pub struct DispatchCounter {
    total: u64,
    claimed: AtomicU64,
}

impl DispatchCounter {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            claimed: AtomicU64::new(0),
        }
    }

    /// Claim one unit of work.
    ///
    /// Returns the zero-based sequence number of the claim, or `None` once all
    /// `total` units are gone. Never blocks.
    pub fn try_claim(&self) -> Option<u64> {
        self.claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |claimed| {
                (claimed < self.total).then_some(claimed + 1)
            })
            .ok()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn claimed(&self) -> u64 {
        self.claimed.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> u64 {
        self.total - self.claimed()
    }

    pub fn is_exhausted(&self) -> bool {
        self.claimed() >= self.total
    }

    /// Whether `seq` was the last claim this counter will hand out.
    pub fn is_last(&self, seq: u64) -> bool {
        seq + 1 == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn hands_out_exactly_total_claims_in_order() {
        let counter = DispatchCounter::new(3);

        assert_eq!(counter.try_claim(), Some(0));
        assert_eq!(counter.try_claim(), Some(1));
        assert!(counter.is_last(2));
        assert_eq!(counter.try_claim(), Some(2));
        assert_eq!(counter.try_claim(), None);
        assert_eq!(counter.try_claim(), None);

        assert!(counter.is_exhausted());
        assert_eq!(counter.claimed(), 3);
        assert_eq!(counter.remaining(), 0);
    }

    #[test]
    fn zero_total_is_exhausted_from_the_start() {
        let counter = DispatchCounter::new(0);
        assert!(counter.is_exhausted());
        assert_eq!(counter.try_claim(), None);
        assert_eq!(counter.claimed(), 0);
    }

    #[test]
    fn concurrent_claims_are_never_lost_or_duplicated() {
        const TOTAL: u64 = 10_000;
        const THREADS: usize = 16;
        let counter = Arc::new(DispatchCounter::new(TOTAL));

        let per_thread: Vec<Vec<u64>> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let counter = Arc::clone(&counter);
                    s.spawn(move || {
                        let mut mine = Vec::new();
                        // keep hammering past the end to exercise the boundary
                        for _ in 0..TOTAL {
                            if let Some(seq) = counter.try_claim() {
                                mine.push(seq);
                            }
                        }
                        mine
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut all: Vec<u64> = per_thread.into_iter().flatten().collect();
        assert_eq!(all.len() as u64, TOTAL);
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len() as u64, TOTAL);
        assert_eq!(all.first(), Some(&0));
        assert_eq!(all.last(), Some(&(TOTAL - 1)));
        assert_eq!(counter.claimed(), TOTAL);
    }
}
