use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crossbeam_utils::CachePadded;
use quanta::Clock;
use quanta::Instant;

use super::AdmissionControl;

/// Upper bound on CAS attempts per `allow` call.
///
/// Losing the CAS means another caller admitted concurrently; retrying with a
/// fresh clock reading normally succeeds within a handful of attempts. If the
/// budget runs out anyway, the call rejects rather than spinning on.
const MAX_CAS_RETRIES: usize = 100;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// A shared, lock-free leaky bucket.
///
/// Each admission adds one unit of fill; fill drains continuously at
/// `leak_rate` units per second. A request is admitted while the drained fill
/// is below `burst_capacity`.
///
/// The fill is an `f64` stored through its bit pattern in an `AtomicU64`,
/// updated by compare-and-swap; the last-leak timestamp is a second atomic
/// written with a plain store after a successful swap. The two are not updated
/// as one unit, so a reader can pair a fresh fill with a stale timestamp and
/// drain slightly too much or too little on its next pass. The error is
/// bounded and self-correcting; capacity is never exceeded by more than the
/// in-flight race window.
#[derive(Debug)]
pub struct LeakyBucket {
    burst_capacity: f64,
    leak_rate: f64,
    /// Current fill as `f64::to_bits`. Padded so CAS traffic on the fill does
    /// not invalidate the cache line holding the timestamp, and vice versa.
    fill: CachePadded<AtomicU64>,
    /// Nanoseconds since `anchor` at which the fill was last re-based.
    last_leak: CachePadded<AtomicU64>,
    allowed: AtomicU64,
    rejected: AtomicU64,
    /// Rejections caused by CAS-budget exhaustion rather than a full bucket.
    /// Always counted into `rejected` as well.
    contended: AtomicU64,
    clock: Clock,
    /// A fixed point in time to calculate deltas from.
    anchor: Instant,
}

impl AdmissionControl for LeakyBucket {
    fn allow(&self) -> bool {
        for _ in 0..MAX_CAS_RETRIES {
            // Fresh reading per attempt: a retry must see the time that
            // passed while it lost the race.
            let now = self.elapsed_ns();
            let fill_bits = self.fill.load(Ordering::Acquire);
            let last = self.last_leak.load(Ordering::Acquire);

            let elapsed = now.saturating_sub(last) as f64 / NANOS_PER_SEC;
            let candidate = (f64::from_bits(fill_bits) - elapsed * self.leak_rate).max(0.0);

            if candidate < self.burst_capacity {
                let new_fill = candidate + 1.0;
                if self
                    .fill
                    .compare_exchange(
                        fill_bits,
                        new_fill.to_bits(),
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // Best effort only: not atomic with the fill swap above.
                    self.last_leak.store(now, Ordering::Release);
                    self.allowed.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                // Lost to a concurrent admit; go around.
            } else {
                // Full. A concurrent leak could free capacity a moment later;
                // that race is deliberately not chased.
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }

        // Retry budget exhausted under extreme contention. Fail closed and
        // protect the downstream resource.
        self.contended.fetch_add(1, Ordering::Relaxed);
        self.rejected.fetch_add(1, Ordering::Relaxed);
        false
    }

    #[inline]
    fn peek_fill(&self) -> f64 {
        let now = self.elapsed_ns();
        let fill = f64::from_bits(self.fill.load(Ordering::Acquire));
        let last = self.last_leak.load(Ordering::Acquire);

        let elapsed = now.saturating_sub(last) as f64 / NANOS_PER_SEC;
        (fill - elapsed * self.leak_rate).max(0.0)
    }
}

impl LeakyBucket {
    /// Creates a bucket that drains `leak_rate` units per second and holds at
    /// most `burst_capacity` units.
    ///
    /// `leak_rate` of `0.0` is legal: the bucket never drains, so once full it
    /// rejects forever. That is the intended degenerate behavior, not a
    /// defect.
    ///
    /// # Panics
    ///
    /// Panics if `burst_capacity` is not a positive finite number, or if
    /// `leak_rate` is negative or non-finite.
    pub fn new(leak_rate: f64, burst_capacity: f64) -> Self {
        Self::with_clock(leak_rate, burst_capacity, Clock::new())
    }

    /// Creates a bucket driven by the supplied clock.
    ///
    /// Mainly useful with `quanta::Clock::mock()` for deterministic tests.
    pub fn with_clock(leak_rate: f64, burst_capacity: f64, clock: Clock) -> Self {
        assert!(
            burst_capacity.is_finite() && burst_capacity > 0.0,
            "burst_capacity must be a positive finite number"
        );
        assert!(
            leak_rate.is_finite() && leak_rate >= 0.0,
            "leak_rate must be a non-negative finite number"
        );

        let anchor = clock.now();
        Self {
            burst_capacity,
            leak_rate,
            fill: CachePadded::new(AtomicU64::new(0.0_f64.to_bits())),
            last_leak: CachePadded::new(AtomicU64::new(0)),
            allowed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            contended: AtomicU64::new(0),
            clock,
            anchor,
        }
    }

    /// Total admissions since construction.
    pub fn allowed_total(&self) -> u64 {
        self.allowed.load(Ordering::Relaxed)
    }

    /// Total rejections since construction, including fail-closed ones.
    pub fn rejected_total(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Rejections that came from CAS-budget exhaustion rather than a full
    /// bucket. A subset of [`rejected_total`](Self::rejected_total); exposed
    /// for operational visibility only.
    pub fn contention_rejections(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    pub fn burst_capacity(&self) -> f64 {
        self.burst_capacity
    }

    pub fn leak_rate(&self) -> f64 {
        self.leak_rate
    }

    #[inline]
    fn elapsed_ns(&self) -> u64 {
        self.clock.now().duration_since(self.anchor).as_nanos() as u64
    }
}
