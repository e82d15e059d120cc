//! # drip-limit
//!
//! `drip-limit` provides a lock-free leaky-bucket admission controller.
//!
//! ## Core Philosophy
//!
//! Most rate limiters rely on a `Mutex` to protect internal state, which creates a bottleneck
//! under high thread contention. `drip-limit` keeps the bucket state in atomics and updates it
//! with a bounded Compare-And-Swap (CAS) loop, so the admission decision is non-blocking and
//! scales with CPU cores. When the CAS budget is exhausted under pathological contention, the
//! bucket fails *closed*: it rejects rather than risking unbounded admission.
//!
//! ## Key Concepts
//!
//! * **Lock-Free**: No `Mutex` or `RwLock` anywhere in the hot path.
//! * **Lazy Draining**: The leak is recalculated at the moment of each decision; there are no
//!   background worker threads or timers.
//! * **Approximate by Design**: The fill level and the last-leak timestamp are two independent
//!   atomics. The enforcement guarantee is "approximately `leak_rate` units per second with
//!   bursts up to `burst_capacity`", not an exact discrete-event simulation.
//!
//! ## Example
//!
//! ```rust
//! use drip_limit::AdmissionControl;
//! use drip_limit::LeakyBucket;
//!
//! // Sustain 300 admissions/second, absorb bursts of up to 700.
//! let bucket = LeakyBucket::new(300.0, 700.0);
//!
//! if bucket.allow() {
//!     // Request admitted
//! }
//! ```

use std::fmt::Debug;

mod leaky_bucket;

pub use leaky_bucket::LeakyBucket;

/// The decision seam between the admission controller and its callers.
///
/// Implementations must be `Send` and `Sync` so a single shared instance can
/// sit behind an `Arc` and be hit by any number of concurrent callers.
/// Correctness depends on that sharing: per-call copies would each track their
/// own fill and enforce nothing.
pub trait AdmissionControl: Debug {
    /// Attempts to admit one unit of work.
    ///
    /// Non-blocking. Returns `false` when the bucket is full, or when the
    /// update could not be applied within the internal retry budget (the
    /// fail-closed path); callers cannot and should not distinguish the two.
    fn allow(&self) -> bool;

    /// Reads the current fill level without consuming capacity.
    ///
    /// Intended for observability (e.g. a metrics gauge callback). Never
    /// mutates state and never competes with [`allow`](Self::allow) for the
    /// CAS.
    fn peek_fill(&self) -> f64;
}
