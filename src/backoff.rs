//! Delay sequences and stop conditions used by retry policies.
//!
//! These are small, self-contained state machines: a [`Backoff`] produces
//! the wait before each re-attempt, a [`StopCondition`] counts attempts and
//! decides when the budget is spent. Retry policies hold prototypes of both
//! and mint fresh state per call, so no two invocations ever share a
//! sequence position or an attempt counter.

use rand::Rng;
use std::time::Duration;

/// A lazy sequence of inter-attempt delays.
///
/// `next_delay` returns `None` when the sequence is exhausted; an exhausted
/// sequence means the failure propagates, it is never an error by itself.
pub trait Backoff: Send {
    /// Returns the delay before the next attempt, or `None` if exhausted.
    fn next_delay(&mut self) -> Option<Duration>;
}

/// Exponentially growing delays, in seconds.
///
/// The sequence starts at `multiplier` and multiplies by `base` after every
/// yield. A starting value below `minimum` is scaled up by `base` until it
/// reaches `minimum` before anything is yielded, and every yielded value is
/// capped at `maximum`. The sequence never exhausts.
///
/// # Examples
///
/// ```
/// use lariat::backoff::{Backoff, ExponentialBackoff};
/// use std::time::Duration;
///
/// let mut backoff = ExponentialBackoff::new().maximum(10.0);
/// assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
/// assert_eq!(backoff.next_delay(), Some(Duration::from_secs(4)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    base: f64,
    multiplier: f64,
    minimum: f64,
    maximum: f64,
    jitter: bool,
    current: Option<f64>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: 2.0,
            multiplier: 1.0,
            minimum: 1.0,
            maximum: f64::INFINITY,
            jitter: false,
            current: None,
        }
    }
}

impl ExponentialBackoff {
    /// Creates the default sequence: 1s, 2s, 4s, 8s, ... with no cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the growth factor applied after each yielded delay.
    pub fn base(mut self, base: f64) -> Self {
        self.base = base;
        self
    }

    /// Sets the starting value of the sequence, in seconds.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the smallest delay the sequence may start at, in seconds.
    pub fn minimum(mut self, minimum: f64) -> Self {
        self.minimum = minimum;
        self
    }

    /// Caps every yielded delay at `maximum` seconds.
    pub fn maximum(mut self, maximum: f64) -> Self {
        self.maximum = maximum;
        self
    }

    /// Randomizes each delay to between 50% and 100% of its nominal value.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        let value = match self.current {
            Some(previous) => previous * self.base,
            None => {
                // Pre-scale a below-minimum start; degenerate bases that
                // cannot grow are clamped straight to the minimum.
                let mut seed = self.multiplier;
                while seed < self.minimum && seed > 0.0 && self.base > 1.0 {
                    seed *= self.base;
                }
                if seed < self.minimum {
                    seed = self.minimum;
                }
                seed
            }
        };
        self.current = Some(value);

        let capped = value.min(self.maximum);
        let delay = Duration::try_from_secs_f64(capped).unwrap_or(Duration::MAX);
        if self.jitter {
            Some(delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0)))
        } else {
            Some(delay)
        }
    }
}

/// The same delay before every attempt. Never exhausts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    /// Creates a sequence that always yields `delay`.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for FixedBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        Some(self.delay)
    }
}

/// Decides whether the retry budget permits another attempt.
pub trait StopCondition: Send {
    /// Consumes one attempt from the budget and reports whether a further
    /// attempt is still allowed.
    fn permits_another(&mut self) -> bool;
}

/// Permits a fixed number of attempts in total.
///
/// Each consultation consumes one attempt before answering, so a budget of
/// `n` answers `true` exactly `n - 1` times: the `n`th consultation finds
/// the final attempt already spent. Equality compares both the configured
/// budget and the consumed count, which makes positions comparable in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopAfterAttempt {
    max: usize,
    consumed: usize,
}

impl StopAfterAttempt {
    /// Creates a budget of `max` total attempts.
    pub fn new(max: usize) -> Self {
        Self { max, consumed: 0 }
    }
}

impl StopCondition for StopAfterAttempt {
    fn permits_another(&mut self) -> bool {
        self.consumed += 1;
        self.max > self.consumed
    }
}
