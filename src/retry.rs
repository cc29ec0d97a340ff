//! Retry policies and the failure interceptors they mint per call.
//!
//! A [`RetryPolicy`] is declared once on a consumer method. Every outer
//! invocation registers one fresh [`RetryInterceptor`] into the request
//! being built, so attempt counters and backoff positions are never shared
//! between calls. The transport consults the interceptors on each failure
//! and either sleeps and resends, or lets the original failure surface
//! unchanged.

use crate::backoff::{Backoff, ExponentialBackoff, StopAfterAttempt, StopCondition};
use crate::request::RequestBuilder;
use crate::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: usize = 5;
const DEFAULT_RETRY_AFTER_CAP: Duration = Duration::from_secs(300);

/// Decides whether a failure kind is worth another attempt.
///
/// Classifiers look only at the failure itself; budgeting is the stop
/// condition's job.
///
/// # Examples
///
/// ```
/// use lariat::retry::FailureClassifier;
/// use lariat::Error;
///
/// struct RetryOnRateLimit;
///
/// impl FailureClassifier for RetryOnRateLimit {
///     fn is_retryable(&self, failure: &Error) -> bool {
///         matches!(failure, Error::Http { status, .. } if status.as_u16() == 429)
///     }
/// }
/// ```
pub trait FailureClassifier: Send + Sync {
    /// Returns `true` if the failure should be retried.
    fn is_retryable(&self, failure: &Error) -> bool;
}

impl<F> FailureClassifier for F
where
    F: Fn(&Error) -> bool + Send + Sync,
{
    fn is_retryable(&self, failure: &Error) -> bool {
        self(failure)
    }
}

/// Retries everything [`Error::is_retryable`] reports as transient:
/// network errors, timeouts, and 5xx or 429 responses.
#[derive(Debug, Clone, Copy)]
pub struct RetryTransient;

impl FailureClassifier for RetryTransient {
    fn is_retryable(&self, failure: &Error) -> bool {
        failure.is_retryable()
    }
}

/// Retries only 5xx server responses.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnServerError;

impl FailureClassifier for RetryOnServerError {
    fn is_retryable(&self, failure: &Error) -> bool {
        matches!(failure, Error::Http { status, .. } if status.is_server_error())
    }
}

/// Retries only timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeout;

impl FailureClassifier for RetryOnTimeout {
    fn is_retryable(&self, failure: &Error) -> bool {
        matches!(failure, Error::Timeout)
    }
}

/// Retries only network and connection failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnConnectionError;

impl FailureClassifier for RetryOnConnectionError {
    fn is_retryable(&self, failure: &Error) -> bool {
        matches!(failure, Error::Network(_) | Error::Transport { .. })
    }
}

/// Combines classifiers with OR logic: retryable if ANY child says so.
pub struct OrClassifier {
    classifiers: Vec<Box<dyn FailureClassifier>>,
}

impl OrClassifier {
    /// Creates a classifier over the given children.
    pub fn new(classifiers: Vec<Box<dyn FailureClassifier>>) -> Self {
        Self { classifiers }
    }
}

impl FailureClassifier for OrClassifier {
    fn is_retryable(&self, failure: &Error) -> bool {
        self.classifiers.iter().any(|c| c.is_retryable(failure))
    }
}

/// Combines classifiers with AND logic: retryable only if ALL children agree.
pub struct AndClassifier {
    classifiers: Vec<Box<dyn FailureClassifier>>,
}

impl AndClassifier {
    /// Creates a classifier over the given children.
    pub fn new(classifiers: Vec<Box<dyn FailureClassifier>>) -> Self {
        Self { classifiers }
    }
}

impl FailureClassifier for AndClassifier {
    fn is_retryable(&self, failure: &Error) -> bool {
        self.classifiers.iter().all(|c| c.is_retryable(failure))
    }
}

/// What a failure interceptor tells the transport to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Sleep for `delay`, then resend the identical request.
    Resume {
        /// How long to wait before the next attempt.
        delay: Duration,
    },
    /// Give up; the original failure surfaces unchanged.
    Propagate,
}

/// A per-call participant in the transport's failure path.
pub trait FailureInterceptor: Send {
    /// Consulted once per failed attempt; the verdict is final for that
    /// consultation.
    fn on_failure(&mut self, failure: &Error) -> FailureAction;
}

/// Consults `interceptors` in registration order and returns the first
/// [`FailureAction::Resume`], or [`FailureAction::Propagate`] if none
/// elects to resume.
///
/// Transports call this once per failed attempt.
pub fn consult_interceptors(
    interceptors: &mut [Box<dyn FailureInterceptor>],
    failure: &Error,
) -> FailureAction {
    for interceptor in interceptors.iter_mut() {
        if let resume @ FailureAction::Resume { .. } = interceptor.on_failure(failure) {
            return resume;
        }
    }
    FailureAction::Propagate
}

/// Declares when and how a consumer method retries.
///
/// A policy is immutable configuration; the mutable attempt state lives in
/// the interceptor it mints for each call. The default policy retries
/// transient failures up to 5 attempts with exponential backoff (1s, 2s,
/// 4s, 8s) and honors server `Retry-After` hints up to 5 minutes.
///
/// # Examples
///
/// ```
/// use lariat::backoff::{ExponentialBackoff, StopAfterAttempt};
/// use lariat::retry::{RetryOnServerError, RetryPolicy};
///
/// let policy = RetryPolicy::new()
///     .classify(RetryOnServerError)
///     .stop(StopAfterAttempt::new(3))
///     .backoff(ExponentialBackoff::new().maximum(30.0).with_jitter());
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    classifier: Arc<dyn FailureClassifier>,
    stop: Arc<dyn Fn() -> Box<dyn StopCondition> + Send + Sync>,
    backoff: Arc<dyn Fn() -> Box<dyn Backoff> + Send + Sync>,
    retry_after_cap: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy {
    /// Creates the default policy described on the type.
    pub fn new() -> Self {
        Self {
            classifier: Arc::new(RetryTransient),
            stop: Arc::new(|| Box::new(StopAfterAttempt::new(DEFAULT_MAX_ATTEMPTS))),
            backoff: Arc::new(|| Box::new(ExponentialBackoff::new())),
            retry_after_cap: Some(DEFAULT_RETRY_AFTER_CAP),
        }
    }

    /// Shorthand for [`stop`](Self::stop) with a total-attempt budget of `n`.
    pub fn max_attempts(self, n: usize) -> Self {
        self.stop(StopAfterAttempt::new(n))
    }

    /// Sets the stop condition; each call gets a fresh clone of `stop`.
    pub fn stop<S>(mut self, stop: S) -> Self
    where
        S: StopCondition + Clone + Sync + 'static,
    {
        self.stop = Arc::new(move || Box::new(stop.clone()));
        self
    }

    /// Sets the backoff sequence; each call gets a fresh clone of `backoff`.
    pub fn backoff<B>(mut self, backoff: B) -> Self
    where
        B: Backoff + Clone + Sync + 'static,
    {
        self.backoff = Arc::new(move || Box::new(backoff.clone()));
        self
    }

    /// Sets the failure classifier. Accepts any [`FailureClassifier`],
    /// including a plain `Fn(&Error) -> bool` closure.
    pub fn classify<C>(mut self, classifier: C) -> Self
    where
        C: FailureClassifier + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Caps how long a server `Retry-After` hint may stretch one delay.
    pub fn retry_after_cap(mut self, cap: Duration) -> Self {
        self.retry_after_cap = Some(cap);
        self
    }

    /// Ignores server `Retry-After` hints; delays come from the backoff
    /// sequence alone.
    pub fn ignore_retry_after(mut self) -> Self {
        self.retry_after_cap = None;
        self
    }

    /// Mints an interceptor with fresh attempt state.
    pub fn interceptor(&self) -> RetryInterceptor {
        RetryInterceptor {
            classifier: Arc::clone(&self.classifier),
            stop: (self.stop)(),
            backoff: (self.backoff)(),
            retry_after_cap: self.retry_after_cap,
        }
    }

    /// Registers a fresh interceptor into the request being built.
    ///
    /// Called once per outer invocation, at request-build time. Policies
    /// applied to the same builder are consulted in application order.
    pub fn apply(&self, builder: &mut RequestBuilder) {
        builder.add_interceptor(Box::new(self.interceptor()));
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retry_after_cap", &self.retry_after_cap)
            .finish_non_exhaustive()
    }
}

/// The per-call failure interceptor a [`RetryPolicy`] mints.
///
/// On each failure it asks the classifier, then the stop condition (which
/// consumes one attempt from the budget), then the backoff sequence. Only
/// when all three cooperate does it elect to resume; a spent budget or an
/// exhausted sequence means the failure propagates.
pub struct RetryInterceptor {
    classifier: Arc<dyn FailureClassifier>,
    stop: Box<dyn StopCondition>,
    backoff: Box<dyn Backoff>,
    retry_after_cap: Option<Duration>,
}

impl FailureInterceptor for RetryInterceptor {
    fn on_failure(&mut self, failure: &Error) -> FailureAction {
        if !self.classifier.is_retryable(failure) {
            return FailureAction::Propagate;
        }
        if !self.stop.permits_another() {
            return FailureAction::Propagate;
        }
        match self.backoff.next_delay() {
            Some(delay) => {
                // A server hint takes precedence over the computed delay,
                // up to the configured cap.
                let delay = match (failure.retry_after(), self.retry_after_cap) {
                    (Some(hint), Some(cap)) => hint.min(cap),
                    _ => delay,
                };
                FailureAction::Resume { delay }
            }
            None => FailureAction::Propagate,
        }
    }
}

impl fmt::Debug for RetryInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryInterceptor")
            .field("retry_after_cap", &self.retry_after_cap)
            .finish_non_exhaustive()
    }
}
