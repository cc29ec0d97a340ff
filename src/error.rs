//! Error types for declarative API calls.
//!
//! This module provides the crate-wide error taxonomy. Configuration and
//! definition errors surface deterministically at first use of the affected
//! method, before any network activity. Transport failures surface with full
//! fidelity once the retry budget is exhausted: the original failure is
//! never wrapped or replaced on the way out.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// The cause carried by a failed request-definition compile.
///
/// Produced by a [`RequestDescription`](crate::definition::RequestDescription)
/// whose declared method cannot be turned into a valid
/// [`RequestDefinition`](crate::definition::RequestDefinition). It is cached
/// on the descriptor that owns the method, so every later access observes the
/// same failure without rebuilding.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct InvalidDefinition {
    message: String,
}

impl InvalidDefinition {
    /// Creates a new compile failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The human-readable reason the definition failed to compile.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The main error type for declarative API calls.
///
/// Transport-facing variants (`Http`, `Timeout`, `Network`, `Transport`) are
/// the structured failure descriptions that
/// [`FailureClassifier`](crate::retry::FailureClassifier)s consult when
/// deciding whether a failed attempt may be retried.
///
/// # Examples
///
/// ```
/// use lariat::Error;
/// use http::StatusCode;
///
/// let err = Error::Http {
///     status: StatusCode::INTERNAL_SERVER_ERROR,
///     body: "server error".to_string(),
///     headers: http::HeaderMap::new(),
///     retry_after: None,
/// };
/// assert!(err.is_retryable());
///
/// let err = Error::Http {
///     status: StatusCode::BAD_REQUEST,
///     body: "bad request".to_string(),
///     headers: http::HeaderMap::new(),
///     retry_after: None,
/// };
/// assert!(!err.is_retryable());
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A declared method's description failed to compile into a request
    /// definition.
    ///
    /// Carries the owning consumer type's name, the method (attribute) name,
    /// and the original cause. Raised at first access to the method and on
    /// every access thereafter; the build is never retried.
    #[error("invalid request definition for `{consumer}.{method}`: {source}")]
    Binding {
        /// Name of the consumer type that owns the malformed method.
        consumer: String,
        /// Name of the malformed method.
        method: String,
        /// The compile failure reported by the description.
        #[source]
        source: InvalidDefinition,
    },

    /// A method name was looked up on a consumer that never registered it.
    #[error("consumer `{consumer}` has no method `{method}`")]
    UnknownMethod {
        /// Name of the consumer type.
        consumer: String,
        /// The unknown method name.
        method: String,
    },

    /// Invalid configuration was provided.
    ///
    /// This indicates a problem with how the consumer, a request, or an auth
    /// transform was configured, such as an invalid header value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The base URL and request URI could not be resolved into an absolute
    /// URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A transaction hook refused the request before dispatch.
    #[error("hook error: {0}")]
    Hook(String),

    /// Body conversion failed.
    ///
    /// Raised by a [`Converter`](crate::convert::Converter) on either side of
    /// the wire, most commonly when a response body is not valid JSON. Never
    /// retryable.
    ///
    /// Response-side failures keep the payload that refused to decode and
    /// the status it arrived with, so the bad response can be inspected
    /// instead of reconstructed.
    #[error("conversion failed: {message}")]
    Convert {
        /// The stringified converter failure.
        message: String,
        /// The raw payload that failed to convert, when one was in hand.
        body: Option<String>,
        /// The HTTP status of the response being decoded, if known.
        status: Option<StatusCode>,
    },

    /// The server returned a non-2xx HTTP status code.
    ///
    /// Produced by the bundled reqwest adapter; custom transports are free to
    /// map their own status handling onto this variant so that status-based
    /// retry classifiers keep working.
    #[error("HTTP error {status}: {body}")]
    Http {
        /// The HTTP status code.
        status: StatusCode,
        /// The raw response body.
        body: String,
        /// The response headers.
        headers: HeaderMap,
        /// Server-provided wait hint, parsed from `Retry-After` or the
        /// rate-limit reset headers, if present.
        retry_after: Option<Duration>,
    },

    /// The request timed out at the transport layer.
    #[error("request timed out")]
    Timeout,

    /// A network-level error occurred (connection failed, DNS lookup failed,
    /// and so on).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A failure reported by a transport other than the bundled adapter.
    #[error("transport error: {message}")]
    Transport {
        /// The transport's own description of the failure.
        message: String,
    },
}

impl Error {
    /// Returns `true` if this failure is potentially retryable.
    ///
    /// Network errors, timeouts, 5xx responses, and 429 responses are
    /// considered retryable. Definition, configuration, hook, and conversion
    /// errors are not: retrying them would deterministically fail again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Timeout => true,
            Error::Transport { .. } => true,
            Error::Http { status, .. } => {
                status.is_server_error() || status.as_u16() == 429
            }
            Error::Binding { .. } => false,
            Error::UnknownMethod { .. } => false,
            Error::Configuration(_) => false,
            Error::InvalidUrl(_) => false,
            Error::Hook(_) => false,
            Error::Convert { .. } => false,
        }
    }

    /// Returns the HTTP status code if this failure has one.
    ///
    /// `Http` failures always carry one; `Convert` failures carry one when
    /// the conversion was decoding a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Convert { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns the raw response body if this failure has one.
    pub fn body(&self) -> Option<&str> {
        match self {
            Error::Http { body, .. } => Some(body),
            Error::Convert { body, .. } => body.as_deref(),
            _ => None,
        }
    }

    /// Returns the server's `Retry-After` hint, if one was attached.
    ///
    /// Only `Http` failures carry a hint; whether the retry machinery honors
    /// it is decided by the [`RetryPolicy`](crate::RetryPolicy).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A specialized `Result` type for declarative API calls.
pub type Result<T> = std::result::Result<T, Error>;
