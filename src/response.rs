//! Response wrapper carrying the decoded body plus transaction metadata.
//!
//! The [`Response`] type pairs the converted body with what the transport
//! learned along the way: status, headers, total latency, and how many
//! attempts the request took. Hooks receive and may transform it before it
//! reaches the caller.

use crate::convert::Payload;
use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A completed HTTP transaction.
///
/// # Examples
///
/// ```
/// use lariat::convert::Payload;
/// use lariat::Response;
/// use http::{HeaderMap, StatusCode};
/// use std::time::Duration;
///
/// let response = Response::new(
///     StatusCode::OK,
///     HeaderMap::new(),
///     Payload::Json(serde_json::json!({"id": 7})),
///     Duration::from_millis(120),
///     1,
/// );
///
/// assert!(!response.was_retried());
/// assert_eq!(response.status, StatusCode::OK);
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The body, as left by the response converter and any hooks.
    pub body: Payload,

    /// Total latency across every attempt, from first send to final receipt.
    pub latency: Duration,

    /// How many attempts the request took. `1` means no retries.
    pub attempts: usize,
}

impl Response {
    /// Creates a response. Typically called by client adapters.
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Payload,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            latency,
            attempts,
        }
    }

    /// Returns `true` if the request needed more than one attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Deserializes the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if the body does not decode into `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use lariat::convert::Payload;
    /// # use lariat::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use serde::Deserialize;
    /// # use std::time::Duration;
    /// #[derive(Deserialize)]
    /// struct User {
    ///     id: u64,
    /// }
    ///
    /// let response = Response::new(
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Payload::Json(serde_json::json!({"id": 7})),
    ///     Duration::from_millis(5),
    ///     1,
    /// );
    /// let user: User = response.json().unwrap();
    /// assert_eq!(user.id, 7);
    /// ```
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let convert = |e: serde_json::Error, raw: String| Error::Convert {
            message: e.to_string(),
            body: Some(raw),
            status: Some(self.status),
        };
        match &self.body {
            Payload::Json(value) => serde_json::from_value(value.clone())
                .map_err(|e| convert(e, value.to_string())),
            Payload::Bytes(bytes) => serde_json::from_slice(bytes)
                .map_err(|e| convert(e, String::from_utf8_lossy(bytes).into_owned())),
            Payload::Text(text) => {
                serde_json::from_str(text).map_err(|e| convert(e, text.clone()))
            }
        }
    }

    /// Transforms the body while preserving the transaction metadata.
    pub fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(Payload) -> Payload,
    {
        Self {
            body: f(self.body),
            ..self
        }
    }
}
