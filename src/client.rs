//! The transport seam and the bundled reqwest adapter.
//!
//! The orchestration core never performs I/O itself. It hands a fully
//! prepared [`RequestIntent`] to an [`HttpClient`] collaborator and returns
//! the resulting [`Dispatch`] verbatim, without awaiting it. The adapter
//! owns the send loop: on each failure it consults the intent's failure
//! interceptors and either sleeps and resends the identical request or
//! lets the original failure surface unchanged.

use crate::convert::Payload;
use crate::request::RequestInfo;
use crate::response::Response;
use crate::retry::{consult_interceptors, FailureAction, FailureInterceptor};
use crate::{Error, Result};
use futures::future::BoxFuture;
use http::{HeaderMap, Method};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use url::Url;

/// The deferred outcome of a dispatched request.
///
/// Callers await it; the core that produced it does not.
pub type Dispatch = BoxFuture<'static, Result<Response>>;

/// A response transformation attached before dispatch. The prepared hook
/// chain travels to the adapter in this shape.
pub type ResponseCallback = Arc<dyn Fn(Response) -> Result<Response> + Send + Sync>;

/// One fully prepared request, ready to send.
pub struct RequestIntent {
    /// The HTTP method.
    pub method: Method,
    /// The resolved, absolute URL.
    pub url: Url,
    /// Headers, query parameters, body, and timeout.
    pub info: RequestInfo,
    /// Failure interceptors, consulted in registration order.
    pub interceptors: Vec<Box<dyn FailureInterceptor>>,
}

impl fmt::Debug for RequestIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestIntent")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// A transport collaborator that can mint pending requests.
pub trait HttpClient: Send + Sync {
    /// Begins a new request. Callbacks are attached before `send`.
    fn create_request(&self) -> Box<dyn PendingRequest>;
}

/// A request under construction at the transport boundary.
pub trait PendingRequest: Send {
    /// Attaches a response callback. Callbacks run in attachment order
    /// after a successful receipt; their failures propagate to the caller
    /// without interceptor consultation.
    fn add_callback(&mut self, callback: ResponseCallback);

    /// Consumes the pending request and dispatches `intent`.
    fn send(self: Box<Self>, intent: RequestIntent) -> Dispatch;
}

/// Normalizes the supported client representations into one adapter.
pub trait IntoClient {
    /// Converts `self` into the canonical transport handle.
    fn into_client(self) -> Arc<dyn HttpClient>;
}

impl IntoClient for Arc<dyn HttpClient> {
    fn into_client(self) -> Arc<dyn HttpClient> {
        self
    }
}

impl IntoClient for ReqwestClient {
    fn into_client(self) -> Arc<dyn HttpClient> {
        Arc::new(self)
    }
}

impl IntoClient for reqwest::Client {
    fn into_client(self) -> Arc<dyn HttpClient> {
        Arc::new(ReqwestClient::new(self))
    }
}

/// The bundled transport adapter over [`reqwest`].
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Clone, Default)]
pub struct ReqwestClient {
    http: reqwest::Client,
}

impl ReqwestClient {
    /// Wraps an existing `reqwest::Client`, keeping its pool and defaults.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl fmt::Debug for ReqwestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestClient").finish()
    }
}

impl HttpClient for ReqwestClient {
    fn create_request(&self) -> Box<dyn PendingRequest> {
        Box::new(ReqwestPendingRequest {
            http: self.http.clone(),
            callbacks: Vec::new(),
        })
    }
}

struct ReqwestPendingRequest {
    http: reqwest::Client,
    callbacks: Vec<ResponseCallback>,
}

impl PendingRequest for ReqwestPendingRequest {
    fn add_callback(&mut self, callback: ResponseCallback) {
        self.callbacks.push(callback);
    }

    fn send(self: Box<Self>, intent: RequestIntent) -> Dispatch {
        let http = self.http;
        let callbacks = self.callbacks;
        // Interceptors are Send but not Sync, so the intent must not be
        // borrowed whole across an await point. Split it up front.
        let RequestIntent {
            method,
            url,
            info,
            mut interceptors,
        } = intent;
        Box::pin(async move {
            let start = Instant::now();
            let mut attempt = 0usize;

            loop {
                attempt += 1;
                tracing::debug!(%method, %url, attempt, "dispatching request");

                match execute_once(&http, &method, &url, &info, start, attempt).await {
                    Ok(mut response) => {
                        for callback in &callbacks {
                            response = callback(response)?;
                        }
                        return Ok(response);
                    }
                    Err(failure) => {
                        tracing::warn!(error = %failure, attempt, "request attempt failed");
                        match consult_interceptors(&mut interceptors, &failure) {
                            FailureAction::Resume { delay } => {
                                tracing::info!(
                                    delay_ms = delay.as_millis() as u64,
                                    attempt,
                                    "retrying after delay"
                                );
                                tokio::time::sleep(delay).await;
                            }
                            FailureAction::Propagate => return Err(failure),
                        }
                    }
                }
            }
        })
    }
}

/// Sends one attempt and assembles the raw response.
///
/// Non-success statuses become `Error::Http` so the failure path can
/// classify them like any other transport failure.
async fn execute_once(
    http: &reqwest::Client,
    method: &Method,
    url: &Url,
    info: &RequestInfo,
    start: Instant,
    attempt: usize,
) -> Result<Response> {
    let mut request = http.request(method.clone(), url.clone());

    for (name, value) in &info.headers {
        request = request.header(name, value);
    }
    if !info.params.is_empty() {
        request = request.query(&info.params);
    }
    if let Some(timeout) = info.timeout {
        request = request.timeout(timeout);
    }
    if let Some(body) = &info.body {
        request = match body {
            Payload::Bytes(bytes) => request.body(bytes.clone()),
            Payload::Json(value) => request.json(value),
            Payload::Text(text) => request.body(text.clone()),
        };
    }

    let response = request.send().await.map_err(map_send_error)?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(map_send_error)?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&body).into_owned();
        if status.is_client_error() {
            tracing::error!(status = status.as_u16(), body = %body, "client error response");
        } else {
            tracing::warn!(status = status.as_u16(), body = %body, "server error response");
        }
        let retry_after = retry_hint(&headers);
        return Err(Error::Http {
            status,
            body,
            headers,
            retry_after,
        });
    }

    let latency = start.elapsed();
    tracing::info!(
        status = status.as_u16(),
        latency_ms = latency.as_millis() as u64,
        attempts = attempt,
        "received response"
    );
    Ok(Response::new(
        status,
        headers,
        Payload::Bytes(body),
        latency,
        attempt,
    ))
}

fn map_send_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Timeout
    } else {
        Error::Network(error)
    }
}

/// Extracts the wait a throttling server asked for before the next attempt.
///
/// An explicit `Retry-After` header wins; otherwise the
/// `X-RateLimit-Reset`/`RateLimit-Reset` epoch timestamps many APIs attach
/// to 429 responses serve as a fallback.
pub fn retry_hint(headers: &HeaderMap) -> Option<Duration> {
    parse_retry_after(headers).or_else(|| parse_rate_limit_reset(headers))
}

/// Parses a `Retry-After` header, in either delay-seconds or HTTP-date
/// form, into a wait duration.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get("retry-after")?.to_str().ok()?;

    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = httpdate::parse_http_date(header) {
        if let Ok(until) = date.duration_since(SystemTime::now()) {
            return Some(until);
        }
    }

    None
}

/// Parses `X-RateLimit-Reset`/`RateLimit-Reset` (Unix epoch seconds) into
/// the remaining wait. Timestamps already in the past yield `None`.
fn parse_rate_limit_reset(headers: &HeaderMap) -> Option<Duration> {
    let header = ["x-ratelimit-reset", "ratelimit-reset"]
        .into_iter()
        .find_map(|name| headers.get(name))?;
    let timestamp = header.to_str().ok()?.parse::<u64>().ok()?;
    let reset_at = UNIX_EPOCH + Duration::from_secs(timestamp);
    reset_at.duration_since(SystemTime::now()).ok()
}
