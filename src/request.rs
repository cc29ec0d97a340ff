//! Per-call request assembly: invocation arguments, request metadata, and
//! the builder a definition fills before dispatch.

use crate::convert::{ConverterRegistry, Payload};
use crate::hooks::TransactionHook;
use crate::retry::FailureInterceptor;
use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The arguments of one bound-method invocation.
///
/// Positional values are addressed by index, named values by key. Values
/// are JSON-shaped so definitions can route them into paths, query
/// parameters, headers, or bodies without knowing concrete types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Value>,
    named: HashMap<String, Value>,
}

impl CallArgs {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a named argument.
    pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Returns the positional argument at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Returns the named argument `name`.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    /// Number of positional arguments. Named arguments are not counted;
    /// URI placeholder arity depends on positional values alone.
    pub fn positional_len(&self) -> usize {
        self.positional.len()
    }

    /// Returns `true` if no arguments were supplied at all.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Everything a single request carries besides method and URL.
///
/// Hooks audit this by reference; definitions and auth transforms write
/// into it while the request is being assembled.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Request headers.
    pub headers: HeaderMap,

    /// Query parameters, in insertion order. Repeated keys are allowed.
    pub params: Vec<(String, String)>,

    /// The request body, if any, as left by the request converter.
    pub body: Option<Payload>,

    /// Per-request timeout override.
    pub timeout: Option<Duration>,
}

impl RequestInfo {
    /// Creates empty request info.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any previous value for the name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name or value is invalid.
    pub fn add_header(&mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<()> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header name: {e}")))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Appends a query parameter.
    pub fn add_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.push((key.into(), value.into()));
    }

    /// Sets the request body.
    pub fn set_body(&mut self, body: Payload) {
        self.body = Some(body);
    }

    /// Sets the per-request timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }
}

/// The mutable request under assembly for one invocation.
///
/// A fresh builder starts as `GET ""` with empty info. The definition fills
/// it from the call arguments; retry policies register their interceptors
/// into it; method-level hooks attach to it. The preparer then resolves it
/// against consumer-level configuration and dispatches.
pub struct RequestBuilder {
    method: Method,
    relative_url: String,
    info: RequestInfo,
    transaction_hooks: Vec<Arc<dyn TransactionHook>>,
    interceptors: Vec<Box<dyn FailureInterceptor>>,
    registry: ConverterRegistry,
}

impl RequestBuilder {
    /// Creates a fresh builder scoped to `registry`.
    pub fn new(registry: ConverterRegistry) -> Self {
        Self {
            method: Method::GET,
            relative_url: String::new(),
            info: RequestInfo::new(),
            transaction_hooks: Vec::new(),
            interceptors: Vec::new(),
            registry,
        }
    }

    /// Sets the HTTP method.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// The HTTP method, `GET` until set.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Sets the request target: a path relative to the consumer's base URL,
    /// or an absolute URL that overrides the base entirely.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.relative_url = url.into();
    }

    /// The request target as set by the definition.
    pub fn relative_url(&self) -> &str {
        &self.relative_url
    }

    /// The request info being assembled.
    pub fn info(&self) -> &RequestInfo {
        &self.info
    }

    /// Mutable access to the request info.
    pub fn info_mut(&mut self) -> &mut RequestInfo {
        &mut self.info
    }

    /// The converter registry scoped to this request's definition.
    pub fn converter_registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Appends a method-level hook. These run after consumer-level hooks.
    pub fn add_transaction_hook(&mut self, hook: Arc<dyn TransactionHook>) {
        self.transaction_hooks.push(hook);
    }

    /// The method-level hooks attached so far, in declaration order.
    pub fn transaction_hooks(&self) -> &[Arc<dyn TransactionHook>] {
        &self.transaction_hooks
    }

    /// Registers a failure interceptor. Consulted in registration order.
    pub fn add_interceptor(&mut self, interceptor: Box<dyn FailureInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Method, RequestInfo, Vec<Box<dyn FailureInterceptor>>) {
        (self.method, self.info, self.interceptors)
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("relative_url", &self.relative_url)
            .field("info", &self.info)
            .field("transaction_hooks", &self.transaction_hooks.len())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
