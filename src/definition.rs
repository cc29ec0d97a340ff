//! Declaration-layer contracts: how a method description becomes an
//! immutable request definition.
//!
//! A [`RequestDescription`] is the declaration-time artifact registered
//! against a consumer method. Compiling it yields a [`RequestDefinition`],
//! which is immutable and fills one request per invocation. The
//! [`CompiledDefinition`] wrapper gives every compiled definition a
//! process-unique identity, which is what call memoization keys on.

use crate::convert::{ConverterFactory, ConverterRegistry, Payload, Purpose};
use crate::error::InvalidDefinition;
use crate::hooks::TransactionHook;
use crate::request::{CallArgs, RequestBuilder};
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use http::{HeaderName, HeaderValue, Method};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A declaration-time method description, compiled at most once.
///
/// Closures work too: any `Fn() -> Result<Arc<dyn RequestDefinition>,
/// InvalidDefinition>` is a description.
pub trait RequestDescription: Send + Sync {
    /// Compiles the description into an immutable definition.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDefinition`] when the description is malformed. The
    /// failure is cached by the descriptor that owns this description and
    /// re-surfaced on every later access.
    fn build(&self) -> std::result::Result<Arc<dyn RequestDefinition>, InvalidDefinition>;
}

impl<F> RequestDescription for F
where
    F: Fn() -> std::result::Result<Arc<dyn RequestDefinition>, InvalidDefinition> + Send + Sync,
{
    fn build(&self) -> std::result::Result<Arc<dyn RequestDefinition>, InvalidDefinition> {
        self()
    }
}

/// An immutable, compiled request definition.
///
/// One definition serves every invocation of its method: `fill_request`
/// writes the per-call fields into a fresh builder and must not keep state
/// between calls.
pub trait RequestDefinition: Send + Sync {
    /// Fills the request under assembly from the invocation arguments.
    fn fill_request(&self, builder: &mut RequestBuilder, args: &CallArgs) -> Result<()>;

    /// Method-level hooks, in declaration order. These run after
    /// consumer-level hooks.
    fn transaction_hooks(&self) -> &[Arc<dyn TransactionHook>] {
        &[]
    }

    /// Builds the converter registry for this definition's requests from
    /// the consumer-level factories. The default keeps them as-is.
    fn converter_registry(&self, factories: &[Arc<dyn ConverterFactory>]) -> ConverterRegistry {
        ConverterRegistry::new(factories.to_vec())
    }
}

static NEXT_DEFINITION_ID: AtomicU64 = AtomicU64::new(0);

/// A compiled definition plus a process-unique identity.
///
/// The identity is what a consumer's call cache keys on: building the same
/// `CompiledDefinition` twice against one configuration yields the identical
/// call, while a different definition always yields a distinct one. Clones
/// share the identity.
#[derive(Clone)]
pub struct CompiledDefinition {
    id: u64,
    definition: Arc<dyn RequestDefinition>,
}

impl CompiledDefinition {
    /// Wraps a definition with a fresh identity.
    pub fn new(definition: Arc<dyn RequestDefinition>) -> Self {
        Self {
            id: NEXT_DEFINITION_ID.fetch_add(1, Ordering::Relaxed),
            definition,
        }
    }

    /// The process-unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The wrapped definition.
    pub fn definition(&self) -> &Arc<dyn RequestDefinition> {
        &self.definition
    }
}

impl PartialEq for CompiledDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CompiledDefinition {}

impl fmt::Debug for CompiledDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledDefinition").field("id", &self.id).finish()
    }
}

/// The stock request description: an HTTP method plus a URI template.
///
/// Positional invocation arguments fill `{}` placeholders left to right;
/// named arguments route to declared query parameters or the body. All
/// declaration errors surface at compile time, not per call.
///
/// # Examples
///
/// ```
/// use lariat::definition::RequestTemplate;
/// use lariat::retry::RetryPolicy;
///
/// let timeline = RequestTemplate::get("users/{}/timeline")
///     .query("page")
///     .header("accept", "application/json")
///     .retry(RetryPolicy::new().max_attempts(3));
/// ```
#[derive(Clone)]
pub struct RequestTemplate {
    method: Method,
    uri: String,
    queries: Vec<String>,
    body_arg: Option<String>,
    headers: Vec<(String, String)>,
    hooks: Vec<Arc<dyn TransactionHook>>,
    policies: Vec<RetryPolicy>,
    timeout: Option<Duration>,
}

impl RequestTemplate {
    /// Creates a template for `method` and `uri`.
    ///
    /// The URI may be relative to the consumer's base URL or absolute; an
    /// absolute URI overrides the base at prepare time.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            queries: Vec::new(),
            body_arg: None,
            headers: Vec::new(),
            hooks: Vec::new(),
            policies: Vec::new(),
            timeout: None,
        }
    }

    /// Shorthand for a `GET` template.
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Shorthand for a `POST` template.
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Shorthand for a `PUT` template.
    pub fn put(uri: impl Into<String>) -> Self {
        Self::new(Method::PUT, uri)
    }

    /// Shorthand for a `DELETE` template.
    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(Method::DELETE, uri)
    }

    /// Routes the named argument `name` to a query parameter of the same
    /// name. Absent arguments are simply omitted.
    pub fn query(mut self, name: impl Into<String>) -> Self {
        self.queries.push(name.into());
        self
    }

    /// Routes the named argument `name` through the request-body converter
    /// into the body. The argument is required at invocation time.
    pub fn body(mut self, name: impl Into<String>) -> Self {
        self.body_arg = Some(name.into());
        self
    }

    /// Adds a static header to every request of this method.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends a method-level hook. Declaration order is preserved.
    pub fn hook(mut self, hook: impl TransactionHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Attaches a retry policy. Policies stack: each one registers its own
    /// interceptor per call, consulted in declaration order.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Sets a per-request timeout for this method.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl RequestDescription for RequestTemplate {
    fn build(&self) -> std::result::Result<Arc<dyn RequestDefinition>, InvalidDefinition> {
        let segments: Vec<String> = self.uri.split("{}").map(str::to_string).collect();
        for segment in &segments {
            if segment.contains('{') || segment.contains('}') {
                return Err(InvalidDefinition::new(format!(
                    "unbalanced placeholder in URI template `{}`",
                    self.uri
                )));
            }
        }

        let mut headers = Vec::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::try_from(name.as_str()).map_err(|e| {
                InvalidDefinition::new(format!("invalid header name `{name}`: {e}"))
            })?;
            let value = HeaderValue::try_from(value.as_str()).map_err(|e| {
                InvalidDefinition::new(format!("invalid header value for `{name:?}`: {e}"))
            })?;
            headers.push((name, value));
        }

        Ok(Arc::new(TemplateDefinition {
            method: self.method.clone(),
            segments,
            queries: self.queries.clone(),
            body_arg: self.body_arg.clone(),
            headers,
            hooks: self.hooks.clone(),
            policies: self.policies.clone(),
            timeout: self.timeout,
        }))
    }
}

struct TemplateDefinition {
    method: Method,
    segments: Vec<String>,
    queries: Vec<String>,
    body_arg: Option<String>,
    headers: Vec<(HeaderName, HeaderValue)>,
    hooks: Vec<Arc<dyn TransactionHook>>,
    policies: Vec<RetryPolicy>,
    timeout: Option<Duration>,
}

impl TemplateDefinition {
    fn display_value(builder: &RequestBuilder, value: &Value) -> Result<String> {
        let converter = builder.converter_registry().get(Purpose::Display)?;
        match converter.convert(Payload::Json(value.clone()))? {
            Payload::Text(text) => Ok(text),
            _ => Err(Error::Convert {
                message: "display converter must produce text".to_string(),
                body: None,
                status: None,
            }),
        }
    }
}

impl RequestDefinition for TemplateDefinition {
    fn fill_request(&self, builder: &mut RequestBuilder, args: &CallArgs) -> Result<()> {
        builder.set_method(self.method.clone());

        let placeholders = self.segments.len() - 1;
        let mut uri = String::new();
        for (index, segment) in self.segments.iter().enumerate() {
            uri.push_str(segment);
            if index < placeholders {
                let value = args.get(index).ok_or_else(|| {
                    Error::Configuration(format!(
                        "URI takes {placeholders} positional arguments, got {}",
                        args.positional_len()
                    ))
                })?;
                uri.push_str(&Self::display_value(builder, value)?);
            }
        }
        builder.set_url(uri);

        for (name, value) in &self.headers {
            builder.info_mut().headers.insert(name.clone(), value.clone());
        }

        for name in &self.queries {
            if let Some(value) = args.get_named(name) {
                let rendered = Self::display_value(builder, value)?;
                builder.info_mut().add_param(name.clone(), rendered);
            }
        }

        if let Some(body_arg) = &self.body_arg {
            let value = args.get_named(body_arg).ok_or_else(|| {
                Error::Configuration(format!("missing body argument `{body_arg}`"))
            })?;
            let converter = builder.converter_registry().get(Purpose::RequestBody)?;
            let body = converter.convert(Payload::Json(value.clone()))?;
            // A content-type declared on the template wins over the default.
            if !builder.info().headers.contains_key(http::header::CONTENT_TYPE) {
                builder.info_mut().headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
            builder.info_mut().set_body(body);
        }

        if let Some(timeout) = self.timeout {
            builder.info_mut().set_timeout(timeout);
        }

        for policy in &self.policies {
            policy.apply(builder);
        }

        Ok(())
    }

    fn transaction_hooks(&self) -> &[Arc<dyn TransactionHook>] {
        &self.hooks
    }
}
