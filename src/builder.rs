//! Consumer configuration, the immutable request preparer, and the
//! memoized call.
//!
//! A [`CallBuilder`] aggregates everything one consumer instance shares
//! across its methods: base URL, transport, converters, hooks, and auth.
//! Building a call snapshots that state into a [`RequestPreparer`], so
//! later mutation of the builder never reaches calls that already exist.
//! Builds are memoized per definition identity: one [`Call`] per
//! (builder, definition) pair for the builder's lifetime.

use crate::auth::{Anonymous, AuthTransform, IntoAuth};
use crate::client::{
    Dispatch, HttpClient, IntoClient, ReqwestClient, RequestIntent, ResponseCallback,
};
use crate::convert::{ConverterFactory, ConverterRegistry, Purpose, StandardConverter};
use crate::definition::CompiledDefinition;
use crate::hooks::{HookChain, TransactionHook};
use crate::request::{CallArgs, RequestBuilder};
use crate::response::Response;
use crate::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use url::Url;

/// Mutable consumer-level configuration plus the call cache.
///
/// The converter sequence keeps the [`StandardConverter`] at the back from
/// construction onward; converters added later go to the front, gaining
/// priority over everything already present. Hooks append in registration
/// order. Mutation is meant for the configuration phase, before the first
/// call is built.
pub struct CallBuilder {
    base_url: String,
    client: Arc<dyn HttpClient>,
    converters: VecDeque<Arc<dyn ConverterFactory>>,
    hooks: Vec<Arc<dyn TransactionHook>>,
    auth: Arc<dyn AuthTransform>,
    calls: Mutex<HashMap<u64, Call>>,
}

impl CallBuilder {
    /// Creates a builder with no base URL, the bundled reqwest transport,
    /// the standard JSON converter, no hooks, and anonymous auth.
    pub fn new() -> Self {
        let mut converters: VecDeque<Arc<dyn ConverterFactory>> = VecDeque::new();
        converters.push_back(Arc::new(StandardConverter));
        Self {
            base_url: String::new(),
            client: Arc::new(ReqwestClient::default()),
            converters,
            hooks: Vec::new(),
            auth: Arc::new(Anonymous),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// The base URL, exactly as it was set.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sets the base URL. Stored verbatim; resolution happens per request.
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into();
    }

    /// The transport adapter.
    pub fn client(&self) -> &Arc<dyn HttpClient> {
        &self.client
    }

    /// Sets the transport. Accepts anything [`IntoClient`] normalizes:
    /// a `reqwest::Client`, a [`ReqwestClient`], or a custom adapter.
    pub fn set_client(&mut self, client: impl IntoClient) {
        self.client = client.into_client();
    }

    /// The auth transform, [`Anonymous`] until set.
    pub fn auth(&self) -> &Arc<dyn AuthTransform> {
        &self.auth
    }

    /// Sets the auth transform through the [`IntoAuth`] normalizer.
    pub fn set_auth(&mut self, auth: impl IntoAuth) {
        self.auth = auth.into_auth();
    }

    /// Pushes a converter factory to the front of the sequence, giving it
    /// priority over every factory already registered.
    pub fn add_converter(&mut self, factory: impl ConverterFactory + 'static) {
        self.converters.push_front(Arc::new(factory));
    }

    /// The converter sequence, highest priority first.
    pub fn converters(&self) -> impl Iterator<Item = &Arc<dyn ConverterFactory>> {
        self.converters.iter()
    }

    /// Appends a consumer-level hook. These observe every request this
    /// consumer sends, in registration order.
    pub fn add_hook(&mut self, hook: impl TransactionHook + 'static) {
        self.hooks.push(Arc::new(hook));
    }

    /// The registered hooks, in registration order.
    pub fn hooks(&self) -> &[Arc<dyn TransactionHook>] {
        &self.hooks
    }

    /// Returns the memoized call for `definition`, building it on first
    /// use from a snapshot of the current configuration.
    pub fn build(&self, definition: &CompiledDefinition) -> Call {
        let mut calls = self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        calls
            .entry(definition.id())
            .or_insert_with(|| Call {
                inner: Arc::new(CallInner {
                    preparer: Arc::new(self.snapshot()),
                    definition: definition.clone(),
                }),
            })
            .clone()
    }

    fn snapshot(&self) -> RequestPreparer {
        RequestPreparer {
            base_url: self.base_url.clone(),
            client: Arc::clone(&self.client),
            converters: self.converters.iter().cloned().collect(),
            hooks: self.hooks.clone(),
            auth: Arc::clone(&self.auth),
        }
    }
}

impl Default for CallBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallBuilder")
            .field("base_url", &self.base_url)
            .field("converters", &self.converters.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// An immutable snapshot of consumer configuration, taken at build time.
///
/// The preparer runs the five prepare steps for every invocation: auth in
/// place, URL resolution, hook-chain assembly, pre-dispatch audit, then
/// hand-off to the transport. The dispatch handle comes back verbatim;
/// this layer never awaits it.
pub struct RequestPreparer {
    base_url: String,
    client: Arc<dyn HttpClient>,
    converters: Vec<Arc<dyn ConverterFactory>>,
    hooks: Vec<Arc<dyn TransactionHook>>,
    auth: Arc<dyn AuthTransform>,
}

impl RequestPreparer {
    /// Produces a fresh request builder scoped to `definition`'s converter
    /// registry.
    pub fn create_request_builder(&self, definition: &CompiledDefinition) -> RequestBuilder {
        let registry = definition.definition().converter_registry(&self.converters);
        RequestBuilder::new(registry)
    }

    /// Prepares and dispatches one request.
    ///
    /// # Errors
    ///
    /// Fails if the auth transform fails, the URL does not resolve, or a
    /// hook vetoes the request during audit. Nothing reaches the transport
    /// in any of those cases.
    pub fn prepare_request(&self, mut builder: RequestBuilder) -> Result<Dispatch> {
        self.auth.apply(&mut builder)?;

        let url = self.resolve_url(builder.relative_url())?;

        // Conversion first, so generic hooks observe decoded bodies.
        let mut hooks: Vec<Arc<dyn TransactionHook>> =
            Vec::with_capacity(1 + self.hooks.len() + builder.transaction_hooks().len());
        hooks.push(Arc::new(ResponseConverter {
            registry: builder.converter_registry().clone(),
        }));
        hooks.extend(self.hooks.iter().cloned());
        hooks.extend(builder.transaction_hooks().iter().cloned());
        let chain = HookChain::new(hooks);

        chain.audit_request(builder.method(), &url, builder.info())?;

        let (method, info, interceptors) = builder.into_parts();
        let mut request = self.client.create_request();
        let chain = Arc::new(chain);
        let callback: ResponseCallback =
            Arc::new(move |response| chain.handle_response(response));
        request.add_callback(callback);
        Ok(request.send(RequestIntent {
            method,
            url,
            info,
            interceptors,
        }))
    }

    /// Joins `target` against the base URL with RFC 3986 resolution. An
    /// absolute target wins over the base.
    fn resolve_url(&self, target: &str) -> Result<Url> {
        if let Ok(absolute) = Url::parse(target) {
            return Ok(absolute);
        }
        let base = Url::parse(&self.base_url)?;
        Ok(base.join(target)?)
    }
}

impl fmt::Debug for RequestPreparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPreparer")
            .field("base_url", &self.base_url)
            .field("converters", &self.converters.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Converts the raw response body through the definition-scoped registry.
/// Always the first hook in the chain.
struct ResponseConverter {
    registry: ConverterRegistry,
}

impl TransactionHook for ResponseConverter {
    fn handle_response(&self, mut response: Response) -> Result<Response> {
        let converter = self.registry.get(Purpose::ResponseBody)?;
        let status = response.status;
        response.body = converter.convert(response.body).map_err(|e| match e {
            // Converters see only the payload; stamp on the status here.
            Error::Convert {
                message,
                body,
                status: None,
            } => Error::Convert {
                message,
                body,
                status: Some(status),
            },
            other => other,
        })?;
        Ok(response)
    }
}

/// The memoized, executable binding of one definition to one configuration.
///
/// Cloning shares the underlying binding; [`Call::same`] observes that
/// identity. Invocations keep no state on the call itself: every one gets
/// a fresh request builder and fresh interceptor state.
#[derive(Clone)]
pub struct Call {
    inner: Arc<CallInner>,
}

struct CallInner {
    preparer: Arc<RequestPreparer>,
    definition: CompiledDefinition,
}

impl Call {
    /// Builds, prepares, and dispatches one request from `args`, returning
    /// the transport's deferred handle without awaiting it.
    pub fn invoke(&self, args: CallArgs) -> Result<Dispatch> {
        let definition = self.inner.definition.definition();
        let mut builder = self
            .inner
            .preparer
            .create_request_builder(&self.inner.definition);
        for hook in definition.transaction_hooks() {
            builder.add_transaction_hook(Arc::clone(hook));
        }
        definition.fill_request(&mut builder, &args)?;
        self.inner.preparer.prepare_request(builder)
    }

    /// Convenience wrapper that awaits the dispatch.
    pub async fn execute(&self, args: CallArgs) -> Result<Response> {
        self.invoke(args)?.await
    }

    /// Returns `true` if both calls are the same memoized binding.
    pub fn same(&self, other: &Call) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("definition", &self.inner.definition)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PendingRequest;
    use crate::convert::{Converter, Payload};
    use crate::definition::{RequestDescription, RequestTemplate};
    use crate::hooks::RequestAuditor;
    use crate::request::RequestInfo;
    use crate::Error;
    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct SeenRequest {
        method: Method,
        url: String,
        headers: HeaderMap,
        params: Vec<(String, String)>,
    }

    /// Records every intent it is asked to send and answers `200 {}`.
    #[derive(Clone, Default)]
    struct RecordingClient {
        seen: Arc<Mutex<Vec<SeenRequest>>>,
    }

    impl RecordingClient {
        fn requests(&self) -> Vec<SeenRequest> {
            std::mem::take(&mut *self.seen.lock().unwrap())
        }
    }

    impl HttpClient for RecordingClient {
        fn create_request(&self) -> Box<dyn PendingRequest> {
            Box::new(RecordingRequest {
                seen: Arc::clone(&self.seen),
                callbacks: Vec::new(),
            })
        }
    }

    struct RecordingRequest {
        seen: Arc<Mutex<Vec<SeenRequest>>>,
        callbacks: Vec<ResponseCallback>,
    }

    impl PendingRequest for RecordingRequest {
        fn add_callback(&mut self, callback: ResponseCallback) {
            self.callbacks.push(callback);
        }

        fn send(self: Box<Self>, intent: RequestIntent) -> Dispatch {
            self.seen.lock().unwrap().push(SeenRequest {
                method: intent.method.clone(),
                url: intent.url.to_string(),
                headers: intent.info.headers.clone(),
                params: intent.info.params.clone(),
            });
            let callbacks = self.callbacks;
            Box::pin(async move {
                let mut response = Response::new(
                    StatusCode::OK,
                    HeaderMap::new(),
                    Payload::Bytes(Bytes::from_static(b"{}")),
                    Duration::ZERO,
                    1,
                );
                for callback in &callbacks {
                    response = callback(response)?;
                }
                Ok(response)
            })
        }
    }

    fn definition(template: RequestTemplate) -> CompiledDefinition {
        CompiledDefinition::new(template.build().unwrap())
    }

    fn recording_builder() -> (CallBuilder, RecordingClient) {
        let client = RecordingClient::default();
        let mut builder = CallBuilder::new();
        builder.set_base_url("https://api.example.com/v1/");
        builder.set_client(Arc::new(client.clone()) as Arc<dyn HttpClient>);
        (builder, client)
    }

    #[test]
    fn build_memoizes_per_definition() {
        let (builder, _client) = recording_builder();
        let users = definition(RequestTemplate::get("users"));
        let repos = definition(RequestTemplate::get("repos"));

        let first = builder.build(&users);
        let second = builder.build(&users);
        let other = builder.build(&repos);

        assert!(first.same(&second));
        assert!(!first.same(&other));
    }

    #[test]
    fn snapshots_ignore_later_builder_mutation() {
        let (mut builder, client) = recording_builder();
        let users = definition(RequestTemplate::get("users"));
        let call = builder.build(&users);

        builder.set_base_url("https://changed.example.com/");
        let _ = call.invoke(CallArgs::new()).unwrap();

        let seen = client.requests();
        assert_eq!(seen[0].url, "https://api.example.com/v1/users");

        // A call built after the mutation sees the new base.
        let repos = definition(RequestTemplate::get("repos"));
        let _ = builder.build(&repos).invoke(CallArgs::new()).unwrap();
        assert_eq!(client.requests()[0].url, "https://changed.example.com/repos");
    }

    #[test]
    fn absolute_request_uris_override_the_base() {
        let (builder, client) = recording_builder();
        let external = definition(RequestTemplate::get("https://other.example.com/status"));

        let _ = builder.build(&external).invoke(CallArgs::new()).unwrap();
        assert_eq!(client.requests()[0].url, "https://other.example.com/status");
    }

    #[test]
    fn auth_headers_reach_the_transport() {
        let (mut builder, client) = recording_builder();
        builder.set_auth("sekrit");
        let users = definition(RequestTemplate::get("users"));

        let _ = builder.build(&users).invoke(CallArgs::new()).unwrap();
        let seen = client.requests();
        assert_eq!(
            seen[0].headers.get("authorization").unwrap(),
            "Bearer sekrit"
        );
    }

    #[test]
    fn audit_order_is_consumer_hooks_then_method_hooks() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        let auditor = |label: &'static str, log: Arc<Mutex<Vec<&'static str>>>| {
            RequestAuditor::new(move |_: &Method, _: &Url, _: &RequestInfo| {
                log.lock().unwrap().push(label);
                Ok(())
            })
        };

        let (mut builder, _client) = recording_builder();
        builder.add_hook(auditor("g1", Arc::clone(&log)));
        builder.add_hook(auditor("g2", Arc::clone(&log)));
        let users = definition(
            RequestTemplate::get("users").hook(auditor("m1", Arc::clone(&log))),
        );

        let _ = builder.build(&users).invoke(CallArgs::new()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["g1", "g2", "m1"]);
    }

    #[test]
    fn audit_failure_aborts_before_the_transport() {
        let (mut builder, client) = recording_builder();
        builder.add_hook(RequestAuditor::new(|_: &Method, _: &Url, _: &RequestInfo| {
            Err(Error::Hook("vetoed".to_string()))
        }));
        let users = definition(RequestTemplate::get("users"));

        let Err(err) = builder.build(&users).invoke(CallArgs::new()) else {
            panic!("vetoed request was dispatched");
        };
        assert!(matches!(err, Error::Hook(_)));
        assert!(client.requests().is_empty());
    }

    #[test]
    fn added_converters_outrank_the_standard_one() {
        struct Shouty;
        impl Converter for Shouty {
            fn convert(&self, value: Payload) -> Result<Payload> {
                match value {
                    Payload::Text(text) => Ok(Payload::Text(text.to_uppercase())),
                    Payload::Json(serde_json::Value::String(s)) => {
                        Ok(Payload::Text(s.to_uppercase()))
                    }
                    other => Ok(other),
                }
            }
        }
        struct ShoutyDisplay;
        impl ConverterFactory for ShoutyDisplay {
            fn converter(&self, purpose: Purpose) -> Option<Arc<dyn Converter>> {
                (purpose == Purpose::Display).then(|| Arc::new(Shouty) as Arc<dyn Converter>)
            }
        }

        let (mut builder, client) = recording_builder();
        builder.add_converter(ShoutyDisplay);
        assert_eq!(builder.converters().count(), 2);

        let greet = definition(RequestTemplate::get("greet/{}"));
        let _ = builder
            .build(&greet)
            .invoke(CallArgs::new().arg("hello"))
            .unwrap();
        assert_eq!(
            client.requests()[0].url,
            "https://api.example.com/v1/greet/HELLO"
        );
    }

    #[test]
    fn invalid_base_urls_surface_at_prepare_time() {
        let client = RecordingClient::default();
        let mut builder = CallBuilder::new();
        builder.set_client(Arc::new(client) as Arc<dyn HttpClient>);
        // No base URL set at all.
        let users = definition(RequestTemplate::get("users"));

        let Err(err) = builder.build(&users).invoke(CallArgs::new()) else {
            panic!("prepare succeeded without a base URL");
        };
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
