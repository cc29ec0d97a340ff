//! Consumer bindings: the two-phase path from declared methods to
//! executable calls.
//!
//! Phase one registers request descriptions against method names on a
//! [`ConsumerBindings`] table, one per API type. Phase two happens lazily:
//! the first access to a method compiles its description into an immutable
//! definition, exactly once, caching success and failure alike. A
//! [`Consumer`] pairs one shared bindings table with one per-instance
//! configuration, so differently configured instances of the same API
//! share compiled definitions but never share calls.

use crate::builder::{Call, CallBuilder};
use crate::client::{Dispatch, IntoClient};
use crate::convert::ConverterFactory;
use crate::definition::{CompiledDefinition, RequestDescription};
use crate::error::InvalidDefinition;
use crate::hooks::TransactionHook;
use crate::request::CallArgs;
use crate::response::Response;
use crate::{auth::IntoAuth, Error, Result};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// The per-type table of declared methods.
///
/// Registration may happen late, after consumers exist; replacing an
/// existing method installs a fresh descriptor with the same
/// compile-once semantics.
pub struct ConsumerBindings {
    owner: String,
    methods: Mutex<HashMap<String, Arc<MethodDescriptor>>>,
}

impl ConsumerBindings {
    /// Creates an empty table for the API type named `owner`. The name
    /// appears in binding errors.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            methods: Mutex::new(HashMap::new()),
        }
    }

    /// The owning type's name.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Registers `description` under `method`, replacing any previous
    /// registration. Returns `&self` for chaining.
    pub fn register(
        &self,
        method: impl Into<String>,
        description: impl RequestDescription + 'static,
    ) -> &Self {
        let method = method.into();
        let descriptor = Arc::new(MethodDescriptor {
            owner: self.owner.clone(),
            method: method.clone(),
            description: Arc::new(description),
            compiled: OnceCell::new(),
        });
        self.methods
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(method, descriptor);
        self
    }

    /// Looks up the descriptor for `method`.
    pub fn descriptor(&self, method: &str) -> Option<Arc<MethodDescriptor>> {
        self.methods
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(method)
            .cloned()
    }
}

impl fmt::Debug for ConsumerBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods = self
            .methods
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f.debug_struct("ConsumerBindings")
            .field("owner", &self.owner)
            .field("methods", &methods.len())
            .finish()
    }
}

/// One declared method: its description plus the compile-once cell.
pub struct MethodDescriptor {
    owner: String,
    method: String,
    description: Arc<dyn RequestDescription>,
    compiled: OnceCell<std::result::Result<CompiledDefinition, InvalidDefinition>>,
}

impl MethodDescriptor {
    /// The declared method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The original description, for introspection or composition.
    pub fn description(&self) -> &Arc<dyn RequestDescription> {
        &self.description
    }

    /// The compiled definition.
    ///
    /// The first access compiles the description; every later access
    /// returns the cached outcome. A compile failure is permanent and
    /// surfaces as [`Error::Binding`] naming the owning type and method.
    pub fn definition(&self) -> Result<CompiledDefinition> {
        let compiled = self.compiled.get_or_init(|| {
            self.description
                .build()
                .map(CompiledDefinition::new)
                .map_err(|cause| {
                    tracing::error!(
                        consumer = %self.owner,
                        method = %self.method,
                        error = %cause,
                        "request definition failed to compile"
                    );
                    cause
                })
        });
        match compiled {
            Ok(definition) => Ok(definition.clone()),
            Err(cause) => Err(Error::Binding {
                consumer: self.owner.clone(),
                method: self.method.clone(),
                source: cause.clone(),
            }),
        }
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("owner", &self.owner)
            .field("method", &self.method)
            .field("compiled", &self.compiled.get().is_some())
            .finish()
    }
}

/// A configured instance of a declared API.
///
/// # Examples
///
/// ```
/// use lariat::consumer::{Consumer, ConsumerBindings};
/// use lariat::definition::RequestTemplate;
/// use std::sync::Arc;
///
/// # fn main() -> lariat::Result<()> {
/// let bindings = Arc::new(ConsumerBindings::new("GitHub"));
/// bindings
///     .register("get_user", RequestTemplate::get("users/{}"))
///     .register("emojis", RequestTemplate::get("emojis"));
///
/// let github = Consumer::new(bindings)
///     .base_url("https://api.github.com/")
///     .auth("my-token");
///
/// let call = github.call("get_user")?;
/// assert!(call.same(&github.call("get_user")?));
/// # Ok(())
/// # }
/// ```
pub struct Consumer {
    bindings: Arc<ConsumerBindings>,
    builder: CallBuilder,
}

impl Consumer {
    /// Creates an instance over `bindings` with default configuration:
    /// no base URL, the bundled reqwest transport, anonymous auth.
    pub fn new(bindings: Arc<ConsumerBindings>) -> Self {
        Self {
            bindings,
            builder: CallBuilder::new(),
        }
    }

    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.builder.set_base_url(base_url);
        self
    }

    /// Sets the transport adapter.
    pub fn client(mut self, client: impl IntoClient) -> Self {
        self.builder.set_client(client);
        self
    }

    /// Sets the auth transform.
    pub fn auth(mut self, auth: impl IntoAuth) -> Self {
        self.builder.set_auth(auth);
        self
    }

    /// Appends a consumer-level hook.
    pub fn hook(mut self, hook: impl TransactionHook + 'static) -> Self {
        self.builder.add_hook(hook);
        self
    }

    /// Pushes a converter factory to the front of the converter sequence.
    pub fn converter(mut self, factory: impl ConverterFactory + 'static) -> Self {
        self.builder.add_converter(factory);
        self
    }

    /// The shared bindings table.
    pub fn bindings(&self) -> &Arc<ConsumerBindings> {
        &self.bindings
    }

    /// This instance's configuration aggregate.
    pub fn call_builder(&self) -> &CallBuilder {
        &self.builder
    }

    /// Returns the memoized call for `method`, compiling the definition
    /// on first access.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownMethod`] for unregistered names and
    /// [`Error::Binding`] when the method's description does not compile.
    pub fn call(&self, method: &str) -> Result<Call> {
        let descriptor = self
            .bindings
            .descriptor(method)
            .ok_or_else(|| Error::UnknownMethod {
                consumer: self.bindings.owner().to_string(),
                method: method.to_string(),
            })?;
        let definition = descriptor.definition()?;
        Ok(self.builder.build(&definition))
    }

    /// Invokes `method` with `args`, returning the transport's deferred
    /// handle without awaiting it.
    pub fn invoke(&self, method: &str, args: CallArgs) -> Result<Dispatch> {
        self.call(method)?.invoke(args)
    }

    /// Invokes `method` with `args` and awaits the response.
    pub async fn execute(&self, method: &str, args: CallArgs) -> Result<Response> {
        self.invoke(method, args)?.await
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("owner", &self.bindings.owner())
            .field("builder", &self.builder)
            .finish()
    }
}
