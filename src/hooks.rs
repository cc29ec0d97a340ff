//! Transaction hooks: audit requests before dispatch, transform responses
//! after.
//!
//! Hooks attach at two levels. Consumer-level hooks see every request the
//! consumer sends; method-level hooks see only their own method. At
//! prepare time both levels are flattened into one [`HookChain`] and run
//! in a fixed order: the response-converter hook first, then consumer
//! hooks in registration order, then method hooks in declaration order.

use crate::request::RequestInfo;
use crate::response::Response;
use crate::Result;
use http::Method;
use std::sync::Arc;
use url::Url;

/// Observes and may veto or transform one HTTP transaction.
///
/// Both methods default to pass-through, so implementations override only
/// the side they care about.
///
/// # Examples
///
/// ```
/// use http::Method;
/// use lariat::hooks::TransactionHook;
/// use lariat::request::RequestInfo;
/// use url::Url;
///
/// struct LogRequests;
///
/// impl TransactionHook for LogRequests {
///     fn audit_request(&self, method: &Method, url: &Url, _info: &RequestInfo) -> lariat::Result<()> {
///         tracing::debug!(%method, %url, "sending request");
///         Ok(())
///     }
/// }
/// ```
pub trait TransactionHook: Send + Sync {
    /// Inspects the fully assembled request just before dispatch.
    ///
    /// Returning an error aborts the call; nothing reaches the wire.
    fn audit_request(&self, _method: &Method, _url: &Url, _info: &RequestInfo) -> Result<()> {
        Ok(())
    }

    /// Receives the response and may transform or replace it.
    fn handle_response(&self, response: Response) -> Result<Response> {
        Ok(response)
    }
}

/// Adapts a closure into a request-auditing hook.
pub struct RequestAuditor<F> {
    audit: F,
}

impl<F> RequestAuditor<F>
where
    F: Fn(&Method, &Url, &RequestInfo) -> Result<()> + Send + Sync,
{
    /// Wraps `audit` as a [`TransactionHook`].
    pub fn new(audit: F) -> Self {
        Self { audit }
    }
}

impl<F> TransactionHook for RequestAuditor<F>
where
    F: Fn(&Method, &Url, &RequestInfo) -> Result<()> + Send + Sync,
{
    fn audit_request(&self, method: &Method, url: &Url, info: &RequestInfo) -> Result<()> {
        (self.audit)(method, url, info)
    }
}

/// Adapts a closure into a response-handling hook.
pub struct ResponseHandler<F> {
    handle: F,
}

impl<F> ResponseHandler<F>
where
    F: Fn(Response) -> Result<Response> + Send + Sync,
{
    /// Wraps `handle` as a [`TransactionHook`].
    pub fn new(handle: F) -> Self {
        Self { handle }
    }
}

impl<F> TransactionHook for ResponseHandler<F>
where
    F: Fn(Response) -> Result<Response> + Send + Sync,
{
    fn handle_response(&self, response: Response) -> Result<Response> {
        (self.handle)(response)
    }
}

/// An ordered sequence of hooks behind the single-hook interface.
///
/// Audits run front to back and stop at the first error. Responses thread
/// through the same order, each hook seeing its predecessor's output.
#[derive(Clone)]
pub struct HookChain {
    hooks: Vec<Arc<dyn TransactionHook>>,
}

impl HookChain {
    /// Creates a chain over `hooks`, kept in the given order.
    pub fn new(hooks: Vec<Arc<dyn TransactionHook>>) -> Self {
        Self { hooks }
    }

    /// Number of hooks in the chain.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if the chain holds no hooks.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl TransactionHook for HookChain {
    fn audit_request(&self, method: &Method, url: &Url, info: &RequestInfo) -> Result<()> {
        for hook in &self.hooks {
            hook.audit_request(method, url, info)?;
        }
        Ok(())
    }

    fn handle_response(&self, mut response: Response) -> Result<Response> {
        for hook in &self.hooks {
            response = hook.handle_response(response)?;
        }
        Ok(response)
    }
}
