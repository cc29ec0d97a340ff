//! Example demonstrating transaction hooks and authentication.
//!
//! This example shows how to:
//! - Audit outgoing requests before they reach the wire
//! - Rewrite or inspect decoded responses
//! - Attach hooks per consumer and per method
//! - Authenticate with bearer tokens, basic credentials, and API tokens
//!
//! Run with: `cargo run --example hooks_and_auth`

use http::Method;
use lariat::auth::{ApiTokenHeader, ApiTokenParam};
use lariat::consumer::{Consumer, ConsumerBindings};
use lariat::definition::RequestTemplate;
use lariat::hooks::{RequestAuditor, ResponseHandler, TransactionHook};
use lariat::request::RequestInfo;
use lariat::response::Response;
use lariat::{CallArgs, Error};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

/// A hook that counts every request it sees and every response that comes
/// back, across all methods of the consumer it is attached to. The counters
/// are shared so they stay readable after the hook is handed over.
#[derive(Clone)]
struct TrafficCounter {
    requests: Arc<AtomicUsize>,
    responses: Arc<AtomicUsize>,
}

impl TrafficCounter {
    fn new() -> Self {
        Self {
            requests: Arc::new(AtomicUsize::new(0)),
            responses: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl TransactionHook for TrafficCounter {
    fn audit_request(&self, _method: &Method, _url: &Url, _info: &RequestInfo) -> lariat::Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn handle_response(&self, response: Response) -> lariat::Result<Response> {
        self.responses.fetch_add(1, Ordering::SeqCst);
        Ok(response)
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("lariat=info,hooks_and_auth=info")
        .init();

    println!("=== Example 1: Auditing requests with a closure ===");
    let bindings = Arc::new(ConsumerBindings::new("HttpBin"));
    bindings.register("echo_headers", RequestTemplate::get("headers"));

    let api = Consumer::new(Arc::clone(&bindings))
        .base_url("https://httpbin.org")
        .hook(RequestAuditor::new(|method, url, info| {
            println!("  [audit] {} {} ({} header(s))", method, url, info.headers.len());
            Ok(())
        }));

    let response = api.execute("echo_headers", CallArgs::new()).await?;
    println!("Status: {}", response.status);
    println!();

    println!("=== Example 2: Inspecting decoded responses ===");
    // Response hooks run after the body is decoded, so JSON responses
    // arrive as structured values.
    let api = Consumer::new(Arc::clone(&bindings))
        .base_url("https://httpbin.org")
        .hook(ResponseHandler::new(|response: Response| {
            if let Some(json) = response.body.as_json() {
                let keys = json.as_object().map_or(0, |map| map.len());
                println!("  [handler] decoded JSON object with {} top-level key(s)", keys);
            }
            Ok(response)
        }));

    let response = api.execute("echo_headers", CallArgs::new()).await?;
    println!("Status: {}", response.status);
    println!();

    println!("=== Example 3: Counting traffic with a custom hook ===");
    let counter = TrafficCounter::new();
    let api = Consumer::new(Arc::clone(&bindings))
        .base_url("https://httpbin.org")
        .hook(counter.clone());

    for _ in 0..3 {
        api.execute("echo_headers", CallArgs::new()).await?;
    }
    println!(
        "Saw {} request(s) and {} response(s)",
        counter.requests.load(Ordering::SeqCst),
        counter.responses.load(Ordering::SeqCst)
    );
    println!();

    println!("=== Example 4: Method-level hooks ===");
    // Hooks declared on a template only fire for that method. They run
    // after any consumer-level hooks.
    let bindings = Arc::new(ConsumerBindings::new("HttpBin"));
    bindings.register(
        "echo_headers",
        RequestTemplate::get("headers").hook(RequestAuditor::new(|_, url: &Url, _| {
            println!("  [method hook] about to call {}", url.path());
            Ok(())
        })),
    );
    let api = Consumer::new(bindings).base_url("https://httpbin.org");
    let response = api.execute("echo_headers", CallArgs::new()).await?;
    println!("Status: {}", response.status);
    println!();

    println!("=== Example 5: Bearer token auth ===");
    let bindings = Arc::new(ConsumerBindings::new("HttpBin"));
    bindings
        .register("echo_headers", RequestTemplate::get("headers"))
        .register("echo_query", RequestTemplate::get("get"));

    // A bare string becomes a bearer token.
    let api = Consumer::new(Arc::clone(&bindings))
        .base_url("https://httpbin.org")
        .auth("demo-token-123");
    let response = api.execute("echo_headers", CallArgs::new()).await?;
    let echoed: serde_json::Value = response.json()?;
    println!(
        "Server saw Authorization: {}",
        echoed["headers"]["Authorization"]
    );
    println!();

    println!("=== Example 6: Basic credentials ===");
    // A (user, password) pair becomes HTTP basic auth.
    let api = Consumer::new(Arc::clone(&bindings))
        .base_url("https://httpbin.org")
        .auth(("demo-user", "demo-pass"));
    let response = api.execute("echo_headers", CallArgs::new()).await?;
    let echoed: serde_json::Value = response.json()?;
    println!(
        "Server saw Authorization: {}",
        echoed["headers"]["Authorization"]
    );
    println!();

    println!("=== Example 7: API tokens in headers and query params ===");
    let api = Consumer::new(Arc::clone(&bindings))
        .base_url("https://httpbin.org")
        .auth(ApiTokenHeader::new("X-Api-Key", "demo-key"));
    let response = api.execute("echo_headers", CallArgs::new()).await?;
    let echoed: serde_json::Value = response.json()?;
    println!("Server saw X-Api-Key: {}", echoed["headers"]["X-Api-Key"]);

    let api = Consumer::new(bindings)
        .base_url("https://httpbin.org")
        .auth(ApiTokenParam::new("api_key", "demo-key"));
    let response = api.execute("echo_query", CallArgs::new()).await?;
    let echoed: serde_json::Value = response.json()?;
    println!("Server saw ?api_key={}", echoed["args"]["api_key"]);

    Ok(())
}
