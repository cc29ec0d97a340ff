//! # Lariat - A declarative HTTP API binding library
//!
//! Lariat turns one-time descriptions of API endpoints into reusable,
//! retry-aware calls built on top of `reqwest`. Endpoints are described
//! once, compiled once, and shared across every configured instance of
//! the API; invoking a call hands back the transport's future untouched,
//! so callers decide when and where to await.
//!
//! ## Quick Start
//!
//! ```no_run
//! use lariat::consumer::{Consumer, ConsumerBindings};
//! use lariat::definition::RequestTemplate;
//! use lariat::retry::RetryPolicy;
//! use lariat::CallArgs;
//! use serde::Deserialize;
//! use std::sync::Arc;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     login: String,
//!     id: u64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lariat::Error> {
//!     // Describe the API once.
//!     let bindings = Arc::new(ConsumerBindings::new("GitHub"));
//!     bindings
//!         .register(
//!             "get_user",
//!             RequestTemplate::get("users/{}")
//!                 .header("Accept", "application/vnd.github.v3+json")
//!                 .retry(RetryPolicy::new().max_attempts(3)),
//!         )
//!         .register("emojis", RequestTemplate::get("emojis"));
//!
//!     // Configure an instance of it.
//!     let github = Consumer::new(bindings)
//!         .base_url("https://api.github.com/")
//!         .auth("my-token");
//!
//!     // Invoke a declared method.
//!     let response = github
//!         .execute("get_user", CallArgs::new().arg("octocat"))
//!         .await?;
//!     let user: User = response.json()?;
//!     println!("{} (#{})", user.login, user.id);
//!     println!(
//!         "took {:?} over {} attempt(s)",
//!         response.latency, response.attempts
//!     );
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Declarative endpoints** - Describe a request once with [`RequestTemplate`],
//!   bind it to a method name, and reuse the compiled form everywhere
//! - **Deferred execution** - Invoking a call returns the transport's future
//!   verbatim; nothing is awaited on your behalf
//! - **Flexible retry logic** - Exponential backoff with optional jitter,
//!   attempt budgets, and `Retry-After` awareness
//! - **Customizable failure classification** - Retry on transient failures,
//!   server errors, timeouts, or custom conditions
//! - **Pluggable transports** - Bring any HTTP client by implementing two small
//!   traits; a `reqwest` adapter is bundled
//! - **Transaction hooks** - Audit outgoing requests and rewrite incoming
//!   responses at the consumer or method level
//! - **Converter chain** - JSON in and out by default, overridable per consumer
//! - **Automatic logging** - Structured logging with `tracing` for observability
//!
//! ## Error Handling
//!
//! Errors carry enough context to decide what to do next, including the raw
//! body and headers of HTTP failures:
//!
//! ```no_run
//! use lariat::Error;
//! # use lariat::consumer::{Consumer, ConsumerBindings};
//! # use lariat::CallArgs;
//! # use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Error> {
//! # let consumer = Consumer::new(Arc::new(ConsumerBindings::new("Api")));
//! match consumer.execute("get_user", CallArgs::new().arg("octocat")).await {
//!     Ok(response) => println!("status {}", response.status),
//!     Err(Error::Http { status, body, .. }) => {
//!         eprintln!("HTTP error {status}: {body}");
//!     }
//!     Err(Error::Binding { consumer, method, source }) => {
//!         eprintln!("{consumer}.{method} is declared incorrectly: {source}");
//!     }
//!     Err(e) => eprintln!("other error: {e}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retry Policies
//!
//! Attach retry behavior to individual endpoints. The policy decides whether
//! a failure is worth retrying, whether the attempt budget allows it, and how
//! long to wait:
//!
//! ```
//! use lariat::backoff::{ExponentialBackoff, StopAfterAttempt};
//! use lariat::definition::RequestTemplate;
//! use lariat::retry::{RetryOnServerError, RetryPolicy};
//!
//! let template = RequestTemplate::get("jobs/{}").retry(
//!     RetryPolicy::new()
//!         .classify(RetryOnServerError)
//!         .stop(StopAfterAttempt::new(4))
//!         .backoff(ExponentialBackoff::default().maximum(30.0).with_jitter()),
//! );
//! ```

pub mod auth;
pub mod backoff;
pub mod builder;
pub mod client;
pub mod consumer;
pub mod convert;
pub mod definition;
pub mod error;
pub mod hooks;
pub mod request;
pub mod response;
pub mod retry;

pub use builder::{Call, CallBuilder};
pub use consumer::{Consumer, ConsumerBindings};
pub use definition::{CompiledDefinition, RequestTemplate};
pub use error::{Error, InvalidDefinition, Result};
pub use request::CallArgs;
pub use response::Response;
pub use retry::RetryPolicy;
