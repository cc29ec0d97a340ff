//! Example demonstrating retry policies and failure classification.
//!
//! This example shows how to:
//! - Attach a retry policy to an individual endpoint
//! - Shape delays with exponential and fixed backoff
//! - Write custom failure classifiers
//! - Combine classifiers with AND/OR logic
//! - Control how `Retry-After` hints are honored
//!
//! Run with: `cargo run --example retry_policies`

use lariat::backoff::{ExponentialBackoff, FixedBackoff, StopAfterAttempt};
use lariat::consumer::{Consumer, ConsumerBindings};
use lariat::definition::RequestTemplate;
use lariat::retry::{
    FailureClassifier, OrClassifier, RetryOnServerError, RetryOnTimeout, RetryPolicy,
};
use lariat::{CallArgs, Error};
use std::sync::Arc;
use std::time::Duration;

/// Custom classifier: retry on rate limit errors (HTTP 429).
struct RetryOnRateLimit;

impl FailureClassifier for RetryOnRateLimit {
    fn is_retryable(&self, failure: &Error) -> bool {
        matches!(
            failure,
            Error::Http { status, .. } if status.as_u16() == 429
        )
    }
}

/// Custom classifier: retry when the error body mentions known transient
/// phrases.
struct RetryOnErrorMessage {
    patterns: Vec<String>,
}

impl FailureClassifier for RetryOnErrorMessage {
    fn is_retryable(&self, failure: &Error) -> bool {
        match failure.body() {
            Some(body) => self.patterns.iter().any(|pattern| body.contains(pattern)),
            None => false,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("lariat=info,retry_policies=info")
        .init();

    println!("=== Example 1: Exponential backoff with jitter ===");
    let bindings = Arc::new(ConsumerBindings::new("JsonPlaceholder"));
    bindings.register(
        "get_post",
        RequestTemplate::get("posts/{}").retry(
            RetryPolicy::new()
                .stop(StopAfterAttempt::new(4))
                .backoff(
                    ExponentialBackoff::default()
                        .minimum(0.1)
                        .maximum(10.0)
                        .with_jitter(),
                ),
        ),
    );
    let api = Consumer::new(bindings).base_url("https://jsonplaceholder.typicode.com/");

    println!("Transient failures back off exponentially, capped at 10s");
    match api.execute("get_post", CallArgs::new().arg(1)).await {
        Ok(response) => println!("Success! Attempts: {}", response.attempts),
        Err(e) => println!("Failed: {}", e),
    }
    println!();

    println!("=== Example 2: Retry only on rate limits ===");
    let bindings = Arc::new(ConsumerBindings::new("JsonPlaceholder"));
    bindings.register(
        "get_post",
        RequestTemplate::get("posts/{}").retry(
            RetryPolicy::new()
                .classify(RetryOnRateLimit)
                .backoff(FixedBackoff::new(Duration::from_millis(500))),
        ),
    );
    let api = Consumer::new(bindings).base_url("https://jsonplaceholder.typicode.com/");

    println!("This endpoint only retries HTTP 429 responses");
    match api.execute("get_post", CallArgs::new().arg(1)).await {
        Ok(response) => println!("Success! Attempts: {}", response.attempts),
        Err(e) => println!("Failed: {}", e),
    }
    println!();

    println!("=== Example 3: Combining classifiers with OR ===");
    // Retry on server errors OR timeouts OR rate limits.
    let any_transient = OrClassifier::new(vec![
        Box::new(RetryOnServerError),
        Box::new(RetryOnTimeout),
        Box::new(RetryOnRateLimit),
    ]);

    let bindings = Arc::new(ConsumerBindings::new("JsonPlaceholder"));
    bindings.register(
        "get_post",
        RequestTemplate::get("posts/{}").retry(
            RetryPolicy::new()
                .classify(any_transient)
                .max_attempts(3)
                .backoff(FixedBackoff::new(Duration::from_millis(250))),
        ),
    );
    let api = Consumer::new(bindings).base_url("https://jsonplaceholder.typicode.com/");

    println!("This endpoint retries on: 5xx OR timeouts OR rate limits");
    match api.execute("get_post", CallArgs::new().arg(1)).await {
        Ok(response) => println!("Success! Attempts: {}", response.attempts),
        Err(e) => println!("Failed: {}", e),
    }
    println!();

    println!("=== Example 4: Classifiers from closures ===");
    // Any `Fn(&Error) -> bool` is a classifier. Here: status 503 only.
    let only_503 =
        |failure: &Error| matches!(failure.status(), Some(status) if status.as_u16() == 503);

    let bindings = Arc::new(ConsumerBindings::new("JsonPlaceholder"));
    bindings.register(
        "get_post",
        RequestTemplate::get("posts/{}")
            .retry(RetryPolicy::new().classify(only_503).max_attempts(2)),
    );
    let api = Consumer::new(bindings).base_url("https://jsonplaceholder.typicode.com/");

    match api.execute("get_post", CallArgs::new().arg(1)).await {
        Ok(response) => println!("Success! Attempts: {}", response.attempts),
        Err(e) => println!("Failed: {}", e),
    }
    println!();

    println!("=== Example 5: Honoring Retry-After ===");
    // When a failure carries a Retry-After hint, the hint replaces the
    // computed delay, capped here at 30 seconds. `ignore_retry_after`
    // disables the hint entirely.
    let message_classifier = RetryOnErrorMessage {
        patterns: vec![
            "temporarily unavailable".to_string(),
            "try again later".to_string(),
        ],
    };

    let bindings = Arc::new(ConsumerBindings::new("JsonPlaceholder"));
    bindings.register(
        "get_post",
        RequestTemplate::get("posts/{}").retry(
            RetryPolicy::new()
                .classify(message_classifier)
                .max_attempts(4)
                .backoff(ExponentialBackoff::default().minimum(0.1).maximum(5.0))
                .retry_after_cap(Duration::from_secs(30)),
        ),
    );
    let api = Consumer::new(bindings).base_url("https://jsonplaceholder.typicode.com/");

    println!("Retry-After hints are honored up to a 30s cap");
    match api.execute("get_post", CallArgs::new().arg(1)).await {
        Ok(response) => {
            println!("Success!");
            println!("  Attempts: {}", response.attempts);
            println!("  Latency: {:?}", response.latency);
            println!("  Was retried: {}", response.was_retried());
        }
        Err(e) => println!("Failed: {}", e),
    }

    Ok(())
}
