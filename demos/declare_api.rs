//! Basic example demonstrating declarative API bindings.
//!
//! This example shows how to:
//! - Describe endpoints once with request templates
//! - Configure a consumer against a base URL
//! - Pass positional and named arguments at call time
//! - Inspect response metadata (status, latency, attempts)
//!
//! Run with: `cargo run --example declare_api`

use lariat::consumer::{Consumer, ConsumerBindings};
use lariat::definition::RequestTemplate;
use lariat::{CallArgs, Error};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    id: u32,
    title: String,
    body: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("lariat=debug,declare_api=info")
        .init();

    // Describe the API once. Each template compiles lazily on first use and
    // the compiled form is shared by every consumer built from the bindings.
    let bindings = Arc::new(ConsumerBindings::new("JsonPlaceholder"));
    bindings
        .register("get_post", RequestTemplate::get("posts/{}"))
        .register(
            "list_comments",
            RequestTemplate::get("comments").query("postId"),
        )
        .register("create_post", RequestTemplate::post("posts").body("post"));

    let api = Consumer::new(bindings).base_url("https://jsonplaceholder.typicode.com/");

    println!("=== Example 1: GET with a positional argument ===");
    let response = api.execute("get_post", CallArgs::new().arg(1)).await?;
    let post: Post = response.json()?;
    println!("Fetched post #{}: {}", post.id, post.title);
    println!("  Status: {}", response.status);
    println!("  Latency: {:?}", response.latency);
    println!("  Attempts: {}", response.attempts);
    println!();

    println!("=== Example 2: GET with a named query argument ===");
    let response = api
        .execute("list_comments", CallArgs::new().named("postId", 1))
        .await?;
    let comments: serde_json::Value = response.json()?;
    println!(
        "Post 1 has {} comments",
        comments.as_array().map_or(0, |list| list.len())
    );
    println!();

    println!("=== Example 3: POST with a JSON body ===");
    let draft = serde_json::json!({
        "userId": 7,
        "title": "Declarative bindings",
        "body": "Describe once, call anywhere.",
    });
    let response = api
        .execute("create_post", CallArgs::new().named("post", draft))
        .await?;
    let created: Post = response.json()?;
    println!("Created post #{}", created.id);
    println!("  Status: {}", response.status);
    println!();

    println!("=== Example 4: Reusing a compiled call ===");
    // Repeated invocations of the same method reuse the memoized call; only
    // the arguments differ per invocation.
    for id in [2, 3, 4] {
        let response = api.execute("get_post", CallArgs::new().arg(id)).await?;
        let post: Post = response.json()?;
        println!("Post #{}: {}", post.id, post.title);
    }

    Ok(())
}
