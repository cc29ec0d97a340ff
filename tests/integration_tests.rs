//! Integration tests using wiremock to simulate HTTP servers.

use http::Method;
use lariat::backoff::FixedBackoff;
use lariat::consumer::{Consumer, ConsumerBindings};
use lariat::convert::Payload;
use lariat::definition::{
    CompiledDefinition, RequestDefinition, RequestDescription, RequestTemplate,
};
use lariat::hooks::TransactionHook;
use lariat::request::{CallArgs, RequestInfo};
use lariat::retry::RetryPolicy;
use lariat::{CallBuilder, Error, InvalidDefinition, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestData {
    id: u32,
    name: String,
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy::new().backoff(FixedBackoff::new(Duration::from_millis(10)))
}

#[tokio::test]
async fn test_declared_get_request() {
    let mock_server = MockServer::start().await;

    let response_data = TestData {
        id: 1,
        name: "Test".to_string(),
    };

    Mock::given(method("GET"))
        .and(path("/users/octocat"))
        .and(query_param("page", "2"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response_data))
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register(
        "get_user",
        RequestTemplate::get("users/{}")
            .query("page")
            .header("accept", "application/json"),
    );

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let response = consumer
        .execute("get_user", CallArgs::new().arg("octocat").named("page", 2))
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.attempts, 1);
    assert!(!response.was_retried());
    assert_eq!(response.json::<TestData>().unwrap(), response_data);
}

#[tokio::test]
async fn test_declared_post_request_serializes_json_body() {
    let mock_server = MockServer::start().await;

    let response_data = TestData {
        id: 1,
        name: "New".to_string(),
    };

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"name": "New"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(&response_data))
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("create_user", RequestTemplate::post("users").body("user"));

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let response = consumer
        .execute(
            "create_user",
            CallArgs::new().named("user", json!({"name": "New"})),
        )
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 201);
    assert_eq!(response.json::<TestData>().unwrap(), response_data);
}

#[tokio::test]
async fn test_http_error_4xx() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/octocat"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("get_user", RequestTemplate::get("users/{}"));

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let result = consumer
        .execute("get_user", CallArgs::new().arg("octocat"))
        .await;

    match result {
        Err(Error::Http { status, body, .. }) => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(body, "Not found");
        }
        other => panic!("Expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_conversion_error_on_invalid_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/octocat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("invalid json"))
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("get_user", RequestTemplate::get("users/{}"));

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let result = consumer
        .execute("get_user", CallArgs::new().arg("octocat"))
        .await;

    match result {
        Err(Error::Convert {
            message,
            body,
            status,
        }) => {
            assert!(message.contains("expected"));
            // The undecodable payload and its status stay attached, so the
            // bad response can be inspected without re-fetching it.
            assert_eq!(body.as_deref(), Some("invalid json"));
            assert_eq!(status.map(|s| s.as_u16()), Some(200));
        }
        other => panic!("Expected Convert error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_on_5xx_until_success() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    let response_data = TestData {
        id: 1,
        name: "Test".to_string(),
    };

    // First two requests fail with 500, third succeeds
    Mock::given(method("GET"))
        .and(path("/jobs/7"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                ResponseTemplate::new(500).set_body_string("Server error")
            } else {
                ResponseTemplate::new(200).set_body_json(&response_data)
            }
        })
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("get_job", RequestTemplate::get("jobs/{}").retry(quick_retry()));

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let response = consumer
        .execute("get_job", CallArgs::new().arg(7))
        .await
        .unwrap();

    assert_eq!(response.attempts, 3);
    assert!(response.was_retried());
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_budget_exhaustion_propagates_original_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/7"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Server error"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register(
        "get_job",
        RequestTemplate::get("jobs/{}").retry(quick_retry().max_attempts(3)),
    );

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let result = consumer.execute("get_job", CallArgs::new().arg(7)).await;

    // The last failure comes back as-is, not wrapped in a retry error.
    match result {
        Err(Error::Http { status, body, .. }) => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "Server error");
        }
        other => panic!("Expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/7"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("get_job", RequestTemplate::get("jobs/{}").retry(quick_retry()));

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let result = consumer.execute("get_job", CallArgs::new().arg(7)).await;

    match result {
        Err(Error::Http { status, .. }) => assert_eq!(status.as_u16(), 404),
        other => panic!("Expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_custom_failure_classifier() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/7"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Server error"))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Only 503 is worth retrying; a plain 500 propagates immediately.
    let only_503 = |failure: &Error| matches!(failure.status(), Some(s) if s.as_u16() == 503);
    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register(
        "get_job",
        RequestTemplate::get("jobs/{}").retry(quick_retry().classify(only_503)),
    );

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let result = consumer.execute("get_job", CallArgs::new().arg(7)).await;

    match result {
        Err(Error::Http { status, .. }) => assert_eq!(status.as_u16(), 500),
        other => panic!("Expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_response_metadata() {
    let mock_server = MockServer::start().await;

    let response_data = TestData {
        id: 1,
        name: "Test".to_string(),
    };

    Mock::given(method("GET"))
        .and(path("/users/octocat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(&response_data)
                .insert_header("x-custom-header", "custom-value"),
        )
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("get_user", RequestTemplate::get("users/{}"));

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let response = consumer
        .execute("get_user", CallArgs::new().arg("octocat"))
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.attempts, 1);
    assert_eq!(response.header("x-custom-header"), Some("custom-value"));
    // Latency is measured - just verify it exists (can be 0 for very fast responses)
    let _ = response.latency;
}

struct RecordingHook {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl TransactionHook for RecordingHook {
    fn audit_request(
        &self,
        method: &Method,
        _url: &Url,
        _info: &RequestInfo,
    ) -> lariat::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:audit:{method}", self.name));
        Ok(())
    }

    fn handle_response(&self, response: Response) -> lariat::Result<Response> {
        let decoded = matches!(response.body, Payload::Json(_));
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:response:json={decoded}", self.name));
        Ok(response)
    }
}

#[tokio::test]
async fn test_hooks_run_in_registration_order_and_see_decoded_bodies() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register(
        "ping",
        RequestTemplate::get("ping").hook(RecordingHook {
            name: "method",
            log: Arc::clone(&log),
        }),
    );

    let consumer = Consumer::new(bindings)
        .base_url(mock_server.uri())
        .hook(RecordingHook {
            name: "consumer",
            log: Arc::clone(&log),
        });

    consumer.execute("ping", CallArgs::new()).await.unwrap();

    // Consumer hooks run before method hooks, and response hooks observe
    // the body after the response converter has decoded it.
    let entries = log.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec![
            "consumer:audit:GET".to_string(),
            "method:audit:GET".to_string(),
            "consumer:response:json=true".to_string(),
            "method:response:json=true".to_string(),
        ]
    );
}

struct RejectEverything;

impl TransactionHook for RejectEverything {
    fn audit_request(
        &self,
        _method: &Method,
        _url: &Url,
        _info: &RequestInfo,
    ) -> lariat::Result<()> {
        Err(Error::Hook("request blocked by audit".to_string()))
    }
}

#[tokio::test]
async fn test_audit_failure_aborts_before_transport() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("ping", RequestTemplate::get("ping"));

    let consumer = Consumer::new(bindings)
        .base_url(mock_server.uri())
        .hook(RejectEverything);

    let result = consumer.execute("ping", CallArgs::new()).await;

    match result {
        Err(Error::Hook(message)) => assert!(message.contains("blocked")),
        other => panic!("Expected Hook error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_basic_auth_header() {
    let mock_server = MockServer::start().await;

    // RFC 7617 test vector
    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header(
            "authorization",
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("secure", RequestTemplate::get("secure"));

    let consumer = Consumer::new(bindings)
        .base_url(mock_server.uri())
        .auth(("Aladdin", "open sesame"));

    let response = consumer.execute("secure", CallArgs::new()).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

#[tokio::test]
async fn test_bearer_auth_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("authorization", "Bearer sesame-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("secure", RequestTemplate::get("secure"));

    let consumer = Consumer::new(bindings)
        .base_url(mock_server.uri())
        .auth("sesame-token");

    let response = consumer.execute("secure", CallArgs::new()).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

#[tokio::test]
async fn test_retry_after_hint_overrides_computed_delay() {
    let mock_server = MockServer::start().await;

    let response_data = TestData {
        id: 1,
        name: "Test".to_string(),
    };

    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    // First request returns 429 with Retry-After, second succeeds
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count == 0 {
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "1")
                    .set_body_string("Rate limited")
            } else {
                ResponseTemplate::new(200).set_body_json(&response_data)
            }
        })
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("limited", RequestTemplate::get("limited").retry(quick_retry()));

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let start = std::time::Instant::now();
    let response = consumer.execute("limited", CallArgs::new()).await.unwrap();

    assert_eq!(response.attempts, 2);
    // Should have waited approximately 1 second, not the 10ms backoff
    assert!(start.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_retry_after_can_be_ignored() {
    let mock_server = MockServer::start().await;

    let response_data = TestData {
        id: 1,
        name: "Test".to_string(),
    };

    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count == 0 {
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "10")
                    .set_body_string("Rate limited")
            } else {
                ResponseTemplate::new(200).set_body_json(&response_data)
            }
        })
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register(
        "limited",
        RequestTemplate::get("limited").retry(quick_retry().ignore_retry_after()),
    );

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let start = std::time::Instant::now();
    let response = consumer.execute("limited", CallArgs::new()).await.unwrap();

    // With the hint ignored, the 10ms backoff applies instead of 10 seconds
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(response.attempts, 2);
}

#[tokio::test]
async fn test_per_method_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register(
        "slow",
        RequestTemplate::get("slow").timeout(Duration::from_millis(100)),
    );

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let result = consumer.execute("slow", CallArgs::new()).await;

    match result {
        Err(Error::Timeout) => {}
        other => panic!("Expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_absolute_uri_overrides_base_url() {
    let base_server = MockServer::start().await;
    let other_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&base_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"up": true})))
        .expect(1)
        .mount(&other_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register(
        "status",
        RequestTemplate::get(format!("{}/status", other_server.uri())),
    );

    let consumer = Consumer::new(bindings).base_url(base_server.uri());
    let response = consumer.execute("status", CallArgs::new()).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

#[tokio::test]
async fn test_binding_failure_never_touches_the_network() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register(
        "broken",
        || -> Result<Arc<dyn RequestDefinition>, InvalidDefinition> {
            Err(InvalidDefinition::new("no URI declared"))
        },
    );

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());

    // The failure is cached: both accesses report the same binding error.
    for _ in 0..2 {
        match consumer.execute("broken", CallArgs::new()).await {
            Err(Error::Binding {
                consumer, method, ..
            }) => {
                assert_eq!(consumer, "TestApi");
                assert_eq!(method, "broken");
            }
            other => panic!("Expected Binding error, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_calls_are_memoized_and_snapshots_isolated() {
    let first_server = MockServer::start().await;
    let second_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&first_server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&second_server)
        .await;

    let definition =
        CompiledDefinition::new(RequestTemplate::get("ping").build().unwrap());

    let mut builder = CallBuilder::new();
    builder.set_base_url(first_server.uri());
    let call = builder.build(&definition);

    // Re-pointing the builder afterwards affects neither the existing call
    // nor later builds of the same definition, which stay memoized.
    builder.set_base_url(second_server.uri());
    let later = builder.build(&definition);
    assert!(call.same(&later));

    let response = call.execute(CallArgs::new()).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

#[tokio::test]
async fn test_dispatches_can_be_driven_from_spawned_tasks() {
    let mock_server = MockServer::start().await;

    let response_data = TestData {
        id: 7,
        name: "Job".to_string(),
    };
    Mock::given(method("GET"))
        .and(path("/jobs/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response_data))
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("get_job", RequestTemplate::get("jobs/{}").retry(quick_retry()));

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let dispatch = consumer
        .call("get_job")
        .unwrap()
        .invoke(CallArgs::new().arg(7))
        .unwrap();

    // The deferred dispatch must stay Send even with retry interceptors
    // attached, or it could not move onto another task.
    let response = tokio::spawn(dispatch).await.unwrap().unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.json::<TestData>().unwrap(), response_data);
}

#[tokio::test]
async fn test_empty_response_body_passes_through() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/users/octocat"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let bindings = Arc::new(ConsumerBindings::new("TestApi"));
    bindings.register("delete_user", RequestTemplate::delete("users/{}"));

    let consumer = Consumer::new(bindings).base_url(mock_server.uri());
    let response = consumer
        .execute("delete_user", CallArgs::new().arg("octocat"))
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 204);
    match &response.body {
        Payload::Bytes(bytes) => assert!(bytes.is_empty()),
        other => panic!("Expected an empty raw body, got {other:?}"),
    }
}
