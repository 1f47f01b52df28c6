//! Submit-and-poll tests against a wiremock ComfyUI server.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use assistant_comfyui::generation::{GenerationClient, GenerationError, PollConfig};
use assistant_core::workflow::WorkflowGraph;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers `{}` for the first `ready_on - 1` polls, then `body`.
#[derive(Clone)]
struct ReadyOnAttempt {
    ready_on: u32,
    calls: Arc<AtomicU32>,
    body: serde_json::Value,
}

impl ReadyOnAttempt {
    fn new(ready_on: u32, body: serde_json::Value) -> Self {
        Self {
            ready_on,
            calls: Arc::new(AtomicU32::new(0)),
            body,
        }
    }
}

impl Respond for ReadyOnAttempt {
    fn respond(&self, _req: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.ready_on {
            ResponseTemplate::new(200).set_body_json(self.body.clone())
        } else {
            ResponseTemplate::new(200).set_body_json(json!({}))
        }
    }
}

fn fast_client(max_attempts: u32) -> GenerationClient {
    GenerationClient::new(PollConfig {
        interval: Duration::from_millis(20),
        max_attempts,
    })
}

fn graph() -> WorkflowGraph {
    WorkflowGraph::from_value(json!({
        "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "a castle" } },
        "9": { "class_type": "SaveImage", "inputs": { "images": ["8", 0] } }
    }))
    .unwrap()
}

fn finished_history(prompt_id: &str) -> serde_json::Value {
    json!({
        prompt_id: {
            "outputs": {
                "9": { "images": [{ "filename": "out.png", "subfolder": "", "type": "output" }] }
            }
        }
    })
}

async fn mount_submit(server: &MockServer, prompt_id: &str) {
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "prompt_id": prompt_id, "number": 1 })),
        )
        .mount(server)
        .await;
}

async fn history_requests(server: &MockServer, prompt_id: &str) -> usize {
    let history_path = format!("/history/{prompt_id}");
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == history_path)
        .count()
}

// ---------------------------------------------------------------------------
// Submission phase
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submits_node_mapping_under_prompt_field() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/prompt"))
        .and(body_partial_json(json!({
            "prompt": { "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "a castle" } } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prompt_id": "abc" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(finished_history("abc")))
        .mount(&server)
        .await;

    let url = fast_client(3).generate(&server.uri(), &graph()).await.unwrap();
    assert!(url.ends_with("/view?filename=out.png&subfolder=&type=output"));
}

#[tokio::test]
async fn missing_job_id_is_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "number": 3 })))
        .mount(&server)
        .await;

    let err = fast_client(3)
        .generate(&server.uri(), &graph())
        .await
        .unwrap_err();

    assert_eq!(err, GenerationError::Protocol("no job id returned".to_string()));
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1, "no history poll after a protocol error");
}

#[tokio::test]
async fn non_json_submit_body_is_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = fast_client(3)
        .generate(&server.uri(), &graph())
        .await
        .unwrap_err();
    assert_matches!(err, GenerationError::Protocol(_));
}

#[tokio::test]
async fn rejected_submission_is_truncated_submission_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(400).set_body_string("e".repeat(1000)))
        .expect(1)
        .mount(&server)
        .await;

    let err = fast_client(3)
        .generate(&server.uri(), &graph())
        .await
        .unwrap_err();

    let message = match err {
        GenerationError::Submission(message) => message,
        other => panic!("expected submission error, got {other:?}"),
    };
    assert!(message.chars().count() <= 200);
    assert!(message.contains("400"));
}

#[tokio::test]
async fn unreachable_engine_is_submission_error() {
    // Bind then drop a server so the port refuses connections.
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let err = fast_client(3).generate(&uri, &graph()).await.unwrap_err();
    assert_matches!(err, GenerationError::Submission(ref m) if m.chars().count() <= 200);
}

// ---------------------------------------------------------------------------
// Polling phase
// ---------------------------------------------------------------------------

#[tokio::test]
async fn image_on_third_poll_stops_polling() {
    let server = MockServer::start().await;
    mount_submit(&server, "abc").await;

    Mock::given(method("GET"))
        .and(path("/history/abc"))
        .respond_with(ReadyOnAttempt::new(3, finished_history("abc")))
        .mount(&server)
        .await;

    let url = fast_client(10)
        .generate(&server.uri(), &graph())
        .await
        .unwrap();

    assert_eq!(
        url,
        format!("{}/view?filename=out.png&subfolder=&type=output", server.uri())
    );
    assert_eq!(history_requests(&server, "abc").await, 3);
}

#[tokio::test]
async fn artifact_url_escapes_components() {
    let server = MockServer::start().await;
    mount_submit(&server, "p-1").await;

    Mock::given(method("GET"))
        .and(path("/history/p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "p-1": { "outputs": {
                "9": { "images": [{ "filename": "cat & dog.png", "subfolder": "batch 2", "type": "temp" }] }
            } }
        })))
        .mount(&server)
        .await;

    let base = format!("{}/", server.uri());
    let url = fast_client(2).generate(&base, &graph()).await.unwrap();

    assert_eq!(
        url,
        format!(
            "{}/view?filename=cat%20%26%20dog.png&subfolder=batch%202&type=temp",
            server.uri()
        )
    );
}

#[tokio::test]
async fn never_ready_times_out_after_max_attempts() {
    let server = MockServer::start().await;
    mount_submit(&server, "slow").await;

    Mock::given(method("GET"))
        .and(path("/history/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = GenerationClient::new(PollConfig {
        interval: Duration::from_millis(50),
        max_attempts: 5,
    });

    let started = Instant::now();
    let err = client.generate(&server.uri(), &graph()).await.unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err, GenerationError::TimedOut { attempts: 5 });
    assert!(err.is_retryable());
    assert_eq!(history_requests(&server, "slow").await, 5);
    // Four gaps of 50ms between five polls.
    assert!(elapsed >= Duration::from_millis(200), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn transient_poll_errors_are_absorbed() {
    let server = MockServer::start().await;
    mount_submit(&server, "flaky").await;

    Mock::given(method("GET"))
        .and(path("/history/flaky"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(finished_history("flaky")))
        .with_priority(3)
        .mount(&server)
        .await;

    let url = fast_client(10)
        .generate(&server.uri(), &graph())
        .await
        .unwrap();

    assert!(url.contains("filename=out.png"));
    assert_eq!(history_requests(&server, "flaky").await, 4);
}

#[tokio::test]
async fn history_without_images_keeps_polling() {
    let server = MockServer::start().await;
    mount_submit(&server, "noimg").await;

    Mock::given(method("GET"))
        .and(path("/history/noimg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "noimg": { "outputs": { "9": { "images": [] } } }
        })))
        .mount(&server)
        .await;

    let err = fast_client(3)
        .generate(&server.uri(), &graph())
        .await
        .unwrap_err();

    assert_eq!(err, GenerationError::TimedOut { attempts: 3 });
    assert_eq!(history_requests(&server, "noimg").await, 3);
}

#[tokio::test]
async fn engine_execution_error_fails_without_further_polls() {
    let server = MockServer::start().await;
    mount_submit(&server, "boom").await;

    Mock::given(method("GET"))
        .and(path("/history/boom"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "boom": {
                "outputs": {},
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [["execution_error", { "exception_message": "model not found" }]]
                }
            }
        })))
        .mount(&server)
        .await;

    let err = fast_client(10)
        .generate(&server.uri(), &graph())
        .await
        .unwrap_err();

    assert_matches!(err, GenerationError::Protocol(ref m) if m.contains("model not found"));
    assert_eq!(history_requests(&server, "boom").await, 1);
}

#[tokio::test]
async fn concurrent_generations_do_not_share_state() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    mount_submit(&server_a, "a").await;
    mount_submit(&server_b, "b").await;

    Mock::given(method("GET"))
        .and(path("/history/a"))
        .respond_with(ReadyOnAttempt::new(4, finished_history("a")))
        .mount(&server_a)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/b"))
        .respond_with(ReadyOnAttempt::new(1, finished_history("b")))
        .mount(&server_b)
        .await;

    let client = fast_client(10);
    let graph = graph();
    let (uri_a, uri_b) = (server_a.uri(), server_b.uri());
    let (a, b) = tokio::join!(
        client.generate(&uri_a, &graph),
        client.generate(&uri_b, &graph),
    );

    assert!(a.unwrap().starts_with(&uri_a));
    assert!(b.unwrap().starts_with(&uri_b));
    assert_eq!(history_requests(&server_a, "a").await, 4);
    assert_eq!(history_requests(&server_b, "b").await, 1);
}

// ---------------------------------------------------------------------------
// Liveness probe
// ---------------------------------------------------------------------------

#[tokio::test]
async fn probe_returns_system_stats() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/system_stats"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "system": { "os": "posix" } })),
        )
        .mount(&server)
        .await;

    let stats = fast_client(1).probe(&server.uri()).await.unwrap();
    assert_eq!(stats["system"]["os"], "posix");
}

#[tokio::test]
async fn probe_reports_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/system_stats"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = fast_client(1).probe(&server.uri()).await.unwrap_err();
    assert!(err.to_string().contains("503"));
}
