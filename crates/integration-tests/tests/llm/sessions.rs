use std::time::Duration;

use indoc::indoc;
use integration_tests::{TestServer, mocks::LocalRuntimeMock};
use serde_json::json;

fn slow_runtime() -> LocalRuntimeMock {
    LocalRuntimeMock::new("ollama")
        .with_reply(&["one", "two", "three", "four", "five", "six", "seven", "eight"])
        .with_chunk_delay(Duration::from_millis(200))
}

#[tokio::test]
async fn stop_a_running_stream() {
    let mut builder = TestServer::builder();
    builder.spawn_backend(slow_runtime()).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let mut stream = chat.stream(json!({ "model": "llama3.2:latest", "message": "Count" })).await;

    let start = stream.next().await.unwrap();
    assert_eq!(start["type"], "start");

    let (_, status) = chat.get("/chat/status").await;
    assert_eq!(status["active_streams"], 1);
    assert_eq!(status["stream_ids"][0], stream.stream_id.as_str());

    insta::assert_json_snapshot!(status["sessions"], {
        "[].id" => "[id]",
        "[].created_at" => "[timestamp]"
    }, @r#"
    [
      {
        "id": "[id]",
        "created_at": "[timestamp]",
        "cancel_requested": false
      }
    ]
    "#);
    assert_eq!(status["sessions"][0]["id"], stream.stream_id.as_str());

    let (status, body) = chat.post("/chat/stop", json!({ "stream_id": stream.stream_id })).await;
    assert_eq!(status, 200);
    assert_eq!(body["stopped"], true);
    assert_eq!(body["message"], "Stream stopped successfully");

    let rest = stream.collect().await;
    let last = rest.last().unwrap();

    insta::assert_json_snapshot!(last, {
        ".timestamp" => "[timestamp]"
    }, @r#"
    {
      "type": "cancelled",
      "timestamp": "[timestamp]",
      "message": "Generation stopped by user."
    }
    "#);

    // Stopped well before the backend ran out of chunks.
    assert!(rest.len() < 8, "{rest:?}");
    assert!(rest[..rest.len() - 1].iter().all(|e| e["type"] == "content"));

    let (_, status) = chat.get("/chat/status").await;
    insta::assert_json_snapshot!(status, @r#"
    {
      "active_streams": 0,
      "stream_ids": [],
      "sessions": []
    }
    "#);
}

#[tokio::test]
async fn stop_unknown_stream() {
    let server = TestServer::builder().build("").await;
    let chat = server.chat_client("/api");

    let (status, body) = chat.post("/chat/stop", json!({ "stream_id": "nope" })).await;
    assert_eq!(status, 200);

    insta::assert_json_snapshot!(body, @r#"
    {
      "stopped": false,
      "stream_id": "nope",
      "message": "Stream not found or already stopped"
    }
    "#);
}

#[tokio::test]
async fn stop_after_completion_reports_not_found() {
    let mut builder = TestServer::builder();
    builder.spawn_backend(LocalRuntimeMock::new("ollama")).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let stream = chat
        .stream(json!({ "model": "llama3.2:latest", "message": "Hi", "stream_id": "chat-42" }))
        .await;

    assert_eq!(stream.stream_id, "chat-42");

    let events = stream.collect().await;
    assert_eq!(events.last().unwrap()["type"], "complete");

    let (_, body) = chat.post("/chat/stop", json!({ "stream_id": "chat-42" })).await;
    assert_eq!(body["stopped"], false);
}

#[tokio::test]
async fn generated_stream_ids_are_unique() {
    let mut builder = TestServer::builder();
    builder.spawn_backend(LocalRuntimeMock::new("ollama")).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let first = chat.stream(json!({ "model": "llama3.2:latest", "message": "Hi" })).await;
    let second = chat.stream(json!({ "model": "llama3.2:latest", "message": "Hi" })).await;

    assert!(!first.stream_id.is_empty());
    assert_ne!(first.stream_id, second.stream_id);

    first.collect().await;
    second.collect().await;
}

#[tokio::test]
async fn stopping_one_stream_leaves_others_running() {
    let mut builder = TestServer::builder();
    builder.spawn_backend(slow_runtime()).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let mut stopped = chat.stream(json!({ "model": "llama3.2:latest", "message": "a" })).await;
    let mut running = chat.stream(json!({ "model": "llama3.2:latest", "message": "b" })).await;

    stopped.next().await.unwrap();
    running.next().await.unwrap();

    let (_, body) = chat.post("/chat/stop", json!({ "stream_id": stopped.stream_id })).await;
    assert_eq!(body["stopped"], true);

    let stopped = stopped.collect().await;
    assert_eq!(stopped.last().unwrap()["type"], "cancelled");

    let running = running.collect().await;
    assert_eq!(running.len(), 9);
    assert_eq!(running.last().unwrap()["type"], "complete");
}

#[tokio::test]
async fn pacing_does_not_delay_cancellation() {
    let config = indoc! {r#"
        [llm]
        stream_pacing = "1s"
    "#};

    let mut builder = TestServer::builder();
    builder.spawn_backend(LocalRuntimeMock::new("ollama")).await;

    let server = builder.build(config).await;
    let chat = server.chat_client("/api");

    let mut stream = chat.stream(json!({ "model": "llama3.2:latest", "message": "Hi" })).await;
    assert_eq!(stream.next().await.unwrap()["type"], "start");

    chat.post("/chat/stop", json!({ "stream_id": stream.stream_id })).await;

    let next = tokio::time::timeout(Duration::from_millis(500), stream.next())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(next["type"], "cancelled");
}
