use indoc::indoc;
use integration_tests::{TestServer, mocks::LocalRuntimeMock};
use serde_json::json;

#[tokio::test]
async fn stream_chat() {
    let mut builder = TestServer::builder();
    builder.spawn_backend(LocalRuntimeMock::new("ollama")).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let events = chat
        .chat(json!({
            "model": "llama3.2:latest",
            "messages": [{ "role": "user", "content": "Hello!" }]
        }))
        .await;

    insta::assert_json_snapshot!(events, {
        "[].timestamp" => "[timestamp]"
    }, @r#"
    [
      {
        "type": "start",
        "timestamp": "[timestamp]",
        "model": "llama3.2:latest"
      },
      {
        "type": "content",
        "timestamp": "[timestamp]",
        "content": "Hello"
      },
      {
        "type": "content",
        "timestamp": "[timestamp]",
        "content": " from"
      },
      {
        "type": "content",
        "timestamp": "[timestamp]",
        "content": " llama"
      },
      {
        "type": "complete",
        "timestamp": "[timestamp]"
      }
    ]
    "#);
}

#[tokio::test]
async fn tag_stripped_model_name_routes() {
    let mut builder = TestServer::builder();
    let mock = LocalRuntimeMock::new("ollama").with_reply(&["ok"]);
    let stats = mock.stats();
    builder.spawn_backend(mock).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let events = chat.chat(json!({ "model": "llama3.2", "message": "Hi" })).await;

    let types = events.iter().map(|e| e["type"].as_str().unwrap()).collect::<Vec<_>>();
    assert_eq!(types, ["start", "content", "complete"]);
    assert_eq!(events[0]["model"], "llama3.2");
    assert_eq!(stats.chat_requests(), 1);
}

#[tokio::test]
async fn default_model_is_used_without_model() {
    let config = indoc! {r#"
        [llm]
        default_model = "llama3.2:latest"
    "#};

    let mut builder = TestServer::builder();
    builder
        .spawn_backend(LocalRuntimeMock::new("ollama").with_reply(&["default"]))
        .await;

    let server = builder.build(config).await;
    let chat = server.chat_client("/api");

    let events = chat.chat(json!({ "message": "Hi" })).await;

    assert_eq!(events[0]["model"], "llama3.2:latest");
    assert_eq!(events[1]["content"], "default");
    assert_eq!(events.last().unwrap()["type"], "complete");
}

#[tokio::test]
async fn no_model_and_no_default() {
    let mut builder = TestServer::builder();
    builder.spawn_backend(LocalRuntimeMock::new("ollama")).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let events = chat.chat(json!({ "message": "Hi" })).await;

    insta::assert_json_snapshot!(events, {
        "[].timestamp" => "[timestamp]"
    }, @r#"
    [
      {
        "type": "error",
        "timestamp": "[timestamp]",
        "message": "No model specified and no default model configured"
      }
    ]
    "#);
}

#[tokio::test]
async fn unknown_model_is_a_single_error_event() {
    let mut builder = TestServer::builder();
    let mock = LocalRuntimeMock::new("ollama");
    let stats = mock.stats();
    builder.spawn_backend(mock).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let events = chat.chat(json!({ "model": "mistral", "message": "Hi" })).await;

    insta::assert_json_snapshot!(events, {
        "[].timestamp" => "[timestamp]"
    }, @r#"
    [
      {
        "type": "error",
        "timestamp": "[timestamp]",
        "message": "Model 'mistral' not available in any configured service"
      }
    ]
    "#);

    assert_eq!(stats.chat_requests(), 0);
}

#[tokio::test]
async fn mid_stream_error_ends_the_stream() {
    let mut builder = TestServer::builder();
    builder
        .spawn_backend(LocalRuntimeMock::new("ollama").with_mid_stream_error("out of memory"))
        .await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let events = chat.chat(json!({ "model": "llama3.2:latest", "message": "Hi" })).await;

    insta::assert_json_snapshot!(events, {
        "[].timestamp" => "[timestamp]"
    }, @r#"
    [
      {
        "type": "start",
        "timestamp": "[timestamp]",
        "model": "llama3.2:latest"
      },
      {
        "type": "content",
        "timestamp": "[timestamp]",
        "content": "Hello"
      },
      {
        "type": "error",
        "timestamp": "[timestamp]",
        "message": "Local runtime error: out of memory"
      }
    ]
    "#);
}

#[tokio::test]
async fn list_models() {
    let config = indoc! {r#"
        [llm]
        default_model = "llama3.2"
    "#};

    let mut builder = TestServer::builder();
    builder
        .spawn_backend(LocalRuntimeMock::new("ollama").with_models(&["llama3.2:latest", "qwen2.5:7b"]))
        .await;

    let server = builder.build(config).await;
    let chat = server.chat_client("/api");

    let (status, body) = chat.get("/models").await;
    assert_eq!(status, 200);

    insta::assert_json_snapshot!(body, {
        ".services.ollama.config.host" => "[host]"
    }, @r#"
    {
      "default_model": "llama3.2",
      "services": {
        "ollama": {
          "id": "ollama",
          "type": "local",
          "name": "ollama",
          "enabled": true,
          "available": true,
          "status": "online",
          "models": [
            "llama3.2:latest",
            "qwen2.5:7b"
          ],
          "config": {
            "host": "[host]",
            "has_api_key": false,
            "accept_invalid_certs": false
          }
        }
      },
      "all_models": [
        {
          "id": "llama3.2:latest",
          "name": "llama3.2:latest",
          "provider": "Local runtime",
          "service": "ollama",
          "service_type": "local",
          "available": true,
          "is_default": true
        },
        {
          "id": "qwen2.5:7b",
          "name": "qwen2.5:7b",
          "provider": "Local runtime",
          "service": "ollama",
          "service_type": "local",
          "available": true,
          "is_default": false
        }
      ]
    }
    "#);
}

#[tokio::test]
async fn local_probes_are_cached_until_refresh() {
    let mut builder = TestServer::builder();
    let mock = LocalRuntimeMock::new("ollama");
    let stats = mock.stats();
    builder.spawn_backend(mock).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    chat.get("/models").await;
    chat.get("/models").await;
    assert_eq!(stats.tags_requests(), 1);

    let (status, body) = chat.post("/models/refresh", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["services"]["ollama"]["status"], "online");
    assert_eq!(stats.tags_requests(), 2);
}

#[tokio::test]
async fn unreachable_runtime_is_offline() {
    let config = indoc! {r#"
        [llm.services.ollama]
        type = "local"

        [llm.services.ollama.config]
        host = "http://127.0.0.1:1"
        models = ["llama3.2:latest"]
    "#};

    let server = TestServer::builder().build(config).await;
    let chat = server.chat_client("/api");

    let (_, body) = chat.get("/models").await;

    assert_eq!(body["services"]["ollama"]["status"], "offline");
    assert_eq!(body["all_models"][0]["available"], false);

    let events = chat.chat(json!({ "model": "llama3.2:latest", "message": "Hi" })).await;

    assert_eq!(events[0]["type"], "start");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["type"], "error");

    let message = events[1]["message"].as_str().unwrap();
    assert!(message.starts_with("Local runtime error: "), "{message}");
}

#[tokio::test]
async fn model_health() {
    let mut builder = TestServer::builder();
    builder.spawn_backend(LocalRuntimeMock::new("ollama")).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let (_, body) = chat.get("/models/llama3.2:latest/health").await;

    insta::assert_json_snapshot!(body, @r#"
    {
      "model": "llama3.2:latest",
      "service": "ollama",
      "service_type": "local",
      "available": true
    }
    "#);

    let (_, body) = chat.get("/models/mistral/health").await;

    insta::assert_json_snapshot!(body, @r#"
    {
      "model": "mistral",
      "service": "unknown",
      "available": false
    }
    "#);
}

#[tokio::test]
async fn generate_filename() {
    let config = indoc! {r#"
        [llm]
        default_model = "llama3.2:latest"
    "#};

    let mut builder = TestServer::builder();
    builder
        .spawn_backend(LocalRuntimeMock::new("ollama").with_reply(&["Quarterly ", "Sales-Report!"]))
        .await;

    let server = builder.build(config).await;
    let chat = server.chat_client("/api");

    let (status, body) = chat
        .post("/generate-filename", json!({ "previews": "Q3 revenue grew by 12%" }))
        .await;

    assert_eq!(status, 200);
    insta::assert_json_snapshot!(body, @r#"
    {
      "filename": "quarterly_salesreport"
    }
    "#);
}
