use indoc::formatdoc;
use integration_tests::{
    TestServer,
    mocks::{HostedApiMock, LocalRuntimeMock, TestBackend},
};
use serde_json::json;

#[tokio::test]
async fn add_service_makes_its_models_routable() {
    let backend = LocalRuntimeMock::new("ollama")
        .with_models(&["llama3.2:latest", "qwen2.5:7b"])
        .spawn()
        .await
        .unwrap();

    let server = TestServer::builder().build("").await;
    let chat = server.chat_client("/api");

    let events = chat.chat(json!({ "model": "qwen2.5:7b", "message": "Hi" })).await;
    assert_eq!(events[0]["type"], "error");

    let (status, body) = chat
        .post(
            "/services",
            json!({
                "service_id": "ollama",
                "service_type": "local",
                "config": { "host": backend.url(), "models": ["qwen2.5:7b"] }
            }),
        )
        .await;

    assert_eq!(status, 200);
    insta::assert_json_snapshot!(body, @r#"
    {
      "service_id": "ollama",
      "available": true,
      "models": [
        "llama3.2:latest",
        "qwen2.5:7b"
      ]
    }
    "#);

    let events = chat.chat(json!({ "model": "qwen2.5:7b", "message": "Hi" })).await;
    assert_eq!(events.last().unwrap()["type"], "complete");
}

#[tokio::test]
async fn unavailable_service_is_added_disabled() {
    let server = TestServer::builder().build("").await;
    let chat = server.chat_client("/api");

    let (status, body) = chat
        .post(
            "/services",
            json!({
                "service_id": "ollama",
                "service_type": "local",
                "config": { "host": "http://127.0.0.1:1", "models": ["llama3.2:latest"] }
            }),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["available"], false);

    let (_, services) = chat.get("/services").await;
    assert_eq!(services["ollama"]["enabled"], false);
    assert_eq!(services["ollama"]["status"], "disabled");

    let events = chat.chat(json!({ "model": "llama3.2:latest", "message": "Hi" })).await;
    assert_eq!(
        events[0]["message"],
        "Model 'llama3.2:latest' not available in any configured service"
    );
}

#[tokio::test]
async fn invalid_service_configuration() {
    let server = TestServer::builder().build("").await;
    let chat = server.chat_client("/api");

    let (status, body) = chat
        .post(
            "/services",
            json!({ "service_id": "broken", "service_type": "local", "config": {} }),
        )
        .await;

    assert_eq!(status, 400);
    insta::assert_json_snapshot!(body, @r#"
    {
      "error": {
        "message": "Invalid service configuration: a local service requires a 'host'",
        "type": "config_invalid",
        "code": 400
      }
    }
    "#);

    let (_, services) = chat.get("/services").await;
    insta::assert_json_snapshot!(services, @"{}");
}

#[tokio::test]
async fn remove_service() {
    let mut builder = TestServer::builder();
    builder.spawn_backend(LocalRuntimeMock::new("ollama")).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let (status, body) = chat.delete("/services/ollama").await;
    assert_eq!(status, 200);

    insta::assert_json_snapshot!(body, @r#"
    {
      "service_id": "ollama",
      "removed": true
    }
    "#);

    let (_, body) = chat.delete("/services/ollama").await;
    assert_eq!(body["removed"], false);

    let events = chat.chat(json!({ "model": "llama3.2:latest", "message": "Hi" })).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "error");
}

#[tokio::test]
async fn set_default_model() {
    let mut builder = TestServer::builder();
    builder.spawn_backend(LocalRuntimeMock::new("ollama")).await;
    builder.spawn_backend(HostedApiMock::new("openai")).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let (status, body) = chat.post("/models/default", json!({ "model": "gpt-4o-mini" })).await;
    assert_eq!(status, 200);

    insta::assert_json_snapshot!(body, @r#"
    {
      "default_model": "gpt-4o-mini"
    }
    "#);

    let events = chat.chat(json!({ "message": "Hi" })).await;
    assert_eq!(events[0]["model"], "gpt-4o-mini");
    assert_eq!(events.last().unwrap()["type"], "complete");

    let (status, body) = chat.post("/models/default", json!({ "model": "mistral" })).await;
    assert_eq!(status, 404);

    insta::assert_json_snapshot!(body, @r#"
    {
      "error": {
        "message": "Model 'mistral' not available in any configured service",
        "type": "model_not_found",
        "code": 404
      }
    }
    "#);

    let (_, body) = chat.get("/models").await;
    assert_eq!(body["default_model"], "gpt-4o-mini");
}

#[tokio::test]
async fn later_service_wins_model_collisions() {
    let mut builder = TestServer::builder();
    builder
        .spawn_backend(LocalRuntimeMock::new("first").with_reply(&["first"]))
        .await;
    builder
        .spawn_backend(LocalRuntimeMock::new("second").with_reply(&["second"]))
        .await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let events = chat.chat(json!({ "model": "llama3.2", "message": "Hi" })).await;
    assert_eq!(events[1]["content"], "second");

    let (_, health) = chat.get("/models/llama3.2/health").await;
    assert_eq!(health["service"], "second");
}

#[tokio::test]
async fn disable_and_enable_service() {
    let mut builder = TestServer::builder();
    builder.spawn_backend(LocalRuntimeMock::new("ollama")).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let (status, body) = chat.post("/services/ollama/enabled", json!({ "enabled": false })).await;
    assert_eq!(status, 200);
    assert_eq!(body["available"], false);

    let (_, services) = chat.get("/services").await;
    assert_eq!(services["ollama"]["status"], "disabled");

    let events = chat.chat(json!({ "model": "llama3.2:latest", "message": "Hi" })).await;
    assert_eq!(events[0]["type"], "error");

    let (status, body) = chat.post("/services/ollama/enabled", json!({ "enabled": true })).await;
    assert_eq!(status, 200);

    insta::assert_json_snapshot!(body, @r#"
    {
      "service_id": "ollama",
      "available": true,
      "models": [
        "llama3.2:latest"
      ]
    }
    "#);

    let events = chat.chat(json!({ "model": "llama3.2:latest", "message": "Hi" })).await;
    assert_eq!(events.last().unwrap()["type"], "complete");
}

#[tokio::test]
async fn enable_unreachable_service_fails() {
    let config = indoc::indoc! {r#"
        [llm.services.ollama]
        type = "local"
        enabled = false

        [llm.services.ollama.config]
        host = "http://127.0.0.1:1"
        models = ["llama3.2:latest"]
    "#};

    let server = TestServer::builder().build(config).await;
    let chat = server.chat_client("/api");

    let (status, body) = chat.post("/services/ollama/enabled", json!({ "enabled": true })).await;
    assert_eq!(status, 503);

    insta::assert_json_snapshot!(body, @r#"
    {
      "error": {
        "message": "Service 'ollama' is not available",
        "type": "adapter_unavailable",
        "code": 503
      }
    }
    "#);

    let (status, body) = chat.post("/services/missing/enabled", json!({ "enabled": true })).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["message"], "Service 'missing' not found");
}

#[tokio::test]
async fn services_survive_a_restart_with_a_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("state").join("services.json");

    let backend = LocalRuntimeMock::new("ollama").spawn().await.unwrap();

    let config = formatdoc! {r#"
        [llm]
        state_file = "{path}"
    "#, path = state_file.display()};

    {
        let server = TestServer::builder().build(&config).await;
        let chat = server.chat_client("/api");

        let (status, _) = chat
            .post(
                "/services",
                json!({
                    "service_id": "ollama",
                    "service_type": "local",
                    "config": { "host": backend.url(), "models": ["llama3.2:latest"] }
                }),
            )
            .await;

        assert_eq!(status, 200);

        let (status, _) = chat.post("/models/default", json!({ "model": "llama3.2" })).await;
        assert_eq!(status, 200);
    }

    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&state_file).unwrap()).unwrap();

    insta::assert_json_snapshot!(saved, {
        ".services.ollama.config.host" => "[host]"
    }, @r#"
    {
      "services": {
        "ollama": {
          "type": "local",
          "config": {
            "host": "[host]",
            "models": [
              "llama3.2:latest"
            ]
          },
          "enabled": true
        }
      },
      "default_model": "llama3.2"
    }
    "#);

    let server = TestServer::builder().build(&config).await;
    let chat = server.chat_client("/api");

    let events = chat.chat(json!({ "message": "Hi" })).await;
    assert_eq!(events[0]["model"], "llama3.2");
    assert_eq!(events.last().unwrap()["type"], "complete");
}

#[tokio::test]
async fn hosted_api_key_is_never_listed() {
    let mut builder = TestServer::builder();
    builder.spawn_backend(HostedApiMock::new("openai")).await;

    let server = builder.build("").await;
    let chat = server.chat_client("/api");

    let (_, services) = chat.get("/services").await;

    assert_eq!(services["openai"]["config"]["has_api_key"], true);
    assert!(!services.to_string().contains("sk-test"));
}
