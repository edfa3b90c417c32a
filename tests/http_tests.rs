// Integration tests for the HTTP control API
//
// Requests go straight through the router; sessions run on ChannelEngines
// handed out by a test factory so results can be injected.

mod common;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

use common::eventually;
use loqa_speech::catalog::{
    LanguageResource, LanguageResourceCatalog, SpeechLanguage, StaticCatalogSource,
};
use loqa_speech::http::{create_router, AppState, EngineFactory};
use loqa_speech::{ChannelEngine, RecognitionEngine, SessionConfig};

#[derive(Default)]
struct ChannelFactory {
    engines: Mutex<HashMap<String, ChannelEngine>>,
    fail_start: Mutex<Option<String>>,
    hold_start: Mutex<bool>,
}

impl ChannelFactory {
    fn engine(&self, session_id: &str) -> ChannelEngine {
        self.engines
            .lock()
            .get(session_id)
            .cloned()
            .expect("engine for session")
    }
}

#[async_trait]
impl EngineFactory for ChannelFactory {
    async fn create(&self, config: &SessionConfig) -> Result<Arc<dyn RecognitionEngine>> {
        let engine = ChannelEngine::new();
        if let Some(message) = self.fail_start.lock().take() {
            engine.fail_next_start(message);
        }
        if *self.hold_start.lock() {
            engine.hold_start();
        }
        self.engines
            .lock()
            .insert(config.session_id.clone(), engine.clone());
        Ok(Arc::new(engine))
    }
}

fn catalog() -> Arc<LanguageResourceCatalog> {
    let mut english = LanguageResource::default();
    english.speech.insert(
        "en-US".to_string(),
        SpeechLanguage {
            name: "English (United States)".to_string(),
            language: "en-US".to_string(),
        },
    );
    let mut german = english.clone();
    german.speech.insert(
        "en-US".to_string(),
        SpeechLanguage {
            name: "Englisch (Vereinigte Staaten)".to_string(),
            language: "en-US".to_string(),
        },
    );

    let source = StaticCatalogSource::new()
        .with_locale("en-US", english)
        .with_locale("de", german);
    Arc::new(LanguageResourceCatalog::new(Arc::new(source), "en-US"))
}

fn setup() -> (Router, Arc<ChannelFactory>) {
    let factory = Arc::new(ChannelFactory::default());
    let state = AppState::new(Arc::clone(&factory) as Arc<dyn EngineFactory>, catalog());
    (create_router(state), factory)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&value)?)
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body)?).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, value))
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let (app, _) = setup();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_session_lifecycle_over_http() -> Result<()> {
    let (app, factory) = setup();

    let (status, body) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "session_id": "standup" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["session_id"], "standup");
    assert_eq!(body["state"], "recognizing");

    // Same id twice is a conflict
    let (status, _) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "session_id": "standup" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let feed = factory.engine("standup").feed();
    feed.intermediate(1, "good");
    feed.final_text(1, "good morning everyone");

    let (status, transcript) = send(&app, Method::GET, "/sessions/standup/transcript", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transcript.as_array().map(Vec::len), Some(1));
    assert_eq!(transcript[0]["text"], "good morning everyone");

    let (status, stats) = send(&app, Method::GET, "/sessions/standup/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["intermediate_results"], 1);
    assert_eq!(stats["final_results"], 1);
    assert_eq!(stats["state"], "recognizing");

    let (status, stopped) = send(&app, Method::POST, "/sessions/standup/stop", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["state"], "idle");
    assert_eq!(stopped["stats"]["transcript_segments_count"], 1);

    // Stopping an idle session is a state conflict
    let (status, body) = send(&app, Method::POST, "/sessions/standup/stop", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, deleted) = send(&app, Method::DELETE, "/sessions/standup", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["state"], "disposed");
    assert!(factory.engine("standup").is_released());

    let (status, _) = send(&app, Method::GET, "/sessions/standup/status", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_failed_start_is_not_registered() -> Result<()> {
    let (app, factory) = setup();
    *factory.fail_start.lock() = Some("connection refused".to_string());

    let (status, body) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "session_id": "doomed" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"]
        .as_str()
        .is_some_and(|e| e.contains("connection refused")));

    assert!(factory.engine("doomed").is_released());

    let (status, _) = send(&app, Method::GET, "/sessions/doomed/status", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The id is free again for a retry
    let (status, _) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "session_id": "doomed" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_create_with_same_id() -> Result<()> {
    let (app, factory) = setup();
    *factory.hold_start.lock() = true;

    let first = {
        let app = app.clone();
        tokio::spawn(async move {
            send(
                &app,
                Method::POST,
                "/sessions",
                Some(json!({ "session_id": "shared" })),
            )
            .await
        })
    };

    // First create is parked inside the engine start
    eventually("first engine created", || {
        factory.engines.lock().contains_key("shared")
    })
    .await?;

    let (status, _) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "session_id": "shared" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    factory.engine("shared").release_start();
    let (status, body) = first.await??;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["state"], "recognizing");

    let (status, stats) = send(&app, Method::GET, "/sessions/shared/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["state"], "recognizing");
    assert_eq!(factory.engine("shared").start_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_invalid_session_requests() -> Result<()> {
    let (app, _) = setup();

    let (status, _) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({
            "session_id": "translate",
            "mode": { "kind": "translation", "target_languages": [] }
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::POST, "/sessions/missing/stop", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::DELETE, "/sessions/missing", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_participants_over_http() -> Result<()> {
    let (app, factory) = setup();

    send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "session_id": "speech-only" })),
    )
    .await?;
    let (status, _) = send(
        &app,
        Method::POST,
        "/sessions/speech-only/participants",
        Some(json!({ "user_id": "alice" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "session_id": "meeting", "mode": { "kind": "conversation" } })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/sessions/meeting/participants",
        Some(json!({ "user_id": "alice", "display_name": "Alice" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["change"], "added");
    assert_eq!(body["participants"][0]["display_name"], "Alice");
    assert_eq!(factory.engine("meeting").participants().len(), 1);

    let (status, body) = send(
        &app,
        Method::POST,
        "/sessions/meeting/participants",
        Some(json!({ "action": "remove", "user_id": "alice" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["change"], "removed");
    assert!(factory.engine("meeting").participants().is_empty());

    let (status, _) = send(
        &app,
        Method::POST,
        "/sessions/meeting/participants",
        Some(json!({ "action": "remove", "user_id": "alice" })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_languages_endpoint() -> Result<()> {
    let (app, _) = setup();

    let (status, body) = send(&app, Method::GET, "/languages?scopes=speech", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["speech"]["en-US"]["name"], "English (United States)");
    assert_eq!(body["tts"], json!({}));

    let (status, body) = send(&app, Method::GET, "/languages?accept=de-DE", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["speech"]["en-US"]["name"], "Englisch (Vereinigte Staaten)");

    // Accept-Language header when no query override is given
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/languages")
                .header(header::ACCEPT_LANGUAGE, "de-AT,de;q=0.9")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["speech"]["en-US"]["name"], "Englisch (Vereinigte Staaten)");

    let (status, _) = send(&app, Method::GET, "/languages?scopes=video", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}
