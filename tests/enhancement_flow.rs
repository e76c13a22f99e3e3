use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use vibecode::codec::{self, ImageAsset};
use vibecode::config::StoreConfig;
use vibecode::enhance::{
    EnhancementOrchestrator, EnhancementOutcome, EnhancementStatus, RetryPolicy, SubmitError,
};
use vibecode::generation::{GenerationClient, GenerationTransport, HttpReply, InvocationResult};
use vibecode::identity::{IdentityChannel, LocalIdentityProvider};
use vibecode::prompt::PromptStore;
use vibecode::session::VibeSession;
use vibecode::store::LocalDocumentStore;

#[derive(Clone, Default)]
struct FakeService {
    replies: Arc<Mutex<VecDeque<HttpReply>>>,
    calls: Arc<Mutex<usize>>,
    gate: Option<Arc<Notify>>,
}

impl FakeService {
    fn replying(replies: Vec<HttpReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

#[async_trait]
impl GenerationTransport for FakeService {
    async fn post_json(&self, _url: &str, _api_key: &str, _body: &Value) -> InvocationResult<HttpReply> {
        *self.calls.lock().expect("calls lock") += 1;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| status(500)))
    }
}

fn status(code: u16) -> HttpReply {
    HttpReply {
        status: code,
        body: json!({ "error": { "message": "boom" } }).to_string(),
    }
}

fn image(data: &str) -> HttpReply {
    HttpReply {
        status: 200,
        body: json!({
            "candidates": [{
                "content": { "parts": [{ "inlineData": { "mimeType": "image/png", "data": data } }] }
            }]
        })
        .to_string(),
    }
}

fn no_image() -> HttpReply {
    HttpReply {
        status: 200,
        body: json!({ "candidates": [{ "content": { "parts": [{ "text": "sorry" }] } }] })
            .to_string(),
    }
}

struct App {
    session: VibeSession,
    identity: Arc<IdentityChannel>,
    service: FakeService,
}

fn app(data_dir: &Path, service: FakeService) -> App {
    let identity = Arc::new(IdentityChannel::new(Arc::new(
        LocalIdentityProvider::in_memory(),
    )));
    let store_config = StoreConfig {
        app_id: "vibe-test".to_string(),
        data_dir: data_dir.to_path_buf(),
    };
    let prompts = PromptStore::new(
        Arc::new(LocalDocumentStore::with_root(data_dir)),
        &store_config,
    );
    let generation = vibecode::config::GenerationConfig {
        endpoint: "https://generation.test/v1beta".to_string(),
        model: "test-model".to_string(),
        api_key: "key".to_string(),
        timeout: None,
    };
    let orchestrator = Arc::new(EnhancementOrchestrator::new(
        Arc::new(GenerationClient::new(service.clone(), &generation)),
        prompts.clone(),
        identity.watch(),
        RetryPolicy::default(),
    ));
    App {
        session: VibeSession::new(Arc::clone(&identity), prompts, orchestrator),
        identity,
        service,
    }
}

async fn ready(app: &App, prompt: &str) {
    app.session.start(Some("alice")).await.expect("sign in");
    app.session.wait_for_prompt_load().await;
    app.session
        .upload_image(codec::encode(b"\x89PNG fake", "image/png"));
    app.session.set_prompt(prompt);
}

fn saved_document(data_dir: &Path) -> Value {
    let file = data_dir
        .join("documents/artifacts/vibe-test/users/alice/vibeData/current.json");
    let contents = std::fs::read_to_string(file).expect("document written");
    serde_json::from_str(&contents).expect("document is json")
}

#[tokio::test]
async fn empty_prompt_makes_no_network_call() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path(), FakeService::replying(vec![image("b2s=")]));
    ready(&app, "").await;

    let err = app.session.enhance().await.unwrap_err();

    assert!(matches!(err, SubmitError::Validation(_)));
    assert_eq!(app.session.orchestrator().status(), EnhancementStatus::Idle);
    assert_eq!(app.service.calls(), 0);
    assert!(!app.session.view().can_submit);
}

#[tokio::test(start_paused = true)]
async fn recovers_after_three_server_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(
        dir.path(),
        FakeService::replying(vec![status(500), status(500), status(500), image("ZG9uZQ==")]),
    );
    ready(&app, "neon glow").await;

    let started = tokio::time::Instant::now();
    let outcome = app.session.enhance().await.expect("accepted");

    assert!(matches!(
        outcome,
        EnhancementOutcome::Succeeded { attempts: 4, .. }
    ));
    let delays: Vec<Duration> = app
        .session
        .orchestrator()
        .transitions()
        .iter()
        .filter_map(|transition| transition.retry_delay())
        .collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(4000),
        ]
    );
    assert!(started.elapsed() >= Duration::from_millis(7000));
    assert_eq!(app.service.calls(), 4);
    assert_eq!(saved_document(dir.path())["text"], json!("neon glow"));
    assert_eq!(app.session.view().status_text, "Photo enhanced successfully!");
}

#[tokio::test(start_paused = true)]
async fn responses_without_image_fail_after_four_attempts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(
        dir.path(),
        FakeService::replying(vec![no_image(), no_image(), no_image(), no_image()]),
    );
    ready(&app, "neon glow").await;

    let outcome = app.session.enhance().await.expect("accepted");

    assert!(matches!(outcome, EnhancementOutcome::Failed { attempts: 4, .. }));
    assert_eq!(app.service.calls(), 4);
    let view = app.session.view();
    assert_eq!(
        view.status_text,
        "Failed to enhance photo. Check the logs for details."
    );
    assert!(view.can_submit);
}

#[tokio::test]
async fn sign_out_mid_flight_discards_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let gate = Arc::new(Notify::new());
    let service = FakeService {
        gate: Some(Arc::clone(&gate)),
        ..FakeService::replying(vec![image("bGF0ZQ==")])
    };
    let app = app(dir.path(), service);
    ready(&app, "neon glow").await;

    let orchestrator = Arc::clone(app.session.orchestrator());
    let submission = vibecode::enhance::Submission {
        prompt: "neon glow".to_string(),
        image: app.session.image(),
    };
    let run = tokio::spawn(async move { orchestrator.submit(submission).await });
    while app.service.calls() == 0 {
        tokio::task::yield_now().await;
    }

    let busy = app.session.enhance().await.unwrap_err();
    assert!(matches!(busy, SubmitError::Busy { .. }));

    app.identity.sign_out().await.expect("sign out");
    gate.notify_one();

    let outcome = run.await.expect("join").expect("accepted");
    assert_eq!(outcome, EnhancementOutcome::Discarded);
    assert_eq!(app.session.orchestrator().status(), EnhancementStatus::Idle);
    assert_eq!(app.session.orchestrator().snapshot().result, None);
}

#[tokio::test]
async fn saved_prompt_keeps_unrelated_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir
        .path()
        .join("documents/artifacts/vibe-test/users/alice/vibeData/current.json");
    std::fs::create_dir_all(file.parent().expect("parent")).expect("mkdir");
    std::fs::write(&file, json!({ "text": "old", "theme": "dark" }).to_string()).expect("seed");

    let app = app(dir.path(), FakeService::replying(vec![image("b2s=")]));
    ready(&app, "neon glow").await;
    assert_eq!(app.session.prompt(), "neon glow");

    app.session.enhance().await.expect("accepted");

    let saved = saved_document(dir.path());
    assert_eq!(saved["text"], json!("neon glow"));
    assert_eq!(saved["theme"], json!("dark"));
    assert!(saved["lastUpdated"].is_string());
}

#[tokio::test]
async fn result_can_be_written_to_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path(), FakeService::replying(vec![image("aGVsbG8=")]));
    ready(&app, "neon glow").await;

    let outcome = app.session.enhance().await.expect("accepted");
    let EnhancementOutcome::Succeeded { image, .. } = outcome else {
        panic!("expected success, got {outcome:?}");
    };

    let output = dir.path().join("out.png");
    codec::write_image_file(&image, &output).expect("write result");
    assert_eq!(std::fs::read(&output).expect("read back"), b"hello");
    assert_eq!(
        codec::strip_envelope(&image.to_data_uri()),
        image.inline_data()
    );
    assert_eq!(image, ImageAsset::from_inline("image/png", "aGVsbG8="));
}
