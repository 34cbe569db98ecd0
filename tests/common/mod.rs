#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http_body_util::BodyExt;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use prompt_studio::error::GenerationError;
use prompt_studio::generator::{Artifact, GenerationRequest, ImageGenerator};
use prompt_studio::improver::{ImproveOutcome, PromptImprover};
use prompt_studio::jobs::{OrchestratorOptions, Pipeline};
use prompt_studio::storage::Delivery;
use prompt_studio::{Job, JobId, Orchestrator};

/// Prompts containing this marker make [`FakeGenerator`] return an API error.
pub const FAIL_MARKER: &str = "FAIL";
/// Prompts containing this marker make [`FakeGenerator`] panic.
pub const PANIC_MARKER: &str = "PANIC";
/// Prompts containing this marker make [`FakeGenerator`] return undecodable image data.
pub const CORRUPT_MARKER: &str = "CORRUPT";

pub const IMPROVED_SUFFIX: &str = "highly detailed, dramatic lighting";

pub struct FakeImprover {
    succeed: bool,
    calls: AtomicUsize,
}

impl FakeImprover {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            succeed: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            succeed: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PromptImprover for FakeImprover {
    async fn improve(&self, text: &str) -> ImproveOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            ImproveOutcome::success(format!("{text}, {IMPROVED_SUFFIX}"))
        } else {
            ImproveOutcome::failure(text)
        }
    }
}

/// Returns one fake PNG per requested sample and records what it was asked.
pub struct FakeGenerator {
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    prompts: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeGenerator {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            gate: None,
            prompts: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    /// Blocks every call until `gate` has a permit.
    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            gate: Some(gate),
            prompts: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Artifact>, GenerationError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if request.prompt.contains(PANIC_MARKER) {
            panic!("generator exploded");
        }
        if request.prompt.contains(FAIL_MARKER) {
            return Err(GenerationError::Upstream {
                status: 400,
                message: "invalid_prompts".to_string(),
            });
        }
        let corrupt = request.prompt.contains(CORRUPT_MARKER);
        Ok((0..request.samples)
            .map(|n| Artifact {
                base64: if corrupt {
                    "%%%".to_string()
                } else {
                    STANDARD.encode(format!("fake-png-{n}"))
                },
                seed: Some(u64::from(n)),
                finish_reason: Some("SUCCESS".to_string()),
            })
            .collect())
    }
}

pub fn start(
    improver: Arc<FakeImprover>,
    generator: Arc<FakeGenerator>,
    delivery: Delivery,
) -> Orchestrator {
    start_with(Pipeline::new(improver, generator, delivery), OrchestratorOptions::default())
}

pub fn start_with(pipeline: Pipeline, options: OrchestratorOptions) -> Orchestrator {
    Orchestrator::start(pipeline, options)
}

/// Waits for a job to finish, failing the test after five seconds.
pub async fn finish(orchestrator: &Orchestrator, job_id: &JobId) -> Job {
    tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.wait_for(job_id, Duration::from_millis(5), |_| {}),
    )
    .await
    .expect("job did not finish in time")
    .expect("job disappeared")
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, bytes) = get(app, uri).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

pub async fn post_json(app: &Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}
