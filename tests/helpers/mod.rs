//! Shared fakes for integration tests: an in-process queue service and stub capabilities.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vision_queue_worker::app_state::AppState;
use vision_queue_worker::models::inference::{BoundingBox, RawDetection};
use vision_queue_worker::services::annotate::Annotator;
use vision_queue_worker::services::inference::{
    CapabilityError, Classifier, Detector, InferencePipeline,
};
use vision_queue_worker::services::job_source::JobSource;
use vision_queue_worker::services::result_sink::ResultSink;

/// One scripted answer from the fake queue's next-job endpoint.
pub enum QueueReply {
    Json(Value),
    NoContent,
    Status(u16),
}

#[derive(Default)]
pub struct QueueState {
    replies: Mutex<VecDeque<QueueReply>>,
    submissions: Mutex<Vec<Value>>,
    submit_delay: Mutex<Option<Duration>>,
    job_delays: Mutex<HashMap<String, Duration>>,
    pub fetches: AtomicUsize,
    pub submit_attempts: AtomicUsize,
}

/// In-process stand-in for the remote queue service.
pub struct FakeQueue {
    pub addr: SocketAddr,
    pub state: Arc<QueueState>,
}

impl FakeQueue {
    pub async fn start() -> Self {
        let state = Arc::new(QueueState::default());
        let app = Router::new()
            .route("/ai/next_job", get(next_job))
            .route("/ai/submit_result", post(submit_result))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn push(&self, reply: QueueReply) {
        self.state.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_job(&self, queue_id: &str, image_base64: String) {
        self.push(QueueReply::Json(
            serde_json::json!({ "queueId": queue_id, "image": image_base64 }),
        ));
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.state.submit_delay.lock().unwrap() = Some(delay);
    }

    /// Delay only the submission carrying `queue_id`.
    pub fn set_submit_delay_for(&self, queue_id: &str, delay: Duration) {
        self.state
            .job_delays
            .lock()
            .unwrap()
            .insert(queue_id.to_string(), delay);
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.state.submissions.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    pub fn submit_attempts(&self) -> usize {
        self.state.submit_attempts.load(Ordering::SeqCst)
    }
}

async fn next_job(State(state): State<Arc<QueueState>>) -> Response {
    state.fetches.fetch_add(1, Ordering::SeqCst);
    let reply = state.replies.lock().unwrap().pop_front();
    match reply {
        Some(QueueReply::Json(body)) => (StatusCode::OK, Json(body)).into_response(),
        Some(QueueReply::Status(code)) => StatusCode::from_u16(code).unwrap().into_response(),
        Some(QueueReply::NoContent) | None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn submit_result(State(state): State<Arc<QueueState>>, Json(body): Json<Value>) -> StatusCode {
    state.submit_attempts.fetch_add(1, Ordering::SeqCst);
    let job_delay = body["queueId"]
        .as_str()
        .and_then(|id| state.job_delays.lock().unwrap().get(id).copied());
    let delay = job_delay.or(*state.submit_delay.lock().unwrap());
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    state.submissions.lock().unwrap().push(body);
    StatusCode::OK
}

/// Classifier returning fixed scores.
pub struct StubClassifier {
    pub scores: Vec<f64>,
    pub fail_ready: bool,
    /// Panics on the first readiness check only.
    pub panic_ready_once: AtomicBool,
    /// Panics on images of exactly this width.
    pub panic_on_width: Option<u32>,
    pub calls: AtomicUsize,
}

impl StubClassifier {
    pub fn new(scores: Vec<f64>) -> Self {
        Self {
            scores,
            fail_ready: false,
            panic_ready_once: AtomicBool::new(false),
            panic_on_width: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn ready(&self) -> Result<(), CapabilityError> {
        if self.panic_ready_once.swap(false, Ordering::SeqCst) {
            panic!("classifier runtime aborted during load");
        }
        if self.fail_ready {
            return Err(CapabilityError::Other("model weights missing".to_string()));
        }
        Ok(())
    }

    async fn classify(&self, image: &RgbImage) -> Result<Vec<f64>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_width == Some(image.width()) {
            panic!("classifier crashed on poison image");
        }
        Ok(self.scores.clone())
    }
}

/// Detector returning fixed detections, or failing.
pub struct StubDetector {
    pub detections: Result<Vec<RawDetection>, String>,
}

impl StubDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            detections: Ok(detections),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            detections: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl Detector for StubDetector {
    async fn detect(
        &self,
        _image: &RgbImage,
        _min_confidence: f64,
    ) -> Result<Vec<RawDetection>, CapabilityError> {
        self.detections.clone().map_err(CapabilityError::Other)
    }
}

pub fn raw_detection(class_id: usize, confidence: f64, bbox: [f64; 4]) -> RawDetection {
    RawDetection {
        class_id,
        confidence,
        bbox: BoundingBox::from(bbox),
    }
}

/// Wire a worker state against the fake queue.
pub fn build_state(
    queue: &FakeQueue,
    classifier: Arc<StubClassifier>,
    detector: StubDetector,
    timeout: Duration,
) -> AppState {
    let http = reqwest::Client::builder().timeout(timeout).build().unwrap();
    AppState::new(
        InferencePipeline::new(classifier, Arc::new(detector)),
        Annotator::default(),
        JobSource::new(http.clone(), &queue.base_url()),
        ResultSink::new(http, &queue.base_url()),
    )
}

pub fn sample_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]))
}

pub fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn png_base64(width: u32, height: u32) -> String {
    base64::engine::general_purpose::STANDARD.encode(png_bytes(&sample_image(width, height)))
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
