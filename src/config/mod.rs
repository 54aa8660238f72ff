use garde::Validate;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Base URL of the remote queue service (e.g., "http://localhost:5231")
    #[serde(default = "default_queue_base_url")]
    #[garde(length(min = 1))]
    pub queue_base_url: String,

    /// Number of independent workers to run
    #[serde(default = "default_worker_count")]
    #[garde(range(min = 1, max = 64))]
    pub worker_count: usize,

    /// Delay after an empty or failed poll, in milliseconds
    #[serde(default = "default_backoff_ms")]
    #[garde(range(min = 1))]
    pub backoff_ms: u64,

    /// Timeout for every outbound HTTP call, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    #[garde(range(min = 1))]
    pub request_timeout_ms: u64,

    /// Detections scoring below this are discarded
    #[serde(default = "default_min_detection_confidence")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub min_detection_confidence: f64,

    /// Model server base URL for classification
    #[serde(default = "default_model_server_url")]
    #[garde(length(min = 1))]
    pub classifier_url: String,

    /// Model server base URL for detection
    #[serde(default = "default_model_server_url")]
    #[garde(length(min = 1))]
    pub detector_url: String,

    /// Optional bearer token for the model server
    #[serde(default)]
    #[garde(skip)]
    pub model_api_token: Option<String>,

    #[serde(default = "default_classifier_input_width")]
    #[garde(range(min = 1))]
    pub classifier_input_width: u32,

    #[serde(default = "default_classifier_input_height")]
    #[garde(range(min = 1))]
    pub classifier_input_height: u32,

    /// TTF/OTF font for annotation tags. System fonts are probed when unset.
    #[serde(default)]
    #[garde(skip)]
    pub annotation_font_path: Option<String>,

    #[serde(default = "default_jpeg_quality")]
    #[garde(range(min = 1, max = 100))]
    pub jpeg_quality: u8,

    /// Inspection server bind address (e.g., "0.0.0.0:8080"). Disabled when unset.
    #[serde(default)]
    #[garde(skip)]
    pub http_bind_addr: Option<String>,
}

fn default_queue_base_url() -> String {
    "http://localhost:5231".to_string()
}

fn default_worker_count() -> usize {
    4
}

fn default_backoff_ms() -> u64 {
    3_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_min_detection_confidence() -> f64 {
    0.5
}

fn default_model_server_url() -> String {
    "http://localhost:8500".to_string()
}

fn default_classifier_input_width() -> u32 {
    64
}

fn default_classifier_input_height() -> u32 {
    32
}

fn default_jpeg_quality() -> u8 {
    75
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn classifier_input_size(&self) -> (u32, u32) {
        (self.classifier_input_width, self.classifier_input_height)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}
