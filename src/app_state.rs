use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    annotate::{Annotator, EncodingError},
    inference::InferencePipeline,
    job_source::JobSource,
    model_server::{ModelServerClassifier, ModelServerDetector},
    result_sink::ResultSink,
};

/// Read-only collaborators shared by every worker.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<InferencePipeline>,
    pub annotator: Arc<Annotator>,
    pub source: Arc<JobSource>,
    pub sink: Arc<ResultSink>,
}

impl AppState {
    pub fn new(
        pipeline: InferencePipeline,
        annotator: Annotator,
        source: JobSource,
        sink: ResultSink,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            annotator: Arc::new(annotator),
            source: Arc::new(source),
            sink: Arc::new(sink),
        }
    }

    /// Wire up the model-server capabilities and queue clients from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let classifier = ModelServerClassifier::new(
            http.clone(),
            &config.classifier_url,
            config.model_api_token.clone(),
            config.classifier_input_size(),
        );
        let detector = ModelServerDetector::new(
            http.clone(),
            &config.detector_url,
            config.model_api_token.clone(),
        );
        let pipeline = InferencePipeline::new(Arc::new(classifier), Arc::new(detector))
            .with_min_confidence(config.min_detection_confidence);

        let annotator = match &config.annotation_font_path {
            Some(path) => Annotator::with_font_path(Path::new(path))?,
            None => Annotator::with_system_font(),
        }
        .with_jpeg_quality(config.jpeg_quality);

        tracing::info!(
            min_confidence = pipeline.min_confidence(),
            tag_text = annotator.has_font(),
            jpeg_quality = config.jpeg_quality,
            "Inference pipeline configured"
        );

        Ok(Self::new(
            pipeline,
            annotator,
            JobSource::new(http.clone(), &config.queue_base_url),
            ResultSink::new(http, &config.queue_base_url),
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to initialize annotator: {0}")]
    Annotator(#[from] EncodingError),
}
