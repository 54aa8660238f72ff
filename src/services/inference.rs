use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;
use strum::EnumCount;

use crate::models::inference::{
    ClassLabel, Classification, Detection, DetectionLabel, RawDetection,
};

/// Detections scoring below this are never returned.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Image classifier producing a probability per [`ClassLabel`], in label order.
///
/// Implementations own their input preprocessing (resizing, normalisation).
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Called once per worker before its first job.
    async fn ready(&self) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn classify(&self, image: &RgbImage) -> Result<Vec<f64>, CapabilityError>;
}

/// Object detector producing boxes with class ids from the [`DetectionLabel`] table.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Called once per worker before its first job.
    async fn ready(&self) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn detect(
        &self,
        image: &RgbImage,
        min_confidence: f64,
    ) -> Result<Vec<RawDetection>, CapabilityError>;
}

/// Two-stage classification + detection over a single image.
///
/// All-or-nothing: if either stage fails no partial result is returned.
pub struct InferencePipeline {
    classifier: Arc<dyn Classifier>,
    detector: Arc<dyn Detector>,
    min_confidence: f64,
}

impl InferencePipeline {
    pub fn new(classifier: Arc<dyn Classifier>, detector: Arc<dyn Detector>) -> Self {
        Self {
            classifier,
            detector,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Check that both capabilities can serve requests.
    pub async fn ready(&self) -> Result<(), InferenceError> {
        tokio::try_join!(
            async { self.classifier.ready().await.map_err(InferenceError::Classifier) },
            async { self.detector.ready().await.map_err(InferenceError::Detector) },
        )?;
        Ok(())
    }

    /// Classify and detect. The two stages share no data and run concurrently.
    pub async fn infer(
        &self,
        image: &RgbImage,
    ) -> Result<(Classification, Vec<Detection>), InferenceError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(InferenceError::EmptyImage);
        }

        let (scores, raw) = tokio::try_join!(
            async {
                self.classifier
                    .classify(image)
                    .await
                    .map_err(InferenceError::Classifier)
            },
            async {
                self.detector
                    .detect(image, self.min_confidence)
                    .await
                    .map_err(InferenceError::Detector)
            },
        )?;

        let classification = classification_from_scores(&scores)?;
        let detections = resolve_detections(raw, self.min_confidence)?;

        Ok((classification, detections))
    }
}

/// Pick the highest-probability label. Ties go to the lowest index.
pub fn classification_from_scores(scores: &[f64]) -> Result<Classification, InferenceError> {
    if scores.len() != ClassLabel::COUNT {
        return Err(InferenceError::DistributionShape {
            got: scores.len(),
            expected: ClassLabel::COUNT,
        });
    }

    let mut best = 0;
    for (index, &score) in scores.iter().enumerate() {
        if !(0.0..=1.0).contains(&score) {
            return Err(InferenceError::ConfidenceOutOfRange(score));
        }
        if score > scores[best] {
            best = index;
        }
    }

    let label = ClassLabel::from_repr(best).ok_or(InferenceError::DistributionShape {
        got: scores.len(),
        expected: ClassLabel::COUNT,
    })?;

    Ok(Classification {
        label,
        confidence: scores[best],
    })
}

/// Threshold and label raw detector output, keeping detector order.
pub fn resolve_detections(
    raw: Vec<RawDetection>,
    min_confidence: f64,
) -> Result<Vec<Detection>, InferenceError> {
    let mut detections = Vec::with_capacity(raw.len());
    for d in raw {
        if !(0.0..=1.0).contains(&d.confidence) {
            return Err(InferenceError::ConfidenceOutOfRange(d.confidence));
        }
        if d.confidence < min_confidence {
            continue;
        }
        if !d.bbox.is_finite() {
            return Err(InferenceError::InvalidBox(d.class_id));
        }
        let label = DetectionLabel::from_repr(d.class_id)
            .ok_or(InferenceError::UnknownClass(d.class_id))?;
        detections.push(Detection {
            class_id: d.class_id,
            label,
            confidence: d.confidence,
            bounding_box: d.bbox,
        });
    }
    Ok(detections)
}

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("Model server request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to prepare image: {0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Image has no pixels")]
    EmptyImage,

    #[error("Classifier failed: {0}")]
    Classifier(#[source] CapabilityError),

    #[error("Detector failed: {0}")]
    Detector(#[source] CapabilityError),

    #[error("Classifier returned {got} scores, expected {expected}")]
    DistributionShape { got: usize, expected: usize },

    #[error("Confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("Detector returned unknown class id {0}")]
    UnknownClass(usize),

    #[error("Detector returned a non-finite box for class id {0}")]
    InvalidBox(usize),
}
