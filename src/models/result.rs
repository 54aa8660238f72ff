use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::models::inference::{Classification, Detection};

/// JPEG bytes of a source image with all detections drawn on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedImage(Vec<u8>);

impl AnnotatedImage {
    pub fn from_jpeg(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.0)
    }
}

/// Everything produced for one job, ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_id: String,
    pub classification: Classification,
    /// Detector output order, never re-sorted.
    pub detections: Vec<Detection>,
    pub annotated_image: AnnotatedImage,
}

/// Body posted to the queue's submit operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitPayload {
    #[serde(rename = "queueId")]
    pub queue_id: String,
    #[serde(flatten)]
    pub analysis: AnalysisPayload,
}

/// Classification and detection sections shared by the submit payload and `/predict`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisPayload {
    pub classification: ClassificationPayload,
    pub detection: DetectionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationPayload {
    pub prediction: String,
    /// Percentage, two decimals.
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionPayload {
    pub objects: Vec<ObjectPayload>,
    /// Base64 JPEG of the annotated image.
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectPayload {
    pub id: usize,
    pub label: String,
    /// Percentage, two decimals.
    pub confidence: f64,
    pub bbox: [f64; 4],
}

/// Convert a probability to a percentage rounded to two decimals.
pub fn as_percentage(probability: f64) -> f64 {
    (probability * 10_000.0).round() / 100.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl AnalysisPayload {
    pub fn new(
        classification: &Classification,
        detections: &[Detection],
        annotated_image: &AnnotatedImage,
    ) -> Self {
        let objects = detections
            .iter()
            .map(|d| ObjectPayload {
                id: d.class_id,
                label: d.label.to_string(),
                confidence: as_percentage(d.confidence),
                bbox: <[f64; 4]>::from(d.bounding_box).map(round2),
            })
            .collect();

        Self {
            classification: ClassificationPayload {
                prediction: classification.label.to_string(),
                confidence: as_percentage(classification.confidence),
            },
            detection: DetectionPayload {
                objects,
                image: annotated_image.to_base64(),
            },
        }
    }
}

impl From<&JobResult> for SubmitPayload {
    fn from(result: &JobResult) -> Self {
        Self {
            queue_id: result.job_id.clone(),
            analysis: AnalysisPayload::new(
                &result.classification,
                &result.detections,
                &result.annotated_image,
            ),
        }
    }
}
