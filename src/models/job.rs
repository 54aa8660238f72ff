use image::RgbImage;
use serde::{Deserialize, Serialize};
use strum::Display;

/// One unit of work handed out by the remote queue.
///
/// The image is decoded once by the job source and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    pub image: RgbImage,
}

/// Lifecycle status of a single worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Fetching,
    Processing,
    Submitting,
    Backoff,
    Stopped,
}
