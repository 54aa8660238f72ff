use crate::models::inference::{Classification, Detection};
use crate::models::result::{AnnotatedImage, JobResult};

/// Merge the outputs of one job into its result record.
pub fn assemble(
    job_id: &str,
    classification: Classification,
    detections: Vec<Detection>,
    annotated_image: AnnotatedImage,
) -> JobResult {
    JobResult {
        job_id: job_id.to_string(),
        classification,
        detections,
        annotated_image,
    }
}
