use crate::services::{annotate::EncodingError, inference::InferenceError};

/// Network-level failure talking to the remote queue.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Queue service returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Request(e) if e.is_timeout())
    }

    /// Turn a non-success response into a `Status` error, passing successful ones through.
    pub(crate) async fn check(response: reqwest::Response) -> Result<reqwest::Response, Self> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// A failure that drops the job currently held by a worker.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Annotation failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Result submission failed: {0}")]
    Submit(#[from] TransportError),

    /// A capability or stage panicked while holding the job.
    #[error("Job processing panicked: {0}")]
    Panic(String),
}

impl JobError {
    /// Stable name used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Inference(_) => "inference",
            JobError::Encoding(_) => "encoding",
            JobError::Submit(e) if e.is_timeout() => "submit_timeout",
            JobError::Submit(_) => "submit",
            JobError::Panic(_) => "panic",
        }
    }
}
