use base64::Engine;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::TransportError;
use crate::models::job::Job;

const NEXT_JOB_PATH: &str = "/ai/next_job";

/// Client for the queue's "next job" operation.
pub struct JobSource {
    http: Client,
    next_job_url: String,
}

impl JobSource {
    pub fn new(http: Client, queue_base_url: &str) -> Self {
        Self {
            http,
            next_job_url: format!("{}{}", queue_base_url.trim_end_matches('/'), NEXT_JOB_PATH),
        }
    }

    /// Fetch and decode the next pending job.
    ///
    /// `Ok(None)` covers both an empty queue and a malformed response; the two are
    /// logged differently. Transport failures and non-success statuses are errors.
    pub async fn fetch_next(&self) -> Result<Option<Job>, TransportError> {
        match self.fetch().await? {
            Fetched::Job(job) => Ok(Some(job)),
            Fetched::Empty => Ok(None),
            Fetched::Malformed(e) => {
                tracing::warn!(error = %e, "Incomplete job data received, dropping");
                metrics::counter!("queue_fetch_malformed_total").increment(1);
                Ok(None)
            }
        }
    }

    /// Like [`fetch_next`](Self::fetch_next), but hands a malformed body back to
    /// the caller instead of logging it.
    pub async fn fetch(&self) -> Result<Fetched, TransportError> {
        let response = self.http.get(&self.next_job_url).send().await?;
        let response = TransportError::check(response).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Fetched::Empty);
        }

        let body = response.bytes().await?;

        Ok(match decode_job(&body) {
            Ok(Some(job)) => Fetched::Job(job),
            Ok(None) => Fetched::Empty,
            Err(e) => Fetched::Malformed(e),
        })
    }
}

/// Outcome of a successful next-job call.
#[derive(Debug)]
pub enum Fetched {
    Job(Job),
    Empty,
    Malformed(MalformedResponse),
}

/// Decode a next-job response body.
///
/// Empty bodies, `null`, and objects carrying neither `queueId` nor `image`
/// (the queue's "no pending job" message) mean no job.
pub fn decode_job(body: &[u8]) -> Result<Option<Job>, MalformedResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(body)?;
    let fields = match value {
        Value::Null => return Ok(None),
        Value::Object(fields) => fields,
        _ => return Err(MalformedResponse::NotAnObject),
    };

    let (queue_id, image) = match (fields.get("queueId"), fields.get("image")) {
        (None, None) => return Ok(None),
        (None, Some(_)) => return Err(MalformedResponse::MissingField("queueId")),
        (Some(_), None) => return Err(MalformedResponse::MissingField("image")),
        (Some(queue_id), Some(image)) => (queue_id, image),
    };

    let job_id = match queue_id.as_str() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(MalformedResponse::InvalidField("queueId")),
    };
    let encoded = image
        .as_str()
        .ok_or(MalformedResponse::InvalidField("image"))?;

    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
    let image = image::load_from_memory(&bytes)?.to_rgb8();

    Ok(Some(Job { job_id, image }))
}

#[derive(Debug, thiserror::Error)]
pub enum MalformedResponse {
    #[error("Body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Body is not a JSON object")]
    NotAnObject,

    #[error("Missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Field `{0}` has an invalid value")]
    InvalidField(&'static str),

    #[error("Image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image payload could not be decoded: {0}")]
    Image(#[from] image::ImageError),
}
