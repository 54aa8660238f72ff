use reqwest::Client;

use crate::error::TransportError;
use crate::models::result::{JobResult, SubmitPayload};

const SUBMIT_RESULT_PATH: &str = "/ai/submit_result";

/// Client for the queue's "submit result" operation.
pub struct ResultSink {
    http: Client,
    submit_url: String,
}

impl ResultSink {
    pub fn new(http: Client, queue_base_url: &str) -> Self {
        Self {
            http,
            submit_url: format!(
                "{}{}",
                queue_base_url.trim_end_matches('/'),
                SUBMIT_RESULT_PATH
            ),
        }
    }

    /// Post a result once. Consumes it so the same result cannot be resubmitted;
    /// there is no internal retry.
    pub async fn submit(&self, result: JobResult) -> Result<(), TransportError> {
        let payload = SubmitPayload::from(&result);

        let response = self.http.post(&self.submit_url).json(&payload).send().await?;
        TransportError::check(response).await?;

        Ok(())
    }
}
