use async_trait::async_trait;
use base64::Engine;
use image::{imageops::FilterType, ImageFormat, RgbImage};
use reqwest::Client;
use serde::Deserialize;
use std::io::Cursor;

use crate::models::inference::RawDetection;
use crate::services::inference::{CapabilityError, Classifier, Detector};

/// Classifier backed by a model server's `/classify` endpoint.
pub struct ModelServerClassifier {
    http: Client,
    base_url: String,
    api_token: Option<String>,
    input_size: (u32, u32),
}

/// Detector backed by a model server's `/detect` endpoint.
pub struct ModelServerDetector {
    http: Client,
    base_url: String,
    api_token: Option<String>,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    probabilities: Vec<f64>,
}

#[derive(Deserialize)]
struct DetectResponse {
    detections: Vec<RawDetection>,
}

impl ModelServerClassifier {
    pub fn new(
        http: Client,
        base_url: &str,
        api_token: Option<String>,
        input_size: (u32, u32),
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            input_size,
        }
    }
}

impl ModelServerDetector {
    pub fn new(http: Client, base_url: &str, api_token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }
}

#[async_trait]
impl Classifier for ModelServerClassifier {
    async fn ready(&self) -> Result<(), CapabilityError> {
        health_check(&self.http, &self.base_url, self.api_token.as_deref()).await
    }

    async fn classify(&self, image: &RgbImage) -> Result<Vec<f64>, CapabilityError> {
        let (width, height) = self.input_size;
        let resized = image::imageops::resize(image, width, height, FilterType::CatmullRom);

        let request_body = serde_json::json!({
            "image": encode_png_base64(&resized)?,
        });

        let response = authorized(
            self.http.post(format!("{}/classify", self.base_url)),
            self.api_token.as_deref(),
        )
        .json(&request_body)
        .send()
        .await?;

        let body: ClassifyResponse = check_status(response).await?.json().await?;
        Ok(body.probabilities)
    }
}

#[async_trait]
impl Detector for ModelServerDetector {
    async fn ready(&self) -> Result<(), CapabilityError> {
        health_check(&self.http, &self.base_url, self.api_token.as_deref()).await
    }

    async fn detect(
        &self,
        image: &RgbImage,
        min_confidence: f64,
    ) -> Result<Vec<RawDetection>, CapabilityError> {
        let request_body = serde_json::json!({
            "image": encode_png_base64(image)?,
            "threshold": min_confidence,
        });

        let response = authorized(
            self.http.post(format!("{}/detect", self.base_url)),
            self.api_token.as_deref(),
        )
        .json(&request_body)
        .send()
        .await?;

        let body: DetectResponse = check_status(response).await?.json().await?;
        Ok(body.detections)
    }
}

fn authorized(request: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn health_check(
    http: &Client,
    base_url: &str,
    token: Option<&str>,
) -> Result<(), CapabilityError> {
    let response = authorized(http.get(format!("{}/health", base_url)), token)
        .send()
        .await?;
    check_status(response).await?;
    Ok(())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CapabilityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CapabilityError::Status {
        status: status.as_u16(),
        body,
    })
}

fn encode_png_base64(image: &RgbImage) -> Result<String, CapabilityError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
}
