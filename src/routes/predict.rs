use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::models::result::AnalysisPayload;
use crate::routes::InspectState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// POST /predict: run the pipeline on an uploaded image without going through the queue.
pub async fn predict(
    State(state): State<InspectState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisPayload>, ApiError> {
    let mut image_data = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid multipart body"))?
    {
        if field.name() == Some("image") {
            let data = field
                .bytes()
                .await
                .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Failed to read image"))?;
            image_data = Some(data);
        }
    }

    let image_data =
        image_data.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "No image uploaded"))?;
    let image = image::load_from_memory(&image_data)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid image: {}", e)))?
        .to_rgb8();

    let (classification, detections) = state.pipeline.infer(&image).await.map_err(|e| {
        tracing::warn!(error = %e, "Inference failed for uploaded image");
        api_error(StatusCode::BAD_GATEWAY, e.to_string())
    })?;

    let annotator = Arc::clone(&state.annotator);
    let to_draw = detections.clone();
    let annotated = tokio::task::spawn_blocking(move || annotator.annotate(&image, &to_draw))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(AnalysisPayload::new(
        &classification,
        &detections,
        &annotated,
    )))
}
