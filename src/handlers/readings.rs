//! Reading generation endpoint
//!
//! `POST /v1/readings` accepts an [`AdviseRequest`] and answers with a
//! [`GenerationResult`]. Any well-formed JSON body gets a 200: fields of
//! the wrong type are ignored, and a body that is not an object is treated
//! as an empty request (which yields the `NO_CARDS` notice).

use axum::{Json, extract::State};
use serde_json::Value;

use crate::adviser::AdviseRequest;
use crate::handlers::AppState;
use crate::result::GenerationResult;

pub async fn handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Json<GenerationResult> {
    let request = match serde_json::from_value::<AdviseRequest>(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "Request body is not an object, treating as empty");
            AdviseRequest::default()
        }
    };

    let result = state.adviser().generate(request).await;

    tracing::info!(
        inference_id = %result.meta().inference_id,
        backend = result.meta().backend.as_str(),
        valid = result.is_valid(),
        cached = result.meta().cached,
        reason = result.meta().reason.map(|r| r.as_str()).unwrap_or("none"),
        "Reading request completed"
    );

    Json(result)
}
