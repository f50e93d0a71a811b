//! Operation submission endpoints. Each route injects its operation tag
//! into the JSON body and hands the typed spec to the planner; the heavy
//! lifting (validation, linkage, persistence) lives in the core.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use super::error::ApiError;
use crate::ffpipe_core::Engine;
use crate::ffpipe_core::domain::TaskSpec;

/// Build a [`TaskSpec`] from a request body plus the route's operation tag.
fn spec_from_body(kind: &str, mut body: Value) -> Result<TaskSpec, ApiError> {
    let obj = body
        .as_object_mut()
        .ok_or_else(|| ApiError::bad_request("request body must be a JSON object"))?;
    obj.insert("operation".to_string(), json!(kind));
    serde_json::from_value(body)
        .map_err(|err| ApiError::bad_request(format!("invalid {kind} arguments: {err}")))
}

fn file_id_from_body(body: &Value) -> Result<String, ApiError> {
    body.get("file_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("file_id is required"))
}

async fn submit(engine: Engine, kind: &str, body: Value) -> Result<Json<Value>, ApiError> {
    let file_id = file_id_from_body(&body)?;
    let spec = spec_from_body(kind, body)?;
    engine.plan_single(&file_id, spec).await?;
    Ok(Json(json!({ "success": true })))
}

macro_rules! operation_endpoint {
    ($name:ident, $tag:literal) => {
        pub async fn $name(
            State(engine): State<Engine>,
            Json(body): Json<Value>,
        ) -> Result<Json<Value>, ApiError> {
            submit(engine, $tag, body).await
        }
    };
}

operation_endpoint!(transcode, "transcode");
operation_endpoint!(resize_video, "resize-video");
operation_endpoint!(trim, "trim");
operation_endpoint!(trim_end, "trim-end");
operation_endpoint!(extract_audio, "extract-audio");
operation_endpoint!(remove_audio, "remove-audio");
operation_endpoint!(add_audio, "add-audio");
operation_endpoint!(extract_thumbnail, "extract-thumbnail");
operation_endpoint!(dash, "dash");
operation_endpoint!(asr_normalize, "asr-normalize");
operation_endpoint!(asr_analyze, "asr-analyze");
operation_endpoint!(asr_segment, "asr-segment");
operation_endpoint!(vision_analyze, "vision-analyze");
operation_endpoint!(vision_segment, "vision-segment");

/// `POST /merge` — the first listed file anchors the task.
pub async fn merge(
    State(engine): State<Engine>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let first = body
        .get("file_ids")
        .and_then(Value::as_array)
        .and_then(|ids| ids.first())
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("file_ids must be a non-empty array"))?;
    let spec = spec_from_body("merge-media", body)?;
    engine.plan_single(&first, spec).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct ChainRequest {
    file_id: String,
    operations: Vec<Value>,
}

/// `POST /chain` — an ordered list of tagged operations against one file.
pub async fn chain(
    State(engine): State<Engine>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let request: ChainRequest = serde_json::from_value(body)
        .map_err(|err| ApiError::bad_request(format!("invalid chain request: {err}")))?;
    let mut specs = Vec::with_capacity(request.operations.len());
    for op in request.operations {
        let spec: TaskSpec = serde_json::from_value(op)
            .map_err(|err| ApiError::bad_request(format!("invalid chain operation: {err}")))?;
        specs.push(spec);
    }
    engine.plan_chain(&request.file_id, specs).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    file_ids: Vec<String>,
    operation: Value,
}

/// `POST /bulk` — one operation fanned out across many files.
pub async fn bulk(
    State(engine): State<Engine>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let request: BulkRequest = serde_json::from_value(body)
        .map_err(|err| ApiError::bad_request(format!("invalid bulk request: {err}")))?;
    let spec: TaskSpec = serde_json::from_value(request.operation)
        .map_err(|err| ApiError::bad_request(format!("invalid bulk operation: {err}")))?;
    engine.plan_bulk(&request.file_ids, spec).await?;
    Ok(Json(json!({ "success": true })))
}
