//! File-centric handlers: upload, diagnostics, metadata, status, retrieval,
//! and deletion.

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::warn;

use super::error::ApiError;
use crate::ffpipe_core::Engine;
use crate::ffpipe_core::blob::{BlobAcl, BlobStore};
use crate::ffpipe_core::domain::formats::{ext_of, mime_for_ext};
use crate::ffpipe_core::domain::{MediaFile, fold_status};
use crate::ffpipe_core::probe;

/// `POST /upload` — multipart field `file` becomes a new private object and
/// file row. Returns the generated id.
pub async fn upload(
    State(engine): State<Engine>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(&err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "upload.bin".to_string());
        let ext = ext_of(&file_name).unwrap_or_else(|| "bin".to_string());

        let id = engine.new_file_id();
        let key = format!("{id}.{ext}");
        let local = engine.config().temp_dir.join(&key);
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| ApiError::internal(err.to_string()))?;
        }

        let mut out = tokio::fs::File::create(&local)
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => out
                    .write_all(&chunk)
                    .await
                    .map_err(|err| ApiError::internal(err.to_string()))?,
                Ok(None) => break,
                Err(err) => {
                    drop(out);
                    engine.discard_local(local);
                    return Err(multipart_error(&err.to_string()));
                }
            }
        }
        out.flush()
            .await
            .map_err(|err| ApiError::internal(err.to_string()))?;
        drop(out);

        // Advisory: an unprobeable upload is still stored, just without
        // stream metadata.
        let metadata = match probe::probe_media(&engine.config().ffprobe_path, &local).await {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                warn!(file_id = %id, error = %err, "upload probe failed");
                None
            }
        };

        let upload_result = engine
            .blob()
            .put_from_disk(&key, &local, BlobAcl::Private)
            .await;
        engine.discard_local(local);
        upload_result?;

        engine
            .store()
            .insert_file(&MediaFile {
                id: id.clone(),
                file_name,
                file_path: key,
                mime_type: mime_for_ext(&ext).to_string(),
                metadata,
            })
            .await?;

        return Ok(Json(json!({ "fileId": id })));
    }

    Err(ApiError::bad_request("multipart field \"file\" is required"))
}

fn multipart_error(message: &str) -> ApiError {
    // The body-limit layer surfaces mid-stream as a length error inside the
    // multipart read.
    if message.contains("length limit") || message.contains("payload too large") {
        ApiError::payload_too_large()
    } else {
        ApiError::bad_request(format!("invalid multipart upload: {message}"))
    }
}

/// `GET /files`
pub async fn list_files(
    State(engine): State<Engine>,
) -> Result<Json<Vec<MediaFile>>, ApiError> {
    Ok(Json(engine.store().list_files().await?))
}

/// `GET /files/{id}`
pub async fn get_file(
    State(engine): State<Engine>,
    Path(id): Path<String>,
) -> Result<Json<MediaFile>, ApiError> {
    let file = require_file(&engine, &id).await?;
    Ok(Json(file))
}

/// `GET /tasks`
pub async fn list_tasks(
    State(engine): State<Engine>,
) -> Result<Json<Vec<crate::ffpipe_core::domain::Task>>, ApiError> {
    Ok(Json(engine.store().list_tasks().await?))
}

/// `GET /meta/{id}` — probe the current object. The response shape follows
/// the media kind (video/audio/image).
pub async fn meta(
    State(engine): State<Engine>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let file = require_file(&engine, &id).await?;
    let metadata = engine.probe_stored_file(&file).await?;
    let mut value = serde_json::to_value(&metadata).map_err(|err| ApiError::internal(err.to_string()))?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("fileId".to_string(), json!(file.id));
        obj.insert("fileName".to_string(), json!(file.file_name));
    }
    Ok(Json(value))
}

/// `GET /status/{id}` — folded task status for the file.
pub async fn status(
    State(engine): State<Engine>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if engine.store().get_file(&id).await?.is_none() {
        return Ok(Json(json!({ "fileId": id, "status": "not-found" })));
    }
    let tasks = engine.store().tasks_for_file(&id).await?;
    let status = fold_status(&tasks);
    Ok(Json(json!({ "fileId": id, "status": status })))
}

/// `GET /output/{id}` — stream the file's current object.
pub async fn output(
    State(engine): State<Engine>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let file = require_file(&engine, &id).await?;
    stream_current_object(&engine, &file).await
}

/// `GET /download/{id}` — stream the object, then remove the file, its
/// tasks, and its objects.
pub async fn download(
    State(engine): State<Engine>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let file = require_file(&engine, &id).await?;
    let response = stream_current_object(&engine, &file).await?;
    engine.delete_file_completely(&file).await?;
    Ok(response)
}

/// `DELETE /delete/{id}`
pub async fn delete(
    State(engine): State<Engine>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let file = require_file(&engine, &id).await?;
    engine.delete_file_completely(&file).await?;
    Ok(Json(json!({ "success": true })))
}

async fn require_file(engine: &Engine, id: &str) -> Result<MediaFile, ApiError> {
    engine
        .store()
        .get_file(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("file {id}")))
}

/// Materialize the object into scratch, open it, and hand the fd to the
/// response stream. The scratch file is unlinked off the critical path; the
/// open descriptor keeps the bytes alive for the client.
async fn stream_current_object(engine: &Engine, file: &MediaFile) -> Result<Response, ApiError> {
    let local = engine.materialize_for_response(file).await?;
    let handle = tokio::fs::File::open(&local)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;
    engine.discard_local(local);

    let stream = ReaderStream::new(handle);
    let body = Body::from_stream(stream);
    let response = (
        [
            (header::CONTENT_TYPE, file.mime_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.file_name),
            ),
        ],
        body,
    )
        .into_response();
    Ok(response)
}
