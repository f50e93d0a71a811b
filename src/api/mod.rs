//! Thin HTTP adapter over the engine. Routing and body shapes only; all
//! semantics live in `ffpipe_core`.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::ffpipe_core::Engine;
use crate::ffpipe_core::config::MAX_UPLOAD_BYTES;

mod error;
mod files;
mod operations;

pub use error::ApiError;

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route(
            "/upload",
            post(files::upload).layer((
                DefaultBodyLimit::disable(),
                RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES),
            )),
        )
        .route("/files", get(files::list_files))
        .route("/files/{id}", get(files::get_file))
        .route("/tasks", get(files::list_tasks))
        .route("/meta/{id}", get(files::meta))
        .route("/status/{id}", get(files::status))
        .route("/output/{id}", get(files::output))
        .route("/download/{id}", get(files::download))
        .route("/delete/{id}", delete(files::delete))
        .route("/transcode", post(operations::transcode))
        .route("/resize-video", post(operations::resize_video))
        .route("/trim", post(operations::trim))
        .route("/trim-end", post(operations::trim_end))
        .route("/extract-audio", post(operations::extract_audio))
        .route("/remove-audio", post(operations::remove_audio))
        .route("/add-audio", post(operations::add_audio))
        .route("/merge", post(operations::merge))
        .route("/extract-thumbnail", post(operations::extract_thumbnail))
        .route("/dash", post(operations::dash))
        .route("/asr-normalize", post(operations::asr_normalize))
        .route("/asr-analyze", post(operations::asr_analyze))
        .route("/asr-segment", post(operations::asr_segment))
        .route("/vision-analyze", post(operations::vision_analyze))
        .route("/vision-segment", post(operations::vision_segment))
        .route("/chain", post(operations::chain))
        .route("/bulk", post(operations::bulk))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}
