//! Core of the media pipeline: durable task queue, scheduler, executor, and
//! the adapters they sit on. The HTTP layer in `crate::api` is a thin shell
//! over [`engine::Engine`].

pub mod blob;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ffmpeg_args;
pub mod probe;
pub mod store;

pub use config::Config;
pub use engine::Engine;
pub use error::PipelineError;
