pub mod api;
pub mod ffpipe_core;

pub use ffpipe_core::{Config, Engine, PipelineError};
