pub mod file;
pub mod formats;
pub mod operation;
pub mod task;

pub use file::{MediaFile, MediaMetadata};
pub use formats::{AudioCodec, AudioFormat, ImageFormat, VideoCodec, VideoFormat};
pub use operation::{Operation, OperationKind, TaskMode, TaskSpec};
pub use task::{FileStatus, Task, TaskStatus, fold_status};

#[cfg(test)]
mod tests;
