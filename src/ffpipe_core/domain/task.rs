use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::OperationKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    /// Terminal state for queued tasks invalidated by a sibling failure on
    /// the same file. Never entered from `processing`.
    Unreachable,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unreachable => "unreachable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "unreachable" => Some(Self::Unreachable),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Unreachable)
    }
}

/// One durable unit of work: a single external-binary invocation plus its
/// surrounding I/O and state updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Monotonic ordering key; tasks for one file run in ascending id order.
    pub id: i64,
    /// Short opaque identifier; doubles as the output basename.
    pub code: String,
    pub file_id: String,
    pub operation: OperationKind,
    /// Serialized [`TaskSpec`](super::operation::TaskSpec).
    pub args: serde_json::Value,
    pub status: TaskStatus,
    /// Pid of the ffmpeg child while the task is processing.
    pub pid: Option<u32>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate task state for one file, as reported by `/status/{id}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    NotFound,
    Pending,
    Completed,
    Failed,
}

/// Fold a file's tasks into one status. Any live task means pending; with
/// only terminal tasks, the newest one decides between completed and failed.
pub fn fold_status(tasks: &[Task]) -> FileStatus {
    if tasks
        .iter()
        .any(|t| matches!(t.status, TaskStatus::Queued | TaskStatus::Processing))
    {
        return FileStatus::Pending;
    }
    match tasks.iter().max_by_key(|t| t.id) {
        Some(latest) => match latest.status {
            TaskStatus::Failed | TaskStatus::Unreachable => FileStatus::Failed,
            _ => FileStatus::Completed,
        },
        None => FileStatus::Completed,
    }
}
