use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use super::WorkStore;
use crate::ffpipe_core::domain::{OperationKind, Task, TaskSpec, TaskStatus};
use crate::ffpipe_core::error::Result;

/// Insert payload for one task row. Status always starts `queued`.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub code: String,
    pub file_id: String,
    pub operation: OperationKind,
    pub spec: TaskSpec,
}

fn task_from_row(row: &SqliteRow) -> Result<Task> {
    let operation: String = row.try_get("operation")?;
    let operation: OperationKind =
        serde_json::from_value(serde_json::Value::String(operation))?;
    let status: String = row.try_get("status")?;
    let status: TaskStatus = serde_json::from_value(serde_json::Value::String(status))?;
    let args: String = row.try_get("args")?;
    let pid: Option<i64> = row.try_get("pid")?;
    let created_at: i64 = row.try_get("created_at")?;
    Ok(Task {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        file_id: row.try_get("file_id")?,
        operation,
        args: serde_json::from_str(&args)?,
        status,
        pid: pid.map(|p| p as u32),
        error: row.try_get("error")?,
        created_at: DateTime::<Utc>::from_timestamp_millis(created_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
    })
}

impl WorkStore {
    pub async fn create_task(&self, new: &NewTask) -> Result<Task> {
        let args = serde_json::to_string(&new.spec)?;
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO tasks (code, file_id, operation, args, status, created_at) \
             VALUES (?, ?, ?, ?, 'queued', ?)",
        )
        .bind(&new.code)
        .bind(&new.file_id)
        .bind(new.operation.as_str())
        .bind(&args)
        .bind(created_at.timestamp_millis())
        .execute(self.pool())
        .await?;
        let id = result.last_insert_rowid();
        Ok(Task {
            id,
            code: new.code.clone(),
            file_id: new.file_id.clone(),
            operation: new.operation,
            args: serde_json::to_value(&new.spec)?,
            status: TaskStatus::Queued,
            pid: None,
            error: None,
            created_at,
        })
    }

    /// Insert a batch of tasks in one transaction so a chain becomes visible
    /// to the scheduler all at once or not at all.
    pub async fn create_tasks(&self, batch: &[NewTask]) -> Result<Vec<Task>> {
        let mut tx = self.pool().begin().await?;
        let mut created = Vec::with_capacity(batch.len());
        for new in batch {
            let args = serde_json::to_string(&new.spec)?;
            let created_at = Utc::now();
            let result = sqlx::query(
                "INSERT INTO tasks (code, file_id, operation, args, status, created_at) \
                 VALUES (?, ?, ?, ?, 'queued', ?)",
            )
            .bind(&new.code)
            .bind(&new.file_id)
            .bind(new.operation.as_str())
            .bind(&args)
            .bind(created_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
            created.push(Task {
                id: result.last_insert_rowid(),
                code: new.code.clone(),
                file_id: new.file_id.clone(),
                operation: new.operation,
                args: serde_json::to_value(&new.spec)?,
                status: TaskStatus::Queued,
                pid: None,
                error: None,
                created_at,
            });
        }
        tx.commit().await?;
        Ok(created)
    }

    pub async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY id")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(task_from_row).collect()
    }

    pub async fn tasks_for_file(&self, file_id: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE file_id = ? ORDER BY id")
            .bind(file_id)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(task_from_row).collect()
    }

    /// Next queued tasks in FIFO order, skipping files that already have an
    /// in-flight task. This is the scheduler's only claim query.
    pub async fn next_queued_tasks(
        &self,
        exclude_file_ids: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<Task>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM tasks WHERE status = 'queued'");
        if !exclude_file_ids.is_empty() {
            qb.push(" AND file_id NOT IN (");
            let mut separated = qb.separated(", ");
            for id in exclude_file_ids {
                separated.push_bind(id);
            }
            qb.push(")");
        }
        qb.push(" ORDER BY id ASC LIMIT ");
        qb.push_bind(limit as i64);
        let rows = qb.build().fetch_all(self.pool()).await?;
        rows.iter().map(task_from_row).collect()
    }

    pub async fn set_task_processing(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = 'processing' WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_task_pid(&self, id: i64, pid: Option<u32>) -> Result<()> {
        sqlx::query("UPDATE tasks SET pid = ? WHERE id = ?")
            .bind(pid.map(|p| p as i64))
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_task_completed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = 'completed', pid = NULL WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_task_failed(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = 'failed', pid = NULL, error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Cascade a failure: every still-queued task for the file becomes
    /// unreachable. Processing and terminal rows are untouched.
    pub async fn mark_queued_as_unreachable(&self, file_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'unreachable' WHERE file_id = ? AND status = 'queued'",
        )
        .bind(file_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Crash recovery: re-enqueue whatever was mid-flight when the process
    /// died. Stale pids are cleared; the executor re-runs from scratch.
    pub async fn restore_processing_to_queued(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'queued', pid = NULL WHERE status = 'processing'",
        )
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_tasks_for_file(&self, file_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tasks WHERE file_id = ?")
            .bind(file_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
