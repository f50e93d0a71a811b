use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::WorkStore;
use crate::ffpipe_core::domain::{MediaFile, MediaMetadata};
use crate::ffpipe_core::error::Result;

fn file_from_row(row: &SqliteRow) -> Result<MediaFile> {
    let metadata: Option<String> = row.try_get("metadata")?;
    let metadata = match metadata {
        Some(raw) => Some(serde_json::from_str::<MediaMetadata>(&raw)?),
        None => None,
    };
    Ok(MediaFile {
        id: row.try_get("id")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        mime_type: row.try_get("mime_type")?,
        metadata,
    })
}

impl WorkStore {
    pub async fn insert_file(&self, file: &MediaFile) -> Result<()> {
        let metadata = file
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        // OR REPLACE keeps crash-recovery re-runs idempotent: an append
        // commit that landed right before a crash simply lands again.
        sqlx::query(
            "INSERT OR REPLACE INTO files (id, file_name, file_path, mime_type, metadata) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&file.id)
        .bind(&file.file_name)
        .bind(&file.file_path)
        .bind(&file.mime_type)
        .bind(metadata)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_file(&self, id: &str) -> Result<Option<MediaFile>> {
        let row = sqlx::query("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(file_from_row).transpose()
    }

    pub async fn list_files(&self) -> Result<Vec<MediaFile>> {
        let rows = sqlx::query("SELECT * FROM files ORDER BY id")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(file_from_row).collect()
    }

    /// Rewrite a file's identity after a completed replace-mode operation.
    /// Mime and metadata are optional because output probing is advisory:
    /// when it fails the name and path still move to the new object.
    pub async fn swap_file_identity(
        &self,
        id: &str,
        file_name: &str,
        file_path: &str,
        probed: Option<(&str, &MediaMetadata)>,
    ) -> Result<()> {
        match probed {
            Some((mime_type, metadata)) => {
                let metadata = serde_json::to_string(metadata)?;
                sqlx::query(
                    "UPDATE files SET file_name = ?, file_path = ?, mime_type = ?, metadata = ? \
                     WHERE id = ?",
                )
                .bind(file_name)
                .bind(file_path)
                .bind(mime_type)
                .bind(metadata)
                .bind(id)
                .execute(self.pool())
                .await?;
            }
            None => {
                sqlx::query("UPDATE files SET file_name = ?, file_path = ? WHERE id = ?")
                    .bind(file_name)
                    .bind(file_path)
                    .bind(id)
                    .execute(self.pool())
                    .await?;
            }
        }
        Ok(())
    }

    /// Refresh the last observed mime/metadata without touching name or path.
    pub async fn update_file_metadata(
        &self,
        id: &str,
        mime_type: &str,
        metadata: &MediaMetadata,
    ) -> Result<()> {
        let metadata = serde_json::to_string(metadata)?;
        sqlx::query("UPDATE files SET mime_type = ?, metadata = ? WHERE id = ?")
            .bind(mime_type)
            .bind(metadata)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn delete_file(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
