use std::path::Path;

use crate::ffpipe_core::config::Config;
use crate::ffpipe_core::error::Result;

/// Wipe and recreate the scratch directories. Runs before queue restoration
/// so residue from a crashed run never collides with re-executed tasks.
pub(crate) async fn reset(config: &Config) -> Result<()> {
    recreate(&config.temp_dir).await?;
    recreate(&config.meta_dir).await?;
    Ok(())
}

async fn recreate(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}
