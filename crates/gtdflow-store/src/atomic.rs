//! Crash-safe file replacement.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use gtdflow_core::Result;

/// Replace `path` with `data` via a sibling temp file and rename.
///
/// Readers see either the old or the new contents, never a partial write.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    debug!(path = %path.display(), size = data.len(), "atomic write");

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "create_dir_all failed");
                e
            })?;
        }
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut file = fs::File::create(&temp_path).await.map_err(|e| {
        warn!(temp_path = %temp_path.display(), error = %e, "File::create failed");
        e
    })?;
    file.write_all(data).await.map_err(|e| {
        warn!(error = %e, "write_all failed");
        e
    })?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, path).await.map_err(|e| {
        warn!(from = %temp_path.display(), to = %path.display(), error = %e, "rename failed");
        e
    })?;

    Ok(())
}
