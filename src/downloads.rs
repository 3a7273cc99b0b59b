use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

/// Writes a downloaded blob into `dir` under the last component of `name`.
/// The data lands in a temp file first and is renamed into place.
pub async fn save_download(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let file_name = Path::new(name)
        .file_name()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .ok_or_else(|| anyhow!("Refusing to save download with unsafe name {:?}", name))?;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let target = dir.join(file_name);
    let temp_path = dir.join(format!(".{}.part", file_name));

    if let Err(e) = tokio::fs::write(&temp_path, data).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e).with_context(|| format!("writing {}", temp_path.display()));
    }
    if let Err(e) = tokio::fs::rename(&temp_path, &target).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e).with_context(|| format!("moving download into {}", target.display()));
    }

    Ok(target)
}
