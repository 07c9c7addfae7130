//! Path helpers and atomic writes.

use anyhow::{anyhow, bail, Result};
use std::path::{Path, PathBuf};

/// `<data dir>/aos-replica`, falling back to `~/.aos-replica`, then `./.aos-replica`.
pub fn default_cache_root() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("aos-replica");
    }
    dirs::home_dir()
        .map(|home| home.join(".aos-replica"))
        .unwrap_or_else(|| PathBuf::from(".aos-replica"))
}

/// Reject ids that could escape their directory.
///
/// Transaction and process ids are base64url strings; anything outside
/// `[A-Za-z0-9_-]` is refused.
pub fn validate_id(id: &str) -> Result<&str> {
    if id.is_empty() {
        bail!("empty id");
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        bail!("invalid characters in id {id:?}");
    }
    Ok(id)
}

pub fn checkpoint_blob_path(cache_root: &Path, tx_id: &str) -> Result<PathBuf> {
    Ok(cache_root
        .join("checkpoints")
        .join(format!("{}.bin", validate_id(tx_id)?)))
}

pub fn checkpoint_meta_path(cache_root: &Path, tx_id: &str) -> Result<PathBuf> {
    Ok(cache_root
        .join("checkpoints")
        .join(format!("{}.meta.json", validate_id(tx_id)?)))
}

pub fn process_state_path(cache_root: &Path, process_id: &str) -> Result<PathBuf> {
    Ok(cache_root
        .join("processes")
        .join(format!("{}.bin", validate_id(process_id)?)))
}

pub fn live_state_path(cache_root: &Path, process_id: &str) -> Result<PathBuf> {
    Ok(cache_root
        .join("live")
        .join(format!("{}.bin", validate_id(process_id)?)))
}

pub fn live_meta_path(cache_root: &Path, process_id: &str) -> Result<PathBuf> {
    Ok(cache_root
        .join("live")
        .join(format!("{}.meta.json", validate_id(process_id)?)))
}

pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
    }
    Ok(())
}

/// Write to a sibling `.tmp` file, then rename over the target.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, contents)
        .map_err(|e| anyhow!("Failed to write temp file {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        anyhow!(
            "Failed to rename {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })
}

pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| anyhow!("Failed to serialize JSON: {}", e))?;
    atomic_write(path, &json)
}

/// Read a file, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow!("Failed to read {}: {}", path.display(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_id_rejects_traversal() {
        assert!(validate_id("abc_DEF-123").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../etc").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("a.b").is_err());
    }

    #[test]
    fn test_layout() -> Result<()> {
        let root = Path::new("/cache");
        assert_eq!(
            checkpoint_blob_path(root, "tx1")?,
            PathBuf::from("/cache/checkpoints/tx1.bin")
        );
        assert_eq!(
            process_state_path(root, "p1")?,
            PathBuf::from("/cache/processes/p1.bin")
        );
        assert_eq!(
            live_meta_path(root, "p1")?,
            PathBuf::from("/cache/live/p1.meta.json")
        );
        Ok(())
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("blob.bin");
        atomic_write(&path, b"hello")?;
        assert_eq!(std::fs::read(&path)?, b"hello");
        assert!(!dir.path().join("nested").join("blob.bin.tmp").exists());
        assert_eq!(read_optional(&dir.path().join("missing"))?, None);
        Ok(())
    }
}
