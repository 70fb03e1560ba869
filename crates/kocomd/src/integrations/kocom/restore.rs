//! Last-frame persistence.
//!
//! The file is a JSON object of device id to the hex of the last frame seen
//! for it. Replaying those frames at startup recreates entities before the
//! bus has said anything.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

pub type Records = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("Failed to access restore file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Malformed restore file {0}: {1}")]
    Json(PathBuf, #[source] serde_json::Error),
}

/// Load saved records. A missing file is an empty set.
pub fn load(path: &Path) -> Result<Records, RestoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No restore file at {}", path.display());
            return Ok(Records::new());
        }
        Err(e) => return Err(RestoreError::Io(path.to_path_buf(), e)),
    };
    serde_json::from_str(&contents).map_err(|e| RestoreError::Json(path.to_path_buf(), e))
}

/// Save records, replacing the file atomically.
pub fn save(path: &Path, records: &Records) -> Result<(), RestoreError> {
    let io_err = |e| RestoreError::Io(path.to_path_buf(), e);
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| RestoreError::Json(path.to_path_buf(), e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    debug!("Saved {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("packets.json");
        let records = Records::from([(
            "motion_0".to_string(),
            "aa5530dc0001006000040000000000000000710d0d".to_string(),
        )]);

        save(&path, &records).unwrap();
        assert_eq!(load(&path).unwrap(), records);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.json")).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packets.json");
        std::fs::write(&path, "[1, 2").unwrap();

        assert!(matches!(load(&path), Err(RestoreError::Json(..))));
    }
}
