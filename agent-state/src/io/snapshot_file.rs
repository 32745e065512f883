//! Reading agent documents mirrored to disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

/// Read a whole-document snapshot from a JSON file.
///
/// An empty file reads as `null` (an agent may truncate before rewriting).
pub fn read_snapshot_file(path: &Path) -> Result<Value> {
    debug!(path = %path.display(), "reading snapshot file");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&contents).with_context(|| format!("parse snapshot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_json_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        fs::write(&path, r#"{"interrupted": true}"#).expect("write");
        let value = read_snapshot_file(&path).expect("read");
        assert_eq!(value["interrupted"], true);
    }

    #[test]
    fn empty_file_is_null() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        fs::write(&path, "\n").expect("write");
        assert_eq!(read_snapshot_file(&path).expect("read"), Value::Null);
    }

    #[test]
    fn invalid_json_names_the_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        fs::write(&path, "{ nope").expect("write");
        let err = read_snapshot_file(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("state.json"));
    }
}
