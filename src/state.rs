// Durable seen-key state.
//
// Loaded once at run start, mutated in memory, written back as one atomic
// replace at run end. A key in this set is never re-dispatched.
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

pub type SeenKeys = BTreeSet<String>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    seen_keys: Vec<String>,
}

/// Load previously dispatched keys. A missing or unreadable state file is an
/// empty set, never a failure.
pub fn load_seen_keys(path: &Path) -> SeenKeys {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return SeenKeys::new(),
    };
    match serde_json::from_str::<StateFile>(&raw) {
        Ok(state) => state.seen_keys.into_iter().collect(),
        Err(e) => {
            warn!("state file {} is corrupt ({e}), starting from an empty set", path.display());
            SeenKeys::new()
        }
    }
}

/// Replace the state file with the given set in one atomic rename.
pub fn save_seen_keys(path: &Path, seen: &SeenKeys) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let state = StateFile {
        seen_keys: seen.iter().cloned().collect(),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, &state)?;
    tmp.write_all(b"\n")?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let seen: SeenKeys = ["INS42", "abc12345"].iter().map(|s| s.to_string()).collect();

        save_seen_keys(&path, &seen).unwrap();
        assert_eq!(load_seen_keys(&path), seen);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_seen_keys(&dir.path().join("nope.json")).is_empty());
    }

    #[test]
    fn corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_seen_keys(&path).is_empty());
    }

    #[test]
    fn save_replaces_rather_than_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let first: SeenKeys = ["a", "b"].iter().map(|s| s.to_string()).collect();
        save_seen_keys(&path, &first).unwrap();
        let second: SeenKeys = ["c"].iter().map(|s| s.to_string()).collect();
        save_seen_keys(&path, &second).unwrap();

        assert_eq!(load_seen_keys(&path), second);
    }
}
