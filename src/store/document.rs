use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// A typed JSON document on disk.
///
/// Loading never fails: a missing file yields `T::default()` and a corrupt one
/// is logged and replaced by the default on the next save. Saving writes a
/// temp file in the same directory and renames it over the target, so a crash
/// mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct JsonDocument<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_default(&self) -> T {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(err) => {
                log_warn!("Failed to read {}: {err}; using defaults", self.path.display());
                return T::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(err) => {
                log_warn!("Corrupt document {}: {err}; using defaults", self.path.display());
                T::default()
            }
        }
    }

    pub fn save(&self, value: &T) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;

        let serialized = serde_json::to_string_pretty(value)?;

        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        tmp.write_all(serialized.as_bytes())
            .context("failed to write temp document")?;
        tmp.as_file()
            .sync_all()
            .context("failed to flush temp document")?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let doc: JsonDocument<Counter> = JsonDocument::new(dir.path().join("absent.json"));
        assert_eq!(doc.load_or_default(), Counter::default());
    }

    #[test]
    fn corrupt_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let doc: JsonDocument<Counter> = JsonDocument::new(&path);
        assert_eq!(doc.load_or_default(), Counter::default());
    }

    #[test]
    fn save_replaces_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let doc: JsonDocument<Counter> = JsonDocument::new(dir.path().join("nested/counter.json"));

        doc.save(&Counter { value: 1 }).unwrap();
        doc.save(&Counter { value: 2 }).unwrap();

        assert_eq!(doc.load_or_default(), Counter { value: 2 });
        let entries: Vec<_> = fs::read_dir(dir.path().join("nested")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
