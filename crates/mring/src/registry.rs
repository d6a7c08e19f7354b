//! Ring name registry with an on-disk manifest.
//!
//! Tracks ring name → backing path pairs and mirrors them into a
//! `name=path` manifest file, so sibling processes can discover what a
//! producer has published without a side channel. The manifest is removed
//! when the registry is dropped.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use mring_core::{RingError, RingResult};

pub struct RingRegistry {
    manifest_path: PathBuf,
    entries: HashMap<String, String>,
}

impl std::fmt::Debug for RingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingRegistry")
            .field("manifest_path", &self.manifest_path)
            .field("entry_count", &self.entries.len())
            .finish()
    }
}

impl RingRegistry {
    /// Creates an empty registry writing to `manifest_path`.
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            entries: HashMap::new(),
        }
    }

    /// Reads a manifest written by another registry (usually in another
    /// process). Lines that are not `name=path` are skipped.
    pub fn load(manifest_path: impl Into<PathBuf>) -> RingResult<Self> {
        let manifest_path = manifest_path.into();
        let text = fs::read_to_string(&manifest_path)?;
        let mut entries = HashMap::new();
        for line in text.lines() {
            if let Some((name, path)) = line.split_once('=') {
                entries.insert(name.to_string(), path.to_string());
            }
        }
        Ok(Self {
            manifest_path,
            entries,
        })
    }

    /// Registers a ring under `name` and rewrites the manifest.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        backing_path: impl Into<String>,
    ) -> RingResult<()> {
        self.entries.insert(name.into(), backing_path.into());
        self.write_manifest()
    }

    /// Removes a ring and rewrites the manifest.
    pub fn deregister(&mut self, name: &str) -> RingResult<()> {
        if self.entries.remove(name).is_none() {
            return Err(RingError::DoesNotExist(name.to_string()));
        }
        self.write_manifest()
    }

    /// Backing path registered under `name`, if any.
    pub fn backing_path(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// All registered ring names.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Path of the manifest file.
    pub fn path(&self) -> &Path {
        &self.manifest_path
    }

    fn write_manifest(&self) -> RingResult<()> {
        let mut out = String::new();
        for (name, path) in &self.entries {
            out.push_str(name);
            out.push('=');
            out.push_str(path);
            out.push('\n');
        }
        fs::write(&self.manifest_path, out)?;
        Ok(())
    }
}

impl Drop for RingRegistry {
    fn drop(&mut self) {
        if self.manifest_path.exists()
            && let Err(e) = fs::remove_file(&self.manifest_path)
        {
            eprintln!(
                "Warning: Failed to remove manifest file {:?}: {}",
                self.manifest_path, e
            );
        }
    }
}
