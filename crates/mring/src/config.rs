//! Persistent ring configuration documents.
//!
//! A ring's out-of-band description, written as JSON so other processes
//! (and other languages) can discover the backing object and its shape
//! without mapping anything. Stored at
//! `<base>/<project_name>/<name>_config.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mring_core::{RingError, RingResult};

/// On-disk description of one ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingConfig {
    pub project_name: String,
    pub name: String,
    /// Name another process opens: shm name, section name, or
    /// `/proc/<pid>/fd/<n>` for memfd.
    pub shm_path: String,
    pub num_connections: u32,
    pub library_version: String,
    /// Total backing object size in bytes, header and both buffer regions
    /// included.
    pub shm_size: u64,
    pub element_size: u64,
    pub element_type: String,
}

impl RingConfig {
    /// Path of the config document under `base`.
    pub fn path(base: &Path, project_name: &str, name: &str) -> PathBuf {
        base.join(project_name).join(format!("{name}_config.json"))
    }

    /// Writes the document, creating the project directory if needed.
    pub fn save(&self, base: &Path) -> RingResult<()> {
        let path = Self::path(base, &self.project_name, &self.name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RingError::Config(e.to_string()))?;
        fs::write(&path, json)?;
        Ok(())
    }

    /// Reads a document back.
    pub fn load(base: &Path, project_name: &str, name: &str) -> RingResult<Self> {
        let path = Self::path(base, project_name, name);
        let json = fs::read_to_string(&path)?;
        serde_json::from_str(&json).map_err(|e| RingError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn test_base() -> PathBuf {
        let dir = env::temp_dir().join(format!("mring-config-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample() -> RingConfig {
        RingConfig {
            project_name: "demo".to_string(),
            name: "samples".to_string(),
            shm_path: "/demo-samples".to_string(),
            num_connections: 1,
            library_version: env!("CARGO_PKG_VERSION").to_string(),
            shm_size: 12288,
            element_size: 4,
            element_type: "u32".to_string(),
        }
    }

    #[test]
    fn test_round_trip() {
        let base = test_base();
        let config = sample();
        config.save(&base).unwrap();

        let loaded = RingConfig::load(&base, "demo", "samples").unwrap();
        assert_eq!(loaded, config);

        let path = RingConfig::path(&base, "demo", "samples");
        assert!(path.ends_with("demo/samples_config.json"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_missing() {
        let base = test_base();
        assert!(matches!(
            RingConfig::load(&base, "demo", "absent"),
            Err(RingError::Io(_))
        ));
    }
}
