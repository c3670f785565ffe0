// SPDX-License-Identifier: GPL-3.0-only

//! Persistence of the keyboard calibration
//!
//! The transform is stored as JSON, row-major:
//!
//! ```json
//! { "transform": [[100.0, 0.0, 0.0, 0.0], ...] }
//! ```
//!
//! Writes go to a temporary file next to the target and are renamed into
//! place, so a crash never leaves a half-written file behind.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::PersistenceError;
use crate::pipelines::calibration::Calibration;

#[derive(Debug, Serialize, Deserialize)]
struct TransformFile {
    transform: [[f64; 4]; 4],
}

/// Reads and writes the calibration file
#[derive(Debug, Clone)]
pub struct TransformStore {
    path: PathBuf,
}

impl TransformStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored calibration
    ///
    /// A file that parses but holds a singular matrix is reported as
    /// [`PersistenceError::Corrupt`].
    pub fn load(&self) -> Result<Calibration, PersistenceError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            PersistenceError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let file: TransformFile = serde_json::from_str(&content)?;

        Calibration::from_rows(&file.transform).map_err(|e| {
            PersistenceError::Corrupt(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Stored calibration, or the placeholder if there is none usable
    pub fn load_or_default(&self) -> Calibration {
        match self.load() {
            Ok(calibration) => {
                info!(path = %self.path.display(), "Loaded keyboard transform");
                calibration
            }
            Err(PersistenceError::Unavailable(msg)) => {
                info!("No saved keyboard transform ({}), using default", msg);
                Calibration::placeholder()
            }
            Err(e) => {
                warn!("{}; using default transform", e);
                Calibration::placeholder()
            }
        }
    }

    /// Write `calibration` atomically
    pub fn save(&self, calibration: &Calibration) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&TransformFile {
            transform: calibration.rows(),
        })?;

        let tmp_path = self.temp_path();
        std::fs::write(&tmp_path, json)?;
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), "Saved keyboard transform");
        Ok(())
    }

    /// Remove the stored calibration; a missing file is not an error
    pub fn clear(&self) -> Result<(), PersistenceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn temp_store() -> TransformStore {
        let dir = std::env::temp_dir().join(format!("kb-store-{}", uuid::Uuid::new_v4()));
        TransformStore::new(dir.join("keyboard_transform.json"))
    }

    fn cleanup(store: &TransformStore) {
        if let Some(dir) = store.path().parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_save_then_load() {
        let store = temp_store();
        let calibration = Calibration::from_points(
            &Point3::new(-20.0, 3.0, 40.0),
            &Point3::new(25.0, 2.0, 44.0),
            &Point3::new(-20.0, 8.0, 41.0),
        )
        .unwrap();

        store.save(&calibration).unwrap();
        let loaded = store.load().unwrap();
        cleanup(&store);

        assert_eq!(loaded.rows(), calibration.rows());
    }

    #[test]
    fn test_file_is_row_major_json() {
        let store = temp_store();
        store.save(&Calibration::placeholder()).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        cleanup(&store);

        assert_eq!(value["transform"][0][0], 100.0);
        assert_eq!(value["transform"][3][3], 1.0);
        assert_eq!(value["transform"][0][3], 0.0);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let store = temp_store();
        assert!(matches!(store.load(), Err(PersistenceError::Unavailable(_))));
        assert_eq!(store.load_or_default(), Calibration::placeholder());
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let store = temp_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();

        assert!(matches!(store.load(), Err(PersistenceError::Corrupt(_))));
        assert_eq!(store.load_or_default(), Calibration::placeholder());
        cleanup(&store);
    }

    #[test]
    fn test_singular_file_falls_back() {
        let store = temp_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), r#"{"transform": [[0,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,1]]}"#)
            .unwrap();

        assert!(matches!(store.load(), Err(PersistenceError::Corrupt(_))));
        assert_eq!(store.load_or_default(), Calibration::placeholder());
        cleanup(&store);
    }

    #[test]
    fn test_clear_removes_file() {
        let store = temp_store();
        store.save(&Calibration::identity()).unwrap();
        assert!(store.path().exists());

        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
        cleanup(&store);
    }
}
