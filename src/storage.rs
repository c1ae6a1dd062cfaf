// SPDX-License-Identifier: GPL-3.0-only

//! Capture destination writers
//!
//! Still images arrive as the raw bytes the camera produced. Writers persist
//! them without re-encoding.

use crate::constants::file_formats;
use crate::errors::StorageError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Persists captured stills
pub trait CaptureWriter: Send {
    /// Write one still; returns where it landed
    fn save(&mut self, id: u32, data: &[u8], file_name: &str) -> Result<PathBuf, StorageError>;
}

/// Writes stills into a directory, creating it on first use
#[derive(Debug, Clone)]
pub struct FileWriter {
    dir: PathBuf,
}

impl FileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl CaptureWriter for FileWriter {
    fn save(&mut self, id: u32, data: &[u8], file_name: &str) -> Result<PathBuf, StorageError> {
        let bare = Path::new(file_name)
            .file_name()
            .is_some_and(|name| name == file_name);
        if !bare {
            return Err(StorageError::InvalidFileName(file_name.to_string()));
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            StorageError::DirectoryUnavailable(format!("{}: {}", self.dir.display(), e))
        })?;

        let path = self.dir.join(file_name);
        std::fs::write(&path, data)?;

        info!(request_id = id, path = %path.display(), size = data.len(), "Image saved");
        Ok(path)
    }
}

/// Timestamped name for a capture that was not given one
///
/// Format: `IMG_YYYYMMDD_HHMMSS_<id>.jpg`
pub fn default_file_name(id: u32) -> String {
    let timestamp = chrono::Local::now().format(file_formats::TIMESTAMP_FORMAT);
    let name = format!(
        "{}_{}_{}.{}",
        file_formats::PHOTO_PREFIX,
        timestamp,
        id,
        file_formats::DEFAULT_EXTENSION
    );
    debug!(request_id = id, file_name = %name, "Generated file name");
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tethercam-storage-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = temp_dir();
        let mut writer = FileWriter::new(&dir);

        let path = writer.save(1, b"jpeg bytes", "shot.jpg").unwrap();

        assert_eq!(path, dir.join("shot.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg bytes");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rejects_paths() {
        let mut writer = FileWriter::new(temp_dir());

        for name in ["", "../escape.jpg", "nested/shot.jpg"] {
            assert!(matches!(
                writer.save(1, b"x", name),
                Err(StorageError::InvalidFileName(_))
            ));
        }
    }

    #[test]
    fn test_default_file_name_format() {
        let name = default_file_name(42);

        assert!(name.starts_with("IMG_"));
        assert!(name.ends_with("_42.jpg"));
        // IMG_ + YYYYMMDD_HHMMSS + _42.jpg
        assert_eq!(name.len(), "IMG_".len() + 15 + "_42.jpg".len());
    }
}
