//! Uploaded file storage.
//!
//! Files land under `<upload_dir>/user_<id>/<uuid><ext>`; the database keeps
//! only the path relative to the upload root.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Extensions accepted for submission uploads.
const ALLOWED_EXTENSIONS: &[&str] = &[".pdf", ".docx", ".txt", ".ipynb"];

/// On-disk storage rooted at the configured upload directory.
#[derive(Clone)]
pub struct FileStorage {
    root: PathBuf,
}

/// Result of persisting one upload.
#[derive(Debug)]
pub struct SavedFile {
    /// Path relative to the upload root, as stored in the database.
    pub relative_path: String,
    /// MIME type derived from the extension.
    pub file_type: String,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create upload dir {}", root.display()))?;
        Ok(Self { root })
    }

    /// Lower-cased extension including the leading dot, or empty.
    fn extension(filename: &str) -> String {
        Path::new(filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }

    pub fn is_allowed(filename: &str) -> bool {
        let ext = Self::extension(filename);
        ALLOWED_EXTENSIONS.contains(&ext.as_str())
    }

    fn mime_for(extension: &str) -> &'static str {
        match extension {
            ".pdf" => "application/pdf",
            ".docx" => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ".txt" => "text/plain",
            ".ipynb" => "application/x-ipynb+json",
            _ => "application/octet-stream",
        }
    }

    /// Persist `data` for `user_id`, rejecting disallowed extensions before
    /// anything touches the disk.
    pub fn save(&self, user_id: &Uuid, original_filename: &str, data: &[u8]) -> Result<SavedFile> {
        let ext = Self::extension(original_filename);
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            anyhow::bail!("File type {} is not allowed", ext);
        }

        let user_dir = self.root.join(format!("user_{}", user_id));
        fs::create_dir_all(&user_dir)
            .with_context(|| format!("Failed to create {}", user_dir.display()))?;

        let unique_name = format!("{}{}", Uuid::new_v4(), ext);
        let path = user_dir.join(&unique_name);
        fs::write(&path, data).with_context(|| format!("Failed to write {}", path.display()))?;

        debug!(path = %path.display(), bytes = data.len(), "Stored upload");

        Ok(SavedFile {
            relative_path: format!("user_{}/{}", user_id, unique_name),
            file_type: Self::mime_for(&ext).to_string(),
        })
    }

    /// Absolute path for a stored relative path.
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    /// Remove a stored file. Missing files are not an error.
    pub fn delete(&self, relative_path: &str) -> bool {
        let path = self.resolve(relative_path);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(_) => false,
        }
    }

    /// Read a stored file back, e.g. to hand its text to the grader.
    pub fn read(&self, relative_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative_path);
        fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }
}
