use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::models::ImageUpload;

/// URL prefix under which stored images are served.
pub const PUBLIC_PREFIX: &str = "/uploads/";

// Keeps the generated name well under the usual 255-byte file name limit.
const MAX_NAME_LEN: usize = 100;
const MAX_EXTENSION_LEN: usize = 16;

/// Storage for uploaded recipe images.
///
/// Implementations hand back public paths (`/uploads/<name>`), never
/// filesystem paths; callers persist the public path on the recipe.
pub trait ImageStore {
    /// Store an upload under a fresh, collision-resistant name.
    ///
    /// Returns `Ok(None)` when the upload is empty.
    fn write(&self, upload: &ImageUpload) -> Result<Option<String>>;

    /// Remove the file behind `public_path`. Returns `false` if it was
    /// already gone.
    fn delete(&self, public_path: &str) -> Result<bool>;

    fn exists(&self, public_path: &str) -> bool;
}

/// Images stored as plain files in one directory.
pub struct FsImageStore {
    dir: PathBuf,
}

impl FsImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a public path back to a file inside the image directory.
    ///
    /// Anything outside the public prefix, or with separators or `..` in the
    /// file name, does not resolve.
    fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let name = public_path.strip_prefix(PUBLIC_PREFIX)?;
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return None;
        }
        Some(self.dir.join(name))
    }
}

impl ImageStore for FsImageStore {
    fn write(&self, upload: &ImageUpload) -> Result<Option<String>> {
        if upload.is_empty() {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create upload directory: {}", self.dir.display())
        })?;

        let file_name = unique_file_name(&upload.file_name);
        let path = self.dir.join(&file_name);
        std::fs::write(&path, &upload.bytes)
            .with_context(|| format!("Failed to write image: {}", path.display()))?;

        tracing::debug!(file = %path.display(), bytes = upload.bytes.len(), "stored image");
        Ok(Some(format!("{PUBLIC_PREFIX}{file_name}")))
    }

    fn delete(&self, public_path: &str) -> Result<bool> {
        let Some(path) = self.resolve(public_path) else {
            tracing::warn!(path = public_path, "ignoring delete of non-upload path");
            return Ok(false);
        };
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to delete image: {}", path.display()))
            }
        }
    }

    fn exists(&self, public_path: &str) -> bool {
        self.resolve(public_path).is_some_and(|p| p.is_file())
    }
}

/// `<unix-millis>_<8 hex chars>_<sanitized original name>`
fn unique_file_name(original: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{millis}_{}_{}", &suffix[..8], sanitize_file_name(original))
}

/// Keep only the last path component and a conservative character set.
fn sanitize_file_name(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        shorten_file_name(cleaned)
    }
}

/// Cut an over-long name down to `MAX_NAME_LEN` bytes, keeping a short extension.
fn shorten_file_name(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if name.len() - dot <= MAX_EXTENSION_LEN => name.split_at(dot),
        _ => (name, ""),
    };
    let budget = MAX_NAME_LEN - extension.len();
    let end = stem
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= budget)
        .last()
        .unwrap_or(0);
    format!("{}{extension}", &stem[..end])
}
