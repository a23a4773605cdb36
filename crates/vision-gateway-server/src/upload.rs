use std::path::Path;
use vision_common::{Result, VisionError};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
];

/// Size and type guard applied before any quota is consumed.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadPolicy {
    /// Returns the media type for an accepted file name.
    pub fn media_type(&self, file_name: &str) -> Result<&'static str> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        ALLOWED_TYPES
            .iter()
            .find(|(allowed, _)| *allowed == ext)
            .map(|(_, media_type)| *media_type)
            .ok_or_else(|| {
                VisionError::InvalidUpload(
                    "Invalid file type. Allowed: .jpg, .jpeg, .png, .webp".to_string(),
                )
            })
    }

    pub fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_bytes {
            return Err(VisionError::PayloadTooLarge {
                max_bytes: self.max_bytes,
            });
        }
        if len == 0 {
            return Err(VisionError::InvalidUpload("Uploaded file is empty".to_string()));
        }
        Ok(())
    }
}
