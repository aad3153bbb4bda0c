use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;

use crate::errors::{CatMoodError, Result};

/// A user-selected image, sniffed but not yet decoded.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    bytes: Arc<[u8]>,
    format: ImageFormat,
}

impl UploadedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub const fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    /// Inline preview of the upload.
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type(),
            STANDARD.encode(&self.bytes)
        )
    }
}

/// Accepts raw upload bytes.
///
/// A declared MIME type outside `image/*` is refused up front. Otherwise the
/// format is sniffed from the content, so a mislabelled file still has to
/// carry a decodable image signature.
pub fn ingest(bytes: Vec<u8>, declared_mime: Option<&str>) -> Result<UploadedImage> {
    if let Some(mime) = declared_mime {
        if !mime.trim().to_ascii_lowercase().starts_with("image/") {
            return Err(CatMoodError::UnreadableImage {
                reason: format!("unsupported content type {mime:?}"),
            });
        }
    }

    if bytes.is_empty() {
        return Err(CatMoodError::UnreadableImage {
            reason: "file is empty".to_string(),
        });
    }

    let format = image::guess_format(&bytes).map_err(|e| CatMoodError::UnreadableImage {
        reason: e.to_string(),
    })?;
    if !format.reading_enabled() {
        return Err(CatMoodError::UnreadableImage {
            reason: format!("{format:?} decoding is not enabled in this build"),
        });
    }

    Ok(UploadedImage {
        bytes: bytes.into(),
        format,
    })
}

/// Reads an image file, declaring its MIME type from the extension.
pub fn ingest_file(path: &Path) -> Result<UploadedImage> {
    let bytes = std::fs::read(path).map_err(|e| CatMoodError::FileSystem {
        path: path.to_path_buf(),
        operation: "read image".to_string(),
        source: e,
    })?;
    let declared = ImageFormat::from_path(path).ok().map(|f| f.to_mime_type());
    ingest(bytes, declared)
}
