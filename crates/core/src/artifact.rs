//! In-memory artifacts produced by the image model.
//!
//! An [`Artifact`] lives only for the duration of one step: the generator
//! creates it and the uploader consumes it. Dimensions are read from the
//! image header so a truncated or non-image response is caught before it
//! is pinned.

use std::io::Cursor;

use image::ImageFormat;

use crate::error::CoreError;
use crate::types::Timestamp;

/// MIME type of every artifact this agent produces.
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// A generated image ready for upload.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub generated_at: Timestamp,
}

impl Artifact {
    /// Wrap PNG bytes, validating the header and extracting dimensions.
    pub fn from_png(bytes: Vec<u8>, file_name: impl Into<String>) -> Result<Self, CoreError> {
        let reader = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| CoreError::InvalidImage(e.to_string()))?;

        if reader.format() != Some(ImageFormat::Png) {
            return Err(CoreError::InvalidImage(format!(
                "expected PNG data, detected {:?}",
                reader.format()
            )));
        }

        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| CoreError::InvalidImage(e.to_string()))?;

        Ok(Self {
            bytes,
            file_name: file_name.into(),
            width,
            height,
            generated_at: chrono::Utc::now(),
        })
    }

    /// Return the same artifact under a different file name.
    pub fn renamed(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn content_type(&self) -> &'static str {
        PNG_CONTENT_TYPE
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// File name used when pinning the artifact of a task.
pub fn artifact_file_name(task_id: &str) -> String {
    format!("{task_id}.png")
}
