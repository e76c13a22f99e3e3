use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DATA_URI_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";
const DEFAULT_MIME_TYPE: &str = "image/png";
const DEFAULT_EXTENSION: &str = "png";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to read image file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write image file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} is not a supported image file")]
    UnsupportedImageType { path: PathBuf },
    #[error("malformed data uri: {message}")]
    MalformedDataUri { message: String },
    #[error("inline image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// An image carried inline as mime type plus base64 payload.
///
/// Fields are private so an asset never changes after construction; a new
/// upload produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    mime_type: String,
    inline_data: String,
}

impl ImageAsset {
    pub fn from_inline(mime_type: impl Into<String>, inline_data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            inline_data: inline_data.into(),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn inline_data(&self) -> &str {
        &self.inline_data
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "{DATA_URI_SCHEME}{}{BASE64_MARKER},{}",
            self.mime_type, self.inline_data
        )
    }

    pub fn decode(&self) -> CodecResult<Vec<u8>> {
        Ok(BASE64.decode(self.inline_data.as_bytes())?)
    }
}

/// Encodes raw bytes without looking at them. Any blob is accepted.
pub fn encode(bytes: &[u8], declared_mime_type: &str) -> ImageAsset {
    ImageAsset::from_inline(declared_mime_type, BASE64.encode(bytes))
}

/// Returns the payload after the first comma of a data URI produced by
/// [`ImageAsset::to_data_uri`]. The input is trusted and not validated.
pub fn strip_envelope(data_uri: &str) -> &str {
    data_uri
        .split_once(',')
        .map_or(data_uri, |(_, payload)| payload)
}

/// Splits a `data:<mime>;base64,<payload>` URI back into an asset.
pub fn split_data_uri(data_uri: &str) -> CodecResult<ImageAsset> {
    let rest = data_uri
        .strip_prefix(DATA_URI_SCHEME)
        .ok_or_else(|| CodecError::MalformedDataUri {
            message: "missing data: scheme".to_string(),
        })?;
    let (header, _) = rest
        .split_once(',')
        .ok_or_else(|| CodecError::MalformedDataUri {
            message: "missing payload separator".to_string(),
        })?;
    let mime_type = header
        .strip_suffix(BASE64_MARKER)
        .ok_or_else(|| CodecError::MalformedDataUri {
            message: "payload is not base64 encoded".to_string(),
        })?;
    let mime_type = if mime_type.is_empty() {
        DEFAULT_MIME_TYPE
    } else {
        mime_type
    };

    Ok(ImageAsset::from_inline(mime_type, strip_envelope(data_uri)))
}

/// Reads a single image file fully into memory and encodes it.
///
/// The mime type comes from the file extension, falling back to the magic
/// bytes when the extension is unknown. Non-image files are rejected here,
/// before anything is encoded.
pub fn read_image_file(path: &Path) -> CodecResult<ImageAsset> {
    let bytes = fs::read(path).map_err(|source| CodecError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let format = ImageFormat::from_path(path)
        .ok()
        .or_else(|| image::guess_format(&bytes).ok())
        .ok_or_else(|| CodecError::UnsupportedImageType {
            path: path.to_path_buf(),
        })?;

    tracing::debug!(
        path = %path.display(),
        mime_type = format.to_mime_type(),
        size = bytes.len(),
        "read image file"
    );
    let data_uri = encode(&bytes, format.to_mime_type()).to_data_uri();
    split_data_uri(&data_uri)
}

pub fn write_image_file(asset: &ImageAsset, path: &Path) -> CodecResult<()> {
    let bytes = asset.decode()?;
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CodecError::WriteFile {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, bytes).map_err(|source| CodecError::WriteFile {
        path: path.to_path_buf(),
        source,
    })
}

pub fn suggested_extension(mime_type: &str) -> &'static str {
    ImageFormat::from_mime_type(mime_type)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or(DEFAULT_EXTENSION)
}
