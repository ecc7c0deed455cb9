//! Local file selection and preview rendering.
//!
//! A `SelectedFile` holds the raw bytes of an image picked by the user. Previews are
//! data URIs built from those bytes after the image has been decoded successfully.

use crate::error::PreviewError;
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Upload panel a file is selected through; each accepts a different set of types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    /// Captioning flow: JPEG only.
    Caption,
    /// Direct-upload panel of the generation flow: any image type.
    Generation,
}

impl Panel {
    pub fn accepts(self, mime: &str) -> bool {
        let mime = mime.trim().to_ascii_lowercase();
        match self {
            Panel::Caption => mime == "image/jpeg" || mime == "image/jpg",
            Panel::Generation => mime.starts_with("image/"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub path: Option<PathBuf>,
    pub mime: String,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn from_bytes(name: impl Into<String>, mime: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            path: None,
            mime: mime.into(),
            bytes,
        }
    }

    /// Read a file from disk, deriving its MIME type from the extension.
    pub async fn open(path: &Path) -> Result<Self, PreviewError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PreviewError(format!("{}: {e}", path.display())))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            path: Some(path.to_path_buf()),
            mime: mime_from_extension(path).to_string(),
            bytes: Bytes::from(bytes),
        })
    }
}

pub fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// File extension for a MIME type, used when saving generated images.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime.split(';').next().unwrap_or("").trim() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        _ => "img",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewImage {
    pub data_uri: String,
    pub mime: String,
    pub width: u32,
    pub height: u32,
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{encoded}")
}

/// Decode the file to make sure it is a readable image, then encode it as a data URI.
///
/// Decoding is CPU-bound; callers run this on the blocking pool.
pub fn render_preview(file: &SelectedFile) -> Result<PreviewImage, PreviewError> {
    let decoded = image::load_from_memory(&file.bytes)
        .map_err(|e| PreviewError(format!("{}: {e}", file.name)))?;
    Ok(PreviewImage {
        data_uri: data_uri(&file.mime, &file.bytes),
        mime: file.mime.clone(),
        width: decoded.width(),
        height: decoded.height(),
    })
}

#[cfg(test)]
pub(crate) fn jpeg_fixture(width: u32, height: u32) -> Bytes {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .expect("encode jpeg fixture");
    Bytes::from(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_panel_accepts_only_jpeg() {
        assert!(Panel::Caption.accepts("image/jpeg"));
        assert!(Panel::Caption.accepts("image/jpg"));
        assert!(!Panel::Caption.accepts("image/png"));
        assert!(Panel::Generation.accepts("image/png"));
        assert!(!Panel::Generation.accepts("application/pdf"));
    }

    #[test]
    fn mime_is_derived_from_extension() {
        assert_eq!(mime_from_extension(Path::new("dog.JPG")), "image/jpeg");
        assert_eq!(mime_from_extension(Path::new("dog.webp")), "image/webp");
        assert_eq!(
            mime_from_extension(Path::new("notes")),
            "application/octet-stream"
        );
    }

    #[test]
    fn preview_of_valid_jpeg_has_dimensions() {
        let file = SelectedFile::from_bytes("dog.jpg", "image/jpeg", jpeg_fixture(4, 3));
        let preview = render_preview(&file).unwrap();
        assert_eq!((preview.width, preview.height), (4, 3));
        assert!(preview.data_uri.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn preview_of_corrupt_bytes_fails() {
        let file = SelectedFile::from_bytes(
            "broken.jpg",
            "image/jpeg",
            Bytes::from_static(b"not an image"),
        );
        let err = render_preview(&file).unwrap_err();
        assert!(err.0.starts_with("broken.jpg"));
    }

    #[tokio::test]
    async fn opening_a_missing_file_is_a_preview_error() {
        let err = SelectedFile::open(Path::new("/definitely/not/here.jpg"))
            .await
            .unwrap_err();
        assert!(err.0.contains("here.jpg"));
    }
}
