//! Post-generation processing.
//!
//! Turns whatever the generation endpoint returned into a displayable `ImageRef`.

use crate::engine::GeneratedImage;
use crate::error::RequestError;
use crate::model::{ImageOutput, ImageRef};
use crate::preview::{data_uri, extension_for_mime};
use std::path::{Path, PathBuf};

/// Resolve a generated image into a reference the presentation layer can show.
pub(crate) async fn materialize(
    image: GeneratedImage,
    output: &ImageOutput,
) -> Result<ImageRef, RequestError> {
    match (image, output) {
        (GeneratedImage::Url(url), _) => Ok(ImageRef::Url(url)),
        (GeneratedImage::Bytes { mime, data }, ImageOutput::Inline) => {
            Ok(ImageRef::DataUri(data_uri(&mime, &data)))
        }
        (GeneratedImage::Bytes { mime, data }, ImageOutput::Directory(dir)) => {
            let path = save_generated(dir, &mime, &data)
                .await
                .map_err(|e| RequestError::Save(format!("{}: {e}", dir.display())))?;
            tracing::info!(path = %path.display(), bytes = data.len(), "saved generated image");
            Ok(ImageRef::File(path))
        }
    }
}

async fn save_generated(dir: &Path, mime: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(generated_file_name(
        time::OffsetDateTime::now_utc(),
        extension_for_mime(mime),
    ));
    tokio::fs::write(&path, data).await?;
    Ok(path)
}

fn generated_file_name(now: time::OffsetDateTime, ext: &str) -> String {
    let fmt = time::macros::format_description!(
        "[year][month][day]-[hour][minute][second]-[subsecond digits:3]"
    );
    let stamp = now.format(fmt).unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("generated-{stamp}.{ext}")
}
