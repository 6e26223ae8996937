//! Thumbnail download: first reachable locator wins, re-encoded by extension.

use super::OutputError;
use crate::scraper::PoliteClient;
use image::DynamicImage;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use tracing::{debug, warn};

const DEFAULT_EXTENSION: &str = "png";

/// File extension for a response Content-Type. `image/jpeg` and friends map to `jpg`; anything
/// unknown or missing falls back to `png`.
pub fn extension_for_content_type(content_type: Option<&str>) -> &'static str {
    let mime = content_type
        .and_then(|c| c.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase());
    match mime.as_deref() {
        Some("image/jpeg" | "image/jpg" | "image/pjpeg") => "jpg",
        Some("image/png") => "png",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        Some("image/bmp" | "image/x-ms-bmp") => "bmp",
        Some("image/tiff") => "tiff",
        _ => DEFAULT_EXTENSION,
    }
}

/// Try each locator in order and save the first that downloads and decodes as
/// `<dir>/<base_name>.<ext>`. Unreachable or undecodable locators are skipped with a warning.
/// Returns the saved file name, or None if no locator worked.
pub fn download_thumbnail(
    client: &mut PoliteClient,
    locators: &[String],
    dir: &Path,
    base_name: &str,
) -> Result<Option<String>, OutputError> {
    for url in locators {
        let Some((ext, image)) = fetch_image(client, url) else {
            continue;
        };
        let file_name = format!("{}.{}", base_name, ext);
        let path = dir.join(&file_name);
        save(image, ext, &path)?;
        debug!(url = %url, path = %path.display(), "saved thumbnail");
        return Ok(Some(file_name));
    }
    Ok(None)
}

fn fetch_image(client: &mut PoliteClient, url: &str) -> Option<(&'static str, DynamicImage)> {
    let response = match client.get_with_retry(url) {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            warn!(url, status = r.status().as_u16(), "thumbnail not available");
            return None;
        }
        Err(e) => {
            warn!(url, error = %e, "thumbnail download failed");
            return None;
        }
    };
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let ext = extension_for_content_type(content_type.as_deref());
    let bytes = match response.bytes() {
        Ok(b) => b,
        Err(e) => {
            warn!(url, error = %e, "thumbnail body could not be read");
            return None;
        }
    };
    match image::load_from_memory(&bytes) {
        Ok(image) => Some((ext, image)),
        Err(e) => {
            warn!(url, error = %e, "thumbnail is not a readable image");
            None
        }
    }
}

fn save(image: DynamicImage, ext: &str, path: &Path) -> Result<(), OutputError> {
    // JPEG has no alpha channel.
    let image = if ext == "jpg" {
        DynamicImage::ImageRgb8(image.to_rgb8())
    } else {
        image
    };
    image.save(path).map_err(|source| OutputError::Image {
        path: path.to_path_buf(),
        source,
    })
}
