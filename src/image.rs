use std::path::Path;

use base64::Engine as _;
use url::Url;

use crate::fetch::FetchedImage;

pub fn is_inline_src(src: &str) -> bool {
    src.trim_start()
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Encodes fetched image bytes as a `data:` URI.
pub fn encode_data_uri(image: &FetchedImage, url: &Url) -> anyhow::Result<String> {
    if image.bytes.is_empty() {
        anyhow::bail!("image body is empty: {url}");
    }

    let mime = image
        .content_type
        .as_deref()
        .and_then(image_mime_from_content_type)
        .unwrap_or_else(|| mime_for_path(url.path()).to_owned());
    let payload = base64::engine::general_purpose::STANDARD.encode(&image.bytes);

    Ok(format!("data:{mime};base64,{payload}"))
}

fn image_mime_from_content_type(content_type: &str) -> Option<String> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("image/").then_some(mime)
}

fn mime_for_path(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}
