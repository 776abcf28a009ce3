//! Local naming of downloaded images.

use mparchive_shared::ASSET_DIR_SUFFIX;

/// Extensions kept as-is; anything else is saved as `jpg`.
const KNOWN_EXTENSIONS: &[&str] = &["jpg", "png", "gif", "webp", "bmp", "svg", "ico", "avif", "tiff"];

const FALLBACK_EXTENSION: &str = "jpg";

/// File extension for an image's `data-type` attribute.
pub fn image_extension(data_type: Option<&str>) -> &'static str {
    let lowered = data_type.unwrap_or_default().trim().to_ascii_lowercase();
    let bare = lowered.strip_prefix("image/").unwrap_or(lowered.as_str());
    let normalized = match bare {
        "jpeg" | "jpe" => "jpg",
        "svg+xml" => "svg",
        other => other,
    };
    KNOWN_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| *ext == normalized)
        .unwrap_or(FALLBACK_EXTENSION)
}

/// `{index}_{timestamp}.{ext}`
pub fn image_file_name(index: usize, timestamp: i64, ext: &str) -> String {
    format!("{index}_{timestamp}.{ext}")
}

/// Reference written into the HTML: `./{stem}_files/{file}`.
pub fn local_reference(stem: &str, file_name: &str) -> String {
    format!("./{stem}{ASSET_DIR_SUFFIX}/{file_name}")
}
