use ferry_channels::Attachment;

/// Extensions accepted when the content type does not settle the question.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tiff"];

/// Whether an attachment is re-uploaded to sinks.
///
/// Static raster images only. GIFs are refused whether the content type or
/// the filename says so. An `image/*` content type is accepted; anything
/// else falls back to the filename extension.
#[must_use]
pub fn eligible(attachment: &Attachment) -> bool {
    let filename = attachment.filename.to_ascii_lowercase();
    let extension = filename.rsplit_once('.').map(|(_, ext)| ext);
    if extension == Some("gif") {
        return false;
    }

    match attachment.content_type.as_deref().map(essence) {
        Some(ct) if ct == "image/gif" => false,
        Some(ct) if ct.starts_with("image/") => true,
        _ => extension.is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext)),
    }
}

/// `"Image/PNG; charset=binary"` → `"image/png"`.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
