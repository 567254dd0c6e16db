use std::path::Path;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_MIMES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// Check extension, declared MIME type and file-signature bytes and return
/// the canonical extension to store the file under.
pub fn validate_image(
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> AppResult<&'static str> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::BadRequest(
            "Image exceeds the 5MB size limit".into(),
        ));
    }

    if let Some(mime) = content_type {
        if !ALLOWED_MIMES.contains(&mime) {
            return Err(AppError::BadRequest(
                "Invalid file type. Only JPEG, PNG, GIF, and WebP images are allowed.".into(),
            ));
        }
    }

    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let ext_ok = matches!(
        ext.as_deref(),
        Some("jpg" | "jpeg" | "png" | "gif" | "webp")
    );
    if !ext_ok {
        return Err(AppError::BadRequest(
            "Invalid file extension. Only JPEG, PNG, GIF, and WebP images are allowed.".into(),
        ));
    }

    let sniffed = sniff_image(bytes).ok_or_else(|| {
        AppError::BadRequest("File content does not match an allowed image format".into())
    })?;

    // jpg/jpeg both sniff as "jpg"; otherwise extension must agree with
    // the signature.
    let declared = match ext.as_deref() {
        Some("jpeg") => "jpg",
        Some(other) => other,
        None => "",
    };
    if declared != sniffed {
        return Err(AppError::BadRequest(
            "File extension does not match its content".into(),
        ));
    }

    Ok(sniffed)
}

/// Identify the image format from its leading magic bytes.
fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("png");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("gif");
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some("webp");
    }
    None
}

/// Persist a validated image and return the relative path recorded on the
/// entity, e.g. `uploads/products/product-1712345678901-ab12cd.png`.
pub async fn store_image(
    upload_dir: &str,
    subdir: &str,
    prefix: &str,
    ext: &str,
    bytes: &[u8],
) -> AppResult<String> {
    let dir = format!("{upload_dir}/{subdir}");
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

    let suffix = Uuid::new_v4().simple().to_string();
    let filename = format!(
        "{prefix}-{}-{}.{ext}",
        Utc::now().timestamp_millis(),
        &suffix[..6]
    );
    let path = format!("{dir}/{filename}");
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn accepts_valid_png() {
        let ext = validate_image("photo.png", Some("image/png"), &PNG_HEADER).unwrap();
        assert_eq!(ext, "png");
    }

    #[test]
    fn jpeg_and_jpg_extensions_both_accepted() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0];
        assert_eq!(
            validate_image("a.jpeg", Some("image/jpeg"), &jpeg).unwrap(),
            "jpg"
        );
        assert_eq!(
            validate_image("a.jpg", Some("image/jpeg"), &jpeg).unwrap(),
            "jpg"
        );
    }

    #[test]
    fn rejects_disallowed_mime() {
        let err = validate_image("a.png", Some("application/pdf"), &PNG_HEADER);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_extension_content_mismatch() {
        // GIF bytes behind a .png name.
        let err = validate_image("a.png", Some("image/png"), b"GIF89a0000");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_non_image_signature() {
        let err = validate_image("a.png", Some("image/png"), b"not an image at all");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_oversized_payload() {
        let big = vec![0u8; MAX_IMAGE_BYTES + 1];
        let err = validate_image("a.png", Some("image/png"), &big);
        assert!(err.is_err());
    }

    #[test]
    fn sniffs_webp() {
        let mut bytes = b"RIFF\x00\x00\x00\x00WEBPVP8 ".to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        assert_eq!(sniff_image(&bytes), Some("webp"));
    }
}
