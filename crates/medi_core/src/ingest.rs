//! Artifact ingestion: selected image file → data URL → `Artifact`.

use std::path::Path;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use tracing::debug;

use crate::error::CoreResult;
use crate::types::Artifact;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

fn data_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^data:(.+);base64,(.+)$").expect("data URL pattern is valid")
    })
}

/// Parse a `data:<type>;base64,<data>` URL.
///
/// Returns `None` when the URL does not match or the data segment is not
/// valid base64; the caller must then leave its state untouched.
pub fn parse_data_url(data_url: &str) -> Option<Artifact> {
    let captures = data_url_pattern().captures(data_url)?;
    let media_type = captures.get(1)?.as_str();
    let data = captures.get(2)?.as_str();

    match BASE64.decode(data) {
        Ok(payload) => Some(Artifact::new(payload, media_type)),
        Err(e) => {
            debug!("Rejecting data URL with undecodable payload: {}", e);
            None
        }
    }
}

/// Encode bytes as a base64 data URL.
pub fn encode_data_url(payload: &[u8], media_type: &str) -> String {
    format!("data:{};base64,{}", media_type, BASE64.encode(payload))
}

/// Read a file and encode it as a data URL, inferring the media type from
/// its extension.
pub async fn read_as_data_url(path: impl AsRef<Path>) -> CoreResult<String> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await?;
    let media_type = media_type_for(path);
    debug!(
        "Read {} bytes from {:?} as {}",
        bytes.len(),
        path,
        media_type
    );
    Ok(encode_data_url(&bytes, media_type))
}

/// Media type for a file path, by extension.
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => FALLBACK_MEDIA_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_valid_data_url() {
        let artifact = parse_data_url("data:image/jpeg;base64,/9j/4AAQ").unwrap();
        assert_eq!(artifact.media_type(), "image/jpeg");
        assert_eq!(artifact.payload(), &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10]);
    }

    #[test]
    fn test_parse_rejects_malformed_inputs() {
        assert!(parse_data_url("").is_none());
        assert!(parse_data_url("image/png;base64,AAAA").is_none());
        assert!(parse_data_url("data:image/png,AAAA").is_none());
        assert!(parse_data_url("data:;base64,AAAA").is_none());
        assert!(parse_data_url("data:image/png;base64,").is_none());
        assert!(parse_data_url("data:image/png;base64,not base64!").is_none());
    }

    #[test]
    fn test_encode_then_parse_preserves_fields() {
        let bytes = vec![1u8, 2, 3, 250, 251];
        let url = encode_data_url(&bytes, "image/png");
        let artifact = parse_data_url(&url).unwrap();
        assert_eq!(artifact.payload(), bytes.as_slice());
        assert_eq!(artifact.media_type(), "image/png");
    }

    #[test]
    fn test_media_type_for_extensions() {
        assert_eq!(media_type_for(Path::new("report.JPG")), "image/jpeg");
        assert_eq!(media_type_for(Path::new("scan.webp")), "image/webp");
        assert_eq!(media_type_for(Path::new("noext")), FALLBACK_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_read_as_data_url() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"\x89PNG").unwrap();

        let url = read_as_data_url(file.path()).await.unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(parse_data_url(&url).unwrap().payload(), b"\x89PNG");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let err = read_as_data_url("/definitely/not/here.png").await.unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Io(_)));
    }
}
