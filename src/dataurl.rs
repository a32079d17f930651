//! Text-safe encoding for image payloads: `data:<mime>;base64,<payload>`.
//!
//! Used for the all-text submission form and for images held in the device
//! queue, which lives in a text document.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("data URL is empty")]
    Empty,

    #[error("data URL is not base64 encoded")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Decode a data URL. A bare base64 string without the `data:` prefix is
/// accepted too and yields no mime type.
pub fn decode(input: &str) -> Result<Decoded, DataUrlError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DataUrlError::Empty);
    }

    let (mime_type, payload) = match input.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').ok_or(DataUrlError::NotBase64)?;
            let mut parts = header.split(';');
            let mime = parts.next().unwrap_or_default().trim();
            if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
                return Err(DataUrlError::NotBase64);
            }
            let mime = if mime.is_empty() { None } else { Some(mime.to_string()) };
            (mime, payload)
        }
        None => (None, input),
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| DataUrlError::InvalidPayload(e.to_string()))?;

    Ok(Decoded { mime_type, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_mime_prefix() {
        assert_eq!(encode("image/png", b"abc"), "data:image/png;base64,YWJj");
    }

    #[test]
    fn decodes_prefixed_and_bare_payloads() {
        let decoded = decode("data:image/jpeg;base64,YWJj").unwrap();
        assert_eq!(decoded.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(decoded.bytes, b"abc");

        let bare = decode("YWJj").unwrap();
        assert_eq!(bare.mime_type, None);
        assert_eq!(bare.bytes, b"abc");
    }

    #[test]
    fn rejects_non_base64_data_urls() {
        assert_eq!(decode("data:text/plain,hello"), Err(DataUrlError::NotBase64));
        assert_eq!(decode("   "), Err(DataUrlError::Empty));
        assert!(matches!(
            decode("data:image/png;base64,@@@"),
            Err(DataUrlError::InvalidPayload(_))
        ));
    }
}
