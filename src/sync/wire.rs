use std::io::{Read, Write};

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use super::{DecodeError, EncodeError};

/// Scheme tag of the compressed JSON payload. The only format written.
pub const SCHEME_DATA: &str = "data=";
/// Scheme tag of the oldest links: the note text, percent-encoded.
pub const SCHEME_LEGACY_NOTE: &str = "note=";

/// Longest link still scanned reliably from a dense QR symbol.
pub const MAX_TRANSFER_URL_LEN: usize = 2200;

pub const MAX_INFLATED_BYTES: u64 = 8 * 1024 * 1024;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// What travels inside a link. Built fresh for every transfer attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferPayload {
    #[serde(rename = "t")]
    pub text: String,
    /// Always written, even when empty: a payload without `i` is an old
    /// markup body.
    #[serde(rename = "i")]
    pub images: Vec<String>,
}

impl TransferPayload {
    pub fn new(text: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            text: text.into(),
            images,
        }
    }

    pub fn text_only(&self) -> Self {
        Self::new(self.text.clone(), Vec::new())
    }
}

/// Payload as read off the wire. `images` stays `None` when the `i` key is
/// missing, which is how markup-bodied payloads are told apart.
#[derive(Debug, Deserialize)]
pub struct WirePayload {
    #[serde(rename = "t", default)]
    pub text: String,
    #[serde(rename = "i", default)]
    pub images: Option<Vec<String>>,
}

/// Serializes, compresses and encodes a payload, scheme tag included.
pub fn pack(payload: &TransferPayload) -> Result<String, EncodeError> {
    pack_json(&serde_json::to_vec(payload)?)
}

pub(crate) fn pack_json(json: &[u8]) -> Result<String, EncodeError> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(json.len() / 2), Compression::best());
    encoder.write_all(json)?;
    let compressed = encoder.finish()?;
    Ok(format!("{SCHEME_DATA}{}", URL_SAFE_LENIENT.encode(compressed)))
}

/// Inverse of [`pack`] for the part after the scheme tag.
pub fn unpack(encoded: &str) -> Result<WirePayload, DecodeError> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(DecodeError::Empty);
    }
    let compressed = URL_SAFE_LENIENT.decode(encoded)?;
    let mut json = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .take(MAX_INFLATED_BYTES + 1)
        .read_to_end(&mut json)
        .map_err(DecodeError::Inflate)?;
    if json.len() as u64 > MAX_INFLATED_BYTES {
        return Err(DecodeError::Oversize {
            limit: MAX_INFLATED_BYTES,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn packed_payload_is_url_safe_and_tagged() -> anyhow::Result<()> {
        let payload = TransferPayload::new("a?b&c=d#e/f+g", vec!["data:image/png;base64,AA+/".into()]);
        let packed = pack(&payload)?;
        let body = packed.strip_prefix(SCHEME_DATA).expect("scheme tag");
        assert!(body
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'));

        let wire = unpack(body)?;
        assert_eq!(wire.text, payload.text);
        assert_eq!(wire.images, Some(payload.images));
        Ok(())
    }

    #[test]
    fn packing_is_deterministic() -> anyhow::Result<()> {
        let payload = TransferPayload::new("same note", Vec::new());
        assert_eq!(pack(&payload)?, pack(&payload)?);
        Ok(())
    }

    #[test]
    fn text_only_payload_keeps_empty_image_key() -> anyhow::Result<()> {
        let payload = TransferPayload::new("hi", vec!["data:image/png;base64,AA".into()]).text_only();
        assert_eq!(serde_json::to_string(&payload)?, r#"{"t":"hi","i":[]}"#);
        let wire = unpack(pack(&payload)?.trim_start_matches(SCHEME_DATA))?;
        assert_eq!(wire.images, Some(Vec::new()));
        Ok(())
    }

    #[test]
    fn payload_without_image_key_reads_as_none() -> anyhow::Result<()> {
        let packed = pack_json(br#"{"t":"<b>old</b>"}"#)?;
        let wire = unpack(packed.trim_start_matches(SCHEME_DATA))?;
        assert_eq!(wire.text, "<b>old</b>");
        assert!(wire.images.is_none());
        Ok(())
    }

    #[test]
    fn corrupt_input_is_an_error() {
        assert_matches!(unpack(""), Err(DecodeError::Empty));
        assert_matches!(unpack("***"), Err(DecodeError::Base64(_)));
        assert_matches!(unpack("AAECAwQFBgcICQ"), Err(DecodeError::Inflate(_)) | Err(DecodeError::Json(_)));
    }
}
