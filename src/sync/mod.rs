//! Link codec that moves a note between devices inside a URL fragment.
//!
//! Current links look like `<base_url>#data=<payload>` where the payload is
//! base64url(deflate(JSON)). Older `#note=<percent-encoded text>` links and
//! markup-bodied payloads still decode.

use thiserror::Error;

pub mod decode;
pub mod encode;
pub mod wire;

pub use decode::{decode_fragment, decode_link, fragment_of, strip_fragment};
pub use encode::{Degradation, EncodeReport, EncodeStatus, Strategy, SyncEncoder};
pub use wire::{TransferPayload, MAX_TRANSFER_URL_LEN};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("serialising payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("compressing payload: {0}")]
    Compress(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("link carries no payload")]
    Empty,
    #[error("unrecognised payload scheme '{0}'")]
    UnknownScheme(String),
    #[error("invalid percent-encoding: {0}")]
    Percent(#[from] std::string::FromUtf8Error),
    #[error("invalid base64url payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decompressing payload: {0}")]
    Inflate(#[source] std::io::Error),
    #[error("payload expands beyond {limit} bytes")]
    Oversize { limit: u64 },
    #[error("invalid payload structure: {0}")]
    Json(#[from] serde_json::Error),
}
