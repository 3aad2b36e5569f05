use std::fs;
use std::io::Read;
use std::path::Path;
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use thiserror::Error;

use crate::config::TransferOptions;
use crate::note::{is_data_uri, is_embedded_image};

/// Upper bound on bytes read for a single image, remote or local.
pub const MAX_SOURCE_BYTES: u64 = 16 * 1024 * 1024;

const EMBEDDED_JPEG_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("fetching {locator}: {reason}")]
    Fetch { locator: String, reason: String },
    #[error("{locator} is larger than {limit} bytes")]
    SourceTooLarge { locator: String, limit: u64 },
    #[error("{locator} is not an image ({content_type})")]
    NotAnImage {
        locator: String,
        content_type: String,
    },
    #[error("malformed data URI")]
    MalformedDataUri,
    #[error("data URI is not a base64 image")]
    UnsupportedDataUri,
    #[error("invalid base64 in data URI: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decoding image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("re-encoding image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("building http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Loads the raw bytes behind an image locator.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, ImageError>;
}

/// Fetches `http(s)` locators over the network and treats everything else
/// as a local path (`file://` prefix optional).
pub struct SourceFetcher {
    client: reqwest::blocking::Client,
}

impl SourceFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ImageError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("notebeam/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ImageError::Client)?;
        Ok(Self { client })
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let fetch_err = |err: reqwest::Error| ImageError::Fetch {
            locator: url.to_string(),
            reason: err.to_string(),
        };
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(fetch_err)?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.is_empty() && !content_type.starts_with("image/") {
            return Err(ImageError::NotAnImage {
                locator: url.to_string(),
                content_type,
            });
        }

        let mut bytes = Vec::new();
        response
            .take(MAX_SOURCE_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|err| ImageError::Fetch {
                locator: url.to_string(),
                reason: err.to_string(),
            })?;
        if bytes.len() as u64 > MAX_SOURCE_BYTES {
            return Err(ImageError::SourceTooLarge {
                locator: url.to_string(),
                limit: MAX_SOURCE_BYTES,
            });
        }
        Ok(bytes)
    }

    fn fetch_file(&self, locator: &str) -> Result<Vec<u8>, ImageError> {
        let path = Path::new(locator.strip_prefix("file://").unwrap_or(locator));
        let io_err = |err: std::io::Error| ImageError::Fetch {
            locator: locator.to_string(),
            reason: err.to_string(),
        };
        let size = fs::metadata(path).map_err(io_err)?.len();
        if size > MAX_SOURCE_BYTES {
            return Err(ImageError::SourceTooLarge {
                locator: locator.to_string(),
                limit: MAX_SOURCE_BYTES,
            });
        }
        fs::read(path).map_err(io_err)
    }
}

impl ImageFetcher for SourceFetcher {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, ImageError> {
        let lowered = locator.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            self.fetch_http(locator)
        } else {
            self.fetch_file(locator)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedImage {
    Embedded(String),
    Skipped { reference: String, reason: String },
}

/// Turns image references into self-contained `data:` URIs small enough to
/// travel inside a link.
pub struct ImageNormalizer<F> {
    fetcher: F,
    max_dimension: u32,
    quality: u8,
}

impl<F: ImageFetcher> ImageNormalizer<F> {
    pub fn new(fetcher: F, max_dimension: u32, quality: u8) -> Self {
        Self {
            fetcher,
            max_dimension: max_dimension.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn from_options(fetcher: F, options: &TransferOptions) -> Self {
        Self::new(fetcher, options.max_image_dimension, options.jpeg_quality)
    }

    /// Base64 image URIs pass through untouched and other `data:` URIs are
    /// rejected. Anything else is fetched, downscaled and re-encoded as JPEG.
    pub fn normalize(&self, reference: &str) -> Result<String, ImageError> {
        if is_embedded_image(reference) {
            return Ok(reference.to_string());
        }
        if is_data_uri(reference) {
            return Err(ImageError::UnsupportedDataUri);
        }
        let bytes = self.fetcher.fetch(reference)?;
        embed_bytes(&bytes, self.max_dimension, self.quality)
    }

    /// Normalizes every reference concurrently. The result has one entry per
    /// input, in input order, regardless of which fetch finishes first.
    pub fn normalize_all(&self, references: &[String]) -> Vec<NormalizedImage> {
        thread::scope(|scope| {
            let pending: Vec<_> = references
                .iter()
                .map(|reference| {
                    if is_embedded_image(reference) {
                        Err(reference.clone())
                    } else {
                        Ok(scope.spawn(move || self.normalize(reference)))
                    }
                })
                .collect();

            pending
                .into_iter()
                .zip(references)
                .map(|(job, reference)| {
                    let result = match job {
                        Err(embedded) => Ok(embedded),
                        Ok(handle) => handle.join().unwrap_or_else(|_| {
                            Err(ImageError::Fetch {
                                locator: reference.clone(),
                                reason: "image worker panicked".to_string(),
                            })
                        }),
                    };
                    match result {
                        Ok(uri) => NormalizedImage::Embedded(uri),
                        Err(err) => {
                            tracing::warn!(reference = %preview(reference), %err, "dropping image from transfer");
                            NormalizedImage::Skipped {
                                reference: reference.clone(),
                                reason: err.to_string(),
                            }
                        }
                    }
                })
                .collect()
        })
    }

    /// Re-encodes an already embedded image with tighter limits.
    pub fn shrink(
        &self,
        data_uri: &str,
        max_dimension: u32,
        quality: u8,
    ) -> Result<String, ImageError> {
        let bytes = decode_data_uri(data_uri)?;
        embed_bytes(&bytes, max_dimension.max(1), quality.clamp(1, 100))
    }
}

pub fn embed_bytes(bytes: &[u8], max_dimension: u32, quality: u8) -> Result<String, ImageError> {
    let decoded = image::load_from_memory(bytes).map_err(ImageError::Decode)?;
    let scaled = if decoded.width() > max_dimension || decoded.height() > max_dimension {
        decoded.thumbnail(max_dimension, max_dimension)
    } else {
        decoded
    };
    let rgb = scaled.to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(&rgb)
        .map_err(ImageError::Encode)?;
    Ok(format!("{EMBEDDED_JPEG_PREFIX}{}", BASE64.encode(jpeg)))
}

pub fn decode_data_uri(data_uri: &str) -> Result<Vec<u8>, ImageError> {
    let rest = data_uri
        .strip_prefix("data:")
        .ok_or(ImageError::MalformedDataUri)?;
    let (header, payload) = rest.split_once(',').ok_or(ImageError::MalformedDataUri)?;
    if !header.ends_with(";base64") {
        return Err(ImageError::MalformedDataUri);
    }
    Ok(BASE64.decode(payload.trim())?)
}

fn preview(reference: &str) -> &str {
    match reference.char_indices().nth(64) {
        Some((idx, _)) => &reference[..idx],
        None => reference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::collections::HashMap;
    use std::io::Cursor;

    struct MapFetcher(HashMap<String, Vec<u8>>);

    impl ImageFetcher for MapFetcher {
        fn fetch(&self, locator: &str) -> Result<Vec<u8>, ImageError> {
            self.0.get(locator).cloned().ok_or_else(|| ImageError::Fetch {
                locator: locator.to_string(),
                reason: "blocked by cross-origin policy".to_string(),
            })
        }
    }

    fn png_bytes(width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    fn normalizer(entries: Vec<(&str, Vec<u8>)>) -> ImageNormalizer<MapFetcher> {
        let map = entries
            .into_iter()
            .map(|(key, bytes)| (key.to_string(), bytes))
            .collect();
        ImageNormalizer::new(MapFetcher(map), 800, 60)
    }

    #[test]
    fn data_uris_pass_through_unchanged() -> anyhow::Result<()> {
        let normalizer = normalizer(Vec::new());
        let uri = "data:image/png;base64,AAAA";
        assert_eq!(normalizer.normalize(uri)?, uri);
        Ok(())
    }

    #[test]
    fn external_images_are_downscaled_jpegs() -> anyhow::Result<()> {
        let normalizer = normalizer(vec![("https://img.test/wide.png", png_bytes(1600, 400)?)]);
        let embedded = normalizer.normalize("https://img.test/wide.png")?;
        assert!(embedded.starts_with(EMBEDDED_JPEG_PREFIX));

        let decoded = image::load_from_memory(&decode_data_uri(&embedded)?)?;
        assert_eq!(decoded.width(), 800);
        assert_eq!(decoded.height(), 200);
        Ok(())
    }

    #[test]
    fn failed_fetch_is_reported_per_image() {
        let normalizer = normalizer(Vec::new());
        assert_matches!(
            normalizer.normalize("https://elsewhere.test/x.png"),
            Err(ImageError::Fetch { .. })
        );
    }

    fn embedded_width(result: &NormalizedImage) -> anyhow::Result<u32> {
        let NormalizedImage::Embedded(uri) = result else {
            anyhow::bail!("expected an embedded image, got {result:?}");
        };
        assert!(uri.starts_with(EMBEDDED_JPEG_PREFIX));
        Ok(image::load_from_memory(&decode_data_uri(uri)?)?.width())
    }

    #[test]
    fn normalize_all_keeps_document_order() -> anyhow::Result<()> {
        let normalizer = normalizer(vec![
            ("slow.png", png_bytes(20, 20)?),
            ("fast.png", png_bytes(10, 10)?),
        ]);
        let refs = vec![
            "slow.png".to_string(),
            "blocked.png".to_string(),
            "data:image/png;base64,AAAA".to_string(),
            "fast.png".to_string(),
        ];
        let results = normalizer.normalize_all(&refs);
        assert_eq!(results.len(), 4);
        assert_eq!(embedded_width(&results[0])?, 20);
        assert_matches!(&results[1], NormalizedImage::Skipped { reference, .. } if reference == "blocked.png");
        assert_eq!(
            results[2],
            NormalizedImage::Embedded("data:image/png;base64,AAAA".to_string())
        );
        assert_eq!(embedded_width(&results[3])?, 10);
        Ok(())
    }

    #[test]
    fn non_image_data_uris_are_skipped() {
        let normalizer = normalizer(Vec::new());
        let refs = vec![
            "data:text/html;base64,PGI+aGk8L2I+".to_string(),
            "data:image/svg+xml,<svg xmlns='http://www.w3.org/2000/svg'/>".to_string(),
        ];
        for (result, reference) in normalizer.normalize_all(&refs).iter().zip(&refs) {
            assert_matches!(
                result,
                NormalizedImage::Skipped { reference: skipped, reason }
                    if skipped == reference && reason == "data URI is not a base64 image"
            );
        }
        assert_matches!(
            normalizer.normalize(&refs[0]),
            Err(ImageError::UnsupportedDataUri)
        );
    }

    #[test]
    fn shrink_reduces_embedded_images() -> anyhow::Result<()> {
        let normalizer = normalizer(vec![("big.png", png_bytes(600, 600)?)]);
        let embedded = normalizer.normalize("big.png")?;
        let smaller = normalizer.shrink(&embedded, 100, 30)?;
        let decoded = image::load_from_memory(&decode_data_uri(&smaller)?)?;
        assert_eq!(decoded.width(), 100);
        assert!(smaller.len() < embedded.len());
        Ok(())
    }

    #[test]
    fn malformed_data_uris_are_rejected() {
        assert_matches!(decode_data_uri("data:image/png,plain"), Err(ImageError::MalformedDataUri));
        assert_matches!(decode_data_uri("image/png;base64,AAAA"), Err(ImageError::MalformedDataUri));
        assert_matches!(decode_data_uri("data:image/png;base64,!!!"), Err(ImageError::Base64(_)));
    }
}
