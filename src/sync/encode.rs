use std::fmt;

use crate::config::TransferOptions;
use crate::images::{ImageFetcher, ImageNormalizer, NormalizedImage};
use crate::note::Note;

use super::wire::{pack, TransferPayload, MAX_TRANSFER_URL_LEN};
use super::EncodeError;

const RECOMPRESS_MAX_DIMENSION: u32 = 320;
const RECOMPRESS_QUALITY: u8 = 35;

/// One way of shaping a payload. Strategies are tried in order and the
/// first whose link fits the ceiling wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Full,
    RecompressedImages,
    TextOnly,
}

pub const DEFAULT_STRATEGIES: &[Strategy] = &[Strategy::Full, Strategy::TextOnly];
pub const RECOMPRESSING_STRATEGIES: &[Strategy] = &[
    Strategy::Full,
    Strategy::RecompressedImages,
    Strategy::TextOnly,
];

impl Strategy {
    fn degradation(&self) -> Option<Degradation> {
        match self {
            Strategy::Full => None,
            Strategy::RecompressedImages => Some(Degradation::ImagesRecompressed),
            Strategy::TextOnly => Some(Degradation::ImagesDropped),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    ImagesRecompressed,
    ImagesDropped,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::ImagesRecompressed => f.write_str("images recompressed"),
            Degradation::ImagesDropped => f.write_str("images dropped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeStatus {
    Ok { url: String },
    Degraded { url: String, reason: Degradation },
    /// Nothing fit. `length` is the shortest link any strategy produced.
    TooLarge { length: usize },
}

impl EncodeStatus {
    pub fn url(&self) -> Option<&str> {
        match self {
            EncodeStatus::Ok { url } | EncodeStatus::Degraded { url, .. } => Some(url),
            EncodeStatus::TooLarge { .. } => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            EncodeStatus::Ok { url } => format!("Link ready ({} chars)", url.len()),
            EncodeStatus::Degraded { url, reason } => {
                format!("Link ready ({} chars, {reason})", url.len())
            }
            EncodeStatus::TooLarge { length } => format!(
                "Note too large to transfer ({length} of {MAX_TRANSFER_URL_LEN} chars); shorten it and retry"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImage {
    pub reference: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeReport {
    pub status: EncodeStatus,
    pub skipped_images: Vec<SkippedImage>,
}

pub struct SyncEncoder<F> {
    normalizer: ImageNormalizer<F>,
    base_url: String,
    strategies: Vec<Strategy>,
}

impl<F: ImageFetcher> SyncEncoder<F> {
    pub fn new(normalizer: ImageNormalizer<F>, base_url: impl Into<String>) -> Self {
        Self {
            normalizer,
            base_url: base_url.into(),
            strategies: DEFAULT_STRATEGIES.to_vec(),
        }
    }

    pub fn from_options(fetcher: F, options: &TransferOptions) -> Self {
        let strategies = if options.recompress_images {
            RECOMPRESSING_STRATEGIES
        } else {
            DEFAULT_STRATEGIES
        };
        Self::new(
            ImageNormalizer::from_options(fetcher, options),
            options.base_url.clone(),
        )
        .with_strategies(strategies.to_vec())
    }

    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Embeds every image, then shapes the payload to fit a link.
    /// Images that cannot be embedded are left out and listed in the report.
    pub fn encode(&self, note: &Note) -> Result<EncodeReport, EncodeError> {
        let mut images = Vec::with_capacity(note.images.len());
        let mut skipped_images = Vec::new();
        for result in self.normalizer.normalize_all(&note.images) {
            match result {
                NormalizedImage::Embedded(uri) => images.push(uri),
                NormalizedImage::Skipped { reference, reason } => {
                    skipped_images.push(SkippedImage { reference, reason })
                }
            }
        }
        let payload = TransferPayload::new(note.text.clone(), images);
        let status = self.encode_normalized(&payload)?;
        tracing::info!(
            status = %status.summary(),
            skipped = skipped_images.len(),
            "encoded transfer link"
        );
        Ok(EncodeReport {
            status,
            skipped_images,
        })
    }

    /// Runs the strategy list over a payload whose images are already
    /// embedded. Does no I/O.
    pub fn encode_normalized(&self, payload: &TransferPayload) -> Result<EncodeStatus, EncodeError> {
        let mut shortest: Option<usize> = None;
        for strategy in &self.strategies {
            let Some(candidate) = self.shape(*strategy, payload) else {
                continue;
            };
            let url = self.compose(&candidate)?;
            tracing::debug!(?strategy, length = url.len(), "tried transfer strategy");
            if url.len() <= MAX_TRANSFER_URL_LEN {
                return Ok(match strategy.degradation() {
                    None => EncodeStatus::Ok { url },
                    Some(reason) => EncodeStatus::Degraded { url, reason },
                });
            }
            shortest = Some(shortest.map_or(url.len(), |len| len.min(url.len())));
        }
        Ok(EncodeStatus::TooLarge {
            length: shortest.unwrap_or(0),
        })
    }

    fn shape(&self, strategy: Strategy, payload: &TransferPayload) -> Option<TransferPayload> {
        match strategy {
            Strategy::Full => Some(payload.clone()),
            Strategy::RecompressedImages if payload.images.is_empty() => None,
            Strategy::RecompressedImages => {
                // All or nothing: a partial set would drop images under the
                // wrong degradation.
                let images = payload
                    .images
                    .iter()
                    .map(|uri| {
                        self.normalizer
                            .shrink(uri, RECOMPRESS_MAX_DIMENSION, RECOMPRESS_QUALITY)
                    })
                    .collect::<Result<Vec<_>, _>>();
                match images {
                    Ok(images) => Some(TransferPayload::new(payload.text.clone(), images)),
                    Err(err) => {
                        tracing::warn!(%err, "could not recompress images, skipping tier");
                        None
                    }
                }
            }
            Strategy::TextOnly if payload.images.is_empty() => None,
            Strategy::TextOnly => Some(payload.text_only()),
        }
    }

    fn compose(&self, payload: &TransferPayload) -> Result<String, EncodeError> {
        Ok(format!("{}#{}", self.base_url, pack(payload)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::ImageError;
    use crate::sync::decode_link;
    use assert_matches::assert_matches;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    const BASE: &str = "https://notebeam.test/";

    struct NoNetwork;

    impl ImageFetcher for NoNetwork {
        fn fetch(&self, locator: &str) -> Result<Vec<u8>, ImageError> {
            Err(ImageError::Fetch {
                locator: locator.to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    fn encoder() -> SyncEncoder<NoNetwork> {
        SyncEncoder::new(ImageNormalizer::new(NoNetwork, 800, 60), BASE)
    }

    /// Text that deflate cannot shrink much.
    fn noise(len: usize, seed: u64) -> String {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ALPHABET[(state >> 58) as usize] as char
            })
            .collect()
    }

    /// A smooth gradient with noise in the low bits: large as PNG, small
    /// once JPEG quantization flattens the noise.
    fn speckled_png_uri(size: u32) -> anyhow::Result<String> {
        let mut state = 17u64;
        let img = RgbImage::from_fn(size, size, |x, y| {
            let mut speck = || {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 60) as u8
            };
            Rgb([(x * 5) as u8 + speck(), (y * 5) as u8 + speck(), 128 + speck()])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png)?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(out.into_inner())))
    }

    #[test]
    fn empty_note_encodes_to_short_link() -> anyhow::Result<()> {
        let report = encoder().encode(&Note::default())?;
        let url = report.status.url().expect("link");
        assert!(url.starts_with("https://notebeam.test/#data="));
        assert!(url.len() < 64);
        assert_eq!(decode_link(url)?, Note::default());
        Ok(())
    }

    #[test]
    fn small_note_round_trips() -> anyhow::Result<()> {
        let note = Note::new(
            "Groceries\n• milk\n• äpfel & 🍞",
            vec!["data:image/png;base64,iVBORw0KGgo=".to_string()],
        );
        let report = encoder().encode(&note)?;
        assert_matches!(report.status, EncodeStatus::Ok { .. });
        assert_eq!(decode_link(report.status.url().unwrap_or_default())?, note);
        Ok(())
    }

    #[test]
    fn oversized_image_is_dropped_but_text_survives() -> anyhow::Result<()> {
        let image = format!("data:image/png;base64,{}", noise(6000, 7));
        let note = Note::new("call mom", vec![image]);
        let report = encoder().encode(&note)?;
        assert_matches!(
            report.status,
            EncodeStatus::Degraded { reason: Degradation::ImagesDropped, .. }
        );
        let decoded = decode_link(report.status.url().unwrap_or_default())?;
        assert_eq!(decoded.text, "call mom");
        assert!(decoded.images.is_empty());
        Ok(())
    }

    #[test]
    fn recompression_keeps_images_that_fit_after_shrinking() -> anyhow::Result<()> {
        let image = speckled_png_uri(48)?;
        assert!(image.len() > MAX_TRANSFER_URL_LEN);
        let note = Note::new("whiteboard", vec![image]);
        let report = encoder()
            .with_strategies(RECOMPRESSING_STRATEGIES.to_vec())
            .encode(&note)?;
        assert_matches!(
            report.status,
            EncodeStatus::Degraded { reason: Degradation::ImagesRecompressed, .. }
        );
        let decoded = decode_link(report.status.url().unwrap_or_default())?;
        assert_eq!(decoded.text, "whiteboard");
        assert_eq!(decoded.images.len(), 1);
        assert!(decoded.images[0].starts_with("data:image/jpeg;base64,"));
        Ok(())
    }

    #[test]
    fn unreadable_image_skips_recompression_tier() -> anyhow::Result<()> {
        let image = format!("data:image/png;base64,{}", noise(6000, 7));
        let note = Note::new("call mom", vec![image]);
        let report = encoder()
            .with_strategies(RECOMPRESSING_STRATEGIES.to_vec())
            .encode(&note)?;
        assert_matches!(
            report.status,
            EncodeStatus::Degraded { reason: Degradation::ImagesDropped, .. }
        );
        Ok(())
    }

    #[test]
    fn tag_like_text_round_trips_unchanged() -> anyhow::Result<()> {
        let note = Note::from_text("use <b>bold</b> and <br> tags, 1 &lt; 2");
        let report = encoder().encode(&note)?;
        assert_eq!(decode_link(report.status.url().unwrap_or_default())?, note);

        let with_image = Note::new(
            "<div>keep</div> &amp;",
            vec![format!("data:image/png;base64,{}", noise(6000, 5))],
        );
        let report = encoder().encode(&with_image)?;
        assert_matches!(
            report.status,
            EncodeStatus::Degraded { reason: Degradation::ImagesDropped, .. }
        );
        let decoded = decode_link(report.status.url().unwrap_or_default())?;
        assert_eq!(decoded, Note::from_text("<div>keep</div> &amp;"));
        Ok(())
    }

    #[test]
    fn oversized_text_is_rejected_without_link() -> anyhow::Result<()> {
        let note = Note::new(noise(4000, 11), vec!["data:image/png;base64,AAAA".into()]);
        let report = encoder().encode(&note)?;
        assert_matches!(report.status, EncodeStatus::TooLarge { length } if length > MAX_TRANSFER_URL_LEN);
        assert!(report.status.url().is_none());
        Ok(())
    }

    #[test]
    fn oversized_text_without_images_skips_text_only_tier() -> anyhow::Result<()> {
        let payload = TransferPayload::new(noise(4000, 3), Vec::new());
        let status = encoder().encode_normalized(&payload)?;
        assert_matches!(status, EncodeStatus::TooLarge { .. });
        Ok(())
    }

    #[test]
    fn unreachable_images_are_skipped_not_fatal() -> anyhow::Result<()> {
        let note = Note::new(
            "with pictures",
            vec![
                "https://cdn.test/blocked.png".to_string(),
                "data:image/png;base64,AAAA".to_string(),
            ],
        );
        let report = encoder().encode(&note)?;
        assert_eq!(report.skipped_images.len(), 1);
        assert_eq!(report.skipped_images[0].reference, "https://cdn.test/blocked.png");
        let decoded = decode_link(report.status.url().unwrap_or_default())?;
        assert_eq!(decoded.images, vec!["data:image/png;base64,AAAA".to_string()]);
        Ok(())
    }

    #[test]
    fn encoding_is_deterministic() -> anyhow::Result<()> {
        let note = Note::new("same again", vec!["data:image/png;base64,AAAA".into()]);
        let first = encoder().encode(&note)?;
        let second = encoder().encode(&note)?;
        assert_eq!(first.status, second.status);
        Ok(())
    }

    #[test]
    fn recompressing_configuration_inserts_middle_tier() {
        let mut options = TransferOptions::default();
        assert_eq!(
            SyncEncoder::from_options(NoNetwork, &options).strategies(),
            DEFAULT_STRATEGIES
        );
        options.recompress_images = true;
        assert_eq!(
            SyncEncoder::from_options(NoNetwork, &options).strategies(),
            RECOMPRESSING_STRATEGIES
        );
    }
}
