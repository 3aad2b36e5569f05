use crate::note::{is_embedded_image, Note};
use crate::transform::markup;

use super::wire::{unpack, WirePayload, SCHEME_DATA, SCHEME_LEGACY_NOTE};
use super::DecodeError;

/// Decodes the fragment of a transfer link, with or without the leading `#`.
pub fn decode_fragment(fragment: &str) -> Result<Note, DecodeError> {
    let fragment = fragment.trim();
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    if fragment.is_empty() {
        return Err(DecodeError::Empty);
    }

    if let Some(encoded) = fragment.strip_prefix(SCHEME_DATA) {
        return Ok(payload_to_note(unpack(encoded)?));
    }
    if let Some(encoded) = fragment.strip_prefix(SCHEME_LEGACY_NOTE) {
        let text = urlencoding::decode(encoded)?;
        return Ok(Note::from_text(text.into_owned()));
    }

    let scheme = fragment
        .split_once('=')
        .map_or(fragment, |(scheme, _)| scheme);
    Err(DecodeError::UnknownScheme(scheme.chars().take(32).collect()))
}

/// Decodes a whole link. Fails with [`DecodeError::Empty`] when it has no
/// fragment.
pub fn decode_link(link: &str) -> Result<Note, DecodeError> {
    let fragment = fragment_of(link).ok_or(DecodeError::Empty)?;
    decode_fragment(fragment)
}

/// The part after the first `#`, if it is non-empty.
pub fn fragment_of(link: &str) -> Option<&str> {
    link.split_once('#')
        .map(|(_, fragment)| fragment)
        .filter(|fragment| !fragment.trim().is_empty())
}

/// The link with its fragment removed, which is what the address bar
/// should show once a payload has been consumed.
pub fn strip_fragment(link: &str) -> &str {
    link.split_once('#').map_or(link, |(base, _)| base)
}

fn payload_to_note(payload: WirePayload) -> Note {
    let mut note = match payload.images {
        Some(images) => Note::new(payload.text, images),
        None if markup::looks_like_markup(&payload.text) => markup::extract(&payload.text),
        None => Note::from_text(payload.text),
    };
    // Received links never point the reader at remote images.
    note.images.retain(|image| is_embedded_image(image));
    note
}
