use serde::{Deserialize, Serialize};

pub const DATA_URI_PREFIX: &str = "data:";
pub const EMBEDDED_IMAGE_PREFIX: &str = "data:image/";

/// The single note the editor works on.
///
/// `images` keeps document order. An entry is either a self-contained
/// `data:` URI or a locator (URL or path) that is embedded at transfer time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "t", default)]
    pub text: String,
    #[serde(rename = "i", default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Note {
    pub fn new(text: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            text: text.into(),
            images,
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(text, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.images.is_empty()
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    pub fn append_text(&mut self, extra: &str) {
        if extra.is_empty() {
            return;
        }
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.text.push_str(extra);
    }

    pub fn attach_image(&mut self, reference: impl Into<String>) {
        let reference = reference.into();
        let trimmed = reference.trim();
        if !trimmed.is_empty() {
            self.images.push(trimmed.to_string());
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.images.clear();
    }
}

pub fn is_data_uri(reference: &str) -> bool {
    reference.starts_with(DATA_URI_PREFIX)
}

/// A base64 `data:image/...` URI, the only kind of reference that travels
/// inside a link as is.
pub fn is_embedded_image(reference: &str) -> bool {
    reference
        .strip_prefix(EMBEDDED_IMAGE_PREFIX)
        .and_then(|rest| rest.split_once(','))
        .is_some_and(|(header, _)| header.ends_with(";base64"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_text_separates_with_newline() {
        let mut note = Note::from_text("first");
        note.append_text("second");
        assert_eq!(note.text, "first\nsecond");

        let mut empty = Note::default();
        empty.append_text("only");
        assert_eq!(empty.text, "only");
    }

    #[test]
    fn serializes_without_empty_image_list() -> anyhow::Result<()> {
        let json = serde_json::to_string(&Note::from_text("hi"))?;
        assert_eq!(json, r#"{"t":"hi"}"#);
        let back: Note = serde_json::from_str(r#"{"t":"hi","i":["data:image/png;base64,AA"]}"#)?;
        assert_eq!(back.images.len(), 1);
        Ok(())
    }

    #[test]
    fn attach_trims_and_ignores_blank_references() {
        let mut note = Note::default();
        note.attach_image("  data:image/png;base64,AAAA ");
        note.attach_image("   ");
        assert!(note.has_images());
        assert_eq!(note.images, vec!["data:image/png;base64,AAAA".to_string()]);
    }

    #[test]
    fn only_base64_image_uris_count_as_embedded() {
        assert!(is_embedded_image("data:image/png;base64,AAAA"));
        assert!(is_embedded_image("data:image/jpeg;base64,"));
        assert!(!is_embedded_image("data:image/svg+xml,<svg/>"));
        assert!(!is_embedded_image("data:text/html;base64,PGI+"));
        assert!(!is_embedded_image("https://img.test/a.png"));
    }
}
