use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

pub mod markup;

pub const BULLET: &str = "• ";

static BULLET_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[•◦‣\-*+](?:\s|$)|\d+[.)](?:\s|$))").expect("valid bullet pattern")
});

/// Minimal editing surface the transforms operate on. Offsets are byte
/// offsets into `text()` and always sit on char boundaries.
pub trait EditableDocument {
    fn text(&self) -> &str;

    /// Active selection, if any. An empty range counts as a caret.
    fn selection(&self) -> Option<Range<usize>>;

    fn replace(&mut self, range: Range<usize>, replacement: &str);

    fn serialize(&self) -> String {
        self.text().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Upper,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Cleanup,
    Bullets,
    Case(Case),
}

impl Transform {
    pub fn label(&self) -> &'static str {
        match self {
            Transform::Cleanup => "Cleanup",
            Transform::Bullets => "Bullets",
            Transform::Case(Case::Upper) => "Uppercase",
            Transform::Case(Case::Lower) => "Lowercase",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    Applied,
    Unchanged,
    /// The transform only works on a selection and none is active.
    NeedsSelection,
}

impl TransformOutcome {
    pub fn message(&self, transform: Transform) -> String {
        match self {
            TransformOutcome::Applied => format!("{} applied", transform.label()),
            TransformOutcome::Unchanged => format!("{}: nothing to change", transform.label()),
            TransformOutcome::NeedsSelection => "Select text first".to_string(),
        }
    }
}

pub fn apply<D>(doc: &mut D, transform: Transform) -> TransformOutcome
where
    D: EditableDocument + ?Sized,
{
    match transform {
        Transform::Cleanup => rewrite_document(doc, cleanup),
        Transform::Bullets => rewrite_document(doc, bulletize),
        Transform::Case(case) => convert_case(doc, case),
    }
}

fn rewrite_document<D, F>(doc: &mut D, rewrite: F) -> TransformOutcome
where
    D: EditableDocument + ?Sized,
    F: FnOnce(&str) -> String,
{
    let current = doc.serialize();
    let rewritten = rewrite(&current);
    if rewritten == current {
        return TransformOutcome::Unchanged;
    }
    doc.replace(0..current.len(), &rewritten);
    TransformOutcome::Applied
}

/// Trims every line, collapses runs of blank lines to a single one and
/// drops blank lines at both ends.
pub fn cleanup(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = true;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !previous_blank {
                out.push("");
            }
            previous_blank = true;
        } else {
            out.push(trimmed);
            previous_blank = false;
        }
    }
    while out.last().is_some_and(|line| line.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// Prefixes every non-empty line that has no list marker yet with a bullet,
/// keeping its indentation.
pub fn bulletize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.lines().count() * BULLET.len());
    for (idx, line) in text.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        if line.trim().is_empty() || has_bullet(line) {
            out.push_str(line);
            continue;
        }
        let content = line.trim_start();
        let indent = &line[..line.len() - content.len()];
        out.push_str(indent);
        out.push_str(BULLET);
        out.push_str(content);
    }
    out
}

pub fn has_bullet(line: &str) -> bool {
    BULLET_MARKER.is_match(line)
}

/// Changes the case of the selected text only. Without a selection the
/// document is left alone.
pub fn convert_case<D>(doc: &mut D, case: Case) -> TransformOutcome
where
    D: EditableDocument + ?Sized,
{
    let Some(range) = doc.selection().filter(|range| !range.is_empty()) else {
        return TransformOutcome::NeedsSelection;
    };
    let selected = &doc.text()[range.clone()];
    let converted = match case {
        Case::Upper => selected.to_uppercase(),
        Case::Lower => selected.to_lowercase(),
    };
    if converted == selected {
        return TransformOutcome::Unchanged;
    }
    doc.replace(range, &converted);
    TransformOutcome::Applied
}

/// Plain string-backed document, used by the CLI and in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextDocument {
    text: String,
    selection: Option<Range<usize>>,
}

impl TextDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            selection: None,
        }
    }

    pub fn with_selection(mut self, range: Range<usize>) -> Self {
        let end = range.end.min(self.text.len());
        let start = range.start.min(end);
        self.selection = Some(start..end);
        self
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl EditableDocument for TextDocument {
    fn text(&self) -> &str {
        &self.text
    }

    fn selection(&self) -> Option<Range<usize>> {
        self.selection.clone()
    }

    fn replace(&mut self, range: Range<usize>, replacement: &str) {
        let start = range.start;
        self.text.replace_range(range, replacement);
        if self.selection.is_some() {
            self.selection = Some(start..start + replacement.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_trims_and_collapses_blank_runs() {
        let raw = "\n\n  first  \n\n\n\tsecond\n   \n\nthird   \n\n";
        assert_eq!(cleanup(raw), "first\n\nsecond\n\nthird");
        assert_eq!(cleanup(""), "");
        assert_eq!(cleanup(" \n \n"), "");
    }

    #[test]
    fn bulletize_skips_existing_markers_and_blank_lines() {
        let raw = "milk\n- eggs\n\n  bread\n1. flour\n• salt";
        assert_eq!(
            bulletize(raw),
            "• milk\n- eggs\n\n  • bread\n1. flour\n• salt"
        );
    }

    #[test]
    fn bulletize_is_idempotent() {
        let once = bulletize("a\nb");
        assert_eq!(bulletize(&once), once);
    }

    #[test]
    fn case_conversion_without_selection_needs_selection() {
        let mut doc = TextDocument::new("Hello World");
        let outcome = apply(&mut doc, Transform::Case(Case::Upper));
        assert_eq!(outcome, TransformOutcome::NeedsSelection);
        assert_eq!(doc.text(), "Hello World");
        assert_eq!(outcome.message(Transform::Case(Case::Upper)), "Select text first");

        let mut caret = TextDocument::new("Hello").with_selection(2..2);
        assert_eq!(
            apply(&mut caret, Transform::Case(Case::Lower)),
            TransformOutcome::NeedsSelection
        );
    }

    #[test]
    fn case_conversion_touches_only_the_selection() {
        let mut doc = TextDocument::new("hello world").with_selection(6..11);
        assert_eq!(
            apply(&mut doc, Transform::Case(Case::Upper)),
            TransformOutcome::Applied
        );
        assert_eq!(doc.text(), "hello WORLD");
        assert_eq!(doc.selection(), Some(6..11));
    }

    #[test]
    fn selection_tracks_length_changes() {
        let mut doc = TextDocument::new("straße").with_selection(0..7);
        apply(&mut doc, Transform::Case(Case::Upper));
        assert_eq!(doc.text(), "STRASSE");
        assert_eq!(doc.selection(), Some(0..7));
    }

    #[test]
    fn document_transforms_report_unchanged() {
        let mut doc = TextDocument::new("• tidy");
        assert_eq!(apply(&mut doc, Transform::Bullets), TransformOutcome::Unchanged);
        assert_eq!(apply(&mut doc, Transform::Cleanup), TransformOutcome::Unchanged);

        let mut messy = TextDocument::new("  a  \n\n\n b");
        assert_eq!(apply(&mut messy, Transform::Cleanup), TransformOutcome::Applied);
        assert_eq!(messy.text(), "a\n\nb");
    }
}
