//! Handling for the unified-markup note format, where the body was a
//! contenteditable HTML string with images inlined as `<img src>`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::note::Note;

const ALLOWED_TAGS: &[&str] = &[
    "div", "p", "br", "ul", "ol", "li", "b", "strong", "i", "em", "img",
];
const BLOCK_TAGS: &[&str] = &["div", "p", "ul", "ol", "li"];

static DROPPED_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("valid dropped-block pattern")
});
static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(/?)([a-zA-Z][a-zA-Z0-9]*)\b([^>]*)>").expect("valid tag pattern")
});
static SRC_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).expect("valid src pattern")
});
static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z]{2,8});").expect("valid entity pattern")
});
static MARKUP_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(?:div|p|br|ul|ol|li|b|strong|i|em|img|span)\b[^>]*>")
        .expect("valid markup hint pattern")
});

/// True when `text` carries at least one tag the old rich editor produced.
pub fn looks_like_markup(text: &str) -> bool {
    MARKUP_HINT.is_match(text)
}

/// Strips everything outside a small allow-list of tags and drops every
/// attribute except an `img` source. Text content is kept verbatim.
pub fn sanitize(markup: &str) -> String {
    let cleaned = DROPPED_BLOCKS.replace_all(markup, "");
    let mut out = String::with_capacity(cleaned.len());
    let mut last = 0;
    for caps in TAG.captures_iter(&cleaned) {
        let whole = caps.get(0).expect("capture 0 always present");
        out.push_str(&cleaned[last..whole.start()]);
        last = whole.end();
        if let Some(tag) = rebuild_tag(&caps) {
            out.push_str(&tag);
        }
    }
    out.push_str(&cleaned[last..]);
    out
}

fn rebuild_tag(caps: &Captures<'_>) -> Option<String> {
    let closing = !caps[1].is_empty();
    let name = caps[2].to_ascii_lowercase();
    if !ALLOWED_TAGS.contains(&name.as_str()) {
        return None;
    }
    match name.as_str() {
        "br" => Some("<br>".to_string()),
        "img" if closing => None,
        "img" => {
            let src = image_source(&caps[3])?;
            Some(format!("<img src=\"{}\">", src.replace('"', "&quot;")))
        }
        _ if closing => Some(format!("</{name}>")),
        _ => Some(format!("<{name}>")),
    }
}

fn image_source(attributes: &str) -> Option<String> {
    let caps = SRC_ATTR.captures(attributes)?;
    let src = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?
        .as_str();
    let src = decode_entities(src.trim());
    let lowered = src.to_ascii_lowercase();
    if lowered.starts_with("data:image/")
        || lowered.starts_with("https://")
        || lowered.starts_with("http://")
    {
        Some(src)
    } else {
        None
    }
}

/// Converts markup into a plain-text note. Block boundaries and `<br>`
/// become newlines, list items become bullet lines, images are collected in
/// document order.
pub fn extract(markup: &str) -> Note {
    let sanitized = sanitize(markup);
    let mut text = String::with_capacity(sanitized.len());
    let mut images = Vec::new();
    let mut last = 0;
    for caps in TAG.captures_iter(&sanitized) {
        let whole = caps.get(0).expect("capture 0 always present");
        text.push_str(&decode_entities(&sanitized[last..whole.start()]));
        last = whole.end();

        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        match name.as_str() {
            "br" => text.push('\n'),
            "img" => {
                if let Some(src) = image_source(&caps[3]) {
                    images.push(src);
                }
            }
            "li" if !closing => {
                ensure_line_break(&mut text);
                text.push_str("• ");
            }
            block if BLOCK_TAGS.contains(&block) => ensure_line_break(&mut text),
            _ => {}
        }
    }
    text.push_str(&decode_entities(&sanitized[last..]));

    let text = text.trim_matches('\n').to_string();
    Note::new(text, images)
}

fn ensure_line_break(text: &mut String) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}

fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    ENTITY
        .replace_all(input, |caps: &Captures<'_>| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body
                .strip_prefix("#x")
                .or_else(|| body.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match body {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
