//! Tolerant markup scanning.
//!
//! Track files are scanned rather than parsed. A marker with an unexpected
//! attribute order, a missing attribute or a truncated document never aborts
//! the scan; callers just get fewer results.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::ops::Range;
use std::sync::OnceLock;

/// Every opening (or self-closing) marker span for `tag`, e.g. `<trkpt lat="1" lon="2">`.
///
/// A tag name only matches when followed by whitespace, `/` or `>`, so
/// `trkpt` does not match `<trkptx>`. An unterminated final marker is dropped.
pub fn tag_spans<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    let mut spans = Vec::new();
    let mut offset = 0;

    while let Some(range) = find_tag(text, tag, offset) {
        offset = range.end;
        spans.push(&text[range]);
    }

    spans
}

/// Byte range of the first marker span for `tag` at or after `from`.
pub fn find_tag(text: &str, tag: &str, from: usize) -> Option<Range<usize>> {
    let opener = format!("<{}", tag);
    let mut offset = from;

    while let Some(found) = text.get(offset..)?.find(&opener) {
        let start = offset + found;
        let after_name = start + opener.len();

        match text[after_name..].chars().next()? {
            c if c.is_whitespace() || c == '/' || c == '>' => {
                let end = after_name + text[after_name..].find('>')? + 1;
                return Some(start..end);
            }
            _ => offset = after_name,
        }
    }

    None
}

/// First value of attribute `name` inside a marker span, single or double quoted.
///
/// The attribute name must be preceded by whitespace, so `lat` never matches
/// inside `xlat="..."`.
pub fn attribute<'a>(span: &'a str, name: &str) -> Option<&'a str> {
    let mut offset = 0;

    while let Some(found) = span[offset..].find(name) {
        let start = offset + found;
        offset = start + name.len();

        let preceded_by_space = span[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if !preceded_by_space {
            continue;
        }

        let rest = span[offset..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        let value = &rest[1..];
        if let Some(close) = value.find(quote) {
            return Some(&value[..close]);
        }
    }

    None
}

/// Raw body of the first `<tag>...</tag>` element, without decoding.
pub fn first_element_text<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)?;
    Some(&text[start..start + end])
}

/// Decode an element body: strip CDATA wrappers if any are present, otherwise
/// unescape the predefined XML entities.
pub fn decode_text(raw: &str) -> String {
    if raw.contains("<![CDATA[") {
        strip_cdata(raw).into_owned()
    } else {
        unescape_xml(raw).into_owned()
    }
}

/// Replace every `<![CDATA[...]]>` section with its content.
pub fn strip_cdata(raw: &str) -> Cow<'_, str> {
    static CDATA_RE: OnceLock<Regex> = OnceLock::new();
    let re = CDATA_RE.get_or_init(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());
    re.replace_all(raw, "$1")
}

/// Unescape `&lt;`, `&gt;`, `&amp;`, `&apos;` and `&quot;` in a single pass.
pub fn unescape_xml(text: &str) -> Cow<'_, str> {
    static ENTITY_RE: OnceLock<Regex> = OnceLock::new();
    let re = ENTITY_RE.get_or_init(|| Regex::new(r"&(lt|gt|amp|apos|quot);").unwrap());
    re.replace_all(text, |caps: &Captures| match &caps[1] {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        _ => "\"",
    })
}

/// Escape text for use inside an element body or attribute value.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Text view of raw bytes with identical byte offsets.
///
/// Each byte of an invalid UTF-8 sequence becomes a `?`, so ASCII markers
/// found in the view sit at the same offsets in the original bytes.
pub fn offset_aligned_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            let mut text = String::with_capacity(bytes.len());
            for chunk in bytes.utf8_chunks() {
                text.push_str(chunk.valid());
                text.extend(std::iter::repeat('?').take(chunk.invalid().len()));
            }
            Cow::Owned(text)
        }
    }
}
