//! Track file scanning and identifier injection.
//!
//! Everything here is a pure function over the raw GPX text. Deciding whether
//! a file needs an identifier ([`embedded_identifier`]) and producing the
//! rewritten bytes ([`inject_identifier`]) are kept separate: injecting twice
//! would add two markers, so callers must check for an embedded marker first.

use crate::error::{CircuitIndexError, Result};
use crate::markup;
use crate::GeoPoint;
use log::debug;
use regex::Regex;
use std::sync::OnceLock;

/// Extract every track point from raw GPX text, in document order.
///
/// Attribute order inside each `<trkpt>` is irrelevant. Markers missing
/// either coordinate, or carrying one that does not parse or lies outside
/// the valid latitude/longitude range, are skipped.
///
/// # Example
/// ```
/// use circuit_index::track::parse_track;
///
/// let gpx = r#"<trkpt lat="33.80" lon="10.85"/><trkpt lon="10.86"/><trkpt lon="10.87" lat="33.81"/>"#;
/// let points = parse_track(gpx);
/// assert_eq!(points.len(), 2);
/// assert_eq!(points[1].longitude, 10.87);
/// ```
pub fn parse_track(text: &str) -> Vec<GeoPoint> {
    let spans = markup::tag_spans(text, "trkpt");
    let points: Vec<GeoPoint> = spans
        .iter()
        .filter_map(|span| {
            let lat = parse_coordinate(markup::attribute(span, "lat")?)?;
            let lon = parse_coordinate(markup::attribute(span, "lon")?)?;
            Some(GeoPoint::new(lat, lon)).filter(GeoPoint::is_valid)
        })
        .collect();

    if points.len() < spans.len() {
        debug!("Skipped {} malformed track points", spans.len() - points.len());
    }

    points
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

// ============================================================================
// Identifier Marker
// ============================================================================

/// The bracketed marker other tooling relies on, e.g. `[HW-ID:HW-1718000000000]`.
pub fn identifier_marker(id: &str) -> String {
    format!("[HW-ID:{}]", id)
}

/// Identifier already embedded in the file text, if any.
pub fn embedded_identifier(text: &str) -> Option<&str> {
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    let re = ID_RE.get_or_init(|| Regex::new(r"\[HW-ID:(HW-\d+)\]").unwrap());
    re.captures(text).and_then(|caps| caps.get(1)).map(|m| m.as_str())
}

/// Whether the text is an `HW-<digits>` identifier.
pub fn is_identifier(id: &str) -> bool {
    id.strip_prefix("HW-")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Return the file bytes with one identifier marker inserted.
///
/// The marker goes inside the link element appended to the existing
/// `<metadata>` block. Without one, a minimal metadata block carrying `name`
/// is inserted right after the `<gpx ...>` opening tag. Every original byte is
/// kept, including bytes that are not valid UTF-8.
///
/// Returns `None` when the file has neither a metadata block nor a `<gpx>`
/// root to anchor the marker to.
pub fn inject_identifier(original: &[u8], id: &str, name: &str, site_url: &str) -> Option<Vec<u8>> {
    let text = markup::offset_aligned_text(original);
    let link = format!(
        "\n    <link href=\"{}\">\n      <text>History Walk {}</text>\n    </link>",
        markup::escape_xml(site_url),
        identifier_marker(id)
    );

    let (position, insertion) = match text.find("</metadata>") {
        Some(close) => (close, format!("{}\n  ", link)),
        None => {
            let root = markup::find_tag(&text, "gpx", 0)?;
            let block = format!(
                "\n\n  <metadata>\n    <name>{}</name>\n    {}\n  </metadata>",
                markup::escape_xml(name),
                link
            );
            (root.end, block)
        }
    };

    let mut rewritten = Vec::with_capacity(original.len() + insertion.len());
    rewritten.extend_from_slice(&original[..position]);
    rewritten.extend_from_slice(insertion.as_bytes());
    rewritten.extend_from_slice(&original[position..]);
    Some(rewritten)
}

// ============================================================================
// Metadata
// ============================================================================

/// Human-readable fields pulled from a track file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub name: String,
    pub description: String,
}

/// Removes a source tool's watermark from circuit names.
#[derive(Debug, Clone)]
pub struct Branding {
    patterns: Option<(Regex, Regex)>,
}

impl Branding {
    /// Build a case-insensitive matcher for `brand`. An empty brand strips nothing.
    pub fn new(brand: &str) -> Result<Self> {
        let brand = brand.trim();
        if brand.is_empty() {
            return Ok(Self { patterns: None });
        }

        let escaped = regex::escape(brand);
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|source| CircuitIndexError::Branding {
                branding: brand.to_string(),
                source,
            })
        };
        let prefix = compile(format!(r"(?i)^{}\s*-\s*", escaped))?;
        let anywhere = compile(format!("(?i){}", escaped))?;
        Ok(Self { patterns: Some((prefix, anywhere)) })
    }

    /// Strip a leading `"<brand> - "`, then every other occurrence, then trim.
    pub fn strip(&self, name: &str) -> String {
        match &self.patterns {
            Some((prefix, anywhere)) => {
                let without_prefix = prefix.replace(name, "");
                anywhere.replace_all(&without_prefix, "").trim().to_string()
            }
            None => name.trim().to_string(),
        }
    }
}

/// Name derived from a track filename: extension dropped, underscores as spaces.
pub fn fallback_name(filename: &str) -> String {
    let stem = match filename.rfind('.') {
        Some(dot) if dot > 0 => &filename[..dot],
        _ => filename,
    };
    stem.replace('_', " ")
}

/// Extract the circuit name and description.
///
/// The name comes from the first `<name>` element with branding removed; when
/// there is none, or nothing is left after cleaning, `fallback` is used. The
/// description comes from the first `<desc>` element, defaulting to empty.
pub fn extract_metadata(text: &str, fallback: &str, branding: &Branding) -> TrackMetadata {
    let name = markup::first_element_text(text, "name")
        .map(|raw| branding.strip(&markup::decode_text(raw)))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| fallback.to_string());

    let description = markup::first_element_text(text, "desc")
        .map(markup::decode_text)
        .unwrap_or_default();

    TrackMetadata { name, description }
}
