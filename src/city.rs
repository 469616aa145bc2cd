//! City label resolution.
//!
//! Each candidate source is an extractor returning `Option<String>`; the
//! first present, non-blank value wins. Resolution never fails: the last
//! resort is [`UNKNOWN_CITY`].

use serde_json::Value;
use std::path::Path;

pub const UNKNOWN_CITY: &str = "Unknown";

/// Filename marker separating the city token from the extraction timestamp.
const RAW_MARKER: &str = "_raw_";

pub type Extractor = fn(&Value) -> Option<String>;

const PAYLOAD_EXTRACTORS: &[Extractor] = &[
    |p: &Value| text_field(p, "city"),
    |p: &Value| p.get("meta").and_then(|meta| text_field(meta, "city")),
    |p: &Value| first_entry(p, "results").and_then(|loc| V2_LOCATION_EXTRACTORS.first_present(loc)),
    |p: &Value| first_entry(p, "locations").and_then(|loc| V3_LOCATION_EXTRACTORS.first_present(loc)),
];

/// `results[]` entries name their city under `city`, then `location`.
pub const V2_LOCATION_EXTRACTORS: &[Extractor] =
    &[|l: &Value| text_field(l, "city"), |l: &Value| text_field(l, "location")];

/// `locations[]` entries name their city under `city`, then `name`.
pub const V3_LOCATION_EXTRACTORS: &[Extractor] =
    &[|l: &Value| text_field(l, "city"), |l: &Value| text_field(l, "name")];

pub trait FirstPresent {
    fn first_present(&self, value: &Value) -> Option<String>;
}

impl FirstPresent for [Extractor] {
    fn first_present(&self, value: &Value) -> Option<String> {
        self.iter().find_map(|extract| extract(value))
    }
}

/// Resolve the file-level city for a payload.
///
/// Precedence: explicit override, payload fields, filename, `"Unknown"`.
pub fn resolve(payload: &Value, path: &Path, explicit_override: Option<&str>) -> String {
    explicit_override
        .and_then(non_blank)
        .or_else(|| PAYLOAD_EXTRACTORS.first_present(payload))
        .or_else(|| city_from_filename(path))
        .unwrap_or_else(|| UNKNOWN_CITY.to_string())
}

/// Resolve the city for a single location entry, falling back to the
/// file-level city.
pub fn resolve_location(location: &Value, extractors: &[Extractor], file_city: &str) -> String {
    extractors
        .first_present(location)
        .unwrap_or_else(|| file_city.to_string())
}

/// Derive a city from `<city-token>_raw_<timestamp>.json`.
///
/// `new_delhi_raw_20240101.json` becomes `New Delhi`. Names without the
/// marker use their whole stem.
pub fn city_from_filename(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;

    let token = stem
        .split(RAW_MARKER)
        .next()
        .filter(|t| !t.is_empty())
        .or_else(|| stem.split('_').next().filter(|t| !t.is_empty()))?;

    let spaced = token.replace(['_', '-'], " ");
    non_blank(&title_case(&spaced))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).and_then(non_blank)
}

fn first_entry<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).and_then(Value::as_array).and_then(|items| items.first())
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
