//! Pollutant key normalization.
//!
//! Providers spell the same metric many ways (`PM2.5`, `pm25`, `pm2_5`,
//! `o3`, `uvi`). Keys are lower-cased, trimmed, and have `.`/`-` folded to
//! `_` before the alias lookup. Unknown keys come back unchanged so callers
//! can decide whether to drop them.

use crate::model::Pollutant;

const ALIASES: &[(&str, &str)] = &[
    ("pm10", "pm10"),
    ("pm25", "pm2_5"),
    ("pm2_5", "pm2_5"),
    ("co", "carbon_monoxide"),
    ("no2", "nitrogen_dioxide"),
    ("so2", "sulphur_dioxide"),
    ("o3", "ozone"),
    ("uv_index", "uv_index"),
    ("uvi", "uv_index"),
    ("uv", "uv_index"),
];

pub fn normalize(key: &str) -> String {
    let folded: String = key
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '.' || c == '-' { '_' } else { c })
        .collect();

    ALIASES
        .iter()
        .find(|(alias, _)| *alias == folded)
        .map(|(_, column)| column.to_string())
        .unwrap_or(folded)
}

/// Normalize a key and resolve it to a canonical pollutant, if it is one.
pub fn pollutant_for(key: &str) -> Option<Pollutant> {
    Pollutant::from_column(&normalize(key))
}
