//! The tabular output artifact.
//!
//! One CSV file with a fixed header. Absent values are empty cells and
//! timestamps are ISO-8601 UTC at hour precision.

use crate::db::models::AirQualityRecord;
use crate::error::Result;
use crate::model::EnrichedRow;
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

pub const ARTIFACT_COLUMNS: [&str; 13] = [
    "city",
    "time",
    "pm10",
    "pm2_5",
    "carbon_monoxide",
    "nitrogen_dioxide",
    "sulphur_dioxide",
    "ozone",
    "uv_index",
    "AQI",
    "severity",
    "risk",
    "hour",
];

pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Serialize)]
struct ArtifactRow<'a> {
    city: &'a str,
    time: String,
    pm10: Option<f64>,
    pm2_5: Option<f64>,
    carbon_monoxide: Option<f64>,
    nitrogen_dioxide: Option<f64>,
    sulphur_dioxide: Option<f64>,
    ozone: Option<f64>,
    uv_index: Option<f64>,
    aqi: Option<&'static str>,
    severity: f64,
    risk: Option<&'static str>,
    hour: u32,
}

impl<'a> From<&'a EnrichedRow> for ArtifactRow<'a> {
    fn from(enriched: &'a EnrichedRow) -> Self {
        let row = &enriched.row;
        Self {
            city: &row.city,
            time: row.time.format(TIME_FORMAT).to_string(),
            pm10: row.pm10,
            pm2_5: row.pm2_5,
            carbon_monoxide: row.carbon_monoxide,
            nitrogen_dioxide: row.nitrogen_dioxide,
            sulphur_dioxide: row.sulphur_dioxide,
            ozone: row.ozone,
            uv_index: row.uv_index,
            aqi: enriched.aqi_category.map(|c| c.as_str()),
            severity: enriched.severity_score,
            risk: enriched.risk_flag.map(|r| r.as_str()),
            hour: enriched.hour,
        }
    }
}

/// Write the artifact to `path`, creating parent directories. An empty
/// slice still produces the header line.
pub fn write_artifact(path: &Path, rows: &[EnrichedRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    write_rows(file, rows)?;
    debug!(path = %path.display(), rows = rows.len(), "Wrote artifact");
    Ok(())
}

pub fn write_rows<W: Write>(writer: W, rows: &[EnrichedRow]) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);

    writer.write_record(ARTIFACT_COLUMNS)?;
    for row in rows {
        writer.serialize(ArtifactRow::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read an artifact back as load records, applying the store's column names.
pub fn read_artifact(path: &Path) -> Result<Vec<AirQualityRecord>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}
