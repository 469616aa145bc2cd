use crate::model::EnrichedRow;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::FromRow;

/// Values bound per row by a multi-row insert.
pub const BINDS_PER_ROW: usize = 13;

/// One row of the target table.
///
/// Deserializes from the CSV artifact, where `AQI`, `severity` and `risk`
/// are renamed to the store's column names.
#[derive(Debug, Clone, PartialEq, Deserialize, FromRow)]
pub struct AirQualityRecord {
    pub city: String,
    pub time: DateTime<Utc>,

    pub pm10: Option<f64>,
    pub pm2_5: Option<f64>,
    pub carbon_monoxide: Option<f64>,
    pub nitrogen_dioxide: Option<f64>,
    pub sulphur_dioxide: Option<f64>,
    pub ozone: Option<f64>,
    pub uv_index: Option<f64>,

    #[serde(rename = "AQI")]
    pub aqi_category: Option<String>,
    #[serde(rename = "severity")]
    pub severity_score: f64,
    #[serde(rename = "risk")]
    pub risk_flag: Option<String>,
    pub hour: i32,
}

impl From<&EnrichedRow> for AirQualityRecord {
    fn from(enriched: &EnrichedRow) -> Self {
        let row = &enriched.row;
        Self {
            city: row.city.clone(),
            time: row.time,
            pm10: row.pm10,
            pm2_5: row.pm2_5,
            carbon_monoxide: row.carbon_monoxide,
            nitrogen_dioxide: row.nitrogen_dioxide,
            sulphur_dioxide: row.sulphur_dioxide,
            ozone: row.ozone,
            uv_index: row.uv_index,
            aqi_category: enriched.aqi_category.map(|c| c.to_string()),
            severity_score: enriched.severity_score,
            risk_flag: enriched.risk_flag.map(|r| r.to_string()),
            hour: enriched.hour as i32,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub total_rows: usize,
    pub inserted_rows: usize,
    pub failed_rows: usize,
    pub failed_batches: usize,
}

impl LoadSummary {
    pub fn is_complete(&self) -> bool {
        self.failed_rows == 0
    }
}
