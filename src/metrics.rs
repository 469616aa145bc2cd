//! Derived air-quality classification fields.

use crate::model::{AqiCategory, CanonicalRow, EnrichedRow, Pollutant, RiskFlag};
use chrono::{DateTime, Timelike, Utc};

/// Severity weight per pollutant. UV index does not contribute.
const SEVERITY_WEIGHTS: &[(Pollutant, f64)] = &[
    (Pollutant::Pm2_5, 5.0),
    (Pollutant::Pm10, 3.0),
    (Pollutant::NitrogenDioxide, 4.0),
    (Pollutant::SulphurDioxide, 4.0),
    (Pollutant::CarbonMonoxide, 2.0),
    (Pollutant::Ozone, 3.0),
];

const HIGH_RISK_ABOVE: f64 = 400.0;
const MODERATE_RISK_ABOVE: f64 = 200.0;

/// PM2.5 band lookup; each band includes its upper bound.
pub fn aqi_category(pm2_5: Option<f64>) -> Option<AqiCategory> {
    let pm = pm2_5.filter(|v| v.is_finite())?;
    let category = if pm <= 50.0 {
        AqiCategory::Good
    } else if pm <= 100.0 {
        AqiCategory::Moderate
    } else if pm <= 200.0 {
        AqiCategory::Unhealthy
    } else if pm <= 300.0 {
        AqiCategory::VeryUnhealthy
    } else {
        AqiCategory::Hazardous
    };
    Some(category)
}

/// Weighted pollutant sum. Absent pollutants count as zero and negative
/// sensor readings are clamped to zero. A sum that overflows saturates at
/// `f64::MAX`, so the score is always finite and non-negative.
pub fn severity_score(row: &CanonicalRow) -> f64 {
    SEVERITY_WEIGHTS
        .iter()
        .map(|(pollutant, weight)| {
            let value = row.get(*pollutant).filter(|v| v.is_finite()).unwrap_or(0.0);
            value.max(0.0) * weight
        })
        .sum::<f64>()
        .min(f64::MAX)
}

/// Returns `None` only for a non-finite score.
pub fn risk_flag(severity: f64) -> Option<RiskFlag> {
    if !severity.is_finite() {
        return None;
    }
    Some(if severity > HIGH_RISK_ABOVE {
        RiskFlag::High
    } else if severity > MODERATE_RISK_ABOVE {
        RiskFlag::Moderate
    } else {
        RiskFlag::Low
    })
}

pub fn hour_of_day(time: DateTime<Utc>) -> u32 {
    time.hour()
}

pub fn enrich(row: CanonicalRow) -> EnrichedRow {
    let severity = severity_score(&row);
    EnrichedRow {
        aqi_category: aqi_category(row.pm2_5),
        severity_score: severity,
        risk_flag: risk_flag(severity),
        hour: hour_of_day(row.time),
        row,
    }
}
