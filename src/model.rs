//! Domain types shared by every pipeline stage.

use chrono::{DateTime, Utc};
use std::fmt;

/// The fixed set of canonical pollutant columns, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pollutant {
    Pm10,
    Pm2_5,
    CarbonMonoxide,
    NitrogenDioxide,
    SulphurDioxide,
    Ozone,
    UvIndex,
}

impl Pollutant {
    pub const ALL: [Pollutant; 7] = [
        Pollutant::Pm10,
        Pollutant::Pm2_5,
        Pollutant::CarbonMonoxide,
        Pollutant::NitrogenDioxide,
        Pollutant::SulphurDioxide,
        Pollutant::Ozone,
        Pollutant::UvIndex,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Pollutant::Pm10 => "pm10",
            Pollutant::Pm2_5 => "pm2_5",
            Pollutant::CarbonMonoxide => "carbon_monoxide",
            Pollutant::NitrogenDioxide => "nitrogen_dioxide",
            Pollutant::SulphurDioxide => "sulphur_dioxide",
            Pollutant::Ozone => "ozone",
            Pollutant::UvIndex => "uv_index",
        }
    }

    /// Position in [`Pollutant::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.column() == name)
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A single reading pulled out of a per-measurement payload.
///
/// `time` and `value` are `None` when the source field was missing or could
/// not be coerced; the aggregator drops those tuples.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementTuple {
    pub city: String,
    pub time: Option<DateTime<Utc>>,
    pub parameter: String,
    pub value: Option<f64>,
}

/// One (city, hour) record in the fixed pollutant schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    pub city: String,
    pub time: DateTime<Utc>,
    pub pm10: Option<f64>,
    pub pm2_5: Option<f64>,
    pub carbon_monoxide: Option<f64>,
    pub nitrogen_dioxide: Option<f64>,
    pub sulphur_dioxide: Option<f64>,
    pub ozone: Option<f64>,
    pub uv_index: Option<f64>,
}

impl CanonicalRow {
    /// Row with every pollutant absent.
    pub fn empty(city: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            city: city.into(),
            time,
            pm10: None,
            pm2_5: None,
            carbon_monoxide: None,
            nitrogen_dioxide: None,
            sulphur_dioxide: None,
            ozone: None,
            uv_index: None,
        }
    }

    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        match pollutant {
            Pollutant::Pm10 => self.pm10,
            Pollutant::Pm2_5 => self.pm2_5,
            Pollutant::CarbonMonoxide => self.carbon_monoxide,
            Pollutant::NitrogenDioxide => self.nitrogen_dioxide,
            Pollutant::SulphurDioxide => self.sulphur_dioxide,
            Pollutant::Ozone => self.ozone,
            Pollutant::UvIndex => self.uv_index,
        }
    }

    pub fn set(&mut self, pollutant: Pollutant, value: Option<f64>) {
        let slot = match pollutant {
            Pollutant::Pm10 => &mut self.pm10,
            Pollutant::Pm2_5 => &mut self.pm2_5,
            Pollutant::CarbonMonoxide => &mut self.carbon_monoxide,
            Pollutant::NitrogenDioxide => &mut self.nitrogen_dioxide,
            Pollutant::SulphurDioxide => &mut self.sulphur_dioxide,
            Pollutant::Ozone => &mut self.ozone,
            Pollutant::UvIndex => &mut self.uv_index,
        };
        *slot = value;
    }

    pub fn has_any_pollutant(&self) -> bool {
        Pollutant::ALL.iter().any(|p| self.get(*p).is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AqiCategory {
    Good,
    Moderate,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskFlag {
    Low,
    Moderate,
    High,
}

impl RiskFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskFlag::Low => "Low Risk",
            RiskFlag::Moderate => "Moderate Risk",
            RiskFlag::High => "High Risk",
        }
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical row plus the derived classification fields. Terminal artifact
/// of the normalization pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRow {
    pub row: CanonicalRow,
    pub aqi_category: Option<AqiCategory>,
    pub severity_score: f64,
    pub risk_flag: Option<RiskFlag>,
    pub hour: u32,
}
