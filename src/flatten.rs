//! Per-shape flattening of raw payloads.
//!
//! Time-series blocks become wide rows directly; every other shape becomes
//! [`MeasurementTuple`]s that still need hourly aggregation. Nothing in here
//! returns an error: unusable entries are skipped or carried as `None`.

use crate::aggregate::floor_to_hour;
use crate::city::{self, V2_LOCATION_EXTRACTORS, V3_LOCATION_EXTRACTORS};
use crate::model::{CanonicalRow, MeasurementTuple, Pollutant};
use crate::params::pollutant_for;
use crate::shape::{ShapeKind, TIME_SERIES_KEY};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::debug;

/// Timestamp fields tried in order on a measurement entry.
const TIME_FIELDS: &[&[&str]] = &[
    &["lastUpdated"],
    &["date", "utc"],
    &["date"],
    &["lastUpdatedAt"],
    &["datetime", "utc"],
];

const PARAMETER_FIELDS: &[&str] = &["parameter", "param", "name"];

/// Value fields for measurement entries.
const MEASUREMENT_VALUE_FIELDS: &[&str] = &["value"];

/// v3 `parameters[]` entries report their latest reading as `lastValue`.
const PARAMETER_VALUE_FIELDS: &[&str] = &["lastValue", "value"];

/// Keys whose array values hold leaf measurements in unrecognised payloads.
const NESTED_LIST_KEYS: &[&str] = &["measurements", "values"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

#[derive(Debug, Clone, PartialEq)]
pub enum Flattened {
    /// Hour-floored wide rows, one per parseable time-series index.
    Rows(Vec<CanonicalRow>),
    /// Raw readings awaiting aggregation.
    Tuples(Vec<MeasurementTuple>),
}

impl Flattened {
    pub fn len(&self) -> usize {
        match self {
            Flattened::Rows(rows) => rows.len(),
            Flattened::Tuples(tuples) => tuples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn flatten(payload: &Value, shape: ShapeKind, city: &str) -> Flattened {
    match shape {
        ShapeKind::TimeSeries => Flattened::Rows(time_series_rows(payload, city)),
        ShapeKind::MeasurementListV2 => Flattened::Tuples(results_tuples(payload, city)),
        ShapeKind::MeasurementListV3 => Flattened::Tuples(locations_tuples(payload, city)),
        ShapeKind::Unknown => Flattened::Tuples(nested_tuples(payload, city)),
    }
}

/// One row per entry of `hourly.time`. Entries whose timestamp cannot be
/// parsed are dropped.
pub fn time_series_rows(payload: &Value, city: &str) -> Vec<CanonicalRow> {
    let Some(block) = payload.get(TIME_SERIES_KEY).and_then(Value::as_object) else {
        return Vec::new();
    };
    let Some(times) = block.get("time").and_then(Value::as_array) else {
        return Vec::new();
    };

    let columns: Vec<(Pollutant, &Vec<Value>)> = Pollutant::ALL
        .into_iter()
        .filter_map(|p| series_for(block, p).map(|series| (p, series)))
        .collect();

    let mut rows = Vec::with_capacity(times.len());
    for (i, raw_time) in times.iter().enumerate() {
        let Some(time) = parse_time_value(raw_time) else {
            debug!("Dropping time-series index {} with unparseable time {}", i, raw_time);
            continue;
        };

        let mut row = CanonicalRow::empty(city, floor_to_hour(time));
        for (pollutant, series) in &columns {
            row.set(*pollutant, series.get(i).and_then(coerce_number));
        }
        rows.push(row);
    }
    rows
}

/// Array for a pollutant: the canonical key if present, otherwise the first
/// key (in map order) that normalizes to it.
fn series_for(block: &Map<String, Value>, pollutant: Pollutant) -> Option<&Vec<Value>> {
    block
        .get(pollutant.column())
        .and_then(Value::as_array)
        .or_else(|| {
            block
                .iter()
                .filter(|(key, value)| key.as_str() != "time" && value.is_array())
                .find(|(key, _)| pollutant_for(key) == Some(pollutant))
                .and_then(|(_, value)| value.as_array())
        })
}

fn results_tuples(payload: &Value, file_city: &str) -> Vec<MeasurementTuple> {
    let mut tuples = Vec::new();
    for location in array_at(payload, "results") {
        let city = city::resolve_location(location, V2_LOCATION_EXTRACTORS, file_city);
        for entry in array_at(location, "measurements") {
            tuples.extend(measurement_tuple(entry, &city, MEASUREMENT_VALUE_FIELDS, None));
        }
    }
    tuples
}

fn locations_tuples(payload: &Value, file_city: &str) -> Vec<MeasurementTuple> {
    let mut tuples = Vec::new();
    for location in array_at(payload, "locations") {
        let city = city::resolve_location(location, V3_LOCATION_EXTRACTORS, file_city);
        let location_time = location.get("lastUpdated");

        for entry in array_at(location, "parameters") {
            tuples.extend(measurement_tuple(entry, &city, PARAMETER_VALUE_FIELDS, location_time));
        }
        for entry in array_at(location, "measurements") {
            tuples.extend(measurement_tuple(entry, &city, MEASUREMENT_VALUE_FIELDS, None));
        }
    }
    tuples
}

fn nested_tuples(payload: &Value, city: &str) -> Vec<MeasurementTuple> {
    let mut leaves = Vec::new();
    collect_nested_measurements(payload, &mut leaves);
    leaves
        .into_iter()
        .filter_map(|entry| measurement_tuple(entry, city, MEASUREMENT_VALUE_FIELDS, None))
        .collect()
}

/// Walk the document collecting elements of any array stored under a
/// `measurements` or `values` key. Matched arrays are not descended into.
fn collect_nested_measurements<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let is_list_key = NESTED_LIST_KEYS.iter().any(|k| key.eq_ignore_ascii_case(k));
                match child.as_array() {
                    Some(items) if is_list_key => out.extend(items.iter()),
                    _ => collect_nested_measurements(child, out),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_nested_measurements(item, out);
            }
        }
        _ => {}
    }
}

/// Build a tuple from one measurement entry. Entries that are not objects or
/// carry no parameter name are skipped; missing time/value become `None`.
fn measurement_tuple(
    entry: &Value,
    city: &str,
    value_fields: &[&str],
    fallback_time: Option<&Value>,
) -> Option<MeasurementTuple> {
    let obj = entry.as_object()?;
    let parameter = parameter_name(obj)?;

    let value = value_fields
        .iter()
        .find_map(|field| obj.get(*field))
        .and_then(coerce_number);

    let time = TIME_FIELDS
        .iter()
        .find_map(|path| lookup(entry, path).filter(|v| is_time_candidate(v)))
        .or_else(|| fallback_time.filter(|v| is_time_candidate(v)))
        .and_then(parse_time_value);

    Some(MeasurementTuple {
        city: city.to_string(),
        time,
        parameter,
        value,
    })
}

fn parameter_name(obj: &Map<String, Value>) -> Option<String> {
    PARAMETER_FIELDS.iter().find_map(|field| match obj.get(*field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(nested) => nested.get("name").and_then(Value::as_str).map(str::to_string),
        _ => None,
    })
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

fn is_time_candidate(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(_) => true,
        _ => false,
    }
}

fn array_at<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Coerce a JSON scalar to a finite number. Numeric strings are accepted.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Strings go through [`parse_timestamp`]; integers are Unix seconds.
pub fn parse_time_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

/// Best-effort timestamp parsing. Zoned inputs are converted to UTC; naive
/// inputs are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(Utc.from_utc_datetime(&naive));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = utc("2024-01-15T14:30:00Z");
        assert_eq!(parse_timestamp("2024-01-15T14:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15T20:00:00+05:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15T14:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15 14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15T14:30:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15T14:30:00+0000"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-01-15"),
            Some(utc("2024-01-15T00:00:00Z"))
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-45T99:00"), None);
    }

    #[test]
    fn test_parse_time_value_epoch() {
        assert_eq!(
            parse_time_value(&json!(1704067200)),
            Some(utc("2024-01-01T00:00:00Z"))
        );
        assert_eq!(parse_time_value(&json!(null)), None);
        assert_eq!(parse_time_value(&json!({"utc": "2024-01-01"})), None);
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(&json!(12)), Some(12.0));
        assert_eq!(coerce_number(&json!(" 4.5 ")), Some(4.5));
        assert_eq!(coerce_number(&json!("n/a")), None);
        assert_eq!(coerce_number(&json!("NaN")), None);
        assert_eq!(coerce_number(&json!(null)), None);
        assert_eq!(coerce_number(&json!([1])), None);
    }

    #[test]
    fn test_time_series_rows() {
        let payload = json!({
            "hourly": {
                "time": ["2024-01-01T00:00", "garbage", "2024-01-01T02:30"],
                "pm25": [10, 20, 30],
                "pm10": [1, 2],
                "carbon_monoxide": ["5.5", null, "x"],
                "temperature_2m": [0, 0, 0]
            }
        });

        let rows = time_series_rows(&payload, "Delhi");
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].time, utc("2024-01-01T00:00:00Z"));
        assert_eq!(rows[0].pm2_5, Some(10.0));
        assert_eq!(rows[0].pm10, Some(1.0));
        assert_eq!(rows[0].carbon_monoxide, Some(5.5));
        assert_eq!(rows[0].ozone, None);

        assert_eq!(rows[1].time, utc("2024-01-01T02:00:00Z"));
        assert_eq!(rows[1].pm2_5, Some(30.0));
        assert_eq!(rows[1].pm10, None);
        assert_eq!(rows[1].carbon_monoxide, None);
        assert!(rows.iter().all(|r| r.city == "Delhi"));
    }

    #[test]
    fn test_canonical_key_preferred_over_alias() {
        let payload = json!({
            "hourly": {
                "time": ["2024-01-01T00:00"],
                "pm2_5": [7],
                "pm25": [99]
            }
        });
        let rows = time_series_rows(&payload, "X");
        assert_eq!(rows[0].pm2_5, Some(7.0));
    }

    #[test]
    fn test_results_tuples_use_location_city() {
        let payload = json!({
            "results": [
                {
                    "city": "Paris",
                    "measurements": [
                        {"parameter": "pm25", "value": 10, "lastUpdated": "2024-01-01T00:10:00Z"},
                        {"parameter": "o3", "value": "bad", "date": {"utc": "2024-01-01T00:20:00Z"}}
                    ]
                },
                {
                    "measurements": [{"param": "no2", "value": 3, "date": "2024-01-01T05:00:00Z"}]
                }
            ]
        });

        let Flattened::Tuples(tuples) = flatten(&payload, ShapeKind::MeasurementListV2, "File City")
        else {
            panic!("expected tuples");
        };
        assert_eq!(tuples.len(), 3);
        assert_eq!(tuples[0].city, "Paris");
        assert_eq!(tuples[0].value, Some(10.0));
        assert_eq!(tuples[1].value, None);
        assert_eq!(tuples[1].time, Some(utc("2024-01-01T00:20:00Z")));
        assert_eq!(tuples[2].city, "File City");
        assert_eq!(tuples[2].parameter, "no2");
    }

    #[test]
    fn test_locations_tuples_parameters_and_measurements() {
        let payload = json!({
            "locations": [{
                "name": "Ikeja",
                "lastUpdated": "2024-03-01T10:45:00Z",
                "parameters": [
                    {"parameter": "pm25", "lastValue": 40, "value": 1},
                    {"name": "pm10", "value": 80, "lastUpdatedAt": "2024-03-01T09:15:00Z"},
                    {"parameter": {"id": 2, "name": "so2"}, "lastValue": 6}
                ],
                "measurements": [
                    {"parameter": "co", "value": 0.4, "lastUpdated": "2024-03-01T10:05:00Z"}
                ]
            }]
        });

        let Flattened::Tuples(tuples) = flatten(&payload, ShapeKind::MeasurementListV3, "Lagos")
        else {
            panic!("expected tuples");
        };
        assert_eq!(tuples.len(), 4);
        assert!(tuples.iter().all(|t| t.city == "Ikeja"));
        assert_eq!(tuples[0].value, Some(40.0));
        assert_eq!(tuples[0].time, Some(utc("2024-03-01T10:45:00Z")));
        assert_eq!(tuples[1].time, Some(utc("2024-03-01T09:15:00Z")));
        assert_eq!(tuples[2].parameter, "so2");
        assert_eq!(tuples[3].parameter, "co");
    }

    #[test]
    fn test_nested_search_for_unknown_shape() {
        let payload = json!({
            "data": {
                "station": {
                    "Measurements": [
                        {"parameter": "pm10", "value": 12, "date": "2024-01-01T03:00:00Z"},
                        "not an object"
                    ]
                },
                "series": [{"values": [{"name": "uvi", "value": 2, "lastUpdated": "2024-01-01T03:30:00Z"}]}]
            }
        });

        let Flattened::Tuples(tuples) = flatten(&payload, ShapeKind::Unknown, "Oslo") else {
            panic!("expected tuples");
        };
        assert_eq!(tuples.len(), 2);
        assert!(tuples.iter().all(|t| t.city == "Oslo"));
        let params: Vec<_> = tuples.iter().map(|t| t.parameter.as_str()).collect();
        assert!(params.contains(&"pm10"));
        assert!(params.contains(&"uvi"));
    }

    #[test]
    fn test_unknown_shape_without_measurements_is_empty() {
        let flattened = flatten(&json!({"foo": [1, 2, 3]}), ShapeKind::Unknown, "Oslo");
        assert!(flattened.is_empty());
        assert!(flatten(&json!("just a string"), ShapeKind::Unknown, "Oslo").is_empty());
    }
}
