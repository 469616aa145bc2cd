use serde_json::Value;

/// Key holding the time-indexed array block (Open-Meteo style payloads).
pub const TIME_SERIES_KEY: &str = "hourly";

/// Structural layouts recognised in raw provider payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// `hourly.time` plus parallel per-pollutant arrays.
    TimeSeries,
    /// `results[]` of locations, each with `measurements[]`.
    MeasurementListV2,
    /// `locations[]`, each with `parameters[]` and/or `measurements[]`.
    MeasurementListV3,
    /// Anything else; flattened by searching for nested measurement lists.
    Unknown,
}

/// Classify a payload by inspecting its top-level keys in priority order.
pub fn detect(payload: &Value) -> ShapeKind {
    let Some(obj) = payload.as_object() else {
        return ShapeKind::Unknown;
    };

    let has_time_series = obj
        .get(TIME_SERIES_KEY)
        .and_then(Value::as_object)
        .and_then(|block| block.get("time"))
        .and_then(Value::as_array)
        .is_some_and(|times| !times.is_empty());
    if has_time_series {
        return ShapeKind::TimeSeries;
    }

    if is_object_list(obj.get("results")) {
        return ShapeKind::MeasurementListV2;
    }

    if is_object_list(obj.get("locations")) {
        return ShapeKind::MeasurementListV3;
    }

    ShapeKind::Unknown
}

fn is_object_list(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_array)
        .is_some_and(|items| !items.is_empty() && items.iter().all(Value::is_object))
}
