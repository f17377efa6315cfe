// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory model of a Health Auto Export payload.
//!
//! API document: <https://github.com/Lybron/health-auto-export/wiki/API-Export---JSON-Format>
//!
//! Metrics and workouts are decoded in two passes. The first pass reads the
//! known fields; the second walks the same JSON object as a generic value tree
//! and keeps whatever the first pass did not claim:
//!
//! - [`Datapoint`] keeps every extra property in [`Datapoint::fields`],
//!   coerced to a quantity, a timestamp or the raw JSON value.
//! - [`Workout`] keeps extra properties that look like `{"qty", "units"}`
//!   objects in [`Workout::fields`]. Anything else is dropped, so it is lost
//!   when the workout is encoded again.
//!
//! The exporter has shipped several incompatible layouts for sleep data.
//! [`MetricData`] holds exactly one of them, picked by trying each layout in a
//! fixed order (see [`MetricData::resolve`]).

use std::collections::BTreeMap;

use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::trace;

use crate::time::{parse_time, Time};

/// Metric name whose data may use one of the sleep layouts.
pub const SLEEP_ANALYSIS_NAME: &str = "sleep_analysis";

/// An arbitrary quantity.
pub type Qty = f64;

/// A unit of measurement, e.g. `kJ` or `count/min`.
pub type Units = String;

const DATAPOINT_KEYS: &[&str] = &["date", "qty"];

const WORKOUT_KEYS: &[&str] = &[
    "name",
    "start",
    "end",
    "route",
    "heartRateData",
    "heartRateRecovery",
    "elevation",
];

/// Root document. A payload without `data` is valid and carries nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PayloadData>,
}

impl Payload {
    pub fn metrics(&self) -> &[Metric] {
        self.data.as_ref().map_or(&[], |data| data.metrics.as_slice())
    }

    pub fn workouts(&self) -> &[Workout] {
        self.data.as_ref().map_or(&[], |data| data.workouts.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.metrics().is_empty() && self.workouts().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadData {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub metrics: Vec<Metric>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub workouts: Vec<Workout>,
}

/// A single measurement type with its time-series data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metric {
    pub name: String,
    pub units: Units,
    pub data: MetricData,
}

impl Metric {
    pub fn is_sleep_analysis(&self) -> bool {
        self.name == SLEEP_ANALYSIS_NAME
    }
}

#[derive(Deserialize)]
struct RawMetric {
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    units: Units,
    #[serde(default)]
    data: Value,
}

#[derive(Serialize)]
struct MetricRef<'a> {
    name: &'a str,
    units: &'a str,
    data: &'a MetricData,
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawMetric::deserialize(deserializer)?;
        let data = MetricData::resolve(&raw.name, &raw.data).map_err(de::Error::custom)?;
        Ok(Metric {
            name: raw.name,
            units: raw.units,
            data,
        })
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MetricRef {
            name: &self.name,
            units: &self.units,
            data: &self.data,
        }
        .serialize(serializer)
    }
}

/// The data of a metric, in exactly one of the layouts the exporter uses.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricData {
    Datapoints(Vec<Datapoint>),
    /// Non-aggregated sleep analysis ("Aggregate Sleep Data" disabled).
    SleepEvents(Vec<SleepEvent>),
    /// One summary per night ("Aggregate Sleep Data" enabled).
    AggregatedSleep(Vec<AggregatedSleep>),
}

impl Default for MetricData {
    fn default() -> Self {
        MetricData::Datapoints(Vec::new())
    }
}

impl MetricData {
    /// Decodes `data` for the metric called `name`.
    ///
    /// Sleep analysis is tried as discrete events first, then as aggregated
    /// summaries. A layout is accepted only when it decodes and its first
    /// element carries the layout's start and end timestamps. Everything else,
    /// including sleep analysis matching neither layout, decodes as plain
    /// datapoints.
    pub fn resolve(name: &str, data: &Value) -> Result<Self, serde_json::Error> {
        if data.is_null() {
            return Ok(MetricData::default());
        }

        if name == SLEEP_ANALYSIS_NAME {
            if let Ok(events) = Vec::<SleepEvent>::deserialize(data) {
                if events.first().is_some_and(SleepEvent::is_complete) {
                    return Ok(MetricData::SleepEvents(events));
                }
            }
            if let Ok(summaries) = Vec::<AggregatedSleep>::deserialize(data) {
                if summaries.first().is_some_and(AggregatedSleep::is_complete) {
                    return Ok(MetricData::AggregatedSleep(summaries));
                }
            }
            trace!("sleep analysis matched no sleep layout, decoding as datapoints");
        }

        Vec::<Datapoint>::deserialize(data).map(MetricData::Datapoints)
    }

    pub fn len(&self) -> usize {
        match self {
            MetricData::Datapoints(d) => d.len(),
            MetricData::SleepEvents(e) => e.len(),
            MetricData::AggregatedSleep(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Plain datapoints, or an empty slice for the sleep layouts.
    pub fn datapoints(&self) -> &[Datapoint] {
        match self {
            MetricData::Datapoints(d) => d,
            _ => &[],
        }
    }
}

impl Serialize for MetricData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricData::Datapoints(d) => d.serialize(serializer),
            MetricData::SleepEvents(e) if !e.is_empty() => e.serialize(serializer),
            MetricData::AggregatedSleep(a) if !a.is_empty() => a.serialize(serializer),
            // an empty sleep layout is written as empty datapoints
            _ => serializer.collect_seq(std::iter::empty::<&Datapoint>()),
        }
    }
}

/// A point-in-time value of a metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Datapoint {
    pub date: Option<Time>,
    /// Not present for every metric type.
    pub qty: Option<Qty>,
    /// Every other property of the datapoint, keyed by JSON name.
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Serialize, Deserialize)]
struct DatapointFixed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qty: Option<Qty>,
}

impl<'de> Deserialize<'de> for Datapoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let fixed = DatapointFixed::deserialize(&value).map_err(de::Error::custom)?;
        let fields = unclaimed(value, DATAPOINT_KEYS)
            .map(|(key, value)| (key, FieldValue::coerce(value)))
            .collect();
        Ok(Datapoint {
            date: fixed.date,
            qty: fixed.qty,
            fields,
        })
    }
}

impl Serialize for Datapoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fixed = DatapointFixed {
            date: self.date,
            qty: self.qty,
        };
        let extra = self
            .fields
            .iter()
            .map(|(key, value)| Ok((key.clone(), serde_json::to_value(value)?)));
        merge_flat(&fixed, DATAPOINT_KEYS, extra)
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

/// Value of an extra datapoint property after best-effort coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Quantity(QtyWithUnit),
    Time(Time),
    Raw(Value),
}

impl FieldValue {
    /// Quantity if the value is a `{"qty", "units"}` object, timestamp if it
    /// is a string in a known time format, otherwise the value unchanged.
    pub fn coerce(value: Value) -> Self {
        if value.is_object() {
            if let Ok(quantity) = QtyWithUnit::deserialize(&value) {
                return FieldValue::Quantity(quantity);
            }
        }
        if let Value::String(s) = &value {
            if let Ok(time) = parse_time(s) {
                return FieldValue::Time(time);
            }
        }
        FieldValue::Raw(value)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Quantity(q) => Some(q.qty),
            FieldValue::Raw(v) => v.as_f64(),
            FieldValue::Time(_) => None,
        }
    }

    pub fn as_time(&self) -> Option<&Time> {
        match self {
            FieldValue::Time(t) => Some(t),
            _ => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Quantity(q) => q.serialize(serializer),
            FieldValue::Time(t) => t.serialize(serializer),
            FieldValue::Raw(v) => v.serialize(serializer),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Raw(value)
    }
}

impl From<Time> for FieldValue {
    fn from(time: Time) -> Self {
        FieldValue::Time(time)
    }
}

/// A period during sleep of a given category (`value`), e.g. `Core` or `REM`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Time>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub qty: Qty,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
}

impl SleepEvent {
    pub fn is_complete(&self) -> bool {
        self.start_date.is_some() && self.end_date.is_some()
    }
}

/// An entire night of sleep.
///
/// Durations are in hours. Exporter versions from 6.6.2 report per-phase
/// durations and a single `source`; older versions report in-bed start/end
/// and separate sleep and in-bed sources. The `date` property is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedSleep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_start: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_end: Option<Time>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub in_bed: Qty,
    #[serde(default, deserialize_with = "null_as_default")]
    pub asleep: Qty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awake: Option<Qty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<Qty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep: Option<Qty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rem: Option<Qty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_bed_start: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_bed_end: Option<Time>,
    /// Multiple sources are joined with `|`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_bed_source: Option<String>,
}

impl AggregatedSleep {
    pub fn is_complete(&self) -> bool {
        self.sleep_start.is_some() && self.sleep_end.is_some()
    }
}

/// A single recorded workout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workout {
    pub name: String,
    pub start: Option<Time>,
    pub end: Option<Time>,
    pub route: Option<Vec<RouteDatapoint>>,
    pub heart_rate_data: Option<Vec<DatapointWithUnit>>,
    pub heart_rate_recovery: Option<Vec<DatapointWithUnit>>,
    pub elevation: Option<Elevation>,
    /// Other quantity properties (`stepCount`, `activeEnergy`, ...), sorted
    /// by key.
    pub fields: Vec<Field>,
}

impl Workout {
    pub fn field(&self, key: &str) -> Option<&QtyWithUnit> {
        self.fields
            .iter()
            .find(|field| field.key == key)
            .map(|field| &field.value)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkoutFixed {
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default)]
    start: Option<Time>,
    #[serde(default)]
    end: Option<Time>,
    #[serde(default)]
    route: Option<Vec<RouteDatapoint>>,
    #[serde(default)]
    heart_rate_data: Option<Vec<DatapointWithUnit>>,
    #[serde(default)]
    heart_rate_recovery: Option<Vec<DatapointWithUnit>>,
    #[serde(default)]
    elevation: Option<Elevation>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkoutFixedRef<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<&'a Time>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<&'a Time>,
    #[serde(skip_serializing_if = "Option::is_none")]
    route: Option<&'a Vec<RouteDatapoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heart_rate_data: Option<&'a Vec<DatapointWithUnit>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heart_rate_recovery: Option<&'a Vec<DatapointWithUnit>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elevation: Option<&'a Elevation>,
}

impl<'de> Deserialize<'de> for Workout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let fixed = WorkoutFixed::deserialize(&value).map_err(de::Error::custom)?;

        let mut fields: Vec<Field> = unclaimed(value, WORKOUT_KEYS)
            .filter_map(|(key, value)| {
                if !value.is_object() {
                    trace!(%key, "dropping non-object workout field");
                    return None;
                }
                match QtyWithUnit::deserialize(&value) {
                    Ok(quantity) => Some(Field {
                        key,
                        value: quantity,
                    }),
                    Err(e) => {
                        trace!(%key, "dropping workout field: {e}");
                        None
                    }
                }
            })
            .collect();
        fields.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(Workout {
            name: fixed.name,
            start: fixed.start,
            end: fixed.end,
            route: fixed.route,
            heart_rate_data: fixed.heart_rate_data,
            heart_rate_recovery: fixed.heart_rate_recovery,
            elevation: fixed.elevation,
            fields,
        })
    }
}

impl Serialize for Workout {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fixed = WorkoutFixedRef {
            name: &self.name,
            start: self.start.as_ref(),
            end: self.end.as_ref(),
            route: self.route.as_ref(),
            heart_rate_data: self.heart_rate_data.as_ref(),
            heart_rate_recovery: self.heart_rate_recovery.as_ref(),
            elevation: self.elevation.as_ref(),
        };
        let extra = self
            .fields
            .iter()
            .map(|field| Ok((field.key.clone(), serde_json::to_value(&field.value)?)));
        merge_flat(&fixed, WORKOUT_KEYS, extra)
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

/// A named quantity property of a workout.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: QtyWithUnit,
}

impl Field {
    pub fn new(key: impl Into<String>, qty: Qty, units: impl Into<Units>) -> Self {
        Self {
            key: key.into(),
            value: QtyWithUnit {
                qty,
                units: units.into(),
            },
        }
    }
}

/// A quantity with its unit of measurement.
///
/// Decoding is strict about extra properties so that unrelated objects are not
/// mistaken for quantities. Missing properties are zero values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QtyWithUnit {
    #[serde(default, deserialize_with = "null_as_default")]
    pub qty: Qty,
    #[serde(default, deserialize_with = "null_as_default")]
    pub units: Units,
}

/// A point-in-time quantity, e.g. a heart rate sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatapointWithUnit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<Time>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub qty: Qty,
    #[serde(default, deserialize_with = "null_as_default")]
    pub units: Units,
}

/// A point-in-time location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteDatapoint {
    #[serde(default, deserialize_with = "null_as_default")]
    pub lat: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub lon: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub altitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Time>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Elevation {
    #[serde(default, deserialize_with = "null_as_default")]
    pub units: Units,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ascent: Qty,
    #[serde(default, deserialize_with = "null_as_default")]
    pub descent: Qty,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Properties of a JSON object not named in `claimed`.
fn unclaimed(value: Value, claimed: &'static [&'static str]) -> impl Iterator<Item = (String, Value)> {
    let map = match value {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.into_iter()
        .filter(move |(key, _)| !claimed.contains(&key.as_str()))
}

/// Writes `extra` and the fields of `fixed` into one flat object. Extra keys
/// named in `claimed` are skipped, so fixed fields always win.
fn merge_flat<F, I>(
    fixed: &F,
    claimed: &[&str],
    extra: I,
) -> Result<Map<String, Value>, serde_json::Error>
where
    F: Serialize,
    I: Iterator<Item = Result<(String, Value), serde_json::Error>>,
{
    let mut merged = Map::new();
    for entry in extra {
        let (key, value) = entry?;
        if !claimed.contains(&key.as_str()) {
            merged.insert(key, value);
        }
    }
    if let Value::Object(fixed) = serde_json::to_value(fixed)? {
        merged.extend(fixed);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn time(s: &str) -> Time {
        parse_time(s).expect("valid time")
    }

    #[test]
    fn test_sleep_events_resolve() {
        let data = json!([
            {
                "startDate": "2021-12-18 02:21:06 +0800",
                "endDate": "2021-12-18 03:01:06 +0800",
                "qty": 0.66,
                "source": "Watch",
                "value": "Core"
            }
        ]);
        let resolved = MetricData::resolve(SLEEP_ANALYSIS_NAME, &data).unwrap();
        let MetricData::SleepEvents(events) = resolved else {
            panic!("expected sleep events, got {resolved:?}");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].value, "Core");
        assert_eq!(events[0].start_date, Some(time("2021-12-18 02:21:06 +0800")));
    }

    #[test]
    fn test_aggregated_sleep_resolve_both_generations() {
        let data = json!([
            {
                "date": "2021-12-18 09:03:36 +0800",
                "asleep": 6.1,
                "sleepStart": "2021-12-18 02:21:06 +0800",
                "sleepEnd": "2021-12-18 08:57:06 +0800",
                "sleepSource": "Watch",
                "inBed": 6.8,
                "inBedStart": "2021-12-18 02:12:50 +0800",
                "inBedEnd": "2021-12-18 09:04:45 +0800",
                "inBedSource": "iPhone"
            },
            {
                "date": "2021-12-19 00:00:00 +0800",
                "sleepStart": "2021-12-19 01:00:00 +0800",
                "sleepEnd": "2021-12-19 07:00:00 +0800",
                "inBed": 6.5,
                "asleep": 6.0,
                "awake": 0.5,
                "core": 3.0,
                "deep": 1.5,
                "rem": 1.5,
                "source": "Watch|iPhone"
            }
        ]);
        let resolved = MetricData::resolve(SLEEP_ANALYSIS_NAME, &data).unwrap();
        let MetricData::AggregatedSleep(nights) = resolved else {
            panic!("expected aggregated sleep, got {resolved:?}");
        };
        assert_eq!(nights[0].sleep_source.as_deref(), Some("Watch"));
        assert_eq!(nights[0].in_bed_source.as_deref(), Some("iPhone"));
        assert_eq!(nights[0].rem, None);
        assert_eq!(nights[1].source.as_deref(), Some("Watch|iPhone"));
        assert_eq!(nights[1].rem, Some(1.5));
    }

    #[test]
    fn test_incomplete_sleep_falls_back_to_datapoints() {
        // first element lacks endDate, so the list is not sleep events
        let data = json!([
            {"startDate": "2021-12-18 02:21:06 +0800", "qty": 1},
            {"startDate": "2021-12-18 03:00:00 +0800", "qty": 2}
        ]);
        let resolved = MetricData::resolve(SLEEP_ANALYSIS_NAME, &data).unwrap();
        let MetricData::Datapoints(points) = resolved else {
            panic!("expected datapoints, got {resolved:?}");
        };
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].qty, Some(2.0));
        assert_eq!(
            points[1].fields.get("startDate"),
            Some(&FieldValue::Time(time("2021-12-18 03:00:00 +0800")))
        );
    }

    #[test]
    fn test_sleep_layouts_only_apply_to_sleep_analysis() {
        let data = json!([
            {"startDate": "2021-12-18 02:21:06 +0800", "endDate": "2021-12-18 03:00:00 +0800", "qty": 1}
        ]);
        let resolved = MetricData::resolve("mindful_minutes", &data).unwrap();
        assert!(matches!(resolved, MetricData::Datapoints(_)));
    }

    #[test]
    fn test_empty_and_null_data() {
        assert_eq!(
            MetricData::resolve(SLEEP_ANALYSIS_NAME, &json!([])).unwrap(),
            MetricData::Datapoints(vec![])
        );
        assert_eq!(
            MetricData::resolve("active_energy", &Value::Null).unwrap(),
            MetricData::Datapoints(vec![])
        );
    }

    #[test]
    fn test_empty_sleep_layout_encodes_as_empty_datapoints() {
        let metric = Metric {
            name: SLEEP_ANALYSIS_NAME.to_string(),
            units: "hr".to_string(),
            data: MetricData::SleepEvents(vec![]),
        };
        assert_eq!(
            serde_json::to_value(&metric).unwrap(),
            json!({"name": "sleep_analysis", "units": "hr", "data": []})
        );
    }

    #[test]
    fn test_datapoint_field_coercion() {
        let point: Datapoint = serde_json::from_value(json!({
            "date": "2021-12-18 09:03:36 +0800",
            "Avg": 61.5,
            "source": "iPhone",
            "sleepStart": "2021-12-18 02:21:06 +0800",
            "nested": {"qty": 3, "units": "count"},
            "other": {"qty": 3, "extra": true},
            "flag": null
        }))
        .unwrap();

        assert_eq!(point.qty, None);
        assert_eq!(point.fields.len(), 6);
        assert_eq!(point.fields["Avg"].as_f64(), Some(61.5));
        assert_eq!(point.fields["source"], FieldValue::Raw(json!("iPhone")));
        assert_eq!(
            point.fields["sleepStart"].as_time(),
            Some(&time("2021-12-18 02:21:06 +0800"))
        );
        assert_eq!(
            point.fields["nested"],
            FieldValue::Quantity(QtyWithUnit {
                qty: 3.0,
                units: "count".to_string()
            })
        );
        assert_eq!(
            point.fields["other"],
            FieldValue::Raw(json!({"qty": 3, "extra": true}))
        );
        assert_eq!(point.fields["flag"], FieldValue::Raw(Value::Null));
    }

    #[test]
    fn test_datapoint_fixed_fields_win_on_encode() {
        let mut point = Datapoint {
            date: Some(time("2021-12-24 00:04:00 +0800")),
            qty: Some(1.5),
            fields: BTreeMap::new(),
        };
        point.fields.insert("qty".to_string(), json!(99).into());
        point.fields.insert("source".to_string(), json!("Watch").into());

        assert_eq!(
            serde_json::to_value(&point).unwrap(),
            json!({"date": "2021-12-24 00:04:00 +0800", "qty": 1.5, "source": "Watch"})
        );
    }

    #[test]
    fn test_datapoint_bad_date_is_an_error() {
        let err = serde_json::from_value::<Datapoint>(json!({"date": "yesterday", "qty": 1}))
            .unwrap_err();
        assert!(err.to_string().contains("failed to parse time"));
    }

    #[test]
    fn test_workout_fields() {
        let workout: Workout = serde_json::from_value(json!({
            "name": "Walking",
            "start": "2021-12-24 08:02:43 +0800",
            "end": "2021-12-24 08:21:53 +0800",
            "stepCount": {"qty": 908, "units": "steps"},
            "activeEnergy": {"qty": 226.2, "units": "kJ"},
            "intensity": {"qty": 4.1, "units": "kcal/hr·kg", "source": "Watch"},
            "location": "Outdoor",
            "isIndoor": false,
            "elevation": {"units": "m", "ascent": 16.36, "descent": 0}
        }))
        .unwrap();

        let keys: Vec<&str> = workout.fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["activeEnergy", "stepCount"]);
        assert_eq!(workout.field("stepCount").map(|q| q.qty), Some(908.0));
        assert_eq!(workout.elevation.as_ref().map(|e| e.ascent), Some(16.36));
    }

    #[test]
    fn test_workout_field_missing_qty_is_zero() {
        let workout: Workout = serde_json::from_value(json!({
            "name": "Swimming",
            "lapLength": {"units": "m"},
            "strokes": {"qty": null, "units": "count"}
        }))
        .unwrap();

        assert_eq!(
            workout.field("lapLength"),
            Some(&QtyWithUnit {
                qty: 0.0,
                units: "m".to_string()
            })
        );
        assert_eq!(workout.field("strokes").map(|q| q.qty), Some(0.0));
    }

    #[test]
    fn test_metric_without_name_decodes_as_datapoints() {
        let metric: Metric = serde_json::from_value(json!({
            "units": "kJ",
            "data": [{"qty": 3, "date": "2021-12-24 00:04:00 +0800"}]
        }))
        .unwrap();
        assert_eq!(metric.name, "");
        assert_eq!(metric.data.datapoints().len(), 1);

        let metric: Metric = serde_json::from_value(json!({"name": null, "units": "kJ"})).unwrap();
        assert_eq!(metric.name, "");
        assert!(metric.data.is_empty());
    }

    #[test]
    fn test_workout_encode_is_flat_and_fixed_fields_win() {
        let workout = Workout {
            name: "Walking".to_string(),
            fields: vec![
                Field::new("name", 1.0, "oops"),
                Field::new("stepCount", 908.0, "steps"),
            ],
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&workout).unwrap(),
            json!({"name": "Walking", "stepCount": {"qty": 908.0, "units": "steps"}})
        );
    }

    #[test]
    fn test_workout_wrong_type_for_known_field() {
        let err = serde_json::from_value::<Workout>(json!({"name": "Run", "route": "nowhere"}))
            .unwrap_err();
        assert!(err.to_string().contains("invalid type"));
    }

    #[test]
    fn test_payload_accessors() {
        let payload = Payload::default();
        assert!(payload.is_empty());
        assert!(payload.metrics().is_empty());

        let payload = Payload {
            data: Some(PayloadData {
                metrics: vec![Metric::default()],
                workouts: vec![],
            }),
        };
        assert!(!payload.is_empty());
        assert_eq!(payload.metrics().len(), 1);
    }
}
