//! Parsing of the `/status/energy-meter` document.
//!
//! The meter answers with an array of reading groups, each holding a
//! `sampledValue` list:
//!
//! ```json
//! [{"sampledValue": [{"measurand": "Current.Import", "phase": "L2", "value": "3.1"}]}]
//! ```
//!
//! Parsing never fails. Entries that can't be understood are skipped so one
//! malformed sample doesn't discard the rest of the document.

use crate::metric::{MetricKey, MetricSnapshot};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Measurand {
    #[serde(rename = "Power.Active.Import")]
    PowerActiveImport,
    #[serde(rename = "Energy.Active.Import.Register")]
    EnergyActiveImportRegister,
    #[serde(rename = "Current.Import")]
    CurrentImport,
    #[serde(rename = "Voltage")]
    Voltage,
    /// Anything newer firmware may report that we don't map.
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Phase {
    L1,
    L2,
    L3,
    #[serde(rename = "L1-N")]
    L1N,
    #[serde(rename = "L2-N")]
    L2N,
    #[serde(rename = "L3-N")]
    L3N,
    #[serde(other)]
    Unrecognized,
}

/// The meter reports values either as JSON numbers or as numeric strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Number(f64),
    Text(String),
    Other(Value),
}

impl SampleValue {
    /// Returns the value as a finite float, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            SampleValue::Number(number) => *number,
            SampleValue::Text(text) => text.trim().parse::<f64>().ok()?,
            SampleValue::Other(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SampledValue {
    pub measurand: Measurand,
    #[serde(default, deserialize_with = "lenient_phase")]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub value: Option<SampleValue>,
}

/// A phase that isn't a known string is kept as unrecognized rather than
/// rejecting the whole sample.
fn lenient_phase<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Phase>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.map(|value| Phase::deserialize(value).unwrap_or(Phase::Unrecognized)))
}

impl SampledValue {
    /// Which metric this sample feeds, if any.
    pub fn metric_key(&self) -> Option<MetricKey> {
        match (self.measurand, self.phase) {
            (Measurand::PowerActiveImport, _) => Some(MetricKey::Power),
            (Measurand::EnergyActiveImportRegister, _) => Some(MetricKey::Energy),
            (Measurand::CurrentImport, Some(Phase::L1)) => Some(MetricKey::CurrentL1),
            (Measurand::CurrentImport, Some(Phase::L2)) => Some(MetricKey::CurrentL2),
            (Measurand::CurrentImport, Some(Phase::L3)) => Some(MetricKey::CurrentL3),
            (Measurand::Voltage, Some(Phase::L1N)) => Some(MetricKey::VoltageL1),
            (Measurand::Voltage, Some(Phase::L2N)) => Some(MetricKey::VoltageL2),
            (Measurand::Voltage, Some(Phase::L3N)) => Some(MetricKey::VoltageL3),
            _ => None,
        }
    }
}

/// Builds a snapshot from a decoded meter document.
///
/// A document with nothing usable yields an empty snapshot, which is a
/// successful result and must not be confused with a failed fetch. When the
/// same metric appears more than once, the later sample wins.
pub fn parse_snapshot(document: &Value) -> MetricSnapshot {
    let mut snapshot = MetricSnapshot::new();

    let Some(groups) = document.as_array() else {
        return snapshot;
    };

    let samples = groups
        .iter()
        .filter_map(|group| group.get("sampledValue"))
        .filter_map(Value::as_array)
        .flatten();

    for sample in samples {
        let Ok(sample) = serde_json::from_value::<SampledValue>(sample.clone()) else {
            continue;
        };
        let Some(key) = sample.metric_key() else {
            continue;
        };
        if let Some(value) = sample.value.as_ref().and_then(SampleValue::as_f64) {
            snapshot.insert(key, value);
        }
    }

    snapshot
}
