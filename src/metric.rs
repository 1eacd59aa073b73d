//! The eight metrics exposed by the meter and their static display metadata.

use serde_derive::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    Power,
    Energy,
    CurrentL1,
    CurrentL2,
    CurrentL3,
    VoltageL1,
    VoltageL2,
    VoltageL3,
}

impl MetricKey {
    pub const ALL: [MetricKey; 8] = [
        MetricKey::Power,
        MetricKey::Energy,
        MetricKey::CurrentL1,
        MetricKey::CurrentL2,
        MetricKey::CurrentL3,
        MetricKey::VoltageL1,
        MetricKey::VoltageL2,
        MetricKey::VoltageL3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Power => "power",
            MetricKey::Energy => "energy",
            MetricKey::CurrentL1 => "current_l1",
            MetricKey::CurrentL2 => "current_l2",
            MetricKey::CurrentL3 => "current_l3",
            MetricKey::VoltageL1 => "voltage_l1",
            MetricKey::VoltageL2 => "voltage_l2",
            MetricKey::VoltageL3 => "voltage_l3",
        }
    }

    pub fn descriptor(&self) -> &'static MetricDescriptor {
        // DESCRIPTORS is ordered like ALL
        &DESCRIPTORS[*self as usize]
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Power,
    Energy,
    Current,
    Voltage,
}

/// How the host platform should aggregate a metric over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
    TotalIncreasing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub key: MetricKey,
    pub display_name: &'static str,
    pub unit: &'static str,
    pub device_class: DeviceClass,
    pub state_class: StateClass,
}

pub static DESCRIPTORS: [MetricDescriptor; 8] = [
    MetricDescriptor {
        key: MetricKey::Power,
        display_name: "Power Consumption",
        unit: "W",
        device_class: DeviceClass::Power,
        state_class: StateClass::Measurement,
    },
    MetricDescriptor {
        key: MetricKey::Energy,
        display_name: "Energy Total",
        unit: "Wh",
        device_class: DeviceClass::Energy,
        state_class: StateClass::TotalIncreasing,
    },
    MetricDescriptor {
        key: MetricKey::CurrentL1,
        display_name: "Current L1",
        unit: "A",
        device_class: DeviceClass::Current,
        state_class: StateClass::Measurement,
    },
    MetricDescriptor {
        key: MetricKey::CurrentL2,
        display_name: "Current L2",
        unit: "A",
        device_class: DeviceClass::Current,
        state_class: StateClass::Measurement,
    },
    MetricDescriptor {
        key: MetricKey::CurrentL3,
        display_name: "Current L3",
        unit: "A",
        device_class: DeviceClass::Current,
        state_class: StateClass::Measurement,
    },
    MetricDescriptor {
        key: MetricKey::VoltageL1,
        display_name: "Voltage L1",
        unit: "V",
        device_class: DeviceClass::Voltage,
        state_class: StateClass::Measurement,
    },
    MetricDescriptor {
        key: MetricKey::VoltageL2,
        display_name: "Voltage L2",
        unit: "V",
        device_class: DeviceClass::Voltage,
        state_class: StateClass::Measurement,
    },
    MetricDescriptor {
        key: MetricKey::VoltageL3,
        display_name: "Voltage L3",
        unit: "V",
        device_class: DeviceClass::Voltage,
        state_class: StateClass::Measurement,
    },
];

/// Metric values produced by one successful fetch.
///
/// A snapshot is always replaced as a whole; it is never merged with an older one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricSnapshot {
    values: BTreeMap<MetricKey, f64>,
}

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any earlier value for the same key.
    pub fn insert(&mut self, key: MetricKey, value: f64) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: MetricKey) -> Option<f64> {
        self.values.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKey, f64)> + '_ {
        self.values.iter().map(|(key, value)| (*key, *value))
    }
}

impl FromIterator<(MetricKey, f64)> for MetricSnapshot {
    fn from_iter<T: IntoIterator<Item = (MetricKey, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
