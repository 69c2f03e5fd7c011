use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One decoded telemetry response covering every monitored device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Application-level errors reported by the server, empty when healthy
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub data: DeviceMap,
}

impl TelemetrySnapshot {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// One GPU's utilization history as served by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceSample {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub engine_usage_timeseries: Vec<f64>,
    #[serde(default)]
    pub memory_usage_timeseries: Vec<f64>,
    /// Total VRAM in MB
    #[serde(rename = "memory", default, skip_serializing_if = "Option::is_none")]
    pub memory_total_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
}

impl DeviceSample {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            engine_usage_timeseries: Vec::new(),
            memory_usage_timeseries: Vec::new(),
            memory_total_mb: None,
            driver: None,
        }
    }

    pub fn with_series(mut self, engine: Vec<f64>, memory: Vec<f64>) -> Self {
        self.engine_usage_timeseries = engine;
        self.memory_usage_timeseries = memory;
        self
    }
}

/// Device samples keyed by device identifier, kept in wire order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceMap {
    entries: Vec<(String, DeviceSample)>,
}

impl DeviceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the sample stored under `key`. A replaced entry keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, sample: DeviceSample) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = sample,
            None => self.entries.push((key, sample)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&DeviceSample> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, sample)| sample)
    }

    pub fn first(&self) -> Option<&DeviceSample> {
        self.entries.first().map(|(_, sample)| sample)
    }

    pub fn samples(&self) -> impl Iterator<Item = &DeviceSample> {
        self.entries.iter().map(|(_, sample)| sample)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, DeviceSample)> for DeviceMap {
    fn from_iter<I: IntoIterator<Item = (String, DeviceSample)>>(iter: I) -> Self {
        let mut map = DeviceMap::new();
        for (key, sample) in iter {
            map.insert(key, sample);
        }
        map
    }
}

impl Serialize for DeviceMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, sample) in &self.entries {
            map.serialize_entry(key, sample)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DeviceMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DeviceMapVisitor;

        impl<'de> Visitor<'de> for DeviceMapVisitor {
            type Value = DeviceMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of device samples keyed by device id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DeviceMap, A::Error> {
                let mut map = DeviceMap::new();
                while let Some((key, sample)) = access.next_entry::<String, DeviceSample>()? {
                    map.insert(key, sample);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(DeviceMapVisitor)
    }
}

/// Backends in the wild send the device id either as a string or as an integer.
fn id_from_string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Float(f64),
    }

    match RawId::deserialize(deserializer) {
        Ok(RawId::Text(s)) => Ok(s),
        Ok(RawId::Int(n)) => Ok(n.to_string()),
        Ok(RawId::Float(n)) => Ok(n.to_string()),
        Err(_) => Err(de::Error::custom("device id must be a string or a number")),
    }
}

/// One line on a chart: a device and one utilization dimension.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartSeries {
    pub label: String,
    pub data: Vec<f64>,
    pub border_width: u16,
}

/// Replaceable content of one chart.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChartData {
    /// X-axis positions, relative sample indices rather than timestamps
    pub labels: Vec<usize>,
    pub datasets: Vec<ChartSeries>,
}

impl ChartData {
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Both charts as produced by one poll cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartFrame {
    pub engine: ChartData,
    pub memory: ChartData,
    pub projected_at: DateTime<Utc>,
}

impl ChartFrame {
    pub fn device_count(&self) -> usize {
        self.engine.datasets.len()
    }
}
