// InfluxDB line protocol encoding
use crate::error::{DatahubError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    /// Float fields only; the stored series are all gauges.
    pub fields: BTreeMap<String, f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_key(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Empty tag values are not representable in line protocol and are dropped.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.tags.insert(key.into(), value);
        }
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn to_line(&self) -> Result<String> {
        if self.fields.is_empty() {
            return Err(DatahubError::Influx(format!(
                "point in measurement {} has no fields",
                self.measurement
            )));
        }

        // Line protocol has no literal for NaN or infinities.
        if let Some((key, value)) = self.fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(DatahubError::Influx(format!(
                "field {}={} in measurement {} is not finite",
                key, value, self.measurement
            )));
        }

        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            line.push_str(&format!(",{}={}", escape_key(key), escape_key(value)));
        }

        let fields = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", escape_key(key), value))
            .collect::<Vec<_>>()
            .join(",");
        line.push(' ');
        line.push_str(&fields);

        if let Some(timestamp) = self.timestamp {
            let nanos = timestamp.timestamp_nanos_opt().ok_or_else(|| {
                DatahubError::Influx(format!("timestamp {} out of range for nanoseconds", timestamp))
            })?;
            line.push_str(&format!(" {}", nanos));
        }

        Ok(line)
    }
}

/// Newline-separated batch body for `/write`.
pub fn encode_batch(points: &[Point]) -> Result<String> {
    let lines = points.iter().map(Point::to_line).collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}
