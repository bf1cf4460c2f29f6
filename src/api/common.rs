// Wire shapes shared by all metric requests and responses
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        Self {
            seconds: time.timestamp(),
            nanos: time.timestamp_subsec_nanos() as i32,
        }
    }

    /// `None` when the fields do not describe a representable instant.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let nanos = u32::try_from(self.nanos).ok().filter(|n| *n < 1_000_000_000)?;
        DateTime::from_timestamp(self.seconds, nanos)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Duration {
    pub seconds: i64,
    pub nanos: i32,
}

impl Duration {
    #[cfg(test)]
    pub fn from_secs(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    /// `None` for negative or malformed durations.
    pub fn to_std(&self) -> Option<std::time::Duration> {
        let seconds = u64::try_from(self.seconds).ok()?;
        let nanos = u32::try_from(self.nanos).ok().filter(|n| *n < 1_000_000_000)?;
        Some(std::time::Duration::new(seconds, nanos))
    }
}

pub mod aggregate_function {
    pub const NONE: i32 = 0;
    pub const MAX: i32 = 1;
    pub const AVG: i32 = 2;
    pub const MIN: i32 = 3;
    pub const SUM: i32 = 4;
    pub const COUNT: i32 = 5;
    pub const MODE: i32 = 6;
}

pub mod order {
    pub const ASC: i32 = 0;
    pub const DESC: i32 = 1;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRange {
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub step: Option<Duration>,
    pub aggregate_function: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryCondition {
    pub time_range: Option<TimeRange>,
    pub order: i32,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    CpuUsageSecondsPercentage,
    MemoryUsageBytes,
    PowerUsageWatts,
    TemperatureCelsius,
    DutyCycle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: Timestamp,
    pub num_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricData {
    pub metric_type: MetricType,
    pub data: Vec<Sample>,
}
