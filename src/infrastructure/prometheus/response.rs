// Prometheus HTTP API response envelope and its normalization into entities
use crate::domain::metric::{Entity, Sample};
use crate::error::{DatahubError, Result};
use chrono::DateTime;
use serde::Deserialize;
use std::collections::HashMap;

pub const STATUS_SUCCESS: &str = "success";

pub const RESULT_TYPE_MATRIX: &str = "matrix";
pub const RESULT_TYPE_VECTOR: &str = "vector";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Data,
    #[serde(default, rename = "errorType")]
    pub error_type: String,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Data {
    #[serde(default, rename = "resultType")]
    pub result_type: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

#[derive(Debug, Deserialize)]
struct VectorSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Normalize `matrix` and `vector` results into entities in backend order.
    pub fn get_entities(&self) -> Result<Vec<Entity>> {
        if !self.is_success() {
            return Err(DatahubError::Backend(format!(
                "status: {}, error type: {}, error: {}",
                self.status, self.error_type, self.error
            )));
        }

        match self.data.result_type.as_str() {
            RESULT_TYPE_MATRIX => {
                let series: Vec<MatrixSeries> = decode_result(&self.data.result)?;
                series
                    .into_iter()
                    .map(|s| {
                        let values = s
                            .values
                            .into_iter()
                            .map(|(t, v)| build_sample(t, v))
                            .collect::<Result<Vec<_>>>()?;
                        Ok(Entity {
                            labels: s.metric,
                            values,
                        })
                    })
                    .collect()
            }
            RESULT_TYPE_VECTOR => {
                let series: Vec<VectorSeries> = decode_result(&self.data.result)?;
                series
                    .into_iter()
                    .map(|s| {
                        let (t, v) = s.value;
                        Ok(Entity {
                            labels: s.metric,
                            values: vec![build_sample(t, v)?],
                        })
                    })
                    .collect()
            }
            other => Err(DatahubError::UnsupportedResultType(other.to_string())),
        }
    }
}

fn decode_result<T: serde::de::DeserializeOwned>(result: &serde_json::Value) -> Result<Vec<T>> {
    if result.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(result.clone()).map_err(|e| DatahubError::Decode {
        message: e.to_string(),
        body: result.to_string(),
    })
}

/// Unix seconds with the fractional part dropped
fn build_sample(unix_seconds: f64, value: String) -> Result<Sample> {
    let timestamp = DateTime::from_timestamp(unix_seconds.trunc() as i64, 0)
        .ok_or_else(|| DatahubError::Sample(format!("timestamp out of range: {}", unix_seconds)))?;
    Ok(Sample::new(timestamp, value))
}
