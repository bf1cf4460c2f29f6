// InfluxDB /query response model and its normalization into entities
use crate::domain::metric::{Entity, Sample};
use crate::error::{DatahubError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

pub const TIME_COLUMN: &str = "time";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<QueryResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub partial: bool,
}

/// One series flattened to string maps; every data map also carries the series tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfluxRow {
    pub name: String,
    pub tags: HashMap<String, String>,
    pub data: Vec<HashMap<String, String>>,
    pub partial: bool,
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub fn pack_rows(results: &[QueryResult]) -> Vec<InfluxRow> {
    let rows = results
        .iter()
        .flat_map(|result| &result.series)
        .map(|series| {
            let data = series
                .values
                .iter()
                .map(|values| {
                    let mut data = series.tags.clone();
                    for (column, value) in series.columns.iter().zip(values) {
                        data.insert(column.clone(), render_value(value));
                    }
                    data
                })
                .collect();

            InfluxRow {
                name: series.name.clone(),
                tags: series.tags.clone(),
                data,
                partial: series.partial,
            }
        })
        .collect();

    normalize(rows)
}

/// Fold `<col>_1` duplicates (produced when a tag and a field share a name)
/// into `<col>`, preferring the non-empty value.
pub fn normalize(rows: Vec<InfluxRow>) -> Vec<InfluxRow> {
    rows.into_iter()
        .map(|mut row| {
            for data in &mut row.data {
                let duplicates: Vec<String> = data
                    .keys()
                    .filter(|k| {
                        k.strip_suffix("_1")
                            .is_some_and(|base| data.contains_key(base))
                    })
                    .cloned()
                    .collect();

                for duplicate in duplicates {
                    let Some(value) = data.remove(&duplicate) else {
                        continue;
                    };
                    let base = &duplicate[..duplicate.len() - 2];
                    if !value.is_empty() {
                        data.insert(base.to_string(), value);
                    }
                }
            }
            row
        })
        .collect()
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatahubError::Sample(format!("invalid time {:?}: {}", value, e)))
}

impl InfluxRow {
    /// Group data maps into entities by the values of `tag_keys`, in first-seen order.
    ///
    /// Rows with an empty `value_column` (empty aggregation buckets) carry no sample.
    pub fn into_entities(self, tag_keys: &[&str], value_column: &str) -> Result<Vec<Entity>> {
        let mut entities: Vec<Entity> = Vec::new();
        let mut index: HashMap<Vec<(String, String)>, usize> = HashMap::new();

        for data in self.data {
            let key: Vec<(String, String)> = tag_keys
                .iter()
                .filter_map(|k| {
                    data.get(*k)
                        .filter(|v| !v.is_empty())
                        .map(|v| (k.to_string(), v.clone()))
                })
                .collect();

            let position = *index.entry(key.clone()).or_insert_with(|| {
                entities.push(Entity {
                    labels: key.into_iter().collect(),
                    values: Vec::new(),
                });
                entities.len() - 1
            });

            let value = data.get(value_column).map(String::as_str).unwrap_or_default();
            if value.is_empty() {
                continue;
            }
            let time = data.get(TIME_COLUMN).map(String::as_str).unwrap_or_default();
            entities[position]
                .values
                .push(Sample::new(parse_time(time)?, value));
        }

        Ok(entities)
    }
}
