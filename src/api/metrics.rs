// Metric request/response messages
use super::common::{MetricData, QueryCondition};
use crate::domain::metadata::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSelector {
    pub object_meta: ObjectMeta,
    pub pod_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListMetricsRequest {
    pub query_condition: Option<QueryCondition>,
    pub object_metas: Vec<ObjectMeta>,
    pub applications: Vec<ApplicationSelector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetric {
    pub object_meta: ObjectMeta,
    pub metric_data: Vec<MetricData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListMetricsResponse {
    pub metrics: Vec<ObjectMetric>,
    /// Metric types that could not be converted, one entry per object and type
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateMetricsRequest {
    pub metrics: Vec<ObjectMetric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteMetricsRequest {
    pub object_metas: Vec<ObjectMeta>,
}
