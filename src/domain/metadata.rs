// Kubernetes object identity used to key metrics
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub node_name: String,
    pub cluster_name: String,
    pub uid: String,
    /// Owning pod, only set for containers.
    pub pod_name: String,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.namespace.is_empty()
            && self.node_name.is_empty()
            && self.cluster_name.is_empty()
            && self.uid.is_empty()
            && self.pod_name.is_empty()
    }

    /// Fill fields from a tag/label set, ignoring unknown keys
    pub fn from_labels(labels: &HashMap<String, String>) -> Self {
        let get = |key: &str| labels.get(key).cloned().unwrap_or_default();
        Self {
            name: get("name"),
            namespace: get("namespace"),
            node_name: get("node_name"),
            cluster_name: get("cluster_name"),
            uid: get("uid"),
            pod_name: get("pod_name"),
        }
    }

    /// Non-empty fields as tag pairs, in a stable order
    pub fn tags(&self) -> Vec<(&'static str, &str)> {
        [
            ("name", self.name.as_str()),
            ("namespace", self.namespace.as_str()),
            ("node_name", self.node_name.as_str()),
            ("cluster_name", self.cluster_name.as_str()),
            ("uid", self.uid.as_str()),
            ("pod_name", self.pod_name.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect()
    }
}
