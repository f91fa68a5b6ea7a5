//! Sidecar metadata shipped next to version 1 vector graphs.
//!
//! The metadata describes each graph partition (node side, edge side): its
//! element count, the attributes it carries, and which attributes are bound
//! to which visual channels. Unknown fields are kept so the document can be
//! handed back to the session untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::types::AttributeTarget;

/// Aggregation keys whose values depend on the raw column values.
pub const VALUE_AGGREGATIONS: &[&str] = &[
    "min",
    "minValue",
    "max",
    "maxValue",
    "avg",
    "averageValue",
    "sum",
    "std",
    "standardDeviation",
    "stddev",
    "stdev",
    "var",
    "variance",
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarMetadata {
    #[serde(default)]
    pub nodes: Vec<Partition>,
    #[serde(default)]
    pub edges: Vec<Partition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapper: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeMetadata>,
    #[serde(default)]
    pub encodings: BTreeMap<String, Encoding>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttributeMetadata {
    /// Drop aggregations computed over the raw values.
    pub fn invalidate_value_aggregations(&mut self) {
        if let Some(aggregations) = self.aggregations.as_mut() {
            for key in VALUE_AGGREGATIONS {
                aggregations.remove(*key);
            }
        }
    }
}

/// Channel binding declared by the metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl SidecarMetadata {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn partitions(&self, target: AttributeTarget) -> &[Partition] {
        match target {
            AttributeTarget::Vertex => &self.nodes,
            AttributeTarget::Edge => &self.edges,
        }
    }

    /// Metadata of an attribute, taken from the first partition declaring it.
    pub fn attribute_mut(
        &mut self,
        target: AttributeTarget,
        name: &str,
    ) -> Option<&mut AttributeMetadata> {
        let partitions = match target {
            AttributeTarget::Vertex => &mut self.nodes,
            AttributeTarget::Edge => &mut self.edges,
        };
        partitions
            .iter_mut()
            .find_map(|p| p.attributes.get_mut(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sidecar() {
        let meta = SidecarMetadata::from_json(
            r#"{
                "mapper": "opentsdb",
                "nodes": [{
                    "count": 2,
                    "attributes": {"degree": {"ctype": "int32", "userType": "number",
                                              "aggregations": {"min": 1, "distinct": 2}}},
                    "encodings": {"pointSize": {"attributes": ["degree"]}}
                }],
                "edges": [{"count": 1, "attributes": {}, "encodings": {}}],
                "datasetId": "abc"
            }"#,
        )
        .unwrap();

        assert_eq!(meta.mapper.as_deref(), Some("opentsdb"));
        assert_eq!(meta.nodes[0].count, 2);
        let degree = &meta.nodes[0].attributes["degree"];
        assert_eq!(degree.user_type.as_deref(), Some("number"));
        assert_eq!(
            meta.nodes[0].encodings["pointSize"].attributes,
            vec!["degree".to_string()]
        );
        assert_eq!(meta.extra["datasetId"], json!("abc"));
    }

    #[test]
    fn test_invalidate_value_aggregations() {
        let mut attr = AttributeMetadata {
            aggregations: Some(
                json!({"min": 0, "maxValue": 9, "stdev": 1.5, "distinct": 4, "countDistinct": 4})
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
            ..Default::default()
        };
        attr.invalidate_value_aggregations();

        let aggs = attr.aggregations.unwrap();
        let mut keys: Vec<_> = aggs.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["countDistinct", "distinct"]);
    }

    #[test]
    fn test_attribute_lookup_by_target() {
        let mut meta = SidecarMetadata::default();
        meta.edges.push(Partition::default());
        meta.edges[0]
            .attributes
            .insert("bytes".to_string(), AttributeMetadata::default());

        assert!(meta.attribute_mut(AttributeTarget::Edge, "bytes").is_some());
        assert!(meta.attribute_mut(AttributeTarget::Vertex, "bytes").is_none());
    }
}
