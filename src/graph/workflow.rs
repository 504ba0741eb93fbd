use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_MODULE: &str = "Home";

/// A workflow as exported by the graph editor and stored by the backend.
///
/// ```json
/// {"drawflow": {"Home": {"data": {"1": {"id": 1, "name": "...",
///   "inputs": {"input_1": {"connections": [{"node": "2", "input": "output_1"}]}},
///   "outputs": {"output_1": {"connections": [{"node": "3", "output": "input_1"}]}},
///   "pos_x": 10, "pos_y": 20, ...}}}}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub drawflow: BTreeMap<String, WorkflowModule>,
}

impl WorkflowDocument {
    /// The module holding the workflow: `Home` if present, else the first one.
    pub fn main_module(&self) -> Option<(&str, &WorkflowModule)> {
        self.drawflow
            .get_key_value(DEFAULT_MODULE)
            .or_else(|| self.drawflow.iter().next())
            .map(|(name, module)| (name.as_str(), module))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowModule {
    #[serde(default)]
    pub data: BTreeMap<String, WorkflowNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: Value,
    /// Node type name.
    pub name: String,
    /// Values of the node's setting fields.
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputSlot>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputSlot>,
    #[serde(default)]
    pub pos_x: f64,
    #[serde(default)]
    pub pos_y: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSlot {
    #[serde(default)]
    pub connections: Vec<InputLink>,
}

/// Upstream end of an input: `node` is the source node, `input` its output class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputLink {
    #[serde(deserialize_with = "node_ref")]
    pub node: String,
    pub input: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSlot {
    #[serde(default)]
    pub connections: Vec<OutputLink>,
}

/// Downstream end of an output: `node` is the target node, `output` its input class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputLink {
    #[serde(deserialize_with = "node_ref")]
    pub node: String,
    pub output: String,
}

/// Node references are strings in exports but numbers in some hand-written files.
fn node_ref<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected node id string or number, got {other}"
        ))),
    }
}

/// Slot keys (`output_1`, `output_10`, `output_2`) in port order.
pub fn ordered_slots<'a, T>(
    slots: &'a BTreeMap<String, T>,
    prefix: &str,
) -> Vec<(&'a String, &'a T)> {
    let mut ordered: Vec<_> = slots.iter().collect();
    ordered.sort_by_key(|(key, _)| (super::port_index(key, prefix).unwrap_or(usize::MAX), key.to_string()));
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "drawflow": {
                "Home": {
                    "data": {
                        "1": {
                            "id": 1,
                            "name": "trigger_events.on_message.on_message",
                            "data": {},
                            "class": "on_message",
                            "html": "<div></div>",
                            "typenode": false,
                            "inputs": {},
                            "outputs": {
                                "output_1": {"connections": [{"node": "2", "output": "input_1"}]},
                                "output_2": {"connections": []}
                            },
                            "pos_x": 40,
                            "pos_y": 80.5
                        },
                        "2": {
                            "id": 2,
                            "name": "string.print_string",
                            "data": {},
                            "class": "print_string",
                            "html": "",
                            "typenode": false,
                            "inputs": {
                                "input_1": {"connections": [{"node": 1, "input": "output_1"}]}
                            },
                            "outputs": {},
                            "pos_x": 300,
                            "pos_y": 80
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_parse_export() {
        let doc: WorkflowDocument = serde_json::from_value(sample()).unwrap();
        let (name, module) = doc.main_module().unwrap();
        assert_eq!(name, "Home");
        assert_eq!(module.data.len(), 2);

        let first = &module.data["1"];
        assert_eq!(first.name, "trigger_events.on_message.on_message");
        assert_eq!(first.outputs["output_1"].connections[0].node, "2");
        assert_eq!(first.pos_y, 80.5);
        assert_eq!(first.extra["class"], "on_message");

        // Numeric node references are accepted.
        assert_eq!(module.data["2"].inputs["input_1"].connections[0].node, "1");
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let doc: WorkflowDocument = serde_json::from_value(sample()).unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["drawflow"]["Home"]["data"]["1"]["html"], "<div></div>");
        assert_eq!(value["drawflow"]["Home"]["data"]["1"]["typenode"], false);
    }

    #[test]
    fn test_main_module_falls_back_to_first() {
        let doc: WorkflowDocument =
            serde_json::from_value(json!({"drawflow": {"Other": {"data": {}}}})).unwrap();
        assert_eq!(doc.main_module().map(|(name, _)| name), Some("Other"));
        assert!(WorkflowDocument::default().main_module().is_none());
    }

    #[test]
    fn test_ordered_slots_numeric() {
        let mut slots = BTreeMap::new();
        for key in ["output_10", "output_2", "output_1"] {
            slots.insert(key.to_string(), OutputSlot::default());
        }
        let keys: Vec<_> = ordered_slots(&slots, "output_")
            .into_iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["output_1", "output_2", "output_10"]);
    }
}
