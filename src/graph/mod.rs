pub mod canvas;
pub mod error;
pub mod layout;
pub mod registry;
pub mod validator;
pub mod workflow;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

pub use canvas::Canvas;
pub use error::{GraphError, PortSide};
pub use registry::WorkflowNodeRegistry;
pub use validator::{GraphEditor, GraphTypeValidator, NodeLookup};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub type_tag: String,
}

/// Ports of one side of a node, in the order they are drawn.
///
/// Position is what connects a drawn port to its type: the i-th entry is
/// the i-th port on the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMap(Vec<Port>);

impl PortMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, type_tag: impl Into<String>) {
        self.0.push(Port {
            name: name.into(),
            type_tag: type_tag.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Port> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.0.iter()
    }
}

impl<N: Into<String>, T: Into<String>> FromIterator<(N, T)> for PortMap {
    fn from_iter<I: IntoIterator<Item = (N, T)>>(iter: I) -> Self {
        let mut ports = PortMap::new();
        for (name, tag) in iter {
            ports.push(name, tag);
        }
        ports
    }
}

impl Serialize for PortMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for port in &self.0 {
            map.serialize_entry(&port.name, &port.type_tag)?;
        }
        map.end()
    }
}

/// Schema of one kind of workflow block, as served by `/agent/get_node_list`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NodeTypeDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub inputs: PortMap,
    pub outputs: PortMap,
    pub settings: PortMap,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// An outgoing edge as recorded on the node it leaves from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub output_class: String,
    pub input_node_id: String,
    pub input_class: String,
}

/// A node placed in the editor.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub type_name: String,
    pub inputs: PortMap,
    pub outputs: PortMap,
    /// Values entered into the node's setting fields.
    pub settings: Map<String, Value>,
    pub position: Position,
    pub content_offset: f64,
    pub outgoing: Vec<Link>,
    /// Editor-owned fields (markup, css class, ...) carried through import/export.
    pub editor_fields: Map<String, Value>,
}

/// One edge between two node ports, as raised by the editor.
///
/// Ports are named by the editor's classes, `output_N` and `input_N`,
/// counted from 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connection {
    pub output_node_id: String,
    pub input_node_id: String,
    pub output_class: String,
    pub input_class: String,
}

impl Connection {
    pub fn new(
        output_node_id: impl Into<String>,
        input_node_id: impl Into<String>,
        output_class: impl Into<String>,
        input_class: impl Into<String>,
    ) -> Self {
        Self {
            output_node_id: output_node_id.into(),
            input_node_id: input_node_id.into(),
            output_class: output_class.into(),
            input_class: input_class.into(),
        }
    }

    /// Zero-based output port index, if the class is well formed.
    pub fn output_port_index(&self) -> Option<usize> {
        port_index(&self.output_class, "output_")
    }

    /// Zero-based input port index, if the class is well formed.
    pub fn input_port_index(&self) -> Option<usize> {
        port_index(&self.input_class, "input_")
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.output_node_id, self.output_class, self.input_node_id, self.input_class
        )
    }
}

/// `output_3` with prefix `output_` is index 2.
pub fn port_index(class: &str, prefix: &str) -> Option<usize> {
    let number: usize = class.strip_prefix(prefix)?.parse().ok()?;
    number.checked_sub(1)
}

pub fn port_class(prefix: &str, index: usize) -> String {
    format!("{prefix}{}", index + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_index_parsing() {
        assert_eq!(port_index("output_1", "output_"), Some(0));
        assert_eq!(port_index("input_12", "input_"), Some(11));
        assert_eq!(port_index("input_0", "input_"), None);
        assert_eq!(port_index("output_1", "input_"), None);
        assert_eq!(port_index("output_x", "output_"), None);
        assert_eq!(port_class("output_", 0), "output_1");
    }

    #[test]
    fn test_connection_indices() {
        let conn = Connection::new("1", "2", "output_2", "input_1");
        assert_eq!(conn.output_port_index(), Some(1));
        assert_eq!(conn.input_port_index(), Some(0));
        assert_eq!(conn.to_string(), "1.output_2 -> 2.input_1");
    }

    #[test]
    fn test_port_map_keeps_order_when_serialized() {
        let ports: PortMap = [("zeta", "str"), ("alpha", "int")].into_iter().collect();
        assert_eq!(
            serde_json::to_string(&ports).unwrap(),
            r#"{"zeta":"str","alpha":"int"}"#
        );
        assert_eq!(ports.get(1).map(|p| p.type_tag.as_str()), Some("int"));
    }
}
