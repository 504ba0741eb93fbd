use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSide {
    Input,
    Output,
}

impl fmt::Display for PortSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSide::Input => f.write_str("input"),
            PortSide::Output => f.write_str("output"),
        }
    }
}

/// Errors from the node-type registry and the graph validator.
///
/// `DanglingReference` means the editor raised an event for a node it no
/// longer (or never) had, which points at a lost or duplicated event.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("schema error in node type `{node_type}`: {reason}")]
    Schema { node_type: String, reason: String },

    #[error("node type not found: {0}")]
    NotFound(String),

    #[error("connection refers to unknown node: {0}")]
    DanglingReference(String),

    #[error("cannot resolve ports for connection {output_node_id} -> {input_node_id}")]
    UnresolvedPort {
        output_node_id: String,
        input_node_id: String,
    },

    #[error("{side} port {index} out of range on node {node_id} ({count} ports)")]
    PortOutOfRange {
        node_id: String,
        side: PortSide,
        index: usize,
        count: usize,
    },

    #[error("workflow contains a cycle through nodes: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_displays_type_and_reason() {
        let err = GraphError::Schema {
            node_type: "string.print_string".into(),
            reason: "missing `outputs`".into(),
        };
        assert_eq!(
            err.to_string(),
            "schema error in node type `string.print_string`: missing `outputs`"
        );
    }

    #[test]
    fn port_out_of_range_displays_side() {
        let err = GraphError::PortOutOfRange {
            node_id: "3".into(),
            side: PortSide::Input,
            index: 4,
            count: 1,
        };
        assert_eq!(err.to_string(), "input port 4 out of range on node 3 (1 ports)");
    }

    #[test]
    fn cycle_lists_nodes() {
        let err = GraphError::Cycle(vec!["1".into(), "2".into()]);
        assert_eq!(err.to_string(), "workflow contains a cycle through nodes: 1, 2");
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GraphError>();
    }
}
