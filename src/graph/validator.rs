use std::cell::Cell;

use super::error::{GraphError, PortSide};
use super::{Connection, Decision, GraphNode, port_index};

/// Read access to the editor's node table.
pub trait NodeLookup {
    fn node(&self, id: &str) -> Option<&GraphNode>;
}

/// The editor capability the validator needs to retract an edge.
pub trait GraphEditor: NodeLookup {
    fn remove_connection(&mut self, connection: &Connection);
}

/// Checks that a new edge joins ports of the same type.
///
/// Single-shot and synchronous: nothing is retried and no state survives a
/// call except the guard that keeps a retraction from re-entering.
#[derive(Debug, Default)]
pub struct GraphTypeValidator {
    retracting: Cell<bool>,
}

impl GraphTypeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Accept` iff the output port's type tag equals the input port's.
    pub fn validate(
        &self,
        connection: &Connection,
        lookup: &impl NodeLookup,
    ) -> Result<Decision, GraphError> {
        let output_node = resolve_node(lookup, &connection.output_node_id)?;
        let input_node = resolve_node(lookup, &connection.input_node_id)?;

        let (output_index, input_index) = resolve_ports(connection, output_node)?;

        let output_port = output_node
            .outputs
            .get(output_index)
            .ok_or_else(|| GraphError::PortOutOfRange {
                node_id: output_node.id.clone(),
                side: PortSide::Output,
                index: output_index,
                count: output_node.outputs.len(),
            })?;
        let input_port = input_node
            .inputs
            .get(input_index)
            .ok_or_else(|| GraphError::PortOutOfRange {
                node_id: input_node.id.clone(),
                side: PortSide::Input,
                index: input_index,
                count: input_node.inputs.len(),
            })?;

        if output_port.type_tag == input_port.type_tag {
            Ok(Decision::Accept)
        } else {
            tracing::info!(
                connection = %connection,
                output_type = %output_port.type_tag,
                input_type = %input_port.type_tag,
                "Rejected connection between mismatched port types"
            );
            Ok(Decision::Reject)
        }
    }

    /// Handle the editor's connection-created event.
    ///
    /// A rejected edge is removed through `editor` using the same four
    /// fields it was created with. Returns `Ok(None)` when called again from
    /// inside that removal.
    pub fn on_connection_created<E: GraphEditor>(
        &self,
        editor: &mut E,
        connection: &Connection,
    ) -> Result<Option<Decision>, GraphError> {
        if self.retracting.get() {
            tracing::debug!(connection = %connection, "Skipping validation during retraction");
            return Ok(None);
        }

        let decision = self.validate(connection, &*editor)?;
        if decision == Decision::Reject {
            self.retracting.set(true);
            editor.remove_connection(connection);
            self.retracting.set(false);
        }
        Ok(Some(decision))
    }
}

fn resolve_node<'a>(lookup: &'a impl NodeLookup, id: &str) -> Result<&'a GraphNode, GraphError> {
    lookup.node(id).ok_or_else(|| {
        tracing::error!(node_id = %id, "Connection event refers to a node the editor does not have");
        GraphError::DanglingReference(id.to_string())
    })
}

/// Zero-based (output, input) port indices of the connection.
///
/// The classes on the event are used when they parse. Otherwise the output
/// node's recorded links are scanned for the latest one reaching the input
/// node.
fn resolve_ports(connection: &Connection, output_node: &GraphNode) -> Result<(usize, usize), GraphError> {
    if let (Some(output), Some(input)) = (connection.output_port_index(), connection.input_port_index()) {
        return Ok((output, input));
    }

    output_node
        .outgoing
        .iter()
        .rev()
        .filter(|link| link.input_node_id == connection.input_node_id)
        .find_map(|link| {
            Some((
                port_index(&link.output_class, "output_")?,
                port_index(&link.input_class, "input_")?,
            ))
        })
        .ok_or_else(|| GraphError::UnresolvedPort {
            output_node_id: connection.output_node_id.clone(),
            input_node_id: connection.input_node_id.clone(),
        })
}
