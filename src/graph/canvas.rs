use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use super::error::GraphError;
use super::layout::content_offset;
use super::registry::WorkflowNodeRegistry;
use super::validator::{GraphEditor, GraphTypeValidator, NodeLookup};
use super::workflow::{
    DEFAULT_MODULE, InputLink, InputSlot, OutputLink, OutputSlot, WorkflowDocument,
    WorkflowModule, WorkflowNode, ordered_slots,
};
use super::{Connection, Decision, GraphNode, Link, Position, port_class};

/// The editor's node table and edge list.
///
/// Plays the part of the graph editor: nodes are created from registry
/// descriptors, every new edge goes through the validator, and a rejected
/// edge is gone before `connect` returns.
#[derive(Debug, Clone)]
pub struct Canvas {
    module: String,
    nodes: BTreeMap<String, GraphNode>,
    connections: Vec<Connection>,
    next_id: u64,
}

/// Stored connections that no longer pass validation.
#[derive(Debug, Default)]
pub struct AuditReport {
    pub accepted: usize,
    pub rejected: Vec<Connection>,
    pub errors: Vec<(Connection, GraphError)>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.errors.is_empty()
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            module: DEFAULT_MODULE.to_string(),
            nodes: BTreeMap::new(),
            connections: Vec::new(),
            next_id: 1,
        }
    }

    pub fn add_node(
        &mut self,
        type_name: &str,
        registry: &WorkflowNodeRegistry,
        position: Position,
    ) -> Result<String, GraphError> {
        let descriptor = registry.instantiate(type_name)?;
        let id = self.next_id.to_string();
        self.next_id += 1;

        let settings: Map<String, Value> = descriptor
            .settings
            .iter()
            .map(|port| (port.name.clone(), Value::String(String::new())))
            .collect();

        let node = GraphNode {
            id: id.clone(),
            type_name: type_name.to_string(),
            content_offset: content_offset(descriptor.inputs.len(), descriptor.outputs.len()),
            inputs: descriptor.inputs,
            outputs: descriptor.outputs,
            settings,
            position,
            outgoing: Vec::new(),
            editor_fields: Map::new(),
        };

        tracing::debug!(node_id = %id, node_type = %type_name, "Added node");
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> bool {
        if self.nodes.remove(id).is_none() {
            return false;
        }
        self.connections
            .retain(|c| c.output_node_id != id && c.input_node_id != id);
        for node in self.nodes.values_mut() {
            node.outgoing.retain(|link| link.input_node_id != id);
        }
        true
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Record a new edge and validate it.
    ///
    /// On `Reject` (and on any validation error) the edge is removed again,
    /// so only accepted edges remain stored. An edge that is already stored
    /// is accepted without being recorded a second time.
    pub fn connect(
        &mut self,
        connection: Connection,
        validator: &GraphTypeValidator,
    ) -> Result<Decision, GraphError> {
        if self.connections.contains(&connection) {
            tracing::debug!(connection = %connection, "Connection already exists");
            return Ok(Decision::Accept);
        }
        self.record(connection.clone());
        let outcome = validator.on_connection_created(self, &connection);
        self.settle(&connection, outcome)
    }

    /// Keep the just-recorded edge only if validation accepted it.
    fn settle(
        &mut self,
        connection: &Connection,
        outcome: Result<Option<Decision>, GraphError>,
    ) -> Result<Decision, GraphError> {
        match outcome {
            Ok(Some(decision)) => Ok(decision),
            // Validation was skipped, so the edge was never checked.
            Ok(None) => {
                self.remove_connection(connection);
                Ok(Decision::Reject)
            }
            Err(e) => {
                self.remove_connection(connection);
                Err(e)
            }
        }
    }

    /// Re-validate every stored edge without changing anything.
    pub fn audit(&self, validator: &GraphTypeValidator) -> AuditReport {
        let mut report = AuditReport::default();
        for connection in &self.connections {
            match validator.validate(connection, self) {
                Ok(Decision::Accept) => report.accepted += 1,
                Ok(Decision::Reject) => report.rejected.push(connection.clone()),
                Err(e) => report.errors.push((connection.clone(), e)),
            }
        }
        report
    }

    /// Node ids grouped by dependency depth.
    ///
    /// Level 0 holds nodes nothing feeds into; every other node sits one
    /// level below the deepest node it depends on.
    pub fn execution_levels(&self) -> Result<Vec<Vec<String>>, GraphError> {
        let mut needs: BTreeMap<&str, BTreeSet<&str>> =
            self.nodes.keys().map(|id| (id.as_str(), BTreeSet::new())).collect();
        for c in &self.connections {
            if let Some(set) = needs.get_mut(c.input_node_id.as_str()) {
                if self.nodes.contains_key(&c.output_node_id) {
                    set.insert(c.output_node_id.as_str());
                }
            }
        }

        let mut levels = Vec::new();
        let mut done: BTreeSet<&str> = BTreeSet::new();
        while done.len() < needs.len() {
            let mut level: Vec<&str> = needs
                .iter()
                .filter(|(id, deps)| !done.contains(*id) && deps.is_subset(&done))
                .map(|(id, _)| *id)
                .collect();

            if level.is_empty() {
                let stuck = needs
                    .keys()
                    .filter(|id| !done.contains(*id))
                    .map(|id| id.to_string())
                    .collect();
                return Err(GraphError::Cycle(stuck));
            }

            level.sort_by_key(|id| id_order(id));
            done.extend(level.iter().copied());
            levels.push(level.into_iter().map(str::to_string).collect());
        }

        Ok(levels)
    }

    pub fn import(doc: &WorkflowDocument, registry: &WorkflowNodeRegistry) -> Result<Self, GraphError> {
        let mut canvas = Canvas::new();
        let Some((module_name, module)) = doc.main_module() else {
            return Ok(canvas);
        };
        canvas.module = module_name.to_string();

        for (id, node) in &module.data {
            let descriptor = registry.get(&node.name)?;
            let mut editor_fields = node.extra.clone();
            editor_fields.insert("id".to_string(), node.id.clone());

            canvas.nodes.insert(
                id.clone(),
                GraphNode {
                    id: id.clone(),
                    type_name: node.name.clone(),
                    inputs: descriptor.inputs.clone(),
                    outputs: descriptor.outputs.clone(),
                    settings: node.data.clone(),
                    position: Position {
                        x: node.pos_x,
                        y: node.pos_y,
                    },
                    content_offset: content_offset(descriptor.inputs.len(), descriptor.outputs.len()),
                    outgoing: Vec::new(),
                    editor_fields,
                },
            );

            if let Some(after) = id.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
                canvas.next_id = canvas.next_id.max(after);
            }
        }

        for (id, node) in &module.data {
            for (output_class, slot) in ordered_slots(&node.outputs, "output_") {
                for link in &slot.connections {
                    canvas.record(Connection::new(
                        id.clone(),
                        link.node.clone(),
                        output_class.clone(),
                        link.output.clone(),
                    ));
                }
            }
        }

        tracing::info!(
            module = %canvas.module,
            nodes = canvas.nodes.len(),
            connections = canvas.connections.len(),
            "Imported workflow"
        );
        Ok(canvas)
    }

    pub fn export(&self) -> WorkflowDocument {
        let mut data = BTreeMap::new();

        for (id, node) in &self.nodes {
            let mut extra = node.editor_fields.clone();
            let node_id = extra.remove("id").unwrap_or_else(|| {
                id.parse::<u64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::String(id.clone()))
            });

            let inputs = (0..node.inputs.len())
                .map(|i| {
                    let class = port_class("input_", i);
                    let connections = self
                        .connections
                        .iter()
                        .filter(|c| c.input_node_id == *id && c.input_class == class)
                        .map(|c| InputLink {
                            node: c.output_node_id.clone(),
                            input: c.output_class.clone(),
                        })
                        .collect();
                    (class, InputSlot { connections })
                })
                .collect();

            let outputs = (0..node.outputs.len())
                .map(|i| {
                    let class = port_class("output_", i);
                    let connections = self
                        .connections
                        .iter()
                        .filter(|c| c.output_node_id == *id && c.output_class == class)
                        .map(|c| OutputLink {
                            node: c.input_node_id.clone(),
                            output: c.input_class.clone(),
                        })
                        .collect();
                    (class, OutputSlot { connections })
                })
                .collect();

            data.insert(
                id.clone(),
                WorkflowNode {
                    id: node_id,
                    name: node.type_name.clone(),
                    data: node.settings.clone(),
                    inputs,
                    outputs,
                    pos_x: node.position.x,
                    pos_y: node.position.y,
                    extra,
                },
            );
        }

        let mut drawflow = BTreeMap::new();
        drawflow.insert(self.module.clone(), WorkflowModule { data });
        WorkflowDocument { drawflow }
    }

    fn record(&mut self, connection: Connection) {
        if let Some(node) = self.nodes.get_mut(&connection.output_node_id) {
            node.outgoing.push(Link {
                output_class: connection.output_class.clone(),
                input_node_id: connection.input_node_id.clone(),
                input_class: connection.input_class.clone(),
            });
        }
        self.connections.push(connection);
    }
}

impl NodeLookup for Canvas {
    fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }
}

impl GraphEditor for Canvas {
    fn remove_connection(&mut self, connection: &Connection) {
        if let Some(pos) = self.connections.iter().rposition(|c| c == connection) {
            self.connections.remove(pos);
        }
        if let Some(node) = self.nodes.get_mut(&connection.output_node_id) {
            if let Some(pos) = node.outgoing.iter().rposition(|link| {
                link.output_class == connection.output_class
                    && link.input_node_id == connection.input_node_id
                    && link.input_class == connection.input_class
            }) {
                node.outgoing.remove(pos);
            }
        }
        tracing::debug!(connection = %connection, "Removed connection");
    }
}

/// Numeric ids sort by value, anything else after them by text.
fn id_order(id: &str) -> (u64, String) {
    (id.parse().unwrap_or(u64::MAX), id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> WorkflowNodeRegistry {
        WorkflowNodeRegistry::from_schema(&json!({
            "trigger_events.on_message.on_message": {
                "name": "on_message",
                "inputs": {},
                "outputs": {"message": "str", "address": "str"},
                "settings": {}
            },
            "string.print_string": {
                "name": "print_string",
                "inputs": {"string": "str"},
                "outputs": {},
                "settings": {}
            },
            "string.string_textbox": {
                "name": "string_textbox",
                "inputs": {},
                "outputs": {"string": "str"},
                "settings": {"string": "str"}
            },
            "agent.load_agent_info": {
                "name": "load_agent_info",
                "inputs": {},
                "outputs": {"agent_info": "dict"},
                "settings": {"temperature": "int"}
            },
            "string.concat_string": {
                "name": "concat_string",
                "inputs": {"stringA": "str", "stringB": "str"},
                "outputs": {"string": "str"},
                "settings": {}
            }
        }))
        .unwrap()
    }

    fn origin() -> Position {
        Position::default()
    }

    #[test]
    fn test_add_node_from_registry() {
        let registry = registry();
        let mut canvas = Canvas::new();
        let id = canvas
            .add_node("trigger_events.on_message.on_message", &registry, Position { x: 5.0, y: 6.0 })
            .unwrap();
        assert_eq!(id, "1");

        let node = canvas.node(&id).unwrap();
        assert_eq!(node.outputs.len(), 2);
        assert_eq!(node.content_offset, 45.0);
        assert_eq!(node.position, Position { x: 5.0, y: 6.0 });

        assert_eq!(
            canvas.add_node("missing", &registry, origin()),
            Err(GraphError::NotFound("missing".into()))
        );
    }

    #[test]
    fn test_node_settings_do_not_leak_into_registry() {
        let registry = registry();
        let mut canvas = Canvas::new();
        let id = canvas.add_node("string.string_textbox", &registry, origin()).unwrap();
        canvas
            .node_mut(&id)
            .unwrap()
            .settings
            .insert("string".into(), json!("hello"));

        let other = canvas.add_node("string.string_textbox", &registry, origin()).unwrap();
        assert_eq!(canvas.node(&other).unwrap().settings["string"], "");
        assert_eq!(registry.get("string.string_textbox").unwrap().settings.len(), 1);
    }

    #[test]
    fn test_connect_keeps_only_accepted_edges() {
        let registry = registry();
        let validator = GraphTypeValidator::new();
        let mut canvas = Canvas::new();
        let trigger = canvas.add_node("trigger_events.on_message.on_message", &registry, origin()).unwrap();
        let print = canvas.add_node("string.print_string", &registry, origin()).unwrap();
        let agent = canvas.add_node("agent.load_agent_info", &registry, origin()).unwrap();

        let good = Connection::new(&trigger, &print, "output_1", "input_1");
        assert_eq!(canvas.connect(good.clone(), &validator), Ok(Decision::Accept));

        let bad = Connection::new(&agent, &print, "output_1", "input_1");
        assert_eq!(canvas.connect(bad, &validator), Ok(Decision::Reject));

        assert_eq!(canvas.connections(), &[good]);
        assert!(canvas.node(&agent).unwrap().outgoing.is_empty());
        assert_eq!(canvas.node(&trigger).unwrap().outgoing.len(), 1);
    }

    #[test]
    fn test_connect_error_does_not_persist_edge() {
        let registry = registry();
        let validator = GraphTypeValidator::new();
        let mut canvas = Canvas::new();
        let trigger = canvas.add_node("trigger_events.on_message.on_message", &registry, origin()).unwrap();

        let dangling = Connection::new(&trigger, "99", "output_1", "input_1");
        assert_eq!(
            canvas.connect(dangling, &validator),
            Err(GraphError::DanglingReference("99".into()))
        );
        assert!(canvas.connections().is_empty());
        assert!(canvas.node(&trigger).unwrap().outgoing.is_empty());
    }

    #[test]
    fn test_remove_node_drops_edges() {
        let registry = registry();
        let validator = GraphTypeValidator::new();
        let mut canvas = Canvas::new();
        let a = canvas.add_node("string.string_textbox", &registry, origin()).unwrap();
        let b = canvas.add_node("string.print_string", &registry, origin()).unwrap();
        canvas
            .connect(Connection::new(&a, &b, "output_1", "input_1"), &validator)
            .unwrap();

        assert!(canvas.remove_node(&b));
        assert!(!canvas.remove_node(&b));
        assert!(canvas.connections().is_empty());
        assert!(canvas.node(&a).unwrap().outgoing.is_empty());
    }

    #[test]
    fn test_execution_levels() {
        let registry = registry();
        let validator = GraphTypeValidator::new();
        let mut canvas = Canvas::new();
        let a = canvas.add_node("string.string_textbox", &registry, origin()).unwrap();
        let b = canvas.add_node("string.string_textbox", &registry, origin()).unwrap();
        let concat = canvas.add_node("string.concat_string", &registry, origin()).unwrap();
        let print = canvas.add_node("string.print_string", &registry, origin()).unwrap();

        for conn in [
            Connection::new(&a, &concat, "output_1", "input_1"),
            Connection::new(&b, &concat, "output_1", "input_2"),
            Connection::new(&concat, &print, "output_1", "input_1"),
        ] {
            assert_eq!(canvas.connect(conn, &validator), Ok(Decision::Accept));
        }

        assert_eq!(
            canvas.execution_levels().unwrap(),
            vec![vec![a, b], vec![concat], vec![print]]
        );
    }

    #[test]
    fn test_execution_levels_detect_cycle() {
        let registry = registry();
        let validator = GraphTypeValidator::new();
        let mut canvas = Canvas::new();
        let a = canvas.add_node("string.concat_string", &registry, origin()).unwrap();
        let b = canvas.add_node("string.concat_string", &registry, origin()).unwrap();
        let c = canvas.add_node("string.string_textbox", &registry, origin()).unwrap();
        canvas.connect(Connection::new(&a, &b, "output_1", "input_1"), &validator).unwrap();
        canvas.connect(Connection::new(&b, &a, "output_1", "input_1"), &validator).unwrap();

        let Err(GraphError::Cycle(stuck)) = canvas.execution_levels() else {
            panic!("expected a cycle");
        };
        assert_eq!(stuck, vec![a, b]);
        assert!(!stuck.contains(&c));
    }

    #[test]
    fn test_connect_same_edge_twice_stores_it_once() {
        let registry = registry();
        let validator = GraphTypeValidator::new();
        let mut canvas = Canvas::new();
        let a = canvas.add_node("string.string_textbox", &registry, origin()).unwrap();
        let b = canvas.add_node("string.print_string", &registry, origin()).unwrap();

        let edge = Connection::new(&a, &b, "output_1", "input_1");
        assert_eq!(canvas.connect(edge.clone(), &validator), Ok(Decision::Accept));
        assert_eq!(canvas.connect(edge.clone(), &validator), Ok(Decision::Accept));

        assert_eq!(canvas.connections().len(), 1);
        assert_eq!(canvas.node(&a).unwrap().outgoing.len(), 1);

        let json = serde_json::to_value(canvas.export()).unwrap();
        assert_eq!(
            json["drawflow"]["Home"]["data"]["1"]["outputs"]["output_1"]["connections"],
            json!([{"node": "2", "output": "input_1"}])
        );
        assert_eq!(
            json["drawflow"]["Home"]["data"]["2"]["inputs"]["input_1"]["connections"],
            json!([{"node": "1", "input": "output_1"}])
        );
    }

    #[test]
    fn test_skipped_validation_does_not_keep_edge() {
        let registry = registry();
        let mut canvas = Canvas::new();
        let a = canvas.add_node("string.string_textbox", &registry, origin()).unwrap();
        let b = canvas.add_node("string.print_string", &registry, origin()).unwrap();

        let edge = Connection::new(&a, &b, "output_1", "input_1");
        canvas.record(edge.clone());
        assert_eq!(canvas.settle(&edge, Ok(None)), Ok(Decision::Reject));
        assert!(canvas.connections().is_empty());
        assert!(canvas.node(&a).unwrap().outgoing.is_empty());
    }

    #[test]
    fn test_import_largest_numeric_id() {
        let doc: WorkflowDocument = serde_json::from_value(json!({
            "drawflow": {"Home": {"data": {
                "18446744073709551615": {"id": 18446744073709551615u64, "name": "string.print_string"}
            }}}
        }))
        .unwrap();

        let mut canvas = Canvas::import(&doc, &registry()).unwrap();
        assert!(canvas.node("18446744073709551615").is_some());
        assert_eq!(canvas.add_node("string.print_string", &registry(), origin()).unwrap(), "1");
        assert_eq!(canvas.nodes().count(), 2);
    }

    #[test]
    fn test_export_import_roundtrip() {
        let registry = registry();
        let validator = GraphTypeValidator::new();
        let mut canvas = Canvas::new();
        let trigger = canvas.add_node("trigger_events.on_message.on_message", &registry, Position { x: 1.0, y: 2.0 }).unwrap();
        let print = canvas.add_node("string.print_string", &registry, origin()).unwrap();
        canvas
            .connect(Connection::new(&trigger, &print, "output_2", "input_1"), &validator)
            .unwrap();

        let doc = canvas.export();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json["drawflow"]["Home"]["data"]["1"]["outputs"]["output_2"]["connections"][0],
            json!({"node": "2", "output": "input_1"})
        );
        assert_eq!(
            json["drawflow"]["Home"]["data"]["2"]["inputs"]["input_1"]["connections"][0],
            json!({"node": "1", "input": "output_2"})
        );
        assert_eq!(json["drawflow"]["Home"]["data"]["1"]["id"], 1);

        let restored = Canvas::import(&doc, &registry).unwrap();
        assert_eq!(restored.connections(), canvas.connections());
        assert_eq!(restored.node("1").unwrap().position, Position { x: 1.0, y: 2.0 });

        // New ids continue after the imported ones.
        let mut restored = restored;
        assert_eq!(restored.add_node("string.print_string", &registry, origin()).unwrap(), "3");
    }

    #[test]
    fn test_import_unknown_type_fails() {
        let doc: WorkflowDocument = serde_json::from_value(json!({
            "drawflow": {"Home": {"data": {"1": {"id": 1, "name": "gone.node"}}}}
        }))
        .unwrap();
        assert_eq!(
            Canvas::import(&doc, &registry()).unwrap_err(),
            GraphError::NotFound("gone.node".into())
        );
    }

    #[test]
    fn test_audit_reports_stored_mismatches() {
        let doc: WorkflowDocument = serde_json::from_value(json!({
            "drawflow": {"Home": {"data": {
                "1": {"id": 1, "name": "agent.load_agent_info",
                      "outputs": {"output_1": {"connections": [{"node": "2", "output": "input_1"}]}}},
                "2": {"id": 2, "name": "string.print_string",
                      "inputs": {"input_1": {"connections": [{"node": "1", "input": "output_1"}]}}},
                "3": {"id": 3, "name": "string.string_textbox",
                      "outputs": {"output_1": {"connections": [
                          {"node": "2", "output": "input_1"},
                          {"node": "4", "output": "input_1"}
                      ]}}}
            }}}
        }))
        .unwrap();

        let canvas = Canvas::import(&doc, &registry()).unwrap();
        let report = canvas.audit(&GraphTypeValidator::new());
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected, vec![Connection::new("1", "2", "output_1", "input_1")]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].1, GraphError::DanglingReference("4".into()));
        assert!(!report.is_clean());
    }
}
