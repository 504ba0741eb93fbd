use std::collections::BTreeMap;

use serde_json::Value;

use super::error::GraphError;
use super::{NodeTypeDescriptor, PortMap};

/// Available node types, keyed by type name.
///
/// Loaded once from the backend before the editor takes input. Entries are
/// never handed out mutably; [`instantiate`](Self::instantiate) gives each
/// new node its own copy.
#[derive(Debug, Clone, Default)]
pub struct WorkflowNodeRegistry {
    types: BTreeMap<String, NodeTypeDescriptor>,
}

impl WorkflowNodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schema(schema: &Value) -> Result<Self, GraphError> {
        let mut registry = Self::new();
        registry.load(schema)?;
        Ok(registry)
    }

    /// Replace the registry contents with the node types in `schema`.
    ///
    /// Either every entry is registered or none is: on error the previous
    /// contents stay as they were.
    pub fn load(&mut self, schema: &Value) -> Result<usize, GraphError> {
        let entries = schema.as_object().ok_or_else(|| GraphError::Schema {
            node_type: "<root>".to_string(),
            reason: "expected an object mapping type names to node types".to_string(),
        })?;

        let mut types = BTreeMap::new();
        for (type_name, entry) in entries {
            let descriptor = parse_descriptor(type_name, entry).inspect_err(|e| {
                tracing::error!(node_type = %type_name, error = %e, "Rejected node type schema");
            })?;
            types.insert(type_name.clone(), descriptor);
        }

        let count = types.len();
        self.types = types;
        tracing::info!(count, "Loaded node types");
        Ok(count)
    }

    pub fn get(&self, type_name: &str) -> Result<&NodeTypeDescriptor, GraphError> {
        self.types
            .get(type_name)
            .ok_or_else(|| GraphError::NotFound(type_name.to_string()))
    }

    pub fn input_arity(&self, type_name: &str) -> Result<usize, GraphError> {
        Ok(self.get(type_name)?.inputs.len())
    }

    pub fn output_arity(&self, type_name: &str) -> Result<usize, GraphError> {
        Ok(self.get(type_name)?.outputs.len())
    }

    /// Owned copy of a descriptor for a new node instance.
    pub fn instantiate(&self, type_name: &str) -> Result<NodeTypeDescriptor, GraphError> {
        self.get(type_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeTypeDescriptor)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn parse_descriptor(type_name: &str, entry: &Value) -> Result<NodeTypeDescriptor, GraphError> {
    let schema_error = |reason: String| GraphError::Schema {
        node_type: type_name.to_string(),
        reason,
    };

    let object = entry
        .as_object()
        .ok_or_else(|| schema_error("expected an object".to_string()))?;

    let name = match object.get("name") {
        Some(Value::String(name)) => name.clone(),
        Some(_) => return Err(schema_error("`name` must be a string".to_string())),
        None => return Err(schema_error("missing `name`".to_string())),
    };

    let module = object
        .get("module")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let inputs = parse_ports(type_name, "inputs", object.get("inputs"))?
        .ok_or_else(|| schema_error("missing `inputs`".to_string()))?;
    let outputs = parse_ports(type_name, "outputs", object.get("outputs"))?
        .ok_or_else(|| schema_error("missing `outputs`".to_string()))?;
    let settings = parse_ports(type_name, "settings", object.get("settings"))?.unwrap_or_default();

    Ok(NodeTypeDescriptor {
        name,
        module,
        inputs,
        outputs,
        settings,
    })
}

fn parse_ports(
    type_name: &str,
    field: &str,
    value: Option<&Value>,
) -> Result<Option<PortMap>, GraphError> {
    let Some(value) = value else {
        return Ok(None);
    };

    let object = value.as_object().ok_or_else(|| GraphError::Schema {
        node_type: type_name.to_string(),
        reason: format!("`{field}` must be an object"),
    })?;

    let mut ports = PortMap::new();
    for (port, tag) in object {
        let tag = tag.as_str().ok_or_else(|| GraphError::Schema {
            node_type: type_name.to_string(),
            reason: format!("type of `{field}.{port}` must be a string"),
        })?;
        ports.push(port.clone(), tag);
    }

    Ok(Some(ports))
}
