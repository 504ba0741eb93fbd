use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::api::{ArchivistApi, HttpArchivistClient};
use crate::config::Config;
use crate::graph::canvas::AuditReport;
use crate::graph::workflow::WorkflowDocument;
use crate::graph::{Canvas, GraphError, GraphTypeValidator, WorkflowNodeRegistry};

/// Everything a command needs: configuration, the backend client and the
/// node-type registry.
pub struct AppContext {
    pub config: Config,
    pub api: Arc<dyn ArchivistApi>,
    registry: WorkflowNodeRegistry,
}

/// Result of checking a stored workflow against the registry.
#[derive(Debug)]
pub struct WorkflowCheck {
    pub nodes: usize,
    pub audit: AuditReport,
    pub levels: Result<Vec<Vec<String>>, GraphError>,
}

impl WorkflowCheck {
    pub fn is_clean(&self) -> bool {
        self.audit.is_clean() && self.levels.is_ok()
    }
}

impl AppContext {
    /// Context with a backend client but an empty registry.
    pub fn connect(config: Config) -> Result<Self> {
        let client = HttpArchivistClient::from_config(&config).context("failed to build HTTP client")?;
        Ok(Self::with_api(config, Arc::new(client)))
    }

    pub fn with_api(config: Config, api: Arc<dyn ArchivistApi>) -> Self {
        Self {
            config,
            api,
            registry: WorkflowNodeRegistry::new(),
        }
    }

    /// Connect and load the node-type registry from the backend.
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let mut ctx = Self::connect(config)?;
        ctx.refresh_registry().await?;
        Ok(ctx)
    }

    pub async fn refresh_registry(&mut self) -> Result<usize> {
        let schema = self
            .api
            .node_schema()
            .await
            .context("failed to fetch node list")?;
        self.load_registry(&schema)
    }

    pub fn load_registry(&mut self, schema: &Value) -> Result<usize> {
        self.registry
            .load(schema)
            .context("backend node list is not a valid node-type table")
    }

    pub fn registry(&self) -> &WorkflowNodeRegistry {
        &self.registry
    }

    /// Import `doc`, re-validate every stored connection and compute the
    /// execution order.
    pub fn check_workflow(&self, doc: &WorkflowDocument) -> Result<WorkflowCheck> {
        let canvas = Canvas::import(doc, &self.registry).context("failed to import workflow")?;
        let audit = canvas.audit(&GraphTypeValidator::new());
        if !audit.is_clean() {
            tracing::warn!(
                rejected = audit.rejected.len(),
                errors = audit.errors.len(),
                "Workflow has invalid connections"
            );
        }

        Ok(WorkflowCheck {
            nodes: canvas.nodes().count(),
            audit,
            levels: canvas.execution_levels(),
        })
    }
}
