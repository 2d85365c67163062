//! Registry mapping workflow type names to handlers.
//!
//! The registry is immutable once built; the driver clones it into every
//! sandbox it creates. Versioning is deliberately absent from this core.

use super::{FnWorkflow, WorkflowContext, WorkflowHandler};
use crate::payloads::PayloadValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    inner: Arc<HashMap<String, Arc<dyn WorkflowHandler>>>,
}

impl WorkflowRegistry {
    pub fn builder() -> WorkflowRegistryBuilder {
        WorkflowRegistryBuilder {
            map: HashMap::new(),
        }
    }

    pub fn resolve_handler(&self, workflow_type: &str) -> Option<Arc<dyn WorkflowHandler>> {
        let handler = self.inner.get(workflow_type).cloned();
        if handler.is_none() {
            warn!(
                target: "driftcore::registry",
                workflow_type = %workflow_type,
                registered = self.inner.len(),
                "workflow type not registered"
            );
        }
        handler
    }

    pub fn contains(&self, workflow_type: &str) -> bool {
        self.inner.contains_key(workflow_type)
    }
}

pub struct WorkflowRegistryBuilder {
    map: HashMap<String, Arc<dyn WorkflowHandler>>,
}

impl WorkflowRegistryBuilder {
    /// Register a closure-based workflow. A duplicate name keeps the first
    /// registration.
    pub fn register<F, Fut>(self, workflow_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(WorkflowContext, Vec<PayloadValue>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<PayloadValue, String>> + Send + 'static,
    {
        self.register_handler(workflow_type, Arc::new(FnWorkflow(f)))
    }

    pub fn register_handler(
        mut self,
        workflow_type: impl Into<String>,
        handler: Arc<dyn WorkflowHandler>,
    ) -> Self {
        let workflow_type = workflow_type.into();
        if self.map.contains_key(&workflow_type) {
            warn!(
                target: "driftcore::registry",
                workflow_type = %workflow_type,
                "duplicate workflow registration ignored"
            );
            return self;
        }
        self.map.insert(workflow_type, handler);
        self
    }

    pub fn build(self) -> WorkflowRegistry {
        WorkflowRegistry {
            inner: Arc::new(self.map),
        }
    }
}
