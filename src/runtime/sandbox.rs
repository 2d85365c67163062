//! Per-workflow isolated execution environment.
//!
//! The sandbox is the Rust-native rendition of an isolate: workflow code is a
//! registered native handler that only ever receives a
//! [`WorkflowContext`](super::WorkflowContext), so the curated surface —
//! logical clock, seeded PRNG, injected host functions, timers — is all it
//! can reach. One sandbox exists per run; no state is shared between runs,
//! and a sandbox whose activation failed must be discarded, not reused.

use super::activator::Activator;
use super::registry::WorkflowRegistry;
use crate::protocol::{self, CompleteTaskReq, WfActivation};
use crate::ActivationError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A host callback reachable from workflow code by its dotted name
/// (e.g. `"console.log"`). Injection is not retractable.
pub type HostFn =
    Arc<dyn Fn(&[serde_json::Value]) -> Option<serde_json::Value> + Send + Sync>;

pub struct WorkflowSandbox {
    run_id: String,
    activator: Activator,
}

impl WorkflowSandbox {
    /// Prepare a fresh sandbox. The PRNG visible to workflow code is seeded
    /// from `workflow_id`, so re-creating the sandbox for a replay reproduces
    /// the same random sequence.
    pub fn create(
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
        registry: WorkflowRegistry,
        host_fns: HashMap<String, HostFn>,
    ) -> Self {
        let workflow_id = workflow_id.into();
        let run_id = run_id.into();
        debug!(
            target: "driftcore::sandbox",
            workflow_id = %workflow_id,
            run_id = %run_id,
            "sandbox created"
        );
        Self {
            activator: Activator::new(workflow_id, run_id.clone(), registry, host_fns),
            run_id,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Install a host callback by dotted name.
    pub fn inject(&self, name: impl Into<String>, f: HostFn) {
        self.activator.inject(name, f);
    }

    /// Submit an activation, run the scheduler to quiescence, and return the
    /// length-delimited encoding of the resulting `CompleteTaskReq`. The task
    /// token is echoed verbatim.
    pub fn activate(
        &self,
        task_token: &[u8],
        activation: WfActivation,
    ) -> Result<Vec<u8>, ActivationError> {
        let commands = self.activator.activate(activation)?;
        let req = CompleteTaskReq::successful(task_token.to_vec(), commands);
        Ok(protocol::encode_completion(&req))
    }
}
