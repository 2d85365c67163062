//! The activation driver: the glue outside the deterministic world.
//!
//! It decodes activation frames from the transport, routes them to the right
//! sandbox (creating one on a run's first `startWorkflow`), and encodes the
//! completion back. Failures out of the activator are reported to the caller
//! as activation failures — never as `FailWorkflowExecution` — because the
//! coordinator retries infrastructure failures but treats a workflow failure
//! as a terminal business outcome. A sandbox whose activation failed is
//! discarded: its scheduler state is indeterminate.

use super::registry::WorkflowRegistry;
use super::sandbox::{HostFn, WorkflowSandbox};
use crate::protocol::{self, wf_activation_job};
use crate::ActivationError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

/// One frame from the transport: the opaque task token plus the
/// length-delimited `WFActivation` bytes.
pub struct ActivationRequest {
    pub task_token: Vec<u8>,
    pub frame: Vec<u8>,
}

/// What goes back to the transport.
pub enum ActivationResponse {
    /// Length-delimited `CompleteTaskReq` bytes.
    Completion(Vec<u8>),
    /// The activation could not be processed; the coordinator should treat
    /// this as a retryable infrastructure failure, subject to
    /// [`ActivationError::is_retryable`].
    Failed {
        run_id: String,
        error: ActivationError,
    },
}

pub struct ActivationDriver {
    registry: WorkflowRegistry,
    /// Injection template applied to every sandbox this driver creates.
    host_fns: Mutex<HashMap<String, HostFn>>,
    sandboxes: Mutex<HashMap<String, Arc<WorkflowSandbox>>>,
}

impl ActivationDriver {
    pub fn new(registry: WorkflowRegistry) -> Self {
        Self {
            registry,
            host_fns: Mutex::new(HashMap::new()),
            sandboxes: Mutex::new(HashMap::new()),
        }
    }

    /// Install a host callback on every sandbox this driver creates from now
    /// on (and on the ones it already holds).
    pub fn inject(&self, name: impl Into<String>, f: HostFn) {
        let name = name.into();
        self.host_fns
            .lock()
            .expect("driver state poisoned")
            .insert(name.clone(), f.clone());
        let live: Vec<Arc<WorkflowSandbox>> = self
            .sandboxes
            .lock()
            .expect("driver state poisoned")
            .values()
            .cloned()
            .collect();
        for sandbox in live {
            sandbox.inject(name.clone(), f.clone());
        }
    }

    /// Decode one activation frame, dispatch it, and return the encoded
    /// completion. On error the sandbox for that run is discarded.
    pub fn handle_activation(
        &self,
        task_token: &[u8],
        frame: &[u8],
    ) -> Result<Vec<u8>, ActivationError> {
        let activation = protocol::decode_activation(frame)?;
        let run_id = activation.run_id.clone();
        let sandbox = self.sandbox_for(&activation)?;

        debug!(
            target: "driftcore::driver",
            run_id = %run_id,
            job_count = activation.jobs.len(),
            "dispatching activation"
        );

        match sandbox.activate(task_token, activation) {
            Ok(completion) => Ok(completion),
            Err(error) => {
                warn!(
                    target: "driftcore::driver",
                    run_id = %run_id,
                    category = error.category(),
                    error = %error,
                    "activation failed; discarding sandbox"
                );
                self.release(&run_id);
                Err(error)
            }
        }
    }

    /// Drop the sandbox for a run, if any.
    pub fn release(&self, run_id: &str) {
        self.sandboxes
            .lock()
            .expect("driver state poisoned")
            .remove(run_id);
    }

    /// Process requests sequentially until the channel closes. Run one driver
    /// per worker slot; distinct drivers may run distinct workflows on
    /// distinct threads.
    pub async fn serve(
        self: Arc<Self>,
        mut rx: UnboundedReceiver<ActivationRequest>,
        tx: UnboundedSender<ActivationResponse>,
    ) {
        while let Some(request) = rx.recv().await {
            let response = match self.handle_activation(&request.task_token, &request.frame) {
                Ok(completion) => ActivationResponse::Completion(completion),
                Err(error) => {
                    let run_id = protocol::decode_activation(&request.frame)
                        .map(|a| a.run_id)
                        .unwrap_or_default();
                    ActivationResponse::Failed { run_id, error }
                }
            };
            if tx.send(response).is_err() {
                break;
            }
        }
        debug!(target: "driftcore::driver", "serve loop exited");
    }

    /// Find the live sandbox for this activation, or create one from its
    /// `startWorkflow` job.
    fn sandbox_for(
        &self,
        activation: &protocol::WfActivation,
    ) -> Result<Arc<WorkflowSandbox>, ActivationError> {
        let mut sandboxes = self.sandboxes.lock().expect("driver state poisoned");
        if let Some(sandbox) = sandboxes.get(&activation.run_id) {
            return Ok(sandbox.clone());
        }

        let start = activation.jobs.iter().find_map(|job| match &job.variant {
            Some(wf_activation_job::Variant::StartWorkflow(start)) => Some(start),
            _ => None,
        });
        let start = start.ok_or_else(|| ActivationError::UnknownRun {
            run_id: activation.run_id.clone(),
        })?;

        let host_fns = self.host_fns.lock().expect("driver state poisoned").clone();
        let sandbox = Arc::new(WorkflowSandbox::create(
            start.workflow_id.clone(),
            activation.run_id.clone(),
            self.registry.clone(),
            host_fns,
        ));
        sandboxes.insert(activation.run_id.clone(), sandbox.clone());
        Ok(sandbox)
    }
}
