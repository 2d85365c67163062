//! # Driftcore: deterministic workflow activation core
//!
//! Driftcore is the activation loop of a durable-execution worker: it drives a
//! user-supplied workflow through a sequence of externally delivered
//! activations, deterministically translating the workflow's effects into
//! commands for a coordinating service. The workflow observes an illusion of
//! continuous execution; in reality it is suspended between activations and
//! resumed step-wise by a remote orchestrator.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use driftcore::payloads::PayloadValue;
//! use driftcore::runtime::{ActivationDriver, WorkflowRegistry};
//! use std::time::Duration;
//!
//! let registry = WorkflowRegistry::builder()
//!     .register("wait-and-greet", |ctx, _args| async move {
//!         ctx.sleep(Duration::from_millis(100)).await?;
//!         Ok(PayloadValue::Json("hello".into()))
//!     })
//!     .build();
//!
//! let driver = ActivationDriver::new(registry);
//! // feed length-delimited WFActivation frames:
//! // let completion = driver.handle_activation(task_token, frame)?;
//! ```
//!
//! ## Key Concepts
//!
//! - **Activation**: one driving message from the coordinator, carrying the
//!   jobs to apply (start the workflow, fire a timer).
//! - **Completion**: the response to an activation, carrying the commands the
//!   workflow emitted while the scheduler ran to quiescence.
//! - **Deterministic scheduler**: a single-threaded cooperative executor with
//!   a FIFO microtask queue. The host runtime's scheduler is never used for
//!   workflow code, so replays of the same activation sequence produce
//!   byte-identical completions.
//! - **Sandbox**: the per-workflow execution environment. Workflow code sees
//!   only a logical clock (frozen for the duration of an activation), a PRNG
//!   seeded from the workflow id, and injected host functions. Wall-clock
//!   time, OS entropy, and I/O are unreachable.
//!
//! ## Commands
//!
//! During one activation a workflow may append any number of `StartTimer`
//! commands and at most one terminal command (`CompleteWorkflowExecution` or
//! `FailWorkflowExecution`) to the command buffer. The buffer is drained into
//! a `CompleteTaskReq` that echoes the task token verbatim.
//!
//! Workflow business failures (an `Err` from the workflow future) are normal
//! outcomes and become `FailWorkflowExecution` commands. Everything else that
//! can go wrong — a `timerFired` for an unknown timer, a timestamp running
//! backwards, an undecodable frame — is an [`ActivationError`]: the activation
//! aborts, the sandbox is discarded, and the coordinator sees an activation
//! failure rather than a workflow outcome.

use serde::{Deserialize, Serialize};

pub mod futures;
pub mod payloads;
pub mod protocol;
pub mod runtime;

pub use futures::{Promise, PromiseResolver};
pub use payloads::PayloadValue;
pub use runtime::{
    ActivationDriver, ActivationRequest, ActivationResponse, WorkflowContext, WorkflowHandler,
    WorkflowRegistry, WorkflowRegistryBuilder, WorkflowSandbox,
};

/// Error raised when an activation cannot be processed.
///
/// These never describe workflow business failures (those are
/// `FailWorkflowExecution` commands inside a successful completion). An
/// `ActivationError` means the activation itself was unusable: the driver
/// reports it to the coordinator as an infrastructure failure and discards the
/// sandbox, because the scheduler state after a failed activation is
/// indeterminate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActivationError {
    /// The activation violated the protocol: a `timerFired` for a timer that
    /// was never started, a timestamp earlier than a previous activation's, a
    /// second `startWorkflow` for a live run, or a job with no variant.
    Nondeterminism { message: String },

    /// `startWorkflow` named a workflow type with no registered handler.
    WorkflowNotRegistered { workflow_type: String },

    /// The payload converter rejected an argument payload.
    PayloadConversion { message: String },

    /// The inbound frame was not a valid length-delimited `WFActivation`.
    Decode { message: String },

    /// The activation addressed a run the driver does not hold and cannot
    /// create (no `startWorkflow` job to create it from).
    UnknownRun { run_id: String },
}

impl ActivationError {
    /// Failure category for metrics and logging.
    pub fn category(&self) -> &'static str {
        match self {
            ActivationError::Nondeterminism { .. } => "nondeterminism",
            ActivationError::WorkflowNotRegistered { .. } => "configuration",
            ActivationError::PayloadConversion { .. } => "serialization",
            ActivationError::Decode { .. } => "decode",
            ActivationError::UnknownRun { .. } => "routing",
        }
    }

    /// Whether redelivering the activation could succeed.
    ///
    /// Nondeterminism and registry misses need a code or deployment change;
    /// retrying the same activation against a fresh sandbox reproduces them.
    pub fn is_retryable(&self) -> bool {
        match self {
            ActivationError::Nondeterminism { .. } => false,
            ActivationError::WorkflowNotRegistered { .. } => false,
            ActivationError::PayloadConversion { .. } => true,
            ActivationError::Decode { .. } => true,
            ActivationError::UnknownRun { .. } => true,
        }
    }
}

impl std::fmt::Display for ActivationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationError::Nondeterminism { message } => {
                write!(f, "nondeterministic activation: {message}")
            }
            ActivationError::WorkflowNotRegistered { workflow_type } => {
                write!(f, "workflow type '{workflow_type}' is not registered")
            }
            ActivationError::PayloadConversion { message } => {
                write!(f, "payload conversion failed: {message}")
            }
            ActivationError::Decode { message } => write!(f, "frame decode failed: {message}"),
            ActivationError::UnknownRun { run_id } => {
                write!(f, "no live workflow for run '{run_id}'")
            }
        }
    }
}

impl std::error::Error for ActivationError {}

impl From<prost::DecodeError> for ActivationError {
    fn from(err: prost::DecodeError) -> Self {
        ActivationError::Decode {
            message: err.to_string(),
        }
    }
}
