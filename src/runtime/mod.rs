//! The activation runtime: deterministic scheduler, activator, sandbox, and
//! the driver that sits between them and the transport.

use crate::payloads::PayloadValue;
use async_trait::async_trait;

pub mod activator;
pub mod driver;
pub mod registry;
pub mod sandbox;
pub mod scheduler;

pub use activator::WorkflowContext;
pub use driver::{ActivationDriver, ActivationRequest, ActivationResponse};
pub use registry::{WorkflowRegistry, WorkflowRegistryBuilder};
pub use sandbox::{HostFn, WorkflowSandbox};

/// A registered workflow implementation.
///
/// The returned `Err` message becomes the `FailWorkflowExecution` failure the
/// coordinator sees; it is a business outcome, not an infrastructure error.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    async fn invoke(
        &self,
        ctx: WorkflowContext,
        args: Vec<PayloadValue>,
    ) -> Result<PayloadValue, String>;
}

/// Function wrapper that implements `WorkflowHandler`.
pub struct FnWorkflow<F, Fut>(pub F)
where
    F: Fn(WorkflowContext, Vec<PayloadValue>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<PayloadValue, String>> + Send + 'static;

#[async_trait]
impl<F, Fut> WorkflowHandler for FnWorkflow<F, Fut>
where
    F: Fn(WorkflowContext, Vec<PayloadValue>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<PayloadValue, String>> + Send + 'static,
{
    async fn invoke(
        &self,
        ctx: WorkflowContext,
        args: Vec<PayloadValue>,
    ) -> Result<PayloadValue, String> {
        (self.0)(ctx, args).await
    }
}
