//! The activator translates activation jobs into workflow-code entry points,
//! accumulates commands, and hands the drained buffer back to the sandbox.
//!
//! One activator exists per workflow run. All bookkeeping lives in
//! [`ActivatorState`] behind a mutex shared with the [`WorkflowContext`]
//! handed to workflow code; the deterministic scheduler polls workflow tasks
//! while neither side holds the lock.

use super::registry::WorkflowRegistry;
use super::sandbox::HostFn;
use super::scheduler::Scheduler;
use crate::futures::{Promise, PromiseResolver};
use crate::payloads::{self, PayloadValue};
use crate::protocol::{
    self, StartWorkflow, TimerFired, WfActivation, WorkflowCommand, wf_activation_job,
};
use crate::ActivationError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

pub(crate) struct ActivatorState {
    workflow_id: String,
    run_id: String,
    /// Logical clock in ms. Advances only at activation entry and is the sole
    /// clock workflow code can observe.
    now_ms: u64,
    now_initialized: bool,
    /// Timer ids are decimal strings counting up from "0", assigned at
    /// request time.
    next_timer_seq: u32,
    timers: HashMap<String, PromiseResolver<()>>,
    commands: Vec<WorkflowCommand>,
    started: bool,
    /// Set once a terminal command has been buffered; later settles and
    /// activations leave the buffer untouched.
    completed: bool,
    rng: StdRng,
    host_fns: HashMap<String, HostFn>,
}

impl ActivatorState {
    fn start_timer(&mut self, delay: Duration) -> Promise<()> {
        let timer_id = self.next_timer_seq.to_string();
        self.next_timer_seq += 1;
        let delay_ms = delay.as_millis() as u64;
        self.commands
            .push(WorkflowCommand::start_timer(timer_id.clone(), delay_ms));
        let (promise, resolver) = Promise::pair();
        self.timers.insert(timer_id.clone(), resolver);
        debug!(
            target: "driftcore::activator",
            run_id = %self.run_id,
            timer_id = %timer_id,
            delay_ms,
            "timer started"
        );
        promise
    }
}

/// The deterministic surface workflow code sees.
///
/// Everything here consults the activator's state: the clock is the
/// activation timestamp, randomness comes from a PRNG seeded per workflow,
/// and logging routes through the injected `console.log` host function.
#[derive(Clone)]
pub struct WorkflowContext {
    inner: Arc<Mutex<ActivatorState>>,
}

impl WorkflowContext {
    pub fn workflow_id(&self) -> String {
        self.inner
            .lock()
            .expect("activator state poisoned")
            .workflow_id
            .clone()
    }

    pub fn run_id(&self) -> String {
        self.inner
            .lock()
            .expect("activator state poisoned")
            .run_id
            .clone()
    }

    /// The logical timestamp in ms. Constant for the whole activation,
    /// monotonic non-decreasing across activations.
    pub fn now_ms(&self) -> u64 {
        self.inner.lock().expect("activator state poisoned").now_ms
    }

    /// Deterministic pseudo-randomness in `[0, 1)`; replays yield the same
    /// sequence.
    pub fn random(&self) -> f64 {
        self.inner
            .lock()
            .expect("activator state poisoned")
            .rng
            .gen_range(0.0..1.0)
    }

    /// Register a timer and return the promise resolved when the matching
    /// `timerFired` job arrives. Sub-millisecond precision truncates.
    pub fn sleep(&self, delay: Duration) -> Promise<()> {
        self.inner
            .lock()
            .expect("activator state poisoned")
            .start_timer(delay)
    }

    /// Invoke the injected `console.log` host function, or fall back to a
    /// tracing event when nothing is injected.
    pub fn log(&self, args: Vec<serde_json::Value>) {
        let host_fn = {
            let state = self.inner.lock().expect("activator state poisoned");
            state.host_fns.get("console.log").cloned()
        };
        match host_fn {
            Some(f) => {
                f(&args);
            }
            None => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                tracing::info!(
                    target: "driftcore::workflow",
                    "{}",
                    rendered.join(" ")
                );
            }
        }
    }
}

pub(crate) struct Activator {
    state: Arc<Mutex<ActivatorState>>,
    scheduler: Scheduler,
    registry: WorkflowRegistry,
}

impl Activator {
    pub(crate) fn new(
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
        registry: WorkflowRegistry,
        host_fns: HashMap<String, HostFn>,
    ) -> Self {
        let workflow_id = workflow_id.into();
        let seed = seed_from_workflow_id(&workflow_id);
        Self {
            state: Arc::new(Mutex::new(ActivatorState {
                workflow_id,
                run_id: run_id.into(),
                now_ms: 0,
                now_initialized: false,
                next_timer_seq: 0,
                timers: HashMap::new(),
                commands: Vec::new(),
                started: false,
                completed: false,
                rng: StdRng::seed_from_u64(seed),
                host_fns,
            })),
            scheduler: Scheduler::new(),
            registry,
        }
    }

    pub(crate) fn inject(&self, name: impl Into<String>, f: HostFn) {
        self.state
            .lock()
            .expect("activator state poisoned")
            .host_fns
            .insert(name.into(), f);
    }

    /// Apply one activation: advance the clock, dispatch every job in order,
    /// drain the scheduler to quiescence, and return the command buffer.
    pub(crate) fn activate(
        &self,
        activation: WfActivation,
    ) -> Result<Vec<WorkflowCommand>, ActivationError> {
        let timestamp = activation
            .timestamp
            .as_ref()
            .ok_or_else(|| ActivationError::Nondeterminism {
                message: "activation has no timestamp".to_string(),
            })?;
        let ts_ms = protocol::timestamp_to_ms(timestamp)
            .map_err(|message| ActivationError::Nondeterminism { message })?;

        {
            let mut state = self.state.lock().expect("activator state poisoned");
            if state.now_initialized && ts_ms < state.now_ms {
                return Err(ActivationError::Nondeterminism {
                    message: format!(
                        "activation timestamp regressed: {} -> {} ms",
                        state.now_ms, ts_ms
                    ),
                });
            }
            state.now_ms = ts_ms;
            state.now_initialized = true;
            // Fresh buffer per activation; a failed previous activation may
            // have left partial commands behind.
            state.commands.clear();
        }

        for job in activation.jobs {
            match job.variant {
                Some(wf_activation_job::Variant::StartWorkflow(job)) => {
                    self.handle_start_workflow(job)?
                }
                Some(wf_activation_job::Variant::TimerFired(job)) => {
                    self.handle_timer_fired(job)?
                }
                None => {
                    return Err(ActivationError::Nondeterminism {
                        message: "activation job has no variant".to_string(),
                    });
                }
            }
        }

        self.scheduler.drain();

        let mut state = self.state.lock().expect("activator state poisoned");
        let commands: Vec<WorkflowCommand> = state.commands.drain(..).collect();
        debug!(
            target: "driftcore::activator",
            run_id = %state.run_id,
            command_count = commands.len(),
            completed = state.completed,
            "activation quiesced"
        );
        Ok(commands)
    }

    fn handle_start_workflow(&self, job: StartWorkflow) -> Result<(), ActivationError> {
        {
            let state = self.state.lock().expect("activator state poisoned");
            if state.started {
                return Err(ActivationError::Nondeterminism {
                    message: format!(
                        "duplicate startWorkflow for run '{}'",
                        state.run_id
                    ),
                });
            }
        }

        let handler = self
            .registry
            .resolve_handler(&job.workflow_type)
            .ok_or_else(|| ActivationError::WorkflowNotRegistered {
                workflow_type: job.workflow_type.clone(),
            })?;

        let args = payloads::from_payloads(job.arguments.as_ref())
            .map_err(|message| ActivationError::PayloadConversion { message })?;

        let ctx = WorkflowContext {
            inner: self.state.clone(),
        };
        let state = self.state.clone();
        {
            let mut st = state.lock().expect("activator state poisoned");
            st.started = true;
            debug!(
                target: "driftcore::activator",
                run_id = %st.run_id,
                workflow_type = %job.workflow_type,
                arg_count = args.len(),
                "workflow starting"
            );
        }

        // The root task: its settle continuation is the terminal-command
        // emitter, which also serves as the unhandled-rejection sink.
        self.scheduler.spawn(async move {
            let outcome = handler.invoke(ctx, args).await;
            settle_workflow(&state, outcome);
        });
        Ok(())
    }

    fn handle_timer_fired(&self, job: TimerFired) -> Result<(), ActivationError> {
        let resolver = {
            let mut state = self.state.lock().expect("activator state poisoned");
            match state.timers.remove(&job.timer_id) {
                Some(resolver) => resolver,
                None => {
                    warn!(
                        target: "driftcore::activator",
                        run_id = %state.run_id,
                        timer_id = %job.timer_id,
                        "timerFired for unknown timer"
                    );
                    return Err(ActivationError::Nondeterminism {
                        message: format!("timerFired for unknown timer '{}'", job.timer_id),
                    });
                }
            }
        };
        // Resolving only wakes continuations; they run during the drain.
        resolver.resolve(());
        Ok(())
    }
}

/// Buffer the terminal command for a settled workflow. No-op once a terminal
/// command exists: at most one is ever emitted per workflow lifetime.
fn settle_workflow(state: &Arc<Mutex<ActivatorState>>, outcome: Result<PayloadValue, String>) {
    let mut state = state.lock().expect("activator state poisoned");
    if state.completed {
        return;
    }
    state.completed = true;
    match outcome {
        Ok(value) => {
            let payload = payloads::to_payload(&value);
            state
                .commands
                .push(WorkflowCommand::complete_workflow_execution(vec![payload]));
            debug!(
                target: "driftcore::activator",
                run_id = %state.run_id,
                "workflow completed"
            );
        }
        Err(message) => {
            debug!(
                target: "driftcore::activator",
                run_id = %state.run_id,
                error = %message,
                "workflow failed"
            );
            state
                .commands
                .push(WorkflowCommand::fail_workflow_execution(message));
        }
    }
}

fn seed_from_workflow_id(workflow_id: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    // DefaultHasher with default keys is stable across processes, which is
    // what replay determinism needs here.
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    workflow_id.hash(&mut hasher);
    hasher.finish()
}
