//! Shared helpers for driving the activation core in integration tests:
//! activation builders, payload constructors, completion decoding, and the
//! registry of test workflows.

#![allow(dead_code)]

use driftcore::payloads::{self, PayloadValue};
use driftcore::protocol::{
    self, CompleteTaskReq, Payload, Payloads, StartWorkflow, WfActivation, WfActivationJob,
    WorkflowCommand, complete_task_req, wf_activation_completion, workflow_command,
};
use driftcore::runtime::{ActivationDriver, WorkflowRegistry};
use driftcore::futures as wf_futures;
use prost::Message;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WORKFLOW_ID: &str = "test-workflowId";
pub const RUN_ID: &str = "test-runId";
pub const TASK_TOKEN: &[u8] = b"test-task-token";

pub fn json_payload(value: &Value) -> Payload {
    payloads::to_payload(&PayloadValue::Json(value.clone()))
}

pub fn null_payload() -> Payload {
    payloads::to_payload(&PayloadValue::Null)
}

pub fn raw_payload(bytes: &[u8]) -> Payload {
    payloads::to_payload(&PayloadValue::Raw(bytes.to_vec()))
}

pub fn start_workflow_job(workflow_type: &str, arguments: Vec<Payload>) -> WfActivationJob {
    WfActivationJob::start_workflow(StartWorkflow {
        workflow_id: WORKFLOW_ID.into(),
        workflow_type: workflow_type.into(),
        arguments: if arguments.is_empty() {
            None
        } else {
            Some(Payloads {
                payloads: arguments,
            })
        },
    })
}

pub fn timer_fired_job(timer_id: &str) -> WfActivationJob {
    WfActivationJob::timer_fired(timer_id)
}

pub fn activation(ts_ms: u64, jobs: Vec<WfActivationJob>) -> WfActivation {
    WfActivation {
        run_id: RUN_ID.into(),
        timestamp: Some(protocol::ms_to_timestamp(ts_ms)),
        jobs,
    }
}

pub fn encode_activation(activation: &WfActivation) -> Vec<u8> {
    activation.encode_length_delimited_to_vec()
}

pub fn decode_completion(frame: &[u8]) -> CompleteTaskReq {
    CompleteTaskReq::decode_length_delimited(frame).expect("completion frame decodes")
}

/// Unwrap the command list of a successful workflow completion.
pub fn commands_of(req: &CompleteTaskReq) -> &[WorkflowCommand] {
    let Some(complete_task_req::Completion::Workflow(completion)) = &req.completion else {
        panic!("completion is not a workflow completion");
    };
    match &completion.status {
        Some(wf_activation_completion::Status::Successful(success)) => &success.commands,
        other => panic!("completion not successful: {other:?}"),
    }
}

pub fn expect_start_timer(command: &WorkflowCommand) -> (&str, u64) {
    match &command.variant {
        Some(workflow_command::Variant::StartTimer(timer)) => {
            let timeout = timer
                .start_to_fire_timeout
                .as_ref()
                .expect("startTimer has a timeout");
            (
                timer.timer_id.as_str(),
                protocol::duration_to_ms(timeout).expect("timeout converts"),
            )
        }
        other => panic!("expected startTimer, got {other:?}"),
    }
}

pub fn expect_complete(command: &WorkflowCommand) -> &[Payload] {
    match &command.variant {
        Some(workflow_command::Variant::CompleteWorkflowExecution(complete)) => {
            &complete.result.as_ref().expect("completion has result").payloads
        }
        other => panic!("expected completeWorkflowExecution, got {other:?}"),
    }
}

pub fn expect_fail(command: &WorkflowCommand) -> &str {
    match &command.variant {
        Some(workflow_command::Variant::FailWorkflowExecution(fail)) => {
            &fail.failure.as_ref().expect("failure is populated").message
        }
        other => panic!("expected failWorkflowExecution, got {other:?}"),
    }
}

/// Collects every `console.log` call as its argument list.
#[derive(Clone, Default)]
pub struct LogSink {
    entries: Arc<Mutex<Vec<Vec<Value>>>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Vec<Value>> {
        self.entries.lock().unwrap().clone()
    }

    pub fn install(&self, driver: &ActivationDriver) {
        let entries = self.entries.clone();
        driver.inject(
            "console.log",
            Arc::new(move |args: &[Value]| {
                entries.lock().unwrap().push(args.to_vec());
                None
            }),
        );
    }
}

/// The workflows the integration suite drives.
pub fn test_registry() -> WorkflowRegistry {
    WorkflowRegistry::builder()
        .register("returns-success", |_ctx, _args| async move {
            Ok(PayloadValue::Json(json!("success")))
        })
        .register("throws-immediately", |_ctx, _args| async move {
            Err("failure".to_string())
        })
        .register("rejects-async", |_ctx, _args| async move {
            wf_futures::Promise::<()>::rejected("failure").await?;
            Ok(PayloadValue::Null)
        })
        .register("sleeps-then-logs", |ctx, _args| async move {
            ctx.sleep(Duration::from_millis(100)).await?;
            ctx.log(vec![json!("slept")]);
            Ok(PayloadValue::Null)
        })
        .register("races-two-timers", |ctx, _args| async move {
            let short = ctx.sleep(Duration::from_millis(20));
            let long = ctx.sleep(Duration::from_millis(30));
            wf_futures::race(vec![short, long]).await?;
            Ok(PayloadValue::Null)
        })
        .register("joins-two-timers", |ctx, _args| async move {
            let first = ctx.sleep(Duration::from_millis(10));
            let second = ctx.sleep(Duration::from_millis(20));
            wf_futures::all(vec![first, second]).await?;
            Ok(PayloadValue::Json(json!("both")))
        })
        .register("greets-from-args", |_ctx, args| async move {
            let greeting = match args.first() {
                Some(PayloadValue::Json(Value::String(s))) => s.clone(),
                other => return Err(format!("unexpected first argument: {other:?}")),
            };
            let name = match args.get(2) {
                Some(PayloadValue::Raw(bytes)) => String::from_utf8(bytes.clone())
                    .map_err(|e| format!("name is not UTF-8: {e}"))?,
                other => return Err(format!("unexpected third argument: {other:?}")),
            };
            Ok(PayloadValue::Json(Value::String(format!(
                "{greeting}, {name}"
            ))))
        })
        .register("measures-sleep", |ctx, _args| async move {
            let before = ctx.now_ms();
            ctx.sleep(Duration::from_millis(100)).await?;
            let elapsed = ctx.now_ms() - before;
            Ok(PayloadValue::Json(json!(elapsed)))
        })
        .register("samples-entropy", |ctx, _args| async move {
            let first = ctx.random();
            ctx.sleep(Duration::from_millis(5)).await?;
            let second = ctx.random();
            Ok(PayloadValue::Json(json!([first, second])))
        })
        .build()
}

pub fn test_driver() -> ActivationDriver {
    ActivationDriver::new(test_registry())
}

/// Drive one activation through a driver and decode the completion.
pub fn run_activation(driver: &ActivationDriver, activation: &WfActivation) -> CompleteTaskReq {
    let frame = encode_activation(activation);
    let completion = driver
        .handle_activation(TASK_TOKEN, &frame)
        .expect("activation succeeds");
    decode_completion(&completion)
}
