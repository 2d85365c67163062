//! Wire messages exchanged with the coordinator.
//!
//! Both directions use length-delimited protocol buffers: inbound
//! [`WfActivation`] frames, outbound [`CompleteTaskReq`] frames. The message
//! definitions are hand-checked-in prost structs (no build script, no protoc
//! at build time); tags are part of the wire contract and must not change.
//!
//! Payload metadata uses a `BTreeMap` so that encoding a completion is
//! byte-deterministic — identical activation sequences must produce identical
//! completion frames.

use prost::Message;
use std::collections::BTreeMap;

pub use prost_types::{Duration, Timestamp};

/// An opaque user datum with a metadata map declaring its encoding.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Payload {
    #[prost(btree_map = "string, bytes", tag = "1")]
    pub metadata: BTreeMap<String, Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub data: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Payloads {
    #[prost(message, repeated, tag = "1")]
    pub payloads: Vec<Payload>,
}

/// One driving message from the coordinator.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WfActivation {
    #[prost(string, tag = "1")]
    pub run_id: String,
    #[prost(message, optional, tag = "2")]
    pub timestamp: Option<Timestamp>,
    #[prost(message, repeated, tag = "3")]
    pub jobs: Vec<WfActivationJob>,
}

/// One unit of work within an activation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WfActivationJob {
    #[prost(oneof = "wf_activation_job::Variant", tags = "1, 2")]
    pub variant: Option<wf_activation_job::Variant>,
}

pub mod wf_activation_job {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Variant {
        #[prost(message, tag = "1")]
        StartWorkflow(super::StartWorkflow),
        #[prost(message, tag = "2")]
        TimerFired(super::TimerFired),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartWorkflow {
    #[prost(string, tag = "1")]
    pub workflow_id: String,
    #[prost(string, tag = "2")]
    pub workflow_type: String,
    #[prost(message, optional, tag = "3")]
    pub arguments: Option<Payloads>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimerFired {
    #[prost(string, tag = "1")]
    pub timer_id: String,
}

/// One outgoing instruction to the coordinator.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkflowCommand {
    #[prost(oneof = "workflow_command::Variant", tags = "1, 2, 3")]
    pub variant: Option<workflow_command::Variant>,
}

pub mod workflow_command {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Variant {
        #[prost(message, tag = "1")]
        StartTimer(super::StartTimer),
        #[prost(message, tag = "2")]
        CompleteWorkflowExecution(super::CompleteWorkflowExecution),
        #[prost(message, tag = "3")]
        FailWorkflowExecution(super::FailWorkflowExecution),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartTimer {
    #[prost(string, tag = "1")]
    pub timer_id: String,
    #[prost(message, optional, tag = "2")]
    pub start_to_fire_timeout: Option<Duration>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompleteWorkflowExecution {
    #[prost(message, optional, tag = "1")]
    pub result: Option<Payloads>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Failure {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FailWorkflowExecution {
    #[prost(message, optional, tag = "1")]
    pub failure: Option<Failure>,
}

/// The result of running one activation to quiescence.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WfActivationCompletion {
    #[prost(oneof = "wf_activation_completion::Status", tags = "1, 2")]
    pub status: Option<wf_activation_completion::Status>,
}

pub mod wf_activation_completion {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Status {
        #[prost(message, tag = "1")]
        Successful(super::Success),
        #[prost(message, tag = "2")]
        Failed(super::Failure),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Success {
    #[prost(message, repeated, tag = "1")]
    pub commands: Vec<WorkflowCommand>,
}

/// Outbound frame: the completion plus the task token echoed verbatim.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompleteTaskReq {
    #[prost(bytes = "vec", tag = "1")]
    pub task_token: Vec<u8>,
    #[prost(oneof = "complete_task_req::Completion", tags = "2")]
    pub completion: Option<complete_task_req::Completion>,
}

pub mod complete_task_req {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Completion {
        #[prost(message, tag = "2")]
        Workflow(super::WfActivationCompletion),
    }
}

impl WfActivationJob {
    pub fn start_workflow(job: StartWorkflow) -> Self {
        Self {
            variant: Some(wf_activation_job::Variant::StartWorkflow(job)),
        }
    }

    pub fn timer_fired(timer_id: impl Into<String>) -> Self {
        Self {
            variant: Some(wf_activation_job::Variant::TimerFired(TimerFired {
                timer_id: timer_id.into(),
            })),
        }
    }
}

impl WorkflowCommand {
    pub fn start_timer(timer_id: impl Into<String>, delay_ms: u64) -> Self {
        Self {
            variant: Some(workflow_command::Variant::StartTimer(StartTimer {
                timer_id: timer_id.into(),
                start_to_fire_timeout: Some(ms_to_duration(delay_ms)),
            })),
        }
    }

    pub fn complete_workflow_execution(payloads: Vec<Payload>) -> Self {
        Self {
            variant: Some(workflow_command::Variant::CompleteWorkflowExecution(
                CompleteWorkflowExecution {
                    result: Some(Payloads { payloads }),
                },
            )),
        }
    }

    pub fn fail_workflow_execution(message: impl Into<String>) -> Self {
        Self {
            variant: Some(workflow_command::Variant::FailWorkflowExecution(
                FailWorkflowExecution {
                    failure: Some(Failure {
                        message: message.into(),
                    }),
                },
            )),
        }
    }
}

impl CompleteTaskReq {
    /// Wrap a command buffer in a successful workflow completion.
    pub fn successful(task_token: Vec<u8>, commands: Vec<WorkflowCommand>) -> Self {
        Self {
            task_token,
            completion: Some(complete_task_req::Completion::Workflow(
                WfActivationCompletion {
                    status: Some(wf_activation_completion::Status::Successful(Success {
                        commands,
                    })),
                },
            )),
        }
    }
}

/// Decode a length-delimited activation frame.
pub fn decode_activation(frame: &[u8]) -> Result<WfActivation, prost::DecodeError> {
    WfActivation::decode_length_delimited(frame)
}

/// Encode a completion as a length-delimited frame.
pub fn encode_completion(req: &CompleteTaskReq) -> Vec<u8> {
    req.encode_length_delimited_to_vec()
}

const NANOS_PER_MS: u64 = 1_000_000;
const MS_PER_SECOND: u64 = 1_000;

/// `ms` → proto `Duration`, millisecond precision.
pub fn ms_to_duration(ms: u64) -> Duration {
    Duration {
        seconds: (ms / MS_PER_SECOND) as i64,
        nanos: ((ms % MS_PER_SECOND) * NANOS_PER_MS) as i32,
    }
}

/// Inverse of [`ms_to_duration`]. Sub-millisecond nanos truncate.
pub fn duration_to_ms(duration: &Duration) -> Result<u64, String> {
    if duration.seconds < 0 || duration.nanos < 0 {
        return Err(format!(
            "negative duration: {}s {}ns",
            duration.seconds, duration.nanos
        ));
    }
    Ok(duration.seconds as u64 * MS_PER_SECOND + duration.nanos as u64 / NANOS_PER_MS)
}

/// `ms` since the epoch → proto `Timestamp`.
pub fn ms_to_timestamp(ms: u64) -> Timestamp {
    Timestamp {
        seconds: (ms / MS_PER_SECOND) as i64,
        nanos: ((ms % MS_PER_SECOND) * NANOS_PER_MS) as i32,
    }
}

/// Inverse of [`ms_to_timestamp`]. Pre-epoch timestamps are rejected.
pub fn timestamp_to_ms(ts: &Timestamp) -> Result<u64, String> {
    if ts.seconds < 0 || ts.nanos < 0 {
        return Err(format!("timestamp before epoch: {}s {}ns", ts.seconds, ts.nanos));
    }
    Ok(ts.seconds as u64 * MS_PER_SECOND + ts.nanos as u64 / NANOS_PER_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_round_trips_through_duration() {
        for ms in [0u64, 1, 999, 1000, 1001, 1500, 12_345, 86_400_000] {
            assert_eq!(duration_to_ms(&ms_to_duration(ms)).unwrap(), ms);
        }
    }

    #[test]
    fn ms_round_trips_through_timestamp() {
        for ms in [0u64, 1, 999, 1000, 1_693_000_000_123] {
            assert_eq!(timestamp_to_ms(&ms_to_timestamp(ms)).unwrap(), ms);
        }
    }

    #[test]
    fn duration_splits_seconds_and_nanos() {
        let d = ms_to_duration(1234);
        assert_eq!(d.seconds, 1);
        assert_eq!(d.nanos, 234_000_000);
    }

    #[test]
    fn pre_epoch_timestamp_is_rejected() {
        let ts = Timestamp {
            seconds: -1,
            nanos: 0,
        };
        assert!(timestamp_to_ms(&ts).is_err());
    }

    #[test]
    fn activation_round_trips_length_delimited() {
        let activation = WfActivation {
            run_id: "run-1".into(),
            timestamp: Some(ms_to_timestamp(5000)),
            jobs: vec![WfActivationJob::timer_fired("0")],
        };
        let frame = activation.encode_length_delimited_to_vec();
        let decoded = decode_activation(&frame).unwrap();
        assert_eq!(decoded, activation);
    }

    #[test]
    fn completion_echoes_token_bytes() {
        let req = CompleteTaskReq::successful(vec![0xde, 0xad], vec![]);
        let frame = encode_completion(&req);
        let decoded = CompleteTaskReq::decode_length_delimited(frame.as_slice()).unwrap();
        assert_eq!(decoded.task_token, vec![0xde, 0xad]);
    }
}
