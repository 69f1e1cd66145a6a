//! Pipeline lifetime telemetry
//!
//! Creation and memory-bind events are reported to an external sink for developer tools.
//! Delivery is best effort: a failing sink never fails pipeline creation.

use crate::create_info::GpuHeap;
use thiserror::Error;

/// Errors a telemetry sink may report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("event sink unavailable: {0}")]
    Unavailable(String),
}

/// Sent once a pipeline has been fully compiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineCreateEvent {
    /// Hash identifying the pipeline's context state
    pub context_reg_hash: u64,
    pub internal: bool,
    pub heap: GpuHeap,
}

/// Sent when the pipeline's GPU memory is bound to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineBindEvent {
    pub context_reg_hash: u64,
    pub gpu_va: u64,
    pub required_gpu_mem_size: u64,
    pub offset: u64,
}

/// Receiver of pipeline lifetime events
pub trait EventSink: Send + Sync {
    fn log_create(&self, event: &PipelineCreateEvent) -> Result<(), EventError>;
    fn log_bind(&self, event: &PipelineBindEvent) -> Result<(), EventError>;
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn log_create(&self, _event: &PipelineCreateEvent) -> Result<(), EventError> {
        Ok(())
    }

    fn log_bind(&self, _event: &PipelineBindEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Sends both lifetime events, logging and swallowing sink failures
pub(crate) fn report_created(sink: &dyn EventSink, create: &PipelineCreateEvent, bind: &PipelineBindEvent) {
    if let Err(e) = sink.log_create(create) {
        tracing::warn!(hash = create.context_reg_hash, "failed to log pipeline creation: {e}");
    }
    if let Err(e) = sink.log_bind(bind) {
        tracing::warn!(hash = bind.context_reg_hash, "failed to log pipeline memory bind: {e}");
    }
}
