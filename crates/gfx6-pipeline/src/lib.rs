//! Graphics pipeline compilation for Gfx6-family GPUs
//!
//! This crate turns the output of a shader compiler (machine code, a sparse list of hardware
//! register values and per-stage metadata) plus the client's fixed-function state into the
//! register images a Gfx6, Gfx7 or Gfx8 GPU needs, and emits them as PM4 packets when the
//! pipeline is bound. Registers can either be written inline with SET packets or pre-uploaded
//! once and bound with a single LOAD packet per register space.

pub mod chunks;
pub mod cmd_stream;
pub mod create_info;
pub mod device;
pub mod error;
pub mod events;
pub mod image;
mod late_alloc;
pub mod metadata;
pub mod out_of_order;
mod pipeline;
pub(crate) mod planner;
pub mod pm4;
mod prim_group;
pub mod rb_plus;
pub mod register_list;
pub mod regs;
pub mod rings;
mod setup;
pub mod signature;
pub mod upload;

pub use cmd_stream::CmdStream;
pub use create_info::PipelineCreateInfo;
pub use device::{Device, DeviceConfig};
pub use error::PipelineError;
pub use metadata::{HardwareStage, PipelineBinary, ShaderType};
pub use pipeline::{DynamicGraphicsShaderInfos, DynamicShaderInfo, GraphicsPipeline, ShaderStats};
pub use planner::StageActivation;
pub use setup::walk_fence_size;
pub use upload::{HostUploader, Uploader};
