//! Errors raised while compiling a graphics pipeline

use crate::signature::SignatureError;
use crate::upload::UploadError;
use thiserror::Error;

/// Reasons a graphics pipeline cannot be compiled
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The shader compiler emitted user-data registers that cannot be mapped
    #[error("invalid user-data signature: {0}")]
    Signature(#[from] SignatureError),
    /// `GB_TILE_MODE0.PIPE_CONFIG` names a tiling configuration this family does not have
    #[error("unsupported tiling pipe config {0}")]
    UnsupportedPipeConfig(u32),
    #[error("pipeline upload failed: {0}")]
    Upload(#[from] UploadError),
}
