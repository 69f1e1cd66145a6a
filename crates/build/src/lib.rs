//! Gfx6 pipeline build utilities
//!
//! This crate loads YAML pipeline manifests (device, client state, shader metadata and the
//! shader compiler's register list), compiles them with `gfx6-pipeline` and produces
//! serializable reports of the resulting register state and command streams.

pub mod manifest;
pub mod predefined;
pub mod report;

pub use manifest::{ManifestError, PipelineManifest};
pub use report::{PipelineReport, ReportError};

/// Compiles a YAML manifest file into a pipeline report
///
/// # Arguments
/// * `manifest_path` - Path to the YAML manifest file
///
/// # Returns
/// A report of the compiled pipeline's registers and command streams
pub fn manifest_file_to_report<P: AsRef<std::path::Path>>(manifest_path: P) -> Result<PipelineReport, ReportError> {
    let manifest = PipelineManifest::from_file(manifest_path)?;
    PipelineReport::from_manifest(&manifest)
}
