//! Predefined pipeline manifests.
//!
//! Maps a human-readable name to a manifest path relative to the project root. The set
//! covers each way a pipeline can reach the command buffer, so dumping them exercises both
//! bind paths and every stage layout.

/// Predefined pipelines, mapping a name to its YAML manifest file.
pub const PREDEFINED_MANIFESTS: &[(&str, &str)] = &[
    // Vertex and pixel shader only, with RB+ export optimization
    ("VS_PS_RB_PLUS", "manifests/vs_ps_rb_plus.yaml"),
    // Registers pre-uploaded and bound with LOAD_*_REG_INDEX
    ("VS_PS_LOAD_INDEX", "manifests/vs_ps_load_index.yaml"),
    // Full tessellation and geometry pipeline with on-chip GS
    ("TESS_GS_ONCHIP", "manifests/tess_gs_onchip.yaml"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PipelineManifest;
    use crate::report::PipelineReport;
    use std::path::Path;

    fn project_root() -> &'static Path {
        Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/../.."))
    }

    #[test]
    fn test_predefined_manifests_compile() {
        for (name, path) in PREDEFINED_MANIFESTS {
            let manifest = PipelineManifest::from_file(project_root().join(path)).unwrap_or_else(|e| panic!("{name}: {e}"));
            let report = PipelineReport::from_manifest(&manifest).unwrap_or_else(|e| panic!("{name}: {e}"));
            assert!(!report.context_commands.is_empty(), "{name}");
        }
    }

    #[test]
    fn test_predefined_names_are_unique() {
        let mut names: Vec<_> = PREDEFINED_MANIFESTS.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), PREDEFINED_MANIFESTS.len());
    }
}
