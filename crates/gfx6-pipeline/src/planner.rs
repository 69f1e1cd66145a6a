//! Stage activation and load planning
//!
//! `VGT_SHADER_STAGES_EN` decides which hardware stages run, and everything downstream
//! (signature, chunks, register counts) depends on it, so it is decoded first.

use crate::chunks::ChunkSet;
use crate::device::DeviceConfig;
use crate::error::PipelineError;
use crate::metadata::{HardwareStage, PipelineBinary};
use crate::regs::{self, VgtGsMode, VgtShaderStagesEn, VgtTfParam};
use crate::signature::{self, GraphicsPipelineSignature};

/// SH registers the pipeline itself loads: `SPI_SHADER_LATE_ALLOC_VS`
pub(crate) const BASE_LOADED_SH_REG_COUNT: u32 = 1;

/// Context registers the pipeline itself loads
///
/// `VGT_SHADER_STAGES_EN`, `VGT_GS_MODE`, `VGT_REUSE_OFF`, `VGT_TF_PARAM`, `CB_COLOR_CONTROL`,
/// `CB_TARGET_MASK`, `CB_SHADER_MASK`, `PA_CL_CLIP_CNTL`, `PA_SU_VTX_CNTL`, `PA_CL_VTE_CNTL`,
/// `PA_SC_LINE_CNTL`, `SPI_INTERP_CONTROL_0`, `VGT_VERTEX_REUSE_BLOCK_CNTL` and
/// `DB_SHADER_CONTROL`.
pub(crate) const BASE_LOADED_CTX_REG_COUNT: u32 = 14;

/// Which hardware stages a pipeline uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageActivation {
    pub stages_en: VgtShaderStagesEn,
    pub gs_mode: VgtGsMode,
    gs_on_chip: bool,
}

impl StageActivation {
    /// Decodes stage activation from the two registers that define it
    pub fn new(stages_en: VgtShaderStagesEn, gs_mode: VgtGsMode) -> Self {
        let gs_on_chip = stages_en.gs_en() != 0 && gs_mode.onchip() == regs::VGT_GS_MODE_ONCHIP;
        Self { stages_en, gs_mode, gs_on_chip }
    }

    pub fn is_tess_enabled(&self) -> bool {
        self.stages_en.hs_en() != 0
    }

    pub fn is_gs_enabled(&self) -> bool {
        self.stages_en.gs_en() != 0
    }

    pub fn is_gs_on_chip(&self) -> bool {
        self.gs_on_chip
    }

    /// Active hardware stages in pipeline order
    pub fn active_stages(&self) -> impl Iterator<Item = HardwareStage> + '_ {
        HardwareStage::ALL.into_iter().filter(|stage| self.is_stage_active(*stage))
    }

    pub fn is_stage_active(&self, stage: HardwareStage) -> bool {
        match stage {
            HardwareStage::Ls | HardwareStage::Hs => self.is_tess_enabled(),
            HardwareStage::Es | HardwareStage::Gs => self.is_gs_enabled(),
            HardwareStage::Vs | HardwareStage::Ps => true,
        }
    }

    /// Hardware stage running the client's vertex shader
    pub fn vertex_stage(&self) -> HardwareStage {
        if self.is_tess_enabled() {
            HardwareStage::Ls
        } else if self.is_gs_enabled() {
            HardwareStage::Es
        } else {
            HardwareStage::Vs
        }
    }
}

/// Facts gathered before upload that size and shape the rest of compilation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadInfo {
    /// SH registers to reserve in the load block; zero selects the SET path
    pub loaded_sh_reg_count: u32,
    /// Context registers to reserve in the load block; zero selects the SET path
    pub loaded_ctx_reg_count: u32,
    pub uses_onchip_tess: bool,
    pub uses_gs: bool,
    pub uses_onchip_gs: bool,
    /// GS user-data register receiving the ES/GS LDS size, or zero
    pub es_gs_lds_size_reg_gs: u16,
    /// VS user-data register receiving the ES/GS LDS size, or zero
    pub es_gs_lds_size_reg_vs: u16,
}

/// Result of planning a pipeline
#[derive(Debug)]
pub(crate) struct Plan {
    pub activation: StageActivation,
    pub signature: GraphicsPipelineSignature,
    pub load_info: LoadInfo,
    pub chunks: ChunkSet,
}

/// Decodes stage activation, builds the signature and lets each stage chunk reserve its registers
pub(crate) fn plan(device: &DeviceConfig, binary: &PipelineBinary) -> Result<Plan, PipelineError> {
    let registers = &binary.registers;

    let activation = StageActivation::new(VgtShaderStagesEn(registers.at(regs::VGT_SHADER_STAGES_EN)), VgtGsMode(registers.has_entry(regs::VGT_GS_MODE).unwrap_or(0)));

    let signature_output = signature::build_signature(&activation, &binary.metadata, registers)?;

    let mut load_info = LoadInfo {
        es_gs_lds_size_reg_gs: signature_output.es_gs_lds_size_reg_gs,
        es_gs_lds_size_reg_vs: signature_output.es_gs_lds_size_reg_vs,
        ..LoadInfo::default()
    };

    if device.settings.enable_load_index_for_object_binds {
        load_info.loaded_sh_reg_count = BASE_LOADED_SH_REG_COUNT;
        load_info.loaded_ctx_reg_count = BASE_LOADED_CTX_REG_COUNT;
    }

    let tf_param = VgtTfParam(registers.has_entry(regs::VGT_TF_PARAM).unwrap_or(0));
    if activation.is_tess_enabled() && (activation.stages_en.dynamic_hs() == 0 || tf_param.num_ds_waves_per_simd() > 0) {
        load_info.uses_onchip_tess = true;
    }
    load_info.uses_gs = activation.is_gs_enabled();
    load_info.uses_onchip_gs = activation.is_gs_on_chip();

    let mut chunks = ChunkSet::for_activation(&activation);
    chunks.early_init(device, registers, &mut load_info);

    debug_assert_eq!(load_info.loaded_sh_reg_count != 0, device.settings.enable_load_index_for_object_binds);
    debug_assert_eq!(load_info.loaded_ctx_reg_count != 0, device.settings.enable_load_index_for_object_binds);

    tracing::debug!(
        tess = activation.is_tess_enabled(),
        gs = activation.is_gs_enabled(),
        gs_on_chip = activation.is_gs_on_chip(),
        sh_regs = load_info.loaded_sh_reg_count,
        ctx_regs = load_info.loaded_ctx_reg_count,
        "planned graphics pipeline"
    );

    Ok(Plan { activation, signature: signature_output.signature, load_info, chunks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register_list::RegisterList;

    fn binary_with(pairs: &[(u16, u32)]) -> PipelineBinary {
        PipelineBinary { registers: RegisterList::from_pairs(pairs.iter().copied()).unwrap(), ..PipelineBinary::default() }
    }

    fn stages_en(hs: u32, gs: u32, dynamic_hs: u32) -> u32 {
        let mut reg = VgtShaderStagesEn::default();
        reg.set_hs_en(hs);
        reg.set_gs_en(gs);
        reg.set_dynamic_hs(dynamic_hs);
        reg.0
    }

    #[test]
    fn test_vs_ps_only() {
        let activation = StageActivation::new(VgtShaderStagesEn(0), VgtGsMode(0));
        let stages: Vec<_> = activation.active_stages().collect();
        assert_eq!(stages, vec![HardwareStage::Vs, HardwareStage::Ps]);
        assert_eq!(activation.vertex_stage(), HardwareStage::Vs);
    }

    #[test]
    fn test_gs_on_chip_requires_gs() {
        let mut gs_mode = VgtGsMode::default();
        gs_mode.set_onchip(regs::VGT_GS_MODE_ONCHIP);

        assert!(!StageActivation::new(VgtShaderStagesEn(stages_en(0, 0, 0)), gs_mode).is_gs_on_chip());
        let activation = StageActivation::new(VgtShaderStagesEn(stages_en(1, 1, 0)), gs_mode);
        assert!(activation.is_gs_on_chip());
        assert_eq!(activation.vertex_stage(), HardwareStage::Ls);
        assert_eq!(activation.active_stages().count(), 6);
    }

    #[test]
    fn test_preload_counts_are_paired() {
        let binary = binary_with(&[(regs::VGT_SHADER_STAGES_EN, stages_en(1, 1, 0))]);

        let mut device = DeviceConfig::default();
        let plan_set = plan(&device, &binary).unwrap();
        assert_eq!(plan_set.load_info.loaded_sh_reg_count, 0);
        assert_eq!(plan_set.load_info.loaded_ctx_reg_count, 0);

        device.settings.enable_load_index_for_object_binds = true;
        let plan_load = plan(&device, &binary).unwrap();
        assert!(plan_load.load_info.loaded_sh_reg_count > BASE_LOADED_SH_REG_COUNT);
        assert!(plan_load.load_info.loaded_ctx_reg_count > BASE_LOADED_CTX_REG_COUNT);
    }

    #[test]
    fn test_onchip_tess_detection() {
        let device = DeviceConfig::default();

        let static_hs = plan(&device, &binary_with(&[(regs::VGT_SHADER_STAGES_EN, stages_en(1, 0, 0))])).unwrap();
        assert!(static_hs.load_info.uses_onchip_tess);

        let dynamic_offchip = plan(&device, &binary_with(&[(regs::VGT_SHADER_STAGES_EN, stages_en(1, 0, 1))])).unwrap();
        assert!(!dynamic_offchip.load_info.uses_onchip_tess);

        let mut tf_param = VgtTfParam::default();
        tf_param.set_num_ds_waves_per_simd(2);
        let dynamic_onchip = plan(&device, &binary_with(&[(regs::VGT_SHADER_STAGES_EN, stages_en(1, 0, 1)), (regs::VGT_TF_PARAM, tf_param.0)])).unwrap();
        assert!(dynamic_onchip.load_info.uses_onchip_tess);
    }
}
