//! Register image owned by a compiled pipeline
//!
//! Holds the registers the pipeline itself derives; registers owned by a single stage pair
//! live in that pair's chunk.

use crate::regs::{
    CbColorControl, CbShaderMask, CbTargetMask, DbAlphaToMask, DbRenderOverride, DbShaderControl, IaMultiVgtParam, PaClClipCntl, PaClVteCntl, PaScLineCntl, PaScModeCntl1, PaSuVtxCntl,
    SpiInterpControl0, SpiShaderLateAllocVs, VgtGsMode, VgtLsHsConfig, VgtReuseOff, VgtShaderStagesEn, VgtTfParam, VgtVertexReuseBlockCntl,
};
use crate::planner::BASE_LOADED_CTX_REG_COUNT;
use crate::rb_plus::RbPlusRegs;
use crate::regs;
use bytemuck::{Pod, Zeroable};
use serde::Serialize;

/// Number of `IA_MULTI_VGT_PARAM` variants; the odd one forces `WD_SWITCH_ON_EOP`
pub const NUM_IA_MULTI_VGT_PARAM: usize = 2;

/// Context registers shared by every stage
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct ContextRegs {
    pub vgt_shader_stages_en: VgtShaderStagesEn,
    pub vgt_gs_mode: VgtGsMode,
    pub vgt_tf_param: VgtTfParam,
    pub vgt_ls_hs_config: VgtLsHsConfig,
    pub vgt_reuse_off: VgtReuseOff,
    pub vgt_vertex_reuse_block_cntl: VgtVertexReuseBlockCntl,
    /// Written by draw-time code, which picks the variant
    pub ia_multi_vgt_param: [IaMultiVgtParam; NUM_IA_MULTI_VGT_PARAM],
    pub cb_color_control: CbColorControl,
    pub cb_target_mask: CbTargetMask,
    pub cb_shader_mask: CbShaderMask,
    pub pa_cl_clip_cntl: PaClClipCntl,
    pub pa_su_vtx_cntl: PaSuVtxCntl,
    pub pa_cl_vte_cntl: PaClVteCntl,
    pub pa_sc_line_cntl: PaScLineCntl,
    /// Written by draw-time code
    pub pa_sc_mode_cntl_1: PaScModeCntl1,
    pub spi_interp_control_0: SpiInterpControl0,
    pub db_shader_control: DbShaderControl,
    pub db_render_override: DbRenderOverride,
    pub db_alpha_to_mask: DbAlphaToMask,
    /// Written by draw-time code alongside the bound color targets
    pub rb_plus: RbPlusRegs,
}

impl ContextRegs {
    /// Pipeline-level registers that go into the preloaded context block, in upload order
    pub(crate) fn preloaded_writes(&self) -> [(u16, u32); BASE_LOADED_CTX_REG_COUNT as usize] {
        [
            (regs::PA_CL_CLIP_CNTL, self.pa_cl_clip_cntl.0),
            (regs::PA_CL_VTE_CNTL, self.pa_cl_vte_cntl.0),
            (regs::PA_SU_VTX_CNTL, self.pa_su_vtx_cntl.0),
            (regs::DB_SHADER_CONTROL, self.db_shader_control.0),
            (regs::VGT_SHADER_STAGES_EN, self.vgt_shader_stages_en.0),
            (regs::VGT_GS_MODE, self.vgt_gs_mode.0),
            (regs::VGT_REUSE_OFF, self.vgt_reuse_off.0),
            (regs::VGT_TF_PARAM, self.vgt_tf_param.0),
            (regs::VGT_VERTEX_REUSE_BLOCK_CNTL, self.vgt_vertex_reuse_block_cntl.0),
            (regs::SPI_INTERP_CONTROL_0, self.spi_interp_control_0.0),
            (regs::PA_SC_LINE_CNTL, self.pa_sc_line_cntl.0),
            (regs::CB_COLOR_CONTROL, self.cb_color_control.0),
            (regs::CB_SHADER_MASK, self.cb_shader_mask.0),
            (regs::CB_TARGET_MASK, self.cb_target_mask.0),
        ]
    }
}

/// SH registers shared by every stage
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct ShRegs {
    pub spi_shader_late_alloc_vs: SpiShaderLateAllocVs,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct RegisterImage {
    pub context: ContextRegs,
    pub sh: ShRegs,
}

/// Pre-uploaded register blocks bound with `LOAD_*_REG_INDEX`
///
/// Counts are both zero (SET path) or both non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadBlock {
    pub gpu_va_ctx: u64,
    /// Context registers in the block
    pub count_ctx: u32,
    pub gpu_va_sh: u64,
    /// SH registers in the block
    pub count_sh: u32,
}

impl LoadBlock {
    pub fn is_empty(&self) -> bool {
        self.count_ctx == 0 && self.count_sh == 0
    }
}
