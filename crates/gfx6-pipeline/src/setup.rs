//! Derivation of the pipeline-level context registers
//!
//! Two passes fill [`ContextRegs`]: the common pass covers clipping, rasterization, depth
//! and VGT state, and the non-shader pass covers the color backend.

use crate::create_info::{LogicOp, MAX_COLOR_TARGETS, PipelineCreateInfo, PointOrigin, ShadeMode};
use crate::device::{DepthClampPolicy, DeviceConfig, GfxIpLevel, OutOfOrderPrimMode, TossPointMode};
use crate::error::PipelineError;
use crate::image::ContextRegs;
use crate::planner::StageActivation;
use crate::rb_plus::{RbPlusRegs, rop3};
use crate::register_list::RegisterList;
use crate::regs::{
    self, CbColorControl, CbShaderMask, CbTargetMask, DbShaderControl, GbTileMode0, PaClClipCntl, PaClVteCntl, PaScLineCntl, PaScModeCntl1, PaSuVtxCntl, SpiInterpControl0,
    VgtLsHsConfig, VgtReuseOff, VgtTfParam, VgtVertexReuseBlockCntl, cb_mode, z_order,
};

/// Write mask value enabling all four channels of render target 0
const RT0_ALL_CHANNELS: u32 = 0xF;

/// Maximum `OUT_OF_ORDER_WATER_MARK`
const MAX_OUT_OF_ORDER_WATER_MARK: u32 = 7;

const DEFAULT_VTX_REUSE_DEPTH: u32 = 14;
const EXTENDED_VTX_REUSE_DEPTH: u32 = 30;

/// `vs_half_pack_threshold` at or above which half-packing is off
const VS_HALF_PACK_DISABLED: u32 = 32;

/// Register sources shared by both setup passes
pub(crate) struct SetupInputs<'a> {
    pub device: &'a DeviceConfig,
    pub registers: &'a RegisterList,
    pub create_info: &'a PipelineCreateInfo,
    pub activation: &'a StageActivation,
}

/// Returns `PA_SC_MODE_CNTL_1.WALK_FENCE_SIZE` for a tiling pipe configuration
///
/// # Arguments
/// * `pipe_config` - `GB_TILE_MODE0.PIPE_CONFIG`
///
/// # Returns
/// The walk fence size, or an error for configurations the family does not have
pub fn walk_fence_size(pipe_config: u32) -> Result<u32, PipelineError> {
    match pipe_config {
        // 2-pipe configurations
        0..=3 => Ok(2),
        // 4-, 8- and 16-pipe configurations
        4..=14 | 16 | 17 => Ok(3),
        other => Err(PipelineError::UnsupportedPipeConfig(other)),
    }
}

/// Fills the clipping, rasterization, depth and VGT registers
pub(crate) fn setup_common_registers(inputs: &SetupInputs<'_>, context: &mut ContextRegs) -> Result<(), PipelineError> {
    let SetupInputs { device, registers, create_info, activation } = *inputs;
    let settings = &device.settings;
    let rs_state = &create_info.rs_state;

    context.vgt_shader_stages_en = activation.stages_en;
    context.vgt_gs_mode = activation.gs_mode;

    context.pa_cl_clip_cntl = PaClClipCntl(registers.at(regs::PA_CL_CLIP_CNTL));
    context.pa_cl_vte_cntl = PaClVteCntl(registers.at(regs::PA_CL_VTE_CNTL));
    context.pa_su_vtx_cntl = PaSuVtxCntl(registers.at(regs::PA_SU_VTX_CNTL));

    let mut mode_cntl_1 = PaScModeCntl1(registers.at(regs::PA_SC_MODE_CNTL_1));
    mode_cntl_1.set_out_of_order_water_mark(settings.out_of_order_watermark.min(MAX_OUT_OF_ORDER_WATER_MARK));
    if rs_state.out_of_order_prims_enable && settings.out_of_order_prims != OutOfOrderPrimMode::Disable {
        mode_cntl_1.set_out_of_order_primitive_enable(1);
    }
    mode_cntl_1.set_walk_fence_size(walk_fence_size(GbTileMode0(device.properties.gb_tile_mode0).pipe_config())?);
    if rs_state.force_sample_rate_shading {
        mode_cntl_1.set_ps_iter_sample(1);
    }
    context.pa_sc_mode_cntl_1 = mode_cntl_1;

    let db_shader_control = DbShaderControl(registers.at(regs::DB_SHADER_CONTROL));
    context.db_shader_control = db_shader_control;

    let disable_viewport_clamp = match settings.depth_clamp_policy {
        DepthClampPolicy::BasedOnZExport => rs_state.depth_clamp_disable && db_shader_control.z_export_enable() != 0,
        DepthClampPolicy::ClientOnly => rs_state.depth_clamp_disable,
    };
    context.db_render_override.set_disable_viewport_clamp(u32::from(disable_viewport_clamp));

    let order = db_shader_control.z_order();
    context.db_render_override.set_force_shader_z_order(u32::from(order == z_order::RE_Z));
    if device.workarounds.db_rez_stencil_corruption && (order == z_order::RE_Z || order == z_order::EARLY_Z_THEN_RE_Z) {
        context.db_render_override.set_force_stencil_read(1);
    }

    context.vgt_reuse_off = VgtReuseOff(registers.at(regs::VGT_REUSE_OFF));
    context.vgt_ls_hs_config = VgtLsHsConfig(registers.has_entry(regs::VGT_LS_HS_CONFIG).unwrap_or(0));

    let mut tf_param = VgtTfParam(registers.has_entry(regs::VGT_TF_PARAM).unwrap_or(0));
    if tf_param.num_ds_waves_per_simd() != 0 && activation.stages_en.dynamic_hs() != 0 {
        tf_param.set_num_ds_waves_per_simd(settings.ds_waves_per_simd_overflow);
    }
    context.vgt_tf_param = tf_param;

    let mut reuse_block = VgtVertexReuseBlockCntl::default();
    let mut reuse_depth = DEFAULT_VTX_REUSE_DEPTH;
    if device.gfx_level() >= GfxIpLevel::Gfx8
        && settings.vs_half_pack_threshold >= VS_HALF_PACK_DISABLED
        && (!settings.degenerate_prim_filter || (activation.is_tess_enabled() && tf_param.partitioning() != regs::PART_FRAC_ODD))
    {
        reuse_depth = EXTENDED_VTX_REUSE_DEPTH;
    }
    reuse_block.set_vtx_reuse_depth(reuse_depth);
    context.vgt_vertex_reuse_block_cntl = reuse_block;

    let mut interp_control = SpiInterpControl0(registers.has_entry(regs::SPI_INTERP_CONTROL_0).unwrap_or(0));
    interp_control.set_flat_shade_ena(u32::from(rs_state.shade_mode == ShadeMode::Flat));
    if interp_control.pnt_sprite_ena() != 0 {
        interp_control.set_pnt_sprite_top_1(u32::from(rs_state.point_coord_origin != PointOrigin::UpperLeft));
    }
    context.spi_interp_control_0 = interp_control;

    Ok(())
}

/// Fills the color backend registers
pub(crate) fn setup_non_shader_registers(inputs: &SetupInputs<'_>, context: &mut ContextRegs) {
    let SetupInputs { device, registers, create_info, .. } = *inputs;
    let rs_state = &create_info.rs_state;
    let cb_state = &create_info.cb_state;

    let mut line_cntl = PaScLineCntl::default();
    line_cntl.set_expand_line_width(u32::from(rs_state.expand_line_width));
    line_cntl.set_dx10_diamond_test_ena(1);
    line_cntl.set_last_pixel(u32::from(rs_state.rasterize_last_line_pixel));
    line_cntl.set_perpendicular_endcap_ena(u32::from(rs_state.perp_line_end_caps_enable));
    context.pa_sc_line_cntl = line_cntl;

    let mut shader_mask = CbShaderMask(registers.at(regs::CB_SHADER_MASK));
    let mut target_mask = CbTargetMask((0..MAX_COLOR_TARGETS).fold(0, |mask, slot| mask | (u32::from(create_info.target_mask(slot) & 0xF) << (4 * slot))));
    let mut color_control = CbColorControl::default();

    let special = &create_info.special;
    let special_mode = if special.fast_clear_eliminate {
        Some(cb_mode::ELIMINATE_FAST_CLEAR)
    } else if special.fmask_decompress {
        Some(cb_mode::FMASK_DECOMPRESS)
    } else if special.dcc_decompress {
        Some(cb_mode::DCC_DECOMPRESS)
    } else {
        None
    };

    if let Some(mode) = special_mode {
        color_control.set_mode(mode);
        color_control.set_rop3(u32::from(rop3(LogicOp::Copy)));
        shader_mask = CbShaderMask(RT0_ALL_CHANNELS);
        target_mask = CbTargetMask(RT0_ALL_CHANNELS);
    } else if special.resolve_fixed_func {
        color_control.set_mode(cb_mode::RESOLVE);
        color_control.set_rop3(u32::from(rop3(LogicOp::Copy)));
        shader_mask.set_output0_enable(RT0_ALL_CHANNELS);
        target_mask.set_target0_enable(RT0_ALL_CHANNELS);
    } else if shader_mask.0 == 0 || target_mask.0 == 0 {
        color_control.set_mode(cb_mode::DISABLE);
    } else {
        color_control.set_mode(cb_mode::NORMAL);
        color_control.set_rop3(u32::from(rop3(cb_state.logic_op)));
    }

    if cb_state.dual_source_blend_enable && ((shader_mask.0 & 0x0F) == 0 || (shader_mask.0 & 0xF0) == 0) {
        tracing::warn!(shader_mask = shader_mask.0, "dual-source blending without both color exports, disabling color writes");
        color_control.set_mode(cb_mode::DISABLE);
    }

    context.db_alpha_to_mask.set_alpha_to_mask_enable(u32::from(cb_state.alpha_to_coverage_enable));

    let rb_plus_supported = device.properties.rb_plus;
    if device.settings.rb_plus_enable && rb_plus_supported && !cb_state.dual_source_blend_enable && color_control.mode() != cb_mode::RESOLVE {
        color_control.set_disable_dual_quad(0);
        let mut rb_plus = RbPlusRegs::default();
        for (slot, target) in cb_state.targets.iter().enumerate() {
            rb_plus.setup_slot(slot, target.channel_write_mask, target.format);
        }
        context.rb_plus = rb_plus;
    } else if rb_plus_supported {
        color_control.set_disable_dual_quad(1);
    }

    if device.settings.toss_point_mode == TossPointMode::AfterPs && !create_info.internal {
        target_mask = CbTargetMask(0);
    }

    context.cb_color_control = color_control;
    context.cb_shader_mask = shader_mask;
    context.cb_target_mask = target_mask;
}
