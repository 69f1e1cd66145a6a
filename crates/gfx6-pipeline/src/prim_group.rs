//! `IA_MULTI_VGT_PARAM` derivation
//!
//! The register controls how the input assembler groups primitives and when the VGT may
//! switch between shader engines. Two variants are kept; draw-time code picks the odd one when
//! the draw requires `WD_SWITCH_ON_EOP`.

use crate::device::{DeviceConfig, GfxIpLevel};
use crate::image::{ContextRegs, NUM_IA_MULTI_VGT_PARAM};
use crate::planner::StageActivation;
use crate::register_list::RegisterList;
use crate::regs::{self, IaMultiVgtParam};

/// Primitives per group when grouping by input control points
const PRIMS_PER_CP_GROUP: u32 = 256;

/// `MAX_PRIMGRP_IN_WAVE` on Gfx8+
const GFX8_MAX_PRIMGRP_IN_WAVE: u32 = 2;

/// Computes both `IA_MULTI_VGT_PARAM` variants
///
/// # Arguments
/// * `device` - Device the pipeline targets
/// * `registers` - Registers from the pipeline binary
/// * `activation` - Active hardware stages
/// * `context` - Context registers after common setup, for `VGT_LS_HS_CONFIG` and `VGT_TF_PARAM`
pub(crate) fn ia_multi_vgt_params(device: &DeviceConfig, registers: &RegisterList, activation: &StageActivation, context: &ContextRegs) -> [IaMultiVgtParam; NUM_IA_MULTI_VGT_PARAM] {
    let mut base = IaMultiVgtParam(registers.has_entry(regs::IA_MULTI_VGT_PARAM).unwrap_or(0));
    let strmout_config = registers.has_entry(regs::VGT_STRMOUT_CONFIG).unwrap_or(0);
    let ls_hs_config = context.vgt_ls_hs_config;

    if activation.is_tess_enabled() {
        base.set_primgroup_size(ls_hs_config.num_patches().saturating_sub(1));
    } else if activation.is_gs_enabled() && ls_hs_config.hs_num_input_cp() != 0 {
        base.set_primgroup_size(PRIMS_PER_CP_GROUP / ls_hs_config.hs_num_input_cp() - 1);
    }

    if activation.is_gs_on_chip() {
        base.set_partial_es_wave_on(1);
    }

    if device.workarounds.misc_gs_null_prim && activation.is_tess_enabled() && activation.is_gs_enabled() {
        base.set_partial_vs_wave_on(1);
    }

    let mut params = [base; NUM_IA_MULTI_VGT_PARAM];
    for (idx, param) in params.iter_mut().enumerate() {
        if device.gfx_level() > GfxIpLevel::Gfx6 {
            fixup_ia_multi_vgt_param(device, activation, context, idx != 0, param);
        }

        if strmout_config != 0 && device.properties.num_shader_engines == 2 && param.partial_es_wave_on() == 0 && param.primgroup_size() >= PRIMS_PER_CP_GROUP {
            tracing::warn!(primgroup_size = param.primgroup_size(), "streamout on a two-engine part needs primitive groups under 256");
        }
    }
    params
}

/// Applies the Gfx7+ rules to one variant
///
/// `force_wd_switch_on_eop` is set for the variant used by draws that require it.
fn fixup_ia_multi_vgt_param(device: &DeviceConfig, activation: &StageActivation, context: &ContextRegs, force_wd_switch_on_eop: bool, param: &mut IaMultiVgtParam) {
    let num_shader_engines = device.properties.num_shader_engines;

    if activation.is_gs_enabled() && PRIMS_PER_CP_GROUP / (param.primgroup_size() + 1) >= device.properties.gs_vgt_table_depth.saturating_sub(3) {
        // The GS table can fill up before a primitive group completes
        param.set_partial_es_wave_on(1);
    }

    if device.gfx_level() >= GfxIpLevel::Gfx8 {
        param.set_max_primgrp_in_wave(GFX8_MAX_PRIMGRP_IN_WAVE);

        if context.vgt_tf_param.distribution_mode() != regs::NO_DIST {
            if activation.is_gs_enabled() {
                param.set_partial_es_wave_on(1);
            } else {
                param.set_partial_vs_wave_on(1);
            }
        }

        if activation.is_gs_enabled() && device.workarounds.shader_off_chip_gs_hang {
            param.set_partial_vs_wave_on(1);
        }
    }

    if param.switch_on_eop() == 1 || num_shader_engines <= 2 || force_wd_switch_on_eop {
        param.set_wd_switch_on_eop(1);
    } else {
        param.set_wd_switch_on_eop(0);
        param.set_switch_on_eoi(1);
        param.set_partial_es_wave_on(1);
    }

    if param.switch_on_eoi() == 1 && device.gfx_level() == GfxIpLevel::Gfx7 && num_shader_engines > 2 {
        param.set_partial_vs_wave_on(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{VgtGsMode, VgtLsHsConfig, VgtShaderStagesEn};

    fn activation(tess: bool, gs: bool, gs_on_chip: bool) -> StageActivation {
        let mut stages_en = VgtShaderStagesEn::default();
        stages_en.set_hs_en(u32::from(tess));
        stages_en.set_gs_en(u32::from(gs));
        let mut gs_mode = VgtGsMode::default();
        if gs_on_chip {
            gs_mode.set_onchip(regs::VGT_GS_MODE_ONCHIP);
        }
        StageActivation::new(stages_en, gs_mode)
    }

    fn device(gfx_level: GfxIpLevel, num_shader_engines: u32) -> DeviceConfig {
        let mut device = DeviceConfig::default();
        device.properties.gfx_level = gfx_level;
        device.properties.num_shader_engines = num_shader_engines;
        device
    }

    fn ls_hs_context(num_patches: u32, input_cp: u32) -> ContextRegs {
        let mut ls_hs_config = VgtLsHsConfig::default();
        ls_hs_config.set_num_patches(num_patches);
        ls_hs_config.set_hs_num_input_cp(input_cp);
        ContextRegs { vgt_ls_hs_config: ls_hs_config, ..ContextRegs::default() }
    }

    #[test]
    fn test_gfx6_keeps_binary_value() {
        let mut base = IaMultiVgtParam::default();
        base.set_primgroup_size(127);
        base.set_switch_on_eop(1);
        let registers = RegisterList::from_pairs([(regs::IA_MULTI_VGT_PARAM, base.0)]).unwrap();

        let params = ia_multi_vgt_params(&device(GfxIpLevel::Gfx6, 1), &registers, &activation(false, false, false), &ContextRegs::default());
        assert_eq!(params, [base, base]);
    }

    #[test]
    fn test_tess_primgroup_is_patch_count() {
        let params = ia_multi_vgt_params(&device(GfxIpLevel::Gfx8, 2), &RegisterList::default(), &activation(true, false, false), &ls_hs_context(16, 3));
        assert_eq!(params[0].primgroup_size(), 15);
        assert_eq!(params[0].max_primgrp_in_wave(), 2);
        assert_eq!(params[0].wd_switch_on_eop(), 1);
    }

    #[test]
    fn test_tess_gs_on_chip_two_engines() {
        let mut device = device(GfxIpLevel::Gfx8, 2);
        device.workarounds.misc_gs_null_prim = true;
        let params = ia_multi_vgt_params(&device, &RegisterList::default(), &activation(true, true, true), &ls_hs_context(8, 3));

        for param in params {
            assert_eq!(param.primgroup_size(), 7);
            assert_eq!(param.partial_es_wave_on(), 1);
            assert_eq!(param.partial_vs_wave_on(), 1);
            assert_eq!(param.wd_switch_on_eop(), 1);
        }
    }

    #[test]
    fn test_gs_primgroup_from_input_control_points() {
        let params = ia_multi_vgt_params(&device(GfxIpLevel::Gfx8, 2), &RegisterList::default(), &activation(false, true, false), &ls_hs_context(0, 6));
        assert_eq!(params[0].primgroup_size(), 256 / 6 - 1);
        // 256 / 42 = 6 is well below the table depth
        assert_eq!(params[0].partial_es_wave_on(), 0);
    }

    #[test]
    fn test_small_gs_groups_fill_the_gs_table() {
        let params = ia_multi_vgt_params(&device(GfxIpLevel::Gfx7, 2), &RegisterList::default(), &activation(false, true, false), &ls_hs_context(0, 32));
        assert_eq!(params[0].primgroup_size(), 7);
        assert_eq!(params[0].partial_es_wave_on(), 1);
    }

    #[test]
    fn test_many_engines_switch_on_eoi_unless_forced() {
        let params = ia_multi_vgt_params(&device(GfxIpLevel::Gfx7, 4), &RegisterList::default(), &activation(false, false, false), &ContextRegs::default());

        assert_eq!(params[0].wd_switch_on_eop(), 0);
        assert_eq!(params[0].switch_on_eoi(), 1);
        assert_eq!(params[0].partial_es_wave_on(), 1);
        assert_eq!(params[0].partial_vs_wave_on(), 1);

        assert_eq!(params[1].wd_switch_on_eop(), 1);
        assert_eq!(params[1].switch_on_eoi(), 0);
        assert_eq!(params[1].partial_vs_wave_on(), 0);
    }

    #[test]
    fn test_distributed_tess_forces_partial_waves() {
        let mut context = ls_hs_context(4, 3);
        context.vgt_tf_param.set_distribution_mode(1);
        let params = ia_multi_vgt_params(&device(GfxIpLevel::Gfx8, 2), &RegisterList::default(), &activation(true, false, false), &context);
        assert_eq!(params[0].partial_vs_wave_on(), 1);
        assert_eq!(params[0].partial_es_wave_on(), 0);
    }
}
