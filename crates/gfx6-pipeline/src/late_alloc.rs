//! Late-alloc VS wave limit
//!
//! Late allocation lets VS waves launch before their export space is reserved. Too many of
//! them can deadlock against the pixel shader, so the limit is kept below what the CUs can
//! actually hold.

use crate::create_info::PipelineCreateInfo;
use crate::device::{DeviceConfig, GfxIpLevel};
use crate::register_list::RegisterList;
use crate::regs::{self, SpiShaderLateAllocVs, SpiShaderPgmRsrc1, SpiShaderPgmRsrc2};

/// SGPRs per `PGM_RSRC1.SGPRS` granule
const SGPR_GRANULE: u32 = 8;
/// VGPRs per `PGM_RSRC1.VGPRS` granule
const VGPR_GRANULE: u32 = 4;

/// Computes `SPI_SHADER_LATE_ALLOC_VS`; the register does not exist on Gfx6
pub(crate) fn late_alloc_vs(device: &DeviceConfig, registers: &RegisterList, create_info: &PipelineCreateInfo) -> SpiShaderLateAllocVs {
    let mut late_alloc = SpiShaderLateAllocVs::default();
    if device.gfx_level() == GfxIpLevel::Gfx6 {
        return late_alloc;
    }

    let properties = &device.properties;
    let settings = &device.settings;

    let vs_rsrc1 = SpiShaderPgmRsrc1(registers.at(regs::SPI_SHADER_VS.pgm_rsrc1));
    let vs_rsrc2 = SpiShaderPgmRsrc2(registers.at(regs::SPI_SHADER_VS.pgm_rsrc2));
    let ps_rsrc2 = SpiShaderPgmRsrc2(registers.at(regs::SPI_SHADER_PS.pgm_rsrc2));

    let target = create_info.late_alloc_vs_limit.unwrap_or(settings.late_alloc_vs_limit);
    let vs_num_sgprs = vs_rsrc1.sgprs() * SGPR_GRANULE;
    let vs_num_vgprs = vs_rsrc1.vgprs() * VGPR_GRANULE;

    let mut limit = target;
    if !settings.use_fixed_late_alloc_vs_limit && target > 0 && vs_num_sgprs > 0 && vs_num_vgprs > 0 {
        let num_cu = if settings.late_alloc_vs_on_cu_always_on { properties.num_cu_always_on_per_sh } else { properties.num_cu_per_sh };
        let simd_per_sh = num_cu * properties.num_simd_per_cu;

        let mut max_vs_waves = (properties.num_physical_sgprs / vs_num_sgprs).min(properties.num_physical_vgprs / vs_num_vgprs) * simd_per_sh;
        if vs_rsrc2.scratch_en() != 0 && ps_rsrc2.scratch_en() != 0 {
            max_vs_waves = max_vs_waves.min(num_cu * settings.num_scratch_waves_per_cu);
        }

        // Leave room for one PS wave so VS waves cannot starve it
        if max_vs_waves <= limit {
            limit = if max_vs_waves > 1 { max_vs_waves - 1 } else { 1 };
        }
    }

    // The field holds the limit minus one
    let encoded = limit.saturating_sub(1);
    late_alloc.set_limit(encoded.min(properties.max_late_alloc_vs_limit.saturating_sub(1)));
    tracing::debug!(target_waves = target, limit = late_alloc.limit(), "late-alloc VS limit");
    late_alloc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vs_registers(sgpr_granules: u32, vgpr_granules: u32, vs_scratch: bool, ps_scratch: bool) -> RegisterList {
        let mut rsrc1 = SpiShaderPgmRsrc1::default();
        rsrc1.set_sgprs(sgpr_granules);
        rsrc1.set_vgprs(vgpr_granules);
        let mut vs_rsrc2 = SpiShaderPgmRsrc2::default();
        vs_rsrc2.set_scratch_en(u32::from(vs_scratch));
        let mut ps_rsrc2 = SpiShaderPgmRsrc2::default();
        ps_rsrc2.set_scratch_en(u32::from(ps_scratch));
        RegisterList::from_pairs([(regs::SPI_SHADER_VS.pgm_rsrc1, rsrc1.0), (regs::SPI_SHADER_VS.pgm_rsrc2, vs_rsrc2.0), (regs::SPI_SHADER_PS.pgm_rsrc2, ps_rsrc2.0)]).unwrap()
    }

    #[test]
    fn test_gfx6_has_no_late_alloc() {
        let mut device = DeviceConfig::default();
        device.properties.gfx_level = GfxIpLevel::Gfx6;
        assert_eq!(late_alloc_vs(&device, &vs_registers(2, 4, false, false), &PipelineCreateInfo::default()).0, 0);
    }

    #[test]
    fn test_target_below_capacity_is_kept() {
        let mut device = DeviceConfig::default();
        device.settings.late_alloc_vs_limit = 20;
        // 16 SGPRs, 16 VGPRs: min(800 / 16, 256 / 16) * 36 SIMDs = 576 waves
        let late_alloc = late_alloc_vs(&device, &vs_registers(2, 4, false, false), &PipelineCreateInfo::default());
        assert_eq!(late_alloc.limit(), 19);
    }

    #[test]
    fn test_capacity_caps_the_target() {
        let mut device = DeviceConfig::default();
        device.properties.num_cu_per_sh = 1;
        // 64 VGPRs: 256 / 64 = 4 waves per SIMD, 4 SIMDs, 16 waves; minus one leaves 15
        let late_alloc = late_alloc_vs(&device, &vs_registers(2, 16, false, false), &PipelineCreateInfo::default());
        assert_eq!(late_alloc.limit(), 14);

        // Both stages using scratch limits waves to the scratch budget: 1 CU * 4 waves
        device.settings.num_scratch_waves_per_cu = 4;
        let late_alloc = late_alloc_vs(&device, &vs_registers(2, 16, true, true), &PipelineCreateInfo::default());
        assert_eq!(late_alloc.limit(), 2);
    }

    #[test]
    fn test_limit_bounds() {
        let mut device = DeviceConfig::default();
        device.properties.max_late_alloc_vs_limit = 16;
        let registers = vs_registers(2, 4, false, false);

        let create_info = PipelineCreateInfo { late_alloc_vs_limit: Some(0), ..PipelineCreateInfo::default() };
        assert_eq!(late_alloc_vs(&device, &registers, &create_info).limit(), 0);

        let create_info = PipelineCreateInfo { late_alloc_vs_limit: Some(1), ..PipelineCreateInfo::default() };
        assert_eq!(late_alloc_vs(&device, &registers, &create_info).limit(), 0);

        let create_info = PipelineCreateInfo { late_alloc_vs_limit: Some(60), ..PipelineCreateInfo::default() };
        assert_eq!(late_alloc_vs(&device, &registers, &create_info).limit(), 15);

        // A single wave of capacity still allows one late-alloc wave
        device.properties.num_cu_per_sh = 1;
        device.properties.num_simd_per_cu = 1;
        device.properties.num_physical_vgprs = 64;
        let create_info = PipelineCreateInfo { late_alloc_vs_limit: Some(8), ..PipelineCreateInfo::default() };
        assert_eq!(late_alloc_vs(&device, &vs_registers(2, 16, false, false), &create_info).limit(), 0);
    }

    #[test]
    fn test_fixed_limit_ignores_capacity() {
        let mut device = DeviceConfig::default();
        device.settings.use_fixed_late_alloc_vs_limit = true;
        device.settings.late_alloc_vs_limit = 40;
        device.properties.num_cu_per_sh = 1;
        let late_alloc = late_alloc_vs(&device, &vs_registers(2, 16, false, false), &PipelineCreateInfo::default());
        assert_eq!(late_alloc.limit(), 39);
    }

    #[test]
    fn test_always_on_cus() {
        let mut device = DeviceConfig::default();
        device.settings.late_alloc_vs_on_cu_always_on = true;
        device.properties.num_cu_always_on_per_sh = 1;
        let late_alloc = late_alloc_vs(&device, &vs_registers(2, 16, false, false), &PipelineCreateInfo::default());
        assert_eq!(late_alloc.limit(), 14);
    }
}
