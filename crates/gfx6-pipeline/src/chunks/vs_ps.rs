//! Rasterization chunk: the hardware VS and PS stages, present in every pipeline

use super::{ChunkInit, DynamicStageInfo, STAGE_PROGRAM_SH_REG_COUNT, StageChunk, StageProgramRegs, has_dynamic_rsrc3};
use crate::cmd_stream::CmdStream;
use crate::device::DeviceConfig;
use crate::error::PipelineError;
use crate::metadata::HardwareStage;
use crate::planner::LoadInfo;
use crate::register_list::RegisterList;
use crate::regs::{self, SpiPsInControl};
use bytemuck::{Pod, Zeroable};
use serde::Serialize;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct VsPsContextRegs {
    pub spi_shader_pos_format: u32,
    pub spi_shader_z_format: u32,
    pub spi_shader_col_format: u32,
    pub spi_baryc_cntl: u32,
    pub spi_ps_input_ena: u32,
    pub spi_ps_input_addr: u32,
    pub spi_vs_out_config: u32,
    pub spi_ps_in_control: u32,
    pub pa_cl_vs_out_cntl: u32,
    pub vgt_primitiveid_en: u32,
    pub vgt_strmout_config: u32,
    pub vgt_strmout_buffer_config: u32,
}

const VS_PS_CONTEXT_REG_COUNT: u32 = 12;

/// Number of `SPI_PS_INPUT_CNTL_*` registers the pixel shader uses
fn num_interpolants(registers: &RegisterList) -> usize {
    SpiPsInControl(registers.at(regs::SPI_PS_IN_CONTROL)).num_interp().min(u32::from(regs::NUM_PS_INPUT_CNTL)) as usize
}

#[derive(Debug, Clone, Default)]
pub struct VsPsChunk {
    vs: StageProgramRegs,
    ps: StageProgramRegs,
    context: VsPsContextRegs,
    ps_input_cntl: Vec<u32>,
    dynamic_rsrc3: bool,
}

impl VsPsChunk {
    pub fn vs_program(&self) -> &StageProgramRegs {
        &self.vs
    }

    pub fn ps_program(&self) -> &StageProgramRegs {
        &self.ps
    }

    pub fn context(&self) -> &VsPsContextRegs {
        &self.context
    }

    /// `SPI_PS_INPUT_CNTL_*` values, one per interpolant
    pub fn ps_input_cntl(&self) -> &[u32] {
        &self.ps_input_cntl
    }

    fn context_writes(&self) -> Vec<(u16, u32)> {
        let context = &self.context;
        let mut writes = vec![
            (regs::SPI_SHADER_POS_FORMAT, context.spi_shader_pos_format),
            (regs::SPI_SHADER_Z_FORMAT, context.spi_shader_z_format),
            (regs::SPI_SHADER_COL_FORMAT, context.spi_shader_col_format),
            (regs::SPI_BARYC_CNTL, context.spi_baryc_cntl),
            (regs::SPI_PS_INPUT_ENA, context.spi_ps_input_ena),
            (regs::SPI_PS_INPUT_ADDR, context.spi_ps_input_addr),
            (regs::SPI_VS_OUT_CONFIG, context.spi_vs_out_config),
            (regs::SPI_PS_IN_CONTROL, context.spi_ps_in_control),
            (regs::PA_CL_VS_OUT_CNTL, context.pa_cl_vs_out_cntl),
            (regs::VGT_PRIMITIVEID_EN, context.vgt_primitiveid_en),
            (regs::VGT_STRMOUT_CONFIG, context.vgt_strmout_config),
            (regs::VGT_STRMOUT_BUFFER_CONFIG, context.vgt_strmout_buffer_config),
        ];
        writes.extend(self.ps_input_cntl.iter().enumerate().map(|(i, value)| (regs::SPI_PS_INPUT_CNTL_0 + i as u16, *value)));
        writes
    }
}

impl StageChunk for VsPsChunk {
    fn early_init(&mut self, _device: &DeviceConfig, registers: &RegisterList, load_info: &mut LoadInfo) {
        load_info.loaded_sh_reg_count += 2 * STAGE_PROGRAM_SH_REG_COUNT;
        load_info.loaded_ctx_reg_count += VS_PS_CONTEXT_REG_COUNT + num_interpolants(registers) as u32;
    }

    fn late_init(&mut self, init: &mut ChunkInit<'_>) -> Result<(), PipelineError> {
        let registers = init.registers;
        self.vs = StageProgramRegs::new(HardwareStage::Vs, init);
        self.ps = StageProgramRegs::new(HardwareStage::Ps, init);
        self.context = VsPsContextRegs {
            spi_shader_pos_format: registers.at(regs::SPI_SHADER_POS_FORMAT),
            spi_shader_z_format: registers.at(regs::SPI_SHADER_Z_FORMAT),
            spi_shader_col_format: registers.at(regs::SPI_SHADER_COL_FORMAT),
            spi_baryc_cntl: registers.at(regs::SPI_BARYC_CNTL),
            spi_ps_input_ena: registers.at(regs::SPI_PS_INPUT_ENA),
            spi_ps_input_addr: registers.at(regs::SPI_PS_INPUT_ADDR),
            spi_vs_out_config: registers.at(regs::SPI_VS_OUT_CONFIG),
            spi_ps_in_control: registers.at(regs::SPI_PS_IN_CONTROL),
            pa_cl_vs_out_cntl: registers.at(regs::PA_CL_VS_OUT_CNTL),
            vgt_primitiveid_en: registers.at(regs::VGT_PRIMITIVEID_EN),
            vgt_strmout_config: registers.at(regs::VGT_STRMOUT_CONFIG),
            vgt_strmout_buffer_config: registers.at(regs::VGT_STRMOUT_BUFFER_CONFIG),
        };
        self.ps_input_cntl = (0..num_interpolants(registers)).map(|i| registers.at(regs::SPI_PS_INPUT_CNTL_0 + i as u16)).collect();
        self.dynamic_rsrc3 = has_dynamic_rsrc3(init.device);

        if init.upload.enable_load_index_path() {
            self.vs.upload(HardwareStage::Vs, init.upload);
            self.ps.upload(HardwareStage::Ps, init.upload);
            for (addr, value) in self.context_writes() {
                init.upload.add_ctx_reg(addr, value);
            }
        }

        init.hasher.update(bytemuck::bytes_of(&self.context));
        init.hasher.update(bytemuck::cast_slice(&self.ps_input_cntl));
        Ok(())
    }

    fn write_sh_commands(&self, stream: &mut CmdStream, load_path: bool, vs_info: &DynamicStageInfo, ps_info: &DynamicStageInfo) {
        if !load_path {
            self.vs.write_static(HardwareStage::Vs, stream);
            self.ps.write_static(HardwareStage::Ps, stream);
        }
        if self.dynamic_rsrc3 {
            self.vs.write_dynamic(HardwareStage::Vs, stream, vs_info);
            self.ps.write_dynamic(HardwareStage::Ps, stream, ps_info);
        }
    }

    fn write_context_commands(&self, stream: &mut CmdStream) {
        let context = &self.context;
        stream.write_set_seq_context_regs(regs::SPI_SHADER_POS_FORMAT, &[context.spi_shader_pos_format, context.spi_shader_z_format, context.spi_shader_col_format]);
        stream.write_set_one_context_reg(regs::SPI_BARYC_CNTL, context.spi_baryc_cntl);
        stream.write_set_seq_context_regs(regs::SPI_PS_INPUT_ENA, &[context.spi_ps_input_ena, context.spi_ps_input_addr]);
        stream.write_set_one_context_reg(regs::SPI_VS_OUT_CONFIG, context.spi_vs_out_config);
        stream.write_set_one_context_reg(regs::SPI_PS_IN_CONTROL, context.spi_ps_in_control);
        stream.write_set_one_context_reg(regs::PA_CL_VS_OUT_CNTL, context.pa_cl_vs_out_cntl);
        stream.write_set_one_context_reg(regs::VGT_PRIMITIVEID_EN, context.vgt_primitiveid_en);
        stream.write_set_seq_context_regs(regs::VGT_STRMOUT_CONFIG, &[context.vgt_strmout_config, context.vgt_strmout_buffer_config]);
        if !self.ps_input_cntl.is_empty() {
            stream.write_set_seq_context_regs(regs::SPI_PS_INPUT_CNTL_0, &self.ps_input_cntl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::test_support::init_chunk;
    use crate::metadata::PipelineMetadata;
    use crate::pm4::packets;
    use crate::upload::UploadTransaction;
    use std::collections::BTreeMap;

    fn ps_registers(num_interp: u32) -> RegisterList {
        let mut in_control = SpiPsInControl::default();
        in_control.set_num_interp(num_interp);
        let mut registers = RegisterList::from_pairs([(regs::SPI_PS_IN_CONTROL, in_control.0), (regs::SPI_SHADER_COL_FORMAT, 0x4), (regs::SPI_PS_INPUT_ENA, 0x2)]).unwrap();
        for i in 0..num_interp.min(32) {
            registers.insert(regs::SPI_PS_INPUT_CNTL_0 + i as u16, 0x100 + i);
        }
        registers
    }

    #[test]
    fn test_interpolant_count_follows_ps_in_control() {
        let mut chunk = VsPsChunk::default();
        init_chunk(&mut chunk, &DeviceConfig::default(), &ps_registers(3), &PipelineMetadata::default(), false);
        assert_eq!(chunk.ps_input_cntl(), &[0x100, 0x101, 0x102]);

        // NUM_INTERP is six bits wide but only 32 input controls exist
        init_chunk(&mut chunk, &DeviceConfig::default(), &ps_registers(40), &PipelineMetadata::default(), false);
        assert_eq!(chunk.ps_input_cntl().len(), 32);
    }

    #[test]
    fn test_load_path_uploads_what_set_path_writes() {
        let registers = ps_registers(2);
        let mut chunk = VsPsChunk::default();
        let (upload, load_info) = init_chunk(&mut chunk, &DeviceConfig::default(), &registers, &PipelineMetadata::default(), true);
        assert_eq!(upload.ctx_reg_count(), load_info.loaded_ctx_reg_count);
        assert_eq!(upload.sh_reg_count(), load_info.loaded_sh_reg_count);

        let mut stream = CmdStream::new();
        chunk.write_context_commands(&mut stream);
        let set_writes: BTreeMap<u16, u32> = packets(stream.dwords()).flat_map(|p| p.unwrap().set_register_writes()).collect();
        let loaded: BTreeMap<u16, u32> = upload.ctx_regs.iter().copied().collect();
        assert_eq!(set_writes, loaded);
        assert_eq!(set_writes[&regs::SPI_SHADER_COL_FORMAT], 0x4);
    }
}
