//! Tessellation chunk: the LS and HS hardware stages

use super::{ChunkInit, DynamicStageInfo, STAGE_PROGRAM_SH_REG_COUNT, StageChunk, StageProgramRegs, has_dynamic_rsrc3};
use crate::cmd_stream::CmdStream;
use crate::device::DeviceConfig;
use crate::error::PipelineError;
use crate::metadata::HardwareStage;
use crate::planner::LoadInfo;
use crate::register_list::RegisterList;
use crate::regs;
use bytemuck::{Pod, Zeroable};
use serde::Serialize;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct LsHsContextRegs {
    /// Tessellation factor clamps, stored as `f32` bits
    pub vgt_hos_max_tess_level: u32,
    pub vgt_hos_min_tess_level: u32,
}

const LS_HS_CONTEXT_REG_COUNT: u32 = 2;

#[derive(Debug, Clone, Default)]
pub struct LsHsChunk {
    ls: StageProgramRegs,
    hs: StageProgramRegs,
    context: LsHsContextRegs,
    dynamic_rsrc3: bool,
}

impl LsHsChunk {
    pub fn ls_program(&self) -> &StageProgramRegs {
        &self.ls
    }

    pub fn hs_program(&self) -> &StageProgramRegs {
        &self.hs
    }

    pub fn context(&self) -> &LsHsContextRegs {
        &self.context
    }
}

impl StageChunk for LsHsChunk {
    fn early_init(&mut self, _device: &DeviceConfig, _registers: &RegisterList, load_info: &mut LoadInfo) {
        load_info.loaded_sh_reg_count += 2 * STAGE_PROGRAM_SH_REG_COUNT;
        load_info.loaded_ctx_reg_count += LS_HS_CONTEXT_REG_COUNT;
    }

    fn late_init(&mut self, init: &mut ChunkInit<'_>) -> Result<(), PipelineError> {
        self.ls = StageProgramRegs::new(HardwareStage::Ls, init);
        self.hs = StageProgramRegs::new(HardwareStage::Hs, init);
        self.context = LsHsContextRegs {
            vgt_hos_max_tess_level: init.registers.at(regs::VGT_HOS_MAX_TESS_LEVEL),
            vgt_hos_min_tess_level: init.registers.at(regs::VGT_HOS_MIN_TESS_LEVEL),
        };
        self.dynamic_rsrc3 = has_dynamic_rsrc3(init.device);

        if init.upload.enable_load_index_path() {
            self.ls.upload(HardwareStage::Ls, init.upload);
            self.hs.upload(HardwareStage::Hs, init.upload);
            init.upload.add_ctx_reg(regs::VGT_HOS_MAX_TESS_LEVEL, self.context.vgt_hos_max_tess_level);
            init.upload.add_ctx_reg(regs::VGT_HOS_MIN_TESS_LEVEL, self.context.vgt_hos_min_tess_level);
        }

        init.hasher.update(bytemuck::bytes_of(&self.context));
        Ok(())
    }

    fn write_sh_commands(&self, stream: &mut CmdStream, load_path: bool, ls_info: &DynamicStageInfo, hs_info: &DynamicStageInfo) {
        if !load_path {
            self.ls.write_static(HardwareStage::Ls, stream);
            self.hs.write_static(HardwareStage::Hs, stream);
        }
        if self.dynamic_rsrc3 {
            self.ls.write_dynamic(HardwareStage::Ls, stream, ls_info);
            self.hs.write_dynamic(HardwareStage::Hs, stream, hs_info);
        }
    }

    fn write_context_commands(&self, stream: &mut CmdStream) {
        stream.write_set_seq_context_regs(regs::VGT_HOS_MAX_TESS_LEVEL, &[self.context.vgt_hos_max_tess_level, self.context.vgt_hos_min_tess_level]);
    }
}
