//! Per-stage register chunks
//!
//! A graphics pipeline drives up to three pairs of hardware stages. Each pair owns the program
//! address and resource registers of its two stages plus the context registers only it cares
//! about, and writes them when the pipeline is bound. The pipeline orchestrates the chunks of
//! the stages that are active.

mod es_gs;
mod ls_hs;
mod vs_ps;

pub use es_gs::EsGsChunk;
pub use ls_hs::LsHsChunk;
pub use vs_ps::VsPsChunk;

use crate::cmd_stream::CmdStream;
use crate::create_info::PipelineCreateInfo;
use crate::device::{DeviceConfig, GfxIpLevel};
use crate::error::PipelineError;
use crate::metadata::{HardwareStage, PipelineMetadata};
use crate::planner::{LoadInfo, StageActivation};
use crate::register_list::RegisterList;
use crate::regs::SpiShaderPgmRsrc3;
use crate::upload::UploadTransaction;
use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use xxhash_rust::xxh3::Xxh3;

/// Per-draw wave limit and CU mask of one hardware stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DynamicStageInfo {
    /// `WAVE_LIMIT` in units of 16 waves; zero leaves the limit alone
    pub waves_per_sh: u32,
    /// CUs the stage may run on; zero leaves the mask alone
    pub cu_enable_mask: u32,
}

/// [`DynamicStageInfo`] of every hardware stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DynamicStageInfos {
    pub ls: DynamicStageInfo,
    pub hs: DynamicStageInfo,
    pub es: DynamicStageInfo,
    pub gs: DynamicStageInfo,
    pub vs: DynamicStageInfo,
    pub ps: DynamicStageInfo,
}

/// Everything a chunk reads or feeds while the pipeline is being uploaded
pub struct ChunkInit<'a> {
    pub device: &'a DeviceConfig,
    pub registers: &'a RegisterList,
    pub metadata: &'a PipelineMetadata,
    pub create_info: &'a PipelineCreateInfo,
    pub load_info: &'a LoadInfo,
    /// GPU address of the start of the pipeline's code
    pub code_gpu_va: u64,
    pub upload: &'a mut dyn UploadTransaction,
    /// Running hash of every context register the pipeline writes
    pub hasher: &'a mut Xxh3,
}

impl ChunkInit<'_> {
    /// GPU address of a stage's entry point
    pub fn program_gpu_va(&self, stage: HardwareStage) -> u64 {
        self.code_gpu_va + self.metadata.hardware_stages.get(stage).entry_offset.unwrap_or(0)
    }
}

/// Register chunk of one pair of hardware stages
pub trait StageChunk {
    /// Reserves room for the chunk's registers before the upload begins
    ///
    /// Only called when registers are preloaded.
    fn early_init(&mut self, device: &DeviceConfig, registers: &RegisterList, load_info: &mut LoadInfo);

    /// Derives the chunk's registers once code addresses are known
    ///
    /// # Arguments
    /// * `init` - Register sources, upload transaction and running context hash
    ///
    /// # Returns
    /// An error if the chunk's registers cannot be derived
    fn late_init(&mut self, init: &mut ChunkInit<'_>) -> Result<(), PipelineError>;

    /// Writes SH registers; on the LOAD path only the dynamic per-draw state is written
    fn write_sh_commands(&self, stream: &mut CmdStream, load_path: bool, first: &DynamicStageInfo, second: &DynamicStageInfo);

    /// Writes context registers with SET packets
    fn write_context_commands(&self, stream: &mut CmdStream);
}

/// Program address and resource registers of one hardware stage
///
/// `PGM_LO`, `PGM_HI`, `PGM_RSRC1` and `PGM_RSRC2` are consecutive, so they go out in one packet.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct StageProgramRegs {
    pub pgm_lo: u32,
    pub pgm_hi: u32,
    pub pgm_rsrc1: u32,
    pub pgm_rsrc2: u32,
    /// Static part of `PGM_RSRC3`; never preloaded since draws can override it
    pub pgm_rsrc3: u32,
}

/// SH registers each stage adds to the preloaded block
pub(crate) const STAGE_PROGRAM_SH_REG_COUNT: u32 = 4;

impl StageProgramRegs {
    pub(crate) fn new(stage: HardwareStage, init: &ChunkInit<'_>) -> Self {
        let sh_regs = stage.sh_regs();
        let gpu_va = init.program_gpu_va(stage);
        debug_assert!(gpu_va % 256 == 0, "shader entry points are 256-byte aligned");
        Self {
            pgm_lo: (gpu_va >> 8) as u32,
            pgm_hi: ((gpu_va >> 40) & 0xFF) as u32,
            pgm_rsrc1: init.registers.at(sh_regs.pgm_rsrc1),
            pgm_rsrc2: init.registers.at(sh_regs.pgm_rsrc2),
            pgm_rsrc3: init.registers.at(sh_regs.pgm_rsrc3),
        }
    }

    /// Address of the entry point these registers point at
    pub fn program_gpu_va(&self) -> u64 {
        (u64::from(self.pgm_hi) << 40) | (u64::from(self.pgm_lo) << 8)
    }

    pub(crate) fn upload(&self, stage: HardwareStage, upload: &mut dyn UploadTransaction) {
        let sh_regs = stage.sh_regs();
        upload.add_sh_reg(sh_regs.pgm_lo, self.pgm_lo);
        upload.add_sh_reg(sh_regs.pgm_hi, self.pgm_hi);
        upload.add_sh_reg(sh_regs.pgm_rsrc1, self.pgm_rsrc1);
        upload.add_sh_reg(sh_regs.pgm_rsrc2, self.pgm_rsrc2);
    }

    pub(crate) fn write_static(&self, stage: HardwareStage, stream: &mut CmdStream) {
        stream.write_set_seq_sh_regs(stage.sh_regs().pgm_lo, &[self.pgm_lo, self.pgm_hi, self.pgm_rsrc1, self.pgm_rsrc2]);
    }

    /// Writes `PGM_RSRC3` with the draw's wave limit and CU mask folded in
    pub(crate) fn write_dynamic(&self, stage: HardwareStage, stream: &mut CmdStream, info: &DynamicStageInfo) {
        let mut rsrc3 = SpiShaderPgmRsrc3(self.pgm_rsrc3);
        if info.waves_per_sh > 0 {
            rsrc3.set_wave_limit(info.waves_per_sh);
        }
        if info.cu_enable_mask != 0 {
            rsrc3.set_cu_en(rsrc3.cu_en() & info.cu_enable_mask);
        }
        stream.write_set_one_sh_reg(stage.sh_regs().pgm_rsrc3, rsrc3.0);
    }
}

/// `PGM_RSRC3` only exists from Gfx7 on
pub(crate) fn has_dynamic_rsrc3(device: &DeviceConfig) -> bool {
    device.gfx_level() >= GfxIpLevel::Gfx7
}

/// Chunks of the active stages
#[derive(Debug, Clone, Default)]
pub struct ChunkSet {
    pub ls_hs: Option<LsHsChunk>,
    pub es_gs: Option<EsGsChunk>,
    pub vs_ps: VsPsChunk,
}

impl ChunkSet {
    pub fn for_activation(activation: &StageActivation) -> Self {
        Self {
            ls_hs: activation.is_tess_enabled().then(LsHsChunk::default),
            es_gs: activation.is_gs_enabled().then(EsGsChunk::default),
            vs_ps: VsPsChunk::default(),
        }
    }

    /// Active chunks in stage order
    pub fn iter(&self) -> impl Iterator<Item = &dyn StageChunk> {
        let ls_hs = self.ls_hs.as_ref().map(|chunk| chunk as &dyn StageChunk);
        let es_gs = self.es_gs.as_ref().map(|chunk| chunk as &dyn StageChunk);
        ls_hs.into_iter().chain(es_gs).chain(std::iter::once(&self.vs_ps as &dyn StageChunk))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut dyn StageChunk> {
        let ls_hs = self.ls_hs.as_mut().map(|chunk| chunk as &mut dyn StageChunk);
        let es_gs = self.es_gs.as_mut().map(|chunk| chunk as &mut dyn StageChunk);
        ls_hs.into_iter().chain(es_gs).chain(std::iter::once(&mut self.vs_ps as &mut dyn StageChunk))
    }

    /// Program registers of an active stage
    pub fn program(&self, stage: HardwareStage) -> Option<&StageProgramRegs> {
        match stage {
            HardwareStage::Ls => self.ls_hs.as_ref().map(LsHsChunk::ls_program),
            HardwareStage::Hs => self.ls_hs.as_ref().map(LsHsChunk::hs_program),
            HardwareStage::Es => self.es_gs.as_ref().map(EsGsChunk::es_program),
            HardwareStage::Gs => self.es_gs.as_ref().map(EsGsChunk::gs_program),
            HardwareStage::Vs => Some(self.vs_ps.vs_program()),
            HardwareStage::Ps => Some(self.vs_ps.ps_program()),
        }
    }

    pub(crate) fn early_init(&mut self, device: &DeviceConfig, registers: &RegisterList, load_info: &mut LoadInfo) {
        if !device.settings.enable_load_index_for_object_binds {
            return;
        }
        for chunk in self.iter_mut() {
            chunk.early_init(device, registers, load_info);
        }
    }

    pub(crate) fn late_init(&mut self, init: &mut ChunkInit<'_>) -> Result<(), PipelineError> {
        for chunk in self.iter_mut() {
            chunk.late_init(init)?;
        }
        Ok(())
    }

    pub(crate) fn write_sh_commands(&self, stream: &mut CmdStream, load_path: bool, infos: &DynamicStageInfos) {
        if let Some(chunk) = &self.ls_hs {
            chunk.write_sh_commands(stream, load_path, &infos.ls, &infos.hs);
        }
        if let Some(chunk) = &self.es_gs {
            chunk.write_sh_commands(stream, load_path, &infos.es, &infos.gs);
        }
        self.vs_ps.write_sh_commands(stream, load_path, &infos.vs, &infos.ps);
    }

    pub(crate) fn write_context_commands(&self, stream: &mut CmdStream) {
        for chunk in self.iter() {
            chunk.write_context_commands(stream);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{self, VgtGsMode, VgtShaderStagesEn};
    use test_support::{CODE_GPU_VA, init_chunk};

    #[test]
    fn test_chunk_set_follows_activation() {
        let vs_ps = ChunkSet::for_activation(&StageActivation::new(VgtShaderStagesEn(0), VgtGsMode(0)));
        assert!(vs_ps.ls_hs.is_none() && vs_ps.es_gs.is_none());
        assert_eq!(vs_ps.iter().count(), 1);

        let mut stages_en = VgtShaderStagesEn::default();
        stages_en.set_hs_en(1);
        stages_en.set_gs_en(1);
        let all = ChunkSet::for_activation(&StageActivation::new(stages_en, VgtGsMode(0)));
        assert_eq!(all.iter().count(), 3);
    }

    #[test]
    fn test_program_address_includes_entry_offset() {
        let mut metadata = PipelineMetadata::default();
        metadata.hardware_stages.ps.entry_offset = Some(0x300);
        let registers = RegisterList::from_pairs([(regs::SPI_SHADER_PS.pgm_rsrc1, 0x2C0_0041)]).unwrap();

        let mut chunk = VsPsChunk::default();
        init_chunk(&mut chunk, &DeviceConfig::default(), &registers, &metadata, false);

        assert_eq!(chunk.ps_program().program_gpu_va(), CODE_GPU_VA + 0x300);
        assert_eq!(chunk.vs_program().program_gpu_va(), CODE_GPU_VA);
        assert_eq!(chunk.ps_program().pgm_rsrc1, 0x2C0_0041);
    }

    #[test]
    fn test_dynamic_rsrc3_applies_limit_and_mask() {
        let program = StageProgramRegs { pgm_rsrc3: 0xFFFF, ..Default::default() };
        let mut stream = CmdStream::new();
        program.write_dynamic(HardwareStage::Vs, &mut stream, &DynamicStageInfo { waves_per_sh: 5, cu_enable_mask: 0x00F0 });
        program.write_dynamic(HardwareStage::Vs, &mut stream, &DynamicStageInfo::default());

        let writes: Vec<_> = crate::pm4::packets(stream.dwords()).flat_map(|p| p.unwrap().set_register_writes()).collect();
        assert_eq!(writes, vec![(regs::SPI_SHADER_VS.pgm_rsrc3, (5 << 16) | 0x00F0), (regs::SPI_SHADER_VS.pgm_rsrc3, 0xFFFF)]);
    }
}
