//! Geometry chunk: the ES and GS hardware stages

use super::{ChunkInit, DynamicStageInfo, STAGE_PROGRAM_SH_REG_COUNT, StageChunk, StageProgramRegs};
use crate::cmd_stream::CmdStream;
use crate::device::{DeviceConfig, GfxIpLevel};
use crate::error::PipelineError;
use crate::metadata::HardwareStage;
use crate::planner::LoadInfo;
use crate::register_list::RegisterList;
use crate::regs;
use crate::signature::USER_DATA_NOT_MAPPED;
use bytemuck::{Pod, Zeroable};
use serde::Serialize;

/// `ITEMSIZE` field of the ES/GS and GS/VS ring item size registers, in dwords
const RING_ITEMSIZE_MASK: u32 = 0x7FFF;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct EsGsContextRegs {
    pub vgt_esgs_ring_itemsize: u32,
    pub vgt_gsvs_ring_itemsize: u32,
    pub vgt_gs_max_vert_out: u32,
    pub vgt_gs_out_prim_type: u32,
    pub vgt_gs_instance_cnt: u32,
    pub vgt_gs_vert_itemsize: [u32; regs::NUM_GS_VERT_ITEMSIZE as usize],
    /// Only written on Gfx7 and newer
    pub vgt_gs_onchip_cntl: u32,
}

const ES_GS_CONTEXT_REG_COUNT: u32 = 5 + regs::NUM_GS_VERT_ITEMSIZE as u32;

/// User-data registers receiving the ES/GS LDS size of an on-chip GS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LdsSizeUserData {
    gs_reg: u16,
    vs_reg: u16,
    value: u32,
}

impl LdsSizeUserData {
    fn mapped_count(load_info: &LoadInfo) -> u32 {
        if !load_info.uses_onchip_gs {
            return 0;
        }
        [load_info.es_gs_lds_size_reg_gs, load_info.es_gs_lds_size_reg_vs].into_iter().filter(|reg| *reg != USER_DATA_NOT_MAPPED).count() as u32
    }

    fn writes(&self) -> impl Iterator<Item = (u16, u32)> + '_ {
        [self.gs_reg, self.vs_reg].into_iter().filter(|reg| *reg != USER_DATA_NOT_MAPPED).map(|reg| (reg, self.value))
    }
}

#[derive(Debug, Clone, Default)]
pub struct EsGsChunk {
    es: StageProgramRegs,
    gs: StageProgramRegs,
    context: EsGsContextRegs,
    lds_size: LdsSizeUserData,
    gfx_level: GfxIpLevel,
}

impl EsGsChunk {
    pub fn es_program(&self) -> &StageProgramRegs {
        &self.es
    }

    pub fn gs_program(&self) -> &StageProgramRegs {
        &self.gs
    }

    pub fn context(&self) -> &EsGsContextRegs {
        &self.context
    }

    /// Bytes of ES output per vertex, in dwords
    pub fn es_gs_ring_item_size(&self) -> u32 {
        self.context.vgt_esgs_ring_itemsize & RING_ITEMSIZE_MASK
    }

    /// Bytes of GS output per primitive, in dwords
    pub fn gs_vs_ring_item_size(&self) -> u32 {
        self.context.vgt_gsvs_ring_itemsize & RING_ITEMSIZE_MASK
    }

    /// `VGT_GS_ONCHIP_CNTL` and `PGM_RSRC3` only exist from Gfx7 on
    fn is_gfx7_plus(&self) -> bool {
        self.gfx_level >= GfxIpLevel::Gfx7
    }
}

impl StageChunk for EsGsChunk {
    fn early_init(&mut self, device: &DeviceConfig, _registers: &RegisterList, load_info: &mut LoadInfo) {
        load_info.loaded_sh_reg_count += 2 * STAGE_PROGRAM_SH_REG_COUNT + LdsSizeUserData::mapped_count(load_info);
        load_info.loaded_ctx_reg_count += ES_GS_CONTEXT_REG_COUNT;
        if device.gfx_level() >= GfxIpLevel::Gfx7 {
            load_info.loaded_ctx_reg_count += 1;
        }
    }

    fn late_init(&mut self, init: &mut ChunkInit<'_>) -> Result<(), PipelineError> {
        let registers = init.registers;
        self.gfx_level = init.device.gfx_level();
        self.es = StageProgramRegs::new(HardwareStage::Es, init);
        self.gs = StageProgramRegs::new(HardwareStage::Gs, init);

        let mut vgt_gs_vert_itemsize = [0; regs::NUM_GS_VERT_ITEMSIZE as usize];
        for (stream, itemsize) in vgt_gs_vert_itemsize.iter_mut().enumerate() {
            *itemsize = registers.at(regs::VGT_GS_VERT_ITEMSIZE + stream as u16);
        }
        self.context = EsGsContextRegs {
            vgt_esgs_ring_itemsize: registers.at(regs::VGT_ESGS_RING_ITEMSIZE),
            vgt_gsvs_ring_itemsize: registers.at(regs::VGT_GSVS_RING_ITEMSIZE),
            vgt_gs_max_vert_out: registers.at(regs::VGT_GS_MAX_VERT_OUT),
            vgt_gs_out_prim_type: registers.at(regs::VGT_GS_OUT_PRIM_TYPE),
            vgt_gs_instance_cnt: registers.at(regs::VGT_GS_INSTANCE_CNT),
            vgt_gs_vert_itemsize,
            vgt_gs_onchip_cntl: if self.is_gfx7_plus() { registers.at(regs::VGT_GS_ONCHIP_CNTL) } else { 0 },
        };

        if init.load_info.uses_onchip_gs {
            self.lds_size = LdsSizeUserData {
                gs_reg: init.load_info.es_gs_lds_size_reg_gs,
                vs_reg: init.load_info.es_gs_lds_size_reg_vs,
                value: init.metadata.hardware_stages.gs.lds_size.unwrap_or(0),
            };
        }

        if init.upload.enable_load_index_path() {
            self.es.upload(HardwareStage::Es, init.upload);
            self.gs.upload(HardwareStage::Gs, init.upload);
            for (reg, value) in self.lds_size.writes() {
                init.upload.add_sh_reg(reg, value);
            }
            for (addr, value) in self.context_writes() {
                init.upload.add_ctx_reg(addr, value);
            }
        }

        init.hasher.update(bytemuck::bytes_of(&self.context));
        Ok(())
    }

    fn write_sh_commands(&self, stream: &mut CmdStream, load_path: bool, es_info: &DynamicStageInfo, gs_info: &DynamicStageInfo) {
        if !load_path {
            self.es.write_static(HardwareStage::Es, stream);
            self.gs.write_static(HardwareStage::Gs, stream);
            for (reg, value) in self.lds_size.writes() {
                stream.write_set_one_sh_reg(reg, value);
            }
        }
        if self.is_gfx7_plus() {
            self.es.write_dynamic(HardwareStage::Es, stream, es_info);
            self.gs.write_dynamic(HardwareStage::Gs, stream, gs_info);
        }
    }

    fn write_context_commands(&self, stream: &mut CmdStream) {
        let context = &self.context;
        stream.write_set_seq_context_regs(regs::VGT_ESGS_RING_ITEMSIZE, &[context.vgt_esgs_ring_itemsize, context.vgt_gsvs_ring_itemsize]);
        stream.write_set_one_context_reg(regs::VGT_GS_MAX_VERT_OUT, context.vgt_gs_max_vert_out);
        stream.write_set_one_context_reg(regs::VGT_GS_OUT_PRIM_TYPE, context.vgt_gs_out_prim_type);
        stream.write_set_one_context_reg(regs::VGT_GS_INSTANCE_CNT, context.vgt_gs_instance_cnt);
        stream.write_set_seq_context_regs(regs::VGT_GS_VERT_ITEMSIZE, &context.vgt_gs_vert_itemsize);
        if self.is_gfx7_plus() {
            stream.write_set_one_context_reg(regs::VGT_GS_ONCHIP_CNTL, context.vgt_gs_onchip_cntl);
        }
    }
}

impl EsGsChunk {
    fn context_writes(&self) -> Vec<(u16, u32)> {
        let context = &self.context;
        let mut writes = vec![
            (regs::VGT_ESGS_RING_ITEMSIZE, context.vgt_esgs_ring_itemsize),
            (regs::VGT_GSVS_RING_ITEMSIZE, context.vgt_gsvs_ring_itemsize),
            (regs::VGT_GS_MAX_VERT_OUT, context.vgt_gs_max_vert_out),
            (regs::VGT_GS_OUT_PRIM_TYPE, context.vgt_gs_out_prim_type),
            (regs::VGT_GS_INSTANCE_CNT, context.vgt_gs_instance_cnt),
        ];
        writes.extend(context.vgt_gs_vert_itemsize.iter().enumerate().map(|(stream, value)| (regs::VGT_GS_VERT_ITEMSIZE + stream as u16, *value)));
        if self.is_gfx7_plus() {
            writes.push((regs::VGT_GS_ONCHIP_CNTL, context.vgt_gs_onchip_cntl));
        }
        writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::test_support::init_chunk;
    use crate::metadata::PipelineMetadata;
    use crate::pm4::packets;
    use crate::upload::UploadTransaction;

    fn gs_registers() -> RegisterList {
        RegisterList::from_pairs([(regs::VGT_ESGS_RING_ITEMSIZE, 12), (regs::VGT_GSVS_RING_ITEMSIZE, 0x8000 | 40), (regs::VGT_GS_VERT_ITEMSIZE + 1, 4), (regs::VGT_GS_ONCHIP_CNTL, 0x77)]).unwrap()
    }

    fn gs_metadata() -> PipelineMetadata {
        let mut metadata = PipelineMetadata::default();
        metadata.hardware_stages.gs.lds_size = Some(0x2000);
        metadata
    }

    #[test]
    fn test_ring_item_sizes() {
        let mut chunk = EsGsChunk::default();
        init_chunk(&mut chunk, &DeviceConfig::default(), &gs_registers(), &gs_metadata(), false);
        assert_eq!(chunk.es_gs_ring_item_size(), 12);
        assert_eq!(chunk.gs_vs_ring_item_size(), 40);
        assert_eq!(chunk.context().vgt_gs_vert_itemsize, [0, 4, 0, 0]);
    }

    #[test]
    fn test_load_path_counts_match_uploads() {
        let mut chunk = EsGsChunk::default();
        let (upload, load_info) = init_chunk(&mut chunk, &DeviceConfig::default(), &gs_registers(), &gs_metadata(), true);
        assert_eq!(upload.sh_reg_count(), load_info.loaded_sh_reg_count);
        assert_eq!(upload.ctx_reg_count(), load_info.loaded_ctx_reg_count);
        assert!(upload.ctx_regs.contains(&(regs::VGT_GS_ONCHIP_CNTL, 0x77)));
    }

    #[test]
    fn test_onchip_gs_writes_lds_size_user_data() {
        let gs_reg = regs::SPI_SHADER_GS.user_data_0 + 3;
        let vs_reg = regs::SPI_SHADER_VS.user_data_0 + 4;
        let device = DeviceConfig::default();
        let registers = gs_registers();
        let metadata = gs_metadata();
        let load_info = LoadInfo { uses_gs: true, uses_onchip_gs: true, es_gs_lds_size_reg_gs: gs_reg, es_gs_lds_size_reg_vs: vs_reg, ..LoadInfo::default() };

        let mut chunk = EsGsChunk::default();
        let mut upload = crate::chunks::test_support::RecordingTransaction::default();
        let mut hasher = xxhash_rust::xxh3::Xxh3::new();
        let create_info = crate::create_info::PipelineCreateInfo::default();
        let mut init = ChunkInit { device: &device, registers: &registers, metadata: &metadata, create_info: &create_info, load_info: &load_info, code_gpu_va: 0, upload: &mut upload, hasher: &mut hasher };
        chunk.late_init(&mut init).unwrap();

        let mut stream = CmdStream::new();
        chunk.write_sh_commands(&mut stream, false, &DynamicStageInfo::default(), &DynamicStageInfo::default());
        let writes: Vec<_> = packets(stream.dwords()).flat_map(|p| p.unwrap().set_register_writes()).collect();
        assert!(writes.contains(&(gs_reg, 0x2000)));
        assert!(writes.contains(&(vs_reg, 0x2000)));

        // The LOAD path leaves only the per-draw registers
        let mut stream = CmdStream::new();
        chunk.write_sh_commands(&mut stream, true, &DynamicStageInfo::default(), &DynamicStageInfo::default());
        let writes: Vec<_> = packets(stream.dwords()).flat_map(|p| p.unwrap().set_register_writes()).collect();
        assert_eq!(writes.iter().map(|(addr, _)| *addr).collect::<Vec<_>>(), vec![regs::SPI_SHADER_ES.pgm_rsrc3, regs::SPI_SHADER_GS.pgm_rsrc3]);
    }

    #[test]
    fn test_gfx6_skips_onchip_cntl() {
        let mut device = DeviceConfig::default();
        device.properties.gfx_level = GfxIpLevel::Gfx6;
        let mut chunk = EsGsChunk::default();
        init_chunk(&mut chunk, &device, &gs_registers(), &gs_metadata(), false);

        let mut stream = CmdStream::new();
        chunk.write_context_commands(&mut stream);
        let writes: Vec<_> = packets(stream.dwords()).flat_map(|p| p.unwrap().set_register_writes()).collect();
        assert_eq!(writes.len(), ES_GS_CONTEXT_REG_COUNT as usize);
        assert!(!writes.iter().any(|(addr, _)| *addr == regs::VGT_GS_ONCHIP_CNTL));
    }
}
