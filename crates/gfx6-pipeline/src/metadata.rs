//! Compiled pipeline binary and its metadata
//!
//! The shader compiler produces machine code, a sparse register list and per-stage resource
//! facts. Compilation only reads these.

use crate::register_list::RegisterList;
use crate::regs::{self, StageShRegs};
use serde::{Deserialize, Serialize};

/// Hardware shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HardwareStage {
    /// Local shader: vertex shader feeding tessellation
    Ls,
    /// Hull shader
    Hs,
    /// Export shader: vertex or domain shader feeding GS
    Es,
    Gs,
    /// Hardware vertex shader, the last stage before rasterization
    Vs,
    Ps,
}

impl HardwareStage {
    pub const COUNT: usize = 6;
    pub const ALL: [HardwareStage; Self::COUNT] = [Self::Ls, Self::Hs, Self::Es, Self::Gs, Self::Vs, Self::Ps];

    pub fn index(self) -> usize {
        self as usize
    }

    /// SH register block of this stage
    pub fn sh_regs(self) -> StageShRegs {
        match self {
            Self::Ls => regs::SPI_SHADER_LS,
            Self::Hs => regs::SPI_SHADER_HS,
            Self::Es => regs::SPI_SHADER_ES,
            Self::Gs => regs::SPI_SHADER_GS,
            Self::Vs => regs::SPI_SHADER_VS,
            Self::Ps => regs::SPI_SHADER_PS,
        }
    }
}

/// Client API shader types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderType {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
}

/// Resource facts for one hardware stage; absent values were not reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareStageMetadata {
    /// Scratch memory per thread, in bytes
    pub scratch_memory_size: Option<u32>,
    /// LDS bytes per thread group
    pub lds_size: Option<u32>,
    /// Byte offset of the stage's entry point within the code blob
    pub entry_offset: Option<u64>,
}

/// Per-stage metadata table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareStages {
    pub ls: HardwareStageMetadata,
    pub hs: HardwareStageMetadata,
    pub es: HardwareStageMetadata,
    pub gs: HardwareStageMetadata,
    pub vs: HardwareStageMetadata,
    pub ps: HardwareStageMetadata,
}

impl HardwareStages {
    pub fn get(&self, stage: HardwareStage) -> &HardwareStageMetadata {
        match stage {
            HardwareStage::Ls => &self.ls,
            HardwareStage::Hs => &self.hs,
            HardwareStage::Es => &self.es,
            HardwareStage::Gs => &self.gs,
            HardwareStage::Vs => &self.vs,
            HardwareStage::Ps => &self.ps,
        }
    }
}

/// Number of indirect user-data table slots in the metadata
pub const INDIRECT_TABLE_COUNT: usize = 3;

/// Pipeline-wide metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineMetadata {
    pub hardware_stages: HardwareStages,
    /// First user-data entry that lives in the spill table
    pub spill_threshold: Option<u32>,
    /// One past the highest user-data entry the pipeline reads
    pub user_data_limit: Option<u32>,
    /// Legacy encoding: user-data entry plus one that holds the stream-out table address
    pub stream_out_table_address: Option<u32>,
    /// Legacy encoding: user-data entries plus one holding indirect table addresses
    pub indirect_user_data_table_addresses: Option<[u32; INDIRECT_TABLE_COUNT]>,
    pub ps_writes_uavs: bool,
}

impl PipelineMetadata {
    /// Largest scratch requirement of any stage, in dwords
    pub fn scratch_memory_dwords(&self) -> u32 {
        HardwareStage::ALL.iter().filter_map(|stage| self.hardware_stages.get(*stage).scratch_memory_size).max().unwrap_or(0) / 4
    }
}

/// Output of the shader compiler for one graphics pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineBinary {
    pub metadata: PipelineMetadata,
    pub registers: RegisterList,
    /// Machine code for all stages
    pub code: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_size_is_max_over_stages_in_dwords() {
        let mut metadata = PipelineMetadata::default();
        assert_eq!(metadata.scratch_memory_dwords(), 0);

        metadata.hardware_stages.vs.scratch_memory_size = Some(256);
        metadata.hardware_stages.ps.scratch_memory_size = Some(1024);
        metadata.hardware_stages.gs.scratch_memory_size = Some(0);
        assert_eq!(metadata.scratch_memory_dwords(), 256);
    }

    #[test]
    fn test_stage_indices_follow_pipeline_order() {
        let indices: Vec<usize> = HardwareStage::ALL.iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(HardwareStage::Vs.sh_regs().user_data_0, 0x2C4C);
    }
}
