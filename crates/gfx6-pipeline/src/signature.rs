//! User-data signature of a graphics pipeline
//!
//! Each hardware stage has a window of sixteen user-data SGPR registers. The shader compiler
//! tells us what every register holds: either one of the client's user-data entries (a
//! "pass-through" id below [`MAX_USER_DATA_ENTRIES`]) or a driver-reserved role such as the
//! spill table or the base-vertex value. The command buffer uses the resulting signature to
//! know where to write each piece of data at draw time.

use crate::metadata::{HardwareStage, INDIRECT_TABLE_COUNT, PipelineMetadata};
use crate::planner::StageActivation;
use crate::register_list::RegisterList;
use crate::regs::NUM_USER_DATA_REGISTERS;
use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// User-data entries the client can bind; register values below this are pass-throughs
pub const MAX_USER_DATA_ENTRIES: u32 = 128;
/// Register address marking a role that is not mapped
pub const USER_DATA_NOT_MAPPED: u16 = 0;
/// Spill threshold meaning the pipeline never spills user data
pub const NO_USER_DATA_SPILLING: u16 = 0xFFFF;

/// Window slot holding the global internal table
const INTERNAL_TBL_START_REG: u16 = 0;
/// Window slot holding the per-shader constant buffer table
const CONST_BUF_TBL_START_REG: u16 = 1;

/// Driver-reserved user-data roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserDataMapping {
    GlobalTable,
    PerShaderTable,
    SpillTable,
    BaseVertex,
    BaseInstance,
    DrawIndex,
    Workgroup,
    EsGsLdsSize,
    ViewId,
    StreamOutTable,
    VertexBufferTable,
    BaseIndex,
    Log2IndexSize,
}

impl UserDataMapping {
    /// Decodes a register value carrying a reserved role
    pub fn from_raw(value: u32) -> Option<Self> {
        Some(match value {
            0x1000_0000 => Self::GlobalTable,
            0x1000_0001 => Self::PerShaderTable,
            0x1000_0002 => Self::SpillTable,
            0x1000_0003 => Self::BaseVertex,
            0x1000_0004 => Self::BaseInstance,
            0x1000_0005 => Self::DrawIndex,
            0x1000_0006 => Self::Workgroup,
            0x1000_000A => Self::EsGsLdsSize,
            0x1000_000B => Self::ViewId,
            0x1000_000C => Self::StreamOutTable,
            0x1000_000F => Self::VertexBufferTable,
            0x1000_0010 => Self::BaseIndex,
            0x1000_0011 => Self::Log2IndexSize,
            _ => return None,
        })
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::GlobalTable => 0x1000_0000,
            Self::PerShaderTable => 0x1000_0001,
            Self::SpillTable => 0x1000_0002,
            Self::BaseVertex => 0x1000_0003,
            Self::BaseInstance => 0x1000_0004,
            Self::DrawIndex => 0x1000_0005,
            Self::Workgroup => 0x1000_0006,
            Self::EsGsLdsSize => 0x1000_000A,
            Self::ViewId => 0x1000_000B,
            Self::StreamOutTable => 0x1000_000C,
            Self::VertexBufferTable => 0x1000_000F,
            Self::BaseIndex => 0x1000_0010,
            Self::Log2IndexSize => 0x1000_0011,
        }
    }
}

/// Errors in the user-data registers emitted by the shader compiler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("register {reg_addr:#06x} of the {stage:?} stage holds illegal user-data value {value:#x}")]
    IllegalUserDataMapping { stage: HardwareStage, reg_addr: u16, value: u32 },
    #[error("{role:?} is mapped to both {first:#06x} and {second:#06x}")]
    DuplicateRole { role: UserDataMapping, first: u16, second: u16 },
    #[error("base instance at {base_instance:#06x} does not directly follow base vertex at {base_vertex:#06x}")]
    BaseInstanceNotAdjacent { base_vertex: u16, base_instance: u16 },
}

/// How one stage's user-data window maps onto client entries
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct UserDataEntryMap {
    /// Register holding `mapped_entry[0]`, or [`USER_DATA_NOT_MAPPED`]
    pub first_user_sgpr_reg_addr: u16,
    pub spill_table_reg_addr: u16,
    /// Client entry held by each register after the first
    pub mapped_entry: [u8; NUM_USER_DATA_REGISTERS as usize],
    pub user_sgpr_count: u8,
    _padding: u8,
}

/// Complete user-data signature of a graphics pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphicsPipelineSignature {
    pub stages: [UserDataEntryMap; HardwareStage::COUNT],
    pub vertex_buf_table_reg_addr: u16,
    pub stream_out_table_reg_addr: u16,
    /// Base vertex register; base instance is the register after it
    pub vertex_offset_reg_addr: u16,
    pub draw_index_reg_addr: u16,
    pub spill_threshold: u16,
    pub user_data_limit: u16,
    /// View-id registers of all stages, mapped ones first
    pub view_id_reg_addr: [u16; HardwareStage::COUNT],
    pub user_data_hash: [u64; HardwareStage::COUNT],
}

impl Default for GraphicsPipelineSignature {
    fn default() -> Self {
        Self {
            stages: [UserDataEntryMap::default(); HardwareStage::COUNT],
            vertex_buf_table_reg_addr: USER_DATA_NOT_MAPPED,
            stream_out_table_reg_addr: USER_DATA_NOT_MAPPED,
            vertex_offset_reg_addr: USER_DATA_NOT_MAPPED,
            draw_index_reg_addr: USER_DATA_NOT_MAPPED,
            spill_threshold: NO_USER_DATA_SPILLING,
            user_data_limit: MAX_USER_DATA_ENTRIES as u16,
            view_id_reg_addr: [USER_DATA_NOT_MAPPED; HardwareStage::COUNT],
            user_data_hash: [0; HardwareStage::COUNT],
        }
    }
}

impl GraphicsPipelineSignature {
    pub fn stage(&self, stage: HardwareStage) -> &UserDataEntryMap {
        &self.stages[stage.index()]
    }

    pub fn user_data_hash(&self, stage: HardwareStage) -> u64 {
        self.user_data_hash[stage.index()]
    }
}

/// Signature plus the ES/GS LDS size registers consumed by the geometry chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureOutput {
    pub signature: GraphicsPipelineSignature,
    pub es_gs_lds_size_reg_gs: u16,
    pub es_gs_lds_size_reg_vs: u16,
}

/// Records a pipeline-wide role, rejecting a second, different register
fn assign_role(slot: &mut u16, role: UserDataMapping, reg_addr: u16) -> Result<(), SignatureError> {
    if *slot != USER_DATA_NOT_MAPPED && *slot != reg_addr {
        return Err(SignatureError::DuplicateRole { role, first: *slot, second: reg_addr });
    }
    *slot = reg_addr;
    Ok(())
}

/// Legacy encodings of table addresses as "entry plus one"
#[derive(Debug, Clone, Copy)]
struct LegacySentinels {
    stream_out_table: Option<u16>,
    indirect_table: Option<u16>,
}

impl LegacySentinels {
    fn from_metadata(metadata: &PipelineMetadata) -> Self {
        let truncate = |value: u32| Some(value as u16).filter(|v| *v != USER_DATA_NOT_MAPPED);
        Self {
            stream_out_table: metadata.stream_out_table_address.and_then(truncate),
            indirect_table: metadata.indirect_user_data_table_addresses.and_then(|tables| truncate(tables[0])),
        }
    }

    fn matches(sentinel: Option<u16>, value: u32) -> bool {
        sentinel.is_some_and(|entry_plus_1| value.wrapping_add(1) == u32::from(entry_plus_1))
    }
}

struct SignatureBuilder<'a> {
    activation: &'a StageActivation,
    registers: &'a RegisterList,
    sentinels: LegacySentinels,
    output: SignatureOutput,
}

impl SignatureBuilder<'_> {
    fn build_stage(&mut self, stage: HardwareStage) -> Result<(), SignatureError> {
        let sh_regs = stage.sh_regs();
        let base = sh_regs.user_data_0;
        let vertex_stage = self.activation.vertex_stage();
        let mut map = UserDataEntryMap::default();
        let signature = &mut self.output.signature;

        for reg_addr in base..=sh_regs.user_data_last() {
            let Some(value) = self.registers.has_entry(reg_addr) else {
                continue;
            };

            if LegacySentinels::matches(self.sentinels.stream_out_table, value) {
                if stage == HardwareStage::Vs {
                    assign_role(&mut signature.stream_out_table_reg_addr, UserDataMapping::StreamOutTable, reg_addr)?;
                }
                continue;
            }
            if LegacySentinels::matches(self.sentinels.indirect_table, value) {
                if stage == vertex_stage {
                    assign_role(&mut signature.vertex_buf_table_reg_addr, UserDataMapping::VertexBufferTable, reg_addr)?;
                } else {
                    tracing::warn!(?stage, reg_addr, "indirect user-data tables are only supported for the vertex stage");
                }
                continue;
            }

            if value < MAX_USER_DATA_ENTRIES {
                if map.first_user_sgpr_reg_addr == USER_DATA_NOT_MAPPED {
                    map.first_user_sgpr_reg_addr = reg_addr;
                }
                let user_sgpr_id = reg_addr - map.first_user_sgpr_reg_addr;
                if user_sgpr_id >= NUM_USER_DATA_REGISTERS {
                    return Err(SignatureError::IllegalUserDataMapping { stage, reg_addr, value });
                }
                map.mapped_entry[user_sgpr_id as usize] = value as u8;
                map.user_sgpr_count = map.user_sgpr_count.max(user_sgpr_id as u8 + 1);
                continue;
            }

            let Some(mapping) = UserDataMapping::from_raw(value) else {
                return Err(SignatureError::IllegalUserDataMapping { stage, reg_addr, value });
            };
            match mapping {
                UserDataMapping::GlobalTable => {
                    if reg_addr != base + INTERNAL_TBL_START_REG {
                        tracing::warn!(?stage, reg_addr, "global table is not in the first user-data register");
                    }
                }
                UserDataMapping::PerShaderTable => {
                    if reg_addr != base + CONST_BUF_TBL_START_REG {
                        tracing::warn!(?stage, reg_addr, "per-shader table is not in the second user-data register");
                    }
                }
                UserDataMapping::SpillTable => map.spill_table_reg_addr = reg_addr,
                UserDataMapping::Workgroup => tracing::warn!(?stage, reg_addr, "workgroup user data is only meaningful for compute pipelines"),
                UserDataMapping::VertexBufferTable => assign_role(&mut signature.vertex_buf_table_reg_addr, mapping, reg_addr)?,
                UserDataMapping::StreamOutTable => assign_role(&mut signature.stream_out_table_reg_addr, mapping, reg_addr)?,
                UserDataMapping::BaseVertex => assign_role(&mut signature.vertex_offset_reg_addr, mapping, reg_addr)?,
                // Base vertex must already be mapped in the register right before
                UserDataMapping::BaseInstance => {
                    if signature.vertex_offset_reg_addr != reg_addr - 1 {
                        return Err(SignatureError::BaseInstanceNotAdjacent { base_vertex: signature.vertex_offset_reg_addr, base_instance: reg_addr });
                    }
                }
                UserDataMapping::DrawIndex => assign_role(&mut signature.draw_index_reg_addr, mapping, reg_addr)?,
                UserDataMapping::EsGsLdsSize => match stage {
                    HardwareStage::Gs => self.output.es_gs_lds_size_reg_gs = reg_addr,
                    HardwareStage::Vs => self.output.es_gs_lds_size_reg_vs = reg_addr,
                    _ => return Err(SignatureError::IllegalUserDataMapping { stage, reg_addr, value }),
                },
                UserDataMapping::BaseIndex | UserDataMapping::Log2IndexSize => {
                    tracing::warn!(?stage, reg_addr, ?mapping, "user-data mapping is not supported on this hardware")
                }
                UserDataMapping::ViewId => signature.view_id_reg_addr[stage.index()] = reg_addr,
            }
        }

        self.check_legacy_spilling(stage, vertex_stage);

        let signature = &mut self.output.signature;
        signature.user_data_hash[stage.index()] = xxh3_64(bytemuck::bytes_of(&map));
        signature.stages[stage.index()] = map;
        Ok(())
    }

    /// Legacy table addresses must not have been spilled; the compiler no longer does that
    fn check_legacy_spilling(&self, stage: HardwareStage, vertex_stage: HardwareStage) {
        let signature = &self.output.signature;
        if let Some(entry_plus_1) = self.sentinels.stream_out_table {
            if stage == HardwareStage::Vs && signature.stream_out_table_reg_addr == USER_DATA_NOT_MAPPED && entry_plus_1 - 1 >= signature.spill_threshold {
                tracing::warn!("stream-out table address is mapped to spilled user data");
            }
        }
        if let Some(entry_plus_1) = self.sentinels.indirect_table {
            if stage == vertex_stage && signature.vertex_buf_table_reg_addr == USER_DATA_NOT_MAPPED && entry_plus_1 - 1 >= signature.spill_threshold {
                tracing::warn!("indirect user-data table address is mapped to spilled user data");
            }
        }
    }
}

/// Builds the user-data signature of every active stage
///
/// # Arguments
/// * `activation` - Active hardware stages; inactive stages keep empty maps
/// * `metadata` - Spill threshold, user-data limit and legacy table sentinels
/// * `registers` - The pipeline's register list
///
/// # Returns
/// The signature and the ES/GS LDS size registers, or the first illegal mapping found
pub fn build_signature(activation: &StageActivation, metadata: &PipelineMetadata, registers: &RegisterList) -> Result<SignatureOutput, SignatureError> {
    let mut signature = GraphicsPipelineSignature::default();
    if let Some(spill_threshold) = metadata.spill_threshold {
        signature.spill_threshold = spill_threshold as u16;
    }
    if let Some(user_data_limit) = metadata.user_data_limit {
        signature.user_data_limit = user_data_limit as u16;
    }

    if let Some(tables) = metadata.indirect_user_data_table_addresses {
        if tables[1..INDIRECT_TABLE_COUNT].iter().any(|t| *t != 0) {
            tracing::warn!(?tables, "multiple indirect user-data tables are not supported");
        }
    }

    let mut builder = SignatureBuilder {
        activation,
        registers,
        sentinels: LegacySentinels::from_metadata(metadata),
        output: SignatureOutput { signature, es_gs_lds_size_reg_gs: USER_DATA_NOT_MAPPED, es_gs_lds_size_reg_vs: USER_DATA_NOT_MAPPED },
    };
    for stage in activation.active_stages() {
        builder.build_stage(stage)?;
    }

    let view_ids = &mut builder.output.signature.view_id_reg_addr;
    let mut packed = [USER_DATA_NOT_MAPPED; HardwareStage::COUNT];
    for (slot, reg_addr) in packed.iter_mut().zip(view_ids.iter().filter(|addr| **addr != USER_DATA_NOT_MAPPED)) {
        *slot = *reg_addr;
    }
    *view_ids = packed;

    Ok(builder.output)
}
