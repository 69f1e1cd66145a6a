//! PM4 type-3 packet encoding and decoding
//!
//! Every packet starts with a header dword:
//! `[31:30]=3 | [29:16]=body dwords - 1 | [15:8]=opcode | [1]=shader type`.

use crate::regs::{CONTEXT_SPACE_START, PERSISTENT_SPACE_START};
use thiserror::Error;

pub const IT_CP_DMA: u8 = 0x41;
pub const IT_CONTEXT_REG_RMW: u8 = 0x51;
pub const IT_SET_CONTEXT_REG: u8 = 0x69;
pub const IT_SET_SH_REG: u8 = 0x76;
pub const IT_LOAD_CONTEXT_REG_INDEX: u8 = 0x9F;
pub const IT_LOAD_SH_REG_INDEX: u8 = 0xA6;

/// Shader type bit of the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderType {
    Graphics = 0,
    Compute = 1,
}

/// `DATA_FORMAT` bit of LOAD_*_REG_INDEX selecting `(offset, value)` pairs
const LOAD_INDEX_OFFSET_AND_DATA: u32 = 1 << 31;

/// Largest byte count a single CP_DMA can move
pub const CP_DMA_MAX_BYTE_COUNT: u32 = (1 << 21) - 1;

/// Builds a type-3 header for a packet with `body_dwords` dwords after the header
pub const fn type3_header(opcode: u8, body_dwords: usize, shader_type: ShaderType) -> u32 {
    (3 << 30) | ((((body_dwords - 1) as u32) & 0x3FFF) << 16) | ((opcode as u32) << 8) | ((shader_type as u32) << 1)
}

/// Size in dwords of a LOAD_*_REG_INDEX packet
pub const LOAD_INDEX_PACKET_DWORDS: usize = 5;
/// Size in dwords of a CP_DMA packet
pub const CP_DMA_PACKET_DWORDS: usize = 6;

/// Builds a LOAD_CONTEXT_REG_INDEX or LOAD_SH_REG_INDEX packet
///
/// # Arguments
/// * `opcode` - One of the two load opcodes
/// * `gpu_va` - Dword-aligned address of the `(offset, value)` pairs
/// * `reg_count` - Number of pairs to load
pub fn build_load_regs_index(opcode: u8, gpu_va: u64, reg_count: u32) -> [u32; LOAD_INDEX_PACKET_DWORDS] {
    debug_assert!(gpu_va % 4 == 0);
    [
        type3_header(opcode, LOAD_INDEX_PACKET_DWORDS - 1, ShaderType::Graphics),
        (gpu_va as u32) & !0x3,
        (gpu_va >> 32) as u32,
        LOAD_INDEX_OFFSET_AND_DATA,
        (reg_count * 2) & 0x3FFF,
    ]
}

/// Builds a CP_DMA that reads a range through L2 so later shader fetches hit the cache
pub fn build_prefetch(gpu_va: u64, size: u64) -> [u32; CP_DMA_PACKET_DWORDS] {
    let byte_count = size.min(u64::from(CP_DMA_MAX_BYTE_COUNT)) as u32;
    let addr_hi = ((gpu_va >> 32) as u32) & 0xFFFF;
    [
        type3_header(IT_CP_DMA, CP_DMA_PACKET_DWORDS - 1, ShaderType::Graphics),
        gpu_va as u32,
        addr_hi,
        gpu_va as u32,
        addr_hi,
        byte_count,
    ]
}

/// Errors raised while decoding a packet stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Pm4Error {
    #[error("dword {0} is not a type-3 packet header")]
    NotType3(usize),
    #[error("packet at dword {0} runs past the end of the stream")]
    Truncated(usize),
}

/// One decoded type-3 packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pm4Packet<'a> {
    pub opcode: u8,
    pub body: &'a [u32],
}

impl Pm4Packet<'_> {
    /// Register writes carried by a SET packet, with absolute addresses
    pub fn set_register_writes(&self) -> Vec<(u16, u32)> {
        let base = match self.opcode {
            IT_SET_CONTEXT_REG => CONTEXT_SPACE_START,
            IT_SET_SH_REG => PERSISTENT_SPACE_START,
            _ => return Vec::new(),
        };
        let Some((first, values)) = self.body.split_first() else {
            return Vec::new();
        };
        values.iter().enumerate().map(|(i, value)| (base + *first as u16 + i as u16, *value)).collect()
    }
}

/// Iterates over the packets of a command stream
pub fn packets(dwords: &[u32]) -> impl Iterator<Item = Result<Pm4Packet<'_>, Pm4Error>> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        let header = *dwords.get(pos)?;
        let start = pos;
        if header >> 30 != 3 {
            pos = dwords.len();
            return Some(Err(Pm4Error::NotType3(start)));
        }
        let body_len = (((header >> 16) & 0x3FFF) + 1) as usize;
        let Some(body) = dwords.get(start + 1..start + 1 + body_len) else {
            pos = dwords.len();
            return Some(Err(Pm4Error::Truncated(start)));
        };
        pos = start + 1 + body_len;
        Some(Ok(Pm4Packet { opcode: ((header >> 8) & 0xFF) as u8, body }))
    })
}
