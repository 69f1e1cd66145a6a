//! Command stream the pipeline writes its bind-time packets into
//!
//! Owned by the caller's command buffer; the pipeline only appends to it.

use crate::pm4::{self, ShaderType};
use crate::regs::{CONTEXT_SPACE_START, PERSISTENT_SPACE_START};

/// Growable buffer of PM4 dwords
#[derive(Debug, Clone, Default)]
pub struct CmdStream {
    dwords: Vec<u32>,
    pm4_optimizer_enabled: bool,
}

impl CmdStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stream whose redundant-state optimizer is on
    ///
    /// The optimizer cannot see register values hidden behind LOAD packets, so pipelines fall
    /// back to SET packets when writing into such a stream.
    pub fn with_pm4_optimizer() -> Self {
        Self { dwords: Vec::new(), pm4_optimizer_enabled: true }
    }

    pub fn pm4_optimizer_enabled(&self) -> bool {
        self.pm4_optimizer_enabled
    }

    pub fn dwords(&self) -> &[u32] {
        &self.dwords
    }

    pub fn len(&self) -> usize {
        self.dwords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dwords.is_empty()
    }

    pub fn clear(&mut self) {
        self.dwords.clear();
    }

    /// Writes one context register
    pub fn write_set_one_context_reg(&mut self, addr: u16, value: u32) {
        self.write_set_seq_context_regs(addr, &[value]);
    }

    /// Writes consecutive context registers starting at `start`
    pub fn write_set_seq_context_regs(&mut self, start: u16, values: &[u32]) {
        debug_assert!(start >= CONTEXT_SPACE_START);
        self.write_set_regs(pm4::IT_SET_CONTEXT_REG, u32::from(start - CONTEXT_SPACE_START), values);
    }

    /// Writes one graphics SH register
    pub fn write_set_one_sh_reg(&mut self, addr: u16, value: u32) {
        self.write_set_seq_sh_regs(addr, &[value]);
    }

    /// Writes consecutive graphics SH registers starting at `start`
    pub fn write_set_seq_sh_regs(&mut self, start: u16, values: &[u32]) {
        debug_assert!(start >= PERSISTENT_SPACE_START && start < CONTEXT_SPACE_START);
        self.write_set_regs(pm4::IT_SET_SH_REG, u32::from(start - PERSISTENT_SPACE_START), values);
    }

    fn write_set_regs(&mut self, opcode: u8, offset: u32, values: &[u32]) {
        debug_assert!(!values.is_empty());
        self.dwords.push(pm4::type3_header(opcode, values.len() + 1, ShaderType::Graphics));
        self.dwords.push(offset);
        self.dwords.extend_from_slice(values);
    }

    /// Updates only the `mask` bits of a context register
    pub fn write_context_reg_rmw(&mut self, addr: u16, mask: u32, data: u32) {
        debug_assert!(addr >= CONTEXT_SPACE_START);
        self.dwords.extend_from_slice(&[pm4::type3_header(pm4::IT_CONTEXT_REG_RMW, 3, ShaderType::Graphics), u32::from(addr - CONTEXT_SPACE_START), mask, data]);
    }

    /// Loads `count` pre-uploaded context registers
    pub fn write_load_context_regs_index(&mut self, gpu_va: u64, count: u32) {
        self.dwords.extend_from_slice(&pm4::build_load_regs_index(pm4::IT_LOAD_CONTEXT_REG_INDEX, gpu_va, count));
    }

    /// Loads `count` pre-uploaded SH registers
    pub fn write_load_sh_regs_index(&mut self, gpu_va: u64, count: u32) {
        self.dwords.extend_from_slice(&pm4::build_load_regs_index(pm4::IT_LOAD_SH_REG_INDEX, gpu_va, count));
    }

    /// Appends pre-built packets verbatim
    pub fn write_raw(&mut self, dwords: &[u32]) {
        self.dwords.extend_from_slice(dwords);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pm4::packets;

    #[test]
    fn test_set_packets_round_trip_through_decoder() {
        let mut stream = CmdStream::new();
        stream.write_set_one_context_reg(0xA2D5, 0xC0);
        stream.write_set_seq_sh_regs(0x2C4A, &[1, 2]);

        let writes: Vec<(u16, u32)> = packets(stream.dwords()).flat_map(|p| p.unwrap().set_register_writes()).collect();
        assert_eq!(writes, vec![(0xA2D5, 0xC0), (0x2C4A, 1), (0x2C4B, 2)]);
    }

    #[test]
    fn test_rmw_layout() {
        let mut stream = CmdStream::new();
        stream.write_context_reg_rmw(0xA003, 0x0108_0400, 0x400);
        assert_eq!(stream.dwords(), &[0xC002_5100, 0x3, 0x0108_0400, 0x400]);
    }
}
