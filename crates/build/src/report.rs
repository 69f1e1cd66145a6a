//! Pipeline analysis reports
//!
//! Compiles a manifest against a host-memory uploader and records everything the driver
//! would hand to the command buffer: the register image, the pre-uploaded block, the
//! user-data signature and the decoded packets of both bind-time command streams.

use crate::manifest::{ManifestError, PipelineManifest, RegisterKey};
use gfx6_pipeline::image::{LoadBlock, RegisterImage};
use gfx6_pipeline::pm4::{self, Pm4Error};
use gfx6_pipeline::rings::ShaderRingItemSizes;
use gfx6_pipeline::signature::GraphicsPipelineSignature;
use gfx6_pipeline::upload::GpuAllocation;
use gfx6_pipeline::{CmdStream, Device, DynamicGraphicsShaderInfos, GraphicsPipeline, HardwareStage, HostUploader, PipelineError, ShaderType};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// API shaders listed in a report, in pipeline order
const SHADER_TYPES: [(ShaderType, &str); 5] = [
    (ShaderType::Vertex, "vertex"),
    (ShaderType::Hull, "hull"),
    (ShaderType::Domain, "domain"),
    (ShaderType::Geometry, "geometry"),
    (ShaderType::Pixel, "pixel"),
];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("pipeline compilation failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("emitted command stream is malformed: {0}")]
    Pm4(#[from] Pm4Error),
}

/// A single register write decoded from a SET packet
#[derive(Debug, Clone, Serialize)]
pub struct RegisterWrite {
    /// Hardware name, or the hex address for unnamed registers
    pub register: String,
    pub address: u16,
    pub value: u32,
}

/// One decoded type-3 packet
#[derive(Debug, Clone, Serialize)]
pub struct PacketSummary {
    pub opcode: &'static str,
    pub body: Vec<u32>,
    /// Register writes carried by the packet; empty for non-SET packets
    pub writes: Vec<RegisterWrite>,
}

/// Where an API shader runs
#[derive(Debug, Clone, Serialize)]
pub struct ShaderReport {
    pub shader: &'static str,
    pub hardware_stage: HardwareStage,
    pub program_gpu_va: u64,
    pub copy_shader_gpu_va: Option<u64>,
    pub scratch_memory_size: u32,
    pub lds_size: u32,
    pub lds_size_per_thread_group: u32,
    pub user_data_hash: u64,
}

/// Everything a compiled pipeline contributes to command buffers
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub context_reg_hash: u64,
    pub gpu_va: u64,
    pub load_block: LoadBlock,
    pub image: RegisterImage,
    pub signature: GraphicsPipelineSignature,
    pub ring_sizes: ShaderRingItemSizes,
    /// `IA_MULTI_VGT_PARAM` without and with forced `SWITCH_ON_EOP`
    pub ia_multi_vgt_param: [u32; 2],
    pub shaders: Vec<ShaderReport>,
    pub sh_commands: Vec<PacketSummary>,
    pub context_commands: Vec<PacketSummary>,
    pub prefetch_commands: Vec<PacketSummary>,
}

fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        pm4::IT_CP_DMA => "CP_DMA",
        pm4::IT_CONTEXT_REG_RMW => "CONTEXT_REG_RMW",
        pm4::IT_SET_CONTEXT_REG => "SET_CONTEXT_REG",
        pm4::IT_SET_SH_REG => "SET_SH_REG",
        pm4::IT_LOAD_CONTEXT_REG_INDEX => "LOAD_CONTEXT_REG_INDEX",
        pm4::IT_LOAD_SH_REG_INDEX => "LOAD_SH_REG_INDEX",
        _ => "UNKNOWN",
    }
}

/// Decodes a command stream into packet summaries
pub fn decode_stream(dwords: &[u32]) -> Result<Vec<PacketSummary>, Pm4Error> {
    pm4::packets(dwords)
        .map(|packet| {
            let packet = packet?;
            let writes = packet
                .set_register_writes()
                .into_iter()
                .map(|(address, value)| RegisterWrite { register: RegisterKey(address).to_string(), address, value })
                .collect();
            Ok(PacketSummary { opcode: opcode_name(packet.opcode), body: packet.body.to_vec(), writes })
        })
        .collect()
}

impl PipelineReport {
    /// Compiles a manifest and reports the result
    pub fn from_manifest(manifest: &PipelineManifest) -> Result<Self, ReportError> {
        let create_info = manifest.create_info()?;
        let binary = manifest.binary()?;
        let device = Arc::new(Device::new(manifest.device.clone()));
        let pipeline = GraphicsPipeline::compile(&device, &create_info, &binary, &mut HostUploader::new())?;
        Self::from_pipeline(manifest, &pipeline)
    }

    fn from_pipeline(manifest: &PipelineManifest, pipeline: &GraphicsPipeline) -> Result<Self, ReportError> {
        let mut stream = CmdStream::new();
        pipeline.write_sh_commands(&mut stream, &DynamicGraphicsShaderInfos::default());
        let sh_commands = decode_stream(stream.dwords())?;

        stream.clear();
        pipeline.write_context_commands(&mut stream);
        let context_commands = decode_stream(stream.dwords())?;

        stream.clear();
        pipeline.prefetch(&mut stream);
        let prefetch_commands = decode_stream(stream.dwords())?;

        let shaders = SHADER_TYPES
            .iter()
            .filter_map(|&(shader_type, shader)| {
                pipeline.shader_stats(shader_type).map(|stats| ShaderReport {
                    shader,
                    hardware_stage: stats.hardware_stage,
                    program_gpu_va: stats.program_gpu_va,
                    copy_shader_gpu_va: stats.copy_shader_gpu_va,
                    scratch_memory_size: stats.scratch_memory_size,
                    lds_size: stats.lds_size,
                    lds_size_per_thread_group: stats.lds_size_per_thread_group,
                    user_data_hash: stats.user_data_hash,
                })
            })
            .collect();

        Ok(Self {
            id: manifest.id.clone(),
            name: manifest.name.clone(),
            description: manifest.description.clone(),
            context_reg_hash: pipeline.context_reg_hash(),
            gpu_va: pipeline.allocation().gpu_va(),
            load_block: *pipeline.load_block(),
            image: *pipeline.image(),
            signature: pipeline.signature().clone(),
            ring_sizes: *pipeline.ring_sizes(),
            ia_multi_vgt_param: [pipeline.ia_multi_vgt_param(false).0, pipeline.ia_multi_vgt_param(true).0],
            shaders,
            sh_commands,
            context_commands,
            prefetch_commands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfx6_pipeline::regs;

    const VS_PS: &str = r#"
id: vs_ps
name: VS and PS
color_targets:
  - format: X8Y8Z8W8_Unorm
    channel_write_mask: 15
metadata:
  hardware_stages:
    ps:
      entry_offset: 0x200
code_size: 1024
registers:
  CB_SHADER_MASK: 0xF
  SPI_SHADER_COL_FORMAT: 0x4
  SPI_SHADER_USER_DATA_VS_0: GlobalTable
  SPI_SHADER_USER_DATA_PS_0: GlobalTable
"#;

    #[test]
    fn test_report_for_set_path() {
        let manifest = PipelineManifest::from_yaml(VS_PS).unwrap();
        let report = PipelineReport::from_manifest(&manifest).unwrap();

        assert_eq!(report.id, "vs_ps");
        assert_eq!(report.load_block, LoadBlock::default());

        let shaders: Vec<_> = report.shaders.iter().map(|shader| (shader.shader, shader.hardware_stage)).collect();
        assert_eq!(shaders, [("vertex", HardwareStage::Vs), ("pixel", HardwareStage::Ps)]);
        let ps = &report.shaders[1];
        assert_eq!(ps.program_gpu_va, report.gpu_va + 0x200);

        // SET path: register values travel inline and the stream ends with the two RMWs
        assert!(report.sh_commands.iter().all(|packet| packet.opcode == "SET_SH_REG"));
        let rmws: Vec<_> = report.context_commands.iter().rev().take(2).map(|packet| packet.opcode).collect();
        assert_eq!(rmws, ["CONTEXT_REG_RMW", "CONTEXT_REG_RMW"]);
        let cb_shader_mask = report.context_commands.iter().flat_map(|packet| &packet.writes).find(|write| write.address == regs::CB_SHADER_MASK).unwrap();
        assert_eq!(cb_shader_mask.register, "CB_SHADER_MASK");
        assert_eq!(cb_shader_mask.value, 0xF);

        assert_eq!(report.prefetch_commands.len(), 1);
        assert_eq!(report.prefetch_commands[0].opcode, "CP_DMA");
    }

    #[test]
    fn test_report_for_load_path() {
        let yaml = format!("{VS_PS}device:\n  settings:\n    enable_load_index_for_object_binds: true\n");
        let manifest = PipelineManifest::from_yaml(&yaml).unwrap();
        let report = PipelineReport::from_manifest(&manifest).unwrap();

        assert!(report.load_block.count_ctx > 0 && report.load_block.count_sh > 0);
        assert_eq!(report.context_commands[0].opcode, "LOAD_CONTEXT_REG_INDEX");
        assert_eq!(report.sh_commands[0].opcode, "LOAD_SH_REG_INDEX");
        assert_eq!(report.sh_commands[0].body[3], report.load_block.count_sh * 2);
    }

    #[test]
    fn test_compile_errors_surface() {
        let yaml = r#"
id: bad
name: Two draw index registers
registers:
  SPI_SHADER_USER_DATA_VS_4: DrawIndex
  SPI_SHADER_USER_DATA_PS_4: DrawIndex
"#;
        let manifest = PipelineManifest::from_yaml(yaml).unwrap();
        assert!(matches!(PipelineReport::from_manifest(&manifest), Err(ReportError::Pipeline(PipelineError::Signature(_)))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_stream(&[0x1234_5678]), Err(Pm4Error::NotType3(0))));
    }
}
