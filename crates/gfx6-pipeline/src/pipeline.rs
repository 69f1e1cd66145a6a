//! Compiled graphics pipeline
//!
//! [`GraphicsPipeline::compile`] turns a shader binary and the client's fixed-function state into
//! register images, optionally pre-uploaded register blocks and a prefetch packet. Once compiled
//! the pipeline is immutable; binding it only appends packets to a caller-owned [`CmdStream`].

use crate::chunks::{ChunkInit, ChunkSet, DynamicStageInfo, DynamicStageInfos};
use crate::cmd_stream::CmdStream;
use crate::create_info::{ChNumFormat, ColorTargetInfo, MAX_COLOR_TARGETS, PipelineCreateInfo};
use crate::device::{Device, DeviceConfig, GfxIpLevel};
use crate::error::PipelineError;
use crate::events::{self, PipelineBindEvent, PipelineCreateEvent};
use crate::image::{LoadBlock, RegisterImage};
use crate::late_alloc::late_alloc_vs;
use crate::metadata::{HardwareStage, HardwareStages, PipelineBinary, ShaderType};
use crate::out_of_order::{self, BlendStateInfo, DepthStencilStateInfo, DepthStencilViewInfo, OutOfOrderInputs};
use crate::planner::{self, Plan, StageActivation};
use crate::pm4;
use crate::prim_group::ia_multi_vgt_params;
use crate::rb_plus::RbPlusRegs;
use crate::regs::{self, IaMultiVgtParam, z_order};
use crate::rings::{ShaderRingItemSizes, ShaderRingType};
use crate::setup::{SetupInputs, setup_common_registers, setup_non_shader_registers};
use crate::signature::GraphicsPipelineSignature;
use crate::upload::{GpuAllocation, UploadRequest, UploadTransaction, Uploader};
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

/// `WAVE_LIMIT` counts waves in units of this many
const WAVE_LIMIT_UNIT: u32 = 16;

/// Per-draw wave limit and CU mask of one API shader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DynamicShaderInfo {
    /// Waves per CU; zero leaves the limit alone
    pub max_waves_per_cu: u32,
    /// CUs the shader may run on; zero leaves the mask alone
    pub cu_enable_mask: u32,
}

/// [`DynamicShaderInfo`] of every API shader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DynamicGraphicsShaderInfos {
    pub vs: DynamicShaderInfo,
    pub hs: DynamicShaderInfo,
    pub ds: DynamicShaderInfo,
    pub gs: DynamicShaderInfo,
    pub ps: DynamicShaderInfo,
}

/// Where an API shader runs and what it needs, for developer tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderStats {
    pub hardware_stage: HardwareStage,
    pub program_gpu_va: u64,
    /// Entry point of the copy shader that moves GS output to the rasterizer
    pub copy_shader_gpu_va: Option<u64>,
    /// Scratch memory per thread, in bytes
    pub scratch_memory_size: u32,
    pub lds_size: u32,
    pub lds_size_per_thread_group: u32,
    pub user_data_hash: u64,
}

/// A compiled Gfx6-family graphics pipeline
#[derive(Debug)]
pub struct GraphicsPipeline {
    device: Arc<Device>,
    activation: StageActivation,
    signature: GraphicsPipelineSignature,
    image: RegisterImage,
    chunks: ChunkSet,
    load_block: LoadBlock,
    context_reg_hash: u64,
    ring_sizes: ShaderRingItemSizes,
    prefetch: Vec<u32>,
    allocation: Box<dyn GpuAllocation>,
    targets: [ColorTargetInfo; MAX_COLOR_TARGETS],
    hardware_stages: HardwareStages,
    ps_writes_uavs: bool,
}

impl GraphicsPipeline {
    /// Compiles a graphics pipeline and uploads its code
    ///
    /// # Arguments
    /// * `device` - Device the pipeline runs on; receives ring sizes and lifetime events
    /// * `create_info` - The client's fixed-function state
    /// * `binary` - Shader compiler output
    /// * `uploader` - Source of GPU memory for code and register blocks
    ///
    /// # Returns
    /// The complete pipeline, or the first error; nothing is reported to the device on failure
    pub fn compile<U: Uploader>(device: &Arc<Device>, create_info: &PipelineCreateInfo, binary: &PipelineBinary, uploader: &mut U) -> Result<Self, PipelineError> {
        let config = device.config();
        let registers = &binary.registers;
        let metadata = &binary.metadata;

        let Plan { activation, signature, load_info, mut chunks } = planner::plan(config, binary)?;

        let request = UploadRequest {
            ctx_reg_count: load_info.loaded_ctx_reg_count,
            sh_reg_count: load_info.loaded_sh_reg_count,
            heap: create_info.preferred_heap.unwrap_or_default(),
        };
        let mut upload = uploader.begin_upload(&binary.code, &request)?;
        let code_gpu_va = upload.code_gpu_va();
        let code_size = upload.code_size();

        let mut hasher = Xxh3::new();
        chunks.late_init(&mut ChunkInit {
            device: config,
            registers,
            metadata,
            create_info,
            load_info: &load_info,
            code_gpu_va,
            upload: &mut upload,
            hasher: &mut hasher,
        })?;

        let mut image = RegisterImage::default();
        let inputs = SetupInputs { device: config, registers, create_info, activation: &activation };
        setup_common_registers(&inputs, &mut image.context)?;
        image.sh.spi_shader_late_alloc_vs = late_alloc_vs(config, registers, create_info);
        image.context.ia_multi_vgt_param = ia_multi_vgt_params(config, registers, &activation, &image.context);
        setup_non_shader_registers(&inputs, &mut image.context);

        let mut load_block = LoadBlock::default();
        if upload.enable_load_index_path() {
            for (addr, value) in image.context.preloaded_writes() {
                upload.add_ctx_reg(addr, value);
            }
            if config.gfx_level() >= GfxIpLevel::Gfx7 {
                upload.add_sh_reg(regs::SPI_SHADER_LATE_ALLOC_VS, image.sh.spi_shader_late_alloc_vs.0);
            }
            load_block = LoadBlock {
                gpu_va_ctx: upload.ctx_reg_gpu_va(),
                count_ctx: upload.ctx_reg_count(),
                gpu_va_sh: upload.sh_reg_gpu_va(),
                count_sh: upload.sh_reg_count(),
            };
        }

        let allocation = upload.end()?;

        hasher.update(bytemuck::bytes_of(&image.context));
        let context_reg_hash = hasher.digest();

        let prefetch = if config.settings.pipeline_prefetch_enable { pm4::build_prefetch(code_gpu_va, code_size).to_vec() } else { Vec::new() };

        let ring_sizes = ring_item_sizes(config, &activation, &chunks, binary);
        device.largest_ring_sizes().update(&ring_sizes);

        events::report_created(
            device.event_sink(),
            &PipelineCreateEvent { context_reg_hash, internal: create_info.internal, heap: allocation.heap() },
            &PipelineBindEvent { context_reg_hash, gpu_va: allocation.gpu_va(), required_gpu_mem_size: allocation.size(), offset: allocation.offset() },
        );

        tracing::debug!(
            hash = context_reg_hash,
            gpu_va = allocation.gpu_va(),
            load_path = !load_block.is_empty(),
            "compiled graphics pipeline"
        );

        Ok(Self {
            device: Arc::clone(device),
            activation,
            signature,
            image,
            chunks,
            load_block,
            context_reg_hash,
            ring_sizes,
            prefetch,
            allocation,
            targets: create_info.cb_state.targets,
            hardware_stages: metadata.hardware_stages.clone(),
            ps_writes_uavs: metadata.ps_writes_uavs,
        })
    }

    fn config(&self) -> &DeviceConfig {
        self.device.config()
    }

    pub fn activation(&self) -> &StageActivation {
        &self.activation
    }

    pub fn signature(&self) -> &GraphicsPipelineSignature {
        &self.signature
    }

    pub fn image(&self) -> &RegisterImage {
        &self.image
    }

    pub fn chunks(&self) -> &ChunkSet {
        &self.chunks
    }

    /// Pre-uploaded register blocks; empty when registers are written with SET packets
    pub fn load_block(&self) -> &LoadBlock {
        &self.load_block
    }

    /// Hash of every context register the pipeline writes
    pub fn context_reg_hash(&self) -> u64 {
        self.context_reg_hash
    }

    pub fn ring_sizes(&self) -> &ShaderRingItemSizes {
        &self.ring_sizes
    }

    pub fn allocation(&self) -> &dyn GpuAllocation {
        self.allocation.as_ref()
    }

    /// `IA_MULTI_VGT_PARAM` for a draw
    pub fn ia_multi_vgt_param(&self, force_wd_switch_on_eop: bool) -> IaMultiVgtParam {
        self.image.context.ia_multi_vgt_param[usize::from(force_wd_switch_on_eop)]
    }

    /// First user-data register of the stage running the client's vertex shader
    pub fn vs_user_data_base_offset(&self) -> u16 {
        self.activation.vertex_stage().sh_regs().user_data_0
    }

    /// Converts a per-CU wave limit into `WAVE_LIMIT` units
    ///
    /// # Arguments
    /// * `max_waves_per_cu` - Waves per CU requested by the client; zero means no limit
    pub fn calc_max_waves_per_sh(&self, max_waves_per_cu: u32) -> u32 {
        if max_waves_per_cu == 0 {
            return 0;
        }
        let properties = &self.config().properties;
        let max_waves_per_sh = properties.max_num_cu_per_sh * properties.num_simd_per_cu * properties.num_waves_per_simd;
        let waves_per_sh = u64::from(max_waves_per_cu) * u64::from(properties.num_cu_per_sh) / u64::from(WAVE_LIMIT_UNIT);
        u32::try_from(waves_per_sh).unwrap_or(u32::MAX).max(1).min(max_waves_per_sh)
    }

    /// Maps API shader limits onto the hardware stages running them
    pub fn calc_dynamic_stage_infos(&self, infos: &DynamicGraphicsShaderInfos) -> DynamicStageInfos {
        let mut stage_infos = DynamicStageInfos::default();
        if self.config().gfx_level() < GfxIpLevel::Gfx7 {
            return stage_infos;
        }

        let convert = |info: &DynamicShaderInfo| DynamicStageInfo { waves_per_sh: self.calc_max_waves_per_sh(info.max_waves_per_cu), cu_enable_mask: info.cu_enable_mask };

        stage_infos.ps = convert(&infos.ps);
        if self.activation.is_tess_enabled() {
            stage_infos.ls = convert(&infos.vs);
            stage_infos.hs = convert(&infos.hs);
            if self.activation.is_gs_enabled() {
                stage_infos.es = convert(&infos.ds);
                stage_infos.gs = convert(&infos.gs);
            } else {
                stage_infos.vs = convert(&infos.ds);
            }
        } else if self.activation.is_gs_enabled() {
            stage_infos.es = convert(&infos.vs);
            stage_infos.gs = convert(&infos.gs);
        } else {
            stage_infos.vs = convert(&infos.vs);
        }
        stage_infos
    }

    /// Writes the pipeline's SH registers
    pub fn write_sh_commands(&self, stream: &mut CmdStream, infos: &DynamicGraphicsShaderInfos) {
        let stage_infos = self.calc_dynamic_stage_infos(infos);
        let load_path = self.load_block.count_sh != 0 && !stream.pm4_optimizer_enabled();

        if load_path {
            stream.write_load_sh_regs_index(self.load_block.gpu_va_sh, self.load_block.count_sh);
        } else if self.config().gfx_level() >= GfxIpLevel::Gfx7 {
            stream.write_set_one_sh_reg(regs::SPI_SHADER_LATE_ALLOC_VS, self.image.sh.spi_shader_late_alloc_vs.0);
        }

        self.chunks.write_sh_commands(stream, load_path, &stage_infos);
    }

    /// Writes the pipeline's context registers
    pub fn write_context_commands(&self, stream: &mut CmdStream) {
        let context = &self.image.context;

        if self.load_block.count_ctx != 0 && !stream.pm4_optimizer_enabled() {
            stream.write_load_context_regs_index(self.load_block.gpu_va_ctx, self.load_block.count_ctx);
        } else {
            stream.write_set_one_context_reg(regs::VGT_SHADER_STAGES_EN, context.vgt_shader_stages_en.0);
            stream.write_set_one_context_reg(regs::VGT_GS_MODE, context.vgt_gs_mode.0);
            stream.write_set_one_context_reg(regs::VGT_REUSE_OFF, context.vgt_reuse_off.0);
            stream.write_set_one_context_reg(regs::VGT_TF_PARAM, context.vgt_tf_param.0);
            stream.write_set_one_context_reg(regs::CB_COLOR_CONTROL, context.cb_color_control.0);
            stream.write_set_seq_context_regs(regs::CB_TARGET_MASK, &[context.cb_target_mask.0, context.cb_shader_mask.0]);
            stream.write_set_one_context_reg(regs::PA_CL_CLIP_CNTL, context.pa_cl_clip_cntl.0);
            stream.write_set_one_context_reg(regs::PA_SU_VTX_CNTL, context.pa_su_vtx_cntl.0);
            stream.write_set_one_context_reg(regs::PA_CL_VTE_CNTL, context.pa_cl_vte_cntl.0);
            stream.write_set_one_context_reg(regs::PA_SC_LINE_CNTL, context.pa_sc_line_cntl.0);
            stream.write_set_one_context_reg(regs::SPI_INTERP_CONTROL_0, context.spi_interp_control_0.0);
            stream.write_set_one_context_reg(regs::VGT_VERTEX_REUSE_BLOCK_CNTL, context.vgt_vertex_reuse_block_cntl.0);

            // Written per draw instead on hardware with the over-rasterization erratum
            if !self.config().workarounds.db_over_rasterization {
                stream.write_set_one_context_reg(regs::DB_SHADER_CONTROL, context.db_shader_control.0);
            }

            self.chunks.write_context_commands(stream);
        }

        // Both registers are shared with state owned by other objects
        stream.write_context_reg_rmw(regs::DB_ALPHA_TO_MASK, regs::DB_ALPHA_TO_MASK_ENABLE_MASK, context.db_alpha_to_mask.0);
        stream.write_context_reg_rmw(regs::DB_RENDER_OVERRIDE, regs::DB_RENDER_OVERRIDE_RMW_MASK, context.db_render_override.0);
    }

    /// Writes `DB_SHADER_CONTROL` for a draw on hardware with the over-rasterization erratum
    ///
    /// # Arguments
    /// * `depth_enabled` - Depth testing is on for the draw
    /// * `uses_over_rasterization` - The bound MSAA state over-rasterizes
    /// * `stream` - Command stream to write into
    pub fn write_db_shader_control(&self, depth_enabled: bool, uses_over_rasterization: bool, stream: &mut CmdStream) {
        if !self.config().workarounds.db_over_rasterization {
            return;
        }

        let mut db_shader_control = self.image.context.db_shader_control;
        if db_shader_control.z_order() == z_order::EARLY_Z_THEN_LATE_Z && uses_over_rasterization && depth_enabled {
            db_shader_control.set_z_order(z_order::LATE_Z);
        }
        stream.write_set_one_context_reg(regs::DB_SHADER_CONTROL, db_shader_control.0);
    }

    /// Writes the packet that warms L2 with the pipeline's code
    pub fn prefetch(&self, stream: &mut CmdStream) {
        stream.write_raw(&self.prefetch);
    }

    /// RB+ registers for blitting into a target of a different format
    ///
    /// # Arguments
    /// * `slot` - Render target index
    /// * `format` - Format of the blit destination
    ///
    /// # Returns
    /// The three SX registers, or `None` when the pipeline's own values already fit or the
    /// slot is not a color target
    pub fn override_rb_plus_registers_for_rpm(&self, slot: usize, format: ChNumFormat) -> Option<RbPlusRegs> {
        if self.targets.get(slot)?.format == format || self.image.context.cb_color_control.disable_dual_quad() != 0 {
            return None;
        }
        let mut rb_plus = RbPlusRegs::default();
        rb_plus.setup_slot(slot, format.component_mask(), format);
        Some(rb_plus)
    }

    /// Decides whether a draw's primitives may be rasterized out of order
    pub fn can_draw_prims_out_of_order(
        &self,
        ds_view: Option<&DepthStencilViewInfo>,
        ds_state: Option<&DepthStencilStateInfo>,
        blend_state: Option<&BlendStateInfo>,
        active_queries: u32,
    ) -> bool {
        out_of_order::can_draw_prims_out_of_order(&OutOfOrderInputs {
            mode: self.config().settings.out_of_order_prims,
            ps_writes_uavs: self.ps_writes_uavs,
            ds_view,
            ds_state,
            blend_state,
            active_queries,
            target_masks: self.targets.map(|target| target.channel_write_mask),
        })
    }

    /// Hardware stage running an API shader
    fn hardware_stage_of(&self, shader_type: ShaderType) -> Option<HardwareStage> {
        let tess = self.activation.is_tess_enabled();
        let gs = self.activation.is_gs_enabled();
        match shader_type {
            ShaderType::Vertex => Some(self.activation.vertex_stage()),
            ShaderType::Hull => tess.then_some(HardwareStage::Hs),
            ShaderType::Domain => tess.then_some(if gs { HardwareStage::Es } else { HardwareStage::Vs }),
            ShaderType::Geometry => gs.then_some(HardwareStage::Gs),
            ShaderType::Pixel => Some(HardwareStage::Ps),
        }
    }

    /// Resource usage of an API shader, or `None` if the pipeline does not use it
    pub fn shader_stats(&self, shader_type: ShaderType) -> Option<ShaderStats> {
        let stage = self.hardware_stage_of(shader_type)?;
        let program = self.chunks.program(stage)?;
        let stage_metadata = self.hardware_stages.get(stage);
        let copy_shader_gpu_va = (shader_type == ShaderType::Geometry).then(|| self.chunks.vs_ps.vs_program().program_gpu_va());

        Some(ShaderStats {
            hardware_stage: stage,
            program_gpu_va: program.program_gpu_va(),
            copy_shader_gpu_va,
            scratch_memory_size: stage_metadata.scratch_memory_size.unwrap_or(0),
            lds_size: stage_metadata.lds_size.unwrap_or(0),
            lds_size_per_thread_group: self.config().properties.lds_size_per_thread_group,
            user_data_hash: self.signature.user_data_hash(stage),
        })
    }
}

/// Ring item sizes the pipeline needs
fn ring_item_sizes(config: &DeviceConfig, activation: &StageActivation, chunks: &ChunkSet, binary: &PipelineBinary) -> ShaderRingItemSizes {
    let mut sizes = ShaderRingItemSizes::default();
    if let Some(es_gs) = &chunks.es_gs {
        sizes.set(ShaderRingType::EsGs, u64::from(es_gs.es_gs_ring_item_size()));
        sizes.set(ShaderRingType::GsVs, u64::from(es_gs.gs_vs_ring_item_size()));
    }
    if activation.is_tess_enabled() {
        sizes.set(ShaderRingType::TfBuffer, 1);
        sizes.set(ShaderRingType::OffChipLds, u64::from(config.settings.num_offchip_lds_buffers));
    }
    sizes.set(ShaderRingType::GfxScratch, u64::from(binary.metadata.scratch_memory_dwords()));
    sizes
}
