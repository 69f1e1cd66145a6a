//! Hardware register addresses and field layouts
//!
//! Addresses are dword offsets in the GPU register space. Context registers live at
//! `0xA000..` and SH (shader-stage) registers at `0x2C00..`. Only the registers touched by
//! graphics pipeline compilation are described here.

use bytemuck::{Pod, Zeroable};
use serde::Serialize;

/// First dword address of the context register space
pub const CONTEXT_SPACE_START: u16 = 0xA000;
/// First dword address of the persistent (SH) register space
pub const PERSISTENT_SPACE_START: u16 = 0x2C00;

// Context registers.
pub const DB_RENDER_OVERRIDE: u16 = 0xA003;
pub const CB_TARGET_MASK: u16 = 0xA08E;
pub const CB_SHADER_MASK: u16 = 0xA08F;
pub const SPI_PS_INPUT_CNTL_0: u16 = 0xA191;
pub const SPI_VS_OUT_CONFIG: u16 = 0xA1B1;
pub const SPI_PS_INPUT_ENA: u16 = 0xA1B3;
pub const SPI_PS_INPUT_ADDR: u16 = 0xA1B4;
pub const SPI_INTERP_CONTROL_0: u16 = 0xA1B5;
pub const SPI_PS_IN_CONTROL: u16 = 0xA1B6;
pub const SPI_BARYC_CNTL: u16 = 0xA1B8;
pub const SPI_SHADER_POS_FORMAT: u16 = 0xA1C3;
pub const SPI_SHADER_Z_FORMAT: u16 = 0xA1C4;
pub const SPI_SHADER_COL_FORMAT: u16 = 0xA1C5;
pub const SX_PS_DOWNCONVERT: u16 = 0xA1D5;
pub const SX_BLEND_OPT_EPSILON: u16 = 0xA1D6;
pub const SX_BLEND_OPT_CONTROL: u16 = 0xA1D7;
pub const CB_COLOR_CONTROL: u16 = 0xA202;
pub const DB_SHADER_CONTROL: u16 = 0xA203;
pub const PA_CL_CLIP_CNTL: u16 = 0xA204;
pub const PA_CL_VTE_CNTL: u16 = 0xA206;
pub const PA_CL_VS_OUT_CNTL: u16 = 0xA207;
pub const VGT_HOS_MAX_TESS_LEVEL: u16 = 0xA286;
pub const VGT_HOS_MIN_TESS_LEVEL: u16 = 0xA287;
pub const VGT_GS_MODE: u16 = 0xA290;
pub const PA_SC_MODE_CNTL_1: u16 = 0xA293;
pub const VGT_GS_OUT_PRIM_TYPE: u16 = 0xA29B;
pub const VGT_PRIMITIVEID_EN: u16 = 0xA2A1;
pub const IA_MULTI_VGT_PARAM: u16 = 0xA2AA;
pub const VGT_ESGS_RING_ITEMSIZE: u16 = 0xA2AB;
pub const VGT_GSVS_RING_ITEMSIZE: u16 = 0xA2AC;
pub const VGT_REUSE_OFF: u16 = 0xA2AD;
pub const VGT_GS_MAX_VERT_OUT: u16 = 0xA2CE;
pub const VGT_GS_ONCHIP_CNTL: u16 = 0xA2D1;
pub const VGT_SHADER_STAGES_EN: u16 = 0xA2D5;
pub const VGT_LS_HS_CONFIG: u16 = 0xA2D6;
pub const VGT_GS_VERT_ITEMSIZE: u16 = 0xA2D7;
pub const VGT_TF_PARAM: u16 = 0xA2DB;
pub const DB_ALPHA_TO_MASK: u16 = 0xA2DC;
pub const VGT_GS_INSTANCE_CNT: u16 = 0xA2E4;
pub const VGT_STRMOUT_CONFIG: u16 = 0xA2E5;
pub const VGT_STRMOUT_BUFFER_CONFIG: u16 = 0xA2E6;
pub const PA_SC_LINE_CNTL: u16 = 0xA2F7;
pub const PA_SU_VTX_CNTL: u16 = 0xA2F9;
pub const VGT_VERTEX_REUSE_BLOCK_CNTL: u16 = 0xA316;

/// Number of `SPI_PS_INPUT_CNTL_n` registers
pub const NUM_PS_INPUT_CNTL: u16 = 32;
/// Number of `VGT_GS_VERT_ITEMSIZE_n` registers (one per stream)
pub const NUM_GS_VERT_ITEMSIZE: u16 = 4;

// SH registers.
pub const SPI_SHADER_LATE_ALLOC_VS: u16 = 0x2C47;

/// Number of user-data registers in each hardware stage's window
pub const NUM_USER_DATA_REGISTERS: u16 = 16;

/// SH register block belonging to one hardware shader stage
///
/// Every graphics stage has the same layout relative to its block base, which is why a single
/// set of offsets describes all six of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageShRegs {
    pub pgm_rsrc3: u16,
    pub pgm_lo: u16,
    pub pgm_hi: u16,
    pub pgm_rsrc1: u16,
    pub pgm_rsrc2: u16,
    pub user_data_0: u16,
}

impl StageShRegs {
    const fn at(base: u16) -> Self {
        Self {
            pgm_rsrc3: base + 0x07,
            pgm_lo: base + 0x08,
            pgm_hi: base + 0x09,
            pgm_rsrc1: base + 0x0A,
            pgm_rsrc2: base + 0x0B,
            user_data_0: base + 0x0C,
        }
    }

    /// Address of the last register of the user-data window
    pub const fn user_data_last(&self) -> u16 {
        self.user_data_0 + NUM_USER_DATA_REGISTERS - 1
    }
}

pub const SPI_SHADER_PS: StageShRegs = StageShRegs::at(0x2C00);
pub const SPI_SHADER_VS: StageShRegs = StageShRegs::at(0x2C40);
pub const SPI_SHADER_GS: StageShRegs = StageShRegs::at(0x2C80);
pub const SPI_SHADER_ES: StageShRegs = StageShRegs::at(0x2CC0);
pub const SPI_SHADER_HS: StageShRegs = StageShRegs::at(0x2D00);
pub const SPI_SHADER_LS: StageShRegs = StageShRegs::at(0x2D40);

/// Register names used by manifests and dumps
pub const NAMED_REGISTERS: &[(&str, u16)] = &[
    ("DB_RENDER_OVERRIDE", DB_RENDER_OVERRIDE),
    ("CB_TARGET_MASK", CB_TARGET_MASK),
    ("CB_SHADER_MASK", CB_SHADER_MASK),
    ("SPI_VS_OUT_CONFIG", SPI_VS_OUT_CONFIG),
    ("SPI_PS_INPUT_ENA", SPI_PS_INPUT_ENA),
    ("SPI_PS_INPUT_ADDR", SPI_PS_INPUT_ADDR),
    ("SPI_INTERP_CONTROL_0", SPI_INTERP_CONTROL_0),
    ("SPI_PS_IN_CONTROL", SPI_PS_IN_CONTROL),
    ("SPI_BARYC_CNTL", SPI_BARYC_CNTL),
    ("SPI_SHADER_POS_FORMAT", SPI_SHADER_POS_FORMAT),
    ("SPI_SHADER_Z_FORMAT", SPI_SHADER_Z_FORMAT),
    ("SPI_SHADER_COL_FORMAT", SPI_SHADER_COL_FORMAT),
    ("SX_PS_DOWNCONVERT", SX_PS_DOWNCONVERT),
    ("SX_BLEND_OPT_EPSILON", SX_BLEND_OPT_EPSILON),
    ("SX_BLEND_OPT_CONTROL", SX_BLEND_OPT_CONTROL),
    ("CB_COLOR_CONTROL", CB_COLOR_CONTROL),
    ("DB_SHADER_CONTROL", DB_SHADER_CONTROL),
    ("PA_CL_CLIP_CNTL", PA_CL_CLIP_CNTL),
    ("PA_CL_VTE_CNTL", PA_CL_VTE_CNTL),
    ("PA_CL_VS_OUT_CNTL", PA_CL_VS_OUT_CNTL),
    ("VGT_HOS_MAX_TESS_LEVEL", VGT_HOS_MAX_TESS_LEVEL),
    ("VGT_HOS_MIN_TESS_LEVEL", VGT_HOS_MIN_TESS_LEVEL),
    ("VGT_GS_MODE", VGT_GS_MODE),
    ("PA_SC_MODE_CNTL_1", PA_SC_MODE_CNTL_1),
    ("VGT_GS_OUT_PRIM_TYPE", VGT_GS_OUT_PRIM_TYPE),
    ("VGT_PRIMITIVEID_EN", VGT_PRIMITIVEID_EN),
    ("IA_MULTI_VGT_PARAM", IA_MULTI_VGT_PARAM),
    ("VGT_ESGS_RING_ITEMSIZE", VGT_ESGS_RING_ITEMSIZE),
    ("VGT_GSVS_RING_ITEMSIZE", VGT_GSVS_RING_ITEMSIZE),
    ("VGT_REUSE_OFF", VGT_REUSE_OFF),
    ("VGT_GS_MAX_VERT_OUT", VGT_GS_MAX_VERT_OUT),
    ("VGT_GS_ONCHIP_CNTL", VGT_GS_ONCHIP_CNTL),
    ("VGT_SHADER_STAGES_EN", VGT_SHADER_STAGES_EN),
    ("VGT_LS_HS_CONFIG", VGT_LS_HS_CONFIG),
    ("VGT_GS_VERT_ITEMSIZE", VGT_GS_VERT_ITEMSIZE),
    ("VGT_TF_PARAM", VGT_TF_PARAM),
    ("DB_ALPHA_TO_MASK", DB_ALPHA_TO_MASK),
    ("VGT_GS_INSTANCE_CNT", VGT_GS_INSTANCE_CNT),
    ("VGT_STRMOUT_CONFIG", VGT_STRMOUT_CONFIG),
    ("VGT_STRMOUT_BUFFER_CONFIG", VGT_STRMOUT_BUFFER_CONFIG),
    ("PA_SC_LINE_CNTL", PA_SC_LINE_CNTL),
    ("PA_SU_VTX_CNTL", PA_SU_VTX_CNTL),
    ("VGT_VERTEX_REUSE_BLOCK_CNTL", VGT_VERTEX_REUSE_BLOCK_CNTL),
    ("SPI_SHADER_LATE_ALLOC_VS", SPI_SHADER_LATE_ALLOC_VS),
    ("SPI_SHADER_PGM_RSRC1_PS", SPI_SHADER_PS.pgm_rsrc1),
    ("SPI_SHADER_PGM_RSRC2_PS", SPI_SHADER_PS.pgm_rsrc2),
    ("SPI_SHADER_PGM_RSRC3_PS", SPI_SHADER_PS.pgm_rsrc3),
    ("SPI_SHADER_PGM_RSRC1_VS", SPI_SHADER_VS.pgm_rsrc1),
    ("SPI_SHADER_PGM_RSRC2_VS", SPI_SHADER_VS.pgm_rsrc2),
    ("SPI_SHADER_PGM_RSRC3_VS", SPI_SHADER_VS.pgm_rsrc3),
    ("SPI_SHADER_PGM_RSRC1_GS", SPI_SHADER_GS.pgm_rsrc1),
    ("SPI_SHADER_PGM_RSRC2_GS", SPI_SHADER_GS.pgm_rsrc2),
    ("SPI_SHADER_PGM_RSRC3_GS", SPI_SHADER_GS.pgm_rsrc3),
    ("SPI_SHADER_PGM_RSRC1_ES", SPI_SHADER_ES.pgm_rsrc1),
    ("SPI_SHADER_PGM_RSRC2_ES", SPI_SHADER_ES.pgm_rsrc2),
    ("SPI_SHADER_PGM_RSRC3_ES", SPI_SHADER_ES.pgm_rsrc3),
    ("SPI_SHADER_PGM_RSRC1_HS", SPI_SHADER_HS.pgm_rsrc1),
    ("SPI_SHADER_PGM_RSRC2_HS", SPI_SHADER_HS.pgm_rsrc2),
    ("SPI_SHADER_PGM_RSRC3_HS", SPI_SHADER_HS.pgm_rsrc3),
    ("SPI_SHADER_PGM_RSRC1_LS", SPI_SHADER_LS.pgm_rsrc1),
    ("SPI_SHADER_PGM_RSRC2_LS", SPI_SHADER_LS.pgm_rsrc2),
    ("SPI_SHADER_PGM_RSRC3_LS", SPI_SHADER_LS.pgm_rsrc3),
    ("SPI_SHADER_USER_DATA_PS_0", SPI_SHADER_PS.user_data_0),
    ("SPI_SHADER_USER_DATA_VS_0", SPI_SHADER_VS.user_data_0),
    ("SPI_SHADER_USER_DATA_GS_0", SPI_SHADER_GS.user_data_0),
    ("SPI_SHADER_USER_DATA_ES_0", SPI_SHADER_ES.user_data_0),
    ("SPI_SHADER_USER_DATA_HS_0", SPI_SHADER_HS.user_data_0),
    ("SPI_SHADER_USER_DATA_LS_0", SPI_SHADER_LS.user_data_0),
];

/// Looks up a register address by its hardware name
pub fn address_of(name: &str) -> Option<u16> {
    NAMED_REGISTERS.iter().find(|(n, _)| *n == name).map(|(_, addr)| *addr)
}

/// Looks up the hardware name of a register address
pub fn name_of(addr: u16) -> Option<&'static str> {
    NAMED_REGISTERS.iter().find(|(_, a)| *a == addr).map(|(n, _)| *n)
}

/// Returns the mask for a field spanning bits `lo..=hi` (unshifted)
pub const fn field_mask(lo: u32, hi: u32) -> u32 {
    if hi - lo >= 31 { u32::MAX } else { (1 << (hi - lo + 1)) - 1 }
}

/// Declares a 32-bit register value type with typed field accessors
macro_rules! register {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $get:ident, $set:ident: $lo:literal ..= $hi:literal;)* }) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
        pub struct $name(pub u32);

        #[allow(dead_code)]
        impl $name {
            $(
                $(#[$fmeta])*
                pub const fn $get(self) -> u32 {
                    (self.0 >> $lo) & field_mask($lo, $hi)
                }

                pub fn $set(&mut self, value: u32) {
                    let mask = field_mask($lo, $hi) << $lo;
                    self.0 = (self.0 & !mask) | ((value << $lo) & mask);
                }
            )*
        }
    };
}

register!(
    /// Which hardware shader stages run for a draw
    VgtShaderStagesEn {
        ls_en, set_ls_en: 0..=1;
        hs_en, set_hs_en: 2..=2;
        es_en, set_es_en: 3..=4;
        gs_en, set_gs_en: 5..=5;
        vs_en, set_vs_en: 6..=7;
        /// Shader decides per patch whether tessellation runs on-chip or off-chip
        dynamic_hs, set_dynamic_hs: 8..=8;
    }
);

register!(
    VgtGsMode {
        mode, set_mode: 0..=2;
        onchip, set_onchip: 21..=22;
    }
);

/// `VGT_GS_MODE.ONCHIP` value selecting on-chip GS
pub const VGT_GS_MODE_ONCHIP: u32 = 3;

register!(
    VgtTfParam {
        tess_type, set_tess_type: 0..=1;
        partitioning, set_partitioning: 2..=4;
        topology, set_topology: 5..=7;
        num_ds_waves_per_simd, set_num_ds_waves_per_simd: 10..=13;
        distribution_mode, set_distribution_mode: 17..=18;
    }
);

/// `VGT_TF_PARAM.PARTITIONING` fractional-odd mode
pub const PART_FRAC_ODD: u32 = 2;
/// `VGT_TF_PARAM.DISTRIBUTION_MODE` with distributed tessellation off
pub const NO_DIST: u32 = 0;

register!(
    VgtLsHsConfig {
        num_patches, set_num_patches: 0..=7;
        hs_num_input_cp, set_hs_num_input_cp: 8..=13;
        hs_num_output_cp, set_hs_num_output_cp: 14..=19;
    }
);

register!(
    /// Primitive grouping and wave-switching control
    IaMultiVgtParam {
        primgroup_size, set_primgroup_size: 0..=15;
        partial_vs_wave_on, set_partial_vs_wave_on: 16..=16;
        switch_on_eop, set_switch_on_eop: 17..=17;
        partial_es_wave_on, set_partial_es_wave_on: 18..=18;
        switch_on_eoi, set_switch_on_eoi: 19..=19;
        wd_switch_on_eop, set_wd_switch_on_eop: 20..=20;
        max_primgrp_in_wave, set_max_primgrp_in_wave: 28..=31;
    }
);

register!(VgtStrmoutConfig {});
register!(VgtReuseOff {});

register!(
    VgtVertexReuseBlockCntl {
        vtx_reuse_depth, set_vtx_reuse_depth: 0..=7;
    }
);

register!(
    CbColorControl {
        disable_dual_quad, set_disable_dual_quad: 0..=0;
        mode, set_mode: 4..=6;
        rop3, set_rop3: 16..=23;
    }
);

/// `CB_COLOR_CONTROL.MODE` values
pub mod cb_mode {
    pub const DISABLE: u32 = 0;
    pub const NORMAL: u32 = 1;
    pub const ELIMINATE_FAST_CLEAR: u32 = 2;
    pub const RESOLVE: u32 = 3;
    pub const FMASK_DECOMPRESS: u32 = 5;
    pub const DCC_DECOMPRESS: u32 = 6;
}

register!(
    /// Per render target channel enables, four bits per target
    CbTargetMask {
        target0_enable, set_target0_enable: 0..=3;
    }
);

register!(
    /// Per pixel-shader export channel enables, four bits per output
    CbShaderMask {
        output0_enable, set_output0_enable: 0..=3;
    }
);

register!(PaClClipCntl {});
register!(PaSuVtxCntl {});
register!(PaClVteCntl {});

register!(
    PaScLineCntl {
        expand_line_width, set_expand_line_width: 9..=9;
        last_pixel, set_last_pixel: 10..=10;
        perpendicular_endcap_ena, set_perpendicular_endcap_ena: 11..=11;
        dx10_diamond_test_ena, set_dx10_diamond_test_ena: 12..=12;
    }
);

register!(
    PaScModeCntl1 {
        walk_fence_size, set_walk_fence_size: 4..=6;
        ps_iter_sample, set_ps_iter_sample: 16..=16;
        out_of_order_primitive_enable, set_out_of_order_primitive_enable: 27..=27;
        out_of_order_water_mark, set_out_of_order_water_mark: 28..=30;
    }
);

register!(
    SpiInterpControl0 {
        flat_shade_ena, set_flat_shade_ena: 0..=0;
        pnt_sprite_ena, set_pnt_sprite_ena: 1..=1;
        pnt_sprite_top_1, set_pnt_sprite_top_1: 14..=14;
    }
);

register!(
    DbShaderControl {
        z_export_enable, set_z_export_enable: 0..=0;
        z_order, set_z_order: 4..=5;
    }
);

/// `DB_SHADER_CONTROL.Z_ORDER` values
pub mod z_order {
    pub const LATE_Z: u32 = 0;
    pub const EARLY_Z_THEN_LATE_Z: u32 = 1;
    pub const RE_Z: u32 = 2;
    pub const EARLY_Z_THEN_RE_Z: u32 = 3;
}

register!(
    DbRenderOverride {
        force_shader_z_order, set_force_shader_z_order: 10..=10;
        force_stencil_read, set_force_stencil_read: 19..=19;
        disable_viewport_clamp, set_disable_viewport_clamp: 24..=24;
    }
);

/// Fields of `DB_RENDER_OVERRIDE` owned by the pipeline; the rest belong to the depth view
pub const DB_RENDER_OVERRIDE_RMW_MASK: u32 = (1 << 10) | (1 << 19) | (1 << 24);

register!(
    DbAlphaToMask {
        alpha_to_mask_enable, set_alpha_to_mask_enable: 0..=0;
    }
);

pub const DB_ALPHA_TO_MASK_ENABLE_MASK: u32 = 1;

register!(SxPsDownconvert {});
register!(SxBlendOptEpsilon {});
register!(SxBlendOptControl {});

/// Width of one render-target slot in the SX registers
pub const SX_SLOT_BITS: u32 = 4;
pub const SX_BLEND_OPT_CONTROL_COLOR_OPT_DISABLE: u32 = 0x1;
pub const SX_BLEND_OPT_CONTROL_ALPHA_OPT_DISABLE: u32 = 0x2;

register!(
    SpiShaderPgmRsrc1 {
        /// Allocated VGPRs in units of four
        vgprs, set_vgprs: 0..=5;
        /// Allocated SGPRs in units of eight
        sgprs, set_sgprs: 6..=9;
    }
);

register!(
    SpiShaderPgmRsrc2 {
        scratch_en, set_scratch_en: 0..=0;
    }
);

register!(
    SpiShaderPgmRsrc3 {
        cu_en, set_cu_en: 0..=15;
        wave_limit, set_wave_limit: 16..=21;
    }
);

register!(
    SpiShaderLateAllocVs {
        limit, set_limit: 0..=5;
    }
);

register!(
    SpiPsInControl {
        num_interp, set_num_interp: 0..=5;
    }
);

register!(
    GbTileMode0 {
        pipe_config, set_pipe_config: 6..=10;
    }
);
