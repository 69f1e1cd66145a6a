//! Device description: chip properties, hardware workarounds and driver settings
//!
//! Everything that varies between parts of the Gfx6 family is funneled through
//! [`DeviceConfig`], which policy code receives by reference instead of querying a global
//! device object.

use crate::events::{EventSink, NullEventSink};
use crate::rings::LargestRingSizes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Graphics IP level of the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum GfxIpLevel {
    /// Southern Islands
    Gfx6,
    /// Sea Islands
    Gfx7,
    /// Volcanic Islands
    #[default]
    Gfx8,
    /// Volcanic Islands refresh (RB+ capable parts)
    Gfx8_1,
}

/// Static properties of the GPU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipProperties {
    pub gfx_level: GfxIpLevel,
    pub num_shader_engines: u32,
    pub num_cu_per_sh: u32,
    /// CUs per SH that are never power gated
    pub num_cu_always_on_per_sh: u32,
    pub max_num_cu_per_sh: u32,
    pub num_simd_per_cu: u32,
    pub num_waves_per_simd: u32,
    pub num_physical_sgprs: u32,
    pub num_physical_vgprs: u32,
    /// Depth of the VGT's GS table
    pub gs_vgt_table_depth: u32,
    /// Raw value of `GB_TILE_MODE0`, used for its `PIPE_CONFIG` field
    pub gb_tile_mode0: u32,
    /// Whether the render backends support RB+
    pub rb_plus: bool,
    /// Number of VS wavefronts the late-alloc field can express
    pub max_late_alloc_vs_limit: u32,
    pub lds_size_per_thread_group: u32,
}

impl Default for ChipProperties {
    /// A 4-engine, 9 CU per SH Gfx8 part with an 8-pipe tiling configuration
    fn default() -> Self {
        Self {
            gfx_level: GfxIpLevel::Gfx8,
            num_shader_engines: 4,
            num_cu_per_sh: 9,
            num_cu_always_on_per_sh: 9,
            max_num_cu_per_sh: 16,
            num_simd_per_cu: 4,
            num_waves_per_simd: 10,
            num_physical_sgprs: 800,
            num_physical_vgprs: 256,
            gs_vgt_table_depth: 32,
            gb_tile_mode0: 12 << 6,
            rb_plus: false,
            max_late_alloc_vs_limit: 64,
            lds_size_per_thread_group: 32 * 1024,
        }
    }
}

/// Hardware errata that change how registers are programmed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workarounds {
    /// Null primitives can deadlock VGT and PA on some 2-engine parts when tessellation feeds GS
    pub misc_gs_null_prim: bool,
    /// System hang unless PARTIAL_VS_WAVE_ON is set whenever GS is active
    pub shader_off_chip_gs_hang: bool,
    /// Re-Z can corrupt stencil unless stencil reads are forced
    pub db_rez_stencil_corruption: bool,
    /// Early-Z kills pixels under over-rasterization, so `DB_SHADER_CONTROL` is written per draw
    pub db_over_rasterization: bool,
}

/// Global out-of-order primitive rasterization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutOfOrderPrimMode {
    #[default]
    Disable,
    Safe,
    Aggressive,
    Always,
}

impl OutOfOrderPrimMode {
    /// Decodes a raw setting value; unknown values disable the feature
    pub fn from_raw(value: u32) -> Self {
        match value {
            1 => Self::Safe,
            2 => Self::Aggressive,
            3 => Self::Always,
            _ => Self::Disable,
        }
    }
}

/// How `DB_RENDER_OVERRIDE.DISABLE_VIEWPORT_CLAMP` is derived from the client's depth-clamp flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DepthClampPolicy {
    /// Disable clamping only when the pixel shader exports depth
    #[default]
    BasedOnZExport,
    /// Follow the client's flag alone
    ClientOnly,
}

/// Debug toss points that skip parts of the graphics pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TossPointMode {
    #[default]
    None,
    /// Run pixel shaders but drop all color writes
    AfterPs,
}

/// Driver settings affecting pipeline compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Pre-upload pipeline registers and bind them with LOAD_*_REG_INDEX
    pub enable_load_index_for_object_binds: bool,
    pub rb_plus_enable: bool,
    pub out_of_order_prims: OutOfOrderPrimMode,
    pub out_of_order_watermark: u32,
    pub depth_clamp_policy: DepthClampPolicy,
    pub toss_point_mode: TossPointMode,
    /// `NUM_DS_WAVES_PER_SIMD` used when the shader picks on-chip vs. off-chip tessellation dynamically
    pub ds_waves_per_simd_overflow: u32,
    pub vs_half_pack_threshold: u32,
    pub degenerate_prim_filter: bool,
    /// Device-wide late-alloc VS target, in wavefronts
    pub late_alloc_vs_limit: u32,
    pub use_fixed_late_alloc_vs_limit: bool,
    pub late_alloc_vs_on_cu_always_on: bool,
    pub num_offchip_lds_buffers: u32,
    pub num_scratch_waves_per_cu: u32,
    pub pipeline_prefetch_enable: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_load_index_for_object_binds: false,
            rb_plus_enable: false,
            out_of_order_prims: OutOfOrderPrimMode::Safe,
            out_of_order_watermark: 7,
            depth_clamp_policy: DepthClampPolicy::BasedOnZExport,
            toss_point_mode: TossPointMode::None,
            ds_waves_per_simd_overflow: 7,
            vs_half_pack_threshold: 16,
            degenerate_prim_filter: false,
            late_alloc_vs_limit: 64,
            use_fixed_late_alloc_vs_limit: false,
            late_alloc_vs_on_cu_always_on: false,
            num_offchip_lds_buffers: 256,
            num_scratch_waves_per_cu: 32,
            pipeline_prefetch_enable: true,
        }
    }
}

/// Complete description of the device a pipeline is compiled for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub properties: ChipProperties,
    pub workarounds: Workarounds,
    pub settings: Settings,
}

impl DeviceConfig {
    pub fn gfx_level(&self) -> GfxIpLevel {
        self.properties.gfx_level
    }
}

/// Device object shared by every pipeline compiled for it
///
/// Owns the device-wide ring-size maxima and the telemetry sink.
pub struct Device {
    config: DeviceConfig,
    largest_ring_sizes: LargestRingSizes,
    event_sink: Arc<dyn EventSink>,
}

impl Device {
    /// Creates a device that discards telemetry events
    pub fn new(config: DeviceConfig) -> Self {
        Self::with_event_sink(config, Arc::new(NullEventSink))
    }

    /// Creates a device reporting pipeline lifetime events to `event_sink`
    pub fn with_event_sink(config: DeviceConfig, event_sink: Arc<dyn EventSink>) -> Self {
        Self { config, largest_ring_sizes: LargestRingSizes::default(), event_sink }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Largest ring item sizes requested by any pipeline so far
    pub fn largest_ring_sizes(&self) -> &LargestRingSizes {
        &self.largest_ring_sizes
    }

    pub(crate) fn event_sink(&self) -> &dyn EventSink {
        self.event_sink.as_ref()
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").field("config", &self.config).field("largest_ring_sizes", &self.largest_ring_sizes).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_out_of_order_mode_disables() {
        assert_eq!(OutOfOrderPrimMode::from_raw(0), OutOfOrderPrimMode::Disable);
        assert_eq!(OutOfOrderPrimMode::from_raw(3), OutOfOrderPrimMode::Always);
        assert_eq!(OutOfOrderPrimMode::from_raw(42), OutOfOrderPrimMode::Disable);
    }

    #[test]
    fn test_gfx_levels_are_ordered() {
        assert!(GfxIpLevel::Gfx6 < GfxIpLevel::Gfx7);
        assert!(GfxIpLevel::Gfx8 < GfxIpLevel::Gfx8_1);
        assert!(GfxIpLevel::Gfx8_1 >= GfxIpLevel::Gfx8);
    }
}
