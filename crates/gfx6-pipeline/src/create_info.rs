//! Client-facing graphics pipeline description
//!
//! These types carry the fixed-function state a client supplies alongside the compiled shader
//! binary. They are read-only once compilation starts.

use serde::{Deserialize, Serialize};

/// Number of color render targets a pipeline can write
pub const MAX_COLOR_TARGETS: usize = 8;

/// Channel layout and numeric format of a color target
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChNumFormat {
    #[default]
    Undefined,
    X4Y4Z4W4_Unorm,
    X4Y4Z4W4_Uscaled,
    X5Y6Z5_Unorm,
    X5Y6Z5_Uscaled,
    X5Y5Z5W1_Unorm,
    X5Y5Z5W1_Uscaled,
    X8_Unorm,
    X8_Snorm,
    X8_Uscaled,
    X8_Sscaled,
    X8_Uint,
    X8_Sint,
    X8_Srgb,
    L8_Unorm,
    P8_Uint,
    X8Y8_Unorm,
    X8Y8_Snorm,
    X8Y8_Uscaled,
    X8Y8_Sscaled,
    X8Y8_Uint,
    X8Y8_Sint,
    X8Y8_Srgb,
    L8A8_Unorm,
    X8Y8Z8W8_Unorm,
    X8Y8Z8W8_Snorm,
    X8Y8Z8W8_Uscaled,
    X8Y8Z8W8_Sscaled,
    X8Y8Z8W8_Uint,
    X8Y8Z8W8_Sint,
    X8Y8Z8W8_Srgb,
    X11Y11Z10_Float,
    X10Y10Z10W2_Unorm,
    X10Y10Z10W2_Uscaled,
    X10Y10Z10W2_Uint,
    X16_Unorm,
    X16_Snorm,
    X16_Uscaled,
    X16_Sscaled,
    X16_Uint,
    X16_Sint,
    X16_Float,
    L16_Unorm,
    X16Y16_Unorm,
    X16Y16_Snorm,
    X16Y16_Uscaled,
    X16Y16_Sscaled,
    X16Y16_Uint,
    X16Y16_Sint,
    X16Y16_Float,
    X16Y16Z16W16_Unorm,
    X16Y16Z16W16_Float,
    X32_Uint,
    X32_Sint,
    X32_Float,
    X32Y32_Float,
    X32Y32Z32W32_Uint,
    X32Y32Z32W32_Float,
}

impl ChNumFormat {
    /// Returns the mask of channels present in the format (bit 0 = X ... bit 3 = W)
    pub fn component_mask(self) -> u8 {
        use ChNumFormat::*;
        match self {
            Undefined => 0x0,
            X8_Unorm | X8_Snorm | X8_Uscaled | X8_Sscaled | X8_Uint | X8_Sint | X8_Srgb | L8_Unorm | P8_Uint => 0x1,
            X16_Unorm | X16_Snorm | X16_Uscaled | X16_Sscaled | X16_Uint | X16_Sint | X16_Float | L16_Unorm => 0x1,
            X32_Uint | X32_Sint | X32_Float => 0x1,
            X8Y8_Unorm | X8Y8_Snorm | X8Y8_Uscaled | X8Y8_Sscaled | X8Y8_Uint | X8Y8_Sint | X8Y8_Srgb | L8A8_Unorm => 0x3,
            X16Y16_Unorm | X16Y16_Snorm | X16Y16_Uscaled | X16Y16_Sscaled | X16Y16_Uint | X16Y16_Sint | X16Y16_Float | X32Y32_Float => 0x3,
            X5Y6Z5_Unorm | X5Y6Z5_Uscaled | X11Y11Z10_Float => 0x7,
            _ => 0xF,
        }
    }
}

/// Logic operation applied by the color backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LogicOp {
    #[default]
    Copy,
    Clear,
    And,
    AndReverse,
    AndInverted,
    Noop,
    Xor,
    Or,
    Nor,
    Equiv,
    Invert,
    OrReverse,
    CopyInverted,
    OrInverted,
    Nand,
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShadeMode {
    #[default]
    Gouraud,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PointOrigin {
    #[default]
    UpperLeft,
    LowerLeft,
}

/// GPU memory heap that pipeline code and register blocks are uploaded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GpuHeap {
    Local,
    #[default]
    Invisible,
    GartUswc,
    GartCacheable,
}

/// Rasterizer state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizerState {
    pub expand_line_width: bool,
    pub rasterize_last_line_pixel: bool,
    pub perp_line_end_caps_enable: bool,
    pub depth_clamp_disable: bool,
    pub shade_mode: ShadeMode,
    pub point_coord_origin: PointOrigin,
    pub out_of_order_prims_enable: bool,
    pub force_sample_rate_shading: bool,
}

/// Format and write mask of one color target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorTargetInfo {
    pub format: ChNumFormat,
    /// Four-bit RGBA channel write mask
    pub channel_write_mask: u8,
}

/// Color blend state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorBlendState {
    pub targets: [ColorTargetInfo; MAX_COLOR_TARGETS],
    pub logic_op: LogicOp,
    pub dual_source_blend_enable: bool,
    pub alpha_to_coverage_enable: bool,
}

/// Flags marking internal special-purpose pipelines
///
/// At most one is honored; when several are set the first in declaration order wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialPipelineFlags {
    pub fast_clear_eliminate: bool,
    pub fmask_decompress: bool,
    pub dcc_decompress: bool,
    pub resolve_fixed_func: bool,
}

/// Everything the client specifies about a graphics pipeline besides its shaders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineCreateInfo {
    pub rs_state: RasterizerState,
    pub cb_state: ColorBlendState,
    pub special: SpecialPipelineFlags,
    /// Heap override for the pipeline's GPU memory
    pub preferred_heap: Option<GpuHeap>,
    /// Late-alloc VS target overriding the device setting, in wavefronts
    pub late_alloc_vs_limit: Option<u32>,
    /// Created by the driver itself rather than the client
    pub internal: bool,
}

impl PipelineCreateInfo {
    /// Channel write mask of a color target
    pub fn target_mask(&self, slot: usize) -> u8 {
        self.cb_state.targets[slot].channel_write_mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_masks() {
        assert_eq!(ChNumFormat::X8Y8Z8W8_Unorm.component_mask(), 0xF);
        assert_eq!(ChNumFormat::X5Y6Z5_Unorm.component_mask(), 0x7);
        assert_eq!(ChNumFormat::X16Y16_Float.component_mask(), 0x3);
        assert_eq!(ChNumFormat::X32_Float.component_mask(), 0x1);
        assert_eq!(ChNumFormat::Undefined.component_mask(), 0x0);
    }
}
