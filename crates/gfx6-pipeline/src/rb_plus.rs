//! Color backend tables: ROP3 codes and the RB+ export down-conversion registers

use crate::create_info::{ChNumFormat, LogicOp};
use crate::regs::{SX_BLEND_OPT_CONTROL_ALPHA_OPT_DISABLE, SX_BLEND_OPT_CONTROL_COLOR_OPT_DISABLE, SX_SLOT_BITS, SxBlendOptControl, SxBlendOptEpsilon, SxPsDownconvert};
use bytemuck::{Pod, Zeroable};
use serde::Serialize;

/// ROP3 code of each logic op, in [`LogicOp`] order
const ROP3_CODES: [u8; 16] = [0xCC, 0x00, 0x88, 0x44, 0x22, 0xAA, 0x66, 0xEE, 0x11, 0x99, 0x55, 0xDD, 0x33, 0xBB, 0x77, 0xFF];

/// Returns the `CB_COLOR_CONTROL.ROP3` code of a logic op
pub fn rop3(logic_op: LogicOp) -> u8 {
    ROP3_CODES[logic_op as usize]
}

/// Format the SX converts pixel-shader exports to before sending them to the color backend
///
/// Discriminants are the `SX_RT_EXPORT_*` hardware codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum SxDownconvertFormat {
    NoConversion = 0,
    R32 = 1,
    A32 = 2,
    Bgr101111 = 3,
    Argb2101010 = 4,
    Rgba8888 = 5,
    Rgb565 = 6,
    Argb1555 = 7,
    Argb4444 = 8,
    Gr1616 = 9,
    Ar1616 = 10,
}

impl SxDownconvertFormat {
    /// Down-conversion matching a color target format
    pub fn for_format(format: ChNumFormat) -> Self {
        use ChNumFormat::*;
        match format {
            X4Y4Z4W4_Unorm | X4Y4Z4W4_Uscaled => Self::Argb4444,
            X5Y6Z5_Unorm | X5Y6Z5_Uscaled => Self::Rgb565,
            X5Y5Z5W1_Unorm | X5Y5Z5W1_Uscaled => Self::Argb1555,
            X8_Unorm | X8_Snorm | X8_Uscaled | X8_Sscaled | X8_Uint | X8_Sint | X8_Srgb | L8_Unorm | P8_Uint | X8Y8_Unorm | X8Y8_Snorm | X8Y8_Uscaled | X8Y8_Sscaled | X8Y8_Uint
            | X8Y8_Sint | X8Y8_Srgb | L8A8_Unorm | X8Y8Z8W8_Unorm | X8Y8Z8W8_Snorm | X8Y8Z8W8_Uscaled | X8Y8Z8W8_Sscaled | X8Y8Z8W8_Uint | X8Y8Z8W8_Sint | X8Y8Z8W8_Srgb => {
                Self::Rgba8888
            }
            X11Y11Z10_Float => Self::Bgr101111,
            X10Y10Z10W2_Unorm | X10Y10Z10W2_Uscaled => Self::Argb2101010,
            X16_Unorm | X16_Snorm | X16_Uscaled | X16_Sscaled | X16_Uint | X16_Sint | X16_Float | L16_Unorm => Self::Ar1616,
            X16Y16_Unorm | X16Y16_Snorm | X16Y16_Uscaled | X16Y16_Sscaled | X16Y16_Uint | X16Y16_Sint | X16Y16_Float => Self::Gr1616,
            X32_Uint | X32_Sint | X32_Float => Self::R32,
            _ => Self::NoConversion,
        }
    }

    /// Blend optimization epsilon; larger values tolerate more precision loss
    pub fn blend_opt_epsilon(self) -> u32 {
        match self {
            Self::NoConversion | Self::R32 | Self::A32 | Self::Gr1616 | Self::Ar1616 => 0,
            // 1 would be recommended but loses precision
            Self::Bgr101111 => 0,
            Self::Argb2101010 => 3,
            // 7 would be recommended but loses precision
            Self::Rgba8888 => 6,
            Self::Rgb565 => 11,
            Self::Argb1555 => 13,
            Self::Argb4444 => 15,
        }
    }
}

/// `SX_BLEND_OPT_CONTROL` bits of one slot for a channel write mask
pub fn blend_opt_control(write_mask: u8) -> u32 {
    let color_opt_disable = if write_mask & 0x7 == 0 { SX_BLEND_OPT_CONTROL_COLOR_OPT_DISABLE } else { 0 };
    let alpha_opt_disable = if write_mask & 0x8 == 0 { SX_BLEND_OPT_CONTROL_ALPHA_OPT_DISABLE } else { 0 };
    color_opt_disable | alpha_opt_disable
}

/// The three RB+ registers, four bits per render target
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct RbPlusRegs {
    pub sx_ps_downconvert: SxPsDownconvert,
    pub sx_blend_opt_epsilon: SxBlendOptEpsilon,
    pub sx_blend_opt_control: SxBlendOptControl,
}

impl RbPlusRegs {
    /// Rewrites one render target's nibble of each register, leaving the other slots alone
    ///
    /// # Arguments
    /// * `slot` - Render target index
    /// * `write_mask` - Channel write mask of the target
    /// * `format` - Format of the target
    pub fn setup_slot(&mut self, slot: usize, write_mask: u8, format: ChNumFormat) {
        let shift = SX_SLOT_BITS * slot as u32;
        let slot_mask = 0xF << shift;

        let downconvert = SxDownconvertFormat::for_format(format);
        let epsilon = if downconvert == SxDownconvertFormat::NoConversion { 0 } else { downconvert.blend_opt_epsilon() };
        let control_mask = (SX_BLEND_OPT_CONTROL_COLOR_OPT_DISABLE | SX_BLEND_OPT_CONTROL_ALPHA_OPT_DISABLE) << shift;

        self.sx_ps_downconvert.0 = (self.sx_ps_downconvert.0 & !slot_mask) | ((downconvert as u32) << shift);
        self.sx_blend_opt_epsilon.0 = (self.sx_blend_opt_epsilon.0 & !slot_mask) | (epsilon << shift);
        self.sx_blend_opt_control.0 = (self.sx_blend_opt_control.0 & !control_mask) | (blend_opt_control(write_mask) << shift);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rop3_table() {
        assert_eq!(rop3(LogicOp::Copy), 0xCC);
        assert_eq!(rop3(LogicOp::Xor), 0x66);
        assert_eq!(rop3(LogicOp::Set), 0xFF);
        assert_eq!(rop3(LogicOp::Clear), 0x00);
    }

    #[test]
    fn test_epsilon_per_format_class() {
        let cases = [
            (ChNumFormat::X4Y4Z4W4_Unorm, 15),
            (ChNumFormat::X5Y6Z5_Unorm, 11),
            (ChNumFormat::X5Y5Z5W1_Unorm, 13),
            (ChNumFormat::X8_Unorm, 6),
            (ChNumFormat::X8Y8Z8W8_Srgb, 6),
            (ChNumFormat::X11Y11Z10_Float, 0),
            (ChNumFormat::X10Y10Z10W2_Unorm, 3),
            (ChNumFormat::X16Y16_Float, 0),
            (ChNumFormat::X32_Float, 0),
            (ChNumFormat::X32Y32Z32W32_Float, 0),
        ];
        for (format, epsilon) in cases {
            assert_eq!(SxDownconvertFormat::for_format(format).blend_opt_epsilon(), epsilon, "{format:?}");
        }
        assert_eq!(SxDownconvertFormat::for_format(ChNumFormat::X16Y16Z16W16_Float), SxDownconvertFormat::NoConversion);
    }

    #[test]
    fn test_blend_opt_control_bits() {
        assert_eq!(blend_opt_control(0xF), 0);
        assert_eq!(blend_opt_control(0x8), SX_BLEND_OPT_CONTROL_COLOR_OPT_DISABLE);
        assert_eq!(blend_opt_control(0x1), SX_BLEND_OPT_CONTROL_ALPHA_OPT_DISABLE);
        assert_eq!(blend_opt_control(0x0), SX_BLEND_OPT_CONTROL_COLOR_OPT_DISABLE | SX_BLEND_OPT_CONTROL_ALPHA_OPT_DISABLE);
    }

    #[test]
    fn test_setup_slot_only_touches_its_nibble() {
        let mut regs = RbPlusRegs::default();
        regs.setup_slot(0, 0xF, ChNumFormat::X8Y8Z8W8_Unorm);
        regs.setup_slot(2, 0x7, ChNumFormat::X5Y6Z5_Unorm);

        assert_eq!(regs.sx_ps_downconvert.0, 5 | (6 << 8));
        assert_eq!(regs.sx_blend_opt_epsilon.0, 6 | (11 << 8));
        assert_eq!(regs.sx_blend_opt_control.0, SX_BLEND_OPT_CONTROL_ALPHA_OPT_DISABLE << 8);

        // Re-running a slot replaces its previous value
        regs.setup_slot(0, 0x0, ChNumFormat::Undefined);
        assert_eq!(regs.sx_ps_downconvert.0, 6 << 8);
        assert_eq!(regs.sx_blend_opt_epsilon.0, 11 << 8);
        assert_eq!(regs.sx_blend_opt_control.0, 0x3 | (SX_BLEND_OPT_CONTROL_ALPHA_OPT_DISABLE << 8));
    }
}
