//! Out-of-order primitive rasterization eligibility
//!
//! Whether primitives of a draw may be rasterized out of order depends on the bound
//! depth/stencil and blend state, so this is evaluated at draw time against the pipeline's
//! color target masks.

use crate::create_info::MAX_COLOR_TARGETS;
use crate::device::OutOfOrderPrimMode;

/// Read-only flags of the bound depth/stencil view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthStencilViewInfo {
    pub read_only_depth: bool,
    pub read_only_stencil: bool,
}

/// Facts about the bound depth/stencil state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthStencilStateInfo {
    pub depth_write_enable: bool,
    pub stencil_write_enable: bool,
    /// The depth test yields the same result regardless of primitive order
    pub can_depth_run_out_of_order: bool,
    pub can_stencil_run_out_of_order: bool,
    /// The depth test alone guarantees the visible result, e.g. a strict less-than compare
    pub depth_forces_ordering: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlendTargetInfo {
    pub blend_enable: bool,
    /// Blending is order-independent, e.g. additive or min/max
    pub commutative: bool,
}

/// Facts about the bound color blend state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlendStateInfo {
    pub targets: [BlendTargetInfo; MAX_COLOR_TARGETS],
}

/// Draw-time state consulted by [`can_draw_prims_out_of_order`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutOfOrderInputs<'a> {
    pub mode: OutOfOrderPrimMode,
    pub ps_writes_uavs: bool,
    pub ds_view: Option<&'a DepthStencilViewInfo>,
    pub ds_state: Option<&'a DepthStencilStateInfo>,
    pub blend_state: Option<&'a BlendStateInfo>,
    /// Occlusion queries currently active
    pub active_queries: u32,
    /// Channel write mask of each color target
    pub target_masks: [u8; MAX_COLOR_TARGETS],
}

/// Decides whether a draw's primitives may be rasterized out of order
pub fn can_draw_prims_out_of_order(inputs: &OutOfOrderInputs<'_>) -> bool {
    let aggressive = match inputs.mode {
        OutOfOrderPrimMode::Disable => return false,
        OutOfOrderPrimMode::Always => return true,
        OutOfOrderPrimMode::Safe => false,
        OutOfOrderPrimMode::Aggressive => true,
    };

    if inputs.ps_writes_uavs {
        return false;
    }
    let Some(ds_state) = inputs.ds_state else {
        return false;
    };

    let ds_write_enabled = inputs
        .ds_view
        .is_some_and(|view| (!view.read_only_depth && ds_state.depth_write_enable) || (!view.read_only_stencil && ds_state.stencil_write_enable));

    // Queries count samples, so Safe mode only tolerates reordering that writes nothing
    let can_ds_run_out_of_order = if !aggressive && inputs.active_queries != 0 {
        !ds_write_enabled
    } else {
        !ds_write_enabled || (ds_state.can_depth_run_out_of_order && ds_state.can_stencil_run_out_of_order)
    };

    if !can_ds_run_out_of_order || inputs.ds_view.is_none() {
        return false;
    }

    let can_targets_run_out_of_order = aggressive && ds_state.depth_forces_ordering;
    let Some(blend_state) = inputs.blend_state else {
        return can_targets_run_out_of_order;
    };

    blend_state.targets.iter().zip(inputs.target_masks).filter(|(_, mask)| *mask > 0).all(|(target, _)| {
        let can_blend = aggressive && target.commutative;
        !((target.blend_enable || !can_targets_run_out_of_order) && (!can_blend || ds_write_enabled))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WRITING_VIEW: DepthStencilViewInfo = DepthStencilViewInfo { read_only_depth: false, read_only_stencil: false };

    fn ordered_depth_state() -> DepthStencilStateInfo {
        DepthStencilStateInfo { depth_write_enable: true, can_depth_run_out_of_order: true, can_stencil_run_out_of_order: true, depth_forces_ordering: true, ..Default::default() }
    }

    fn rt0_only() -> [u8; MAX_COLOR_TARGETS] {
        let mut masks = [0; MAX_COLOR_TARGETS];
        masks[0] = 0xF;
        masks
    }

    #[test]
    fn test_mode_extremes() {
        let inputs = OutOfOrderInputs { mode: OutOfOrderPrimMode::Always, ps_writes_uavs: true, ..Default::default() };
        assert!(can_draw_prims_out_of_order(&inputs));

        let ds_state = ordered_depth_state();
        let inputs = OutOfOrderInputs { mode: OutOfOrderPrimMode::Disable, ds_view: Some(&WRITING_VIEW), ds_state: Some(&ds_state), ..Default::default() };
        assert!(!can_draw_prims_out_of_order(&inputs));
    }

    #[test]
    fn test_uav_writes_or_missing_depth_state_block_reordering() {
        let ds_state = ordered_depth_state();
        let base = OutOfOrderInputs { mode: OutOfOrderPrimMode::Aggressive, ds_view: Some(&WRITING_VIEW), ds_state: Some(&ds_state), target_masks: rt0_only(), ..Default::default() };
        assert!(can_draw_prims_out_of_order(&base));

        assert!(!can_draw_prims_out_of_order(&OutOfOrderInputs { ps_writes_uavs: true, ..base }));
        assert!(!can_draw_prims_out_of_order(&OutOfOrderInputs { ds_state: None, ..base }));
        assert!(!can_draw_prims_out_of_order(&OutOfOrderInputs { ds_view: None, ..base }));
    }

    #[test]
    fn test_safe_mode_with_queries_requires_no_depth_writes() {
        let ds_state = ordered_depth_state();
        let blend_state = BlendStateInfo::default();
        let inputs = OutOfOrderInputs {
            mode: OutOfOrderPrimMode::Safe,
            ds_view: Some(&WRITING_VIEW),
            ds_state: Some(&ds_state),
            blend_state: Some(&blend_state),
            active_queries: 1,
            ..Default::default()
        };
        assert!(!can_draw_prims_out_of_order(&inputs));

        // No color targets written and reordering-tolerant depth state
        assert!(can_draw_prims_out_of_order(&OutOfOrderInputs { active_queries: 0, ..inputs }));

        let read_only = DepthStencilViewInfo { read_only_depth: true, read_only_stencil: true };
        assert!(can_draw_prims_out_of_order(&OutOfOrderInputs { ds_view: Some(&read_only), ..inputs }));
    }

    #[test]
    fn test_safe_mode_without_depth_view_keeps_order() {
        let ds_state = ordered_depth_state();
        let blend_state = BlendStateInfo::default();
        let inputs = OutOfOrderInputs { mode: OutOfOrderPrimMode::Safe, ds_view: None, ds_state: Some(&ds_state), ..Default::default() };
        assert!(!can_draw_prims_out_of_order(&inputs));
        assert!(!can_draw_prims_out_of_order(&OutOfOrderInputs { active_queries: 2, ..inputs }));
        assert!(!can_draw_prims_out_of_order(&OutOfOrderInputs { blend_state: Some(&blend_state), target_masks: rt0_only(), ..inputs }));
        assert!(!can_draw_prims_out_of_order(&OutOfOrderInputs { blend_state: Some(&blend_state), active_queries: 1, ..inputs }));
    }

    #[test]
    fn test_blend_rules_per_target() {
        let ds_state = DepthStencilStateInfo { depth_forces_ordering: true, ..Default::default() };
        let mut blend_state = BlendStateInfo::default();
        blend_state.targets[0] = BlendTargetInfo { blend_enable: true, commutative: true };
        let inputs = OutOfOrderInputs {
            mode: OutOfOrderPrimMode::Aggressive,
            ds_view: Some(&WRITING_VIEW),
            ds_state: Some(&ds_state),
            blend_state: Some(&blend_state),
            target_masks: rt0_only(),
            ..Default::default()
        };
        assert!(can_draw_prims_out_of_order(&inputs));

        // Commutative blending only counts in aggressive mode
        assert!(!can_draw_prims_out_of_order(&OutOfOrderInputs { mode: OutOfOrderPrimMode::Safe, ..inputs }));

        let mut non_commutative = blend_state;
        non_commutative.targets[0].commutative = false;
        assert!(!can_draw_prims_out_of_order(&OutOfOrderInputs { blend_state: Some(&non_commutative), ..inputs }));

        // Targets that are not written do not matter
        assert!(can_draw_prims_out_of_order(&OutOfOrderInputs { blend_state: Some(&non_commutative), target_masks: [0; MAX_COLOR_TARGETS], ..inputs }));
    }

    #[test]
    fn test_no_blend_state_follows_depth_ordering() {
        let ds_state = ordered_depth_state();
        let inputs = OutOfOrderInputs { mode: OutOfOrderPrimMode::Aggressive, ds_view: Some(&WRITING_VIEW), ds_state: Some(&ds_state), ..Default::default() };
        assert!(can_draw_prims_out_of_order(&inputs));
        assert!(!can_draw_prims_out_of_order(&OutOfOrderInputs { mode: OutOfOrderPrimMode::Safe, ..inputs }));
    }
}
