//! Work-dimension planning: global/local dispatch sizes with tile padding.
//!
//! For tiled stages the global size along each dimension is padded up to the
//! nearest tile multiple with integer ceiling division. The padded size can
//! exceed the logical extent, so tiled kernels bounds-check every access;
//! the planner only guarantees divisibility. Non-tiled stages keep their
//! logical extent and leave work-group selection to the dispatch layer.

/// Tile edge used by the tiled matmul kernel (16x16 work-groups).
pub const TILE_EDGE: u32 = 16;

/// Smallest multiple of `tile` that covers `extent`.
///
/// Computed with ceiling division. The hand-rolled form `((m + 15 / 16)) * 16`
/// integer-divides before adding and degenerates to `m * 16`; a regression
/// test below pins the corrected behavior.
pub fn padded_global(extent: u32, tile: u32) -> u32 {
    extent.div_ceil(tile) * tile
}

/// Global/local dispatch sizes for one kernel enqueue.
///
/// `global` is (x, y) in work-items, x varying fastest (columns). A `local`
/// of `None` lets the kernel's own default work-group size drive the
/// dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPlan {
    pub global: [u32; 2],
    pub local: Option<[u32; 2]>,
}

impl WorkPlan {
    /// 2-D plan with both dimensions padded to multiples of `tile`.
    pub fn tiled(global_x: u32, global_y: u32, tile: u32) -> Self {
        WorkPlan {
            global: [padded_global(global_x, tile), padded_global(global_y, tile)],
            local: Some([tile, tile]),
        }
    }

    /// 1-D plan over `count` work-items with no explicit local size.
    pub fn linear(count: u32) -> Self {
        WorkPlan {
            global: [count, 1],
            local: None,
        }
    }

    /// Work-group counts for dispatch, given the kernel's default local
    /// size for plans that do not pin one.
    pub fn workgroup_counts(&self, default_local: [u32; 2]) -> [u32; 3] {
        let local = self.local.unwrap_or(default_local);
        [
            self.global[0].div_ceil(local[0]),
            self.global[1].div_ceil(local[1]),
            1,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_global_is_a_tile_multiple_and_covers_extent() {
        for extent in 1..200u32 {
            for tile in [1u32, 4, 16, 64] {
                let padded = padded_global(extent, tile);
                assert_eq!(padded % tile, 0, "extent {extent} tile {tile}");
                assert!(padded >= extent, "extent {extent} tile {tile}");
                assert!(padded - extent < tile, "extent {extent} tile {tile}");
            }
        }
    }

    #[test]
    fn padded_global_uses_true_ceiling_division() {
        // Guards against the precedence bug `((M+15/16))*16` = M*16.
        assert_eq!(padded_global(20, 16), 32);
        assert_ne!(padded_global(20, 16), 320);
        assert_eq!(padded_global(16, 16), 16);
        assert_eq!(padded_global(17, 16), 32);
        assert_eq!(padded_global(1, 16), 16);
    }

    #[test]
    fn tiled_plan_pads_both_dimensions() {
        let plan = WorkPlan::tiled(64, 4, 16);
        assert_eq!(plan.global, [64, 16]);
        assert_eq!(plan.local, Some([16, 16]));
        assert_eq!(plan.workgroup_counts([1, 1]), [4, 1, 1]);
    }

    #[test]
    fn linear_plan_keeps_logical_extent() {
        let plan = WorkPlan::linear(256);
        assert_eq!(plan.global, [256, 1]);
        assert_eq!(plan.local, None);
        // Default local size drives the work-group count.
        assert_eq!(plan.workgroup_counts([64, 1]), [4, 1, 1]);
        assert_eq!(WorkPlan::linear(257).workgroup_counts([64, 1]), [5, 1, 1]);
    }
}
