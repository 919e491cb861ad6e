//! Group packing planner for blocked convolution weights
//!
//! Grouped convolutions with few channels per group waste most of a hardware
//! tile on padding. The planner picks how many groups to co-pack into one
//! tile (`tile_multiplier`) so that `multiplier * cin` and `multiplier * cout`
//! line up with the tile units, bounded by the number of groups available.
//!
//! Everything here is pure integer arithmetic: the same inputs always yield
//! the same plan.

use crate::error::{ForgeResult, TileForgeError};
use crate::tensor::{checked_product, DType};

/// Output-channel tile width, fixed for every element type
pub const TILE_N: usize = 16;

/// Input-channel tile width for 1-byte element types
pub const TILE_K_BYTE: usize = 32;

/// Input-channel tile width for wider element types
pub const TILE_K_WIDE: usize = 16;

/// Innermost hardware tile dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileUnits {
    /// Input-channel tile width (innermost axis)
    pub tile_k: usize,
    /// Output-channel tile width
    pub tile_n: usize,
}

impl TileUnits {
    pub fn new(tile_k: usize, tile_n: usize) -> ForgeResult<Self> {
        if tile_k == 0 || tile_n == 0 {
            return Err(crate::invalid_arg!(
                "tile units must be non-zero, got tile_k={} tile_n={}",
                tile_k,
                tile_n
            ));
        }
        Ok(Self { tile_k, tile_n })
    }

    /// Tile units used by the blocked layouts for `dtype`
    pub fn for_dtype(dtype: DType) -> Self {
        let tile_k = if dtype.size_in_bytes() == 1 {
            TILE_K_BYTE
        } else {
            TILE_K_WIDE
        };
        Self {
            tile_k,
            tile_n: TILE_N,
        }
    }
}

/// Greatest common divisor (Euclid)
#[inline]
pub fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple, `None` on overflow; both arguments must be non-zero
#[inline]
pub fn lcm(a: usize, b: usize) -> Option<usize> {
    (a / gcd(a, b)).checked_mul(b)
}

#[inline]
pub fn ceil_div(a: usize, b: usize) -> usize {
    a / b + usize::from(a % b != 0)
}

/// `count` rounded up to a multiple of `unit`, `None` on overflow
#[inline]
fn round_up(count: usize, unit: usize) -> Option<usize> {
    ceil_div(count, unit).checked_mul(unit)
}

/// Tiling parameters for one grouped relayout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupPackingPlan {
    cin: usize,
    cout: usize,
    group_count: usize,
    tiles: TileUnits,
    tile_multiplier: usize,
    padded_cin: usize,
    padded_cout: usize,
    block_count_cin: usize,
    adjusted_group_count: usize,
}

impl GroupPackingPlan {
    /// Plan the co-packing of `group_count` groups of `cin` x `cout` channels.
    ///
    /// `cout` is the per-group output channel count. Channel counts so large
    /// that the padded extents overflow `usize` are `InvalidArgument`.
    pub fn new(cin: usize, cout: usize, group_count: usize, tiles: TileUnits) -> ForgeResult<Self> {
        if cin == 0 || cout == 0 {
            return Err(crate::invalid_arg!(
                "channel counts must be non-zero, got cin={} cout={}",
                cin,
                cout
            ));
        }
        if group_count == 0 {
            return Err(TileForgeError::InvalidArgument(
                "group count must be at least 1".to_string(),
            ));
        }

        let TileUnits { tile_k, tile_n } = TileUnits::new(tiles.tile_k, tiles.tile_n)?;
        let overflow = || {
            crate::invalid_arg!(
                "channel counts cin={} cout={} overflow the tile plan",
                cin,
                cout
            )
        };

        let mult_in = lcm(cin, tile_k).ok_or_else(overflow)? / cin;
        let mult_out = lcm(cout, tile_n).ok_or_else(overflow)? / cout;
        let tile_multiplier = lcm(mult_in, mult_out)
            .ok_or_else(overflow)?
            .min(group_count);

        let padded_cin = tile_multiplier
            .checked_mul(cin)
            .and_then(|count| round_up(count, tile_k))
            .ok_or_else(overflow)?;
        let padded_cout = tile_multiplier
            .checked_mul(cout)
            .and_then(|count| round_up(count, tile_n))
            .ok_or_else(overflow)?;

        Ok(Self {
            cin,
            cout,
            group_count,
            tiles,
            tile_multiplier,
            padded_cin,
            padded_cout,
            block_count_cin: padded_cin / tile_k,
            adjusted_group_count: ceil_div(group_count, tile_multiplier),
        })
    }

    pub fn cin(&self) -> usize {
        self.cin
    }

    pub fn cout(&self) -> usize {
        self.cout
    }

    pub fn group_count(&self) -> usize {
        self.group_count
    }

    pub fn tiles(&self) -> TileUnits {
        self.tiles
    }

    /// Groups co-packed per hardware block
    pub fn tile_multiplier(&self) -> usize {
        self.tile_multiplier
    }

    pub fn padded_cin(&self) -> usize {
        self.padded_cin
    }

    pub fn padded_cout(&self) -> usize {
        self.padded_cout
    }

    /// `padded_cin / tile_k`
    pub fn block_count_cin(&self) -> usize {
        self.block_count_cin
    }

    /// `ceil(group_count / tile_multiplier)`
    pub fn adjusted_group_count(&self) -> usize {
        self.adjusted_group_count
    }

    /// Group range `[start, end)` packed into group block `group_block`
    pub fn groups_in_block(&self, group_block: usize) -> std::ops::Range<usize> {
        let start = group_block * self.tile_multiplier;
        start..(start + self.tile_multiplier).min(self.group_count)
    }
}

/// Physical extent of a blocked destination tensor.
///
/// Seven axes, outermost first: group block, depth, input-channel block,
/// height, width, padded output channels, `tile_k`. Exists only as an
/// addressing formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockedShape {
    plan: GroupPackingPlan,
    depth: usize,
    height: usize,
    width: usize,
    slab_len: usize,
    element_count: usize,
}

impl BlockedShape {
    /// `InvalidArgument` if one slab or the whole tensor overflows `usize`
    pub fn new(
        plan: GroupPackingPlan,
        depth: usize,
        height: usize,
        width: usize,
    ) -> ForgeResult<Self> {
        let overflow = || {
            crate::invalid_arg!(
                "blocked shape for {}x{}x{} overflows usize",
                depth,
                height,
                width
            )
        };
        let slab_len = checked_product(&[
            plan.block_count_cin,
            height,
            width,
            plan.padded_cout,
            plan.tiles.tile_k,
        ])
        .ok_or_else(overflow)?;
        let element_count = checked_product(&[plan.adjusted_group_count, depth, slab_len])
            .ok_or_else(overflow)?;

        Ok(Self {
            plan,
            depth,
            height,
            width,
            slab_len,
            element_count,
        })
    }

    pub fn plan(&self) -> &GroupPackingPlan {
        &self.plan
    }

    pub fn dims(&self) -> [usize; 7] {
        [
            self.plan.adjusted_group_count,
            self.depth,
            self.plan.block_count_cin,
            self.height,
            self.width,
            self.plan.padded_cout,
            self.plan.tiles.tile_k,
        ]
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn byte_size(&self, dtype: DType) -> ForgeResult<usize> {
        self.element_count
            .checked_mul(dtype.size_in_bytes())
            .ok_or_else(|| crate::invalid_arg!("blocked shape {:?} overflows usize", self.dims()))
    }

    /// Elements covered by one `(group block, depth)` slab
    pub fn slab_len(&self) -> usize {
        self.slab_len
    }

    /// Offset of source coordinate `(g, d, c, h, w, n)` inside the slab of
    /// its `(g / tile_multiplier, d)` pair
    #[inline]
    pub fn slab_offset(&self, g: usize, c: usize, h: usize, w: usize, n: usize) -> usize {
        let plan = &self.plan;
        let tile_k = plan.tiles.tile_k;
        let e = g % plan.tile_multiplier;
        let dst_ci = e * plan.cin + c;
        let dst_co = e * plan.cout + n;
        let block_row = dst_ci % tile_k;
        let block_index = dst_ci / tile_k;

        ((block_index * self.height + h) * self.width + w) * plan.padded_cout * tile_k
            + dst_co * tile_k
            + block_row
    }

    /// Absolute destination offset of source coordinate `(g, d, c, h, w, n)`
    #[inline]
    pub fn offset(&self, g: usize, d: usize, c: usize, h: usize, w: usize, n: usize) -> usize {
        let slab = (g / self.plan.tile_multiplier) * self.depth + d;
        slab * self.slab_len + self.slab_offset(g, c, h, w, n)
    }
}
