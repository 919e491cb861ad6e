//! Physical layout tags for dense and blocked weight tensors.
//!
//! Source tensors come in one of six dense row-major orders. Each order is a
//! permutation of the canonical axes `N` (output channels), `C` (input
//! channels), `D` (depth), `H` and `W`; 2D layouts simply have no `D` axis.
//! Destinations are one of two blocked ("fractal") variants whose addressing
//! lives in [`crate::kernels::transdata::plan::BlockedShape`].

use std::fmt;
use std::str::FromStr;

use crate::error::{ForgeResult, TileForgeError};

/// Minimum rank accepted by the relayout
pub const MIN_RANK: usize = 4;

/// Canonical convolution-weight axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    N,
    C,
    D,
    H,
    W,
}

/// Dense source layout of a convolution weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// Channel-first 2D `{N, C, H, W}`
    Nchw,
    /// Channel-last 2D `{N, H, W, C}`
    Nhwc,
    /// Channel-first 3D `{N, C, D, H, W}`
    Ncdhw,
    /// Channel-last 3D `{N, D, H, W, C}`
    Ndhwc,
    /// Weight-major 2D `{H, W, C, N}`
    Hwcn,
    /// Weight-major 3D `{D, H, W, C, N}`
    Dhwcn,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 6] = [
        SourceFormat::Nchw,
        SourceFormat::Nhwc,
        SourceFormat::Ncdhw,
        SourceFormat::Ndhwc,
        SourceFormat::Hwcn,
        SourceFormat::Dhwcn,
    ];

    /// Canonical axis stored at each position, outermost first
    pub fn axes(&self) -> &'static [Axis] {
        use Axis::*;
        match self {
            SourceFormat::Nchw => &[N, C, H, W],
            SourceFormat::Nhwc => &[N, H, W, C],
            SourceFormat::Ncdhw => &[N, C, D, H, W],
            SourceFormat::Ndhwc => &[N, D, H, W, C],
            SourceFormat::Hwcn => &[H, W, C, N],
            SourceFormat::Dhwcn => &[D, H, W, C, N],
        }
    }

    pub fn rank(&self) -> usize {
        self.axes().len()
    }

    pub fn is_3d(&self) -> bool {
        self.axes().contains(&Axis::D)
    }

    /// The blocked layout this source converts into
    pub fn blocked_target(&self) -> BlockedFormat {
        if self.is_3d() {
            BlockedFormat::FractalZ3d
        } else {
            BlockedFormat::FractalZ
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceFormat::Nchw => "NCHW",
            SourceFormat::Nhwc => "NHWC",
            SourceFormat::Ncdhw => "NCDHW",
            SourceFormat::Ndhwc => "NDHWC",
            SourceFormat::Hwcn => "HWCN",
            SourceFormat::Dhwcn => "DHWCN",
        }
    }

    /// Check `shape` against this layout and pull out the canonical sizes.
    ///
    /// Rank below [`MIN_RANK`] is `RankTooLow`; any other rank that is not
    /// this layout's own rank is `InvalidArgument`.
    pub fn canonical_dims(&self, shape: &[usize]) -> ForgeResult<CanonicalDims> {
        if shape.len() < MIN_RANK {
            return Err(TileForgeError::RankTooLow {
                rank: shape.len(),
                min: MIN_RANK,
            });
        }
        if shape.len() != self.rank() {
            return Err(crate::invalid_arg!(
                "{} expects rank {}, got shape {:?}",
                self,
                self.rank(),
                shape
            ));
        }

        let mut dims = CanonicalDims {
            n: 1,
            c: 1,
            d: 1,
            h: 1,
            w: 1,
        };
        for (axis, &size) in self.axes().iter().zip(shape) {
            *dims.axis_mut(*axis) = size;
        }
        Ok(dims)
    }

    /// Row-major strides of `shape`, keyed by canonical axis.
    ///
    /// A stride that does not fit `usize` is `InvalidArgument`, even when
    /// another axis is empty.
    pub fn strides(&self, shape: &[usize]) -> ForgeResult<CanonicalStrides> {
        self.canonical_dims(shape)?;

        let mut strides = CanonicalStrides::default();
        let mut stride = Some(1usize);
        for (axis, &size) in self.axes().iter().zip(shape).rev() {
            *strides.axis_mut(*axis) = stride
                .ok_or_else(|| crate::invalid_arg!("strides of {} {:?} overflow usize", self, shape))?;
            stride = stride.and_then(|s| s.checked_mul(size));
        }
        Ok(strides)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceFormat {
    type Err = TileForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_uppercase();
        SourceFormat::ALL
            .into_iter()
            .find(|format| format.name() == tag)
            .ok_or_else(|| TileForgeError::UnsupportedLayout(format!("unknown source layout '{}'", s)))
    }
}

/// Hardware-tiled destination layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockedFormat {
    /// 2D tiled weights, fed from NCHW/NHWC/HWCN
    FractalZ,
    /// Volumetric tiled weights, fed from NCDHW/NDHWC/DHWCN
    FractalZ3d,
}

impl BlockedFormat {
    pub const ALL: [BlockedFormat; 2] = [BlockedFormat::FractalZ, BlockedFormat::FractalZ3d];

    pub fn name(&self) -> &'static str {
        match self {
            BlockedFormat::FractalZ => "FRACTAL_Z",
            BlockedFormat::FractalZ3d => "FRACTAL_Z_3D",
        }
    }

    pub fn accepts(&self, source: SourceFormat) -> bool {
        source.blocked_target() == *self
    }

    /// Reject sources of the wrong dimensionality
    pub fn check_source(&self, source: SourceFormat) -> ForgeResult<()> {
        if !self.accepts(source) {
            return Err(TileForgeError::UnsupportedLayout(format!(
                "{} cannot be converted to {}",
                source, self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for BlockedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlockedFormat {
    type Err = TileForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_uppercase();
        BlockedFormat::ALL
            .into_iter()
            .find(|format| format.name() == tag)
            .ok_or_else(|| {
                TileForgeError::UnsupportedLayout(format!("unsupported destination layout '{}'", s))
            })
    }
}

/// Product of `dims`, or `None` if it overflows `usize`.
/// Any empty axis makes the product 0.
pub fn checked_product(dims: &[usize]) -> Option<usize> {
    if dims.contains(&0) {
        return Some(0);
    }
    dims.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Element count of `shape`, or `InvalidArgument` if it overflows `usize`
pub fn element_count(shape: &[usize]) -> ForgeResult<usize> {
    checked_product(shape)
        .ok_or_else(|| crate::invalid_arg!("shape {:?} overflows usize", shape))
}

/// Sizes of the canonical axes; `d` is 1 for 2D layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonicalDims {
    pub n: usize,
    pub c: usize,
    pub d: usize,
    pub h: usize,
    pub w: usize,
}

impl CanonicalDims {
    pub fn axis(&self, axis: Axis) -> usize {
        match axis {
            Axis::N => self.n,
            Axis::C => self.c,
            Axis::D => self.d,
            Axis::H => self.h,
            Axis::W => self.w,
        }
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut usize {
        match axis {
            Axis::N => &mut self.n,
            Axis::C => &mut self.c,
            Axis::D => &mut self.d,
            Axis::H => &mut self.h,
            Axis::W => &mut self.w,
        }
    }

    /// Dense element count, `None` if it overflows `usize`
    pub fn element_count(&self) -> Option<usize> {
        checked_product(&[self.n, self.c, self.d, self.h, self.w])
    }

    /// Lay these sizes out in `format`'s dimension order
    pub fn shape_in(&self, format: SourceFormat) -> Vec<usize> {
        format.axes().iter().map(|&axis| self.axis(axis)).collect()
    }
}

/// Element strides per canonical axis (0 for an axis the layout lacks)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalStrides {
    pub n: usize,
    pub c: usize,
    pub d: usize,
    pub h: usize,
    pub w: usize,
}

impl CanonicalStrides {
    fn axis_mut(&mut self, axis: Axis) -> &mut usize {
        match axis {
            Axis::N => &mut self.n,
            Axis::C => &mut self.c,
            Axis::D => &mut self.d,
            Axis::H => &mut self.h,
            Axis::W => &mut self.w,
        }
    }

    #[inline]
    pub fn offset(&self, n: usize, c: usize, d: usize, h: usize, w: usize) -> usize {
        n * self.n + c * self.c + d * self.d + h * self.h + w * self.w
    }
}
