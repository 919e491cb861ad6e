//! Grouped relayout executor (dense weights -> FRACTAL_Z / FRACTAL_Z_3D)
//!
//! For every logical coordinate `(g, d, c, h, w, n)` of the source weight,
//! one element is copied from its dense offset to its blocked offset.
//! Positions no coordinate reaches are padding and stay zero.
//!
//! The destination splits into `adjusted_group_count * depth` slabs, one per
//! `(g / tile_multiplier, d)` pair. Slabs never overlap, so the parallel path
//! hands each one to a rayon worker with no synchronisation at all.
//!
//! All validation runs in [`RelayoutGeometry::new`] and the length checks
//! that follow it; nothing is written until every check has passed.

use rayon::prelude::*;

use crate::error::{check_len, ForgeResult, TileForgeError};
use crate::kernels::transdata::config::RelayoutConfig;
use crate::kernels::transdata::plan::{BlockedShape, GroupPackingPlan, TileUnits};
use crate::tensor::{
    element_count, BlockedFormat, CanonicalDims, CanonicalStrides, DType, Element, SourceFormat,
    TensorView,
};

/// Everything derived from the source description before touching data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayoutGeometry {
    source_format: SourceFormat,
    target_format: BlockedFormat,
    dtype: DType,
    dims: CanonicalDims,
    strides: CanonicalStrides,
    blocked: BlockedShape,
    source_element_count: usize,
}

impl RelayoutGeometry {
    /// Validate a relayout request and plan it.
    ///
    /// Checks run in this order: element type, destination layout, rank,
    /// source size, group divisibility, channel counts (via the planner),
    /// destination size. Any size that overflows `usize` is `InvalidArgument`.
    pub fn new(
        shape: &[usize],
        source_format: SourceFormat,
        dtype: DType,
        target_format: BlockedFormat,
        group_count: usize,
    ) -> ForgeResult<Self> {
        if !dtype.is_relayout_supported() {
            return Err(TileForgeError::UnsupportedDataType(dtype));
        }
        target_format.check_source(source_format)?;

        let dims = source_format.canonical_dims(shape)?;
        let source_element_count = element_count(shape)?;
        let strides = source_format.strides(shape)?;

        if group_count == 0 {
            return Err(crate::invalid_arg!("group count must be at least 1"));
        }
        if dims.n % group_count != 0 {
            return Err(crate::invalid_arg!(
                "output channels {} are not divisible by group count {}",
                dims.n,
                group_count
            ));
        }

        let plan = GroupPackingPlan::new(
            dims.c,
            dims.n / group_count,
            group_count,
            TileUnits::for_dtype(dtype),
        )?;
        let blocked = BlockedShape::new(plan, dims.d, dims.h, dims.w)?;

        Ok(Self {
            source_format,
            target_format,
            dtype,
            dims,
            strides,
            blocked,
            source_element_count,
        })
    }

    pub fn plan(&self) -> &GroupPackingPlan {
        self.blocked.plan()
    }

    pub fn blocked(&self) -> &BlockedShape {
        &self.blocked
    }

    pub fn dims(&self) -> &CanonicalDims {
        &self.dims
    }

    pub fn source_format(&self) -> SourceFormat {
        self.source_format
    }

    pub fn target_format(&self) -> BlockedFormat {
        self.target_format
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Destination element count
    pub fn element_count(&self) -> usize {
        self.blocked.element_count()
    }

    /// Dense source element count
    pub fn source_element_count(&self) -> usize {
        self.source_element_count
    }

    /// Zero slab `(group_block, d)` and scatter every source element it owns
    fn scatter_slab<T: Element>(&self, src: &[T], slab: &mut [T], group_block: usize, d: usize) {
        slab.fill(T::zero());

        let plan = self.plan();
        let (cin, cout) = (plan.cin(), plan.cout());
        let tile_k = plan.tiles().tile_k;
        let CanonicalDims { h: height, w: width, .. } = self.dims;

        for g in plan.groups_in_block(group_block) {
            for c in 0..cin {
                for h in 0..height {
                    for w in 0..width {
                        let dst_base = self.blocked.slab_offset(g, c, h, w, 0);
                        let src_base = self.strides.offset(g * cout, c, d, h, w);
                        for n in 0..cout {
                            slab[dst_base + n * tile_k] = src[src_base + n * self.strides.n];
                        }
                    }
                }
            }
        }
    }

    /// Copy every real element of slab `(group_block, d)` back to dense order
    fn gather_slab<T: Element>(&self, slab: &[T], dst: &mut [T], group_block: usize, d: usize) {
        let plan = self.plan();
        let (cin, cout) = (plan.cin(), plan.cout());
        let tile_k = plan.tiles().tile_k;
        let CanonicalDims { h: height, w: width, .. } = self.dims;

        for g in plan.groups_in_block(group_block) {
            for c in 0..cin {
                for h in 0..height {
                    for w in 0..width {
                        let blocked_base = self.blocked.slab_offset(g, c, h, w, 0);
                        let dense_base = self.strides.offset(g * cout, c, d, h, w);
                        for n in 0..cout {
                            dst[dense_base + n * self.strides.n] = slab[blocked_base + n * tile_k];
                        }
                    }
                }
            }
        }
    }
}

/// Relayout `src` into the blocked `dst` buffer.
///
/// `dst` must hold exactly the number of elements the plan requires (see
/// [`RelayoutGeometry::element_count`]). Returns the packing plan used.
pub fn relayout<T: Element>(
    src: &TensorView<'_, T>,
    target_format: BlockedFormat,
    group_count: usize,
    dst: &mut [T],
    config: &RelayoutConfig,
) -> ForgeResult<GroupPackingPlan> {
    let geometry = RelayoutGeometry::new(
        src.shape(),
        src.format(),
        T::DTYPE,
        target_format,
        group_count,
    )?;
    relayout_with_geometry(src, &geometry, dst, config)?;
    Ok(*geometry.plan())
}

/// Like [`relayout`], allocating the destination
pub fn relayout_to_vec<T: Element>(
    src: &TensorView<'_, T>,
    target_format: BlockedFormat,
    group_count: usize,
    config: &RelayoutConfig,
) -> ForgeResult<(Vec<T>, GroupPackingPlan)> {
    let geometry = RelayoutGeometry::new(
        src.shape(),
        src.format(),
        T::DTYPE,
        target_format,
        group_count,
    )?;
    let mut dst = vec![T::zero(); geometry.element_count()];
    relayout_with_geometry(src, &geometry, &mut dst, config)?;
    Ok((dst, *geometry.plan()))
}

/// Run an already-validated relayout. `geometry` must have been built from
/// `src`'s shape, format and dtype.
pub fn relayout_with_geometry<T: Element>(
    src: &TensorView<'_, T>,
    geometry: &RelayoutGeometry,
    dst: &mut [T],
    config: &RelayoutConfig,
) -> ForgeResult<()> {
    check_source_matches(src, geometry)?;
    check_len("destination", geometry.element_count(), dst.len())?;

    let plan = geometry.plan();
    tracing::debug!(
        src_format = %geometry.source_format,
        dst_format = %geometry.target_format,
        dtype = %T::DTYPE,
        groups = plan.group_count(),
        tile_multiplier = plan.tile_multiplier(),
        padded_cin = plan.padded_cin(),
        padded_cout = plan.padded_cout(),
        dst_elements = geometry.element_count(),
        "relayout planned"
    );

    let slab_len = geometry.blocked.slab_len();
    if slab_len == 0 {
        return Ok(());
    }

    let depth = geometry.dims.d;
    let data = src.data();
    if config.use_parallel(geometry.element_count()) {
        tracing::trace!("relayout: parallel over {} slabs", dst.len() / slab_len);
        dst.par_chunks_mut(slab_len)
            .enumerate()
            .for_each(|(slab_index, slab)| {
                geometry.scatter_slab(data, slab, slab_index / depth, slab_index % depth);
            });
    } else {
        tracing::trace!("relayout: serial over {} slabs", dst.len() / slab_len);
        for (slab_index, slab) in dst.chunks_mut(slab_len).enumerate() {
            geometry.scatter_slab(data, slab, slab_index / depth, slab_index % depth);
        }
    }

    Ok(())
}

/// Inverse of [`relayout`]: recover the dense tensor from a blocked buffer.
///
/// `shape` and `source_format` describe the dense tensor to rebuild. Only
/// positions that correspond to real elements are read; padding is ignored.
pub fn restore_from_blocked<T: Element>(
    blocked: &[T],
    shape: &[usize],
    source_format: SourceFormat,
    target_format: BlockedFormat,
    group_count: usize,
) -> ForgeResult<Vec<T>> {
    let geometry =
        RelayoutGeometry::new(shape, source_format, T::DTYPE, target_format, group_count)?;
    check_len("blocked", geometry.element_count(), blocked.len())?;

    let mut dense = vec![T::zero(); geometry.source_element_count];
    let slab_len = geometry.blocked.slab_len();
    if slab_len == 0 {
        return Ok(dense);
    }

    let depth = geometry.dims.d;
    for (slab_index, slab) in blocked.chunks(slab_len).enumerate() {
        geometry.gather_slab(slab, &mut dense, slab_index / depth, slab_index % depth);
    }
    Ok(dense)
}

fn check_source_matches<T: Element>(
    src: &TensorView<'_, T>,
    geometry: &RelayoutGeometry,
) -> ForgeResult<()> {
    if T::DTYPE != geometry.dtype {
        return Err(TileForgeError::DTypeMismatch {
            expected: geometry.dtype,
            actual: T::DTYPE,
        });
    }
    if src.format() != geometry.source_format
        || src.format().canonical_dims(src.shape())? != geometry.dims
    {
        return Err(crate::internal_error!(
            "geometry planned for {} {:?} applied to {} {:?}",
            geometry.source_format,
            geometry.dims.shape_in(geometry.source_format),
            src.format(),
            src.shape()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    fn iota_f32(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 + 1.0).collect()
    }

    #[test]
    fn test_minimal_tile_fully_populated() {
        // cin = tile_k, cout = tile_n, one group, 1x1 kernel
        let src = iota_f32(16 * 16);
        let view = TensorView::new(&src, &[16, 16, 1, 1], SourceFormat::Nchw).unwrap();
        let (dst, plan) =
            relayout_to_vec(&view, BlockedFormat::FractalZ, 1, &RelayoutConfig::serial()).unwrap();

        assert_eq!(plan.tile_multiplier(), 1);
        assert_eq!(dst.len(), 256);
        assert!(dst.iter().all(|&v| v != 0.0));
        // dst[n * 16 + c] = src[n * 16 + c] for NCHW with 1x1 spatial
        assert_eq!(dst, src);
    }

    #[test]
    fn test_int8_rgb_input_is_padded() {
        // cin = 3 on a 32-wide tile
        let src: Vec<i8> = (0..16 * 3).map(|i| (i % 100 + 1) as i8).collect();
        let view = TensorView::new(&src, &[16, 3, 1, 1], SourceFormat::Nchw).unwrap();
        let (dst, plan) =
            relayout_to_vec(&view, BlockedFormat::FractalZ, 1, &RelayoutConfig::serial()).unwrap();

        assert_eq!(plan.padded_cin(), 32);
        assert_eq!(dst.len(), 16 * 32);
        for n in 0..16 {
            for c in 0..32 {
                let expected = if c < 3 { src[n * 3 + c] } else { 0 };
                assert_eq!(dst[n * 32 + c], expected, "n={} c={}", n, c);
            }
        }
    }

    #[test]
    fn test_zero_channels_write_nothing() {
        let src: Vec<i8> = Vec::new();
        let view = TensorView::new(&src, &[16, 0, 1, 1], SourceFormat::Nchw).unwrap();
        let mut dst = vec![7i8; 32];
        let err = relayout(
            &view,
            BlockedFormat::FractalZ,
            1,
            &mut dst,
            &RelayoutConfig::default(),
        )
        .unwrap_err();

        assert!(matches!(err, TileForgeError::InvalidArgument(_)));
        assert!(dst.iter().all(|&v| v == 7));
    }

    #[test]
    fn test_wrong_destination_length_writes_nothing() {
        let src = iota_f32(16 * 16);
        let view = TensorView::new(&src, &[16, 16, 1, 1], SourceFormat::Nchw).unwrap();
        let mut dst = vec![-1.0f32; 255];
        let err = relayout(
            &view,
            BlockedFormat::FractalZ,
            1,
            &mut dst,
            &RelayoutConfig::default(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            TileForgeError::BufferSizeMismatch { expected: 256, actual: 255, .. }
        ));
        assert!(dst.iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_non_dividing_groups_rejected() {
        let src = iota_f32(6 * 2 * 3 * 3);
        let view = TensorView::new(&src, &[6, 2, 3, 3], SourceFormat::Nchw).unwrap();
        let err = relayout_to_vec(&view, BlockedFormat::FractalZ, 4, &RelayoutConfig::serial())
            .unwrap_err();
        assert!(matches!(err, TileForgeError::InvalidArgument(_)));
    }

    #[test]
    fn test_3d_source_needs_3d_target() {
        let src = iota_f32(16 * 16 * 2);
        let view = TensorView::new(&src, &[16, 16, 2, 1, 1], SourceFormat::Ncdhw).unwrap();
        let err = relayout_to_vec(&view, BlockedFormat::FractalZ, 1, &RelayoutConfig::serial())
            .unwrap_err();
        assert!(matches!(err, TileForgeError::UnsupportedLayout(_)));
    }

    #[test]
    fn test_depthwise_groups_share_a_tile() {
        // Two depthwise groups, one channel each, 1x1 kernel
        let src = vec![f16::from_f32(1.5), f16::from_f32(-2.0)];
        let view = TensorView::new(&src, &[2, 1, 1, 1], SourceFormat::Nchw).unwrap();
        let (dst, plan) =
            relayout_to_vec(&view, BlockedFormat::FractalZ, 2, &RelayoutConfig::serial()).unwrap();

        assert_eq!(plan.tile_multiplier(), 2);
        assert_eq!(plan.adjusted_group_count(), 1);
        assert_eq!(dst.len(), 16 * 16);
        assert_eq!(dst[0], f16::from_f32(1.5));
        assert_eq!(dst[16 + 1], f16::from_f32(-2.0));
        let non_zero = dst.iter().filter(|v| v.to_bits() != 0).count();
        assert_eq!(non_zero, 2);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let shape = [8, 3, 2, 3, 3];
        let src = iota_f32(shape.iter().product());
        let view = TensorView::new(&src, &shape, SourceFormat::Ndhwc).unwrap();

        let (serial, _) =
            relayout_to_vec(&view, BlockedFormat::FractalZ3d, 4, &RelayoutConfig::serial())
                .unwrap();
        let parallel_config = RelayoutConfig::new().with_min_parallel_elements(0);
        let (parallel, _) =
            relayout_to_vec(&view, BlockedFormat::FractalZ3d, 4, &parallel_config).unwrap();

        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_restore_round_trip() {
        let shape = [3, 3, 5, 4];
        let src = iota_f32(shape.iter().product());
        let view = TensorView::new(&src, &shape, SourceFormat::Hwcn).unwrap();
        let (blocked, _) =
            relayout_to_vec(&view, BlockedFormat::FractalZ, 2, &RelayoutConfig::default())
                .unwrap();

        let restored =
            restore_from_blocked(&blocked, &shape, SourceFormat::Hwcn, BlockedFormat::FractalZ, 2)
                .unwrap();
        assert_eq!(restored, src);
    }

    #[test]
    fn test_geometry_mismatch_is_internal() {
        let src = iota_f32(16 * 16);
        let view = TensorView::new(&src, &[16, 16, 1, 1], SourceFormat::Nchw).unwrap();
        let other = RelayoutGeometry::new(
            &[16, 1, 1, 16],
            SourceFormat::Nhwc,
            DType::Float32,
            BlockedFormat::FractalZ,
            1,
        )
        .unwrap();
        let mut dst = vec![0.0f32; other.element_count()];
        let err =
            relayout_with_geometry(&view, &other, &mut dst, &RelayoutConfig::serial()).unwrap_err();
        assert!(err.is_internal_error());
    }

    #[test]
    fn test_huge_empty_tensor_rejected_without_panic() {
        // Zero height keeps the source empty; cin alone overflows the plan
        let src: Vec<f16> = Vec::new();
        let view = TensorView::new(&src, &[1, (1 << 62) + 1, 0, 1], SourceFormat::Nchw).unwrap();
        let mut dst: Vec<f16> = Vec::new();
        let err = relayout(
            &view,
            BlockedFormat::FractalZ,
            1,
            &mut dst,
            &RelayoutConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TileForgeError::InvalidArgument(_)));

        // Channel counts plan fine but one slab would not fit usize
        let view = TensorView::new(&src, &[16, 16, 0, 1 << 29, 1 << 29], SourceFormat::Ncdhw)
            .unwrap();
        let err = relayout_to_vec(&view, BlockedFormat::FractalZ3d, 1, &RelayoutConfig::serial())
            .unwrap_err();
        assert!(matches!(err, TileForgeError::InvalidArgument(_)));
    }

    #[test]
    fn test_restore_rejects_overflowing_shape() {
        let err = restore_from_blocked::<f32>(
            &[],
            &[1 << 33, 1 << 33, 1, 1],
            SourceFormat::Nchw,
            BlockedFormat::FractalZ,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, TileForgeError::InvalidArgument(_)));
    }
}
