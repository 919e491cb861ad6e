//! TransData kernel: the byte-level entry point used by host dispatch
//!
//! The host hands over a [`RawTensor`] (shape, layout, dtype, bytes), the
//! kernel attributes, and a pre-allocated output buffer sized with
//! [`TransDataKernel::output_byte_size`]. The kernel dispatches on dtype to
//! the generic executor.
//!
//! ## Usage
//!
//! ```rust
//! use tileforge::kernels::transdata::{TransDataAttrs, TransDataKernel};
//! use tileforge::tensor::{DType, RawTensor, SourceFormat};
//!
//! let weights = vec![0u8; 32 * 8 * 3 * 3 * 2];
//! let input = RawTensor::new(&weights, &[32, 8, 3, 3], SourceFormat::Nchw, DType::Float16)?;
//!
//! let kernel = TransDataKernel::new(&TransDataAttrs::new("FRACTAL_Z").with_groups(4))?;
//! let mut output = vec![0u8; kernel.output_byte_size(input.shape(), input.format(), input.dtype())?];
//! kernel.compute(&input, &mut output)?;
//! # Ok::<(), tileforge::TileForgeError>(())
//! ```

use half::f16;

use crate::error::{check_len, ForgeResult, TileForgeError};
use crate::kernels::transdata::config::RelayoutConfig;
use crate::kernels::transdata::plan::GroupPackingPlan;
use crate::kernels::transdata::relayout::{relayout_with_geometry, RelayoutGeometry};
use crate::tensor::{BlockedFormat, DType, Element, RawTensor, SourceFormat};

/// Kernel attributes as provided by the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransDataAttrs {
    /// Destination layout tag (`FRACTAL_Z` or `FRACTAL_Z_3D`)
    pub dst_format: String,
    /// Convolution group count; absent means 1
    pub groups: Option<i64>,
}

impl TransDataAttrs {
    pub fn new(dst_format: impl Into<String>) -> Self {
        Self {
            dst_format: dst_format.into(),
            groups: None,
        }
    }

    pub fn with_groups(mut self, groups: i64) -> Self {
        self.groups = Some(groups);
        self
    }
}

/// Grouped dense-to-blocked weight relayout
#[derive(Debug, Clone)]
pub struct TransDataKernel {
    dst_format: BlockedFormat,
    groups: usize,
    config: RelayoutConfig,
}

impl TransDataKernel {
    /// Build a kernel from graph attributes.
    ///
    /// # Errors
    ///
    /// - `UnsupportedLayout` - destination tag is not a blocked variant
    /// - `InvalidArgument` - group count below 1
    pub fn new(attrs: &TransDataAttrs) -> ForgeResult<Self> {
        let dst_format: BlockedFormat = attrs.dst_format.parse()?;
        let groups = match attrs.groups {
            None => 1,
            Some(g) if g >= 1 => usize::try_from(g)
                .map_err(|_| crate::invalid_arg!("group count {} does not fit usize", g))?,
            Some(g) => return Err(crate::invalid_arg!("group count must be >= 1, got {}", g)),
        };

        Ok(Self {
            dst_format,
            groups,
            config: RelayoutConfig::from_env(),
        })
    }

    pub fn with_config(mut self, config: RelayoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dst_format(&self) -> BlockedFormat {
        self.dst_format
    }

    pub fn groups(&self) -> usize {
        self.groups
    }

    pub fn config(&self) -> &RelayoutConfig {
        &self.config
    }

    /// Validate an input description and plan it without touching data
    pub fn geometry(
        &self,
        shape: &[usize],
        format: SourceFormat,
        dtype: DType,
    ) -> ForgeResult<RelayoutGeometry> {
        RelayoutGeometry::new(shape, format, dtype, self.dst_format, self.groups)
    }

    pub fn plan(
        &self,
        shape: &[usize],
        format: SourceFormat,
        dtype: DType,
    ) -> ForgeResult<GroupPackingPlan> {
        Ok(*self.geometry(shape, format, dtype)?.plan())
    }

    /// Physical output dims, outermost first (see `BlockedShape::dims`)
    pub fn output_shape(
        &self,
        shape: &[usize],
        format: SourceFormat,
        dtype: DType,
    ) -> ForgeResult<[usize; 7]> {
        Ok(self.geometry(shape, format, dtype)?.blocked().dims())
    }

    /// Exact output buffer size in bytes
    pub fn output_byte_size(
        &self,
        shape: &[usize],
        format: SourceFormat,
        dtype: DType,
    ) -> ForgeResult<usize> {
        self.geometry(shape, format, dtype)?.blocked().byte_size(dtype)
    }

    /// Relayout `input` into `output`.
    ///
    /// `output` is left untouched on every error path.
    pub fn compute(&self, input: &RawTensor<'_>, output: &mut [u8]) -> ForgeResult<GroupPackingPlan> {
        match input.dtype() {
            DType::Int8 => self.compute_typed::<i8>(input, output),
            DType::Float16 => self.compute_typed::<f16>(input, output),
            DType::Float32 => self.compute_typed::<f32>(input, output),
            other => Err(TileForgeError::UnsupportedDataType(other)),
        }
    }

    fn compute_typed<T: Element>(
        &self,
        input: &RawTensor<'_>,
        output: &mut [u8],
    ) -> ForgeResult<GroupPackingPlan> {
        let geometry = self.geometry(input.shape(), input.format(), T::DTYPE)?;
        check_len("destination", geometry.blocked().byte_size(T::DTYPE)?, output.len())?;

        let storage = input.typed::<T>()?;
        let view = input.view(&storage)?;

        match bytemuck::try_cast_slice_mut::<u8, T>(output) {
            Ok(dst) => relayout_with_geometry(&view, &geometry, dst, &self.config)?,
            Err(_) => {
                // Misaligned output: stage through an owned buffer
                tracing::trace!("transdata: staging {} output bytes", output.len());
                let mut staged = vec![T::zero(); geometry.element_count()];
                relayout_with_geometry(&view, &geometry, &mut staged, &self.config)?;
                output.copy_from_slice(bytemuck::cast_slice(&staged));
            }
        }

        Ok(*geometry.plan())
    }
}
