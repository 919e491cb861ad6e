//! Borrowed views over host tensor storage.
//!
//! [`TensorView`] is the typed view the executor works on. [`RawTensor`] is
//! what the host dispatch layer hands over: bytes plus a dtype tag. Neither
//! owns its buffer.

use std::borrow::Cow;

use crate::error::{check_len, ForgeResult, TileForgeError};
use crate::tensor::dtype::{DType, Element};
use crate::tensor::layout::{element_count, SourceFormat};

/// Typed, non-owning view of a dense tensor
#[derive(Debug, Clone)]
pub struct TensorView<'a, T: Element> {
    data: &'a [T],
    shape: Vec<usize>,
    format: SourceFormat,
}

impl<'a, T: Element> TensorView<'a, T> {
    /// Wrap `data` as a tensor of `shape` stored in `format` order.
    ///
    /// Only the element count is checked here; rank and layout agreement
    /// are checked by the kernel that consumes the view. A shape whose
    /// element count overflows `usize` is `InvalidArgument`.
    pub fn new(data: &'a [T], shape: &[usize], format: SourceFormat) -> ForgeResult<Self> {
        check_len("source", element_count(shape)?, data.len())?;
        Ok(Self {
            data,
            shape: shape.to_vec(),
            format,
        })
    }

    pub fn data(&self) -> &'a [T] {
        self.data
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn element_count(&self) -> usize {
        self.data.len()
    }
}

/// Untyped tensor as received from the host: shape, layout, dtype, bytes
#[derive(Debug, Clone)]
pub struct RawTensor<'a> {
    bytes: &'a [u8],
    shape: Vec<usize>,
    format: SourceFormat,
    dtype: DType,
}

impl<'a> RawTensor<'a> {
    /// Byte length must equal element count times element size.
    pub fn new(
        bytes: &'a [u8],
        shape: &[usize],
        format: SourceFormat,
        dtype: DType,
    ) -> ForgeResult<Self> {
        let byte_len = element_count(shape)?
            .checked_mul(dtype.size_in_bytes())
            .ok_or_else(|| crate::invalid_arg!("{} tensor {:?} overflows usize bytes", dtype, shape))?;
        check_len("source", byte_len, bytes.len())?;
        Ok(Self {
            bytes,
            shape: shape.to_vec(),
            format,
            dtype,
        })
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Reinterpret the bytes as `T`.
    ///
    /// Borrows when the buffer is suitably aligned, otherwise copies into
    /// an owned buffer.
    pub fn typed<T: Element>(&self) -> ForgeResult<Cow<'a, [T]>> {
        if T::DTYPE != self.dtype {
            return Err(TileForgeError::DTypeMismatch {
                expected: T::DTYPE,
                actual: self.dtype,
            });
        }
        match bytemuck::try_cast_slice::<u8, T>(self.bytes) {
            Ok(slice) => Ok(Cow::Borrowed(slice)),
            Err(bytemuck::PodCastError::TargetAlignmentGreaterAndInputNotAligned) => {
                Ok(Cow::Owned(bytemuck::pod_collect_to_vec::<u8, T>(self.bytes)))
            }
            Err(e) => Err(crate::internal_error!(
                "cannot view {} bytes as {}: {:?}",
                self.bytes.len(),
                self.dtype,
                e
            )),
        }
    }

    /// Typed view over this tensor's storage
    pub fn view<'b, T: Element>(&self, storage: &'b Cow<'a, [T]>) -> ForgeResult<TensorView<'b, T>> {
        TensorView::new(storage.as_ref(), &self.shape, self.format)
    }
}
