//! Host tensor descriptions consumed by the kernels.

pub mod dtype;
pub mod layout;
pub mod view;

pub use dtype::{DType, Element};
pub use layout::{
    checked_product, element_count, Axis, BlockedFormat, CanonicalDims, CanonicalStrides,
    SourceFormat, MIN_RANK,
};
pub use view::{RawTensor, TensorView};
