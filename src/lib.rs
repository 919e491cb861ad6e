//! tileforge - blocked weight relayout kernels for AI accelerators
//!
//! Matrix and convolution engines consume weights in a hardware-tiled
//! "fractal" layout. This crate converts dense convolution weights
//! (NCHW, NHWC, HWCN and their 3D variants) into that layout, co-packing
//! several convolution groups into one tile when per-group channel counts
//! are small.

pub mod error;
pub mod kernels;
pub mod logging;
pub mod tensor;

pub use error::{ErrorCategory, ForgeResult, TileForgeError};
pub use kernels::transdata::{
    relayout, relayout_to_vec, restore_from_blocked, GroupPackingPlan, RelayoutConfig,
    TransDataAttrs, TransDataKernel,
};
pub use logging::{init_logging_default, init_with_config, LoggingConfig};
pub use tensor::{BlockedFormat, DType, Element, RawTensor, SourceFormat, TensorView};
