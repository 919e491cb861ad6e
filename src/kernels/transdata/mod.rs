//! TransData: dense convolution weights to hardware-tiled blocked layouts
//!
//! - `plan`: group packing planner and blocked-layout addressing
//! - `relayout`: typed executor (serial and rayon) plus the inverse mapping
//! - `kernel`: byte-level entry point with dtype dispatch
//! - `config`: executor configuration

pub mod config;
pub mod kernel;
pub mod plan;
pub mod relayout;

pub use config::RelayoutConfig;
pub use kernel::{TransDataAttrs, TransDataKernel};
pub use plan::{BlockedShape, GroupPackingPlan, TileUnits};
pub use relayout::{
    relayout, relayout_to_vec, relayout_with_geometry, restore_from_blocked, RelayoutGeometry,
};
