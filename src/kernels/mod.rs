//! Kernel implementations
//!
//! This module organizes computational kernels by operation type:
//! - `transdata`: grouped relayout of convolution weights into blocked layouts

pub mod transdata;
