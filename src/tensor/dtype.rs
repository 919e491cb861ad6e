//! Element types understood at the kernel boundary.

use std::fmt;

use half::f16;

/// Element type tag carried by host tensors.
///
/// The relayout kernels only accept `Int8`, `Float16` and `Float32`; the
/// other tags exist so the host can hand over whatever it has and get a
/// typed `UnsupportedDataType` back instead of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Int8,
    UInt8,
    Int32,
    Float16,
    BFloat16,
    Float32,
    Float64,
}

impl DType {
    /// Size of one element in bytes
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::Int8 | DType::UInt8 => 1,
            DType::Float16 | DType::BFloat16 => 2,
            DType::Int32 | DType::Float32 => 4,
            DType::Float64 => 8,
        }
    }

    /// Whether the blocked relayout has a kernel for this type
    pub fn is_relayout_supported(&self) -> bool {
        matches!(self, DType::Int8 | DType::Float16 | DType::Float32)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DType::Int8 => "int8",
            DType::UInt8 => "uint8",
            DType::Int32 => "int32",
            DType::Float16 => "float16",
            DType::BFloat16 => "bfloat16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Plain-old-data element the relayout executor can move bit-for-bit.
///
/// Implemented for exactly the three supported types, so a typed call
/// with anything else does not compile.
pub trait Element: bytemuck::Pod + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;

    #[inline]
    fn zero() -> Self {
        <Self as bytemuck::Zeroable>::zeroed()
    }
}

impl Element for i8 {
    const DTYPE: DType = DType::Int8;
}

impl Element for f16 {
    const DTYPE: DType = DType::Float16;
}

impl Element for f32 {
    const DTYPE: DType = DType::Float32;
}
