//! Shared fixtures for relayout tests
//!
//! `reference_relayout` walks every source coordinate in the order the
//! addressing formula is written down and computes both offsets from first
//! principles. It shares nothing with the executor except the planner, so
//! agreement between the two is meaningful.

#![allow(dead_code)]

use half::f16;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tileforge::kernels::transdata::{GroupPackingPlan, TileUnits};
use tileforge::{BlockedFormat, Element, SourceFormat};

pub use serial_test::serial;

/// Element types with a deterministic non-zero test pattern
pub trait TestElement: Element {
    /// Distinct, non-zero value for position `i` (wraps for large tensors)
    fn from_index(i: usize) -> Self;

    fn random(rng: &mut StdRng) -> Self;

    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}

impl TestElement for i8 {
    fn from_index(i: usize) -> Self {
        (i % 127 + 1) as i8
    }

    fn random(rng: &mut StdRng) -> Self {
        rng.gen()
    }
}

impl TestElement for f16 {
    fn from_index(i: usize) -> Self {
        // Integers up to 2048 are exact in f16
        f16::from_f32((i % 2047 + 1) as f32)
    }

    fn random(rng: &mut StdRng) -> Self {
        f16::from_f32(rng.gen_range(-4.0f32..4.0))
    }
}

impl TestElement for f32 {
    fn from_index(i: usize) -> Self {
        i as f32 + 1.0
    }

    fn random(rng: &mut StdRng) -> Self {
        rng.gen_range(-1.0e3f32..1.0e3)
    }
}

/// `len` values, all distinct (within wrap) and non-zero
pub fn iota<T: TestElement>(len: usize) -> Vec<T> {
    (0..len).map(T::from_index).collect()
}

pub fn random_tensor<T: TestElement>(len: usize, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| T::random(&mut rng)).collect()
}

/// Canonical `(n, c, d, h, w)` read straight off the layout tag
pub fn canonical(shape: &[usize], format: SourceFormat) -> [usize; 5] {
    match format {
        SourceFormat::Nchw => [shape[0], shape[1], 1, shape[2], shape[3]],
        SourceFormat::Nhwc => [shape[0], shape[3], 1, shape[1], shape[2]],
        SourceFormat::Hwcn => [shape[3], shape[2], 1, shape[0], shape[1]],
        SourceFormat::Ncdhw => [shape[0], shape[1], shape[2], shape[3], shape[4]],
        SourceFormat::Ndhwc => [shape[0], shape[4], shape[1], shape[2], shape[3]],
        SourceFormat::Dhwcn => [shape[4], shape[3], shape[0], shape[1], shape[2]],
    }
}

/// Dense shape in `format` order for canonical sizes
pub fn shape_for(format: SourceFormat, n: usize, c: usize, d: usize, h: usize, w: usize) -> Vec<usize> {
    match format {
        SourceFormat::Nchw => vec![n, c, h, w],
        SourceFormat::Nhwc => vec![n, h, w, c],
        SourceFormat::Hwcn => vec![h, w, c, n],
        SourceFormat::Ncdhw => vec![n, c, d, h, w],
        SourceFormat::Ndhwc => vec![n, d, h, w, c],
        SourceFormat::Dhwcn => vec![d, h, w, c, n],
    }
}

/// Dense offset of canonical coordinate `(n, c, d, h, w)`
pub fn source_offset(
    format: SourceFormat,
    dims: [usize; 5],
    n: usize,
    c: usize,
    d: usize,
    h: usize,
    w: usize,
) -> usize {
    let [bn, bc, bd, bh, bw] = dims;
    match format {
        SourceFormat::Nchw => ((n * bc + c) * bh + h) * bw + w,
        SourceFormat::Nhwc => ((n * bh + h) * bw + w) * bc + c,
        SourceFormat::Hwcn => ((h * bw + w) * bc + c) * bn + n,
        SourceFormat::Ncdhw => (((n * bc + c) * bd + d) * bh + h) * bw + w,
        SourceFormat::Ndhwc => (((n * bd + d) * bh + h) * bw + w) * bc + c,
        SourceFormat::Dhwcn => (((d * bh + h) * bw + w) * bc + c) * bn + n,
    }
}

/// Naive relayout: one loop nest, one formula, no slabs
pub fn reference_relayout<T: Element>(
    src: &[T],
    shape: &[usize],
    format: SourceFormat,
    groups: usize,
) -> (Vec<T>, GroupPackingPlan) {
    let dims = canonical(shape, format);
    let [n_total, cin, depth, height, width] = dims;
    let cout = n_total / groups;
    let plan = GroupPackingPlan::new(cin, cout, groups, TileUnits::for_dtype(T::DTYPE))
        .expect("reference plan");

    let tk = plan.tiles().tile_k;
    let tm = plan.tile_multiplier();
    let bcc = plan.block_count_cin();
    let pco = plan.padded_cout();
    let agc = plan.adjusted_group_count();

    let mut dst = vec![T::zero(); agc * depth * bcc * height * width * pco * tk];
    for g in 0..groups {
        for d in 0..depth {
            for c in 0..cin {
                for h in 0..height {
                    for w in 0..width {
                        for n in 0..cout {
                            let e = g % tm;
                            let dst_ci = e * cin + c;
                            let dst_co = e * cout + n;
                            let gb = g / tm;
                            let blk = dst_ci / tk;
                            let row = dst_ci % tk;
                            let offset = (((((gb * depth + d) * bcc + blk) * height + h) * width
                                + w)
                                * pco
                                + dst_co)
                                * tk
                                + row;
                            let src_n = g * cout + n;
                            dst[offset] = src[source_offset(format, dims, src_n, c, d, h, w)];
                        }
                    }
                }
            }
        }
    }
    (dst, plan)
}

/// 3D layouts take the 3D blocked target
pub fn target_for(format: SourceFormat) -> BlockedFormat {
    if matches!(
        format,
        SourceFormat::Ncdhw | SourceFormat::Ndhwc | SourceFormat::Dhwcn
    ) {
        BlockedFormat::FractalZ3d
    } else {
        BlockedFormat::FractalZ
    }
}

pub fn count_non_zero<T: TestElement>(values: &[T]) -> usize {
    values.iter().filter(|v| !v.is_zero()).count()
}
