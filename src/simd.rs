//! Inner-product distance kernels.
//!
//! Every kernel returns `1 - dot(a, b)`, so smaller means more similar. Two
//! lane layouts are provided on each SIMD target:
//!
//! * [`inner_product_distance_4`] keeps a single 4-lane accumulator.
//! * [`inner_product_distance_8`] processes two groups of four elements per
//!   iteration in independent accumulators and folds them at the end.
//!
//! Both variants handle lengths that are not a multiple of their lane width
//! with a scalar tail, so any pair of equal-length slices is accepted. On
//! targets without a supported instruction set the scalar kernel is used.
//! The two variants sum the same terms in a different order; results agree
//! up to floating-point reassociation.

/// Lane width of one SIMD register of `f32` on the current target.
#[cfg(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))]
pub const LANES: usize = 4;

/// Lane width of one SIMD register of `f32` on the current target.
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
pub const LANES: usize = 1;

/// Inner-product distance using the widest kernel suited to `a.len()`.
///
/// Vectors long enough to fill two registers use the dual-accumulator
/// kernel; shorter ones use the single-accumulator kernel.
#[inline]
pub fn inner_product_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() >= 2 * LANES {
        inner_product_distance_8(a, b)
    } else {
        inner_product_distance_4(a, b)
    }
}

/// Inner-product distance with one 4-lane accumulator.
#[inline]
pub fn inner_product_distance_4(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("sse") {
            // SAFETY: We just checked that SSE is available on this CPU.
            return 1.0 - unsafe { x86::dot_x4(a, b) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    let dot = unsafe { neon::dot_x4(a, b) };

    #[cfg(not(target_arch = "aarch64"))]
    let dot = dot_scalar(a, b);

    1.0 - dot
}

/// Inner-product distance with two 4-lane accumulators per iteration.
#[inline]
pub fn inner_product_distance_8(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("sse") {
            // SAFETY: We just checked that SSE is available on this CPU.
            return 1.0 - unsafe { x86::dot_x8(a, b) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    let dot = unsafe { neon::dot_x8(a, b) };

    #[cfg(not(target_arch = "aarch64"))]
    let dot = dot_scalar(a, b);

    1.0 - dot
}

/// Portable inner-product distance.
#[inline]
pub fn inner_product_distance_scalar(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    1.0 - dot_scalar(a, b)
}

#[inline]
fn dot_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use std::arch::is_x86_feature_detected;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86 {
    #[cfg(target_arch = "x86")]
    use core::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use core::arch::x86_64::*;

    #[inline]
    #[target_feature(enable = "sse")]
    unsafe fn horizontal_sum(v: __m128) -> f32 {
        let mut buf = [0f32; 4];
        _mm_storeu_ps(buf.as_mut_ptr(), v);
        buf[0] + buf[1] + buf[2] + buf[3]
    }

    #[inline]
    #[target_feature(enable = "sse")]
    pub unsafe fn dot_x4(a: &[f32], b: &[f32]) -> f32 {
        let len = a.len();
        let chunks = len / 4;
        let a_ptr = a.as_ptr();
        let b_ptr = b.as_ptr();
        let mut acc = _mm_setzero_ps();
        let mut i = 0usize;

        while i < chunks * 4 {
            let va = _mm_loadu_ps(a_ptr.add(i));
            let vb = _mm_loadu_ps(b_ptr.add(i));
            acc = _mm_add_ps(acc, _mm_mul_ps(va, vb));
            i += 4;
        }

        let mut sum = horizontal_sum(acc);
        while i < len {
            sum += *a_ptr.add(i) * *b_ptr.add(i);
            i += 1;
        }
        sum
    }

    #[inline]
    #[target_feature(enable = "sse")]
    pub unsafe fn dot_x8(a: &[f32], b: &[f32]) -> f32 {
        let len = a.len();
        let chunks = len / 8;
        let a_ptr = a.as_ptr();
        let b_ptr = b.as_ptr();
        let mut acc_low = _mm_setzero_ps();
        let mut acc_high = _mm_setzero_ps();
        let mut i = 0usize;

        while i < chunks * 8 {
            let va_low = _mm_loadu_ps(a_ptr.add(i));
            let vb_low = _mm_loadu_ps(b_ptr.add(i));
            let va_high = _mm_loadu_ps(a_ptr.add(i + 4));
            let vb_high = _mm_loadu_ps(b_ptr.add(i + 4));
            acc_low = _mm_add_ps(acc_low, _mm_mul_ps(va_low, vb_low));
            acc_high = _mm_add_ps(acc_high, _mm_mul_ps(va_high, vb_high));
            i += 8;
        }

        let mut sum = horizontal_sum(_mm_add_ps(acc_low, acc_high));
        while i < len {
            sum += *a_ptr.add(i) * *b_ptr.add(i);
            i += 1;
        }
        sum
    }
}

#[cfg(target_arch = "aarch64")]
mod neon {
    use core::arch::aarch64::*;

    #[inline]
    #[target_feature(enable = "neon")]
    pub unsafe fn dot_x4(a: &[f32], b: &[f32]) -> f32 {
        let len = a.len();
        let chunks = len / 4;
        let a_ptr = a.as_ptr();
        let b_ptr = b.as_ptr();
        let mut acc = vdupq_n_f32(0.0);
        let mut i = 0usize;

        while i < chunks * 4 {
            let va = vld1q_f32(a_ptr.add(i));
            let vb = vld1q_f32(b_ptr.add(i));
            acc = vmlaq_f32(acc, va, vb);
            i += 4;
        }

        let mut sum = vaddvq_f32(acc);
        while i < len {
            sum += *a_ptr.add(i) * *b_ptr.add(i);
            i += 1;
        }
        sum
    }

    #[inline]
    #[target_feature(enable = "neon")]
    pub unsafe fn dot_x8(a: &[f32], b: &[f32]) -> f32 {
        let len = a.len();
        let chunks = len / 8;
        let a_ptr = a.as_ptr();
        let b_ptr = b.as_ptr();
        let mut acc_low = vdupq_n_f32(0.0);
        let mut acc_high = vdupq_n_f32(0.0);
        let mut i = 0usize;

        while i < chunks * 8 {
            let va_low = vld1q_f32(a_ptr.add(i));
            let vb_low = vld1q_f32(b_ptr.add(i));
            let va_high = vld1q_f32(a_ptr.add(i + 4));
            let vb_high = vld1q_f32(b_ptr.add(i + 4));
            acc_low = vmlaq_f32(acc_low, va_low, vb_low);
            acc_high = vmlaq_f32(acc_high, va_high, vb_high);
            i += 8;
        }

        let mut sum = vaddvq_f32(vaddq_f32(acc_low, acc_high));
        while i < len {
            sum += *a_ptr.add(i) * *b_ptr.add(i);
            i += 1;
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_self_distance_of_unit_vector_is_zero() {
        let v = [0.5f32, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0];
        assert!(inner_product_distance_4(&v, &v).abs() < 1e-6);
        assert!(inner_product_distance_8(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn test_self_distance_is_one_minus_squared_norm() {
        let v: Vec<f32> = (0..16).map(|i| i as f32 * 0.25 - 2.0).collect();
        let norm_sqr: f32 = v.iter().map(|x| x * x).sum();
        let expected = 1.0 - norm_sqr;
        assert!((inner_product_distance(&v, &v) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_tail_lengths_match_scalar() {
        for len in [1usize, 3, 5, 7, 9, 13] {
            let a: Vec<f32> = (0..len).map(|i| (i as f32).sin()).collect();
            let b: Vec<f32> = (0..len).map(|i| (i as f32).cos()).collect();
            let scalar = inner_product_distance_scalar(&a, &b);
            assert!((inner_product_distance_4(&a, &b) - scalar).abs() < 1e-5);
            assert!((inner_product_distance_8(&a, &b) - scalar).abs() < 1e-5);
        }
    }

    #[test]
    fn test_empty_vectors_have_unit_distance() {
        assert_eq!(inner_product_distance(&[], &[]), 1.0);
    }

    proptest! {
        #[test]
        fn prop_four_and_eight_lane_kernels_agree(
            (a, b) in (1usize..16).prop_flat_map(|blocks| (
                proptest::collection::vec(-1.0f32..1.0, blocks * 8),
                proptest::collection::vec(-1.0f32..1.0, blocks * 8),
            ))
        ) {
            let four = inner_product_distance_4(&a, &b);
            let eight = inner_product_distance_8(&a, &b);
            prop_assert!((four - eight).abs() < 1e-4, "{four} vs {eight}");
        }
    }
}
