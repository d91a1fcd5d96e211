//! Euclidean helpers used by codebook training and dataset pre-processing.

/// Compute the squared L2 norm of a vector.
#[inline]
pub fn l2_norm_sqr(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum()
}

/// Compute the squared Euclidean distance between two vectors.
///
/// Uses the same two-register layout as the inner-product kernels in
/// [`crate::simd`], with a scalar tail for lengths that are not a multiple of 8.
#[inline]
pub fn l2_distance_sqr(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("sse") {
            // SAFETY: SSE support was detected at runtime.
            return unsafe { x86::sq_diff_x8(a, b) };
        }
    }

    // SAFETY: NEON is part of the aarch64 baseline.
    #[cfg(target_arch = "aarch64")]
    let sum = unsafe { neon::sq_diff_x8(a, b) };

    #[cfg(not(target_arch = "aarch64"))]
    let sum = sq_diff_tail(a, b, 0);

    sum
}

/// Scale a vector to unit length in place and return its original norm.
///
/// Vectors whose norm is below `f32::EPSILON` are left untouched and
/// report a norm of zero.
#[inline]
pub fn normalize(v: &mut [f32]) -> f32 {
    let norm = l2_norm_sqr(v).sqrt();
    if norm <= f32::EPSILON {
        return 0.0;
    }
    let inv = 1.0 / norm;
    for value in v.iter_mut() {
        *value *= inv;
    }
    norm
}

/// Sum of squared differences from index `from` to the end.
#[inline]
fn sq_diff_tail(a: &[f32], b: &[f32], from: usize) -> f32 {
    a[from..]
        .iter()
        .zip(&b[from..])
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use std::arch::is_x86_feature_detected;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86 {
    #[cfg(target_arch = "x86")]
    use core::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use core::arch::x86_64::*;

    #[target_feature(enable = "sse")]
    pub unsafe fn sq_diff_x8(a: &[f32], b: &[f32]) -> f32 {
        let body = a.len() - a.len() % 8;
        let (mut low, mut high) = (_mm_setzero_ps(), _mm_setzero_ps());
        for (pa, pb) in a[..body].chunks_exact(8).zip(b[..body].chunks_exact(8)) {
            let d_low = _mm_sub_ps(_mm_loadu_ps(pa.as_ptr()), _mm_loadu_ps(pb.as_ptr()));
            let d_high = _mm_sub_ps(_mm_loadu_ps(pa[4..].as_ptr()), _mm_loadu_ps(pb[4..].as_ptr()));
            low = _mm_add_ps(low, _mm_mul_ps(d_low, d_low));
            high = _mm_add_ps(high, _mm_mul_ps(d_high, d_high));
        }
        let mut lanes = [0f32; 4];
        _mm_storeu_ps(lanes.as_mut_ptr(), _mm_add_ps(low, high));
        lanes.iter().sum::<f32>() + super::sq_diff_tail(a, b, body)
    }
}

#[cfg(target_arch = "aarch64")]
mod neon {
    use core::arch::aarch64::*;

    #[target_feature(enable = "neon")]
    pub unsafe fn sq_diff_x8(a: &[f32], b: &[f32]) -> f32 {
        let body = a.len() - a.len() % 8;
        let (mut low, mut high) = (vdupq_n_f32(0.0), vdupq_n_f32(0.0));
        for (pa, pb) in a[..body].chunks_exact(8).zip(b[..body].chunks_exact(8)) {
            let d_low = vsubq_f32(vld1q_f32(pa.as_ptr()), vld1q_f32(pb.as_ptr()));
            let d_high = vsubq_f32(vld1q_f32(pa[4..].as_ptr()), vld1q_f32(pb[4..].as_ptr()));
            low = vmlaq_f32(low, d_low, d_low);
            high = vmlaq_f32(high, d_high, d_high);
        }
        vaddvq_f32(vaddq_f32(low, high)) + super::sq_diff_tail(a, b, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_matches_scalar_for_all_tail_lengths() {
        for len in 0..20usize {
            let a: Vec<f32> = (0..len).map(|i| i as f32 * 0.5 - 3.0).collect();
            let b: Vec<f32> = (0..len).map(|i| (i as f32).cos()).collect();
            let expected = sq_diff_tail(&a, &b, 0);
            assert!((l2_distance_sqr(&a, &b) - expected).abs() < 1e-4, "len {len}");
        }
    }

    #[test]
    fn test_normalize_returns_norm_and_skips_zero() {
        let mut v = vec![3.0f32, 4.0];
        assert_eq!(normalize(&mut v), 5.0);
        assert!((l2_norm_sqr(&v) - 1.0).abs() < 1e-6);

        let mut zero = vec![0.0f32; 3];
        assert_eq!(normalize(&mut zero), 0.0);
        assert_eq!(zero, vec![0.0; 3]);
    }
}
