#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::{
    __m256i, _mm256_castsi256_pd, _mm256_cmpgt_epi64, _mm256_loadu_si256, _mm256_movemask_pd,
    _mm256_or_si256, _mm256_set1_epi64x,
};

/// Indices of values inside the inclusive range `[lo, hi]`, ascending.
pub fn filter_i64_between(values: &[i64], lo: i64, hi: i64) -> Vec<usize> {
    if lo > hi {
        return Vec::new();
    }
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return unsafe { filter_i64_between_avx2(values, lo, hi) };
        }
    }
    filter_i64_between_scalar(values, lo, hi)
}

fn filter_i64_between_scalar(values: &[i64], lo: i64, hi: i64) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| if v >= lo && v <= hi { Some(i) } else { None })
        .collect()
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn filter_i64_between_avx2(values: &[i64], lo: i64, hi: i64) -> Vec<usize> {
    const LANES: usize = 4; // __m256i holds 4 i64
    let mut out = Vec::with_capacity(values.len());

    let chunks = values.chunks_exact(LANES);
    let remainder = chunks.remainder();

    let vlo = _mm256_set1_epi64x(lo);
    let vhi = _mm256_set1_epi64x(hi);

    for (chunk_idx, chunk) in chunks.enumerate() {
        let v = unsafe { _mm256_loadu_si256(chunk.as_ptr() as *const __m256i) };
        let below = _mm256_cmpgt_epi64(vlo, v);
        let above = _mm256_cmpgt_epi64(v, vhi);
        let outside = _mm256_or_si256(below, above);

        // movemask on the f64 view picks one sign bit per 64-bit lane
        let mask_bits = _mm256_movemask_pd(_mm256_castsi256_pd(outside));
        for i in 0..LANES {
            if (mask_bits & (1 << i)) == 0 {
                out.push(chunk_idx * LANES + i);
            }
        }
    }

    let base = values.len() - remainder.len();
    for (i, &v) in remainder.iter().enumerate() {
        if v >= lo && v <= hi {
            out.push(base + i);
        }
    }

    out
}
