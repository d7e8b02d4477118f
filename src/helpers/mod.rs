pub(crate) mod simd_helpers;
