pub(crate) mod block8;
pub(crate) mod simd;
pub(crate) mod tensor;
