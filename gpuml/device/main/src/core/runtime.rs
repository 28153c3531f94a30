use crate::api::error::{DeviceError, DeviceResult};
use crate::api::types::RuntimeConfig;

impl RuntimeConfig {
    /// Configure rayon's global pool.
    ///
    /// Must run before the first kernel launch; the global pool can only be built once.
    pub fn apply(&self) -> DeviceResult<()> {
        if self.num_threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.num_threads)
                .build_global()
                .map_err(|e| DeviceError::ThreadPool(e.to_string()))?;
        }
        log::info!(
            "Host device: {} rayon threads, SIMD {}",
            rayon::current_num_threads(),
            Self::detect_simd()
        );
        Ok(())
    }

    pub fn detect_simd() -> &'static str {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") {
                return "avx2";
            }
            if is_x86_feature_detected!("sse4.1") {
                return "sse4.1";
            }
        }
        "scalar"
    }
}
