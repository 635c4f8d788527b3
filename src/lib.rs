pub use cv_core as core;
pub use cv_features as features;
pub use cv_search as search;

/// Initialize a single global Rayon thread pool for parallel ranking.
///
/// Call this once at application startup before ranking with
/// `SearchConfig::parallel` enabled. Repeated calls are idempotent and
/// return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `RUSTCV_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> cv_core::Result<()> {
    cv_core::init_global_thread_pool(num_threads)
}
