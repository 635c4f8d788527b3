use crate::{Error, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::env;
use std::sync::OnceLock;

pub const CPU_THREADS_ENV: &str = "RUSTCV_CPU_THREADS";

static THREAD_POOL_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize the global Rayon thread pool used when ranking in parallel.
///
/// Priority:
/// 1. `num_threads` argument
/// 2. `RUSTCV_CPU_THREADS` environment variable
/// 3. Rayon default
///
/// Repeated calls return the outcome of the first one.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<()> {
    let res = THREAD_POOL_INIT.get_or_init(|| {
        let mut builder = ThreadPoolBuilder::new();
        if let Some(n) = configured_threads(num_threads)? {
            builder = builder.num_threads(n);
        }
        builder.build_global().map_err(|e| e.to_string())
    });
    res.clone().map_err(Error::InvalidParameter)
}

/// Dedicated pool for one search engine, or `None` when neither
/// `num_threads` nor `RUSTCV_CPU_THREADS` is set and the global pool applies.
pub fn build_thread_pool(num_threads: Option<usize>) -> Result<Option<ThreadPool>> {
    let Some(n) = configured_threads(num_threads).map_err(Error::InvalidParameter)? else {
        return Ok(None);
    };
    ThreadPoolBuilder::new()
        .num_threads(n)
        .thread_name(|i| format!("cv-search-{i}"))
        .build()
        .map(Some)
        .map_err(|e| Error::InvalidParameter(e.to_string()))
}

fn configured_threads(num_threads: Option<usize>) -> std::result::Result<Option<usize>, String> {
    match num_threads {
        Some(0) => Err("thread count must be >= 1".to_string()),
        Some(n) => Ok(Some(n)),
        None => read_cpu_threads_from_env(),
    }
}

fn read_cpu_threads_from_env() -> std::result::Result<Option<usize>, String> {
    let raw = match env::var(CPU_THREADS_ENV) {
        Ok(v) => v,
        Err(env::VarError::NotPresent) => return Ok(None),
        Err(e) => return Err(format!("failed to read {CPU_THREADS_ENV}: {e}")),
    };
    parse_thread_count(&raw).map(Some)
}

fn parse_thread_count(raw: &str) -> std::result::Result<usize, String> {
    let parsed: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("{CPU_THREADS_ENV} must be a positive integer, got '{raw}'"))?;
    if parsed == 0 {
        return Err(format!("{CPU_THREADS_ENV} must be >= 1"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_thread_counts() {
        assert_eq!(parse_thread_count("4"), Ok(4));
        assert_eq!(parse_thread_count(" 2 "), Ok(2));
        assert!(parse_thread_count("0").is_err());
        assert!(parse_thread_count("many").is_err());
    }

    #[test]
    fn explicit_thread_count_builds_dedicated_pool() {
        let pool = build_thread_pool(Some(3)).unwrap().unwrap();
        assert_eq!(pool.current_num_threads(), 3);
        assert_eq!(pool.install(rayon::current_num_threads), 3);
        assert!(build_thread_pool(Some(0)).is_err());
    }
}
