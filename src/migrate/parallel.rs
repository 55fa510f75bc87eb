// src/migrate/parallel.rs
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::debug;

use crate::error::{MigrateError, Result};

/// Apply `f` to every item on a rayon pool and collect the results in input order.
///
/// `workers` sizes a dedicated pool; `None` uses the global one. Once any call
/// fails, no further items are started and the first error observed is returned.
pub fn try_map<T, U, F>(items: &[T], workers: Option<usize>, f: F) -> Result<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> Result<U> + Sync + Send,
{
    match workers {
        None => items.par_iter().map(&f).collect(),
        Some(n) => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(MigrateError::WorkerPool)?;
            debug!(threads = pool.current_num_threads(), "built worker pool");
            pool.install(|| items.par_iter().map(&f).collect())
        }
    }
}
