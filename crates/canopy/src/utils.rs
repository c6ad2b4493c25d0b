//! Parallelism configuration shared by the prediction engine.
//!
//! The only concurrency primitive the crate needs is a row-partitioned
//! parallel-for. Components receive a [`Parallelism`] flag and never manage
//! thread pools themselves; the pool is set up once at the API boundary via
//! [`run_with_threads`].

use rayon::prelude::*;

/// Whether parallel execution is allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if the rayon pool has multiple threads)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Run `f` over every item of `iter`, in parallel when allowed.
    ///
    /// Items carry their own position (callers zip with `enumerate`), so the
    /// result is identical regardless of how rayon schedules them.
    #[inline]
    pub fn maybe_par_bridge_for_each<T, I, F>(self, iter: I, f: F)
    where
        T: Send,
        I: Iterator<Item = T> + Send,
        F: Fn(T) + Sync + Send,
    {
        if self.is_parallel() {
            iter.par_bridge().for_each(f);
        } else {
            iter.for_each(f);
        }
    }

    /// Like [`maybe_par_bridge_for_each`](Self::maybe_par_bridge_for_each),
    /// but `f` may fail; the first error (by item order) is returned.
    #[inline]
    pub fn maybe_par_bridge_try_for_each<T, I, F, E>(self, mut iter: I, f: F) -> Result<(), E>
    where
        T: Send,
        E: Send,
        I: Iterator<Item = T> + Send,
        F: Fn(T) -> Result<(), E> + Sync + Send,
    {
        if self.is_parallel() {
            iter.par_bridge().try_for_each(f)
        } else {
            iter.try_for_each(f)
        }
    }
}

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (use all available cores)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
pub fn run_with_threads<T: Send>(
    n_threads: usize,
    f: impl FnOnce(Parallelism) -> T + Send,
) -> T {
    match Parallelism::from_threads(n_threads) {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel => {
            if n_threads == 0 {
                // Use the global pool as-is.
                return f(Parallelism::Parallel);
            }
            match rayon::ThreadPoolBuilder::new().num_threads(n_threads).build() {
                Ok(pool) => pool.install(|| f(Parallelism::Parallel)),
                // Pool creation can fail in constrained environments; fall
                // back to the global pool rather than aborting prediction.
                Err(_) => f(Parallelism::Parallel),
            }
        }
    }
}
