//! Static batch partitioning with parallel reduction.
//!
//! A non-empty input is cut into exactly `P = min(max(threads, 1), len)`
//! contiguous batches of `ceil(len / P)` elements. The last batches may be
//! shorter, or empty when the ceiling division runs out of elements. Each
//! batch is reduced on the rayon pool and the outputs come back in batch
//! order, so concatenating them reproduces the input order.

use std::ops::Range;

use rayon::prelude::*;

/// Number of threads worth using for `n` units of work.
///
/// `1` for `n <= 0`, otherwise `n` capped at the number of logical CPUs.
pub fn thread_count(n: isize) -> usize {
    if n <= 0 {
        return 1;
    }
    (n as usize).min(num_cpus::get())
}

/// The contiguous index ranges `batch_reduce` hands to each reduction.
///
/// Empty for `len == 0`, otherwise exactly `min(max(threads, 1), len)`
/// ranges. Trailing ranges are empty when `len` does not fill them, e.g.
/// `len = 5, threads = 4` gives `[0..2, 2..4, 4..5, 5..5]`.
pub fn batch_ranges(len: usize, threads: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let batches = threads.max(1).min(len);
    let size = len.div_ceil(batches);
    (0..batches)
        .map(|i| {
            let start = (i * size).min(len);
            start..(start + size).min(len)
        })
        .collect()
}

/// Reduce each batch of `input` in parallel; output `i` belongs to batch `i`.
///
/// A non-empty input yields exactly `min(max(threads, 1), input.len())`
/// outputs; `reduce` is called with an empty slice for batches the input
/// does not reach. An empty input yields an empty vector. A panic inside `reduce` propagates
/// to the caller.
pub fn batch_reduce<I, O, F>(threads: usize, input: &[I], reduce: F) -> Vec<O>
where
    I: Sync,
    O: Send,
    F: Fn(&[I]) -> O + Send + Sync,
{
    batch_ranges(input.len(), threads)
        .into_par_iter()
        .map(|range| reduce(&input[range]))
        .collect()
}

/// Concatenate per-batch outputs back into one sequence.
pub fn flatten_batches<T>(batches: Vec<Vec<T>>) -> Vec<T> {
    let total = batches.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    for batch in batches {
        out.extend(batch);
    }
    out
}
