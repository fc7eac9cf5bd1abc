//! Gleaner Parallel - Ordered Concurrency Primitives
//!
//! Two shapes used by loaders to parallelize their post-processing:
//!
//! - [`run_all`] / [`run_mapped`] / [`collect_or_first_error`]: one tokio task
//!   per unit of work, results returned in input order with per-task errors.
//! - [`batch_reduce`]: contiguous batches reduced in parallel on the rayon
//!   pool, outputs in batch order.
//!
//! # Example
//!
//! ```ignore
//! // Convert caption events into documents, four batches at a time.
//! let batches = batch_reduce(thread_count(events.len() as isize), &events, |chunk| {
//!     chunk.iter().map(to_document).collect::<Vec<_>>()
//! });
//! let docs = flatten_batches(batches);
//! ```

pub mod batch;
pub mod executor;

pub use batch::{batch_ranges, batch_reduce, flatten_batches, thread_count};
pub use executor::{collect_or_first_error, run_all, run_mapped, TaskError, TaskResult};
