//! Ordered task fan-out.
//!
//! Every task runs on its own tokio task. Each one reports `(index, result)`
//! over a shared channel and the coordinator places results by index, so the
//! output order is the input order no matter which task finishes first.
//!
//! Parallelism is unbounded: one spawned task per input. Callers use this for
//! I/O-bound sub-requests whose count they already control (one per caption
//! track, one per thread reply).

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use gleaner_core::{ExecutionError, GleanerError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Why a task produced no output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError<E> {
    /// The task ran to completion and returned an error.
    #[error("{0}")]
    Failed(E),

    /// The task panicked. Other tasks are unaffected.
    #[error("task {index} panicked: {message}")]
    Panicked { index: usize, message: String },

    /// The task was dropped before it reported: the runtime shut down, or
    /// there was no runtime to start it on.
    #[error("task {index} was dropped before reporting a result")]
    Lost { index: usize },
}

impl From<TaskError<GleanerError>> for GleanerError {
    fn from(e: TaskError<GleanerError>) -> Self {
        match e {
            TaskError::Failed(inner) => inner,
            TaskError::Panicked { index, message } => {
                ExecutionError::Panicked { index, message }.into()
            }
            TaskError::Lost { index } => ExecutionError::Lost { index }.into(),
        }
    }
}

/// Outcome of the task submitted at position `index`.
#[derive(Debug)]
pub struct TaskResult<O, E> {
    pub index: usize,
    pub result: Result<O, TaskError<E>>,
}

impl<O, E> TaskResult<O, E> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn output(&self) -> Option<&O> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&TaskError<E>> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<O, TaskError<E>> {
        self.result
    }
}

type Report<O, E> = (usize, Result<O, TaskError<E>>);

/// Run every task concurrently and return one result per task, in input order.
///
/// Tasks are spawned on the current tokio runtime. Outside a runtime nothing
/// is started and every task reports [`TaskError::Lost`]. An empty input
/// returns an empty vector without spawning anything.
pub async fn run_all<O, E, Fut>(tasks: Vec<Fut>) -> Vec<TaskResult<O, E>>
where
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    let total = tasks.len();
    if total == 0 {
        return Vec::new();
    }

    let handle = match Handle::try_current() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, tasks = total, "No tokio runtime, tasks not started");
            return (0..total)
                .map(|index| TaskResult {
                    index,
                    result: Err(TaskError::Lost { index }),
                })
                .collect();
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Report<O, E>>();

    for (index, task) in tasks.into_iter().enumerate() {
        let tx = tx.clone();
        handle.spawn(async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(TaskError::Failed(e)),
                Err(payload) => Err(TaskError::Panicked {
                    index,
                    message: panic_message(payload.as_ref()),
                }),
            };
            if tx.send((index, result)).is_err() {
                tracing::debug!(index, "Result receiver dropped before task reported");
            }
        });
    }
    // The channel closes once every spawned task has dropped its sender.
    drop(tx);

    let mut slots: Vec<Option<Result<O, TaskError<E>>>> = (0..total).map(|_| None).collect();
    while let Some((index, result)) = rx.recv().await {
        slots[index] = Some(result);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| TaskResult {
            index,
            result: slot.unwrap_or_else(|| Err(TaskError::Lost { index })),
        })
        .collect()
}

/// Apply `f` to every item concurrently, preserving input order.
pub async fn run_mapped<I, O, E, F, Fut>(items: Vec<I>, f: F) -> Vec<TaskResult<O, E>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    run_all(items.into_iter().map(f).collect()).await
}

/// Like [`run_mapped`], but all-or-nothing.
///
/// Returns the ordered outputs, or the first error found scanning results in
/// index order. Partial output is discarded on error.
pub async fn collect_or_first_error<I, O, E, F, Fut>(
    items: Vec<I>,
    f: F,
) -> Result<Vec<O>, TaskError<E>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    run_mapped(items, f)
        .await
        .into_iter()
        .map(TaskResult::into_result)
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
