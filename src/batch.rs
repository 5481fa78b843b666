//! Parallel batch execution with per-item failure isolation
//!
//! [`BatchExecutor::run`] schedules independent work items over a dedicated Rayon
//! pool. An `Err` or a panic inside one item becomes that item's
//! [`Outcome::Failure`]; every other item still runs. Results arrive in completion
//! order and the report holds each item exactly once.
//!
//! [`run_isolated`] goes one step further and runs an item in a child process, so
//! even an abort inside a native library only fails that item.

use crate::errors::Result;
use crate::parallel::ParallelConfig;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of one batch item
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<R> {
    Success(R),
    /// Error text of a returned error or a panic
    Failure(String),
}

impl<R> Outcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(message) => Some(message),
        }
    }
}

/// One item with its outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResult<I, R> {
    /// Position of the item in the submitted sequence
    pub index: usize,
    pub item: I,
    pub outcome: Outcome<R>,
}

/// Every item of a batch, in completion order
#[derive(Debug, Clone)]
pub struct BatchReport<I, R> {
    results: Vec<ItemResult<I, R>>,
}

impl<I, R> BatchReport<I, R> {
    pub fn results(&self) -> &[ItemResult<I, R>] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = (&I, &R)> + '_ {
        self.results.iter().filter_map(|r| match &r.outcome {
            Outcome::Success(value) => Some((&r.item, value)),
            Outcome::Failure(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&I, &str)> + '_ {
        self.results
            .iter()
            .filter_map(|r| r.outcome.error().map(|e| (&r.item, e)))
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// Results re-sorted into submission order
    pub fn in_submission_order(mut self) -> Vec<ItemResult<I, R>> {
        self.results.sort_by_key(|r| r.index);
        self.results
    }

    /// Split into `(successes, failures)`
    pub fn into_parts(self) -> (Vec<(I, R)>, Vec<(I, String)>) {
        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for result in self.results {
            match result.outcome {
                Outcome::Success(value) => successes.push((result.item, value)),
                Outcome::Failure(message) => failures.push((result.item, message)),
            }
        }
        (successes, failures)
    }

    /// Serializable counts and failure details, items labelled by `label`.
    pub fn summary_with(&self, label: impl Fn(&I) -> String) -> BatchSummary {
        BatchSummary {
            total: self.len(),
            successful: self.success_count(),
            failed: self.failure_count(),
            successes: self.successes().map(|(item, _)| label(item)).collect(),
            failures: self
                .failures()
                .map(|(item, error)| FailureRecord {
                    item: label(item),
                    error: error.to_string(),
                })
                .collect(),
        }
    }
}

impl<I: fmt::Display, R> BatchReport<I, R> {
    pub fn summary(&self) -> BatchSummary {
        self.summary_with(|item| item.to_string())
    }
}

/// Counts plus the identity and error text of every failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub successes: Vec<String>,
    pub failures: Vec<FailureRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub item: String,
    pub error: String,
}

impl BatchSummary {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Print counts and failures to stdout
    pub fn print(&self) {
        println!(
            "📊 Completed: {} successful, {} failed",
            self.successful, self.failed
        );
        for failure in &self.failures {
            println!("   ❌ {}: {}", failure.item, failure.error);
        }
    }
}

/// Observer of batch progress. Never affects scheduling or outcomes.
pub trait ProgressReporter: Sync {
    fn started(&self, _total: usize) {}

    /// Called once per item, in completion order, with the number finished so far.
    fn item_finished(&self, _finished: usize, _total: usize, _index: usize, _success: bool) {}

    fn completed(&self, _successful: usize, _failed: usize) {}
}

/// Reports nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Reports progress through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn started(&self, total: usize) {
        info!(total, "batch started");
    }

    fn item_finished(&self, finished: usize, total: usize, index: usize, success: bool) {
        if success {
            info!("[{finished}/{total}] item {index} done");
        } else {
            warn!("[{finished}/{total}] item {index} failed");
        }
    }

    fn completed(&self, successful: usize, failed: usize) {
        info!(successful, failed, "batch completed");
    }
}

/// Runs independent items over a bounded worker pool
#[derive(Debug, Clone, Default)]
pub struct BatchExecutor<P = NoProgress> {
    config: ParallelConfig,
    progress: P,
}

impl BatchExecutor<NoProgress> {
    pub fn new(config: ParallelConfig) -> Self {
        Self {
            config,
            progress: NoProgress,
        }
    }
}

impl<P: ProgressReporter> BatchExecutor<P> {
    pub fn with_progress<Q: ProgressReporter>(self, progress: Q) -> BatchExecutor<Q> {
        BatchExecutor {
            config: self.config,
            progress,
        }
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    pub fn progress(&self) -> &P {
        &self.progress
    }

    /// Apply `func(item, args)` to every item.
    ///
    /// Returns once every item has resolved. Only pool construction can fail the
    /// whole call; item errors and panics land in the report.
    pub fn run<I, A, R, E, F>(&self, items: Vec<I>, args: &A, func: F) -> Result<BatchReport<I, R>>
    where
        I: Send,
        A: Sync + ?Sized,
        R: Send,
        E: fmt::Display,
        F: Fn(&I, &A) -> std::result::Result<R, E> + Sync,
    {
        let pool = self.config.build_pool()?;
        let total = items.len();
        let func = &func;
        let mut results = Vec::with_capacity(total);

        self.progress.started(total);
        pool.in_place_scope(|scope| {
            let (tx, rx) = mpsc::channel();
            for (index, item) in items.into_iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let outcome = run_item(&item, args, func);
                    // The receiver lives until every sender is gone.
                    let _ = tx.send(ItemResult { index, item, outcome });
                });
            }
            drop(tx);

            for result in rx {
                self.progress
                    .item_finished(results.len() + 1, total, result.index, result.outcome.is_success());
                if let Some(error) = result.outcome.error() {
                    debug!(index = result.index, "item failed: {error}");
                }
                results.push(result);
            }
        });

        let report = BatchReport { results };
        self.progress
            .completed(report.success_count(), report.failure_count());
        Ok(report)
    }
}

fn run_item<I, A, R, E, F>(item: &I, args: &A, func: &F) -> Outcome<R>
where
    A: ?Sized,
    E: fmt::Display,
    F: Fn(&I, &A) -> std::result::Result<R, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| func(item, args))) {
        Ok(Ok(value)) => Outcome::Success(value),
        Ok(Err(e)) => Outcome::Failure(e.to_string()),
        Err(payload) => Outcome::Failure(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `command` to completion as an isolated child process.
///
/// On success returns the last non-empty stdout line. A non-zero exit becomes the
/// last non-empty stderr line; a signal becomes "terminated by signal N".
pub fn run_isolated(command: &mut Command) -> std::result::Result<String, String> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("failed to start {}: {e}", command.get_program().to_string_lossy()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if output.status.success() {
        return Ok(last_line(&stdout).unwrap_or_default().to_string());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = last_line(&stderr);
    let message = match (output.status.code(), detail) {
        (Some(_), Some(line)) => line.to_string(),
        (Some(code), None) => format!("exited with status {code}"),
        (None, detail) => {
            let mut message = terminated_message(&output.status);
            if let Some(line) = detail {
                message.push_str(": ");
                message.push_str(line);
            }
            message
        }
    };
    Err(message)
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|line| !line.is_empty())
}

#[cfg(unix)]
fn terminated_message(status: &std::process::ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("terminated by signal {signal}"),
        None => "terminated abnormally".to_string(),
    }
}

#[cfg(not(unix))]
fn terminated_message(_status: &std::process::ExitStatus) -> String {
    "terminated abnormally".to_string()
}
