//! Execution policy around analyses
//!
//! The numeric components are plain functions. Callers that need retries,
//! time limits or lookup by id wrap them here: [`WithRetry`] and
//! [`WithTimeout`] compose around any [`Analysis`], and an
//! [`AnalysisRegistry`] maps ids to boxed analyses.

use crate::error::{QuantError, Result};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// A unit of work mapping an input to a result
pub trait Analysis<I, O>: Send + Sync {
    fn run(&self, input: &I) -> Result<O>;
}

impl<I, O, F> Analysis<I, O> for F
where
    F: Fn(&I) -> Result<O> + Send + Sync,
{
    fn run(&self, input: &I) -> Result<O> {
        self(input)
    }
}

/// Re-runs the inner analysis while it fails with a retryable error
pub struct WithRetry<A> {
    inner: A,
    max_attempts: u32,
    backoff: Duration,
}

impl<A> WithRetry<A> {
    /// `max_attempts` counts the first call; zero is treated as one
    pub fn new(inner: A, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl<I, O, A> Analysis<I, O> for WithRetry<A>
where
    A: Analysis<I, O>,
{
    fn run(&self, input: &I) -> Result<O> {
        let mut attempt = 1;
        loop {
            match self.inner.run(input) {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Analysis failed, retrying"
                    );
                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff);
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Fails with [`QuantError::Timeout`] when the inner analysis is too slow
///
/// The analysis runs on a worker thread. A worker that overruns is left to
/// finish in the background and its result is discarded.
pub struct WithTimeout<A> {
    inner: Arc<A>,
    timeout: Duration,
}

impl<A> WithTimeout<A> {
    pub fn new(inner: A, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<I, O, A> Analysis<I, O> for WithTimeout<A>
where
    A: Analysis<I, O> + 'static,
    I: Clone + Send + 'static,
    O: Send + 'static,
{
    fn run(&self, input: &I) -> Result<O> {
        let inner = Arc::clone(&self.inner);
        let input = input.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            // Receiver is gone once the caller has timed out
            let _ = tx.send(Analysis::run(&*inner, &input));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Analysis timed out");
                Err(QuantError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(QuantError::InvalidInput(
                "analysis worker exited without a result".to_string(),
            )),
        }
    }
}

/// Caller-owned mapping of id to analysis
pub struct AnalysisRegistry<I, O> {
    entries: BTreeMap<String, Box<dyn Analysis<I, O>>>,
}

impl<I, O> Default for AnalysisRegistry<I, O> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<I, O> AnalysisRegistry<I, O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `analysis` under `id`, returning any analysis it replaces
    pub fn register<A>(&mut self, id: impl Into<String>, analysis: A) -> Option<Box<dyn Analysis<I, O>>>
    where
        A: Analysis<I, O> + 'static,
    {
        self.entries.insert(id.into(), Box::new(analysis))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn run(&self, id: &str, input: &I) -> Result<O> {
        let analysis = self
            .entries
            .get(id)
            .ok_or_else(|| QuantError::NotFound(format!("analysis '{}' is not registered", id)))?;
        debug!(analysis = id, "Running analysis");
        analysis.run(input)
    }
}

/// Run an analysis on the tokio blocking pool, optionally bounded in time
#[cfg(feature = "async")]
pub async fn run_async<I, O, A>(analysis: Arc<A>, input: I, timeout: Option<Duration>) -> Result<O>
where
    A: Analysis<I, O> + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || Analysis::run(&*analysis, &input));
    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| QuantError::Timeout(limit))?,
        None => task.await,
    };
    joined.map_err(|e| QuantError::InvalidInput(format!("analysis task failed: {}", e)))?
}
