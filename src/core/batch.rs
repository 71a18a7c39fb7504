//! AR-013: Concurrent resolution of many templates against one catalog.
//!
//! Each template runs on a blocking task; the shared `Resolver` is never
//! mutated. Outcomes come back in input order regardless of completion order.

use super::resolver::Resolver;
use super::types::{PipelineResult, ResolveOptions};
use crate::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One template to resolve.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub name: String,
    pub source: String,
}

impl BatchItem {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Result for one [`BatchItem`].
#[derive(Debug)]
pub struct BatchOutcome {
    pub name: String,
    pub result: Result<PipelineResult, Error>,
}

/// Resolve `items` concurrently. A `timeout` bounds each template separately;
/// every template's clock starts when the batch starts.
pub async fn resolve_batch(
    resolver: Arc<Resolver>,
    items: Vec<BatchItem>,
    environment: &str,
    timeout: Option<Duration>,
) -> Vec<BatchOutcome> {
    let jobs: Vec<_> = items
        .into_iter()
        .map(|item| {
            let resolver = Arc::clone(&resolver);
            let options = ResolveOptions::new(item.name.clone()).with_environment(environment);
            let source = item.source;
            let job = move || resolver.resolve(&source, &options).map_err(Error::from);
            (item.name, job)
        })
        .collect();

    run_jobs(jobs, timeout)
        .await
        .into_iter()
        .map(|(name, result)| BatchOutcome { name, result })
        .collect()
}

/// Run blocking jobs side by side, each under its own deadline, and return
/// their results in input order.
///
/// A job past its deadline is reported as `Error::Timeout`. Its blocking
/// thread cannot be interrupted and finishes in the background; the result is
/// discarded.
async fn run_jobs<T, F>(
    jobs: Vec<(String, F)>,
    timeout: Option<Duration>,
) -> Vec<(String, Result<T, Error>)>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    let started = Instant::now();
    let watchers: Vec<_> = jobs
        .into_iter()
        .map(|(name, job)| {
            let work = tokio::task::spawn_blocking(job);
            let watcher = tokio::spawn(async move {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, work).await.ok(),
                    None => Some(work.await),
                }
            });
            (name, watcher)
        })
        .collect();

    let mut results = Vec::with_capacity(watchers.len());
    for (name, watcher) in watchers {
        let result = match watcher.await {
            Ok(Some(Ok(result))) => result,
            Ok(Some(Err(e))) | Err(e) => Err(Error::Worker(e.to_string())),
            Ok(None) => {
                let seconds = started.elapsed().as_secs_f64();
                tracing::warn!(template = %name, seconds, "template timed out");
                Err(Error::Timeout {
                    name: name.clone(),
                    seconds,
                })
            }
        };
        results.push((name, result));
    }
    results
}
