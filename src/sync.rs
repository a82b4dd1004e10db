//! Change detection and the concurrent upload pipeline
//!
//! Workers share one pop-only queue and one store handle. Each item is
//! processed by exactly the worker that dequeued it; a failed item is
//! counted and logged, never retried, and never stops the pool.

use anyhow::Result;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use crate::digest::{digest_file, ContentDigest};
use crate::logger::Logger;
use crate::mime::content_type_for;
use crate::queue::WorkQueue;
use crate::store::RemoteStore;
use crate::walk::WorkItem;

/// Worker count tuned for high-latency network I/O, not CPU cores.
pub const DEFAULT_WORKERS: usize = 32;

/// Upload decision for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upload,
    Skip,
}

/// Decide whether a local file must be written remotely.
///
/// An existing object without digest metadata is "unknown": it is uploaded
/// unconditionally, which also repairs the metadata. Pure function, no I/O.
pub fn decide(
    local: &ContentDigest,
    remote_exists: bool,
    remote_digest: Option<&ContentDigest>,
) -> Action {
    if !remote_exists {
        return Action::Upload;
    }
    match remote_digest {
        Some(remote) if remote == local => Action::Skip,
        _ => Action::Upload,
    }
}

/// Result of processing one work item. Observability only; never used for
/// coordination between workers.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Uploaded,
    Skipped,
    Failed(String),
}

/// Aggregated counts for a sync run.
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    pub uploaded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

impl SyncStats {
    pub fn record(&mut self, key: &str, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Uploaded => self.uploaded += 1,
            SyncOutcome::Skipped => self.skipped += 1,
            SyncOutcome::Failed(msg) => {
                self.failed += 1;
                self.errors.push(format!("{key}: {msg}"));
            }
        }
    }

    pub fn merge(&mut self, other: SyncStats) {
        self.uploaded += other.uploaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }

    pub fn total(&self) -> u64 {
        self.uploaded + self.skipped + self.failed
    }
}

async fn process(store: &dyn RemoteStore, item: &WorkItem, dry_run: bool) -> Result<(Action, ContentDigest)> {
    // A file whose digest cannot be computed is a Failed item, surfaced in
    // the summary rather than silently dropped.
    let local = digest_file(&item.local_path).await?;

    let remote_exists = store.object_exists(&item.key).await?;
    let remote_digest = if remote_exists {
        store.read_digest(&item.key).await?
    } else {
        None
    };

    let action = decide(&local, remote_exists, remote_digest.as_ref());
    if action == Action::Upload && !dry_run {
        store
            .write_file(
                &item.key,
                &item.local_path,
                content_type_for(&item.key),
                &local,
            )
            .await?;
    }
    Ok((action, local))
}

/// Process a single item end to end. All errors are contained here.
pub async fn sync_item(
    store: &dyn RemoteStore,
    item: &WorkItem,
    dry_run: bool,
    logger: &dyn Logger,
) -> SyncOutcome {
    match process(store, item, dry_run).await {
        Ok((Action::Upload, digest)) => {
            logger.uploaded(&item.key, &digest);
            SyncOutcome::Uploaded
        }
        Ok((Action::Skip, _)) => {
            logger.skipped(&item.key);
            SyncOutcome::Skipped
        }
        Err(err) => {
            let msg = format!("{err:#}");
            eprintln!("error: {}: {msg}", item.key);
            logger.failed(&item.key, &msg);
            SyncOutcome::Failed(msg)
        }
    }
}

/// Worker loop: pop until the queue reports empty, then terminate.
async fn run_worker(
    queue: Arc<WorkQueue>,
    store: Arc<dyn RemoteStore>,
    logger: Arc<dyn Logger>,
    progress: ProgressBar,
    dry_run: bool,
) -> SyncStats {
    let mut stats = SyncStats::default();
    while let Some(item) = queue.take() {
        let outcome = sync_item(store.as_ref(), &item, dry_run, logger.as_ref()).await;
        stats.record(&item.key, outcome);
        progress.inc(1);
    }
    stats
}

/// Owns the shared store handle and drives a fixed pool of upload workers
/// over an eagerly built work list.
pub struct SyncCoordinator {
    store: Arc<dyn RemoteStore>,
    logger: Arc<dyn Logger>,
    workers: usize,
    dry_run: bool,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn RemoteStore>, logger: Arc<dyn Logger>) -> Self {
        Self {
            store,
            logger,
            workers: DEFAULT_WORKERS,
            dry_run: false,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Drain `items` with the worker pool and return merged stats. Blocks
    /// until every worker has observed an empty queue.
    pub async fn run(&self, items: Vec<WorkItem>, show_progress: bool) -> Result<SyncStats> {
        let total = items.len() as u64;
        let queue = Arc::new(WorkQueue::new(items));

        let progress = if show_progress && total > 0 {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{bar:30.green} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let pool_size = self.workers.min(queue.len()).max(1);
        let mut handles = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            handles.push(tokio::spawn(run_worker(
                Arc::clone(&queue),
                Arc::clone(&self.store),
                Arc::clone(&self.logger),
                progress.clone(),
                self.dry_run,
            )));
        }

        let mut stats = SyncStats::default();
        for result in join_all(handles).await {
            stats.merge(result?);
        }
        progress.finish_and_clear();
        Ok(stats)
    }
}
