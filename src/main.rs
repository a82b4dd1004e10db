//! s3up - one-way sync of a local directory tree into an S3 bucket
//!
//! Design goals:
//! - Upload only what changed, detected by content hash, never timestamps
//! - The hash lives in object user metadata so no remote re-read is needed
//! - Tens of concurrent uploads to hide network latency

mod digest;
mod logger;
mod mime;
mod queue;
mod store;
mod sync;
mod walk;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::logger::{JsonlLogger, Logger, NoopLogger};
use crate::store::{RemoteStore, S3Store};
use crate::sync::{SyncCoordinator, DEFAULT_WORKERS};
use crate::walk::{walk_tree, ExcludeRules};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "s3up - sync a local directory tree to an S3 bucket, uploading only changed files"
)]
struct Args {
    /// Local source directory
    source: PathBuf,

    /// S3 bucket name; must occur in the source path, everything up to and
    /// including it is stripped from remote keys
    bucket: String,

    /// Number of concurrent upload workers
    #[arg(short = 't', long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// AWS region (defaults to the ambient AWS configuration)
    #[arg(long)]
    region: Option<String>,

    /// Custom S3 endpoint (MinIO etc.); implies path-style addressing
    #[arg(long = "endpoint-url")]
    endpoint_url: Option<String>,

    /// Decide only - don't upload anything (dry run)
    #[arg(short = 'l', long, alias = "list-only")]
    dry_run: bool,

    /// Exclude directories matching patterns, in addition to VCS metadata dirs
    #[arg(long = "xd", action = clap::ArgAction::Append)]
    exclude_dirs: Vec<String>,

    /// Exclude files matching patterns, in addition to editor backups
    #[arg(long = "xf", action = clap::ArgAction::Append)]
    exclude_files: Vec<String>,

    /// Write JSONL log entries to file
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,

    /// Show processing stages and per-run details
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if !args.source.is_dir() {
        bail!("source {} is not a readable directory", args.source.display());
    }

    // The bucket name doubles as the key-prefix marker inside the source
    // path: /home/me/mysite.com + mysite.com strips /home/me/mysite.com.
    let source_str = args.source.to_string_lossy().replace('\\', "/");
    let offset = source_str.find(&args.bucket).with_context(|| {
        format!(
            "the source path {} must contain the bucket name {}",
            source_str, args.bucket
        )
    })?;
    let key_prefix = source_str[..offset + args.bucket.len()].to_string();

    // Choose logger once; zero overhead in hot paths with NoopLogger
    let logger: Arc<dyn Logger> = if let Some(ref p) = args.log_file {
        match JsonlLogger::new(p) {
            Ok(l) => Arc::new(l),
            Err(_) => Arc::new(NoopLogger),
        }
    } else {
        Arc::new(NoopLogger)
    };

    let start = Instant::now();
    logger.start(&args.source, &args.bucket);

    if args.verbose {
        println!("s3up {}", env!("CARGO_PKG_VERSION"));
        println!("Source: {}", args.source.display());
        println!("Bucket: {}", args.bucket);
        println!("Key prefix stripped: {key_prefix}");
        if args.dry_run {
            println!("DRY RUN MODE - no files will be uploaded");
        }
    }

    // The store handle is built once here and shared by every worker; the
    // SDK client does its own connection pooling.
    let store = S3Store::connect(
        args.bucket.clone(),
        args.region.clone(),
        args.endpoint_url.clone(),
    )
    .await
    .context("failed to build the S3 client")?;

    if !store
        .bucket_exists()
        .await
        .context("bucket existence check failed")?
    {
        bail!("there is no S3 bucket named {}", args.bucket);
    }

    let rules = ExcludeRules::with_extra(&args.exclude_dirs, &args.exclude_files);
    let items = walk_tree(&args.source, &key_prefix, &rules, logger.as_ref())
        .context("failed to enumerate the source directory")?;

    if args.verbose {
        println!("Found {} files", items.len());
        if !args.exclude_dirs.is_empty() {
            println!("Excluding directories: {:?}", args.exclude_dirs);
        }
        if !args.exclude_files.is_empty() {
            println!("Excluding files: {:?}", args.exclude_files);
        }
    }

    let store: Arc<dyn RemoteStore> = Arc::new(store);
    let coordinator = SyncCoordinator::new(store, Arc::clone(&logger))
        .workers(args.workers)
        .dry_run(args.dry_run);

    let stats = coordinator.run(items, !args.verbose).await?;

    let seconds = start.elapsed().as_secs_f64();
    logger.done(stats.uploaded, stats.skipped, stats.failed, seconds);

    println!(
        "{}{} uploaded, {} skipped, {} failed in {:.1}s",
        if args.dry_run { "DRY RUN: " } else { "" },
        stats.uploaded,
        stats.skipped,
        stats.failed,
        seconds
    );
    for error in &stats.errors {
        eprintln!("failed: {error}");
    }

    if stats.failed > 0 {
        bail!("{} of {} items failed", stats.failed, stats.total());
    }
    Ok(())
}
