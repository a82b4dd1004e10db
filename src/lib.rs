//! s3up library
//!
//! One-way synchronization of a local directory tree into an S3 bucket,
//! skipping files whose stored content hash already matches the local file.

pub mod digest;
pub mod logger;
pub mod mime;
pub mod queue;
pub mod store;
pub mod sync;
pub mod walk;
