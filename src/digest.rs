//! Content digest computation
//!
//! The digest is MD5, hex encoded, because it has to stay comparable with
//! hashes written into object metadata by earlier runs. It is used strictly
//! for change detection, never for authentication.

use anyhow::{Context, Result};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Hex-encoded MD5 of a byte stream.
///
/// Two equal digests mean (with overwhelming probability) identical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Wrap an already-computed hex digest, e.g. one read back from object
    /// metadata. Normalized to lowercase so comparisons are byte-wise.
    pub fn from_hex(hex: impl AsRef<str>) -> Self {
        Self(hex.as_ref().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the digest of a stream, consuming it exactly once in 64KB chunks.
pub fn digest_reader<R: Read>(mut reader: R) -> Result<ContentDigest> {
    let mut ctx = md5::Context::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        ctx.consume(&buffer[..bytes_read]);
    }

    Ok(ContentDigest(format!("{:x}", ctx.compute())))
}

/// Digest a local file. Hashing is plain blocking I/O, so it runs on the
/// blocking pool rather than stalling the worker tasks.
pub async fn digest_file(path: &Path) -> Result<ContentDigest> {
    let path = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || {
        let file = File::open(&path)
            .with_context(|| format!("cannot open {} for hashing", path.display()))?;
        digest_reader(BufReader::new(file))
    })
    .await??;
    Ok(digest)
}
