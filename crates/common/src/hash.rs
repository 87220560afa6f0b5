//! Content hashing for change detection between deployments.
//!
//! Hashes are XXH3-128 rendered as 32 lowercase hex characters. They are only
//! compared against hashes produced by this crate, never against store ETags.

use std::io::Read;
use std::path::Path;

use xxhash_rust::xxh3::Xxh3;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Hash an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:032x}", xxhash_rust::xxh3::xxh3_128(data))
}

/// Hash a file by streaming it through a fixed-size buffer.
///
/// # Errors
/// Returns the underlying I/O error if the file cannot be opened or read.
pub fn hash_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file: std::fs::File = std::fs::File::open(path)?;
    let mut hasher: Xxh3Hasher = Xxh3Hasher::new();
    let mut buffer: Vec<u8> = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read: usize = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finish_hex())
}

/// Incremental XXH3-128 hasher.
pub struct Xxh3Hasher {
    inner: Xxh3,
}

impl Xxh3Hasher {
    pub fn new() -> Self {
        Self { inner: Xxh3::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Digest rendered as 32 lowercase hex characters.
    pub fn finish_hex(&self) -> String {
        format!("{:032x}", self.inner.digest128())
    }
}

impl Default for Xxh3Hasher {
    fn default() -> Self {
        Self::new()
    }
}
