//! MD5 content hashing for file-level deduplication

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::{Digest, Md5};

/// Chunk size for streaming file reads.
const CHUNK_SIZE: usize = 8192;

/// Hash a file's contents, streaming in fixed-size chunks.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash raw bytes.
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

/// First 10 hex characters, as used in output names.
pub fn short_hash(hex: &str) -> &str {
    &hex[..hex.len().min(10)]
}
