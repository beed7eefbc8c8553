//! Content identifier computation.
//!
//! Content is streamed through SHA-512 in fixed-size chunks so memory use
//! does not grow with the resource. Bytes are hashed raw, never decoded.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha512};
use tracing::debug;

use super::cache::{FileStamp, IdCache};
use crate::domain::ContentId;

/// Default read size for hashing (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Compute the identifier of everything readable from `reader`
pub fn identify<R: Read>(reader: R) -> io::Result<ContentId> {
    identify_chunked(reader, DEFAULT_CHUNK_SIZE)
}

/// Compute the identifier of an in-memory buffer
pub fn identify_bytes(bytes: &[u8]) -> ContentId {
    let mut digest = [0u8; 64];
    digest.copy_from_slice(&Sha512::digest(bytes));
    ContentId::from_digest(&digest)
}

/// Same as [`identify`] with an explicit chunk size
pub fn identify_chunked<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<ContentId> {
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }

    let mut digest = [0u8; 64];
    digest.copy_from_slice(&hasher.finalize());
    Ok(ContentId::from_digest(&digest))
}

/// Identifier engine with a stat-keyed memo of file identifiers
#[derive(Debug)]
pub struct Identifier {
    chunk_size: usize,
    cache: IdCache,
}

impl Default for Identifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Identifier {
    /// Create an engine with the default chunk size and an empty cache
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create an engine reading `chunk_size` bytes at a time
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            cache: IdCache::new(),
        }
    }

    /// The memo of previously hashed files
    pub fn cache(&self) -> &IdCache {
        &self.cache
    }

    /// Identify a stream without touching the cache
    pub fn identify<R: Read>(&self, reader: R) -> io::Result<ContentId> {
        identify_chunked(reader, self.chunk_size)
    }

    /// Identify the file at `path`, reusing a cached value while its
    /// size and modification time are unchanged
    pub fn identify_path(&self, path: &Path) -> io::Result<ContentId> {
        let path = path.canonicalize()?;
        let stamp = FileStamp::read(&path)?;

        if let Some(id) = self.cache.lookup(&path, &stamp) {
            debug!(path = %path.display(), "content id cache hit");
            return Ok(id);
        }

        let id = self.identify(File::open(&path)?)?;
        debug!(path = %path.display(), content_id = %id, "computed content id");
        self.cache.store(path, stamp, id.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::content_id::{ALPHABET, ID_LENGTH};

    #[test]
    fn test_identify_is_deterministic() {
        let a = identify(&b"hello world"[..]).unwrap();
        let b = identify(&b"hello world"[..]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_byte_change_changes_id() {
        let a = identify_bytes(b"hello world");
        let b = identify_bytes(b"hello worle");
        assert_ne!(a, b);
    }

    #[test]
    fn test_chunk_size_does_not_affect_id() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let whole = identify_bytes(&data);
        for chunk in [1, 7, 4096, 1 << 20] {
            assert_eq!(identify_chunked(&data[..], chunk).unwrap(), whole);
        }
    }

    #[test]
    fn test_id_format() {
        let inputs: [&[u8]; 3] = [b"", b"a", b"\x00\xff\xfe binary \x80"];
        for data in inputs {
            let id = identify_bytes(data);
            let s = id.as_str();
            assert_eq!(s.len(), ID_LENGTH);
            assert!(s.starts_with("c4"));
            assert!(s[2..].bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_binary_content_is_hashed_raw() {
        // Invalid UTF-8 must hash fine and differ from a lossy decoding
        let raw = [0xc3u8, 0x28, 0xa0, 0xa1];
        let lossy = String::from_utf8_lossy(&raw).into_owned();
        assert_ne!(identify_bytes(&raw), identify_bytes(lossy.as_bytes()));
    }

    #[test]
    fn test_identify_path_missing_file_is_io_error() {
        let engine = Identifier::new();
        let err = engine
            .identify_path(Path::new("/definitely/not/here.bin"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_known_ids() {
        assert_eq!(
            identify_bytes(b"").as_str(),
            "c459CSJESBh38BxDwwxNFKTXE4cC9HASGe3bhtN6z58GbwLqpCyRaKyZSvBAvTdF5NpSTPdUMH4hHRJ75geLsB1Sfs"
        );
        assert_eq!(
            identify_bytes(b"foo").as_str(),
            "c45XyDwWmrPQwJPdULBhma6LGNaLghKtN7R9vLn2tFrepZJ9jJFSDzpCKei11EgA5r1veenBu3Q8qfvWeDuPc7fJK2"
        );
    }
}
