//! Content hashing for end-to-end transfer verification.
//!
//! This module provides:
//! - The digest algorithms providers publish for file content (MD5, SHA-256)
//! - A streaming `ChecksumHasher` abstraction
//! - `HashingReader` / `HashingWriter` decorators that hash bytes as they pass through
//! - Case-insensitive comparison against provider-reported hashes

use crate::error::EngineError;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::Path;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// MD5 (published by Google Drive as `md5Checksum`)
    Md5,
    /// SHA-256 (published by OneDrive as `sha256Hash`)
    Sha256,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    /// Create a new checksum value
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    /// Get the algorithm
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Get the hex string representation
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Compare against a hash reported by a provider.
    ///
    /// Providers disagree on hex casing, so the comparison ignores case.
    pub fn matches(&self, reported: Option<&str>) -> bool {
        reported.is_some_and(|r| r.trim().eq_ignore_ascii_case(&self.hex))
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Trait for computing checksums
pub trait ChecksumHasher: Send {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize and return the checksum value
    fn finalize(self: Box<Self>) -> ChecksumValue;
}

/// MD5 hasher (backed by md5 crate)
struct Md5Hasher {
    context: md5::Context,
}

impl Md5Hasher {
    fn new() -> Self {
        Md5Hasher {
            context: md5::Context::new(),
        }
    }
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.context.compute();
        ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", digest))
    }
}

/// SHA-256 hasher (backed by sha2 crate)
struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl Sha256Hasher {
    fn new() -> Self {
        Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }
    }
}

impl ChecksumHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        use sha2::Digest;
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", digest))
    }
}

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher::new()),
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher::new()),
    }
}

/// Hash an in-memory buffer.
pub fn checksum_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> ChecksumValue {
    let mut hasher = create_hasher(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Reader decorator that feeds every byte it yields into a digest.
///
/// The digest covers exactly the bytes returned by `read`, in order.
pub struct HashingReader<R> {
    inner: R,
    hasher: Box<dyn ChecksumHasher>,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, algorithm: ChecksumAlgorithm) -> Self {
        HashingReader {
            inner,
            hasher: create_hasher(algorithm),
        }
    }

    /// Fill `buf` as far as the source allows; short only at end of input.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Consume the reader and return the digest of everything read.
    pub fn finish(self) -> ChecksumValue {
        self.hasher.finalize()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Writer decorator that feeds every byte it accepts into a digest.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Box<dyn ChecksumHasher>,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W, algorithm: ChecksumAlgorithm) -> Self {
        HashingWriter {
            inner,
            hasher: create_hasher(algorithm),
        }
    }

    /// Consume the writer, returning the inner writer and the digest.
    pub fn finish(self) -> (W, ChecksumValue) {
        (self.inner, self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Compute checksum for a file
pub fn compute_file_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumValue, EngineError> {
    let file = std::fs::File::open(path).map_err(|e| EngineError::local_io(path, e))?;
    let mut reader = HashingReader::new(file, algorithm);
    io::copy(&mut reader, &mut io::sink()).map_err(|e| EngineError::local_io(path, e))?;
    Ok(reader.finish())
}
