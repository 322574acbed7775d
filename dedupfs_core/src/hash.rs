//! Content digests using SHA-512.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Hash digest size in bytes (SHA-512 produces 512-bit hashes).
pub const HASH_SIZE: usize = 64;

/// Extension appended to every data file name.
pub const DATA_EXT: &str = "bin";

/// A 64-byte SHA-512 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Create a Hash from raw bytes.
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    /// Create a Hash from a hex string (128 hex characters).
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != HASH_SIZE * 2 {
            return Err(Error::invalid_hash(format!(
                "Expected {} hex characters, got {}",
                HASH_SIZE * 2,
                hex_str.len()
            )));
        }

        let bytes =
            hex::decode(hex_str).map_err(|e| Error::invalid_hash(format!("Invalid hex: {}", e)))?;

        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(&bytes);
        Ok(Hash(hash))
    }

    /// Parse a Hash back out of a data file name (`<hex>.bin`).
    pub fn from_data_file_name(name: &str) -> Result<Self> {
        let hex_str = name
            .strip_suffix(DATA_EXT)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(|| Error::invalid_hash(format!("Not a data file name: {}", name)))?;
        Self::from_hex(hex_str)
    }

    /// Convert to lowercase hex string (128 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Name of the data file holding this content: `<hex>.bin`.
    pub fn data_file_name(&self) -> String {
        format!("{}.{}", self.to_hex(), DATA_EXT)
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(digest);
        Hash(hash)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Hash raw bytes.
    pub fn hash_bytes(data: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Hash data from a reader.
    pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = Sha512::new();
        std::io::copy(&mut reader, &mut hasher)?;
        Ok(Hash::from_digest(&hasher.finalize()))
    }

    /// Hash a file's content.
    pub fn hash_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::io("open", path, e))?;
        Self::hash_reader(file).map_err(|e| Error::io("read", path, e))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Incremental SHA-512 accumulator fed by the write path.
#[derive(Clone, Default)]
pub struct Hasher {
    inner: Sha512,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Hash {
        Hash::from_digest(&self.inner.finalize())
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hasher(sha512)")
    }
}
