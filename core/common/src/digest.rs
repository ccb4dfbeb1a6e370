//! Content digests for file entries.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io;

/// Length of a digest in bytes.
pub const DIGEST_LENGTH: usize = 32;

type Hasher = Blake2b<U32>;

/// BLAKE2b-256 digest of a file's contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    /// Create a digest from raw bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Compute the digest of an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(data);
        Self::from_hasher(hasher)
    }

    /// Get the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    /// Lowercase hexadecimal form, suitable for file names.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn from_hasher(hasher: Hasher) -> Self {
        let mut bytes = [0u8; DIGEST_LENGTH];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..12])
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        let bytes: [u8; DIGEST_LENGTH] = decoded
            .try_into()
            .map_err(|_| serde::de::Error::custom("digest must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

/// An `io::Write` sink that hashes everything written to it.
///
/// Lets callers digest a file with `io::copy` without buffering it whole.
#[derive(Default)]
pub struct DigestWriter {
    hasher: Hasher,
}

impl DigestWriter {
    /// Create an empty digest writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the writer and return the digest of all written bytes.
    pub fn finish(self) -> Digest {
        Digest::from_hasher(self.hasher)
    }
}

impl io::Write for DigestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(Digest::of(b"hello"), Digest::of(b"hello"));
        assert_ne!(Digest::of(b"hello"), Digest::of(b"world"));
    }

    #[test]
    fn test_writer_matches_buffer_digest() {
        let mut writer = DigestWriter::new();
        writer.write_all(b"hel").unwrap();
        writer.write_all(b"lo").unwrap();
        assert_eq!(writer.finish(), Digest::of(b"hello"));
    }

    #[test]
    fn test_hex_form() {
        let digest = Digest::from_bytes([0xab; DIGEST_LENGTH]);
        assert_eq!(digest.to_hex().len(), DIGEST_LENGTH * 2);
        assert!(digest.to_hex().starts_with("abab"));
    }

    #[test]
    fn test_serde_rejects_wrong_length() {
        let digest = Digest::of(b"content");
        let json = serde_json::to_string(&digest).unwrap();
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);

        let short = format!("\"{}\"", STANDARD.encode([1u8; 4]));
        assert!(serde_json::from_str::<Digest>(&short).is_err());
    }
}
