//! Content hashes stored in the DBAFS index

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Raw content hash bytes, serialized as lowercase hex.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(Vec<u8>);

impl ContentHash {
    /// Wrap hash bytes produced elsewhere (e.g. by another index writer).
    pub fn from_raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// BLAKE3 of a byte slice
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(blake3::hash(data).as_bytes().to_vec())
    }

    /// BLAKE3 of a file's content, streamed in 64KB chunks.
    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(Self(hasher.finalize().as_bytes().to_vec()))
    }

    /// Hash of a directory derived from its direct children.
    ///
    /// Children are sorted by name first so the result does not depend on
    /// walk order.
    pub fn of_directory<'a>(children: impl IntoIterator<Item = (&'a str, &'a ContentHash, bool)>) -> Self {
        let mut children: Vec<_> = children.into_iter().collect();
        children.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = blake3::Hasher::new();
        for (name, hash, is_directory) in children {
            hasher.update(name.as_bytes());
            hasher.update(&[0, u8::from(is_directory)]);
            hasher.update(&hash.0);
        }
        Self(hasher.finalize().as_bytes().to_vec())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(hex_str).map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentHash({})", hex.get(..16).unwrap_or(&hex))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(de::Error::custom)
    }
}
