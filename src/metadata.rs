//! Chunk texts stored in index order.

use serde::{Deserialize, Serialize};
use std::path::Path;

const FORMAT_VERSION: u32 = 1;

#[derive(Deserialize, Serialize)]
struct MetadataFile {
    version: u32,
    texts: Vec<String>,
}

/// Ordered chunk texts; entry `i` belongs to index position `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataList {
    texts: Vec<String>,
}

impl MetadataList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.texts.get(position).map(String::as_str)
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, texts: I) {
        self.texts.extend(texts);
    }

    pub fn truncate(&mut self, len: usize) {
        self.texts.truncate(len);
    }

    pub fn clear(&mut self) {
        self.texts.clear();
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&MetadataFile {
            version: FORMAT_VERSION,
            texts: self.texts.clone(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        let file: MetadataFile = bincode::deserialize(bytes)?;
        if file.version != FORMAT_VERSION {
            return Err(Box::new(bincode::ErrorKind::Custom(format!(
                "unsupported metadata format version {}",
                file.version
            ))));
        }
        Ok(Self { texts: file.texts })
    }

    pub fn read_from(path: &Path) -> Result<Self, bincode::Error> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl From<Vec<String>> for MetadataList {
    fn from(texts: Vec<String>) -> Self {
        Self { texts }
    }
}
