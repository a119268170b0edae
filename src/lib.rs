//! Page-level semantic search over PDF documents.
//!
//! A document is split into one chunk per page, each chunk is embedded with a
//! local sentence-embedding model, and queries are answered by exact squared-L2
//! nearest-neighbor search. The index and its chunk texts are persisted per
//! document and reloaded on the next run.

pub mod acquire;
pub mod candle;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod index;
pub mod metadata;
pub mod session;
pub mod store;
pub mod vector_ops;

pub use crate::chunk::Chunk;
pub use crate::config::Settings;
pub use crate::embedding::{EmbedderConfig, EmbeddingProvider};
pub use crate::index::FlatL2Index;
pub use crate::session::{Session, SessionOptions, SessionState};
pub use crate::store::{SearchHit, StoreConfig, StoreDiagnostic, VectorStore};
