//! Vector index store: an exact-search index paired with chunk metadata.
//!
//! Position `i` in the index and entry `i` in the metadata always describe the
//! same chunk. Both are persisted side by side in the storage directory and
//! are only ever loaded together.
//!
//! Loading never fails. A missing, corrupt or mismatched artifact leaves the
//! store empty so the caller rebuilds; metadata that outgrew the index is cut
//! back to the index's length. Every such recovery is reported through the
//! optional diagnostic observer and logged at `warn`.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::config::Number;
use crate::embedding::{check_batch, EmbeddingProvider};
use crate::error::{EmbeddingError, PersistenceError, StoreError};
use crate::index::FlatL2Index;
use crate::metadata::MetadataList;

pub const INDEX_FILE: &str = "vectors.idx";
pub const METADATA_FILE: &str = "metadata.bin";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Embedding dimension; must match the provider
    pub dimension: usize,
    /// Directory holding this document's artifacts
    pub storage_dir: PathBuf,
}

impl StoreConfig {
    pub fn new(dimension: usize, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            storage_dir: storage_dir.into(),
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.storage_dir.join(INDEX_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.storage_dir.join(METADATA_FILE)
    }
}

/// A recovered problem found while loading persisted state.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreDiagnostic {
    /// One artifact exists without the other
    MissingArtifact { path: PathBuf },
    /// An artifact could not be decoded
    CorruptArtifact { path: PathBuf, reason: String },
    /// The persisted index was built for another dimension
    DimensionMismatch { expected: usize, actual: usize },
    /// Metadata and vector counts disagree
    InconsistentState { vectors: usize, metadata: usize },
}

impl fmt::Display for StoreDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingArtifact { path } => {
                write!(f, "missing artifact {}, index will be rebuilt", path.display())
            }
            Self::CorruptArtifact { path, reason } => write!(
                f,
                "unreadable artifact {} ({}), index will be rebuilt",
                path.display(),
                reason
            ),
            Self::DimensionMismatch { expected, actual } => write!(
                f,
                "persisted index has dimension {}, expected {}, index will be rebuilt",
                actual, expected
            ),
            Self::InconsistentState { vectors, metadata } => write!(
                f,
                "index holds {} vectors but metadata has {} entries",
                vectors, metadata
            ),
        }
    }
}

type DiagnosticObserver = Box<dyn Fn(&StoreDiagnostic)>;

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Position of the chunk in the index
    pub position: usize,
    /// Squared L2 distance from the query
    pub distance: Number,
    pub text: String,
}

pub struct VectorStore<E> {
    config: StoreConfig,
    embedder: E,
    index: FlatL2Index,
    metadata: MetadataList,
    observer: Option<DiagnosticObserver>,
}

impl<E: EmbeddingProvider> VectorStore<E> {
    /// Creates an empty store and its storage directory.
    pub fn initialize(config: StoreConfig, embedder: E) -> Result<Self, StoreError> {
        if embedder.dimension() != config.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: config.dimension,
                actual: embedder.dimension(),
            }
            .into());
        }
        fs::create_dir_all(&config.storage_dir).map_err(|source| PersistenceError::CreateDir {
            path: config.storage_dir.clone(),
            source,
        })?;

        Ok(Self {
            index: FlatL2Index::new(config.dimension),
            metadata: MetadataList::new(),
            config,
            embedder,
            observer: None,
        })
    }

    /// Registers a callback invoked for every load-time recovery.
    pub fn with_diagnostics(mut self, observer: impl Fn(&StoreDiagnostic) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of indexed vectors; zero until something is built or loaded.
    pub fn count(&self) -> usize {
        self.index.count()
    }

    pub fn is_built(&self) -> bool {
        !self.index.is_empty()
    }

    pub fn metadata(&self) -> &MetadataList {
        &self.metadata
    }

    pub fn index(&self) -> &FlatL2Index {
        &self.index
    }

    /// Replaces in-memory state with the persisted artifacts, if usable.
    pub fn load(&mut self) {
        let (index, mut metadata) = match self.read_artifacts() {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                debug!(dir = %self.config.storage_dir.display(), "No persisted index");
                self.clear();
                return;
            }
            Err(diagnostic) => {
                self.report(diagnostic);
                self.clear();
                return;
            }
        };

        let vectors = index.count();
        if metadata.len() != vectors {
            self.report(StoreDiagnostic::InconsistentState {
                vectors,
                metadata: metadata.len(),
            });
            if metadata.len() < vectors {
                // Missing texts cannot be recovered; force a rebuild.
                self.clear();
                return;
            }
            metadata.truncate(vectors);
        }

        info!(
            dir = %self.config.storage_dir.display(),
            vectors,
            "Loaded persisted index"
        );
        self.index = index;
        self.metadata = metadata;
    }

    fn read_artifacts(&self) -> Result<Option<(FlatL2Index, MetadataList)>, StoreDiagnostic> {
        let index_path = self.config.index_path();
        let metadata_path = self.config.metadata_path();

        match (index_path.exists(), metadata_path.exists()) {
            (false, false) => return Ok(None),
            (true, false) => {
                return Err(StoreDiagnostic::MissingArtifact {
                    path: metadata_path,
                })
            }
            (false, true) => return Err(StoreDiagnostic::MissingArtifact { path: index_path }),
            (true, true) => {}
        }

        let index = FlatL2Index::read_from(&index_path).map_err(|e| {
            StoreDiagnostic::CorruptArtifact {
                path: index_path.clone(),
                reason: e.to_string(),
            }
        })?;
        if index.dimension() != self.config.dimension {
            return Err(StoreDiagnostic::DimensionMismatch {
                expected: self.config.dimension,
                actual: index.dimension(),
            });
        }

        let metadata = MetadataList::read_from(&metadata_path).map_err(|e| {
            StoreDiagnostic::CorruptArtifact {
                path: metadata_path.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Some((index, metadata)))
    }

    fn report(&self, diagnostic: StoreDiagnostic) {
        warn!(dir = %self.config.storage_dir.display(), "{}", diagnostic);
        if let Some(observer) = &self.observer {
            observer(&diagnostic);
        }
    }

    /// Embeds `chunks` in one batch, appends them in order and persists.
    ///
    /// Appends to whatever is already indexed; call [`clear`](Self::clear)
    /// first to replace the index instead.
    pub fn build(&mut self, chunks: &[Chunk]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            debug!("Nothing to index");
            return Ok(());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed(&texts)?;
        check_batch(&vectors, texts.len(), self.config.dimension)?;

        self.index.add(&vectors)?;
        self.metadata.extend(chunks.iter().map(|c| c.text.clone()));
        self.persist()?;

        info!(added = chunks.len(), total = self.count(), "Built index");
        Ok(())
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.metadata.clear();
    }

    /// Writes the index artifact, then the metadata artifact.
    pub fn persist(&self) -> Result<(), PersistenceError> {
        let dir = &self.config.storage_dir;
        fs::create_dir_all(dir).map_err(|source| PersistenceError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let index_path = self.config.index_path();
        replace_file(&index_path, &self.index.to_bytes())?;

        let metadata_path = self.config.metadata_path();
        let metadata_bytes = self
            .metadata
            .to_bytes()
            .map_err(|source| PersistenceError::Encode {
                path: metadata_path.clone(),
                source,
            })?;
        replace_file(&metadata_path, &metadata_bytes)?;

        debug!(dir = %dir.display(), vectors = self.count(), "Persisted index");
        Ok(())
    }

    /// Returns up to `top_k` chunks nearest to `query`, closest first.
    ///
    /// Chunks at exactly equal distance come back in index order.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, StoreError> {
        if self.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(&[query])?;
        check_batch(&vectors, 1, self.config.dimension)?;
        let query_vector = &vectors[0];

        let hits: Vec<SearchHit> = self
            .index
            .search(query_vector, top_k)
            .into_iter()
            .filter_map(|neighbor| {
                let position = usize::try_from(neighbor.position).ok()?;
                let text = self.metadata.get(position)?;
                Some(SearchHit {
                    position,
                    distance: neighbor.distance,
                    text: text.to_string(),
                })
            })
            .collect();

        debug!(top_k, found = hits.len(), "Search complete");
        Ok(hits)
    }
}

/// Writes `bytes` to a sibling temp file, syncs, then renames over `path`.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path).map_err(write_err)?;
    file.write_all(bytes).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);
    fs::rename(&tmp_path, path).map_err(write_err)
}
