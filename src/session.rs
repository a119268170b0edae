//! Interactive retrieval session: prepare the index, then answer queries.

use std::io::{BufRead, Write};
use tracing::debug;

use crate::chunk::Chunk;
use crate::embedding::EmbeddingProvider;
use crate::error::SessionError;
use crate::store::VectorStore;

const EXIT_COMMAND: &str = "exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Querying,
    Done,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Querying => "querying",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub top_k: usize,
    /// Longest displayed result, in characters
    pub preview_chars: usize,
}

pub struct Session<E> {
    store: VectorStore<E>,
    options: SessionOptions,
    state: SessionState,
}

impl<E: EmbeddingProvider> Session<E> {
    pub fn new(store: VectorStore<E>, options: SessionOptions) -> Self {
        Self {
            store,
            options,
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &VectorStore<E> {
        &self.store
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }

    /// Loads the persisted index and builds from `chunks` when nothing usable
    /// was found. `force_rebuild` discards any loaded index first.
    pub fn prepare<W: Write>(
        &mut self,
        chunks: &[Chunk],
        force_rebuild: bool,
        out: &mut W,
    ) -> Result<(), SessionError> {
        self.expect_state(SessionState::Uninitialized)?;

        self.store.load();
        if force_rebuild && self.store.is_built() {
            debug!("Discarding loaded index for rebuild");
            self.store.clear();
        }

        if self.store.is_built() {
            writeln!(out, "Loaded index with {} vectors.", self.store.count())?;
        } else {
            writeln!(out, "Building vector index from PDF ...")?;
            self.store.build(chunks)?;
            writeln!(out, "Indexed {} chunks.", self.store.count())?;
        }

        self.state = SessionState::Ready;
        Ok(())
    }

    /// Reads queries line by line until a blank line, `exit`, or end of input.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        mut input: R,
        out: &mut W,
    ) -> Result<(), SessionError> {
        self.expect_state(SessionState::Ready)?;
        self.state = SessionState::Querying;

        writeln!(out)?;
        writeln!(out, "Ready. Ask a question about the PDF.")?;
        writeln!(out, "  (Type 'exit' or press Enter on an empty line to quit.)")?;

        let mut line = String::new();
        loop {
            write!(out, "\nQuestion: ")?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                break;
            }
            let query = line.trim();
            if query.is_empty() || query.eq_ignore_ascii_case(EXIT_COMMAND) {
                break;
            }

            let hits = self.store.search(query, self.options.top_k)?;
            if hits.is_empty() {
                writeln!(out, "No results. Try another query.")?;
                continue;
            }

            writeln!(out, "\nTop matches:")?;
            for (i, hit) in hits.iter().enumerate() {
                writeln!(out, "{}. {}", i + 1, preview(&hit.text, self.options.preview_chars))?;
            }
        }

        writeln!(out, "Bye.")?;
        self.state = SessionState::Done;
        Ok(())
    }
}

/// Single-line preview of `text`: newlines become spaces and anything past
/// `max_chars` characters is replaced by `" ..."`.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace(['\r', '\n'], " ");
    let flat = flat.trim();
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{} ...", &flat[..cut]),
        None => flat.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::KeywordEmbedder;
    use crate::store::StoreConfig;
    use std::io::Cursor;
    use std::path::Path;
    use tempfile::TempDir;

    const VOCAB: &[&str] = &["cat", "dog", "sat", "ran"];

    fn session(dir: &Path, top_k: usize) -> Session<KeywordEmbedder> {
        let store = VectorStore::initialize(
            StoreConfig::new(VOCAB.len(), dir),
            KeywordEmbedder::new(VOCAB),
        )
        .unwrap();
        Session::new(
            store,
            SessionOptions {
                top_k,
                preview_chars: 400,
            },
        )
    }

    fn pets() -> Vec<Chunk> {
        vec![
            Chunk::from_page(1, "The cat sat."),
            Chunk::from_page(2, "The dog ran."),
        ]
    }

    fn prepared(dir: &Path, top_k: usize) -> Session<KeywordEmbedder> {
        let mut s = session(dir, top_k);
        s.prepare(&pets(), false, &mut Vec::new()).unwrap();
        s
    }

    fn run_with(s: &mut Session<KeywordEmbedder>, input: &str) -> String {
        let mut out = Vec::new();
        s.run(Cursor::new(input.to_string()), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_prepare_builds_then_reuses() {
        let temp = TempDir::new().unwrap();

        let mut first = session(temp.path(), 1);
        let mut out = Vec::new();
        first.prepare(&pets(), false, &mut out).unwrap();
        assert_eq!(first.state(), SessionState::Ready);
        assert!(String::from_utf8(out).unwrap().contains("Indexed 2 chunks."));

        let mut second = session(temp.path(), 1);
        let mut out = Vec::new();
        second.prepare(&pets(), false, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("Loaded index with 2 vectors."));
        assert_eq!(second.store().count(), 2);
    }

    #[test]
    fn test_force_rebuild_replaces_index() {
        let temp = TempDir::new().unwrap();
        prepared(temp.path(), 1);

        let mut rebuilt = session(temp.path(), 1);
        let mut out = Vec::new();
        rebuilt.prepare(&pets()[..1], true, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("Indexed 1 chunks."));
        assert_eq!(rebuilt.store().count(), 1);
    }

    #[test]
    fn test_prepare_twice_is_invalid() {
        let temp = TempDir::new().unwrap();
        let mut s = prepared(temp.path(), 1);
        let err = s.prepare(&pets(), false, &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                expected: "uninitialized",
                actual: "ready"
            }
        ));
    }

    #[test]
    fn test_run_before_prepare_is_invalid() {
        let temp = TempDir::new().unwrap();
        let mut s = session(temp.path(), 1);
        let err = s.run(Cursor::new(String::new()), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[test]
    fn test_query_prints_numbered_results() {
        let temp = TempDir::new().unwrap();
        let mut s = prepared(temp.path(), 2);
        let output = run_with(&mut s, "cat\n\n");
        assert!(output.contains("1. [Page 1] The cat sat."));
        assert!(output.contains("2. [Page 2] The dog ran."));
        assert!(output.find("1. [Page 1]").unwrap() < output.find("2. [Page 2]").unwrap());
        assert_eq!(s.state(), SessionState::Done);
    }

    #[test]
    fn test_exit_is_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let mut s = prepared(temp.path(), 1);
        let output = run_with(&mut s, "  EXIT \ncat\n");
        assert!(!output.contains("Top matches"));
        assert!(output.ends_with("Bye.\n"));
    }

    #[test]
    fn test_end_of_input_ends_session() {
        let temp = TempDir::new().unwrap();
        let mut s = prepared(temp.path(), 1);
        let output = run_with(&mut s, "dog");
        assert!(output.contains("1. [Page 2] The dog ran."));
        assert_eq!(s.state(), SessionState::Done);
    }

    #[test]
    fn test_empty_index_reports_no_results() {
        let temp = TempDir::new().unwrap();
        let mut s = session(temp.path(), 3);
        s.prepare(&[], false, &mut Vec::new()).unwrap();
        let output = run_with(&mut s, "cat\n");
        assert!(output.contains("No results. Try another query."));
    }

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("  line one\nline two  ", 400), "line one line two");
        assert_eq!(preview("abcdef", 3), "abc ...");
        assert_eq!(preview("abc", 3), "abc");
        // Multi-byte characters are counted, not bytes.
        assert_eq!(preview("héllo wörld", 4), "héll ...");
    }
}
