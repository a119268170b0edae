//! Page-level text extraction from PDF documents.

use lopdf::Document;
use std::fmt::Display;
use std::path::Path;
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::error::ExtractionError;

/// Extracts one chunk per page that yields non-blank text, in page order.
///
/// A page whose text cannot be decoded is skipped with a warning; only a
/// document that cannot be opened at all, or that yields no text on any
/// page, is an error.
pub fn extract_chunks(path: &Path) -> Result<Vec<Chunk>, ExtractionError> {
    let document = Document::load(path).map_err(|source| ExtractionError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let pages = document.get_pages();
    debug!(path = %path.display(), pages = pages.len(), "Opened PDF");

    let chunks = chunks_from_pages(
        pages
            .keys()
            .map(|&number| (number, document.extract_text(&[number]))),
    );

    if chunks.is_empty() {
        return Err(ExtractionError::NoText(path.to_path_buf()));
    }
    Ok(chunks)
}

/// Turns `(page number, extraction result)` pairs into chunks, dropping blank
/// pages and pages that failed to extract.
pub fn chunks_from_pages<I, E>(pages: I) -> Vec<Chunk>
where
    I: IntoIterator<Item = (u32, Result<String, E>)>,
    E: Display,
{
    pages
        .into_iter()
        .filter_map(|(number, text)| match text {
            Ok(text) => {
                let body = text.trim();
                if body.is_empty() {
                    debug!(page = number, "Skipping page without text");
                    None
                } else {
                    Some(Chunk::from_page(number, body))
                }
            }
            Err(e) => {
                warn!(page = number, error = %e, "Skipping unreadable page");
                None
            }
        })
        .collect()
}
