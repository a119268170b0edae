/// One retrievable unit of text taken from a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Human-readable source label, e.g. `[Page 3]`
    pub label: String,
    /// Text that is embedded and returned by searches, label included
    pub text: String,
}

impl Chunk {
    /// Builds the chunk for 1-based `page`, prefixing the body with its label.
    pub fn from_page(page: u32, body: &str) -> Self {
        let label = format!("[Page {}]", page);
        let text = format!("{} {}", label, body);
        Self { label, text }
    }
}
