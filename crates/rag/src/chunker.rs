//! Overlapping fixed-size text chunking.

/// One chunk of an extracted document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position of this chunk within the document.
    pub index: usize,
    /// Chunk text.
    pub text: String,
}

/// Splits text into overlapping windows of roughly `chunk_size` chars.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Build a chunker. Degenerate settings are clamped rather than
    /// rejected: a zero chunk size falls back to the default, and an
    /// overlap at or beyond the chunk size is reduced so every step
    /// advances.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = if chunk_size == 0 { 1000 } else { chunk_size };
        let overlap = if overlap >= chunk_size {
            log::warn!("chunk overlap {overlap} >= chunk size {chunk_size}, clamping");
            chunk_size / 5
        } else {
            overlap
        };

        Self { chunk_size, overlap }
    }

    /// Split `text` into chunks. Windows are measured in characters, not
    /// bytes, so multi-byte text never splits inside a code point. Input
    /// shorter than one window yields at most one chunk.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offsets of every char boundary, plus the end.
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        let total_chars = boundaries.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let end = (start + self.chunk_size).min(total_chars);
            let slice = &text[boundaries[start]..boundaries[end]];

            chunks.push(Chunk {
                index: chunks.len(),
                text: slice.to_string(),
            });

            if end == total_chars {
                break;
            }

            // overlap < chunk_size, so the window always advances.
            start = end - self.overlap;
        }

        chunks
    }
}
