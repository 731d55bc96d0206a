//! Boundary-aware text chunker with fixed overlap.
//!
//! Splits a [`Document`] into [`Chunk`]s of at most `chunk_size` characters
//! where every chunk after the first starts `chunk_overlap` characters before
//! the end of its predecessor.
//!
//! # Algorithm
//!
//! 1. If the rest of the text from `start` fits in `chunk_size`, emit it as
//!    the final chunk.
//! 2. Otherwise pick the chunk end inside `(start + overlap, start + size]`,
//!    preferring the last boundary of the highest-ranked kind present:
//!    paragraph (`\n\n`), sentence end (`.`/`!`/`?` + whitespace), line
//!    break, word break, and finally the raw window edge.
//! 3. Continue from `end - overlap`.
//!
//! Because the lower bound of the window is strictly past `start + overlap`,
//! every chunk contributes new text and the loop always terminates.
//!
//! # Example
//!
//! ```rust
//! use onboard_harness::chunk::split;
//! use onboard_harness::models::Document;
//!
//! let doc = Document::new("guide.md", "abcdefghij");
//! let chunks = split(&doc, 4, 1).unwrap();
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(texts, vec!["abcd", "defg", "ghij"]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{HarnessError, Result};
use crate::models::{Chunk, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Sentence,
    Line,
    Word,
}

const BOUNDARY_PRIORITY: [Boundary; 4] = [
    Boundary::Paragraph,
    Boundary::Sentence,
    Boundary::Line,
    Boundary::Word,
];

/// Reject sizes the splitter cannot honour.
pub fn validate_params(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(HarnessError::config("chunk_size must be > 0"));
    }
    if chunk_overlap >= chunk_size {
        return Err(HarnessError::config(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }
    Ok(())
}

/// Split one document. Empty or whitespace-only documents yield no chunks.
pub fn split(document: &Document, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<Chunk>> {
    validate_params(chunk_size, chunk_overlap)?;

    if document.content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = document.content.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = if len - start <= chunk_size {
            len
        } else {
            find_end(&chars, start, start + chunk_overlap + 1, start + chunk_size)
        };

        let overlap = if chunks.is_empty() { 0 } else { chunk_overlap };
        let text: String = chars[start..end].iter().collect();
        chunks.push(make_chunk(document, chunks.len(), start, overlap, text));

        if end == len {
            break;
        }
        start = end - chunk_overlap;
    }

    Ok(chunks)
}

/// Split every document, preserving document order.
pub fn split_all(
    documents: &[Document],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    validate_params(chunk_size, chunk_overlap)?;
    let mut all = Vec::new();
    for doc in documents {
        all.extend(split(doc, chunk_size, chunk_overlap)?);
    }
    Ok(all)
}

/// Last end position in `[min_end, max_end]` that sits on the best boundary.
fn find_end(chars: &[char], start: usize, min_end: usize, max_end: usize) -> usize {
    for kind in BOUNDARY_PRIORITY {
        if let Some(end) = (min_end..=max_end)
            .rev()
            .find(|&end| is_boundary(chars, start, end, kind))
        {
            return end;
        }
    }
    max_end
}

/// Whether a chunk `chars[start..end]` would end on a boundary of `kind`.
fn is_boundary(chars: &[char], start: usize, end: usize, kind: Boundary) -> bool {
    let last = chars[end - 1];
    let prev = if end >= start + 2 {
        Some(chars[end - 2])
    } else {
        None
    };
    match kind {
        Boundary::Paragraph => last == '\n' && prev == Some('\n'),
        Boundary::Sentence => {
            last.is_whitespace() && matches!(prev, Some('.') | Some('!') | Some('?'))
        }
        Boundary::Line => last == '\n',
        Boundary::Word => last.is_whitespace(),
    }
}

fn make_chunk(
    document: &Document,
    index: usize,
    start_offset: usize,
    overlap: usize,
    text: String,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}#{}", document.source_id, index),
        source_id: document.source_id.clone(),
        chunk_index: index,
        start_offset,
        overlap_with_previous: overlap,
        text,
        hash,
    }
}
