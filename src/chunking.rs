use crate::corpus::Record;
use crate::error::{AppError, Result};
use log::debug;

/// Separators tried in order, from paragraph breaks down to single words
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", ".", " "];

/// How text is cut into chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Minimum number of characters shared by adjacent chunks
    pub chunk_overlap: usize,
    /// Split points in priority order
    pub separators: Vec<String>,
}

impl ChunkingConfig {
    /// Recursive splitting over paragraph, line, sentence and word boundaries
    pub fn recursive(chunk_size: usize, chunk_overlap: usize) -> Self {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Paragraph-only splitting; oversized paragraphs are kept whole
    pub fn character(chunk_size: usize, chunk_overlap: usize) -> Self {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
            separators: vec!["\n\n".to_string()],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(AppError::invalid_config(
                "chunk_size",
                "must be greater than zero",
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::invalid_config(
                "chunk_overlap",
                format!(
                    "must be smaller than chunk_size ({} >= {})",
                    self.chunk_overlap, self.chunk_size
                ),
            ));
        }
        Ok(())
    }
}

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Index of the record this chunk was cut from
    pub record_index: usize,
    /// Byte offset of the chunk in the record content
    pub start: usize,
    /// Byte offset one past the end of the chunk
    pub end: usize,
    /// Estimated token count for this chunk
    pub token_count: usize,
}

/// Split text into chunks of at most `chunk_size` characters.
///
/// Separators are kept at the end of the piece they terminate, so with no
/// overlap the chunks concatenate back into `text`. With overlap each chunk
/// starts with trailing pieces of the previous one. A chunk is longer than
/// `chunk_size` only when it is a single run without any separator. Keeping
/// the concatenation exact can leave a chunk holding only a separator;
/// `chunk_records` drops those.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size - 1);

    let mut units = Vec::new();
    split_units(text, 0, text.len(), &config.separators, size, &mut units);

    let mut chunks = Vec::new();
    let mut current: Vec<(usize, usize)> = Vec::new();
    let mut current_len = 0;

    for unit in units {
        let unit_len = char_len(&text[unit.0..unit.1]);

        if !current.is_empty() && current_len + unit_len > size {
            chunks.push(make_chunk(text, &current));

            current = carry_overlap(text, &current, overlap, size, unit_len);
            current_len = current.iter().map(|u| char_len(&text[u.0..u.1])).sum();
        }

        current.push(unit);
        current_len += unit_len;
    }

    if !current.is_empty() {
        chunks.push(make_chunk(text, &current));
    }

    chunks
}

/// Chunk every record, skipping chunks that hold only whitespace
pub fn chunk_records(records: &[Record], config: &ChunkingConfig) -> Result<Vec<TextChunk>> {
    config.validate()?;

    let mut chunks = Vec::new();
    for (record_index, record) in records.iter().enumerate() {
        let before = chunks.len();
        chunks.extend(
            split_text(&record.content, config)
                .into_iter()
                .filter(|chunk| !chunk.text.trim().is_empty())
                .map(|chunk| TextChunk {
                    record_index,
                    ..chunk
                }),
        );
        debug!(
            "Record {} produced {} chunks",
            record_index,
            chunks.len() - before
        );
    }

    Ok(chunks)
}

/// Sum of the estimated token counts
pub fn total_tokens(chunks: &[TextChunk]) -> usize {
    chunks.iter().map(|chunk| chunk.token_count).sum()
}

/// Chunks estimated to hold more than `limit` tokens
pub fn over_token_limit(chunks: &[TextChunk], limit: usize) -> impl Iterator<Item = &TextChunk> {
    chunks.iter().filter(move |chunk| chunk.token_count > limit)
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Break `text[start..end]` into pieces no longer than `size`, recursing with
/// finer separators. Only pieces that contain no separator at all may exceed
/// `size`; they are kept whole.
fn split_units(
    text: &str,
    start: usize,
    end: usize,
    separators: &[String],
    size: usize,
    out: &mut Vec<(usize, usize)>,
) {
    let segment = &text[start..end];
    if char_len(segment) <= size {
        out.push((start, end));
        return;
    }

    let Some(position) = separators
        .iter()
        .position(|sep| !sep.is_empty() && segment.contains(sep.as_str()))
    else {
        out.push((start, end));
        return;
    };
    let separator = separators[position].as_str();
    let finer = &separators[position + 1..];

    // (start, end of body, end including the separator)
    let mut pieces = Vec::new();
    let mut piece_start = start;
    for (offset, _) in segment.match_indices(separator) {
        let body_end = start + offset;
        pieces.push((piece_start, body_end, body_end + separator.len()));
        piece_start = body_end + separator.len();
    }
    if piece_start < end {
        pieces.push((piece_start, end, end));
    }

    for (piece_start, body_end, piece_end) in pieces {
        if char_len(&text[piece_start..piece_end]) <= size {
            out.push((piece_start, piece_end));
            continue;
        }
        // Too long with its separator attached: body and separator become
        // separate units
        if piece_start < body_end {
            split_units(text, piece_start, body_end, finer, size, out);
        }
        if body_end < piece_end {
            split_units(text, body_end, piece_end, finer, size, out);
        }
    }
}

/// Pick the trailing units of the finished chunk that open the next one.
///
/// Takes the shortest strict suffix reaching `overlap` characters, then drops
/// leading units until the next unit still fits within `size`.
fn carry_overlap(
    text: &str,
    finished: &[(usize, usize)],
    overlap: usize,
    size: usize,
    next_len: usize,
) -> Vec<(usize, usize)> {
    if overlap == 0 || finished.len() < 2 {
        return Vec::new();
    }

    let mut carried = std::collections::VecDeque::new();
    let mut carried_len = 0;
    for unit in finished[1..].iter().rev() {
        if carried_len >= overlap {
            break;
        }
        carried_len += char_len(&text[unit.0..unit.1]);
        carried.push_front(*unit);
    }

    while carried_len + next_len > size {
        match carried.pop_front() {
            Some(unit) => carried_len -= char_len(&text[unit.0..unit.1]),
            None => break,
        }
    }

    carried.into_iter().collect()
}

fn make_chunk(text: &str, units: &[(usize, usize)]) -> TextChunk {
    let start = units.first().map(|u| u.0).unwrap_or(0);
    let end = units.last().map(|u| u.1).unwrap_or(start);
    let chunk_text = &text[start..end];
    TextChunk {
        text: chunk_text.to_string(),
        record_index: 0,
        start,
        end,
        token_count: estimate_token_count(chunk_text),
    }
}
