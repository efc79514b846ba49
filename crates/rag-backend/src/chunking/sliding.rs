use crate::chunking::{ChunkingError, RawChunk};

/// Fixed-size sliding window chunker over characters.
///
/// Windows are `[start, start + chunk_size)`; the next window starts at
/// `start + (chunk_size - overlap)`. Whitespace-only windows are dropped.
pub struct SlidingWindowChunker;

impl SlidingWindowChunker {
    pub fn chunk(
        text: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<RawChunk>, ChunkingError> {
        if text.is_empty() || chunk_size == 0 {
            return Ok(Vec::new());
        }

        if overlap >= chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                overlap,
                chunk_size,
            });
        }

        let chars: Vec<char> = text.chars().collect();
        let text_len = chars.len();
        let step = chunk_size - overlap;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < text_len {
            let end = (start + chunk_size).min(text_len);
            let content: String = chars[start..end].iter().collect();

            if !content.trim().is_empty() {
                chunks.push(RawChunk {
                    content,
                    start,
                    end,
                });
            }

            start += step;
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_never_exceed_chunk_size() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = SlidingWindowChunker::chunk(text, 10, 3).unwrap();
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 10));
    }

    #[test]
    fn adjacent_chunks_share_overlap() {
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        let overlap = 4;
        let chunks = SlidingWindowChunker::chunk(text, 10, overlap).unwrap();

        for pair in chunks.windows(2) {
            let current: Vec<char> = pair[0].content.chars().collect();
            let next: Vec<char> = pair[1].content.chars().collect();
            let suffix: String = current[current.len() - overlap..].iter().collect();
            let prefix: String = next[..overlap].iter().collect();
            assert_eq!(suffix, prefix);
        }
    }

    #[test]
    fn whitespace_only_windows_are_dropped() {
        let text = "abc       xyz";
        // Window size 5 step 5: "abc  ", "     " (dropped), "xyz"
        let chunks = SlidingWindowChunker::chunk(text, 5, 0).unwrap();
        assert!(chunks.iter().all(|c| !c.content.trim().is_empty()));
    }

    #[test]
    fn rejects_overlap_at_or_above_chunk_size() {
        assert!(SlidingWindowChunker::chunk("abc", 5, 5).is_err());
        assert!(SlidingWindowChunker::chunk("abc", 5, 9).is_err());
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(SlidingWindowChunker::chunk("", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn concatenation_without_overlap_reconstructs_text() {
        let text = "the quick brown fox jumps over the lazy dog";
        let chunks = SlidingWindowChunker::chunk(text, 8, 0).unwrap();
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, text);
    }
}
