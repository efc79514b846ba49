use crate::chunking::RawChunk;

/// Recursive chunker splitting on semantic boundaries.
///
/// Tries each separator in order; segments still exceeding `chunk_size`
/// recurse on the remaining separators, falling back to character-level
/// windows once separators are exhausted. The sentence separator `"."` is
/// always attached to the preceding segment so chunks tend to end on
/// punctuation.
pub struct RecursiveChunker;

impl RecursiveChunker {
    pub fn chunk(
        text: &str,
        chunk_size: usize,
        separators: &[String],
        keep_separator: bool,
    ) -> Vec<RawChunk> {
        if text.is_empty() || chunk_size == 0 {
            return Vec::new();
        }
        Self::split_text(text, separators, chunk_size, keep_separator, 0)
    }

    /// Offsets are tracked in characters relative to the original input;
    /// they are approximate and intended for provenance, not slicing.
    fn split_text(
        text: &str,
        separators: &[String],
        chunk_size: usize,
        keep_separator: bool,
        offset: usize,
    ) -> Vec<RawChunk> {
        let length = text.chars().count();

        // No separators left: character-level windows.
        if separators.is_empty() {
            if text.trim().is_empty() {
                return Vec::new();
            }

            let chars: Vec<char> = text.chars().collect();
            let mut chunks = Vec::new();
            let mut start = 0;
            while start < length {
                let end = (start + chunk_size).min(length);
                let segment: String = chars[start..end].iter().collect();
                if !segment.trim().is_empty() {
                    chunks.push(RawChunk {
                        content: segment,
                        start: offset + start,
                        end: offset + end,
                    });
                }
                start = end;
            }
            return chunks;
        }

        let current_sep = separators[0].as_str();
        let remaining = &separators[1..];

        // Separator absent: try the next one.
        if !current_sep.is_empty() && !text.contains(current_sep) {
            return Self::split_text(text, remaining, chunk_size, keep_separator, offset);
        }

        let parts: Vec<&str> = text.split(current_sep).collect();
        if parts.len() == 1 {
            return Self::split_text(text, remaining, chunk_size, keep_separator, offset);
        }

        let sep_len = current_sep.chars().count();
        let attach_separator = keep_separator || current_sep == ".";
        let part_count = parts.len();

        let mut chunks = Vec::new();
        let mut running_offset = offset;

        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() && i == part_count - 1 {
                break;
            }

            let segment = if attach_separator && i < part_count - 1 {
                format!("{part}{current_sep}")
            } else {
                (*part).to_string()
            };

            let seg_len = segment.chars().count();
            if seg_len == 0 {
                running_offset +=
                    part.chars().count() + if i < part_count - 1 { sep_len } else { 0 };
                continue;
            }

            if seg_len > chunk_size && !remaining.is_empty() {
                chunks.extend(Self::split_text(
                    &segment,
                    remaining,
                    chunk_size,
                    keep_separator,
                    running_offset,
                ));
            } else if !segment.trim().is_empty() {
                chunks.push(RawChunk {
                    content: segment,
                    start: running_offset,
                    end: running_offset + seg_len,
                });
            }

            running_offset += seg_len;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_separators() -> Vec<String> {
        vec![
            "\n\n".to_string(),
            "\n".to_string(),
            ".".to_string(),
            " ".to_string(),
        ]
    }

    #[test]
    fn splits_on_paragraph_boundaries_first() {
        let text = "first paragraph here\n\nsecond paragraph here";
        let chunks = RecursiveChunker::chunk(text, 100, &default_separators(), false);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "first paragraph here");
        assert_eq!(chunks[1].content, "second paragraph here");
    }

    #[test]
    fn sentence_separator_stays_attached() {
        let text = "One sentence. Another sentence. Third one here";
        let separators = vec![".".to_string(), " ".to_string()];
        let chunks = RecursiveChunker::chunk(text, 20, &separators, false);

        assert!(chunks.len() >= 2);
        assert!(chunks[0].content.ends_with('.'));
        assert!(chunks[1].content.ends_with('.'));
    }

    #[test]
    fn oversized_segments_recurse_into_smaller_separators() {
        let long_sentence = "word ".repeat(50);
        let text = format!("short intro\n\n{long_sentence}");
        let chunks = RecursiveChunker::chunk(&text, 40, &default_separators(), false);

        assert!(chunks.iter().all(|c| c.content.chars().count() <= 40));
        assert!(chunks.len() > 2);
    }

    #[test]
    fn falls_back_to_character_windows() {
        let text = "abcdefghijabcdefghijabcdefghij"; // no separators at all
        let chunks = RecursiveChunker::chunk(text, 10, &[], false);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.content.chars().count() == 10));
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[2].end, 30);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(RecursiveChunker::chunk("", 10, &default_separators(), false).is_empty());
    }

    #[test]
    fn whitespace_only_segments_are_dropped() {
        let text = "alpha\n\n   \n\nbeta";
        let chunks = RecursiveChunker::chunk(text, 100, &default_separators(), false);
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert!(contents.contains(&"alpha"));
        assert!(contents.contains(&"beta"));
        assert!(chunks.iter().all(|c| !c.content.trim().is_empty()));
    }
}
