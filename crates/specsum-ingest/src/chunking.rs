//! Overlapping, boundary-aware chunking for token-limited model calls.
//!
//! Text that fits the budget passes through as one chunk. Longer text is cut
//! into windows of at most `max_chunk_chars` characters that overlap by
//! `overlap_chars`; each cut is pulled back to a paragraph break, else a
//! sentence break, when one exists within `lookback_chars` of the hard cut.
//!
//! Offsets and sizes count Unicode scalar values, not bytes.

use specsum_core::{ChunkingConfig, Result};

const PARAGRAPH_BREAK: &str = "\n\n";
const SENTENCE_BREAK: &str = ". ";

/// A contiguous slice of the input with its position metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// 1-based position in the sequence.
    pub index: usize,
    pub total: usize,
    pub start_char: usize,
    pub end_char: usize,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.end_char - self.start_char
    }
}

/// Splits text according to a validated [`ChunkingConfig`].
#[derive(Debug, Clone)]
pub struct ChunkSplitter {
    config: ChunkingConfig,
}

impl ChunkSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let offsets = char_offsets(text);
        let len = offsets.len() - 1;

        if len <= self.config.max_chunk_chars {
            return vec![Chunk {
                text: text.to_string(),
                index: 1,
                total: 1,
                start_char: 0,
                end_char: len,
            }];
        }

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            let mut end = (start + self.config.max_chunk_chars).min(len);
            if end < len {
                end = self.snap_end(text, &offsets, start, end);
            }
            spans.push((start, end));
            if end >= len {
                break;
            }
            // snap_end keeps end - overlap > start, so this always advances.
            start = end.saturating_sub(self.config.overlap_chars);
        }

        let total = spans.len();
        spans
            .into_iter()
            .enumerate()
            .map(|(i, (start_char, end_char))| Chunk {
                text: text[offsets[start_char]..offsets[end_char]].to_string(),
                index: i + 1,
                total,
                start_char,
                end_char,
            })
            .collect()
    }

    /// Pull a hard cut back to the nearest paragraph or sentence break.
    fn snap_end(&self, text: &str, offsets: &[usize], start: usize, end: usize) -> usize {
        let window_start = end.saturating_sub(self.config.lookback_chars).max(start);
        let window_byte = offsets[window_start];
        let window = &text[window_byte..offsets[end]];
        let min_end = start + self.config.overlap_chars + 1;

        for boundary in [PARAGRAPH_BREAK, SENTENCE_BREAK] {
            if let Some(pos) = window.rfind(boundary) {
                let break_char = char_index(offsets, window_byte + pos);
                let candidate = char_index(offsets, window_byte + pos + boundary.len());
                if break_char > start && candidate >= min_end {
                    return candidate;
                }
            }
        }
        end
    }
}

impl Default for ChunkSplitter {
    fn default() -> Self {
        Self {
            config: ChunkingConfig::default(),
        }
    }
}

/// Byte offset of every char, plus the total byte length as a sentinel.
fn char_offsets(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}

fn char_index(offsets: &[usize], byte: usize) -> usize {
    offsets.partition_point(|&o| o < byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(max: usize, overlap: usize) -> ChunkSplitter {
        ChunkSplitter::new(ChunkingConfig::new(max, overlap).unwrap()).unwrap()
    }

    fn assert_covers(chunks: &[Chunk], len: usize) {
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks.last().unwrap().end_char, len);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_char <= pair[0].end_char, "gap between chunks");
        }
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let text = "x".repeat(10_000);
        let chunks = ChunkSplitter::default().split(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!((chunks[0].index, chunks[0].total), (1, 1));
    }

    #[test]
    fn test_exactly_max_is_single_chunk() {
        let text = "a".repeat(24_000);
        assert_eq!(ChunkSplitter::default().split(&text).len(), 1);
    }

    #[test]
    fn test_empty_text_yields_one_empty_chunk() {
        let chunks = ChunkSplitter::default().split("");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
        assert_eq!(chunks[0].end_char, 0);
    }

    #[test]
    fn test_paragraph_break_snap() {
        let mut text = "a".repeat(23_500);
        text.push_str("\n\n");
        text.push_str(&"b".repeat(50_000 - text.len()));
        assert_eq!(text.len(), 50_000);

        let chunks = ChunkSplitter::default().split(&text);
        assert_eq!(chunks[0].end_char, 23_502);
        assert!(chunks[0].text.ends_with("\n\n"));
        assert_eq!(chunks[1].start_char, 21_502);
        assert_eq!(chunks.last().unwrap().end_char, 50_000);
        assert_covers(&chunks, 50_000);
        for c in &chunks {
            assert!(c.char_len() <= 24_000);
            assert_eq!(c.total, chunks.len());
        }
    }

    #[test]
    fn test_sentence_break_used_without_paragraph() {
        let mut text = "word ".repeat(180);
        text.push_str("End of thought. ");
        text.push_str(&"tail ".repeat(100));
        let chunks = splitter(1_000, 100).split(&text);
        assert!(chunks[0].text.ends_with(". "));
        assert_covers(&chunks, text.chars().count());
    }

    #[test]
    fn test_paragraph_preferred_over_later_sentence() {
        let mut text = "p".repeat(800);
        text.push_str("\n\n");
        text.push_str(&"s".repeat(100));
        text.push_str(". ");
        text.push_str(&"z".repeat(2_000));
        let chunks = splitter(1_000, 50).split(&text);
        assert_eq!(chunks[0].end_char, 802);
    }

    #[test]
    fn test_hard_cut_without_breaks() {
        let text = "z".repeat(2_500);
        let chunks = splitter(1_000, 200).split(&text);
        let spans: Vec<_> = chunks.iter().map(|c| (c.start_char, c.end_char)).collect();
        assert_eq!(spans, vec![(0, 1_000), (800, 1_800), (1_600, 2_500)]);
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = "Some sentence here. ".repeat(400);
        let chunks = splitter(1_000, 150).split(&text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_char < pair[0].end_char);
            assert_eq!(pair[0].end_char - pair[1].start_char, 150);
        }
    }

    #[test]
    fn test_break_too_close_to_start_is_ignored() {
        // A snap to "\n\n" at char 12 would leave no room for the overlap.
        let mut text = "a".repeat(10);
        text.push_str("\n\n");
        text.push_str(&"b".repeat(200));
        let chunks = splitter(20, 15).split(&text);
        assert_eq!(chunks[0].end_char, 20);
        assert_covers(&chunks, text.chars().count());
    }

    #[test]
    fn test_multibyte_offsets_are_chars() {
        let text = "é".repeat(2_500);
        let chunks = splitter(1_000, 100).split(&text);
        assert_covers(&chunks, 2_500);
        for c in &chunks {
            assert_eq!(c.text.chars().count(), c.char_len());
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Line one. Line two.\n\nNext para. ".repeat(3_000);
        let s = ChunkSplitter::default();
        assert_eq!(s.split(&text), s.split(&text));
    }
}
