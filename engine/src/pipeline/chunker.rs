//! Overlapping text windows
//!
//! Sizes are measured in characters, never bytes, so a window boundary can
//! not split a multi-byte character.

/// Splits text into windows of at most `target` characters, each repeating
/// the last `overlap` characters of its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    target: usize,
    overlap: usize,
}

impl Chunker {
    /// `target` is raised to at least 1 and `overlap` clamped below `target`
    /// so every step makes progress.
    pub fn new(target: usize, overlap: usize) -> Self {
        let target = target.max(1);
        Self {
            target,
            overlap: overlap.min(target - 1),
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into ordered windows.
    ///
    /// Text no longer than `target` comes back as a single window. Empty text
    /// yields no windows.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every char start, plus the end of the string
        let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let len = bounds.len();
        bounds.push(text.len());

        if len <= self.target {
            return vec![text];
        }

        let step = self.target - self.overlap;
        let mut chunks = Vec::with_capacity(len / step + 1);
        let mut start = 0usize;

        loop {
            let end = (start + self.target).min(len);
            chunks.push(&text[bounds[start]..bounds[end]]);
            if end >= len {
                break;
            }
            start = end - self.overlap;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = Chunker::new(100, 10);
        assert_eq!(chunker.split("hello"), vec!["hello"]);
    }

    #[test]
    fn test_exact_target_is_single_chunk() {
        let text = "a".repeat(100);
        assert_eq!(Chunker::new(100, 10).split(&text).len(), 1);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(Chunker::new(100, 10).split("").is_empty());
    }

    #[test]
    fn test_chunks_overlap() {
        let text: String = (0..25).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = Chunker::new(10, 3).split(&text);

        assert_eq!(chunks[0], &text[0..10]);
        assert_eq!(chunks[1], &text[7..17]);
        assert_eq!(chunks[2], &text[14..24]);
        assert_eq!(chunks[3], &text[21..25]);
        for pair in chunks.windows(2) {
            assert_eq!(&pair[0][pair[0].len() - 3..], &pair[1][..3]);
        }
    }

    #[test]
    fn test_overlap_is_clamped() {
        let chunker = Chunker::new(5, 50);
        assert_eq!(chunker.overlap(), 4);

        let chunks = chunker.split("abcdefghij");
        assert!(chunks.iter().all(|c| !c.is_empty() && c.chars().count() <= 5));
        assert_eq!(chunks.last().map(|c| c.ends_with('j')), Some(true));
    }

    #[test]
    fn test_multibyte_boundaries() {
        let text = "héllo wörld ünïcode ñ".repeat(5);
        let chunks = Chunker::new(7, 2).split(&text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
    }

    #[test]
    fn test_split_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let chunker = Chunker::new(120, 20);
        assert_eq!(chunker.split(&text), chunker.split(&text));
    }
}
