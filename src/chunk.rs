//! Recursive character text splitter.
//!
//! Text is split on the first separator of `["\n\n", "\n", " ", ""]` that
//! occurs in it; pieces that are still too long are split again with the
//! remaining separators. Small pieces are then merged back into segments of
//! at most `chunk_size` characters, with about `chunk_overlap` characters
//! carried over from the end of one segment into the next.
//!
//! Lengths are counted in `char`s, so multi-byte text never splits inside a
//! code point.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// One piece of a split document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position within the source document, contiguous from 0.
    pub index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex.
    pub hash: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Splitter {
    /// `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Split `text` into segments. Whitespace-only input yields none.
    pub fn split(&self, text: &str) -> Vec<Segment> {
        self.split_recursive(text, &SEPARATORS)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Segment {
                index,
                hash: sha256_hex(&[text.as_bytes()]),
                text,
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (sep_idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(**s))
            .map(|(i, s)| (i, *s))
            .unwrap_or((separators.len() - 1, ""));
        let rest = &separators[sep_idx + 1..];

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        };

        let mut out = Vec::new();
        let mut good: Vec<String> = Vec::new();
        for piece in splits {
            if char_len(&piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                out.extend(self.merge(&good, separator));
                good.clear();
            }
            if rest.is_empty() {
                out.push(piece);
            } else {
                out.extend(self.split_recursive(&piece, rest));
            }
        }
        if !good.is_empty() {
            out.extend(self.merge(&good, separator));
        }
        out
    }

    /// Greedily join `splits` with `separator` into windows of at most
    /// `chunk_size` characters, keeping a tail of up to `chunk_overlap`
    /// characters as the start of the next window.
    fn merge(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = Default::default();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };
            if total + len + joiner > self.chunk_size && !window.is_empty() {
                push_joined(&mut docs, &window, separator);
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if window.is_empty() { 0 } else { sep_len }
                            > self.chunk_size)
                {
                    let Some(first) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(first) + if window.is_empty() { 0 } else { sep_len };
                }
            }
            window.push_back(piece.as_str());
            total += len + if window.len() > 1 { sep_len } else { 0 };
        }
        push_joined(&mut docs, &window, separator);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, window: &VecDeque<&str>, sep: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(sep);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}

/// Content-addressed segment id: SHA-256 over source path, segment index and
/// text. Re-indexing identical content yields identical ids.
pub fn segment_id(source: &str, index: usize, text: &str) -> String {
    sha256_hex(&[
        source.as_bytes(),
        b"\0",
        index.to_string().as_bytes(),
        b"\0",
        text.as_bytes(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_segment() {
        let segs = Splitter::new(1000, 200).split("Hello, world!");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].index, 0);
        assert_eq!(segs[0].text, "Hello, world!");
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        assert!(Splitter::new(1000, 200).split("  \n\n ").is_empty());
    }

    #[test]
    fn test_respects_chunk_size() {
        let text = (0..200)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let segs = Splitter::new(100, 20).split(&text);
        assert!(segs.len() > 1);
        for s in &segs {
            assert!(s.text.chars().count() <= 100, "too long: {}", s.text.len());
        }
        for (i, s) in segs.iter().enumerate() {
            assert_eq!(s.index, i);
        }
    }

    #[test]
    fn test_consecutive_segments_overlap() {
        let text = (0..100)
            .map(|i| format!("w{:03}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let segs = Splitter::new(50, 15).split(&text);
        for pair in segs.windows(2) {
            let last_word = pair[0].text.split(' ').last().unwrap();
            assert!(
                pair[1].text.contains(last_word),
                "{:?} / {:?}",
                pair[0].text,
                pair[1].text
            );
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para = "a".repeat(30);
        let text = format!("{p}\n\n{p}\n\n{p}", p = para);
        let segs = Splitter::new(40, 0).split(&text);
        assert_eq!(segs.len(), 3);
        assert!(segs.iter().all(|s| s.text == para));
    }

    #[test]
    fn test_multibyte_text_is_safe() {
        let text = "é".repeat(250);
        let segs = Splitter::new(100, 10).split(&text);
        assert!(segs.len() >= 3);
        assert!(segs.iter().all(|s| s.text.chars().count() <= 100));
    }

    #[test]
    fn test_segment_id_is_deterministic() {
        let a = segment_id("README.md", 0, "Hello");
        assert_eq!(a, segment_id("README.md", 0, "Hello"));
        assert_ne!(a, segment_id("README.md", 1, "Hello"));
        assert_ne!(a, segment_id("OTHER.md", 0, "Hello"));
        assert_eq!(a.len(), 64);
    }
}
