//! Paragraph-boundary text chunker with overlap.
//!
//! Splits extracted document text into overlapping passages that respect a
//! `chunk_size` limit measured in characters. Splitting happens on blank
//! lines so that each chunk holds whole paragraphs whenever possible; the
//! tail of the previous chunk is repeated at the start of the next one so
//! that retrieval does not lose context at chunk boundaries.
//!
//! # Algorithm
//!
//! 1. Split text on blank lines (`\n\n`) and drop empty paragraphs.
//! 2. Accumulate paragraphs while `buffer + paragraph + 2 <= chunk_size`.
//! 3. When a paragraph does not fit, flush the buffer as a chunk, then:
//!    - if the paragraph alone exceeds `chunk_size`, split it on whitespace,
//!      carrying the last `max(overlap / 10, 5)` words into each following
//!      piece, and continue with an empty buffer;
//!    - otherwise start the new buffer with whole trailing sentences of the
//!      flushed chunk (at most `overlap` characters) followed by the paragraph.
//! 4. Flush whatever remains.
//!
//! Overlap is trimmed or dropped when keeping it would push a chunk past
//! `chunk_size`. The only chunks longer than `chunk_size` are single words
//! that are longer than `chunk_size` on their own.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", 1000, 200);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].index, 0);
//! assert_eq!(chunks[0].text, "Hello world.\n\nSecond paragraph.");
//! ```

use serde::Serialize;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SEPARATOR_LEN: usize = 2;
/// Lower bound on words carried between pieces of a split paragraph.
const MIN_CARRIED_WORDS: usize = 5;

/// Chunk size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkingParams {
    /// Parameters used when ingesting uploaded documents.
    pub const DOCUMENT: ChunkingParams = ChunkingParams {
        chunk_size: 800,
        overlap: 100,
    };

    /// Parameters used for ad-hoc chunking of arbitrary text.
    pub const ADHOC: ChunkingParams = ChunkingParams {
        chunk_size: 1000,
        overlap: 200,
    };

    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        chunk_text(text, self.chunk_size, self.overlap)
    }
}

/// One chunk of text with its position and character length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    pub size: usize,
}

/// Split `text` into overlapping, paragraph-aligned chunks.
///
/// Pure and deterministic: identical inputs always produce identical
/// output. Indices are contiguous `0..N-1`; blank input yields no chunks.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<TextChunk> {
    let mut pieces: Vec<String> = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0usize;

    let paragraphs = text
        .split(PARAGRAPH_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty());

    for paragraph in paragraphs {
        let paragraph_len = char_len(paragraph);

        if buffer_len + paragraph_len + SEPARATOR_LEN <= chunk_size {
            if !buffer.is_empty() {
                buffer.push_str(PARAGRAPH_SEPARATOR);
                buffer_len += SEPARATOR_LEN;
            }
            buffer.push_str(paragraph);
            buffer_len += paragraph_len;
            continue;
        }

        let flushed = std::mem::take(&mut buffer);
        buffer_len = 0;

        if paragraph_len > chunk_size {
            if !flushed.is_empty() {
                pieces.push(flushed);
            }
            pieces.extend(split_long_paragraph(paragraph, chunk_size, overlap));
            continue;
        }

        let prefix = overlap_prefix(&flushed, overlap);
        let prefix_len = char_len(&prefix);
        if !flushed.is_empty() {
            pieces.push(flushed);
        }
        if !prefix.is_empty() && prefix_len + SEPARATOR_LEN + paragraph_len <= chunk_size {
            buffer.push_str(&prefix);
            buffer.push_str(PARAGRAPH_SEPARATOR);
            buffer_len = prefix_len + SEPARATOR_LEN;
        }
        buffer.push_str(paragraph);
        buffer_len += paragraph_len;
    }

    if !buffer.is_empty() {
        pieces.push(buffer);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk {
            index,
            size: char_len(&text),
            text,
        })
        .collect()
}

/// Whole trailing sentences of `text` whose joined length fits `overlap`.
///
/// A chunk that is not longer than `overlap` contributes nothing; repeating
/// it in full would duplicate the previous chunk.
fn overlap_prefix(text: &str, overlap: usize) -> String {
    if char_len(text) <= overlap {
        return String::new();
    }

    let mut taken: Vec<&str> = Vec::new();
    let mut taken_len = 0usize;
    for sentence in split_sentences(text).into_iter().rev() {
        let sentence_len = char_len(sentence);
        let grown = if taken.is_empty() {
            sentence_len
        } else {
            taken_len + 1 + sentence_len
        };
        if grown > overlap {
            break;
        }
        taken.push(sentence);
        taken_len = grown;
    }

    taken.reverse();
    taken.join(" ")
}

/// Split on `.`, `!` or `?` followed by whitespace; the whitespace run is
/// consumed.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            sentences.push(&text[start..i]);
            let mut end = i + c.len_utf8();
            while let Some(&(j, w)) = chars.peek() {
                if !w.is_whitespace() {
                    break;
                }
                end = j + w.len_utf8();
                chars.next();
            }
            start = end;
            prev = None;
            continue;
        }
        prev = Some(c);
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences.retain(|s| !s.is_empty());
    sentences
}

/// Word-split a paragraph longer than `chunk_size`, carrying trailing words
/// of each piece into the next.
fn split_long_paragraph(paragraph: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let carry = (overlap / 10).max(MIN_CARRIED_WORDS);
    let mut pieces = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for word in paragraph.split_whitespace() {
        let word_len = char_len(word);
        let grown = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };

        if grown <= chunk_size || current.is_empty() {
            current.push(word);
            current_len = grown;
            continue;
        }

        pieces.push(current.join(" "));

        let keep_from = current.len().saturating_sub(carry);
        let mut carried: Vec<&str> = current.split_off(keep_from);
        while !carried.is_empty() && joined_len(&carried) + 1 + word_len > chunk_size {
            carried.remove(0);
        }
        current = carried;
        current.push(word);
        current_len = joined_len(&current);
    }

    if !current.is_empty() {
        pieces.push(current.join(" "));
    }
    pieces
}

fn joined_len(words: &[&str]) -> usize {
    if words.is_empty() {
        return 0;
    }
    words.iter().map(|w| char_len(w)).sum::<usize>() + words.len() - 1
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `count` sentences of exactly `each` characters, joined by spaces.
    fn sentences(count: usize, each: usize) -> String {
        (0..count)
            .map(|i| {
                let letter = (b'a' + (i % 26) as u8) as char;
                let mut s: String = std::iter::repeat(letter).take(each - 1).collect();
                s.push('.');
                s
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn words(count: usize) -> String {
        (0..count)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 1000, 200).is_empty());
        assert!(chunk_text("   \n\n  \n\n\t", 1000, 200).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 800, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].size, 13);
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\n\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text(text, 800, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].text,
            "First paragraph.\n\nSecond paragraph.\n\nThird paragraph."
        );
    }

    #[test]
    fn test_three_paragraphs_two_chunks_with_sentence_overlap() {
        let p1 = sentences(8, 49);
        let p2 = sentences(6, 49);
        let p3 = sentences(10, 49);
        assert_eq!((p1.len(), p2.len(), p3.len()), (399, 299, 499));

        let text = format!("{p1}\n\n{p2}\n\n{p3}");
        let chunks = chunk_text(&text, 1000, 200);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("{p1}\n\n{p2}"));
        assert_eq!(chunks[0].size, 700);

        let second = &chunks[1].text;
        let tail = format!("\n\n{p3}");
        assert!(second.ends_with(&tail));
        let overlap = &second[..second.len() - tail.len()];
        assert!(!overlap.is_empty());
        assert!(overlap.chars().count() <= 200);
        assert!(p2.ends_with(overlap), "overlap must be a tail of paragraph 2");
        assert_eq!(overlap.chars().count(), 199);
    }

    #[test]
    fn test_short_flushed_chunk_has_no_overlap() {
        let p1 = "Short one. Tiny.";
        let p2 = "x".repeat(30);
        let chunks = chunk_text(&format!("{p1}\n\n{p2}"), 40, 20);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, p2);
    }

    #[test]
    fn test_overlap_dropped_when_it_would_overflow() {
        let p1 = sentences(4, 10);
        let p2 = "y".repeat(45);
        let chunks = chunk_text(&format!("{p1}\n\n{p2}"), 50, 25);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, p2);
    }

    #[test]
    fn test_long_paragraph_alone_is_word_split() {
        let text = words(400);
        let chunks = chunk_text(&text, 100, 100);
        assert!(chunks.len() > 1);
        assert!(chunks[0].text.starts_with("word0 word1"));
        for c in &chunks {
            assert!(c.size <= 100, "chunk {} has size {}", c.index, c.size);
        }
        // 10 words carried (overlap / 10), but never fewer than 5.
        let first: Vec<&str> = chunks[0].text.split(' ').collect();
        let second: Vec<&str> = chunks[1].text.split(' ').collect();
        assert_eq!(&second[..10], &first[first.len() - 10..]);
    }

    #[test]
    fn test_long_paragraph_carries_at_least_five_words() {
        let text = words(200);
        let chunks = chunk_text(&text, 80, 0);
        let first: Vec<&str> = chunks[0].text.split(' ').collect();
        let second: Vec<&str> = chunks[1].text.split(' ').collect();
        assert_eq!(&second[..5], &first[first.len() - 5..]);
    }

    #[test]
    fn test_long_paragraph_after_buffer_flushes_buffer_first() {
        let intro = "Introduction paragraph.";
        let long = words(100);
        let outro = "Closing words.";
        let chunks = chunk_text(&format!("{intro}\n\n{long}\n\n{outro}"), 120, 50);
        assert_eq!(chunks[0].text, intro);
        assert!(chunks[1].text.starts_with("word0"));
        assert_eq!(chunks.last().map(|c| c.text.as_str()), Some(outro));
    }

    #[test]
    fn test_oversized_single_word_is_its_own_chunk() {
        let giant = "z".repeat(50);
        let text = format!("tiny {giant} end");
        let chunks = chunk_text(&text, 20, 0);
        assert!(chunks.iter().any(|c| c.text == giant));
        for c in &chunks {
            assert!(c.size <= 20 || c.text == giant);
        }
    }

    #[test]
    fn test_chunk_indices_contiguous_and_sizes_bounded() {
        let text = (0..60)
            .map(|i| format!("Paragraph number {i}. It has two sentences!"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text(&text, 150, 60);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i, "index mismatch at position {i}");
            assert!(c.size <= 150);
            assert_eq!(c.size, c.text.chars().count());
        }
    }

    #[test]
    fn test_paragraph_sequence_preserved() {
        let paragraphs: Vec<String> = (0..30)
            .map(|i| format!("Topic {i} explained in one sentence."))
            .collect();
        let chunks = chunk_text(&paragraphs.join("\n\n"), 120, 40);

        let mut cursor = 0usize;
        for chunk in &chunks {
            while cursor < paragraphs.len() && chunk.text.contains(&paragraphs[cursor]) {
                cursor += 1;
            }
        }
        assert_eq!(cursor, paragraphs.len(), "every paragraph appears, in order");
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘\n\nÜber café. Ñandú!";
        let chunks = chunk_text(text, 30, 10);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert_eq!(c.size, c.text.chars().count());
        }
    }

    #[test]
    fn test_deterministic() {
        let text = format!("Alpha.\n\n{}\n\nGamma. Delta!\n\n{}", words(80), sentences(9, 21));
        let c1 = chunk_text(&text, 90, 30);
        let c2 = chunk_text(&text, 90, 30);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_named_parameterizations() {
        assert_eq!(ChunkingParams::DOCUMENT.chunk_size, 800);
        assert_eq!(ChunkingParams::DOCUMENT.overlap, 100);
        assert_eq!(ChunkingParams::ADHOC.chunk_size, 1000);
        assert_eq!(ChunkingParams::ADHOC.overlap, 200);

        let text = sentences(30, 40);
        assert_eq!(ChunkingParams::ADHOC.chunk(&text), chunk_text(&text, 1000, 200));
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One. Two!  Three?\n\nFour"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
        assert_eq!(split_sentences("v1.2 is out"), vec!["v1.2 is out"]);
    }
}
