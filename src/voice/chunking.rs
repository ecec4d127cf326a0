//! Text chunking for speech synthesis
//!
//! Synthesis engines become unreliable on long inputs (truncation, silent
//! stalls). This module splits text into chunks that each fit within a
//! character limit, preferring sentence boundaries and falling back to word
//! boundaries for sentences that are too long on their own.

/// Default chunk size limit in characters
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 150;

/// Characters that end a sentence when followed by whitespace or end of text
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '|', '।', '॥'];

/// Playback status of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Not yet started
    Pending,
    /// Currently in flight
    Speaking,
    /// Finished successfully
    Done,
    /// Errored or timed out
    Failed,
}

/// One speakable piece of a longer text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position in the request; chunks are spoken in ascending order
    pub index: usize,
    /// Text to synthesize
    pub text: String,
    /// Playback status
    pub status: ChunkStatus,
}

impl TextChunk {
    /// Length in characters
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split `text` into chunks that each fit within `max_chars` characters.
///
/// When `max_chars` is 0, [`DEFAULT_MAX_CHUNK_CHARS`] is used. Whitespace runs
/// are collapsed to single spaces. A chunk only exceeds the limit when a
/// single word is longer than the limit on its own.
///
/// # Examples
///
/// ```
/// use astrova_voice::voice::split_text;
///
/// let chunks = split_text("Hello there. How are you?", 15);
/// assert_eq!(chunks, vec!["Hello there.", "How are you?"]);
/// ```
#[must_use]
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let limit = if max_chars == 0 {
        DEFAULT_MAX_CHUNK_CHARS
    } else {
        max_chars
    };

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        let sentence = sentence.split_whitespace().collect::<Vec<_>>().join(" ");
        if sentence.is_empty() {
            continue;
        }

        if sentence.chars().count() <= limit {
            push_piece(&sentence, limit, &mut chunks, &mut current);
            continue;
        }

        // Oversized sentence: start it on a fresh chunk, then go word by word
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        for word in sentence.split(' ') {
            push_piece(word, limit, &mut chunks, &mut current);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split `text` into indexed, pending [`TextChunk`]s
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<TextChunk> {
    split_text(text, max_chars)
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk {
            index,
            text,
            status: ChunkStatus::Pending,
        })
        .collect()
}

/// Append `piece` to the running chunk, closing it first if it would overflow
fn push_piece(piece: &str, limit: usize, chunks: &mut Vec<String>, current: &mut String) {
    if current.is_empty() {
        current.push_str(piece);
        return;
    }

    let needed = current.chars().count() + 1 + piece.chars().count();
    if needed <= limit {
        current.push(' ');
        current.push_str(piece);
    } else {
        chunks.push(std::mem::take(current));
        current.push_str(piece);
    }
}

/// Split on sentence terminators that are followed by whitespace or the end
/// of the text. Consecutive terminators ("?!", "...") stay with their sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !SENTENCE_TERMINATORS.contains(&c) {
            continue;
        }

        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            let closing = matches!(next, '"' | '\'' | ')' | '”' | '’');
            if SENTENCE_TERMINATORS.contains(&next) || closing {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }

        let at_boundary = chars.peek().is_none_or(|&(_, next)| next.is_whitespace());
        if at_boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_text("", 40).is_empty());
        assert!(split_text("   \n\t ", 40).is_empty());
    }

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(split_text("Hello.", 40), vec!["Hello."]);
    }

    #[test]
    fn zero_limit_uses_default() {
        let text = "word ".repeat(100);
        let chunks = split_text(&text, 0);
        assert!(chunks.iter().all(|c| c.chars().count() <= DEFAULT_MAX_CHUNK_CHARS));
        assert!(chunks.len() > 1);
    }

    #[test]
    fn hotel_welcome_splits_at_sentences_first() {
        let text = "Welcome to our hotel. How may I help you today? We offer room service, \
                    spa bookings, and concierge assistance.";
        let chunks = split_text(text, 40);

        assert_eq!(chunks[0], "Welcome to our hotel.");
        assert_eq!(chunks[1], "How may I help you today?");
        assert!(chunks[2].starts_with("We offer room service"));
        assert!(chunks.last().unwrap().ends_with("concierge assistance."));
        assert!(chunks.iter().all(|c| c.chars().count() <= 40), "{chunks:?}");
        assert_eq!(non_whitespace(&chunks.join(" ")), non_whitespace(text));
    }

    #[test]
    fn accumulates_short_sentences() {
        let chunks = split_text("One. Two. Three. Four.", 10);
        assert_eq!(chunks, vec!["One. Two.", "Three.", "Four."]);
    }

    #[test]
    fn oversized_word_stays_whole() {
        let long = "x".repeat(30);
        let text = format!("tiny {long} end");
        let chunks = split_text(&text, 10);
        assert!(chunks.contains(&long));
        for c in &chunks {
            if c.chars().count() > 10 {
                assert_eq!(c, &long);
            }
        }
    }

    #[test]
    fn devanagari_danda_ends_sentences() {
        let text = "नमस्ते। आप कैसे हैं? धन्यवाद।";
        let chunks = split_text(text, 12);
        assert_eq!(chunks[0], "नमस्ते।");
        assert_eq!(non_whitespace(&chunks.join(" ")), non_whitespace(text));
    }

    #[test]
    fn pipe_is_a_terminator() {
        let sentences = split_sentences("Room service | Spa | Concierge");
        assert_eq!(sentences, vec!["Room service |", "Spa |", "Concierge"]);
    }

    #[test]
    fn decimals_do_not_split() {
        let sentences = split_sentences("The rate is 3.5 thousand. Thanks!");
        assert_eq!(sentences, vec!["The rate is 3.5 thousand.", "Thanks!"]);
    }

    #[test]
    fn terminator_runs_and_quotes_stay_attached() {
        let sentences = split_sentences("Really?! \"Yes.\" Okay...");
        assert_eq!(sentences, vec!["Really?!", "\"Yes.\"", "Okay..."]);
    }

    #[test]
    fn preserves_content_and_bounds_across_limits() {
        let text = "The quick brown fox jumps over the lazy dog. Pack my box with five dozen \
                    liquor jugs! How vexingly quick daft zebras jump? Sphinx of black quartz, \
                    judge my vow.";
        for limit in [5, 12, 20, 33, 50, 80, 500] {
            let chunks = split_text(text, limit);
            assert!(!chunks.is_empty());
            assert!(chunks.iter().all(|c| !c.is_empty()));
            assert_eq!(non_whitespace(&chunks.join(" ")), non_whitespace(text), "limit {limit}");
            for c in &chunks {
                let single_word = !c.contains(' ');
                assert!(c.chars().count() <= limit || single_word, "limit {limit}: {c:?}");
            }
        }
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 6 chars, 18 bytes
        let text = "नमस्ते";
        assert_eq!(split_text(text, 6), vec![text]);
    }

    #[test]
    fn indexed_chunks_start_pending() {
        let chunks = chunk_text("First. Second.", 7);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
        assert!(chunks.iter().all(|c| c.status == ChunkStatus::Pending));
        assert_eq!(chunks[1].char_len(), 7);
    }
}
