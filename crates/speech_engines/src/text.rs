//! Splitting long text into engine-sized chunks
//!
//! Chunks end at sentence terminators where possible. A single sentence
//! longer than the limit is cut at the limit, never inside a character.

const TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？', '．', '\n'];

/// Unit an engine's text limit is expressed in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LengthUnit {
    /// Unicode scalar values
    #[default]
    Chars,
    /// UTF-8 encoded bytes
    Bytes,
}

impl LengthUnit {
    const fn of_char(self, c: char) -> usize {
        match self {
            Self::Chars => 1,
            Self::Bytes => c.len_utf8(),
        }
    }

    /// Length of `text` in this unit
    #[must_use]
    pub fn measure(self, text: &str) -> usize {
        match self {
            Self::Chars => text.chars().count(),
            Self::Bytes => text.len(),
        }
    }
}

/// Split `text` into chunks no longer than `max_len`, measured in `unit`
///
/// Returns the trimmed text as a single chunk when it already fits. Empty
/// chunks are never produced. A `max_len` of zero disables splitting.
#[must_use]
pub fn split_for_engine(text: &str, max_len: usize, unit: LengthUnit) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if max_len == 0 || unit.measure(text) <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences(text) {
        let sentence_len = unit.measure(sentence);

        if current_len + sentence_len > max_len && current_len > 0 {
            push_chunk(&mut chunks, &current);
            current.clear();
            current_len = 0;
        }

        if sentence_len > max_len {
            for piece in hard_split(sentence, max_len, unit) {
                push_chunk(&mut chunks, &piece);
            }
            continue;
        }

        current.push_str(sentence);
        current_len += sentence_len;
    }

    push_chunk(&mut chunks, &current);
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    let chunk = chunk.trim();
    if !chunk.is_empty() {
        chunks.push(chunk.to_string());
    }
}

/// Sentences including their terminator
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let end = rest
            .char_indices()
            .find(|(_, c)| TERMINATORS.contains(c))
            .map_or(rest.len(), |(i, c)| i + c.len_utf8());
        let (sentence, tail) = rest.split_at(end);
        rest = tail;
        Some(sentence)
    })
}

fn hard_split(sentence: &str, max_len: usize, unit: LengthUnit) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut piece_len = 0;

    for c in sentence.chars() {
        let len = unit.of_char(c);
        if piece_len + len > max_len && !piece.is_empty() {
            pieces.push(std::mem::take(&mut piece));
            piece_len = 0;
        }
        piece.push(c);
        piece_len += len;
    }

    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}
