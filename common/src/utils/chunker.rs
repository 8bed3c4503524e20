//! Sentence-aligned text chunking for embedding and indexing.
//!
//! Lengths are measured in characters, not bytes, so CJK text gets the same
//! budget as ASCII text.

const SENTENCE_TERMINATORS: [char; 7] = ['。', '？', '！', '.', '!', '?', '\n'];

/// Splits `text` into chunks of at most `max_chars` characters.
///
/// Sentences are packed greedily and joined with a single space. A sentence
/// longer than `max_chars` is emitted on its own and never split further.
/// Empty or whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let sentence_len = char_len(sentence);

        if sentence_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            chunks.push(sentence.to_string());
            continue;
        }

        if current.is_empty() {
            current.push_str(sentence);
            current_len = sentence_len;
        } else if current_len
            .saturating_add(sentence_len)
            .saturating_add(1)
            > max_chars
        {
            chunks.push(std::mem::replace(&mut current, sentence.to_string()));
            current_len = sentence_len;
        } else {
            current.push(' ');
            current.push_str(sentence);
            current_len = current_len.saturating_add(sentence_len).saturating_add(1);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Cuts after every terminator, trimming the pieces and dropping empty ones.
fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;

    for (idx, ch) in text.char_indices() {
        if SENTENCE_TERMINATORS.contains(&ch) {
            let end = idx.saturating_add(ch.len_utf8());
            pieces.push(text.get(start..end).unwrap_or_default());
            start = end;
        }
    }
    pieces.push(text.get(start..).unwrap_or_default());

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
