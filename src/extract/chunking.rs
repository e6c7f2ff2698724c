//! Text cleaning and overlapping word-window chunking

/// Collapses every whitespace run to a single space and trims the ends
///
/// Applied identically to every piece of extracted text.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits text into windows of `size` words starting every `size - overlap` words
///
/// The final window may be shorter. Empty input produces no chunks.
///
/// # Panics
///
/// Never; `overlap >= size` is treated as a step of one word. Configuration
/// validation rejects that case before it reaches here.
///
/// # Example
///
/// ```
/// use spider_walker::extract::chunk_words;
///
/// let chunks = chunk_words("a b c d e", 2, 1);
/// assert_eq!(chunks, vec!["a b", "b c", "c d", "d e", "e"]);
/// ```
pub fn chunk_words(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || size == 0 {
        return Vec::new();
    }

    let step = size.saturating_sub(overlap).max(1);

    (0..words.len())
        .step_by(step)
        .map(|start| {
            let end = (start + size).min(words.len());
            words[start..end].join(" ")
        })
        .collect()
}
