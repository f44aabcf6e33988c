//! Line-packing text chunker.

/// Split `text` into chunks of at most `max_len` bytes where possible.
///
/// Lines are trimmed and empty lines dropped; the rest are packed greedily
/// and joined with `\n`. A single line longer than `max_len` becomes its own
/// chunk rather than being cut mid-sentence.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buf = String::new();

    for line in text.split('\n').map(str::trim).filter(|l| !l.is_empty()) {
        if !buf.is_empty() && buf.len() + line.len() + 1 > max_len {
            chunks.push(std::mem::take(&mut buf));
        }
        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(line);
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }
    chunks
}
