/// Returns at most `max_chars` characters of `content`, never splitting a
/// multi-byte character. Used to cap error details echoed to HTTP clients.
pub fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((byte_end, _)) => &content[..byte_end],
        None => content,
    }
}
