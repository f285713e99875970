/// Discord's message character limit.
pub const DISCORD_CHAR_LIMIT: usize = 2000;

/// Split text into pieces of at most `max_len` bytes, prioritizing splits at
/// paragraph breaks, then sentence ends, then spaces.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for paragraph in text.split('\n') {
        if current.len() + paragraph.len() + 1 > max_len {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }

            let mut rest = paragraph;
            while rest.len() > max_len {
                let cut = hard_cut(rest, max_len);
                let head = &rest[..cut];
                let split_at = head
                    .rfind('.')
                    .map(|i| i + 1)
                    .or_else(|| head.rfind(' ').map(|i| i + 1))
                    .unwrap_or(cut);
                pieces.push(rest[..split_at].trim().to_string());
                rest = rest[split_at..].trim_start();
            }
            current = rest.to_string();
        } else if current.is_empty() {
            current = paragraph.to_string();
        } else {
            current.push('\n');
            current.push_str(paragraph);
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Largest char-boundary index not exceeding `max`, but at least one char.
fn hard_cut(s: &str, max: usize) -> usize {
    let mut index = max.min(s.len());
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    if index == 0 {
        index = s.chars().next().map(char::len_utf8).unwrap_or(0);
    }
    index
}
