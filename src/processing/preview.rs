use scraper::{Html, Node};

/// Elements whose text never belongs in a preview.
const SKIPPED_ELEMENTS: [&str; 6] = ["script", "style", "noscript", "template", "svg", "iframe"];

/// Extracts the visible text of an HTML document with whitespace collapsed.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut words: Vec<&str> = Vec::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| SKIPPED_ELEMENTS.contains(&element.name()))
        });
        if hidden {
            continue;
        }
        words.extend(text.split_whitespace());
    }

    words.join(" ")
}

/// Truncates `text` to at most `max_chars` characters without splitting a
/// character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Visible page text bounded to `max_chars` characters.
pub fn extract_preview(html: &str, max_chars: usize) -> String {
    truncate_chars(&extract_text(html), max_chars).to_string()
}
