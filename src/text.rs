use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::OnceLock;

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Strip markup from a provider snippet and return plain text.
///
/// Entities are decoded by the HTML parser, script/style contents are
/// dropped and whitespace is collapsed.
pub fn strip_html(fragment: &str) -> String {
    if !fragment.contains('<') && !fragment.contains('&') {
        return clean_text(fragment);
    }

    let document = Html::parse_fragment(fragment);
    let mut text_parts = Vec::new();
    collect_text(&document.root_element(), &mut text_parts);
    clean_text(&text_parts.join(""))
}

fn collect_text(element: &ElementRef, text_parts: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let tag_name = child_element.value().name();
            if tag_name == "script" || tag_name == "style" {
                continue;
            }
            // Line breaks separate words in snippets.
            if tag_name == "br" {
                text_parts.push(" ".to_string());
            }
            collect_text(&child_element, text_parts);
        } else if let Some(text_node) = child.value().as_text() {
            text_parts.push(text_node.text.to_string());
        }
    }
}

/// Collapse runs of whitespace and trim.
pub fn clean_text(text: &str) -> String {
    whitespace().replace_all(text, " ").trim().to_string()
}

/// Lower-cased, trimmed, inner whitespace collapsed. Used for blocked-word
/// comparison.
pub fn normalize_term(term: &str) -> String {
    clean_text(term).to_lowercase()
}

/// `None` for missing or blank image URLs.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
