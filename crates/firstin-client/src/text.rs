//! Plain-text extraction for job descriptions.

use scraper::Html;

/// Convert an HTML or HTML-encoded string to plain text.
///
/// Greenhouse double-encodes its content field (the JSON string holds
/// entity-escaped HTML like `&lt;p&gt;`). One parse pass decodes entities;
/// if that reveals markup, a second pass strips the revealed tags. Real HTML
/// is flattened by the first pass alone.
pub(crate) fn extract_text(content: &str) -> String {
    let first = html_to_text(content);
    if first.contains('<') {
        html_to_text(&first)
    } else {
        first
    }
}

fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let joined = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}
