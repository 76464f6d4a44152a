//! Turning untrusted message text into safe HTML fragments.

use std::borrow::Cow;

use pulldown_cmark::{html, Options, Parser};

/// Escape all HTML-significant characters (`& < > " ' /`).
pub fn escape(text: &str) -> Cow<'_, str> {
    html_escape::encode_safe(text)
}

/// Plain text body: escaped, with line breaks kept as `<br>`.
pub fn plain_to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    escape(&normalized).replace('\n', "<br>")
}

/// HTML body: everything outside the allow-list is removed, including the
/// content of `script` and `style` elements.
pub fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

/// Markdown body rendered as CommonMark (no extensions), then sanitized.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::empty());
    let mut rendered = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut rendered, parser);
    sanitize_html(&rendered)
}
