//! Markdown to Telegram HTML conversion.
//!
//! The agent speaks a common lightweight-markup dialect (fenced code,
//! inline code, bold, italic, strike, links, headings, blockquotes,
//! lists); Telegram accepts a small HTML tag set (`<b>`, `<i>`, `<u>`,
//! `<s>`, `<code>`, `<pre>`, `<a>`, `<blockquote>`).
//!
//! Code regions are lifted out into placeholders before any other
//! transform so nothing inside them is escaped twice or misread as
//! formatting, then restored at the end.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```(\w*)\n?([\s\S]*?)```").expect("static regex"));
#[allow(clippy::expect_used)]
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("static regex"));
#[allow(clippy::expect_used)]
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("static regex"));
#[allow(clippy::expect_used)]
static UNDERLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__(.+?)__").expect("static regex"));
#[allow(clippy::expect_used)]
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.+?)~~").expect("static regex"));
#[allow(clippy::expect_used)]
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([^*]|^)\*([^*\n]+)\*([^*]|$)").expect("static regex"));
#[allow(clippy::expect_used)]
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("static regex"));
#[allow(clippy::expect_used)]
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").expect("static regex"));
#[allow(clippy::expect_used)]
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^(\s*)[-*]\s+").expect("static regex"));

/// Escape `&`, `<`, `>` and `"` for Telegram HTML text and attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Convert agent markdown to Telegram HTML.
#[must_use]
pub fn markdown_to_html(md: &str) -> String {
    // Lift code regions out first; the placeholder bytes never occur in
    // agent output and survive escaping untouched.
    let mut protected: Vec<String> = Vec::new();

    let text = FENCE.replace_all(md, |caps: &regex::Captures<'_>| {
        let code = escape_html(caps[2].trim_end_matches('\n'));
        let marker = format!("\u{1}{}\u{1}", protected.len());
        protected.push(format!("<pre>{code}</pre>"));
        marker
    });

    let text = INLINE_CODE.replace_all(&text, |caps: &regex::Captures<'_>| {
        let code = escape_html(&caps[1]);
        let marker = format!("\u{1}{}\u{1}", protected.len());
        protected.push(format!("<code>{code}</code>"));
        marker
    });

    let text = escape_html(&text);

    let text = BOLD.replace_all(&text, "<b>$1</b>");
    let text = UNDERLINE.replace_all(&text, "<u>$1</u>");
    let text = STRIKE.replace_all(&text, "<s>$1</s>");
    let text = ITALIC.replace_all(&text, "$1<i>$2</i>$3");
    let text = LINK.replace_all(&text, |caps: &regex::Captures<'_>| {
        let label = &caps[1];
        let url = &caps[2];
        // Only safe schemes become anchors; anything else renders inline.
        // The url is already escaped, and none of these prefixes contain
        // escapable characters, so the check holds post-escape.
        if url.starts_with("http://")
            || url.starts_with("https://")
            || url.starts_with("tg://")
            || url.starts_with("mailto:")
        {
            format!("<a href=\"{url}\">{label}</a>")
        } else {
            format!("{label} ({url})")
        }
    });
    let text = HEADING.replace_all(&text, "<b>$1</b>");
    let text = BULLET.replace_all(&text, "$1\u{2022} ");

    let text = wrap_blockquotes(&text);

    let mut out = text;
    for (i, block) in protected.iter().enumerate() {
        out = out.replace(&format!("\u{1}{i}\u{1}"), block);
    }
    out
}

/// Group consecutive `> `-prefixed lines into one `<blockquote>` element.
///
/// Runs after escaping, so the marker to look for is `&gt;`.
fn wrap_blockquotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Vec<&str> = Vec::new();

    let flush = |out: &mut String, quote: &mut Vec<&str>| {
        if quote.is_empty() {
            return;
        }
        let _ = write!(out, "<blockquote>{}</blockquote>\n", quote.join("\n"));
        quote.clear();
    };

    for line in text.split_inclusive('\n') {
        let (body, had_newline) = match line.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (line, false),
        };
        if let Some(rest) = body.strip_prefix("&gt;") {
            quote.push(rest.strip_prefix(' ').unwrap_or(rest));
            if !had_newline {
                flush(&mut out, &mut quote);
            }
        } else {
            flush(&mut out, &mut quote);
            out.push_str(body);
            if had_newline {
                out.push('\n');
            }
        }
    }
    flush(&mut out, &mut quote);

    // flush appends a trailing newline after each blockquote; drop one that
    // the source never had.
    if out.ends_with('\n') && !text.ends_with('\n') {
        out.pop();
    }
    out
}
