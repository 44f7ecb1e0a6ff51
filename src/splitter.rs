//! Size-bounded segmentation of Telegram HTML.
//!
//! Telegram rejects messages over 4096 characters and rejects any message
//! whose HTML is unbalanced, so a split point that lands inside markup
//! needs repair. The two tag families behave differently:
//!
//! - **inline** tags (`b`, `i`, `u`, `s`, `code`, `a`) are short; the split
//!   backtracks to just before the opening tag so the whole element moves
//!   to the next segment,
//! - **block** tags (`pre`, `blockquote`) can exceed a segment on their
//!   own; they are closed at the split and reopened at the start of the
//!   next segment.
//!
//! Concatenating all segments minus the inserted close/reopen pairs yields
//! the input exactly.

use std::sync::LazyLock;

use regex::Regex;

/// Hard per-message size bound.
pub const MAX_SEGMENT: usize = 4096;

/// How far back from the hard bound a newline is preferred as the split.
const NEWLINE_LOOKBACK: usize = 200;

/// Reserved room for closing tags appended at a split.
const CLOSE_HEADROOM: usize = 64;

#[allow(clippy::expect_used)]
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)[^>]*>").expect("static regex"));

/// Tag families with distinct split behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Backtracked whole to the next segment.
    Inline,
    /// Closed at the split and reopened in the next segment.
    Block,
}

/// Classify a tag name.
#[must_use]
pub fn tag_kind(name: &str) -> TagKind {
    match name {
        "pre" | "blockquote" => TagKind::Block,
        _ => TagKind::Inline,
    }
}

/// An element still open at some position, outermost first.
#[derive(Debug, Clone)]
struct OpenTag {
    name: String,
    kind: TagKind,
    /// Byte offset of the opening tag in the scanned fragment.
    offset: usize,
    /// Verbatim opening tag text, reused when reopening.
    raw: String,
}

/// Compute the open-tag stack of `fragment`.
fn open_tags(fragment: &str) -> Vec<OpenTag> {
    let mut stack: Vec<OpenTag> = Vec::new();
    for caps in TAG_RE.captures_iter(fragment) {
        let closing = &caps[1] == "/";
        let name = caps[2].to_lowercase();
        if closing {
            if let Some(pos) = stack.iter().rposition(|t| t.name == name) {
                stack.remove(pos);
            }
        } else if let Some(whole) = caps.get(0) {
            stack.push(OpenTag {
                kind: tag_kind(&name),
                name,
                offset: whole.start(),
                raw: whole.as_str().to_owned(),
            });
        }
    }
    stack
}

/// Largest char boundary at or below `idx`.
fn floor_boundary(s: &str, idx: usize) -> usize {
    let mut idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Walk `idx` back until it is a char boundary outside any tag or entity.
fn safe_boundary(s: &str, idx: usize) -> usize {
    let mut boundary = floor_boundary(s, idx);
    while boundary > 0 {
        let bytes = &s.as_bytes()[..boundary];
        let last_open = bytes.iter().rposition(|&b| b == b'<');
        let last_close = bytes.iter().rposition(|&b| b == b'>');
        let inside_tag = match (last_open, last_close) {
            (Some(lt), Some(gt)) => lt > gt,
            (Some(_), None) => true,
            _ => false,
        };
        let last_amp = bytes.iter().rposition(|&b| b == b'&');
        let last_semi = bytes.iter().rposition(|&b| b == b';');
        let inside_entity = match (last_amp, last_semi) {
            (Some(amp), Some(semi)) => amp > semi,
            (Some(_), None) => true,
            _ => false,
        };
        if !inside_tag && !inside_entity {
            break;
        }
        boundary = floor_boundary(s, boundary - 1);
    }
    boundary
}

/// Split `html` into segments of at most [`MAX_SEGMENT`] bytes.
#[must_use]
pub fn split_html(html: &str) -> Vec<String> {
    split_html_with_limit(html, MAX_SEGMENT)
}

/// Split `html` into balanced segments of at most `limit` bytes.
#[must_use]
pub fn split_html_with_limit(html: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(CLOSE_HEADROOM * 2);
    let mut segments = Vec::new();
    let mut reopen = String::new();
    let mut rest = html.to_owned();

    loop {
        let source = format!("{reopen}{rest}");
        if source.len() <= limit {
            segments.push(source);
            break;
        }

        let hard = safe_boundary(&source, limit - CLOSE_HEADROOM);

        // Prefer a newline near the bound so segments break between lines.
        let lookback_floor = hard.saturating_sub(NEWLINE_LOOKBACK);
        let mut cut = source[..hard]
            .rfind('\n')
            .filter(|&p| p + 1 > lookback_floor)
            .map_or(hard, |p| p + 1);

        let mut stack = open_tags(&source[..cut]);

        // Backtrack past inline elements so they move whole. Offsets
        // strictly decrease, and the reopen prefix only ever holds block
        // tags, so this terminates.
        while let Some(inline) = stack.iter().find(|t| t.kind == TagKind::Inline) {
            if inline.offset <= reopen.len() {
                // An inline element larger than a whole segment cannot be
                // moved; close and reopen it like a block tag.
                break;
            }
            cut = inline.offset;
            stack = open_tags(&source[..cut]);
        }

        if cut <= reopen.len() {
            // No usable break below the bound; fall back to the hard cut
            // and repair whatever is open there.
            cut = hard;
            stack = open_tags(&source[..cut]);
        }

        let mut segment = source[..cut].to_owned();
        for tag in stack.iter().rev() {
            segment.push_str("</");
            segment.push_str(&tag.name);
            segment.push('>');
        }
        segments.push(segment);

        reopen = stack.iter().map(|t| t.raw.as_str()).collect();
        rest = source[cut..].to_owned();
    }

    segments
}
