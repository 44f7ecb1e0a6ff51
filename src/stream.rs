//! Stream adaptor: incremental agent output → one Telegram response.
//!
//! One adaptor serves one outbound response. While the turn streams, the
//! accumulated buffer is mirrored into a single editable draft message —
//! a sliding window of the tail, throttled so the platform sees at most
//! ten edits a second. Draft traffic is cosmetic: every error there is
//! swallowed. On turn end the buffer becomes the real response: file-send
//! tags are stripped first, the remainder is converted to Telegram HTML
//! and sent in size-bounded segments.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::markup;
use crate::splitter;
use crate::telegram::gateway::{Destination, Gateway, ParseMode, SendError};

/// Sliding-window size for draft updates.
pub const DRAFT_WINDOW: usize = 4000;

/// Minimum spacing between draft edits.
pub const DRAFT_INTERVAL: Duration = Duration::from_millis(100);

#[allow(clippy::expect_used)]
static SEND_FILE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?s)<send_file\s+path="([^"]+)"[^>]*>(.*?)</send_file>"#).expect("static regex"));

/// A file the agent asked the gateway to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSend {
    /// Path as written by the agent; validated against the workspace
    /// before anything is sent.
    pub path: String,
    /// Tag body, used as the document caption.
    pub description: String,
}

/// Pull all `<send_file>` tags out of `text`, returning the remaining
/// text and the collected (path, description) pairs.
#[must_use]
pub fn extract_file_tags(text: &str) -> (String, Vec<FileSend>) {
    let mut files = Vec::new();
    for caps in SEND_FILE_RE.captures_iter(text) {
        files.push(FileSend {
            path: caps[1].to_owned(),
            description: caps[2].trim().to_owned(),
        });
    }
    let stripped = SEND_FILE_RE.replace_all(text, "").into_owned();
    (stripped, files)
}

/// Accumulates one response and mirrors it into a draft while streaming.
pub struct StreamAdaptor {
    gateway: Arc<dyn Gateway>,
    dest: Destination,
    draft_id: i64,
    buffer: String,
    last_draft_at: Option<Instant>,
    cancelled: bool,
}

impl StreamAdaptor {
    /// Create an adaptor with a fresh random positive draft id.
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>, dest: Destination) -> Self {
        Self {
            gateway,
            dest,
            draft_id: rand::random_range(1..=i64::MAX),
            buffer: String::new(),
            last_draft_at: None,
            cancelled: false,
        }
    }

    /// The draft id this response animates.
    #[must_use]
    pub fn draft_id(&self) -> i64 {
        self.draft_id
    }

    /// Accumulated buffer. Test observability.
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Append a streamed chunk and maybe refresh the draft.
    ///
    /// At most one draft edit goes out per [`DRAFT_INTERVAL`]; a throttled
    /// chunk only grows the buffer. A rate-limit reply pushes the next
    /// attempt past the hinted delay. All other draft errors are logged
    /// and swallowed. After [`StreamAdaptor::cancel`] this is a no-op.
    pub async fn push_chunk(&mut self, text: &str) {
        if self.cancelled {
            return;
        }
        self.buffer.push_str(text);

        let now = Instant::now();
        if let Some(last) = self.last_draft_at {
            if now.duration_since(last) < DRAFT_INTERVAL {
                return;
            }
        }

        let window = self.window();
        match self
            .gateway
            .send_draft(self.dest, self.draft_id, &window, ParseMode::Plain)
            .await
        {
            Ok(()) => self.last_draft_at = Some(now),
            Err(SendError::RateLimited { retry_after }) => {
                debug!(?retry_after, "draft rate limited");
                self.last_draft_at = Some(now + retry_after);
            }
            Err(err) => {
                // Drafts are cosmetic.
                debug!(%err, "draft update failed");
                self.last_draft_at = Some(now);
            }
        }
    }

    /// Stop producing output. The last partial draft is left standing —
    /// better a stale tail than an ellipsis nothing ever replaces.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Whether [`StreamAdaptor::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Finish the response: strip file tags, convert, split, send.
    ///
    /// Returns the file-send requests collected from the buffer. An empty
    /// buffer (or a cancelled adaptor) sends nothing.
    pub async fn finalize(self) -> Vec<FileSend> {
        if self.cancelled || self.buffer.is_empty() {
            return Vec::new();
        }

        // One last draft; the final message that follows replaces it.
        if let Err(err) = self
            .gateway
            .send_draft(self.dest, self.draft_id, "\u{2026}", ParseMode::Plain)
            .await
        {
            debug!(%err, "closing draft update failed");
        }

        // Tags must go before markup conversion — their bodies are not
        // user-facing text.
        let (text, files) = extract_file_tags(&self.buffer);

        let text = text.trim();
        if !text.is_empty() {
            let html = markup::markdown_to_html(text);
            for segment in splitter::split_html(&html) {
                self.send_segment(&segment).await;
            }
        }

        files
    }

    async fn send_segment(&self, segment: &str) {
        match self
            .gateway
            .send_message(self.dest, segment, ParseMode::Html)
            .await
        {
            Ok(()) => {}
            Err(SendError::BadMarkup(msg)) => {
                warn!(%msg, "segment rejected as HTML, retrying as plain text");
                if let Err(err) = self
                    .gateway
                    .send_message(self.dest, segment, ParseMode::Plain)
                    .await
                {
                    warn!(%err, "plain-text retry failed, segment dropped");
                }
            }
            Err(SendError::RateLimited { retry_after }) => {
                debug!(?retry_after, "final send rate limited, waiting once");
                tokio::time::sleep(retry_after).await;
                if let Err(err) = self
                    .gateway
                    .send_message(self.dest, segment, ParseMode::Html)
                    .await
                {
                    warn!(%err, "post-backoff send failed, segment dropped");
                }
            }
            Err(err) => {
                warn!(%err, "final send failed, segment dropped");
            }
        }
    }

    /// The visible draft window: the whole buffer while it fits, else an
    /// ellipsis line plus the trailing [`DRAFT_WINDOW`] bytes.
    fn window(&self) -> String {
        if self.buffer.len() <= DRAFT_WINDOW {
            return self.buffer.clone();
        }
        let mut start = self.buffer.len() - DRAFT_WINDOW;
        while !self.buffer.is_char_boundary(start) {
            start += 1;
        }
        format!("\u{2026}\n{}", &self.buffer[start..])
    }
}
