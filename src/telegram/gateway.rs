//! Outbound Telegram primitives behind a mockable trait.
//!
//! Telegram has no first-class draft API; the streaming draft is emulated
//! with send-then-edit. The first `send_draft` for a `draft_id` posts a
//! message and records its id; later calls with the same id edit it in
//! place, which animates a single ephemeral message. A final
//! `send_message` in the same chat+topic deletes whatever draft messages
//! are still registered there, matching the platform contract that a
//! final message clears the draft.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ThreadId};
use tokio::sync::Mutex;
use tracing::debug;

/// Parse mode for an outbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// No entity parsing.
    Plain,
    /// Telegram HTML.
    Html,
}

/// Where a message goes: a chat, optionally a forum topic within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    /// Telegram chat id.
    pub chat_id: i64,
    /// Forum topic id, when the chat is a forum.
    pub topic_id: Option<i32>,
}

/// Failure modes of an outbound call, as far as callers care.
#[derive(Debug)]
pub enum SendError {
    /// The platform asked us to back off; retry no sooner than the hint.
    RateLimited {
        /// Suggested delay before the next attempt.
        retry_after: Duration,
    },
    /// The platform rejected the message's markup.
    BadMarkup(String),
    /// Anything else.
    Other(String),
}

impl Display for SendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited { retry_after } => {
                write!(f, "rate limited, retry after {retry_after:?}")
            }
            Self::BadMarkup(msg) => write!(f, "bad markup: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for SendError {}

/// Result of an outbound call.
pub type SendResult = std::result::Result<(), SendError>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound platform operations used by the stream adaptor and the turn
/// orchestrator.
pub trait Gateway: Send + Sync {
    /// Create or update the ephemeral draft `draft_id` in `dest`.
    fn send_draft<'a>(
        &'a self,
        dest: Destination,
        draft_id: i64,
        text: &'a str,
        mode: ParseMode,
    ) -> BoxFuture<'a, SendResult>;

    /// Send a final message, clearing any draft in the same chat+topic.
    fn send_message<'a>(
        &'a self,
        dest: Destination,
        text: &'a str,
        mode: ParseMode,
    ) -> BoxFuture<'a, SendResult>;

    /// Deliver a file from the workspace.
    fn send_document<'a>(
        &'a self,
        dest: Destination,
        path: &'a Path,
        caption: Option<&'a str>,
    ) -> BoxFuture<'a, SendResult>;

    /// Download an attachment into the workspace.
    fn download<'a>(&'a self, file_id: &'a str, dest_path: &'a Path) -> BoxFuture<'a, SendResult>;
}

// ── Teloxide implementation ──────────────────────────────────────────────────

/// Production [`Gateway`] backed by the Bot API.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
    /// Draft message ids: (chat, topic) → draft_id → posted message.
    drafts: Arc<Mutex<HashMap<Destination, HashMap<i64, MessageId>>>>,
}

impl TelegramGateway {
    /// Wrap a bot handle.
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            drafts: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn thread_of(dest: Destination) -> Option<ThreadId> {
    dest.topic_id.map(|id| ThreadId(MessageId(id)))
}

fn classify(err: &teloxide::RequestError) -> SendError {
    if let teloxide::RequestError::RetryAfter(seconds) = err {
        return SendError::RateLimited {
            retry_after: seconds.duration(),
        };
    }
    let text = err.to_string();
    if text.contains("can't parse entities") {
        SendError::BadMarkup(text)
    } else {
        SendError::Other(text)
    }
}

/// "message is not modified" comes back when a draft edit carries the same
/// text as before; for our purposes that edit succeeded.
fn is_not_modified(err: &teloxide::RequestError) -> bool {
    err.to_string().contains("message is not modified")
}

impl Gateway for TelegramGateway {
    fn send_draft<'a>(
        &'a self,
        dest: Destination,
        draft_id: i64,
        text: &'a str,
        mode: ParseMode,
    ) -> BoxFuture<'a, SendResult> {
        Box::pin(async move {
            let existing = {
                let drafts = self.drafts.lock().await;
                drafts.get(&dest).and_then(|m| m.get(&draft_id)).copied()
            };

            match existing {
                Some(message_id) => {
                    let mut edit =
                        self.bot
                            .edit_message_text(ChatId(dest.chat_id), message_id, text);
                    if mode == ParseMode::Html {
                        edit = edit.parse_mode(teloxide::types::ParseMode::Html);
                    }
                    match edit.await {
                        Ok(_) => Ok(()),
                        Err(err) if is_not_modified(&err) => Ok(()),
                        Err(err) => Err(classify(&err)),
                    }
                }
                None => {
                    let mut send = self.bot.send_message(ChatId(dest.chat_id), text);
                    if let Some(thread) = thread_of(dest) {
                        send = send.message_thread_id(thread);
                    }
                    if mode == ParseMode::Html {
                        send = send.parse_mode(teloxide::types::ParseMode::Html);
                    }
                    let message = send.await.map_err(|err| classify(&err))?;
                    self.drafts
                        .lock()
                        .await
                        .entry(dest)
                        .or_default()
                        .insert(draft_id, message.id);
                    Ok(())
                }
            }
        })
    }

    fn send_message<'a>(
        &'a self,
        dest: Destination,
        text: &'a str,
        mode: ParseMode,
    ) -> BoxFuture<'a, SendResult> {
        Box::pin(async move {
            let mut send = self.bot.send_message(ChatId(dest.chat_id), text);
            if let Some(thread) = thread_of(dest) {
                send = send.message_thread_id(thread);
            }
            if mode == ParseMode::Html {
                send = send.parse_mode(teloxide::types::ParseMode::Html);
            }
            send.await.map_err(|err| classify(&err))?;

            // A final message supersedes the draft.
            let stale = self.drafts.lock().await.remove(&dest);
            if let Some(stale) = stale {
                for (draft_id, message_id) in stale {
                    if let Err(err) = self
                        .bot
                        .delete_message(ChatId(dest.chat_id), message_id)
                        .await
                    {
                        debug!(draft_id, %err, "stale draft could not be deleted");
                    }
                }
            }
            Ok(())
        })
    }

    fn send_document<'a>(
        &'a self,
        dest: Destination,
        path: &'a Path,
        caption: Option<&'a str>,
    ) -> BoxFuture<'a, SendResult> {
        Box::pin(async move {
            let mut send = self
                .bot
                .send_document(ChatId(dest.chat_id), InputFile::file(PathBuf::from(path)));
            if let Some(thread) = thread_of(dest) {
                send = send.message_thread_id(thread);
            }
            if let Some(caption) = caption {
                send = send.caption(caption.to_owned());
            }
            send.await.map(|_| ()).map_err(|err| classify(&err))
        })
    }

    fn download<'a>(&'a self, file_id: &'a str, dest_path: &'a Path) -> BoxFuture<'a, SendResult> {
        Box::pin(async move {
            let file = self
                .bot
                .get_file(file_id.to_owned())
                .await
                .map_err(|err| classify(&err))?;
            let mut out = tokio::fs::File::create(dest_path)
                .await
                .map_err(|err| SendError::Other(format!("create {}: {err}", dest_path.display())))?;
            self.bot
                .download_file(&file.path, &mut out)
                .await
                .map_err(|err| SendError::Other(format!("download: {err}")))
        })
    }
}
