//! Inbound update handling and the command surface.
//!
//! Every Telegram message update is reduced to an [`InboundMessage`]; slash
//! commands are answered inline, anything else is handed to the turn
//! orchestrator on its own task.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{debug, warn};

use crate::orchestrator::{self, AppContext};
use crate::telegram::gateway::{Destination, ParseMode};

/// One downloadable attachment of an inbound message.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Platform file reference for the download call.
    pub file_id: String,
    /// Original file name, when the platform supplies one.
    pub file_name: Option<String>,
}

/// A normalized inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Chat the message arrived in.
    pub chat_id: i64,
    /// Forum topic id, when the chat is a forum.
    pub topic_id: Option<i32>,
    /// Routing key for sessions, affinity, and queueing: the topic id, or
    /// the chat id for plain (non-forum) chats.
    pub thread_id: i64,
    /// Sender id.
    pub user_id: i64,
    /// Message text, if any.
    pub text: Option<String>,
    /// Media caption, if any.
    pub caption: Option<String>,
    /// Attached documents and photos.
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    /// Reduce a raw Telegram message. Returns `None` for updates without an
    /// identifiable sender or without any usable content.
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        let user = msg.from.as_ref()?;
        let chat_id = msg.chat.id.0;
        let topic_id = msg.thread_id.map(|t| t.0 .0);
        let thread_id = topic_id.map_or(chat_id, i64::from);

        let mut attachments = Vec::new();
        if let Some(doc) = msg.document() {
            attachments.push(Attachment {
                file_id: doc.file.id.clone(),
                file_name: doc.file_name.clone(),
            });
        }
        if let Some(photos) = msg.photo() {
            // Telegram sends every resolution; the last one is the largest.
            if let Some(photo) = photos.last() {
                attachments.push(Attachment {
                    file_id: photo.file.id.clone(),
                    file_name: None,
                });
            }
        }

        let text = msg.text().map(str::to_owned);
        let caption = msg.caption().map(str::to_owned);
        if text.is_none() && caption.is_none() && attachments.is_empty() {
            return None;
        }

        Some(Self {
            chat_id,
            topic_id,
            thread_id,
            user_id: i64::try_from(user.id.0).ok()?,
            text,
            caption,
            attachments,
        })
    }

    /// The outbound destination for replies to this message.
    #[must_use]
    pub fn destination(&self) -> Destination {
        Destination {
            chat_id: self.chat_id,
            topic_id: self.topic_id,
        }
    }

    /// The slash command this message carries, if it is one.
    #[must_use]
    pub fn command(&self) -> Option<(&str, Option<&str>)> {
        let text = self.text.as_deref()?.trim();
        if !text.starts_with('/') {
            return None;
        }
        let mut parts = text.splitn(2, char::is_whitespace);
        let cmd = parts.next()?;
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());
        Some((cmd, arg))
    }
}

/// Run the long-polling dispatcher until ctrl-c.
pub async fn run_dispatcher(bot: Bot, ctx: Arc<AppContext>) {
    let handler = Update::filter_message().endpoint(handle_update);
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_update(_bot: Bot, msg: Message, ctx: Arc<AppContext>) -> ResponseResult<()> {
    let Some(inbound) = InboundMessage::from_message(&msg) else {
        return Ok(());
    };

    if let Some((cmd, arg)) = inbound.command() {
        let cmd = cmd.to_owned();
        let arg = arg.map(str::to_owned);
        handle_command(&ctx, &inbound, &cmd, arg.as_deref()).await;
        return Ok(());
    }

    // Every prompt runs as an independent task; the dispatcher must stay
    // responsive while turns stream for minutes.
    tokio::spawn(orchestrator::handle_inbound(Arc::clone(&ctx), inbound));
    Ok(())
}

async fn handle_command(ctx: &AppContext, msg: &InboundMessage, cmd: &str, arg: Option<&str>) {
    let dest = msg.destination();

    if !ctx.config.is_user_allowed(msg.user_id) {
        let text = format!("Access denied: user {} is not allowed.", msg.user_id);
        reply(ctx, dest, &text).await;
        return;
    }

    match cmd {
        "/start" => {
            reply(
                ctx,
                dest,
                "Send a message to talk to the agent. Each topic keeps its own \
                 session.\n\n/new — start a fresh session in this topic\n\
                 /model <name|auto> — pick the model for this topic",
            )
            .await;
        }
        "/new" => {
            match ctx.store.delete(msg.user_id, msg.thread_id).await {
                Ok(()) => reply(ctx, dest, "Session cleared. The next message starts fresh.").await,
                Err(err) => {
                    warn!(%err, "binding delete failed");
                    reply(ctx, dest, "Could not clear the session, try again.").await;
                }
            }
        }
        "/model" => match arg {
            Some(model) => match ctx.store.set_model(msg.user_id, msg.thread_id, model).await {
                Ok(()) => {
                    reply(ctx, dest, &format!("Model set to {model} for this topic.")).await;
                }
                Err(err) => {
                    warn!(%err, "model update failed");
                    reply(ctx, dest, "Could not store the model choice.").await;
                }
            },
            None => {
                let current = ctx
                    .store
                    .get_model(msg.user_id, msg.thread_id)
                    .await
                    .unwrap_or_else(|_| "auto".to_owned());
                reply(ctx, dest, &format!("Current model: {current}")).await;
            }
        },
        other => {
            debug!(command = other, "unknown command");
            reply(ctx, dest, "Unknown command. Try /start.").await;
        }
    }
}

async fn reply(ctx: &AppContext, dest: Destination, text: &str) {
    if let Err(err) = ctx.gateway.send_message(dest, text, ParseMode::Plain).await {
        warn!(%err, "command reply failed");
    }
}
