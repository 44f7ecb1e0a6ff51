//! The per-request turn pipeline.
//!
//! `handle_inbound` runs once per platform message: gate, provision,
//! download, then acquire a worker or queue. `run_turn` owns a leased
//! worker and keeps serving — its own request first, then whatever the
//! atomic release handoff pulls from the queue — until the slot goes
//! idle. Recoverable failures stay inside the turn as a user-visible
//! reply or a log line; only driver death escapes, via the pool removing
//! the slot at release.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::acp::driver::{AgentDriver, TurnEvent};
use crate::acp::spawn;
use crate::pool::{Acquired, LeasedWorker};
use crate::router::PendingRequest;
use crate::stream::{FileSend, StreamAdaptor};
use crate::telegram::gateway::{Destination, ParseMode};
use crate::telegram::inbound::InboundMessage;
use crate::workspace;
use crate::{AppError, Result};

use super::AppContext;

/// Entry point for one platform message.
pub async fn handle_inbound(ctx: Arc<AppContext>, msg: InboundMessage) {
    let span = info_span!("inbound", user_id = msg.user_id, thread_id = msg.thread_id);

    async {
        // Gate first: an empty allowlist denies everyone.
        if !ctx.config.is_user_allowed(msg.user_id) {
            info!("sender not in allowlist");
            let text = format!("Access denied: user {} is not allowed.", msg.user_id);
            notify(&ctx, msg.destination(), &text).await;
            return;
        }

        let workspace = match workspace::provision(
            &ctx.config.workspace_base_path,
            msg.user_id,
            msg.thread_id,
        ) {
            Ok(dir) => dir,
            Err(err) => {
                warn!(%err, "workspace provisioning failed");
                notify(&ctx, msg.destination(), "Something went wrong, try again.").await;
                return;
            }
        };
        if let Err(err) = workspace::sync_templates(&ctx.config.agent_config_path, &workspace) {
            warn!(%err, "template sync failed");
        }

        let files = download_attachments(&ctx, &msg, &workspace).await;

        let text = msg
            .text
            .clone()
            .or_else(|| msg.caption.clone())
            .unwrap_or_default();

        let request = PendingRequest {
            thread_id: msg.thread_id,
            user_id: msg.user_id,
            text,
            files,
            chat_id: msg.chat_id,
            topic_id: msg.topic_id,
        };

        dispatch(ctx.clone(), request).await;
    }
    .instrument(span)
    .await;
}

/// Acquire-or-enqueue for one request.
async fn dispatch(ctx: Arc<AppContext>, request: PendingRequest) {
    let dest = destination_of(&request);
    match ctx.pool.acquire(request.thread_id).await {
        Acquired::Worker(lease) => run_turn(ctx, lease, request).await,
        Acquired::Busy => {
            // New message supplants any turn already running for this
            // thread; the cancel is a no-op when none is.
            ctx.inflight.cancel(request.thread_id).await;
            ctx.pool.enqueue(request).await;
        }
        Acquired::SpawnFailed(err) => {
            warn!(%err, "no worker could be started");
            notify(&ctx, dest, "The agent could not be started, try again shortly.").await;
        }
    }
}

/// Serve a leased worker until the release handoff runs dry.
pub async fn run_turn(ctx: Arc<AppContext>, mut lease: LeasedWorker, mut request: PendingRequest) {
    loop {
        let thread_id = request.thread_id;
        let cancel = ctx.inflight.track(thread_id).await;
        let mut session_id: Option<String> = None;

        let span = info_span!(
            "turn",
            thread_id,
            user_id = request.user_id,
            slot_id = lease.slot_id()
        );
        let outcome = serve_turn(&ctx, &mut lease, &request, &cancel, &mut session_id)
            .instrument(span)
            .await;

        if let Err(err) = outcome {
            report_turn_error(&ctx, &request, &err).await;
        }

        let handoff = ctx.pool.release(lease, session_id, thread_id).await;
        ctx.inflight.untrack(thread_id).await;

        match handoff {
            Some((next_lease, next_request)) => {
                lease = next_lease;
                request = next_request;
            }
            None => break,
        }
    }
}

/// One prompt/response cycle on an already-leased worker.
async fn serve_turn(
    ctx: &AppContext,
    lease: &mut LeasedWorker,
    request: &PendingRequest,
    cancel: &CancellationToken,
    session_out: &mut Option<String>,
) -> Result<()> {
    let workspace = workspace::provision(
        &ctx.config.workspace_base_path,
        request.user_id,
        request.thread_id,
    )?;
    let dest = destination_of(request);

    let session_id =
        match resolve_session(ctx, &mut lease.driver, request, &workspace, dest).await? {
            Some(session_id) => session_id,
            // Live lock holder elsewhere; the user was already told.
            None => return Ok(()),
        };
    *session_out = Some(session_id.clone());

    apply_model_preference(ctx, &mut lease.driver, request, &session_id).await;

    let content = build_prompt_content(request);
    let outcome = stream_prompt(ctx, &mut lease.driver, &session_id, content, dest, cancel).await?;

    let TurnOutcome::Completed(files) = outcome else {
        debug!("turn cancelled mid-stream");
        return Ok(());
    };

    deliver_files(
        ctx,
        &mut lease.driver,
        &workspace,
        &session_id,
        dest,
        cancel,
        files,
    )
    .await
}

/// Load the bound session or create a fresh one, handling the stale-lock
/// recovery path. Returns `None` when the turn must abort because a live
/// process still holds the session lock.
async fn resolve_session(
    ctx: &AppContext,
    driver: &mut AgentDriver,
    request: &PendingRequest,
    workspace: &Path,
    dest: Destination,
) -> Result<Option<String>> {
    let cwd = workspace.to_string_lossy();

    let Some(binding) = ctx.store.get(request.user_id, request.thread_id).await? else {
        let session_id = driver.session_new(&cwd).await?;
        ctx.store
            .upsert(request.user_id, request.thread_id, &session_id, workspace)
            .await?;
        info!(%session_id, "session created");
        return Ok(Some(session_id));
    };

    match driver.session_load(&binding.session_id, &cwd).await {
        Ok(()) => {
            debug!(session_id = %binding.session_id, "session loaded");
            Ok(Some(binding.session_id))
        }
        Err(AppError::SessionLocked { pid, message }) => {
            let holder_alive = pid.is_some_and(spawn::is_process_alive);
            if holder_alive {
                warn!(?pid, %message, "session lock held by a live process");
                notify(
                    ctx,
                    dest,
                    "This conversation is busy in another agent process; try again in a moment.",
                )
                .await;
                return Ok(None);
            }
            // Stale lock: the holder is gone, the session is unusable.
            info!(?pid, "stale session lock, rebinding");
            ctx.store.delete(request.user_id, request.thread_id).await?;
            let session_id = driver.session_new(&cwd).await?;
            ctx.store
                .upsert(request.user_id, request.thread_id, &session_id, workspace)
                .await?;
            Ok(Some(session_id))
        }
        Err(AppError::ConnectionLost(msg)) => Err(AppError::ConnectionLost(msg)),
        Err(err) => {
            warn!(%err, "session load failed, creating a replacement session");
            let session_id = driver.session_new(&cwd).await?;
            ctx.store
                .upsert(request.user_id, request.thread_id, &session_id, workspace)
                .await?;
            Ok(Some(session_id))
        }
    }
}

/// Apply a stored model preference; failures never abort the turn.
async fn apply_model_preference(
    ctx: &AppContext,
    driver: &mut AgentDriver,
    request: &PendingRequest,
    session_id: &str,
) {
    let model = ctx
        .store
        .get_model(request.user_id, request.thread_id)
        .await
        .unwrap_or_else(|_| "auto".to_owned());
    if model != "auto" {
        if let Err(err) = driver.session_set_model(session_id, &model).await {
            warn!(%err, model, "model selection failed");
        }
    }
}

enum TurnOutcome {
    Completed(Vec<FileSend>),
    Cancelled,
}

/// Run one prompt with a fresh adaptor, polling the cancel signal between
/// chunks.
async fn stream_prompt(
    ctx: &AppContext,
    driver: &mut AgentDriver,
    session_id: &str,
    content: Vec<Value>,
    dest: Destination,
    cancel: &CancellationToken,
) -> Result<TurnOutcome> {
    let mut adaptor = StreamAdaptor::new(Arc::clone(&ctx.gateway), dest);
    let mut turn = driver.session_prompt(session_id, content).await?;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                turn.cancel_and_drain().await;
                adaptor.cancel();
                return Ok(TurnOutcome::Cancelled);
            }
            event = turn.next_event() => match event? {
                TurnEvent::Chunk(text) => adaptor.push_chunk(&text).await,
                TurnEvent::Ended { stop_reason } => {
                    debug!(%stop_reason, "turn ended");
                    break;
                }
            }
        }
    }

    Ok(TurnOutcome::Completed(adaptor.finalize().await))
}

/// Validate and deliver requested files; missing ones earn a single
/// internal retry prompt for the whole turn.
async fn deliver_files(
    ctx: &AppContext,
    driver: &mut AgentDriver,
    workspace: &Path,
    session_id: &str,
    dest: Destination,
    cancel: &CancellationToken,
    files: Vec<FileSend>,
) -> Result<()> {
    let missing = send_existing(ctx, workspace, dest, files).await;
    if missing.is_empty() {
        return Ok(());
    }

    info!(?missing, "agent referenced missing files, retrying once");
    let retry_text = format!(
        "The files {} do not exist in the workspace. Create them (or correct \
         the paths) and send them again.",
        missing.join(", ")
    );
    let content = vec![text_block(&retry_text)];
    let outcome = stream_prompt(ctx, driver, session_id, content, dest, cancel).await?;

    if let TurnOutcome::Completed(files) = outcome {
        let still_missing = send_existing(ctx, workspace, dest, files).await;
        if !still_missing.is_empty() {
            warn!(?still_missing, "files still missing after retry, giving up");
        }
    }
    Ok(())
}

/// Send every file that validates and exists; return the paths that were
/// inside the workspace but absent. Escaping paths are dropped outright.
async fn send_existing(
    ctx: &AppContext,
    workspace: &Path,
    dest: Destination,
    files: Vec<FileSend>,
) -> Vec<String> {
    let mut missing = Vec::new();
    for file in files {
        let resolved = match workspace::contain_path(workspace, &file.path) {
            Ok(path) => path,
            Err(err) => {
                warn!(path = %file.path, %err, "file path rejected");
                continue;
            }
        };
        if !resolved.exists() {
            missing.push(file.path);
            continue;
        }
        let caption = if file.description.is_empty() {
            None
        } else {
            Some(file.description.as_str())
        };
        if let Err(err) = ctx.gateway.send_document(dest, &resolved, caption).await {
            warn!(path = %resolved.display(), %err, "document delivery failed");
        }
    }
    missing
}

/// Attachment downloads; failures drop the attachment with a warning.
async fn download_attachments(
    ctx: &AppContext,
    msg: &InboundMessage,
    workspace: &Path,
) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for (index, attachment) in msg.attachments.iter().enumerate() {
        let name = attachment
            .file_name
            .as_deref()
            .map(sanitize_file_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("attachment_{index}"));
        let dest_path = workspace.join(name);
        match ctx.gateway.download(&attachment.file_id, &dest_path).await {
            Ok(()) => {
                debug!(path = %dest_path.display(), "attachment downloaded");
                files.push(dest_path);
            }
            Err(err) => {
                warn!(file_id = %attachment.file_id, %err, "attachment download failed");
            }
        }
    }
    files
}

/// Keep only the final path component of a client-supplied file name.
fn sanitize_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One text content block for a prompt.
fn text_block(text: &str) -> Value {
    json!({ "type": "text", "text": text })
}

/// Prompt content: one block per downloaded file, then the user text.
fn build_prompt_content(request: &PendingRequest) -> Vec<Value> {
    let mut content = Vec::new();
    for file in &request.files {
        content.push(text_block(&format!(
            "The user uploaded a file, available at {}",
            file.display()
        )));
    }
    if !request.text.is_empty() {
        content.push(text_block(&request.text));
    }
    if content.is_empty() {
        content.push(text_block(""));
    }
    content
}

fn destination_of(request: &PendingRequest) -> Destination {
    Destination {
        chat_id: request.chat_id,
        topic_id: request.topic_id,
    }
}

/// Map a turn failure to what the user should see.
async fn report_turn_error(ctx: &AppContext, request: &PendingRequest, err: &AppError) {
    warn!(%err, thread_id = request.thread_id, "turn failed");
    let dest = destination_of(request);
    let text = match err {
        AppError::ConnectionLost(_) | AppError::Protocol(_) => {
            "The agent stopped unexpectedly; send your message again."
        }
        _ => "Something went wrong, try again.",
    };
    notify(ctx, dest, text).await;
}

async fn notify(ctx: &AppContext, dest: Destination, text: &str) {
    if let Err(err) = ctx.gateway.send_message(dest, text, ParseMode::Plain).await {
        warn!(%err, "user notification failed");
    }
}
