//! ACP driver — one subprocess, one protocol state machine.
//!
//! The driver owns the agent's stdio. A writer task serialises outbound
//! frames from an [`mpsc`] channel onto stdin; a reader task demultiplexes
//! stdout into three routes:
//!
//! - responses are delivered to the pending caller via a map of
//!   request id → one-shot channel,
//! - `session/request_permission` requests are answered inline so the agent
//!   never blocks waiting for a reply,
//! - `session/update` notifications are queued for the prompt consumer.
//!
//! Requests are serialized by the caller (one outstanding prompt per
//! worker), so all typed operations take `&mut self`. On process exit or a
//! fatal wire violation the driver transitions to [`DriverState::Dead`],
//! every pending waiter resolves with `ConnectionLost`, and the pool removes
//! the slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acp::codec::FrameCodec;
use crate::acp::spawn::{self, AgentProcess, SpawnConfig};
use crate::acp::wire::{self, InboundFrame, RpcError, SessionUpdate};
use crate::{AppError, Result};

/// Bound on the initialize exchange.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);
/// Bound on session/new and session/load; the agent may cold-start its own
/// storage on these.
const SESSION_TIMEOUT: Duration = Duration::from_secs(60);
/// Bound on session/set_model.
const SET_MODEL_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on the agent acknowledging a cancelled prompt.
const CANCEL_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Driver lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Spawned, initialize not yet exchanged.
    Idle,
    /// Initialize in flight.
    Initializing,
    /// Initialized, no prompt outstanding.
    Ready,
    /// A prompt is in flight.
    Busy,
    /// Process exited or the wire is broken. Terminal.
    Dead,
}

/// Events surfaced to the prompt consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// Incremental agent text.
    Chunk(String),
    /// The turn completed.
    Ended {
        /// Agent-reported stop reason, e.g. `end_turn` or `cancelled`.
        stop_reason: String,
    },
}

/// A `session/update` routed to the notification queue.
#[derive(Debug)]
struct Notification {
    session_id: Option<String>,
    update: SessionUpdate,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, RpcError>>>>>;

/// Driver for one agent subprocess.
#[derive(Debug)]
pub struct AgentDriver {
    label: String,
    state: DriverState,
    next_id: u64,
    writer_tx: mpsc::Sender<Value>,
    notif_rx: mpsc::UnboundedReceiver<Notification>,
    pending: PendingMap,
    dead: Arc<AtomicBool>,
    turn_cancelled: Arc<AtomicBool>,
    server_capabilities: Option<Value>,
    process: Option<AgentProcess>,
    cancel: CancellationToken,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl AgentDriver {
    /// Spawn the agent subprocess and attach a driver to its stdio.
    ///
    /// The driver starts in [`DriverState::Idle`]; call
    /// [`AgentDriver::initialize`] before any session operation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the subprocess cannot be started.
    pub fn connect(config: &SpawnConfig) -> Result<Self> {
        let (process, stdin, stdout) = spawn::spawn_agent(config)?;
        Ok(Self::attach(
            config.program.clone(),
            stdout,
            stdin,
            Some(process),
        ))
    }

    /// Attach a driver to arbitrary streams. Used by [`Self::connect`] and
    /// by tests driving the protocol over in-memory duplex pipes.
    pub fn from_streams<R, W>(label: impl Into<String>, stdout: R, stdin: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::attach(label.into(), stdout, stdin, None)
    }

    fn attach<R, W>(label: String, stdout: R, stdin: W, process: Option<AgentProcess>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer_tx, writer_rx) = mpsc::channel::<Value>(64);
        let (notif_tx, notif_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let dead = Arc::new(AtomicBool::new(false));
        let turn_cancelled = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let writer_task = tokio::spawn(run_writer(
            label.clone(),
            stdin,
            writer_rx,
            Arc::clone(&dead),
            cancel.clone(),
        ));
        let reader_task = tokio::spawn(run_reader(
            label.clone(),
            stdout,
            writer_tx.clone(),
            notif_tx,
            Arc::clone(&pending),
            Arc::clone(&dead),
            Arc::clone(&turn_cancelled),
            cancel.clone(),
        ));

        Self {
            label,
            state: DriverState::Idle,
            next_id: 1,
            writer_tx,
            notif_rx,
            pending,
            dead,
            turn_cancelled,
            server_capabilities: None,
            process,
            cancel,
            reader_task,
            writer_task,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        if self.dead.load(Ordering::SeqCst) {
            DriverState::Dead
        } else {
            self.state
        }
    }

    /// Whether the wire (and the process, when there is one) is still usable.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        if self.dead.load(Ordering::SeqCst) || self.state == DriverState::Dead {
            return false;
        }
        match &self.process {
            Some(p) => p.pid.is_none_or(spawn::is_process_alive),
            None => true,
        }
    }

    /// Process id of the agent subprocess, when driving a real process.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid)
    }

    /// Capabilities the agent advertised in its initialize response.
    #[must_use]
    pub fn server_capabilities(&self) -> Option<&Value> {
        self.server_capabilities.as_ref()
    }

    /// Perform the initialize exchange, declaring filesystem and terminal
    /// capabilities, and record what the agent advertises back.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` on a mismatched protocol version, a
    /// malformed reply, or a timeout; all of these leave the driver dead.
    pub async fn initialize(&mut self) -> Result<()> {
        self.expect_state(DriverState::Idle, "initialize")?;
        self.state = DriverState::Initializing;

        let params = json!({
            "protocolVersion": wire::PROTOCOL_VERSION,
            "clientCapabilities": {
                "fs": { "readTextFile": true, "writeTextFile": true },
                "terminal": true,
            },
            "clientInfo": {
                "name": "agent-switchboard",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let reply = match self.call("initialize", params, INIT_TIMEOUT).await {
            Ok(reply) => reply,
            Err(err) => {
                self.fail("initialize failed");
                return Err(err);
            }
        };

        let version = reply.get("protocolVersion").and_then(Value::as_u64);
        if version != Some(wire::PROTOCOL_VERSION) {
            self.fail("protocol version mismatch");
            return Err(AppError::Protocol(format!(
                "protocol version mismatch: agent offered {version:?}, expected {}",
                wire::PROTOCOL_VERSION
            )));
        }

        self.server_capabilities = reply.get("agentCapabilities").cloned();
        self.state = DriverState::Ready;
        info!(agent = %self.label, "agent initialized");
        Ok(())
    }

    /// Create a fresh session rooted at `cwd` and return its id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Agent` if the agent refuses, `AppError::Protocol`
    /// on a malformed reply or timeout, `AppError::ConnectionLost` if the
    /// process dies mid-request.
    pub async fn session_new(&mut self, cwd: &str) -> Result<String> {
        self.expect_state(DriverState::Ready, "session/new")?;

        let params = json!({ "cwd": cwd, "mcpServers": [] });
        let reply = self.call("session/new", params, SESSION_TIMEOUT).await?;

        reply
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| AppError::Protocol("session/new reply missing sessionId".into()))
    }

    /// Load an existing session.
    ///
    /// The parameter shape must be exactly the `session/new` shape plus
    /// `sessionId` — the agent silently fails to parse a truncated form.
    /// On success, replay-history notifications queued behind the response
    /// are drained; a second drain happens at the start of the next prompt
    /// to absorb stragglers emitted after the response.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionLocked` when the agent's error payload
    /// names a holder pid, `AppError::Agent` for other agent errors.
    pub async fn session_load(&mut self, session_id: &str, cwd: &str) -> Result<()> {
        self.expect_state(DriverState::Ready, "session/load")?;

        let params = json!({
            "cwd": cwd,
            "mcpServers": [],
            "sessionId": session_id,
        });

        match self.call_raw("session/load", params, SESSION_TIMEOUT).await? {
            Ok(_) => {
                self.drain_notifications("session/load replay");
                Ok(())
            }
            Err(rpc) => match rpc.holder_pid() {
                Some(pid) => Err(AppError::SessionLocked {
                    pid: Some(pid),
                    message: rpc.message,
                }),
                None => Err(AppError::Agent(format!(
                    "session/load failed ({}): {}",
                    rpc.code, rpc.message
                ))),
            },
        }
    }

    /// Select the model used by `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Agent` if the agent refuses the model id.
    pub async fn session_set_model(&mut self, session_id: &str, model: &str) -> Result<()> {
        self.expect_state(DriverState::Ready, "session/set_model")?;
        let params = json!({ "sessionId": session_id, "modelId": model });
        self.call("session/set_model", params, SET_MODEL_TIMEOUT)
            .await?;
        Ok(())
    }

    /// Cancel the in-flight prompt for `session_id`.
    ///
    /// Fire-and-forget notification, legal in any state. Also flips the
    /// turn-cancelled flag so a concurrent permission request is answered
    /// with `cancelled` rather than an approval.
    pub async fn session_cancel(&mut self, session_id: &str) {
        self.turn_cancelled.store(true, Ordering::SeqCst);
        let frame = wire::notification("session/cancel", json!({ "sessionId": session_id }));
        if self.writer_tx.send(frame).await.is_err() {
            debug!(agent = %self.label, "session/cancel dropped: writer closed");
        }
    }

    /// Start a prompt turn and return its event stream.
    ///
    /// Stale notifications queued since the last drain are discarded first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionLost` if the wire is already down.
    pub async fn session_prompt(
        &mut self,
        session_id: &str,
        content: Vec<Value>,
    ) -> Result<PromptTurn<'_>> {
        self.expect_state(DriverState::Ready, "session/prompt")?;
        // Second drain point: replay stragglers produced asynchronously
        // after the session/load response arrived.
        self.drain_notifications("pre-prompt");
        self.turn_cancelled.store(false, Ordering::SeqCst);

        let params = json!({ "sessionId": session_id, "prompt": content });
        let rx = self.send_request("session/prompt", params).await?;
        self.state = DriverState::Busy;

        Ok(PromptTurn {
            session_id: session_id.to_owned(),
            driver: self,
            response_rx: rx,
            done: false,
        })
    }

    /// Shut the driver down: stop the background tasks and terminate the
    /// subprocess group if one is attached.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.state = DriverState::Dead;
        self.dead.store(true, Ordering::SeqCst);
        if let Some(mut process) = self.process.take() {
            spawn::terminate_group(&mut process.child, process.pid).await;
            process.stderr_task.abort();
        }
        self.reader_task.abort();
        self.writer_task.abort();
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn expect_state(&self, expected: DriverState, op: &str) -> Result<()> {
        let state = self.state();
        if state == DriverState::Dead {
            return Err(AppError::ConnectionLost(format!(
                "{op}: agent process is gone"
            )));
        }
        if state == expected {
            Ok(())
        } else {
            Err(AppError::Protocol(format!(
                "{op}: driver is {state:?}, expected {expected:?}"
            )))
        }
    }

    fn fail(&mut self, reason: &str) {
        warn!(agent = %self.label, reason, "driver marked dead");
        self.state = DriverState::Dead;
        self.dead.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    /// Discard queued `session/update` notifications.
    fn drain_notifications(&mut self, context: &str) {
        let mut drained = 0_usize;
        while self.notif_rx.try_recv().is_ok() {
            drained += 1;
        }
        if drained > 0 {
            debug!(agent = %self.label, context, drained, "stale notifications discarded");
        }
    }

    async fn send_request(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<oneshot::Receiver<std::result::Result<Value, RpcError>>> {
        if self.state() == DriverState::Dead {
            return Err(AppError::ConnectionLost(format!(
                "{method}: agent process is gone"
            )));
        }

        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = wire::request(id, method, params);
        if self.writer_tx.send(frame).await.is_err() {
            self.pending.lock().await.remove(&id);
            self.fail("writer channel closed");
            return Err(AppError::ConnectionLost(format!(
                "{method}: writer channel closed"
            )));
        }
        Ok(rx)
    }

    /// Issue a request and return the raw agent-level outcome.
    async fn call_raw(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<std::result::Result<Value, RpcError>> {
        let rx = self.send_request(method, params).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_closed)) => Err(AppError::ConnectionLost(format!(
                "{method}: agent process died mid-request"
            ))),
            Err(_elapsed) => {
                self.fail("request timeout");
                Err(AppError::Protocol(format!(
                    "{method}: no response within {timeout:?}"
                )))
            }
        }
    }

    /// Issue a request, mapping agent errors to [`AppError::Agent`].
    async fn call(&mut self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        match self.call_raw(method, params, timeout).await? {
            Ok(value) => Ok(value),
            Err(rpc) => Err(AppError::Agent(format!(
                "{method} failed ({}): {}",
                rpc.code, rpc.message
            ))),
        }
    }
}

// ── Prompt turn ──────────────────────────────────────────────────────────────

/// Event stream of one in-flight prompt.
///
/// Holds the driver mutably for the duration of the turn, which is what
/// serializes prompts per worker. Dropping the turn mid-stream leaves the
/// driver `Busy`; callers are expected to consume to [`TurnEvent::Ended`]
/// or go through [`PromptTurn::cancel_and_drain`].
#[derive(Debug)]
pub struct PromptTurn<'d> {
    driver: &'d mut AgentDriver,
    session_id: String,
    response_rx: oneshot::Receiver<std::result::Result<Value, RpcError>>,
    done: bool,
}

impl PromptTurn<'_> {
    /// Await the next event of the turn.
    ///
    /// Chunk and turn-end events are surfaced; plan and tool-call updates
    /// are logged and skipped. The turn ends on either a `turn_end` update
    /// or the prompt response, whichever arrives first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionLost` if the process dies mid-turn and
    /// `AppError::Agent` if the prompt response is an error.
    pub async fn next_event(&mut self) -> Result<TurnEvent> {
        if self.done {
            return Ok(TurnEvent::Ended {
                stop_reason: "end_turn".into(),
            });
        }

        loop {
            tokio::select! {
                response = &mut self.response_rx => {
                    self.done = true;
                    self.driver.state = DriverState::Ready;
                    return match response {
                        Ok(Ok(value)) => {
                            let stop_reason = value
                                .get("stopReason")
                                .and_then(Value::as_str)
                                .unwrap_or("end_turn")
                                .to_owned();
                            Ok(TurnEvent::Ended { stop_reason })
                        }
                        Ok(Err(rpc)) => match rpc.holder_pid() {
                            Some(pid) => Err(AppError::SessionLocked {
                                pid: Some(pid),
                                message: rpc.message,
                            }),
                            None => Err(AppError::Agent(format!(
                                "session/prompt failed ({}): {}",
                                rpc.code, rpc.message
                            ))),
                        },
                        Err(_closed) => {
                            self.driver.fail("prompt response channel closed");
                            Err(AppError::ConnectionLost(
                                "agent process died mid-prompt".into(),
                            ))
                        }
                    };
                }

                notif = self.driver.notif_rx.recv() => {
                    let Some(notif) = notif else {
                        self.done = true;
                        self.driver.fail("notification stream closed");
                        return Err(AppError::ConnectionLost(
                            "agent process died mid-prompt".into(),
                        ));
                    };

                    if notif
                        .session_id
                        .as_deref()
                        .is_some_and(|sid| sid != self.session_id)
                    {
                        debug!(
                            agent = %self.driver.label,
                            session_id = ?notif.session_id,
                            "skipping update for foreign session"
                        );
                        continue;
                    }

                    match notif.update {
                        SessionUpdate::MessageChunk(text) => {
                            return Ok(TurnEvent::Chunk(text));
                        }
                        SessionUpdate::TurnEnd => {
                            self.done = true;
                            self.driver.state = DriverState::Ready;
                            return Ok(TurnEvent::Ended {
                                stop_reason: "end_turn".into(),
                            });
                        }
                        other => {
                            debug!(agent = %self.driver.label, update = ?other, "update observed");
                        }
                    }
                }
            }
        }
    }

    /// Tell the agent to stop, then consume the remainder of the turn.
    ///
    /// The agent acknowledges a cancel promptly by finishing the prompt
    /// with a `cancelled` stop reason; a worker that never does is wedged
    /// and is marked dead so the pool can remove it.
    pub async fn cancel_and_drain(&mut self) {
        let session_id = self.session_id.clone();
        self.driver.session_cancel(&session_id).await;

        let drain = async {
            while !self.done {
                match self.next_event().await {
                    Ok(TurnEvent::Ended { .. }) | Err(_) => break,
                    Ok(TurnEvent::Chunk(_)) => {}
                }
            }
        };

        if tokio::time::timeout(CANCEL_DRAIN_TIMEOUT, drain).await.is_err() {
            self.driver.fail("agent ignored session/cancel");
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────────────

/// Serialise outbound frames onto the agent's stdin.
async fn run_writer<W>(
    label: String,
    mut stdin: W,
    mut rx: mpsc::Receiver<Value>,
    dead: Arc<AtomicBool>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                let mut bytes = match serde_json::to_vec(&frame) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!(agent = %label, %err, "outbound frame serialisation failed");
                        continue;
                    }
                };
                bytes.push(b'\n');
                if let Err(err) = stdin.write_all(&bytes).await {
                    warn!(agent = %label, %err, "write to agent stdin failed");
                    dead.store(true, Ordering::SeqCst);
                    break;
                }
                if let Err(err) = stdin.flush().await {
                    warn!(agent = %label, %err, "flush to agent stdin failed");
                    dead.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
    }
}

/// Demultiplex the agent's stdout.
#[allow(clippy::too_many_arguments)]
async fn run_reader<R>(
    label: String,
    stdout: R,
    writer_tx: mpsc::Sender<Value>,
    notif_tx: mpsc::UnboundedSender<Notification>,
    pending: PendingMap,
    dead: Arc<AtomicBool>,
    turn_cancelled: Arc<AtomicBool>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, FrameCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            item = framed.next() => {
                match item {
                    None => {
                        debug!(agent = %label, "agent stdout closed");
                        break;
                    }
                    Some(Err(err)) => {
                        warn!(agent = %label, %err, "fatal wire error");
                        break;
                    }
                    Some(Ok(line)) => {
                        match wire::classify_line(&line) {
                            Ok(None) => {}
                            Ok(Some(frame)) => {
                                if !handle_frame(
                                    &label,
                                    frame,
                                    &writer_tx,
                                    &notif_tx,
                                    &pending,
                                    &turn_cancelled,
                                )
                                .await
                                {
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!(agent = %label, %err, raw = %line, "fatal protocol error");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    // The wire is gone: resolve every pending waiter with ConnectionLost
    // (dropping the sender closes the one-shot) and let the notification
    // queue close with this task.
    dead.store(true, Ordering::SeqCst);
    pending.lock().await.clear();
}

/// Route one classified frame. Returns `false` on a fatal condition.
async fn handle_frame(
    label: &str,
    frame: InboundFrame,
    writer_tx: &mpsc::Sender<Value>,
    notif_tx: &mpsc::UnboundedSender<Notification>,
    pending: &PendingMap,
    turn_cancelled: &Arc<AtomicBool>,
) -> bool {
    match frame {
        InboundFrame::Response { id, result } => {
            let waiter = pending.lock().await.remove(&id);
            match waiter {
                Some(tx) => {
                    // A dropped receiver means the caller gave up (e.g. a
                    // cancelled turn) — not an error.
                    let _ = tx.send(result);
                    true
                }
                None => {
                    warn!(agent = %label, id, "response with unexpected id");
                    false
                }
            }
        }

        InboundFrame::ServerRequest { id, method, params } => {
            let reply = if method == "session/request_permission" {
                let options = wire::parse_permission_options(&params);
                let outcome = if turn_cancelled.load(Ordering::SeqCst) {
                    wire::permission_cancelled()
                } else {
                    match wire::choose_allow_option(&options) {
                        Some(option) => {
                            info!(
                                agent = %label,
                                option_id = %option.option_id,
                                kind = %option.kind,
                                "auto-approving permission request"
                            );
                            wire::permission_selected(&option.option_id)
                        }
                        None => {
                            warn!(agent = %label, "no allow option offered, cancelling");
                            wire::permission_cancelled()
                        }
                    }
                };
                wire::response(&id, outcome)
            } else {
                debug!(agent = %label, %method, "rejecting unsupported server request");
                wire::error_response(&id, -32601, "method not found")
            };

            if writer_tx.send(reply).await.is_err() {
                warn!(agent = %label, "cannot answer server request: writer closed");
                return false;
            }
            true
        }

        InboundFrame::Notification { method, params } => {
            if method == "session/update" {
                let session_id = wire::update_session_id(&params).map(str::to_owned);
                if let Some(update) = wire::parse_session_update(&params) {
                    let _ = notif_tx.send(Notification { session_id, update });
                } else {
                    debug!(agent = %label, "session/update with no recognizable payload");
                }
            } else {
                // Vendor-prefixed notifications (command lists, OAuth,
                // compaction, subagent chatter) are observed, never routed.
                debug!(agent = %label, %method, "ignoring notification");
            }
            true
        }
    }
}
