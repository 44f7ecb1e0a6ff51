//! Worker pool: a bounded set of agent drivers with session affinity.
//!
//! The pool keeps between one and `max_workers` slots. A slot is either
//! IDLE (holding its driver) or BUSY (the driver is checked out in a
//! [`LeasedWorker`], or a placeholder while a spawn is in progress —
//! placeholders count toward capacity). Dead drivers are removed on
//! detection; there is no crashed state.
//!
//! Affinity is mandatory: the agent holds an exclusive advisory lock on
//! whichever session a worker last loaded, so a thread whose affinity slot
//! is busy must wait for that exact slot rather than collide with the lock
//! from another worker. Affinity outlives a borrow of the slot by an
//! unrelated thread and is purged only when the slot itself goes away.
//!
//! Release and dequeue are a single critical section: when a lease comes
//! back, the next queued request (affinity match, then same thread, then
//! FIFO head) is pulled out under the pool lock and the slot stays BUSY,
//! so no unrelated acquire can steal a slot a queued request is entitled
//! to. Subprocess spawning always happens outside the lock.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acp::driver::AgentDriver;
use crate::acp::spawn::SpawnConfig;
use crate::router::{PendingQueue, PendingRequest};
use crate::{AppError, Result};

/// How a worker is brought up. The production launcher spawns the agent
/// binary and runs the initialize exchange; tests substitute scripted
/// drivers over in-memory pipes.
pub trait Launcher: Send + Sync {
    /// Spawn and initialize one driver, ready for session operations.
    fn launch(&self) -> Pin<Box<dyn Future<Output = Result<AgentDriver>> + Send + '_>>;
}

/// Launcher that spawns the configured agent binary.
#[derive(Debug, Clone)]
pub struct AcpLauncher {
    /// Spawn parameters for the agent subprocess.
    pub spawn_config: SpawnConfig,
}

impl Launcher for AcpLauncher {
    fn launch(&self) -> Pin<Box<dyn Future<Output = Result<AgentDriver>> + Send + '_>> {
        Box::pin(async move {
            let mut driver = AgentDriver::connect(&self.spawn_config)?;
            driver.initialize().await?;
            Ok(driver)
        })
    }
}

/// Pool sizing parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on concurrent workers, placeholders included.
    pub max_workers: usize,
    /// Idle lifetime before the reaper kills a worker.
    pub idle_timeout: Duration,
}

/// Slot occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotStatus {
    Idle,
    Busy,
}

/// One pool slot. `driver` is `None` while the slot is a spawn placeholder
/// or while the driver is checked out in a lease.
#[derive(Debug)]
struct Slot {
    driver: Option<AgentDriver>,
    status: SlotStatus,
    last_idle_at: Instant,
    current_session_id: Option<String>,
    current_thread_id: Option<i64>,
}

/// Everything guarded by the pool lock: slots, affinity, and the queue.
#[derive(Debug, Default)]
struct PoolInner {
    slots: HashMap<u32, Slot>,
    affinity: HashMap<i64, u32>,
    queue: PendingQueue,
    next_slot_id: u32,
}

/// Outcome of an acquire attempt.
#[derive(Debug)]
pub enum Acquired {
    /// A worker was leased to the caller.
    Worker(LeasedWorker),
    /// No worker is available right now; the caller must enqueue.
    Busy,
    /// Capacity allowed a new worker but the spawn failed; the caller
    /// should surface a transient error instead of queueing.
    SpawnFailed(AppError),
}

/// Exclusive use of one slot's driver for the duration of a turn.
#[derive(Debug)]
pub struct LeasedWorker {
    slot_id: u32,
    /// The driver, owned by the lease until release.
    pub driver: AgentDriver,
}

impl LeasedWorker {
    /// Identifier of the slot this lease belongs to.
    #[must_use]
    pub fn slot_id(&self) -> u32 {
        self.slot_id
    }
}

/// Observability snapshot for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total slots, placeholders included.
    pub slots: usize,
    /// Slots currently idle.
    pub idle: usize,
    /// Queued requests.
    pub queued: usize,
}

/// The worker pool. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Mutex<PoolInner>>,
    launcher: Arc<dyn Launcher>,
    config: PoolConfig,
    shutdown_token: CancellationToken,
}

impl WorkerPool {
    /// Start the pool: spawn and initialize one warm worker synchronously
    /// (failure is fatal) and kick off the idle reaper.
    ///
    /// # Errors
    ///
    /// Propagates the first worker's spawn or initialize failure.
    pub async fn start(launcher: Arc<dyn Launcher>, config: PoolConfig) -> Result<Self> {
        let driver = launcher.launch().await?;

        let mut inner = PoolInner::default();
        inner.slots.insert(
            0,
            Slot {
                driver: Some(driver),
                status: SlotStatus::Idle,
                last_idle_at: Instant::now(),
                current_session_id: None,
                current_thread_id: None,
            },
        );
        inner.next_slot_id = 1;

        let pool = Self {
            inner: Arc::new(Mutex::new(inner)),
            launcher,
            config,
            shutdown_token: CancellationToken::new(),
        };

        pool.spawn_reaper();
        info!(max_workers = pool.config.max_workers, "worker pool started with one warm worker");
        Ok(pool)
    }

    /// Acquire a worker for `thread_id`.
    ///
    /// Affinity is consulted first: an idle affinity slot is taken, a busy
    /// one means the caller must queue behind it — even when other slots
    /// are free, because loading the thread's session elsewhere would
    /// collide with the file lock the affinity slot still holds. Without
    /// affinity, any idle slot wins, then spare capacity (spawning outside
    /// the lock), then the queue.
    pub async fn acquire(&self, thread_id: i64) -> Acquired {
        let slot_id = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;

            // Step 1: session affinity.
            if let Some(&slot_id) = inner.affinity.get(&thread_id) {
                match inner.slots.get_mut(&slot_id) {
                    Some(slot) if slot.status == SlotStatus::Idle => {
                        let Some(driver) = slot.driver.take() else {
                            // An idle slot always holds its driver.
                            warn!(slot_id, "idle slot without driver, dropping");
                            inner.slots.remove(&slot_id);
                            inner.affinity.retain(|_, sid| *sid != slot_id);
                            return Acquired::Busy;
                        };
                        slot.status = SlotStatus::Busy;
                        debug!(thread_id, slot_id, "acquire: affinity hit");
                        return Acquired::Worker(LeasedWorker { slot_id, driver });
                    }
                    Some(_) => {
                        // The affinity slot is serving someone (possibly a
                        // different thread). Rerouting is forbidden.
                        debug!(thread_id, slot_id, "acquire: affinity slot busy");
                        return Acquired::Busy;
                    }
                    None => {
                        inner.affinity.remove(&thread_id);
                    }
                }
            }

            // Step 2a: any idle slot.
            let idle_id = inner
                .slots
                .iter()
                .find(|(_, slot)| slot.status == SlotStatus::Idle && slot.driver.is_some())
                .map(|(&id, _)| id);
            if let Some(slot_id) = idle_id {
                if let Some(slot) = inner.slots.get_mut(&slot_id) {
                    if let Some(driver) = slot.driver.take() {
                        slot.status = SlotStatus::Busy;
                        inner.affinity.insert(thread_id, slot_id);
                        debug!(thread_id, slot_id, "acquire: idle slot");
                        return Acquired::Worker(LeasedWorker { slot_id, driver });
                    }
                }
            }

            // Step 2b: spare capacity — reserve a placeholder and spawn
            // outside the lock so the pool stays responsive during the
            // multi-second agent startup.
            if inner.slots.len() >= self.config.max_workers {
                debug!(thread_id, "acquire: at capacity");
                return Acquired::Busy;
            }
            let slot_id = inner.next_slot_id;
            inner.next_slot_id += 1;
            inner.slots.insert(
                slot_id,
                Slot {
                    driver: None,
                    status: SlotStatus::Busy,
                    last_idle_at: Instant::now(),
                    current_session_id: None,
                    current_thread_id: None,
                },
            );
            inner.affinity.insert(thread_id, slot_id);
            slot_id
        };

        // Lock released; the placeholder reserves the capacity meanwhile.
        match self.launcher.launch().await {
            Ok(driver) => {
                let mut inner = self.inner.lock().await;
                if inner.slots.contains_key(&slot_id) {
                    debug!(thread_id, slot_id, "acquire: spawned new worker");
                    Acquired::Worker(LeasedWorker { slot_id, driver })
                } else {
                    // The pool shut down while we were spawning.
                    drop(inner);
                    driver.shutdown().await;
                    Acquired::Busy
                }
            }
            Err(err) => {
                warn!(thread_id, slot_id, %err, "worker spawn failed, removing placeholder");
                let mut inner = self.inner.lock().await;
                inner.slots.remove(&slot_id);
                inner.affinity.remove(&thread_id);
                Acquired::SpawnFailed(err)
            }
        }
    }

    /// Return a lease and atomically hand the slot to the next queued
    /// request when one is entitled to it.
    ///
    /// Priority: a queued thread whose affinity points at this slot, then
    /// the thread that just released (continuity), then the FIFO head. On
    /// a handoff the slot never goes idle — the returned lease and request
    /// must be dispatched by the caller on a fresh task.
    ///
    /// A dead driver removes the slot and purges affinity instead; queued
    /// requests stay queued for other workers.
    pub async fn release(
        &self,
        lease: LeasedWorker,
        session_id: Option<String>,
        thread_id: i64,
    ) -> Option<(LeasedWorker, PendingRequest)> {
        let LeasedWorker { slot_id, driver } = lease;

        if !driver.is_alive() {
            let mut inner = self.inner.lock().await;
            inner.slots.remove(&slot_id);
            inner.affinity.retain(|_, sid| *sid != slot_id);
            drop(inner);
            warn!(slot_id, thread_id, "released driver is dead, slot removed");
            driver.shutdown().await;
            return None;
        }

        let mut inner = self.inner.lock().await;
        if !inner.slots.contains_key(&slot_id) {
            // Shutdown raced us; nothing to return the driver to.
            drop(inner);
            driver.shutdown().await;
            return None;
        }

        // Release semantics first: the thread keeps routing here.
        inner.affinity.insert(thread_id, slot_id);

        // Atomic dequeue handoff.
        let PoolInner {
            slots,
            affinity,
            queue,
            ..
        } = &mut *inner;
        let next = queue
            .dequeue_where(|tid| affinity.get(&tid) == Some(&slot_id))
            .or_else(|| queue.dequeue_thread(thread_id))
            .or_else(|| queue.dequeue());

        if let Some(slot) = slots.get_mut(&slot_id) {
            slot.current_session_id = session_id;
            slot.current_thread_id = Some(thread_id);

            if let Some(request) = next {
                slot.status = SlotStatus::Busy;
                affinity.insert(request.thread_id, slot_id);
                debug!(
                    slot_id,
                    from_thread = thread_id,
                    to_thread = request.thread_id,
                    "release: handoff to queued request"
                );
                return Some((LeasedWorker { slot_id, driver }, request));
            }

            slot.status = SlotStatus::Idle;
            slot.last_idle_at = Instant::now();
            slot.driver = Some(driver);
            debug!(slot_id, thread_id, "release: slot idle");
        }
        None
    }

    /// Enqueue a request under the pool lock, coalescing per thread.
    pub async fn enqueue(&self, request: PendingRequest) {
        let mut inner = self.inner.lock().await;
        let replaced = inner.queue.enqueue(request);
        if replaced {
            debug!("enqueue: replaced older payload for thread");
        }
    }

    /// Kill every driver and clear all pool state.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();

        let drivers: Vec<AgentDriver> = {
            let mut inner = self.inner.lock().await;
            inner.affinity.clear();
            while inner.queue.dequeue().is_some() {}
            inner
                .slots
                .drain()
                .filter_map(|(_, slot)| slot.driver)
                .collect()
        };

        for driver in drivers {
            driver.shutdown().await;
        }
        info!("worker pool shut down");
    }

    /// Current slot/queue counts.
    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        PoolStats {
            slots: inner.slots.len(),
            idle: inner
                .slots
                .values()
                .filter(|s| s.status == SlotStatus::Idle)
                .count(),
            queued: inner.queue.len(),
        }
    }

    /// The slot a thread's affinity points at. Test observability.
    pub async fn affinity_of(&self, thread_id: i64) -> Option<u32> {
        self.inner.lock().await.affinity.get(&thread_id).copied()
    }

    /// The session and thread a slot last served. Test observability.
    pub async fn slot_binding(&self, slot_id: u32) -> Option<(Option<String>, Option<i64>)> {
        self.inner
            .lock()
            .await
            .slots
            .get(&slot_id)
            .map(|slot| (slot.current_session_id.clone(), slot.current_thread_id))
    }

    /// Run one reaper scan immediately. Exposed for tests; the background
    /// reaper calls this on every tick.
    pub async fn reap_idle(&self) {
        let timeout = self.config.idle_timeout;
        let mut victims: Vec<AgentDriver> = Vec::new();
        {
            let mut inner = self.inner.lock().await;
            loop {
                if inner.slots.len() <= 1 {
                    break;
                }
                let expired = inner
                    .slots
                    .iter()
                    .find(|(_, slot)| {
                        slot.status == SlotStatus::Idle
                            && slot.driver.is_some()
                            && slot.last_idle_at.elapsed() > timeout
                    })
                    .map(|(&id, _)| id);
                let Some(slot_id) = expired else { break };
                if let Some(slot) = inner.slots.remove(&slot_id) {
                    inner.affinity.retain(|_, sid| *sid != slot_id);
                    if let Some(driver) = slot.driver {
                        victims.push(driver);
                    }
                    debug!(slot_id, "reaper: idle worker removed");
                }
            }
        }
        for driver in victims {
            driver.shutdown().await;
        }
    }

    fn spawn_reaper(&self) {
        let pool = self.clone();
        let token = self.shutdown_token.clone();
        // Half the idle timeout, floored so a zero timeout cannot busy-loop.
        let period = (self.config.idle_timeout / 2).max(Duration::from_millis(500));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = tick.tick() => pool.reap_idle().await,
                }
            }
        });
    }
}
