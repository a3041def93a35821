//! A bounded pool of healthy, ready-to-use sessions.
//!
//! Each slot runs its own control state machine ([`node`]) in a task:
//! connect, hand out, collect back, reset, ping on idle, reconnect on
//! failure. `get_connection` hands out idle slots and queues otherwise;
//! waiters are woken one at a time as slots turn idle.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_core::future::BoxFuture;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

mod node;
mod options;

pub use options::PoolOptions;

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::session::{reset_request, PipelineResponse};

use self::node::{Collection, NodeAction, NodeMachine};

/// A session the pool can manage.
///
/// Implemented by [`Connection`]; abstract so the pool logic is
/// testable against scripted sessions.
pub trait ManagedConnection: Send + Sized + 'static {
    fn establish(options: Arc<PoolOptions>) -> BoxFuture<'static, Result<Self>>;

    fn ping(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Scrub session state before the connection is reused.
    fn reset(&mut self) -> BoxFuture<'_, Result<()>>;

    fn close(self) -> BoxFuture<'static, Result<()>>;
}

impl ManagedConnection for Connection {
    fn establish(options: Arc<PoolOptions>) -> BoxFuture<'static, Result<Self>> {
        Box::pin(async move { Connection::connect(&options.connect).await })
    }

    fn ping(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(Connection::ping(self))
    }

    fn reset(&mut self) -> BoxFuture<'_, Result<()>> {
        // Reset plus SET NAMES, pipelined: the server-side scrub
        // reverts the character set to an unknown default, so pin it
        // back to the handshake charset in the same round trip.
        Box::pin(async move {
            let request = reset_request();
            let mut response = PipelineResponse::new();
            self.run_pipeline(&request, &mut response).await
        })
    }

    fn close(self) -> BoxFuture<'static, Result<()>> {
        Box::pin(Connection::close(self))
    }
}

struct NodeSlot<C> {
    machine: NodeMachine,
    conn: Option<C>,
    collection: Collection,
    wake: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

struct PoolState<C> {
    nodes: Vec<NodeSlot<C>>,
    idle: VecDeque<usize>,
}

struct PoolShared<C> {
    options: Arc<PoolOptions>,
    state: Mutex<PoolState<C>>,
    idle_notify: Notify,
    running: AtomicBool,
    cancel_rx: watch::Receiver<bool>,
    cancel_tx: watch::Sender<bool>,
}

impl<C> PoolShared<C> {
    fn lock(&self) -> MutexGuard<'_, PoolState<C>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}

/// A pool of sessions.
///
/// Cloning is cheap and shares the same pool. [`run`](Pool::run) must
/// be driven (typically in its own task) for the pool to operate.
pub struct Pool<C: ManagedConnection = Connection> {
    shared: Arc<PoolShared<C>>,
}

impl<C: ManagedConnection> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: ManagedConnection> Pool<C> {
    pub fn new(options: PoolOptions) -> Result<Self> {
        options.validate()?;

        let (cancel_tx, cancel_rx) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(PoolShared {
                options: Arc::new(options),
                state: Mutex::new(PoolState {
                    nodes: Vec::new(),
                    idle: VecDeque::new(),
                }),
                idle_notify: Notify::new(),
                running: AtomicBool::new(false),
                cancel_rx,
                cancel_tx,
            }),
        })
    }

    /// The pool's reactor: establishes the initial sessions and
    /// supervises slot tasks until [`close`](Pool::close) is called.
    /// Does not return before then.
    pub async fn run(&self) -> Result<()> {
        self.shared.running.store(true, Ordering::Release);

        {
            let mut state = self.shared.lock();
            for _ in 0..self.shared.options.initial_size {
                spawn_node(&self.shared, &mut state);
            }
        }

        // Wait for cancellation.
        let mut cancel_rx = self.shared.cancel_rx.clone();
        while !*cancel_rx.borrow_and_update() {
            if cancel_rx.changed().await.is_err() {
                break;
            }
        }

        // Terminate every slot and wake it so its task can unwind.
        let handles: Vec<JoinHandle<()>> = {
            let mut state = self.shared.lock();
            state.idle.clear();

            state
                .nodes
                .iter_mut()
                .filter_map(|slot| {
                    slot.machine.cancel();
                    slot.wake.notify_one();
                    slot.handle.take()
                })
                .collect()
        };

        for handle in handles {
            let _ = handle.await;
        }

        // Wake every queued waiter so it observes the cancellation.
        self.shared.idle_notify.notify_waiters();

        Ok(())
    }

    /// Stops the pool: every slot terminates and every pending
    /// `get_connection` fails with [`ClientError::PoolCancelled`].
    pub fn close(&self) {
        let _ = self.shared.cancel_tx.send(true);
        self.shared.idle_notify.notify_waiters();
    }

    /// Retrieves a healthy session, waiting until one becomes idle.
    pub async fn get_connection(&self) -> Result<PooledConnection<C>> {
        self.acquire(None).await
    }

    /// Like [`get_connection`](Pool::get_connection) with a bound on
    /// the wait; elapses with [`ClientError::NoConnectionAvailable`].
    pub async fn get_connection_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PooledConnection<C>> {
        self.acquire(Some(tokio::time::Instant::now() + timeout)).await
    }

    async fn acquire(
        &self,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<PooledConnection<C>> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(ClientError::PoolNotRunning.into());
        }

        let mut cancel_rx = self.shared.cancel_rx.clone();

        loop {
            if self.shared.is_cancelled() {
                return Err(ClientError::PoolCancelled.into());
            }

            {
                let mut state = self.shared.lock();

                if let Some(index) = state.idle.pop_front() {
                    let slot = &mut state.nodes[index];
                    slot.machine.mark_in_use();

                    let conn = slot.conn.take().expect("idle slot owns a connection");

                    return Ok(PooledConnection {
                        conn: Some(conn),
                        index,
                        reset_on_return: true,
                        shared: Arc::clone(&self.shared),
                    });
                }

                // No idle slot but room to grow: add one. The waiter
                // queues for its idle transition like any other.
                if state.nodes.len() < self.shared.options.max_size {
                    spawn_node(&self.shared, &mut state);
                }
            }

            let notified = self.shared.idle_notify.notified();

            match deadline {
                None => {
                    tokio::select! {
                        _ = notified => {}
                        _ = cancel_rx.changed() => {}
                    }
                }

                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = cancel_rx.changed() => {}
                        _ = tokio::time::sleep_until(deadline) => {
                            return Err(ClientError::NoConnectionAvailable.into());
                        }
                    }
                }
            }
        }
    }

    /// Number of slots currently managed.
    pub fn size(&self) -> usize {
        self.shared.lock().nodes.len()
    }

    /// Number of idle sessions ready for handoff.
    pub fn num_idle(&self) -> usize {
        self.shared.lock().idle.len()
    }
}

fn spawn_node<C: ManagedConnection>(
    shared: &Arc<PoolShared<C>>,
    state: &mut PoolState<C>,
) {
    let index = state.nodes.len();

    state.nodes.push(NodeSlot {
        machine: NodeMachine::new(),
        conn: None,
        collection: Collection::None,
        wake: Arc::new(Notify::new()),
        handle: None,
    });

    let task_shared = Arc::clone(shared);
    let handle = tokio::spawn(async move {
        drive_node(task_shared, index).await;
    });

    state.nodes[index].handle = Some(handle);
}

// The slot task: runs the control machine, performing each emitted
// action.
async fn drive_node<C: ManagedConnection>(shared: Arc<PoolShared<C>>, index: usize) {
    let options = Arc::clone(&shared.options);
    let mut cancel_rx = shared.cancel_rx.clone();
    let mut failed = false;

    loop {
        // Resume the machine under the lock, tracking idle transitions.
        let (action, wake) = {
            let mut state = shared.lock();
            let slot = &mut state.nodes[index];

            let was_idle = slot.machine.is_idle();
            let collection = std::mem::replace(&mut slot.collection, Collection::None);
            let action = slot.machine.resume(failed, collection);
            let is_idle = slot.machine.is_idle();
            let wake = Arc::clone(&slot.wake);

            if is_idle && !was_idle {
                state.idle.push_back(index);
                shared.idle_notify.notify_one();
            } else if was_idle && !is_idle {
                state.idle.retain(|&i| i != index);
            }

            (action, wake)
        };

        failed = false;

        match action {
            NodeAction::Connect => {
                let result =
                    maybe_timeout(options.connect_timeout, C::establish(Arc::clone(&options)))
                        .await;

                match result {
                    Ok(conn) => {
                        shared.lock().nodes[index].conn = Some(conn);
                    }

                    Err(err) => {
                        log::warn!("pool: error establishing a connection: {}", err);
                        failed = true;
                    }
                }
            }

            NodeAction::SleepConnectFailed => {
                tokio::select! {
                    _ = tokio::time::sleep(options.retry_interval) => {}
                    _ = cancel_rx.changed() => {}
                }
            }

            NodeAction::IdleWait => {
                let ping_enabled = !options.ping_interval.is_zero();

                tokio::select! {
                    _ = wake.notified() => {}
                    _ = cancel_rx.changed() => {}
                    _ = tokio::time::sleep(options.ping_interval), if ping_enabled => {}
                }
            }

            NodeAction::Ping => {
                let mut conn = match shared.lock().nodes[index].conn.take() {
                    Some(conn) => conn,
                    None => {
                        failed = true;
                        continue;
                    }
                };

                match maybe_timeout(options.ping_timeout, conn.ping()).await {
                    Ok(()) => {
                        shared.lock().nodes[index].conn = Some(conn);
                    }

                    Err(err) => {
                        // The error itself isn't unexpected here.
                        log::info!("pool: ping on idle connection returned error: {}", err);
                        let _ = conn.close().await;
                        failed = true;
                    }
                }
            }

            NodeAction::Reset => {
                let mut conn = match shared.lock().nodes[index].conn.take() {
                    Some(conn) => conn,
                    None => {
                        failed = true;
                        continue;
                    }
                };

                match maybe_timeout(options.ping_timeout, conn.reset()).await {
                    Ok(()) => {
                        shared.lock().nodes[index].conn = Some(conn);
                    }

                    Err(err) => {
                        log::info!("pool: reset on returned connection failed: {}", err);
                        let _ = conn.close().await;
                        failed = true;
                    }
                }
            }

            NodeAction::None => {
                // Terminated: close whatever the slot still owns.
                let conn = shared.lock().nodes[index].conn.take();
                if let Some(conn) = conn {
                    let _ = conn.close().await;
                }

                return;
            }
        }

        if shared.is_cancelled() {
            shared.lock().nodes[index].machine.cancel();
        }
    }
}

async fn maybe_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    if timeout.is_zero() {
        return fut.await;
    }

    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::OperationAborted.into()),
    }
}

/// A session checked out of a pool; returned on drop.
///
/// By default the pool resets the session (server-side state scrub)
/// before handing it out again; use
/// [`return_without_reset`](Self::return_without_reset) when the
/// session is known to be clean.
pub struct PooledConnection<C: ManagedConnection = Connection> {
    conn: Option<C>,
    index: usize,
    reset_on_return: bool,
    shared: Arc<PoolShared<C>>,
}

impl<C: ManagedConnection> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("index", &self.index)
            .field("reset_on_return", &self.reset_on_return)
            .finish()
    }
}

impl<C: ManagedConnection> PooledConnection<C> {
    /// Returns the session marked clean: the pool skips the reset round
    /// trip.
    pub fn return_without_reset(mut self) {
        self.reset_on_return = false;
    }
}

impl<C: ManagedConnection> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<C: ManagedConnection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<C: ManagedConnection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        let mut state = self.shared.lock();
        let slot = &mut state.nodes[self.index];

        slot.conn = Some(conn);
        slot.collection = Collection::Returned {
            reset: self.reset_on_return,
        };
        slot.wake.notify_one();
    }
}
