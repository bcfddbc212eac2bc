//! Server-side records of connected client applications.
//!
//! A [`Session`] exists for every client that completed the creation
//! handshake. It holds the client's reply port, the listening port the server
//! allocated for it, and a [`ContextHandle`] for the execution context that
//! services the session on the client's behalf. The server never runs that
//! context itself; it only waits for it to finish.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::PortError;
use crate::port::{Envelope, Port, PortId, PortLink};
use crate::process::{ProcessControl, ProcessId};
use crate::registry::SessionId;

/// Identifier of a session's execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub(crate) u64);

impl ContextId {
    /// The raw numeric value, as carried in deletion requests.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Rebuild an id from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

struct ContextState {
    id: ContextId,
    finished: Mutex<bool>,
    condvar: Condvar,
}

/// Shared completion latch for a session's execution context.
///
/// The server keeps one clone in the session record and hands another to the
/// client in the creation reply. Whoever services the session calls
/// [`finish`](Self::finish) when it stops; the server waits on it before
/// releasing the record.
#[derive(Clone)]
pub struct ContextHandle {
    inner: Arc<ContextState>,
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.inner.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl ContextHandle {
    pub(crate) fn new(id: ContextId) -> Self {
        Self {
            inner: Arc::new(ContextState {
                id,
                finished: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    /// The context identifier.
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Mark the context as finished and wake all waiters. Idempotent.
    pub fn finish(&self) {
        let mut finished = self.inner.finished.lock();
        if !*finished {
            *finished = true;
            self.inner.condvar.notify_all();
        }
    }

    /// Whether the context has finished.
    pub fn is_finished(&self) -> bool {
        *self.inner.finished.lock()
    }

    /// Block until the context finishes.
    pub fn wait(&self) {
        let mut finished = self.inner.finished.lock();
        while !*finished {
            self.inner.condvar.wait(&mut finished);
        }
    }

    /// Block until the context finishes or `timeout` elapses.
    ///
    /// Returns `true` if the context finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut finished = self.inner.finished.lock();
        while !*finished {
            if self
                .inner
                .condvar
                .wait_until(&mut finished, deadline)
                .timed_out()
            {
                return *finished;
            }
        }
        true
    }
}

/// A connected client application, as seen by the server.
pub struct Session {
    pub(crate) id: SessionId,
    pid: ProcessId,
    client: PortLink,
    listener: Port,
    signature: String,
    context: ContextHandle,
    alive: AtomicBool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("signature", &self.signature)
            .field("context", &self.context.id())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        pid: ProcessId,
        client: PortLink,
        listener: Port,
        signature: String,
        context: ContextHandle,
    ) -> Self {
        Self {
            id: SessionId::default(),
            pid,
            client,
            listener,
            signature,
            context,
            alive: AtomicBool::new(true),
        }
    }

    /// Registry key of this session.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Client process identifier.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Signature string supplied by the client.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The client's reply port.
    pub fn client(&self) -> &PortLink {
        &self.client
    }

    /// The server-assigned listening port.
    pub fn listener(&self) -> &Port {
        &self.listener
    }

    /// The session's execution context.
    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    /// Result of the most recent liveness check.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Post a notification with no attachments to the client.
    ///
    /// Never blocks: a client whose reply port is full simply misses the
    /// notification.
    pub fn notify(&self, code: i32) -> Result<(), PortError> {
        self.client.post(Envelope::new(code))
    }

    /// Post a message into the session's own listening port, as if the client
    /// had sent it.
    pub fn post_to_listener(&self, envelope: Envelope) -> Result<(), PortError> {
        self.listener.link().post(envelope)
    }

    /// Lightweight liveness check.
    ///
    /// A session is alive while its context is running and its process
    /// exists. The result is recorded in the liveness flag and returned.
    pub fn check_liveness(&self, processes: &dyn ProcessControl) -> bool {
        let alive = !self.context.is_finished() && processes.is_alive(self.pid);
        self.alive.store(alive, Ordering::Release);
        alive
    }

    /// A detached summary of this session.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            pid: self.pid,
            signature: self.signature.clone(),
            context: self.context.id(),
            listener: self.listener.id(),
            alive: self.is_alive(),
        }
    }
}

/// A value snapshot of a [`Session`], safe to keep after the registry lock is
/// released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub pid: ProcessId,
    pub signature: String,
    pub context: ContextId,
    pub listener: PortId,
    pub alive: bool,
}
