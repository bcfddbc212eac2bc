//! The session registry.
//!
//! Every connected client is represented by a [`Session`] owned by the
//! [`SessionRegistry`]. A single mutex guards the whole collection, so all
//! registry operations are totally ordered. None of them are re-entrant: a
//! visitor passed to [`for_each`](SessionRegistry::for_each) must not call back
//! into the registry.
//!
//! Session counts are desktop-sized, so lookups are plain linear scans in
//! registration order.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::PortError;
use crate::logging::targets;
use crate::port::{PortLink, PortTable};
use crate::process::ProcessId;
use crate::session::{ContextHandle, ContextId, Session, SessionInfo};

new_key_type! {
    /// A unique identifier for a registered session.
    pub struct SessionId;
}

/// What the client needs to know about a newly created session.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    /// Registry key.
    pub id: SessionId,
    /// Link to the session's listening port.
    pub listener: PortLink,
    /// The session's execution context.
    pub context: ContextHandle,
}

/// Outcome of [`SessionRegistry::remove_by_context`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The session was removed.
    Removed(SessionInfo),
    /// No session is serviced by that context.
    NotFound,
    /// The context did not finish in time; the session is still registered.
    StillRunning,
}

struct RegistryInner {
    sessions: SlotMap<SessionId, Session>,
    /// Registration order, for first-match lookups.
    order: Vec<SessionId>,
    next_context: u64,
}

impl RegistryInner {
    fn take(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(id)?;
        self.order.retain(|&other| other != id);
        Some(session)
    }

    fn ordered(&self) -> impl Iterator<Item = &Session> {
        self.order.iter().filter_map(|&id| self.sessions.get(id))
    }
}

/// Concurrent collection of sessions.
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    ports: Arc<PortTable>,
    port_capacity: usize,
}

impl SessionRegistry {
    /// Create an empty registry that allocates listening ports from `ports`
    /// with a backlog of `port_capacity`.
    pub fn new(ports: Arc<PortTable>, port_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                sessions: SlotMap::with_key(),
                order: Vec::new(),
                next_context: 1,
            }),
            ports,
            port_capacity,
        }
    }

    /// Register a new client.
    ///
    /// Allocates a listening port named after `signature`. If the port table
    /// is exhausted nothing is registered and the error is returned; it is
    /// not retried.
    pub fn create_session(
        &self,
        pid: ProcessId,
        client: PortLink,
        signature: &str,
    ) -> Result<CreatedSession, PortError> {
        let mut inner = self.inner.lock();

        let listener = match self.ports.create(signature, self.port_capacity) {
            Ok(port) => port,
            Err(err) => {
                tracing::error!(
                    target: targets::REGISTRY,
                    pid,
                    signature,
                    error = %err,
                    "cannot allocate session port"
                );
                return Err(err);
            }
        };

        let context = ContextHandle::new(ContextId(inner.next_context));
        inner.next_context += 1;

        let listener_link = listener.link();
        let session = Session::new(
            pid,
            client,
            listener,
            signature.to_string(),
            context.clone(),
        );
        let id = inner.sessions.insert_with_key(|id| {
            let mut session = session;
            session.id = id;
            session
        });
        inner.order.push(id);

        tracing::debug!(
            target: targets::REGISTRY,
            ?id,
            pid,
            signature,
            context = %context.id(),
            "session registered"
        );

        Ok(CreatedSession {
            id,
            listener: listener_link,
            context,
        })
    }

    /// Remove a session.
    ///
    /// The record becomes unreachable immediately, but it is only released
    /// after its execution context has finished, so nothing attached to it can
    /// fire after this returns. The wait happens outside the registry lock.
    pub fn remove_session(&self, id: SessionId) -> Option<SessionInfo> {
        let session = self.inner.lock().take(id)?;
        Some(Self::release(session))
    }

    /// Remove the session serviced by `context` once that context has
    /// finished, waiting at most `timeout` for it.
    ///
    /// A session whose context is still running when the wait ends stays
    /// registered. The wait happens outside the registry lock.
    pub fn remove_by_context(&self, context: ContextId, timeout: Duration) -> Removal {
        let Some((id, handle)) = self
            .inner
            .lock()
            .ordered()
            .find(|session| session.context().id() == context)
            .map(|session| (session.id(), session.context().clone()))
        else {
            return Removal::NotFound;
        };

        if !handle.wait_timeout(timeout) {
            return Removal::StillRunning;
        }

        match self.inner.lock().take(id) {
            Some(session) => Removal::Removed(Self::release(session)),
            None => Removal::NotFound,
        }
    }

    /// Remove every session, in registration order.
    pub fn remove_all(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Session> = {
            let mut inner = self.inner.lock();
            let order = std::mem::take(&mut inner.order);
            order
                .into_iter()
                .filter_map(|id| inner.sessions.remove(id))
                .collect()
        };
        sessions.into_iter().map(Self::release).collect()
    }

    fn release(session: Session) -> SessionInfo {
        session.context().wait();
        let info = session.info();
        drop(session);
        tracing::debug!(
            target: targets::REGISTRY,
            id = ?info.id,
            signature = %info.signature,
            "session removed"
        );
        info
    }

    /// Find the first session registered with `signature`.
    pub fn find_by_signature(&self, signature: &str) -> Option<SessionInfo> {
        self.inner
            .lock()
            .ordered()
            .find(|session| session.signature() == signature)
            .map(Session::info)
    }

    /// Whether a session is registered for process `pid`.
    pub fn contains_pid(&self, pid: ProcessId) -> bool {
        self.inner
            .lock()
            .sessions
            .values()
            .any(|session| session.pid() == pid)
    }

    /// Look a session up by id.
    pub fn get(&self, id: SessionId) -> Option<SessionInfo> {
        self.inner.lock().sessions.get(id).map(Session::info)
    }

    /// Visit every session in registration order while holding the registry.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&Session),
    {
        let inner = self.inner.lock();
        for session in inner.ordered() {
            visitor(session);
        }
    }

    /// Snapshot of every session.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.inner.lock().ordered().map(Session::info).collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
