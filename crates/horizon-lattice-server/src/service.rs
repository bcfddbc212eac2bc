//! Dedicated service threads with cooperative shutdown.
//!
//! The server runs exactly two background loops, the event intake and the
//! health monitor. Each runs on a [`ServiceThread`]: a named OS thread that is
//! handed a [`ShutdownListener`] and is expected to return once shutdown is
//! requested.
//!
//! Shutdown is signalled by dropping the only sender of a zero-capacity
//! channel. A disconnected channel is ready forever, so the listener's
//! receiver can sit in a `select!` next to any other blocking receive and will
//! wake it, and it can serve as an interruptible sleep via
//! [`ShutdownListener::sleep`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use parking_lot::{Condvar, Mutex};

use crate::error::{Result, ServerError};
use crate::logging::targets;

/// The receiving half of a shutdown request.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    receiver: Receiver<()>,
}

impl ShutdownListener {
    /// The underlying receiver, for use in `select!`.
    ///
    /// It becomes ready (disconnected) once shutdown is requested and stays
    /// ready.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }

    /// Whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `interval` unless shutdown is requested first.
    ///
    /// Returns `true` if the sleep was cut short by shutdown.
    pub fn sleep(&self, interval: Duration) -> bool {
        matches!(
            self.receiver.recv_timeout(interval),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

/// The sending half of a shutdown request.
#[derive(Debug)]
pub struct ShutdownSignal {
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl ShutdownSignal {
    /// Create a signal that has not fired.
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    /// A listener for this signal.
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.receiver.clone(),
        }
    }

    /// Fire the signal, waking every listener. Idempotent.
    pub fn fire(&self) {
        self.sender.lock().take();
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

struct ServiceState {
    finished: Mutex<bool>,
    condvar: Condvar,
}

impl ServiceState {
    fn mark_finished(&self) {
        let mut finished = self.finished.lock();
        *finished = true;
        self.condvar.notify_all();
    }
}

/// A named background loop.
pub struct ServiceThread {
    name: String,
    shutdown: ShutdownSignal,
    handle: Mutex<Option<JoinHandle<()>>>,
    state: Arc<ServiceState>,
}

impl ServiceThread {
    /// Spawn `body` on a new thread called `name`.
    ///
    /// `body` receives the listener it must watch and should return promptly
    /// once shutdown is requested.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self>
    where
        F: FnOnce(ShutdownListener) + Send + 'static,
    {
        let name = name.into();
        let shutdown = ShutdownSignal::new();
        let listener = shutdown.listener();
        let state = Arc::new(ServiceState {
            finished: Mutex::new(false),
            condvar: Condvar::new(),
        });

        let thread_state = state.clone();
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                tracing::debug!(target: targets::SERVER, thread = %thread_name, "service started");
                body(listener);
                thread_state.mark_finished();
                tracing::debug!(target: targets::SERVER, thread = %thread_name, "service stopped");
            })
            .map_err(|source| ServerError::Spawn {
                name: name.clone(),
                source,
            })?;

        Ok(Self {
            name,
            shutdown,
            handle: Mutex::new(Some(handle)),
            state,
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the loop has not returned yet.
    pub fn is_running(&self) -> bool {
        !*self.state.finished.lock()
    }

    /// Request the loop to stop. Non-blocking; use [`join`](Self::join) to
    /// wait for it.
    pub fn stop(&self) {
        self.shutdown.fire();
    }

    /// Wait for the thread to exit.
    ///
    /// Returns `true` if the thread was joined, `false` if it was already
    /// joined or panicked.
    pub fn join(&self) -> bool {
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => handle.join().is_ok(),
            None => false,
        }
    }

    /// Stop the loop and wait for it to exit.
    pub fn stop_and_join(&self) -> bool {
        self.stop();
        self.join()
    }

    /// Wait for the loop to return, up to `timeout`.
    ///
    /// Returns `true` if it returned within the timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut finished = self.state.finished.lock();
        if !*finished {
            self.state.condvar.wait_for(&mut finished, timeout);
        }
        *finished
    }
}

impl Drop for ServiceThread {
    fn drop(&mut self) {
        // Don't block in drop, just request shutdown.
        self.stop();
    }
}
