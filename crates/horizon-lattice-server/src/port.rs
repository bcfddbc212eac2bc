//! Named message ports and the envelopes that travel through them.
//!
//! Every conduit in the server is a [`Port`]: a bounded queue with a name,
//! allocated from a shared [`PortTable`]. The table enforces a global port
//! limit, which is how channel exhaustion shows up, and lets a process look a
//! port up by name. Senders hold a cheap, cloneable [`PortLink`].
//!
//! Messages are [`Envelope`]s: a request code followed by a sequence of typed
//! attachments that the receiver reads back in order.
//!
//! # Example
//!
//! ```
//! use horizon_lattice_server::port::{Envelope, PortTable};
//!
//! let table = PortTable::new(16);
//! let port = table.create("example", 8).unwrap();
//!
//! port.link().post(Envelope::new(42).with_int(7).with_text("hello")).unwrap();
//!
//! let mut msg = port.try_recv().unwrap();
//! assert_eq!(msg.code(), 42);
//! assert_eq!(msg.read_int(), Some(7));
//! assert_eq!(msg.read_text().as_deref(), Some("hello"));
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::Mutex;

use crate::display::DisplayMode;
use crate::error::PortError;
use crate::logging::targets;
use crate::palette::Palette;
use crate::session::ContextHandle;

/// Identifier of a port, unique for the lifetime of its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(u32);

impl PortId {
    /// The raw numeric value.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port#{}", self.0)
    }
}

/// A single typed attachment inside an [`Envelope`].
#[derive(Debug, Clone)]
pub enum Attachment {
    /// An integer (codes, indices, process ids).
    Int(i64),
    /// A string (signatures, decorator names).
    Text(String),
    /// A link to another port (reply channels).
    Port(PortLink),
    /// A full color palette.
    Palette(Box<Palette>),
    /// A display mode descriptor.
    Mode(DisplayMode),
    /// A session execution context.
    Context(ContextHandle),
}

/// A message: a code plus ordered attachments.
#[derive(Debug, Clone)]
pub struct Envelope {
    code: i32,
    attachments: VecDeque<Attachment>,
}

impl Envelope {
    /// Create an envelope with no attachments.
    pub fn new(code: i32) -> Self {
        Self {
            code,
            attachments: VecDeque::new(),
        }
    }

    /// The message code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Number of attachments not yet read.
    pub fn remaining(&self) -> usize {
        self.attachments.len()
    }

    /// Append an attachment.
    pub fn attach(&mut self, attachment: Attachment) {
        self.attachments.push_back(attachment);
    }

    /// Append an integer.
    pub fn with_int(mut self, value: i64) -> Self {
        self.attach(Attachment::Int(value));
        self
    }

    /// Append a string.
    pub fn with_text(mut self, value: impl Into<String>) -> Self {
        self.attach(Attachment::Text(value.into()));
        self
    }

    /// Append a port link.
    pub fn with_port(mut self, link: PortLink) -> Self {
        self.attach(Attachment::Port(link));
        self
    }

    /// Append a palette.
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.attach(Attachment::Palette(Box::new(palette)));
        self
    }

    /// Append a display mode.
    pub fn with_mode(mut self, mode: DisplayMode) -> Self {
        self.attach(Attachment::Mode(mode));
        self
    }

    /// Append an execution context handle.
    pub fn with_context(mut self, context: ContextHandle) -> Self {
        self.attach(Attachment::Context(context));
        self
    }

    // Each reader consumes the next attachment, matching or not, the same way
    // a byte-stream reader advances past a field of the wrong type.

    /// Read the next attachment as an integer.
    pub fn read_int(&mut self) -> Option<i64> {
        match self.attachments.pop_front()? {
            Attachment::Int(value) => Some(value),
            _ => None,
        }
    }

    /// Read the next attachment as a string.
    pub fn read_text(&mut self) -> Option<String> {
        match self.attachments.pop_front()? {
            Attachment::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Read the next attachment as a port link.
    pub fn read_port(&mut self) -> Option<PortLink> {
        match self.attachments.pop_front()? {
            Attachment::Port(link) => Some(link),
            _ => None,
        }
    }

    /// Read the next attachment as a palette.
    pub fn read_palette(&mut self) -> Option<Palette> {
        match self.attachments.pop_front()? {
            Attachment::Palette(palette) => Some(*palette),
            _ => None,
        }
    }

    /// Read the next attachment as a display mode.
    pub fn read_mode(&mut self) -> Option<DisplayMode> {
        match self.attachments.pop_front()? {
            Attachment::Mode(mode) => Some(mode),
            _ => None,
        }
    }

    /// Read the next attachment as an execution context handle.
    pub fn read_context(&mut self) -> Option<ContextHandle> {
        match self.attachments.pop_front()? {
            Attachment::Context(context) => Some(context),
            _ => None,
        }
    }
}

/// The sending side of a port. Cheap to clone.
#[derive(Clone)]
pub struct PortLink {
    id: PortId,
    name: Arc<str>,
    sender: Sender<Envelope>,
}

impl fmt::Debug for PortLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortLink")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl PortLink {
    /// Identifier of the target port.
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Name of the target port.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post a message without blocking.
    ///
    /// Fails with [`PortError::Full`] when the backlog is full and with
    /// [`PortError::Deleted`] once the port has been dropped.
    pub fn post(&self, envelope: Envelope) -> Result<(), PortError> {
        self.sender.try_send(envelope).map_err(|err| match err {
            TrySendError::Full(_) => PortError::Full(self.name.to_string()),
            TrySendError::Disconnected(_) => PortError::Deleted(self.name.to_string()),
        })
    }

    /// Send a message, blocking while the backlog is full.
    pub fn send(&self, envelope: Envelope) -> Result<(), PortError> {
        self.sender
            .send(envelope)
            .map_err(|_| PortError::Deleted(self.name.to_string()))
    }

    /// Send a message, blocking at most `timeout` while the backlog is full.
    pub fn send_timeout(&self, envelope: Envelope, timeout: Duration) -> Result<(), PortError> {
        self.sender
            .send_timeout(envelope, timeout)
            .map_err(|err| match err {
                crossbeam_channel::SendTimeoutError::Timeout(_) => {
                    PortError::TimedOut(self.name.to_string())
                }
                crossbeam_channel::SendTimeoutError::Disconnected(_) => {
                    PortError::Deleted(self.name.to_string())
                }
            })
    }

    /// Number of messages waiting in the port.
    pub fn backlog(&self) -> usize {
        self.sender.len()
    }
}

/// A port: the receiving side plus its registration in the table.
///
/// Dropping the port releases its slot in the table and makes further posts
/// to its links fail with [`PortError::Deleted`].
pub struct Port {
    link: PortLink,
    receiver: Receiver<Envelope>,
    capacity: usize,
    table: Weak<PortTable>,
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.link.id)
            .field("name", &self.link.name)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Port {
    /// Identifier of this port.
    pub fn id(&self) -> PortId {
        self.link.id
    }

    /// Name of this port.
    pub fn name(&self) -> &str {
        &self.link.name
    }

    /// Maximum backlog.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A new sending link to this port.
    pub fn link(&self) -> PortLink {
        self.link.clone()
    }

    /// The raw receiver, for use in `crossbeam_channel::select!`.
    pub fn receiver(&self) -> &Receiver<Envelope> {
        &self.receiver
    }

    /// Block until a message arrives.
    pub fn recv(&self) -> Result<Envelope, PortError> {
        self.receiver
            .recv()
            .map_err(|_| PortError::Deleted(self.link.name.to_string()))
    }

    /// Block until a message arrives or `timeout` elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Envelope, PortError> {
        self.receiver.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => PortError::TimedOut(self.link.name.to_string()),
            RecvTimeoutError::Disconnected => PortError::Deleted(self.link.name.to_string()),
        })
    }

    /// Take a message if one is waiting.
    pub fn try_recv(&self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.release(self.link.id);
        }
    }
}

struct TableInner {
    next_id: u32,
    live: BTreeMap<PortId, PortLink>,
}

impl TableInner {
    /// Next id that is neither zero nor held by a live port. The caller has
    /// checked that the table is below its limit, so a free id exists.
    fn allocate_id(&mut self) -> PortId {
        loop {
            let candidate = PortId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1);
            if candidate.0 != 0 && !self.live.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

/// Process-wide table of live ports.
pub struct PortTable {
    inner: Mutex<TableInner>,
    limit: usize,
}

impl PortTable {
    /// Create a table that allows at most `limit` live ports.
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(TableInner {
                next_id: 1,
                live: BTreeMap::new(),
            }),
            limit,
        })
    }

    /// Allocate a new port.
    ///
    /// Names need not be unique; [`find`](Self::find) returns the oldest
    /// live port with a given name.
    pub fn create(self: &Arc<Self>, name: &str, capacity: usize) -> Result<Port, PortError> {
        if capacity == 0 {
            return Err(PortError::ZeroCapacity);
        }

        let mut inner = self.inner.lock();
        if inner.live.len() >= self.limit {
            tracing::error!(
                target: targets::PORTS,
                name,
                limit = self.limit,
                "port table exhausted"
            );
            return Err(PortError::Exhausted { limit: self.limit });
        }

        let id = inner.allocate_id();

        let (sender, receiver) = bounded(capacity);
        let link = PortLink {
            id,
            name: Arc::from(name),
            sender,
        };
        inner.live.insert(id, link.clone());
        drop(inner);

        tracing::trace!(target: targets::PORTS, %id, name, capacity, "port created");

        Ok(Port {
            link,
            receiver,
            capacity,
            table: Arc::downgrade(self),
        })
    }

    /// Find a live port by name.
    pub fn find(&self, name: &str) -> Option<PortLink> {
        self.inner
            .lock()
            .live
            .values()
            .find(|link| &*link.name == name)
            .cloned()
    }

    /// Number of live ports.
    pub fn count(&self) -> usize {
        self.inner.lock().live.len()
    }

    /// The port limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    fn release(&self, id: PortId) {
        if self.inner.lock().live.remove(&id).is_some() {
            tracing::trace!(target: targets::PORTS, %id, "port deleted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find() {
        let table = PortTable::new(8);
        let port = table.create("alpha", 4).unwrap();

        assert_eq!(table.count(), 1);
        assert_eq!(port.capacity(), 4);
        let found = table.find("alpha").unwrap();
        assert_eq!(found.id(), port.id());
        assert!(table.find("beta").is_none());
    }

    #[test]
    fn test_find_returns_oldest_duplicate() {
        let table = PortTable::new(8);
        let first = table.create("dup", 1).unwrap();
        let _second = table.create("dup", 1).unwrap();

        assert_eq!(table.find("dup").unwrap().id(), first.id());
    }

    #[test]
    fn test_drop_releases_slot() {
        let table = PortTable::new(1);
        let port = table.create("only", 1).unwrap();
        let link = port.link();

        assert_eq!(
            table.create("second", 1).unwrap_err(),
            PortError::Exhausted { limit: 1 }
        );

        drop(port);
        assert_eq!(table.count(), 0);
        assert!(matches!(
            link.post(Envelope::new(1)),
            Err(PortError::Deleted(_))
        ));
        assert!(table.create("second", 1).is_ok());
    }

    #[test]
    fn test_ids_skip_live_ports_after_wrap() {
        let table = PortTable::new(8);
        let first = table.create("first", 1).unwrap();
        let second = table.create("second", 1).unwrap();
        table.inner.lock().next_id = u32::MAX;

        let last = table.create("last", 1).unwrap();
        let wrapped = table.create("wrapped", 1).unwrap();

        assert_eq!(last.id().as_raw(), u32::MAX);
        assert_eq!(wrapped.id().as_raw(), 3);
        assert_eq!(table.count(), 4);
        assert_eq!(table.find("first").unwrap().id(), first.id());
        assert_eq!(table.find("second").unwrap().id(), second.id());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let table = PortTable::new(4);
        assert_eq!(table.create("zero", 0).unwrap_err(), PortError::ZeroCapacity);
    }

    #[test]
    fn test_post_full_backlog() {
        let table = PortTable::new(4);
        let port = table.create("small", 1).unwrap();
        let link = port.link();

        link.post(Envelope::new(1)).unwrap();
        assert_eq!(link.backlog(), 1);
        assert!(matches!(
            link.post(Envelope::new(2)),
            Err(PortError::Full(_))
        ));
        assert_eq!(port.try_recv().unwrap().code(), 1);
    }

    #[test]
    fn test_recv_timeout() {
        let table = PortTable::new(4);
        let port = table.create("quiet", 1).unwrap();
        assert!(matches!(
            port.recv_timeout(Duration::from_millis(10)),
            Err(PortError::TimedOut(_))
        ));
    }

    #[test]
    fn test_reader_consumes_mismatched_field() {
        let mut msg = Envelope::new(5).with_text("sig").with_int(3);
        assert_eq!(msg.remaining(), 2);
        assert_eq!(msg.read_int(), None);
        assert_eq!(msg.read_int(), Some(3));
        assert_eq!(msg.read_int(), None);
        assert_eq!(msg.remaining(), 0);
    }

    #[test]
    fn test_port_links_travel_in_envelopes() {
        let table = PortTable::new(4);
        let server = table.create("server", 4).unwrap();
        let reply = table.create("reply", 4).unwrap();

        server
            .link()
            .post(Envelope::new(9).with_port(reply.link()))
            .unwrap();

        let mut msg = server.try_recv().unwrap();
        let reply_link = msg.read_port().unwrap();
        reply_link.post(Envelope::new(10)).unwrap();
        assert_eq!(reply.try_recv().unwrap().code(), 10);
    }
}
