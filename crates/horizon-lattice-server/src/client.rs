//! Client side of the command protocol.
//!
//! [`ClientLink`] is what an application process holds after connecting: its
//! reply port (where broadcasts arrive), the listening port and execution
//! context the server assigned to it, and helpers for each request.

use std::sync::Arc;
use std::time::Duration;

use crate::display::DisplayMode;
use crate::error::ClientError;
use crate::palette::Palette;
use crate::port::{Envelope, Port, PortLink, PortTable};
use crate::process::ProcessId;
use crate::protocol::{self, Request};
use crate::session::ContextHandle;

/// A connected application.
pub struct ClientLink {
    pid: ProcessId,
    signature: String,
    server: PortLink,
    reply: Port,
    queries: Port,
    listener: PortLink,
    context: ContextHandle,
    timeout: Duration,
}

impl std::fmt::Debug for ClientLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientLink")
            .field("pid", &self.pid)
            .field("signature", &self.signature)
            .field("listener", &self.listener)
            .field("context", &self.context)
            .finish()
    }
}

impl ClientLink {
    /// Connect to the server listening on `server`.
    ///
    /// `timeout` bounds every send and every wait for a reply made through
    /// this link.
    pub fn connect(
        ports: &Arc<PortTable>,
        server: PortLink,
        pid: ProcessId,
        signature: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let reply = ports.create(&format!("{signature}:reply"), 64)?;
        let queries = ports.create(&format!("{signature}:query"), 8)?;

        let request = Request::CreateApp {
            pid,
            reply: reply.link(),
            signature: signature.to_string(),
        };
        server.send_timeout(request.encode(), timeout)?;

        let mut response = reply.recv_timeout(timeout)?;
        if response.code() == protocol::SERVER_FALSE {
            return Err(ClientError::Refused(protocol::CREATE_APP));
        }
        let unexpected = ClientError::UnexpectedReply {
            request: protocol::CREATE_APP,
            code: response.code(),
        };
        if response.code() != protocol::SERVER_TRUE {
            return Err(unexpected);
        }
        let listener = response.read_port().ok_or_else(|| unexpected.clone())?;
        let context = response.read_context().ok_or(unexpected)?;

        Ok(Self {
            pid,
            signature: signature.to_string(),
            server,
            reply,
            queries,
            listener,
            context,
            timeout,
        })
    }

    /// Process identifier this link registered with.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Signature this link registered with.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The listening port the server assigned.
    pub fn listener(&self) -> &PortLink {
        &self.listener
    }

    /// The session's execution context.
    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    /// Wait for the next broadcast notification.
    pub fn next_notification(&self) -> Result<i32, ClientError> {
        Ok(self.reply.recv_timeout(self.timeout)?.code())
    }

    /// The next broadcast notification, if one is queued.
    pub fn try_notification(&self) -> Option<i32> {
        self.reply.try_recv().map(|envelope| envelope.code())
    }

    fn send(&self, request: Request) -> Result<(), ClientError> {
        self.server.send_timeout(request.encode(), self.timeout)?;
        Ok(())
    }

    fn query(&self, request: Request) -> Result<Envelope, ClientError> {
        self.send(request)?;
        Ok(self.queries.recv_timeout(self.timeout)?)
    }

    /// Replace the system palette.
    pub fn set_palette(&self, palette: Palette) -> Result<(), ClientError> {
        self.send(Request::SetPalette(palette))
    }

    /// Select a decorator add-on by name.
    pub fn set_decorator(&self, name: &str) -> Result<(), ClientError> {
        self.send(Request::SetDecorator(name.to_string()))
    }

    /// Name of the active decorator.
    pub fn get_decorator(&self) -> Result<String, ClientError> {
        let mut reply = self.query(Request::GetDecorator {
            reply: self.queries.link(),
        })?;
        let code = reply.code();
        match reply.read_text() {
            Some(name) if code == protocol::GET_DECORATOR => Ok(name),
            _ => Err(ClientError::UnexpectedReply {
                request: protocol::GET_DECORATOR,
                code,
            }),
        }
    }

    /// The display mode currently in effect.
    pub fn get_screen_mode(&self) -> Result<DisplayMode, ClientError> {
        let mut reply = self.query(Request::GetScreenMode {
            reply: self.queries.link(),
        })?;
        let code = reply.code();
        match reply.read_mode() {
            Some(mode) if code == protocol::GET_SCREEN_MODE => Ok(mode),
            _ => Err(ClientError::UnexpectedReply {
                request: protocol::GET_SCREEN_MODE,
                code,
            }),
        }
    }

    /// Whether the font list changed since the last refresh.
    pub fn fonts_changed(&self) -> Result<bool, ClientError> {
        let reply = self.query(Request::QueryFontsChanged {
            reply: self.queries.link(),
        })?;
        match reply.code() {
            protocol::SERVER_TRUE => Ok(true),
            protocol::SERVER_FALSE => Ok(false),
            code => Err(ClientError::UnexpectedReply {
                request: protocol::QUERY_FONTS_CHANGED,
                code,
            }),
        }
    }

    /// Tell the server this client refreshed its font list.
    pub fn fonts_refreshed(&self) -> Result<(), ClientError> {
        self.send(Request::UpdatedClientFontList)
    }

    /// Ask the server to shut down.
    pub fn request_server_quit(&self) -> Result<(), ClientError> {
        self.send(Request::Quit)
    }

    /// Disconnect: finish the execution context, then ask the server to
    /// delete the session.
    pub fn quit(self) -> Result<(), ClientError> {
        self.context.finish();
        self.send(Request::DeleteApp {
            context: self.context.id(),
        })
    }
}
