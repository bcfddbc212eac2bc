//! Wire protocol of the command port.
//!
//! Request and notification codes, and the typed [`Request`] a command
//! envelope decodes into. Decoding consumes the envelope's attachments in the
//! order the protocol defines for each code.

use crate::error::ProtocolError;
use crate::palette::Palette;
use crate::port::{Envelope, PortLink};
use crate::process::ProcessId;
use crate::session::ContextId;

/// Pack a four-character code into an envelope code.
pub const fn four_cc(code: &[u8; 4]) -> i32 {
    i32::from_be_bytes(*code)
}

const BASE: i32 = four_cc(b"AS\0\0");

// Replies.
pub const SERVER_TRUE: i32 = BASE;
pub const SERVER_FALSE: i32 = BASE + 1;

// Requests.
pub const CREATE_APP: i32 = BASE + 0x10;
pub const DELETE_APP: i32 = BASE + 0x11;
pub const SET_UI_COLORS: i32 = BASE + 0x12;
pub const SET_DECORATOR: i32 = BASE + 0x13;
pub const GET_DECORATOR: i32 = BASE + 0x14;
pub const GET_SCREEN_MODE: i32 = BASE + 0x15;
pub const UPDATED_CLIENT_FONTLIST: i32 = BASE + 0x16;
pub const QUERY_FONTS_CHANGED: i32 = BASE + 0x17;
pub const R5_SET_DECORATOR: i32 = BASE + 0x18;
pub const SET_SYSCURSOR_DEFAULTS: i32 = BASE + 0x19;
/// Asks the server to quit. Also synthesized into a session's listening port
/// when its client is killed.
pub const QUIT_REQUESTED: i32 = four_cc(b"_QRQ");

// Notifications broadcast to clients.
pub const UPDATE_COLORS: i32 = BASE + 0x20;
pub const UPDATE_DECORATOR: i32 = BASE + 0x21;
pub const QUIT_APP: i32 = BASE + 0x22;

/// Decorator add-ons selectable through [`Request::R5SetDecorator`], by index.
pub const R5_DECORATORS: [&str; 4] = ["BeOS", "AmigaOS", "Windows", "MacOS"];

/// A decoded command.
#[derive(Debug, Clone)]
pub enum Request {
    /// Register a client. Attachments: pid, reply port, signature.
    CreateApp {
        pid: ProcessId,
        reply: PortLink,
        signature: String,
    },
    /// Unregister the session serviced by `context`.
    DeleteApp { context: ContextId },
    /// Replace the palette.
    SetPalette(Palette),
    /// Select a decorator add-on by file name.
    SetDecorator(String),
    /// Ask for the active decorator's name.
    GetDecorator { reply: PortLink },
    /// Ask for the current display mode.
    GetScreenMode { reply: PortLink },
    /// Clients refreshed their font lists.
    UpdatedClientFontList,
    /// Ask whether the font list changed since the last refresh.
    QueryFontsChanged { reply: PortLink },
    /// Select one of the [`R5_DECORATORS`] by index.
    R5SetDecorator(i64),
    /// Reset the cursor to the system defaults.
    SetSysCursorDefaults,
    /// Shut the server down.
    Quit,
}

impl Request {
    /// Decode a command envelope.
    pub fn decode(mut envelope: Envelope) -> Result<Self, ProtocolError> {
        let code = envelope.code();
        let missing = |field| ProtocolError::MissingField { code, field };

        let request = match code {
            CREATE_APP => {
                let pid = envelope.read_int().ok_or_else(|| missing("pid"))?;
                let reply = envelope.read_port().ok_or_else(|| missing("reply port"))?;
                let signature = envelope.read_text().ok_or_else(|| missing("signature"))?;

                let pid = ProcessId::try_from(pid)
                    .ok()
                    .filter(|&pid| pid != 0)
                    .ok_or(ProtocolError::InvalidField { code, field: "pid" })?;
                if signature.is_empty() {
                    return Err(ProtocolError::InvalidField {
                        code,
                        field: "signature",
                    });
                }
                Self::CreateApp {
                    pid,
                    reply,
                    signature,
                }
            }
            DELETE_APP => {
                let raw = envelope.read_int().ok_or_else(|| missing("context id"))?;
                let raw = u64::try_from(raw).map_err(|_| ProtocolError::InvalidField {
                    code,
                    field: "context id",
                })?;
                Self::DeleteApp {
                    context: ContextId::from_raw(raw),
                }
            }
            SET_UI_COLORS => Self::SetPalette(envelope.read_palette().ok_or_else(|| missing("palette"))?),
            SET_DECORATOR => Self::SetDecorator(envelope.read_text().ok_or_else(|| missing("name"))?),
            GET_DECORATOR => Self::GetDecorator {
                reply: envelope.read_port().ok_or_else(|| missing("reply port"))?,
            },
            GET_SCREEN_MODE => Self::GetScreenMode {
                reply: envelope.read_port().ok_or_else(|| missing("reply port"))?,
            },
            UPDATED_CLIENT_FONTLIST => Self::UpdatedClientFontList,
            QUERY_FONTS_CHANGED => Self::QueryFontsChanged {
                reply: envelope.read_port().ok_or_else(|| missing("reply port"))?,
            },
            R5_SET_DECORATOR => Self::R5SetDecorator(envelope.read_int().ok_or_else(|| missing("index"))?),
            SET_SYSCURSOR_DEFAULTS => Self::SetSysCursorDefaults,
            QUIT_REQUESTED => Self::Quit,
            other => return Err(ProtocolError::UnknownCode(other)),
        };
        Ok(request)
    }

    /// The envelope code of this request.
    pub fn code(&self) -> i32 {
        match self {
            Self::CreateApp { .. } => CREATE_APP,
            Self::DeleteApp { .. } => DELETE_APP,
            Self::SetPalette(_) => SET_UI_COLORS,
            Self::SetDecorator(_) => SET_DECORATOR,
            Self::GetDecorator { .. } => GET_DECORATOR,
            Self::GetScreenMode { .. } => GET_SCREEN_MODE,
            Self::UpdatedClientFontList => UPDATED_CLIENT_FONTLIST,
            Self::QueryFontsChanged { .. } => QUERY_FONTS_CHANGED,
            Self::R5SetDecorator(_) => R5_SET_DECORATOR,
            Self::SetSysCursorDefaults => SET_SYSCURSOR_DEFAULTS,
            Self::Quit => QUIT_REQUESTED,
        }
    }

    /// Encode this request as an envelope.
    pub fn encode(self) -> Envelope {
        let envelope = Envelope::new(self.code());
        match self {
            Self::CreateApp {
                pid,
                reply,
                signature,
            } => envelope
                .with_int(i64::from(pid))
                .with_port(reply)
                .with_text(signature),
            Self::DeleteApp { context } => envelope.with_int(context.as_raw() as i64),
            Self::SetPalette(palette) => envelope.with_palette(palette),
            Self::SetDecorator(name) => envelope.with_text(name),
            Self::GetDecorator { reply }
            | Self::GetScreenMode { reply }
            | Self::QueryFontsChanged { reply } => envelope.with_port(reply),
            Self::R5SetDecorator(index) => envelope.with_int(index),
            Self::UpdatedClientFontList | Self::SetSysCursorDefaults | Self::Quit => envelope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortTable;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            SERVER_TRUE,
            SERVER_FALSE,
            CREATE_APP,
            DELETE_APP,
            SET_UI_COLORS,
            SET_DECORATOR,
            GET_DECORATOR,
            GET_SCREEN_MODE,
            UPDATED_CLIENT_FONTLIST,
            QUERY_FONTS_CHANGED,
            R5_SET_DECORATOR,
            SET_SYSCURSOR_DEFAULTS,
            QUIT_REQUESTED,
            UPDATE_COLORS,
            UPDATE_DECORATOR,
            QUIT_APP,
        ];
        let unique: std::collections::BTreeSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_decode_create_app() {
        let table = PortTable::new(4);
        let reply = table.create("reply", 4).unwrap();

        let request = Request::CreateApp {
            pid: 42,
            reply: reply.link(),
            signature: "application/x-vnd.test".to_string(),
        };
        match Request::decode(request.encode()).unwrap() {
            Request::CreateApp {
                pid,
                reply: link,
                signature,
            } => {
                assert_eq!(pid, 42);
                assert_eq!(link.id(), reply.id());
                assert_eq!(signature, "application/x-vnd.test");
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_malformed_create_app() {
        let table = PortTable::new(4);
        let reply = table.create("reply", 4).unwrap();

        let missing_signature = Envelope::new(CREATE_APP).with_int(1).with_port(reply.link());
        assert_eq!(
            Request::decode(missing_signature).unwrap_err(),
            ProtocolError::MissingField {
                code: CREATE_APP,
                field: "signature"
            }
        );

        let out_of_order = Envelope::new(CREATE_APP)
            .with_port(reply.link())
            .with_int(1)
            .with_text("sig");
        assert!(Request::decode(out_of_order).is_err());

        let negative_pid = Envelope::new(CREATE_APP)
            .with_int(-5)
            .with_port(reply.link())
            .with_text("sig");
        assert_eq!(
            Request::decode(negative_pid).unwrap_err(),
            ProtocolError::InvalidField {
                code: CREATE_APP,
                field: "pid"
            }
        );

        let empty_signature = Envelope::new(CREATE_APP)
            .with_int(1)
            .with_port(reply.link())
            .with_text("");
        assert!(Request::decode(empty_signature).is_err());
    }

    #[test]
    fn test_decode_simple_requests() {
        assert!(matches!(
            Request::decode(Envelope::new(QUIT_REQUESTED)).unwrap(),
            Request::Quit
        ));
        assert!(matches!(
            Request::decode(Envelope::new(DELETE_APP).with_int(9)).unwrap(),
            Request::DeleteApp { context } if context.as_raw() == 9
        ));
        assert!(matches!(
            Request::decode(Envelope::new(R5_SET_DECORATOR).with_int(2)).unwrap(),
            Request::R5SetDecorator(2)
        ));
        assert!(matches!(
            Request::decode(Envelope::new(GET_DECORATOR)).unwrap_err(),
            ProtocolError::MissingField { code: GET_DECORATOR, .. }
        ));
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(
            Request::decode(Envelope::new(0x1234)).unwrap_err(),
            ProtocolError::UnknownCode(0x1234)
        );
    }
}
