//! Display server core for Horizon Lattice.
//!
//! This crate is the process every graphical application connects to. It
//! provides:
//!
//! - **Command Dispatcher**: [`AppServer`] serves the well-known command port,
//!   handling application lifecycle, configuration requests and shutdown
//! - **Session Registry**: one record per connected application, with its
//!   listening port and execution context
//! - **Global UI State**: the shared palette, cursor and active decorator,
//!   broadcast to every client on change
//! - **Decorator Add-ons**: window chrome loaded from shared libraries through
//!   a single factory entry point
//! - **Event Intake and Health Monitor**: the two background loops, stopped
//!   cooperatively at shutdown
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use horizon_lattice_server::{AppServer, ClientLink, Collaborators, ServerConfig, ServerState};
//! use horizon_lattice_server::port::PortTable;
//! use horizon_lattice_server::protocol::Request;
//!
//! let settings = std::env::temp_dir().join("horizon-lattice-doc");
//! let config = ServerConfig::new()
//!     .with_settings_dir(&settings)
//!     .with_font_dirs(Vec::new());
//! let ports = PortTable::new(config.max_ports);
//! let mut server = AppServer::new(config, ports.clone(), Collaborators::system())?;
//! let command = server.command_link();
//! let runner = std::thread::spawn(move || server.run());
//!
//! let client = ClientLink::connect(&ports, command.clone(), 4242, "application/x-vnd.doc", Duration::from_secs(5))?;
//! assert_eq!(client.get_decorator()?, "Default");
//! client.quit()?;
//!
//! command.send(Request::Quit.encode())?;
//!
//! assert_eq!(runner.join().unwrap(), ServerState::Terminated);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod config;
pub mod decorator;
pub mod display;
mod dispatcher;
mod error;
pub mod fonts;
pub mod input;
pub mod logging;
pub mod monitor;
pub mod palette;
pub mod port;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod session;
pub mod testing;
pub mod ui_state;

pub use client::ClientLink;
pub use config::{FontSpec, ServerConfig};
pub use dispatcher::{AppServer, Collaborators, ServerState, ShutdownReport};
pub use error::{
    ClientError, PluginError, PortError, ProcessError, ProtocolError, Result, ServerError,
    SettingsError,
};
pub use palette::{ColorRole, Palette, Rgba};
pub use registry::{SessionId, SessionRegistry};
pub use session::{ContextHandle, ContextId, SessionInfo};
pub use ui_state::{CursorId, UiState};
