//! Error types for the display server.
//!
//! Almost nothing in the server is allowed to fail loudly: the dispatcher
//! turns every error below into a log line and carries on. The types exist so
//! that the lower layers can say *what* went wrong and the caller can decide
//! how loud to be about it.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while starting or configuring the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Another server already owns the well-known command port.
    #[error("a server is already registered on port '{0}'")]
    AlreadyRunning(String),

    /// A port required at startup could not be allocated.
    #[error("failed to allocate server port: {0}")]
    Port(#[from] PortError),

    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`ServerConfig`](crate::ServerConfig).
    #[error("invalid configuration {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A background loop thread could not be spawned.
    #[error("failed to spawn '{name}' thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the port table and port links.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    /// The table has handed out every port it is allowed to.
    #[error("no more ports available (limit {limit})")]
    Exhausted { limit: usize },

    /// A port cannot be created with zero capacity.
    #[error("port capacity must be non-zero")]
    ZeroCapacity,

    /// The receiving side of the port is gone.
    #[error("port '{0}' has been deleted")]
    Deleted(String),

    /// The port's backlog is full.
    #[error("port '{0}' is full")]
    Full(String),

    /// No message arrived before the deadline.
    #[error("timed out waiting on port '{0}'")]
    TimedOut(String),
}

/// Errors raised while loading a decorator add-on.
#[derive(Error, Debug)]
pub enum PluginError {
    /// The module could not be opened.
    #[error("cannot open decorator module {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// The module was opened but does not export the factory symbol.
    #[error("decorator module {path} does not export {symbol}()")]
    MissingSymbol { path: PathBuf, symbol: &'static str },
}

/// Errors raised while decoding a request envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The envelope code is not a known request.
    #[error("unknown request code {0:#x}")]
    UnknownCode(i32),

    /// A required attachment is missing.
    #[error("request {code:#x} is missing its {field}")]
    MissingField { code: i32, field: &'static str },

    /// An attachment is present but its value is unacceptable.
    #[error("request {code:#x} has an invalid {field}")]
    InvalidField { code: i32, field: &'static str },
}

/// Errors raised on the client side of the protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Sending or receiving failed.
    #[error(transparent)]
    Port(#[from] PortError),

    /// The server could not carry out the request.
    #[error("server refused request {0:#x}")]
    Refused(i32),

    /// The server answered with something other than the expected reply.
    #[error("unexpected reply {code:#x} to request {request:#x}")]
    UnexpectedReply { request: i32, code: i32 },
}

/// Errors raised by process control collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The process does not exist (already exited).
    #[error("process {0} not found")]
    NotFound(u32),

    /// The operating system refused to terminate the process.
    #[error("failed to terminate process {0}")]
    KillFailed(u32),
}

/// Errors raised while reading or writing persisted UI settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// I/O failure on the settings file.
    #[error("settings I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for the expected shape.
    #[error("malformed settings file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A specialized Result type for server startup.
pub type Result<T> = std::result::Result<T, ServerError>;
