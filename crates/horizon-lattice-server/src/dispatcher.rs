//! The command dispatcher.
//!
//! [`AppServer`] owns the server's state and runs the command loop on the
//! calling thread. It starts the event intake and health monitor loops when it
//! is created and tears them down when a Quit request drives it to
//! [`ServerState::Terminated`].
//!
//! # Example
//!
//! ```no_run
//! use horizon_lattice_server::{AppServer, Collaborators, ServerConfig, port::PortTable};
//!
//! let config = ServerConfig::default();
//! let ports = PortTable::new(config.max_ports);
//! let mut server = AppServer::new(config, ports, Collaborators::system())?;
//! let state = server.run();
//! # Ok::<(), horizon_lattice_server::ServerError>(())
//! ```

use std::path::{Component, Path};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::decorator::BUILTIN_DECORATOR_NAME;
use crate::decorator::loader::{LibraryLoader, ModuleLoader};
use crate::display::{DisplayDriver, HeadlessDriver};
use crate::error::{ProtocolError, Result, ServerError};
use crate::fonts::{DirectoryFontCatalog, FontCatalog, FontRole};
use crate::input::{self, Desktop, TracingDesktop};
use crate::logging::targets;
use crate::monitor;
use crate::palette::Palette;
use crate::port::{Envelope, Port, PortLink, PortTable};
use crate::process::{ProcessControl, ProcessId, SystemProcesses};
use crate::protocol::{self, Request};
use crate::registry::{Removal, SessionRegistry};
use crate::service::ServiceThread;
use crate::session::ContextId;
use crate::ui_state::{DecoratorSettings, UiState};

/// Lifecycle of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Accepting commands.
    Running,
    /// Shutting clients down.
    Draining,
    /// Done. Every later command is ignored.
    Terminated,
}

/// What the shutdown sequence had to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions whose context finished within the drain wait.
    pub finished: usize,
    /// Processes killed because their session did not finish in time.
    pub killed: Vec<ProcessId>,
    /// Quit requests synthesized into listening ports of killed sessions.
    pub synthesized: usize,
}

/// The external systems the server drives.
pub struct Collaborators {
    pub display: Arc<dyn DisplayDriver>,
    pub processes: Arc<dyn ProcessControl>,
    pub modules: Box<dyn ModuleLoader>,
    pub fonts: Box<dyn FontCatalog>,
    pub desktop: Arc<dyn Desktop>,
}

impl Collaborators {
    /// Collaborators backed by the host: headless display, OS processes,
    /// shared-library add-ons and on-disk fonts.
    pub fn system() -> Self {
        Self {
            display: Arc::new(HeadlessDriver::new()),
            processes: Arc::new(SystemProcesses::new()),
            modules: Box::new(LibraryLoader),
            fonts: Box::new(DirectoryFontCatalog::new()),
            desktop: Arc::new(TracingDesktop),
        }
    }
}

/// The display server.
pub struct AppServer {
    config: ServerConfig,
    ports: Arc<PortTable>,
    command_port: Port,
    input_link: PortLink,
    registry: Arc<SessionRegistry>,
    ui: Arc<UiState>,
    fonts: Mutex<Box<dyn FontCatalog>>,
    display: Arc<dyn DisplayDriver>,
    processes: Arc<dyn ProcessControl>,
    intake: ServiceThread,
    monitor: ServiceThread,
    state: ServerState,
    report: Option<ShutdownReport>,
}

impl AppServer {
    /// Start a server on `ports`.
    ///
    /// Fails with [`ServerError::AlreadyRunning`] if the command port name is
    /// already registered in the table.
    pub fn new(config: ServerConfig, ports: Arc<PortTable>, collaborators: Collaborators) -> Result<Self> {
        if ports.find(&config.command_port_name).is_some() {
            return Err(ServerError::AlreadyRunning(config.command_port_name.clone()));
        }

        let command_port = ports.create(&config.command_port_name, config.command_port_capacity)?;
        let input_port = ports.create(&config.input_port_name, config.input_port_capacity)?;
        let input_link = input_port.link();

        let Collaborators {
            display,
            processes,
            modules,
            mut fonts,
            desktop,
        } = collaborators;

        Self::init_fonts(&config, fonts.as_mut());

        let palette = match Palette::load(config.palette_path()) {
            Ok(palette) => palette,
            Err(err) => {
                tracing::info!(target: targets::SERVER, error = %err, "using default colors");
                Palette::default()
            }
        };
        let ui = Arc::new(UiState::new(palette, modules));
        Self::init_decorator(&config, &ui);
        ui.reset_cursor();

        let registry = Arc::new(SessionRegistry::new(ports.clone(), config.session_port_capacity));

        let intake = ServiceThread::spawn("horizon-input", move |shutdown| {
            input::intake_loop(input_port, desktop, shutdown)
        })?;

        let monitor_registry = registry.clone();
        let monitor_processes = processes.clone();
        let interval = config.health_interval();
        let monitor = ServiceThread::spawn("horizon-monitor", move |shutdown| {
            monitor::monitor_loop(monitor_registry, monitor_processes, interval, shutdown)
        })?;

        tracing::info!(
            target: targets::SERVER,
            port = %command_port.id(),
            name = %config.command_port_name,
            "server started"
        );

        Ok(Self {
            config,
            ports,
            command_port,
            input_link,
            registry,
            ui,
            fonts: Mutex::new(fonts),
            display,
            processes,
            intake,
            monitor,
            state: ServerState::Running,
            report: None,
        })
    }

    fn init_fonts(config: &ServerConfig, fonts: &mut dyn FontCatalog) {
        for dir in &config.font_dirs {
            fonts.scan_directory(dir);
        }
        for (role, spec) in [
            (FontRole::Plain, &config.plain_font),
            (FontRole::Bold, &config.bold_font),
            (FontRole::Fixed, &config.fixed_font),
        ] {
            if !fonts.set_system_font(role, spec) {
                tracing::warn!(
                    target: targets::COLLABORATORS,
                    ?role,
                    family = %spec.family,
                    style = %spec.style,
                    size = spec.size,
                    "cannot set system font"
                );
            }
        }
    }

    fn init_decorator(config: &ServerConfig, ui: &UiState) {
        let settings = match DecoratorSettings::load(config.decorator_settings_path()) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!(target: targets::DECORATOR, error = %err, "no decorator settings");
                return;
            }
        };
        if settings.decorator != BUILTIN_DECORATOR_NAME
            && let Some(path) = addon_path(&config.decorators_dir, &settings.decorator)
        {
            ui.load_decorator(Some(&path));
        }
    }

    /// Link to the command port.
    pub fn command_link(&self) -> PortLink {
        self.command_port.link()
    }

    /// Link to the raw input port.
    pub fn input_link(&self) -> PortLink {
        self.input_link.clone()
    }

    /// The port table the server allocates from.
    pub fn ports(&self) -> &Arc<PortTable> {
        &self.ports
    }

    /// The session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The shared UI state.
    pub fn ui(&self) -> &Arc<UiState> {
        &self.ui
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// What the shutdown sequence did, once the server has terminated.
    pub fn shutdown_report(&self) -> Option<&ShutdownReport> {
        self.report.as_ref()
    }

    /// Run the command loop until the server terminates.
    pub fn run(&mut self) -> ServerState {
        while self.state != ServerState::Terminated {
            match self.command_port.recv() {
                Ok(envelope) => {
                    self.dispatch(envelope);
                }
                Err(err) => {
                    tracing::error!(target: targets::DISPATCHER, error = %err, "command port failed");
                    break;
                }
            }
        }
        self.state
    }

    /// Handle one command envelope.
    pub fn dispatch(&mut self, envelope: Envelope) -> ServerState {
        if self.state == ServerState::Terminated {
            tracing::debug!(target: targets::DISPATCHER, code = envelope.code(), "ignoring command after termination");
            return self.state;
        }

        let request = match Request::decode(envelope) {
            Ok(request) => request,
            Err(ProtocolError::UnknownCode(code)) => {
                tracing::warn!(target: targets::DISPATCHER, code = format_args!("{code:#x}"), "unexpected command code");
                return self.state;
            }
            Err(err) => {
                tracing::debug!(target: targets::DISPATCHER, error = %err, "dropping malformed command");
                return self.state;
            }
        };

        match request {
            Request::CreateApp {
                pid,
                reply,
                signature,
            } => self.create_app(pid, reply, &signature),
            Request::DeleteApp { context } => self.delete_app(context),
            Request::SetPalette(palette) => {
                self.ui.set_palette(palette);
                self.broadcast(protocol::UPDATE_COLORS);
            }
            Request::SetDecorator(name) => self.set_decorator(&name),
            Request::GetDecorator { reply } => {
                let name = self.ui.decorator_name();
                reply_to(&reply, Envelope::new(protocol::GET_DECORATOR).with_text(name));
            }
            Request::GetScreenMode { reply } => {
                let mode = self.display.current_mode();
                reply_to(&reply, Envelope::new(protocol::GET_SCREEN_MODE).with_mode(mode));
            }
            Request::UpdatedClientFontList => self.fonts.lock().fonts_updated(),
            Request::QueryFontsChanged { reply } => {
                let changed = self.fonts.lock().needs_update();
                let code = if changed {
                    protocol::SERVER_TRUE
                } else {
                    protocol::SERVER_FALSE
                };
                reply_to(&reply, Envelope::new(code));
            }
            Request::R5SetDecorator(index) => {
                let name = usize::try_from(index)
                    .ok()
                    .and_then(|index| protocol::R5_DECORATORS.get(index));
                match name {
                    Some(name) => self.set_decorator(name),
                    None => tracing::debug!(target: targets::DISPATCHER, index, "no decorator at index"),
                }
            }
            Request::SetSysCursorDefaults => self.ui.reset_cursor(),
            Request::Quit => self.shutdown(),
        }
        self.state
    }

    fn create_app(&self, pid: ProcessId, reply: PortLink, signature: &str) {
        if self.registry.contains_pid(pid) {
            tracing::debug!(target: targets::DISPATCHER, pid, signature, "process already has a session");
            return;
        }

        // Exhaustion is logged by the registry.
        let Ok(created) = self.registry.create_session(pid, reply.clone(), signature) else {
            reply_to(&reply, Envelope::new(protocol::SERVER_FALSE));
            return;
        };

        tracing::info!(target: targets::DISPATCHER, pid, signature, "application connected");
        reply_to(
            &reply,
            Envelope::new(protocol::SERVER_TRUE)
                .with_port(created.listener)
                .with_context(created.context),
        );
    }

    fn delete_app(&self, context: ContextId) {
        match self.registry.remove_by_context(context, self.config.drain_timeout()) {
            Removal::Removed(info) => {
                tracing::info!(
                    target: targets::DISPATCHER,
                    pid = info.pid,
                    signature = %info.signature,
                    "application disconnected"
                );
            }
            Removal::NotFound => {
                tracing::warn!(target: targets::DISPATCHER, %context, "no session for context");
            }
            Removal::StillRunning => {
                tracing::warn!(target: targets::DISPATCHER, %context, "context still running, session kept");
            }
        }
    }

    fn set_decorator(&self, name: &str) {
        let loaded = if name == BUILTIN_DECORATOR_NAME {
            self.ui.load_decorator(None)
        } else {
            match addon_path(&self.config.decorators_dir, name) {
                Some(path) => self.ui.load_decorator(Some(&path)),
                None => {
                    tracing::debug!(target: targets::DISPATCHER, name, "invalid decorator name");
                    false
                }
            }
        };
        if loaded {
            self.broadcast(protocol::UPDATE_DECORATOR);
        }
    }

    /// Post `code` to every client. Returns how many clients it reached.
    ///
    /// Never blocks; a client whose reply port is full or gone misses the
    /// notification.
    pub fn broadcast(&self, code: i32) -> usize {
        let mut delivered = 0;
        self.registry.for_each(|session| match session.notify(code) {
            Ok(()) => delivered += 1,
            Err(err) => {
                tracing::debug!(
                    target: targets::DISPATCHER,
                    session = ?session.id(),
                    error = %err,
                    "notification not delivered"
                );
            }
        });
        delivered
    }

    fn shutdown(&mut self) {
        if !self.config.honor_quit_requests {
            tracing::info!(target: targets::DISPATCHER, "ignoring quit request");
            return;
        }

        tracing::info!(target: targets::DISPATCHER, sessions = self.registry.len(), "shutting down");
        self.state = ServerState::Draining;
        self.broadcast(protocol::QUIT_APP);

        let attempts = self.config.drain_attempts;
        let interval = self.config.drain_interval();
        let processes = self.processes.as_ref();
        let mut report = ShutdownReport::default();
        self.registry.for_each(|session| {
            let context = session.context();
            let finished = context.is_finished()
                || (0..attempts).any(|_| context.wait_timeout(interval));
            if finished {
                report.finished += 1;
                return;
            }

            tracing::warn!(
                target: targets::DISPATCHER,
                pid = session.pid(),
                signature = session.signature(),
                "application did not quit, terminating it"
            );
            match processes.kill(session.pid()) {
                Ok(()) => report.killed.push(session.pid()),
                Err(err) => {
                    tracing::warn!(target: targets::DISPATCHER, error = %err, "cannot terminate application");
                }
            }
            match session.post_to_listener(Envelope::new(protocol::QUIT_REQUESTED)) {
                Ok(()) => report.synthesized += 1,
                Err(err) => {
                    tracing::debug!(target: targets::DISPATCHER, error = %err, "cannot post quit");
                }
            }
            context.finish();
        });

        let removed = self.registry.remove_all();
        tracing::debug!(target: targets::DISPATCHER, removed = removed.len(), "sessions released");

        self.intake.stop();
        self.monitor.stop();
        self.intake.join();
        self.monitor.join();

        self.save_settings();
        self.report = Some(report);
        self.state = ServerState::Terminated;
        tracing::info!(target: targets::SERVER, "server terminated");
    }

    fn save_settings(&self) {
        if let Err(err) = self.ui.palette().save(self.config.palette_path()) {
            tracing::warn!(target: targets::SERVER, error = %err, "cannot save colors");
        }
        if let Err(err) = self
            .ui
            .decorator_settings()
            .save(self.config.decorator_settings_path())
        {
            tracing::warn!(target: targets::SERVER, error = %err, "cannot save decorator settings");
        }
    }
}

/// Resolve an add-on name to a path inside `dir`. Names must be a single
/// plain path component.
fn addon_path(dir: &Path, name: &str) -> Option<std::path::PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(dir.join(name)),
        _ => None,
    }
}

fn reply_to(reply: &PortLink, envelope: Envelope) {
    if let Err(err) = reply.post(envelope) {
        tracing::debug!(target: targets::DISPATCHER, port = %reply.id(), error = %err, "reply not delivered");
    }
}
