//! Logging facilities for the display server.
//!
//! The library only emits `tracing` events; the server binary installs the
//! subscriber via [`init`]. Every subsystem logs under its own target so that a
//! noisy loop can be silenced with a directive such as
//! `RUST_LOG=horizon_lattice_server::input=warn`.

use tracing_subscriber::EnvFilter;

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Server startup and teardown.
    pub const SERVER: &str = "horizon_lattice_server";
    /// Command dispatcher on the well-known port.
    pub const DISPATCHER: &str = "horizon_lattice_server::dispatcher";
    /// Session registry mutations.
    pub const REGISTRY: &str = "horizon_lattice_server::registry";
    /// Event intake loop.
    pub const INPUT: &str = "horizon_lattice_server::input";
    /// Health monitor loop.
    pub const MONITOR: &str = "horizon_lattice_server::monitor";
    /// Decorator add-on loading.
    pub const DECORATOR: &str = "horizon_lattice_server::decorator";
    /// Port allocation.
    pub const PORTS: &str = "horizon_lattice_server::ports";
    /// Font catalog and other collaborators.
    pub const COLLABORATORS: &str = "horizon_lattice_server::collaborators";
}

/// Install the global fmt subscriber.
///
/// Without `debug` the level is pinned to `info` regardless of `RUST_LOG`, so
/// a stray variable in the environment cannot flood the console of a running
/// server. With `debug`, `RUST_LOG` takes precedence over the `debug` default.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init(debug: bool) {
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::new("info")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_share_crate_prefix() {
        for target in [
            targets::DISPATCHER,
            targets::REGISTRY,
            targets::INPUT,
            targets::MONITOR,
            targets::DECORATOR,
            targets::PORTS,
            targets::COLLABORATORS,
        ] {
            assert!(target.starts_with(targets::SERVER));
        }
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(false);
        init(true);
    }
}
