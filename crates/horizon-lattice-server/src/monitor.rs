//! Health monitor.
//!
//! Every interval the monitor checks every registered session for liveness
//! while holding the registry. It only records and reports what it finds;
//! removing a dead session is the client's or the shutdown sequence's job.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::saturating_millis;
use crate::logging::targets;
use crate::process::ProcessControl;
use crate::registry::{SessionId, SessionRegistry};
use crate::service::ShutdownListener;

/// Outcome of one monitoring pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Sessions checked.
    pub checked: usize,
    /// Sessions found dead.
    pub unresponsive: Vec<SessionId>,
}

/// Check every session once.
pub fn check_sessions(registry: &SessionRegistry, processes: &dyn ProcessControl) -> HealthReport {
    let mut report = HealthReport::default();
    registry.for_each(|session| {
        report.checked += 1;
        if !session.check_liveness(processes) {
            report.unresponsive.push(session.id());
        }
    });
    report
}

/// Body of the monitor thread.
pub fn monitor_loop(
    registry: Arc<SessionRegistry>,
    processes: Arc<dyn ProcessControl>,
    interval: Duration,
    shutdown: ShutdownListener,
) {
    tracing::info!(target: targets::MONITOR, interval_ms = saturating_millis(interval), "health monitor started");

    // Sessions already reported, so a dead client is logged once.
    let mut reported: HashSet<SessionId> = HashSet::new();
    loop {
        let report = check_sessions(&registry, processes.as_ref());
        for id in &report.unresponsive {
            if reported.insert(*id) {
                tracing::warn!(target: targets::MONITOR, session = ?id, "session is not responding");
            }
        }
        reported.retain(|id| report.unresponsive.contains(id));
        tracing::trace!(target: targets::MONITOR, checked = report.checked, "health pass complete");

        if shutdown.sleep(interval) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortTable;
    use crate::service::ServiceThread;
    use crate::testing::FakeProcesses;

    #[test]
    fn test_check_sessions_reports_dead_clients() {
        let ports = PortTable::new(16);
        let registry = SessionRegistry::new(ports.clone(), 4);
        let reply = ports.create("reply", 4).unwrap();
        let processes = FakeProcesses::new();

        processes.spawn(1);
        processes.spawn(2);
        let alive = registry.create_session(1, reply.link(), "alive").unwrap();
        let dead = registry.create_session(2, reply.link(), "dead").unwrap();
        let gone = registry.create_session(3, reply.link(), "gone").unwrap();
        dead.context.finish();

        let report = check_sessions(&registry, &processes);
        assert_eq!(report.checked, 3);
        assert_eq!(report.unresponsive, [dead.id, gone.id]);
        assert!(registry.get(alive.id).unwrap().alive);
        assert!(!registry.get(gone.id).unwrap().alive);

        // Advisory only.
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_monitor_loop_stops_promptly() {
        let ports = PortTable::new(16);
        let registry = Arc::new(SessionRegistry::new(ports.clone(), 4));
        let reply = ports.create("reply", 4).unwrap();
        let processes = Arc::new(FakeProcesses::new());
        let created = registry.create_session(7, reply.link(), "app").unwrap();

        let loop_registry = registry.clone();
        let loop_processes: Arc<dyn ProcessControl> = processes.clone();
        let service = ServiceThread::spawn("test-monitor", move |shutdown| {
            monitor_loop(loop_registry, loop_processes, Duration::from_millis(10), shutdown)
        })
        .unwrap();

        // Once the second pass has started, the first one has been recorded.
        assert!(processes.wait_for_liveness_checks(2, Duration::from_secs(5)));
        assert!(!registry.get(created.id).unwrap().alive);
        assert_eq!(registry.len(), 1);

        assert!(service.stop_and_join());
    }
}
