use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::connection::{ConnectionManager, ConnectionState, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub states: Vec<(Role, ConnectionState)>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.states
            .iter()
            .all(|(_, state)| *state == ConnectionState::Connected)
    }
}

/// Logs the state of every watched connection on a fixed interval.
#[derive(Debug)]
pub struct HealthMonitor {
    targets: Vec<(Role, watch::Receiver<ConnectionState>)>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            targets: Vec::new(),
            interval,
        }
    }

    pub fn watch(mut self, connection: &ConnectionManager) -> Self {
        self.targets.push((connection.role(), connection.watch_state()));
        self
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            states: self
                .targets
                .iter()
                .map(|(role, state)| (*role, *state.borrow()))
                .collect(),
        }
    }

    /// Run until the returned handle is aborted. The first check happens
    /// one interval after start.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = self.report();
                for (role, state) in &report.states {
                    info!(%role, %state, "health check");
                }
                if !report.is_healthy() {
                    warn!("not every connection is up");
                }
            }
        })
    }
}
