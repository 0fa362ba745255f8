//! Client-side startup handshake with the daemon.
//!
//! The daemon is `Absent` until something claims the arbiter bus name. After a detached
//! daemon is spawned the client is `Starting` and polls ownership on a fixed backoff
//! schedule; once the name shows up the daemon is `Up` and commands can be delivered.

use tracing::{debug, error, info, warn};

use crate::config::BootstrapConfig;
use crate::error::{ArbiterError, Result};
use crate::models::Command;

/// What the client needs from the bus to talk to the daemon.
pub trait CoordinatorLink {
    /// Whether some process owns the arbiter bus name.
    async fn is_up(&self) -> Result<bool>;

    /// Invokes a command on the daemon once.
    async fn deliver(&self, command: Command) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Absent,
    Starting,
    Up,
}

pub struct Bootstrap<'a, L> {
    link: &'a L,
    config: &'a BootstrapConfig,
    state: DaemonState,
}

impl<'a, L: CoordinatorLink> Bootstrap<'a, L> {
    pub fn new(link: &'a L, config: &'a BootstrapConfig) -> Self {
        Self {
            link,
            config,
            state: DaemonState::Absent,
        }
    }

    pub async fn probe(&mut self) -> Result<DaemonState> {
        self.state = if self.link.is_up().await? {
            DaemonState::Up
        } else {
            DaemonState::Absent
        };
        Ok(self.state)
    }

    /// Records that a daemon process has been launched.
    pub fn launched(&mut self) {
        self.state = DaemonState::Starting;
    }

    /// Polls until the daemon owns its name or the backoff schedule runs out.
    pub async fn wait_until_up(&mut self) -> Result<()> {
        let mut attempts = 0;
        for wait in self.config.backoff() {
            debug!("Waiting for daemon to be up...");
            tokio::time::sleep(wait).await;
            attempts += 1;

            match self.link.is_up().await {
                Ok(true) => {
                    debug!("Daemon is up after {attempts} checks");
                    tokio::time::sleep(self.config.settle()).await;
                    self.state = DaemonState::Up;
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => debug!("Ownership probe failed: {e}"),
            }
        }

        error!("Daemon failed to come up after {attempts} checks");
        Err(ArbiterError::DaemonStartTimeout { attempts })
    }

    /// Delivers a command once. The daemon must already be up.
    pub async fn deliver(&self, command: Command) -> Result<()> {
        if self.state != DaemonState::Up {
            return Err(ArbiterError::CommandDeliveryFailure {
                command,
                source: zbus::Error::Failure(format!("daemon is {:?}", self.state)),
            });
        }

        info!("Calling {command} on daemon");
        self.link.deliver(command).await.map_err(|e| match e {
            ArbiterError::Bus(source) => ArbiterError::CommandDeliveryFailure { command, source },
            ArbiterError::BusRequest(e) => ArbiterError::CommandDeliveryFailure {
                command,
                source: e.into(),
            },
            other => other,
        })
    }
}

/// Keeps retrying a command while a daemon in the same process finishes starting.
///
/// The first attempt happens one `retry_interval` after the call, followed by up to
/// `retry_attempts` more. Returns the number of attempts made.
pub async fn deliver_deferred<L: CoordinatorLink>(
    link: &L,
    command: Command,
    config: &BootstrapConfig,
) -> Result<usize> {
    let total = config.retry_attempts + 1;
    let mut interval = tokio::time::interval_at(
        tokio::time::Instant::now() + config.retry_interval(),
        config.retry_interval(),
    );

    for attempt in 1..=total {
        interval.tick().await;
        match link.deliver(command).await {
            Ok(()) => {
                info!("{command} delivered on attempt {attempt}");
                return Ok(attempt);
            }
            Err(e) => debug!("Attempt {attempt} to deliver {command} failed: {e}"),
        }
    }

    warn!("Giving up on {command} after {total} attempts");
    Err(ArbiterError::CommandDeliveryFailure {
        command,
        source: zbus::Error::Failure(format!("daemon did not answer after {total} attempts")),
    })
}
