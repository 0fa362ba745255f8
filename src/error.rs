use thiserror::Error;

use crate::models::{Command, PlayerId};

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("Player {player} is unreachable: {reason}")]
    PlayerUnreachable { player: PlayerId, reason: String },

    #[error("Daemon failed to come up after {attempts} checks")]
    DaemonStartTimeout { attempts: usize },

    #[error("No single target: {playing} players are playing")]
    AmbiguousTarget { playing: usize },

    #[error("Failed to deliver {command} to the daemon: {source}")]
    CommandDeliveryFailure {
        command: Command,
        #[source]
        source: zbus::Error,
    },

    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),

    #[error("D-Bus request failed: {0}")]
    BusRequest(#[from] zbus::fdo::Error),

    #[error("Failed to start daemon process: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArbiterError>;
