use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ArbiterError, Result};
use crate::models::{Command, PlayerId, PlayerMethod};
use crate::registry::Snapshot;

/// Outbound calls on a player's media-control object.
pub trait PlayerControl {
    async fn invoke(&self, player: &PlayerId, method: PlayerMethod) -> Result<()>;
}

/// Which players a command should reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Broadcast {
        method: PlayerMethod,
        targets: Vec<PlayerId>,
    },
    Single {
        method: PlayerMethod,
        target: PlayerId,
    },
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoPlayers,
    AmbiguousTarget { playing: usize },
}

impl Plan {
    /// Picks targets from the registry.
    ///
    /// PlayPause pauses everything that is playing, or else resumes only the player that
    /// stopped most recently. Next and Previous need exactly one playing player.
    pub fn for_command(command: Command, snapshot: Snapshot<'_>) -> Self {
        match command {
            Command::PlayPause => {
                if !snapshot.playing.is_empty() {
                    let mut targets: Vec<PlayerId> = snapshot.playing.iter().cloned().collect();
                    targets.sort();
                    Plan::Broadcast {
                        method: PlayerMethod::Pause,
                        targets,
                    }
                } else if let Some(target) = snapshot.most_recent_idle() {
                    Plan::Single {
                        method: PlayerMethod::Play,
                        target: target.clone(),
                    }
                } else {
                    Plan::Skip(SkipReason::NoPlayers)
                }
            }
            Command::Next | Command::Previous => {
                let method = if command == Command::Next {
                    PlayerMethod::Next
                } else {
                    PlayerMethod::Previous
                };
                let mut playing = snapshot.playing.iter();
                match (playing.next(), playing.next()) {
                    (Some(target), None) => Plan::Single {
                        method,
                        target: target.clone(),
                    },
                    _ => Plan::Skip(SkipReason::AmbiguousTarget {
                        playing: snapshot.playing.len(),
                    }),
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<PlayerId>,
    pub failed: Vec<(PlayerId, ArbiterError)>,
}

pub struct CommandDispatcher<C> {
    control: C,
    call_timeout: Duration,
}

impl<C: PlayerControl> CommandDispatcher<C> {
    pub fn new(control: C, call_timeout: Duration) -> Self {
        Self {
            control,
            call_timeout,
        }
    }

    /// Runs a command against the current registry state.
    ///
    /// A failing player never stops the remaining calls, and the registry is left
    /// untouched: stale players are cleaned up by the next ownership-loss signal.
    pub async fn dispatch(&self, command: Command, snapshot: Snapshot<'_>) -> DispatchReport {
        let plan = Plan::for_command(command, snapshot);
        let (method, targets) = match plan {
            Plan::Broadcast { method, targets } => (method, targets),
            Plan::Single { method, target } => (method, vec![target]),
            Plan::Skip(SkipReason::NoPlayers) => {
                debug!("{command}: no known players");
                return DispatchReport::default();
            }
            Plan::Skip(SkipReason::AmbiguousTarget { playing }) => {
                debug!("{command} dropped: {}", ArbiterError::AmbiguousTarget { playing });
                return DispatchReport::default();
            }
        };

        let mut report = DispatchReport::default();
        for target in targets {
            match self.call(&target, method).await {
                Ok(()) => {
                    info!("{method} sent to {target}");
                    report.delivered.push(target);
                }
                Err(e) => {
                    warn!("{e}");
                    report.failed.push((target, e));
                }
            }
        }
        report
    }

    async fn call(&self, target: &PlayerId, method: PlayerMethod) -> Result<()> {
        match tokio::time::timeout(self.call_timeout, self.control.invoke(target, method)).await {
            Ok(result) => result,
            Err(_) => Err(ArbiterError::PlayerUnreachable {
                player: target.clone(),
                reason: format!("{method} timed out after {:?}", self.call_timeout),
            }),
        }
    }
}
