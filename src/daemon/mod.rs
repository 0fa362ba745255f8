use anyhow::{Context, Result};
use std::process::{Command as Process, Stdio};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use zbus::Connection;
use zbus::fdo::{DBusProxy, RequestNameFlags, RequestNameReply};

use crate::config::Config;
use crate::dispatch::{CommandDispatcher, DispatchReport, PlayerControl};
use crate::ipc::{ARBITER_BUS_NAME, ARBITER_PATH, arbiter_name};
use crate::models::{Command, PlaybackState, PlayerId};
use crate::registry::PlayerRegistry;

mod players;
mod service;

use players::BusPlayers;
use service::ArbiterService;

const EVENT_QUEUE: usize = 64;

/// One unit of work for the event loop.
#[derive(Debug)]
pub enum Event {
    PlaybackChanged {
        sender: PlayerId,
        status: Option<String>,
    },
    OwnerLost {
        name: PlayerId,
    },
    Command {
        command: Command,
        reply: Option<oneshot::Sender<()>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Startup enumeration is running; signals queue up but are not applied.
    Seeding,
    Listening,
}

/// Owns the registry and handles events strictly one at a time.
pub struct Coordinator<C> {
    registry: PlayerRegistry,
    dispatcher: CommandDispatcher<C>,
    phase: Phase,
}

impl<C: PlayerControl> Coordinator<C> {
    pub fn new(dispatcher: CommandDispatcher<C>) -> Self {
        Self {
            registry: PlayerRegistry::new(),
            dispatcher,
            phase: Phase::Seeding,
        }
    }

    /// Loads the players found at startup and starts trusting signals.
    pub fn seed(&mut self, players: impl IntoIterator<Item = (PlayerId, PlaybackState)>) {
        for (player, state) in players {
            self.registry.record(&player, state);
        }
        self.phase = Phase::Listening;
        info!("Tracking {} players", self.registry.len());
    }

    pub async fn handle(&mut self, event: Event) -> Option<DispatchReport> {
        if self.phase == Phase::Seeding {
            warn!("Dropping {event:?} received before seeding finished");
            return None;
        }

        match event {
            Event::PlaybackChanged { sender, status } => {
                // Property changes that do not touch PlaybackStatus are ignored.
                let status = status?;
                info!("PlaybackStatus of {sender} is {status}");
                self.registry
                    .record(&sender, PlaybackState::from_status(&status));
                None
            }
            Event::OwnerLost { name } => {
                debug!("Owner of {name} lost");
                self.registry.remove(&name);
                None
            }
            Event::Command { command, reply } => {
                let report = self
                    .dispatcher
                    .dispatch(command, self.registry.snapshot())
                    .await;
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                Some(report)
            }
        }
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<Event>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
    }
}

pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs the daemon until SIGINT/SIGTERM or until the bus goes away.
    ///
    /// Returns immediately if another instance already owns the arbiter name.
    pub async fn run(&self) -> Result<()> {
        let connection = Connection::session()
            .await
            .with_context(|| "Failed to connect to the session bus")?;
        let dbus = DBusProxy::new(&connection).await?;

        if dbus.name_has_owner(arbiter_name()?).await? {
            info!("Daemon already running, exiting");
            return Ok(());
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);

        // Subscribe before enumerating so nothing that happens meanwhile is lost.
        let playback = players::playback_signals(&connection).await?;
        let owners = dbus.receive_name_owner_changed().await?;
        let mut watchers = JoinSet::new();
        watchers.spawn(players::forward_playback_signals(playback, events_tx.clone()));
        watchers.spawn(players::forward_owner_changes(owners, events_tx.clone()));

        connection
            .object_server()
            .at(ARBITER_PATH, ArbiterService::new(events_tx))
            .await?;

        let reply = connection
            .request_name_with_flags(ARBITER_BUS_NAME, RequestNameFlags::DoNotQueue.into())
            .await;
        if !claimed(reply)? {
            info!("Another instance claimed {ARBITER_BUS_NAME} first, exiting");
            return Ok(());
        }
        info!("Daemon started as {ARBITER_BUS_NAME}");

        let bus_players = BusPlayers::new(connection.clone());
        let seeded = bus_players.enumerate(&dbus).await?;

        let dispatcher = CommandDispatcher::new(bus_players, self.config.dispatch.call_timeout());
        let mut coordinator = Coordinator::new(dispatcher);
        coordinator.seed(seeded);

        tokio::select! {
            _ = coordinator.run(events_rx) => {
                error!("Event queue closed");
            }
            _ = watchers.join_next() => {
                error!("Lost connection to the session bus");
            }
            _ = shutdown_signal() => {
                info!("Shutdown requested");
            }
        }

        info!("Daemon stopped");
        Ok(())
    }

    /// Re-executes this binary as a background daemon in its own process group.
    pub fn spawn_detached(debug: bool) -> crate::error::Result<()> {
        let exe = std::env::current_exe()?;

        let mut command = Process::new(&exe);
        command
            .arg("--no-fork")
            .current_dir("/")
            .stdin(Stdio::null());
        if debug {
            command.arg("--debug");
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command.spawn()?;
        Ok(())
    }
}

/// Whether a `DoNotQueue` name request made us the primary owner.
///
/// zbus reports a name already held by someone else as `Error::NameTaken`; losing
/// that race is a normal outcome, not a failure.
fn claimed(reply: zbus::Result<RequestNameReply>) -> zbus::Result<bool> {
    match reply {
        Ok(RequestNameReply::PrimaryOwner) => Ok(true),
        Ok(other) => {
            debug!("Name request answered {other:?}");
            Ok(false)
        }
        Err(zbus::Error::NameTaken) => Ok(false),
        Err(e) => Err(e),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArbiterError;
    use crate::models::PlayerMethod;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingControl {
        calls: Mutex<Vec<(PlayerId, PlayerMethod)>>,
    }

    impl PlayerControl for &RecordingControl {
        async fn invoke(&self, player: &PlayerId, method: PlayerMethod) -> crate::error::Result<()> {
            if player.as_str() == ":1.dead" {
                return Err(ArbiterError::PlayerUnreachable {
                    player: player.clone(),
                    reason: "gone".to_string(),
                });
            }
            self.calls.lock().unwrap().push((player.clone(), method));
            Ok(())
        }
    }

    fn coordinator(control: &RecordingControl) -> Coordinator<&RecordingControl> {
        Coordinator::new(CommandDispatcher::new(control, Duration::from_secs(1)))
    }

    fn playback(sender: &str, status: Option<&str>) -> Event {
        Event::PlaybackChanged {
            sender: PlayerId::from(sender),
            status: status.map(str::to_string),
        }
    }

    fn command(command: Command) -> Event {
        Event::Command {
            command,
            reply: None,
        }
    }

    #[test]
    fn test_losing_name_race_is_a_clean_exit() {
        assert!(claimed(Ok(RequestNameReply::PrimaryOwner)).unwrap());
        assert!(!claimed(Err(zbus::Error::NameTaken)).unwrap());
        assert!(!claimed(Ok(RequestNameReply::Exists)).unwrap());
        assert!(!claimed(Ok(RequestNameReply::AlreadyOwner)).unwrap());
    }

    #[test]
    fn test_other_name_request_errors_propagate() {
        let err = claimed(Err(zbus::Error::Failure("bus gone".to_string()))).unwrap_err();
        assert!(matches!(err, zbus::Error::Failure(_)));
    }

    #[tokio::test]
    async fn test_events_ignored_while_seeding() {
        let control = RecordingControl::default();
        let mut coordinator = coordinator(&control);
        assert_eq!(coordinator.phase, Phase::Seeding);

        coordinator.handle(playback(":1.1", Some("Playing"))).await;
        coordinator.seed(Vec::new());
        assert_eq!(coordinator.phase, Phase::Listening);

        coordinator.handle(command(Command::PlayPause)).await;
        assert!(control.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seeded_players_are_dispatched_to() {
        let control = RecordingControl::default();
        let mut coordinator = coordinator(&control);
        coordinator.seed(vec![
            (PlayerId::from(":1.1"), PlaybackState::NotPlaying),
            (PlayerId::from(":1.2"), PlaybackState::NotPlaying),
        ]);

        coordinator.handle(command(Command::PlayPause)).await;
        assert_eq!(
            *control.calls.lock().unwrap(),
            vec![(PlayerId::from(":1.2"), PlayerMethod::Play)]
        );
    }

    #[tokio::test]
    async fn test_signals_drive_selection() {
        let control = RecordingControl::default();
        let mut coordinator = coordinator(&control);
        coordinator.seed(Vec::new());

        coordinator.handle(playback(":1.1", Some("Playing"))).await;
        coordinator.handle(playback(":1.2", Some("Playing"))).await;
        coordinator.handle(playback(":1.2", Some("Paused"))).await;
        // Metadata-only change: no PlaybackStatus key.
        coordinator.handle(playback(":1.1", None)).await;

        coordinator.handle(command(Command::Next)).await;
        assert_eq!(
            *control.calls.lock().unwrap(),
            vec![(PlayerId::from(":1.1"), PlayerMethod::Next)]
        );

        coordinator.handle(Event::OwnerLost { name: PlayerId::from(":1.1") }).await;
        coordinator.handle(command(Command::PlayPause)).await;
        assert_eq!(
            control.calls.lock().unwrap().last(),
            Some(&(PlayerId::from(":1.2"), PlayerMethod::Play))
        );
    }

    #[tokio::test]
    async fn test_unreachable_player_stays_registered() {
        let control = RecordingControl::default();
        let mut coordinator = coordinator(&control);
        coordinator.seed(vec![(PlayerId::from(":1.dead"), PlaybackState::Playing)]);

        let report = coordinator.handle(command(Command::PlayPause)).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(coordinator.registry.len(), 1);

        coordinator.handle(Event::OwnerLost { name: PlayerId::from(":1.dead") }).await;
        assert_eq!(coordinator.registry.len(), 0);
    }

    #[tokio::test]
    async fn test_command_reply_is_sent_after_dispatch() {
        let control = RecordingControl::default();
        let mut coordinator = coordinator(&control);
        coordinator.seed(vec![(PlayerId::from(":1.1"), PlaybackState::Playing)]);

        let (reply, done) = oneshot::channel();
        coordinator
            .handle(Event::Command {
                command: Command::PlayPause,
                reply: Some(reply),
            })
            .await;

        assert!(done.await.is_ok());
        assert_eq!(control.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_drains_queue_in_order() {
        let control = RecordingControl::default();
        let mut coordinator = coordinator(&control);
        coordinator.seed(Vec::new());

        let (tx, rx) = mpsc::channel(8);
        tx.send(playback(":1.1", Some("Playing"))).await.unwrap();
        tx.send(command(Command::PlayPause)).await.unwrap();
        tx.send(playback(":1.1", Some("Paused"))).await.unwrap();
        tx.send(command(Command::PlayPause)).await.unwrap();
        drop(tx);

        coordinator.run(rx).await;

        assert_eq!(
            *control.calls.lock().unwrap(),
            vec![
                (PlayerId::from(":1.1"), PlayerMethod::Pause),
                (PlayerId::from(":1.1"), PlayerMethod::Play),
            ]
        );
    }
}
