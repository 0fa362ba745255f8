use tokio::sync::{mpsc, oneshot};
use tracing::info;
use zbus::{fdo, interface};

use super::Event;
use crate::models::Command;

/// The `org.mprisarbiter.Arbiter` object clients call into.
///
/// Each call is queued on the daemon's event loop and answered once the command
/// has been fanned out to the players.
pub struct ArbiterService {
    events: mpsc::Sender<Event>,
}

impl ArbiterService {
    pub fn new(events: mpsc::Sender<Event>) -> Self {
        Self { events }
    }

    async fn submit(&self, command: Command) -> fdo::Result<()> {
        info!("Method call for {command}");
        let (reply, done) = oneshot::channel();
        self.events
            .send(Event::Command {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| fdo::Error::Failed("daemon is shutting down".to_string()))?;

        let _ = done.await;
        Ok(())
    }
}

#[interface(name = "org.mprisarbiter.Arbiter")]
impl ArbiterService {
    async fn play_pause(&self) -> fdo::Result<()> {
        self.submit(Command::PlayPause).await
    }

    async fn next(&self) -> fdo::Result<()> {
        self.submit(Command::Next).await
    }

    async fn previous(&self) -> fdo::Result<()> {
        self.submit(Command::Previous).await
    }
}
