use std::collections::HashMap;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zbus::fdo::{DBusProxy, NameOwnerChanged};
use zbus::message::Type as MessageType;
use zbus::proxy::CacheProperties;
use zbus::zvariant::OwnedValue;
use zbus::{Connection, MatchRule, Message, MessageStream, proxy};

use super::Event;
use crate::dispatch::PlayerControl;
use crate::error::{ArbiterError, Result};
use crate::models::{PlaybackState, PlayerId, PlayerMethod};

/// Well-known name prefix of every MPRIS player.
const MPRIS_BUS_PREFIX: &str = "org.mpris.MediaPlayer2.";
const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
const MPRIS_PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";

/// The part of `org.mpris.MediaPlayer2.Player` the daemon drives.
#[proxy(
    interface = "org.mpris.MediaPlayer2.Player",
    default_service = "org.mpris.MediaPlayer2",
    default_path = "/org/mpris/MediaPlayer2"
)]
pub trait MediaPlayer2Player {
    /// Start playback
    fn play(&self) -> zbus::Result<()>;

    /// Pause playback
    fn pause(&self) -> zbus::Result<()>;

    /// Skip to next track
    fn next(&self) -> zbus::Result<()>;

    /// Skip to previous track
    fn previous(&self) -> zbus::Result<()>;

    /// Current playback status (Playing, Paused, Stopped)
    #[zbus(property)]
    fn playback_status(&self) -> zbus::Result<String>;
}

/// Players reached over the session bus, addressed by unique connection name.
pub struct BusPlayers {
    connection: Connection,
}

impl BusPlayers {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    async fn proxy<'p>(&self, player: &'p PlayerId) -> zbus::Result<MediaPlayer2PlayerProxy<'p>> {
        MediaPlayer2PlayerProxy::builder(&self.connection)
            .destination(player.as_str())?
            .cache_properties(CacheProperties::No)
            .build()
            .await
    }

    /// Lists every player currently on the bus along with its playback state.
    ///
    /// Players that vanish or refuse the status query mid-enumeration are skipped;
    /// their next status signal brings them in.
    pub async fn enumerate(&self, dbus: &DBusProxy<'_>) -> Result<Vec<(PlayerId, PlaybackState)>> {
        info!("Detecting players already on bus...");
        let names = dbus.list_names().await?;

        let mut found = Vec::new();
        for name in names {
            if !name.starts_with(MPRIS_BUS_PREFIX) {
                continue;
            }

            let owner = match dbus.get_name_owner(name.inner().clone()).await {
                Ok(owner) => PlayerId::new(owner.as_str()),
                Err(e) => {
                    warn!("Failed to resolve owner of {name}: {e}");
                    continue;
                }
            };

            let status = match self.proxy(&owner).await {
                Ok(proxy) => proxy.playback_status().await,
                Err(e) => Err(e),
            };
            match status {
                Ok(status) => {
                    debug!("{name} ({owner}) is {status}");
                    found.push((owner, PlaybackState::from_status(&status)));
                }
                Err(e) => warn!("Failed to read playback status of {name}: {e}"),
            }
        }

        Ok(found)
    }
}

impl PlayerControl for BusPlayers {
    async fn invoke(&self, player: &PlayerId, method: PlayerMethod) -> Result<()> {
        let proxy = self.proxy(player).await;
        let result = match proxy {
            Ok(proxy) => match method {
                PlayerMethod::Play => proxy.play().await,
                PlayerMethod::Pause => proxy.pause().await,
                PlayerMethod::Next => proxy.next().await,
                PlayerMethod::Previous => proxy.previous().await,
            },
            Err(e) => Err(e),
        };

        result.map_err(|e| ArbiterError::PlayerUnreachable {
            player: player.clone(),
            reason: format!("{method} failed: {e}"),
        })
    }
}

/// Subscribes to `PropertiesChanged` on the MPRIS player interface of every player.
pub async fn playback_signals(connection: &Connection) -> Result<MessageStream> {
    let rule = MatchRule::builder()
        .msg_type(MessageType::Signal)
        .interface("org.freedesktop.DBus.Properties")?
        .member("PropertiesChanged")?
        .path(MPRIS_PATH)?
        .arg(0, MPRIS_PLAYER_INTERFACE)?
        .build();

    Ok(MessageStream::for_match_rule(rule, connection, None).await?)
}

pub async fn forward_playback_signals(
    mut stream: impl Stream<Item = zbus::Result<Message>> + Unpin,
    events: mpsc::Sender<Event>,
) {
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("Bad PropertiesChanged message: {e}");
                continue;
            }
        };

        let Some(event) = playback_event(&message) else {
            continue;
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
    debug!("PropertiesChanged stream closed");
}

fn playback_event(message: &Message) -> Option<Event> {
    let header = message.header();
    let sender = header.sender()?;

    let (interface, changed, _invalidated): (String, HashMap<String, OwnedValue>, Vec<String>) =
        message.body().deserialize().ok()?;
    if interface != MPRIS_PLAYER_INTERFACE {
        return None;
    }

    let status = changed
        .get("PlaybackStatus")
        .and_then(|value| value.downcast_ref::<String>().ok());

    Some(Event::PlaybackChanged {
        sender: PlayerId::new(sender.as_str()),
        status,
    })
}

/// Forwards every name that lost its owner.
pub async fn forward_owner_changes(
    mut stream: impl Stream<Item = NameOwnerChanged> + Unpin,
    events: mpsc::Sender<Event>,
) {
    while let Some(signal) = stream.next().await {
        let Ok(args) = signal.args() else { continue };
        let new_owner = args.new_owner().as_ref().map(|owner| owner.as_str());
        let Some(event) = owner_lost(args.name().as_str(), new_owner) else {
            continue;
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
    debug!("NameOwnerChanged stream closed");
}

/// Only a name left without any owner means a player went away.
fn owner_lost(name: &str, new_owner: Option<&str>) -> Option<Event> {
    if new_owner.is_some() {
        return None;
    }
    Some(Event::OwnerLost {
        name: PlayerId::new(name),
    })
}
