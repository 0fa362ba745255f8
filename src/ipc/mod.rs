use zbus::fdo::DBusProxy;
use zbus::names::BusName;
use zbus::proxy::CacheProperties;
use zbus::{Connection, proxy};

use crate::bootstrap::CoordinatorLink;
use crate::error::Result;
use crate::models::Command;

pub const ARBITER_BUS_NAME: &str = "org.mprisarbiter.Arbiter";
pub const ARBITER_PATH: &str = "/org/mprisarbiter/Arbiter";

/// Methods the daemon exports under its well-known name.
#[proxy(
    interface = "org.mprisarbiter.Arbiter",
    default_service = "org.mprisarbiter.Arbiter",
    default_path = "/org/mprisarbiter/Arbiter"
)]
pub trait Arbiter {
    fn play_pause(&self) -> zbus::Result<()>;

    fn next(&self) -> zbus::Result<()>;

    fn previous(&self) -> zbus::Result<()>;
}

pub fn arbiter_name() -> Result<BusName<'static>> {
    Ok(BusName::try_from(ARBITER_BUS_NAME).map_err(zbus::Error::from)?)
}

/// Client side of the daemon, holding its own session bus connection.
pub struct DaemonClient {
    dbus: DBusProxy<'static>,
    arbiter: ArbiterProxy<'static>,
}

impl DaemonClient {
    pub async fn connect() -> Result<Self> {
        let connection = Connection::session().await?;
        Self::with_connection(&connection).await
    }

    pub async fn with_connection(connection: &Connection) -> Result<Self> {
        let dbus = DBusProxy::new(connection).await?;
        let arbiter = ArbiterProxy::builder(connection)
            .cache_properties(CacheProperties::No)
            .build()
            .await?;
        Ok(Self { dbus, arbiter })
    }

    pub async fn is_daemon_running(&self) -> Result<bool> {
        Ok(self.dbus.name_has_owner(arbiter_name()?).await?)
    }

    pub async fn send_command(&self, command: Command) -> Result<()> {
        match command {
            Command::PlayPause => self.arbiter.play_pause().await?,
            Command::Next => self.arbiter.next().await?,
            Command::Previous => self.arbiter.previous().await?,
        }
        Ok(())
    }
}

impl CoordinatorLink for DaemonClient {
    async fn is_up(&self) -> Result<bool> {
        self.is_daemon_running().await
    }

    async fn deliver(&self, command: Command) -> Result<()> {
        self.send_command(command).await
    }
}
