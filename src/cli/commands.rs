use anyhow::{Context, Result};
use tracing::{error, info};

use crate::bootstrap::{self, Bootstrap, DaemonState};
use crate::cli::Cli;
use crate::config::Config;
use crate::daemon::Daemon;
use crate::ipc::DaemonClient;
use crate::models::Command;

pub struct App {
    pub config: Config,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Ok(Self { config })
    }

    /// Makes sure a daemon is running, then delivers the requested method if any.
    pub async fn run(&self, cli: &Cli) -> Result<()> {
        let client = DaemonClient::connect()
            .await
            .with_context(|| "Failed to connect to the session bus")?;
        let mut bootstrap = Bootstrap::new(&client, &self.config.bootstrap);

        match bootstrap.probe().await? {
            DaemonState::Up => info!("Daemon already running"),
            _ if cli.no_fork => return self.run_foreground(&client, cli.method).await,
            _ => {
                info!("Starting the daemon in the background");
                Daemon::spawn_detached(cli.debug)?;
                bootstrap.launched();
                bootstrap.wait_until_up().await?;
            }
        }

        if let Some(command) = cli.method {
            bootstrap.deliver(command).await?;
        }

        info!("Exiting");
        Ok(())
    }

    /// Serves as the daemon in this process. A requested method is delivered back to
    /// ourselves once the daemon has claimed its name.
    async fn run_foreground(&self, client: &DaemonClient, method: Option<Command>) -> Result<()> {
        let daemon = Daemon::new(self.config.clone());

        let Some(command) = method else {
            return daemon.run().await;
        };

        let deferred = async {
            if let Err(e) =
                bootstrap::deliver_deferred(client, command, &self.config.bootstrap).await
            {
                error!("{e}");
            }
        };

        let (result, ()) = tokio::join!(daemon.run(), deferred);
        result
    }
}
