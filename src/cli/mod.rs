use clap::Parser;

use crate::models::Command;

mod commands;
pub use commands::*;

#[derive(Parser)]
#[command(name = "mpris-arbiter")]
#[command(about = "A small user daemon that intelligently controls MPRIS2-compatible media players")]
#[command(version)]
pub struct Cli {
    /// Method to call on the daemon (PlayPause, Next, or Previous), starting it if necessary
    #[arg(value_name = "METHOD")]
    pub method: Option<Command>,

    /// Keep the daemon in the foreground instead of spawning it in the background
    #[arg(long = "no-fork", visible_aliases = ["nofork", "foreground"])]
    pub no_fork: bool,

    /// Print debug logging
    #[arg(long)]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_method_and_flags() {
        let cli = Cli::try_parse_from(["mpris-arbiter", "next", "--foreground", "--debug"]).unwrap();
        assert_eq!(cli.method, Some(Command::Next));
        assert!(cli.no_fork);
        assert!(cli.debug);

        let cli = Cli::try_parse_from(["mpris-arbiter", "--nofork"]).unwrap();
        assert_eq!(cli.method, None);
        assert!(cli.no_fork);
    }

    #[test]
    fn test_unknown_method_rejected() {
        assert!(Cli::try_parse_from(["mpris-arbiter", "Stop"]).is_err());
    }
}
