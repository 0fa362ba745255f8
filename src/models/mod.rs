use std::fmt;

/// A connected player, named by the unique bus connection that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    NotPlaying,
}

impl PlaybackState {
    /// Maps an MPRIS `PlaybackStatus` value. Only `"Playing"` counts as playing.
    pub fn from_status(status: &str) -> Self {
        if status == "Playing" {
            PlaybackState::Playing
        } else {
            PlaybackState::NotPlaying
        }
    }
}

/// A transport command requested by a client of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    PlayPause,
    Next,
    Previous,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::PlayPause => write!(f, "PlayPause"),
            Command::Next => write!(f, "Next"),
            Command::Previous => write!(f, "Previous"),
        }
    }
}

impl std::str::FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "playpause" => Ok(Command::PlayPause),
            "next" => Ok(Command::Next),
            "previous" => Ok(Command::Previous),
            _ => Err(format!(
                "Invalid method: {s} (expected PlayPause, Next, or Previous)"
            )),
        }
    }
}

/// A method invoked on a player's `org.mpris.MediaPlayer2.Player` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerMethod {
    Play,
    Pause,
    Next,
    Previous,
}

impl fmt::Display for PlayerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerMethod::Play => write!(f, "Play"),
            PlayerMethod::Pause => write!(f, "Pause"),
            PlayerMethod::Next => write!(f, "Next"),
            PlayerMethod::Previous => write!(f, "Previous"),
        }
    }
}
