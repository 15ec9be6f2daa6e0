use std::{
    fmt::Display,
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{de, Deserialize, Deserializer};
use tracing::{info, warn, Level};
use tstamp_proto::{InterfaceName, InterfaceSelection, SocketTimestampOptions};

use crate::output::RecordFormat;

pub const USAGE: &str = "\
usage: tstamp-ping [CONFIG]

Print hardware and software timestamps of ping packets. CONFIG is a toml
file, without one the defaults are used and nothing is sent.";

/// What the command line asks for
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Run(Option<PathBuf>),
}

impl Command {
    /// The first element is the program name
    pub fn from_args(args: impl IntoIterator<Item = String>) -> Result<Command, String> {
        let mut args = args.into_iter().skip(1);

        let command = match args.next().as_deref() {
            None => Command::Run(None),
            Some("-h" | "--help") => Command::Help,
            Some(flag) if flag.starts_with('-') => return Err(format!("unknown option '{flag}'")),
            Some(path) => Command::Run(Some(PathBuf::from(path))),
        };

        match args.next() {
            Some(extra) => Err(format!("unexpected argument '{extra}'")),
            None => Ok(command),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_log_level", deserialize_with = "deserialize_level")]
    pub log_level: Level,
    #[serde(default)]
    pub format: RecordFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            format: RecordFormat::default(),
        }
    }
}

fn default_log_level() -> Level {
    Level::INFO
}

fn deserialize_level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Level, D::Error> {
    let name = String::deserialize(deserializer)?;

    Level::from_str(&name).map_err(|_| {
        de::Error::unknown_variant(&name, &["trace", "debug", "info", "warn", "error"])
    })
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SocketConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Where pings are sent; without one we only listen
    #[serde(default)]
    pub peer: Option<SocketAddr>,
    /// Restrict hardware timestamping to these interfaces
    #[serde(default)]
    pub interfaces: Option<Vec<InterfaceName>>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            peer: None,
            interfaces: None,
        }
    }
}

impl SocketConfig {
    pub fn selection(&self) -> InterfaceSelection {
        match &self.interfaces {
            None => InterfaceSelection::All,
            Some(names) => InterfaceSelection::Only(names.clone()),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3190))
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PingConfig {
    /// Time between two pings, in seconds
    #[serde(default = "default_interval", deserialize_with = "deserialize_interval")]
    pub interval: Duration,
    /// Number of pings to send, 0 sends until interrupted
    #[serde(default = "default_count")]
    pub count: u64,
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            count: default_count(),
            payload_size: default_payload_size(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_count() -> u64 {
    10
}

const fn default_payload_size() -> usize {
    48
}

fn deserialize_interval<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let seconds = f64::deserialize(deserializer)?;

    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(de::Error::invalid_value(
            de::Unexpected::Float(seconds),
            &"a positive number of seconds",
        ));
    }

    Duration::try_from_secs_f64(seconds).map_err(|_| {
        de::Error::invalid_value(de::Unexpected::Float(seconds), &"a representable duration")
    })
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub timestamping: SocketTimestampOptions,
    #[serde(default)]
    pub ping: PingConfig,
}

impl Config {
    /// Read the config file, or use the defaults when there is none
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;

        toml::from_str(&contents).map_err(ConfigError::Toml)
    }

    /// Log what makes this config produce fewer timestamps than expected.
    /// Returns false when a run will not report anything useful.
    pub fn check(&self) -> bool {
        let mut ok = true;

        if self.socket.peer.is_none() {
            info!("no peer configured, only listening for incoming packets");
        }

        if self.timestamping.is_empty() {
            warn!("all timestamping options are disabled, no timestamps will be reported");
            ok = false;
        } else if self.socket.peer.is_some() && !self.timestamping.wants_send_timestamps() {
            info!("no send timestamps requested, pings are only timestamped by the peer");
        }

        if self.socket.interfaces.as_ref().is_some_and(Vec::is_empty) {
            info!("empty interface list, hardware timestamping will not be configured");
        }

        if self.ping.payload_size == 0 {
            warn!("pings without payload are not timestamped by every network stack");
            ok = false;
        }

        ok
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml(toml::de::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "could not read {}: {source}", path.display()),
            Self::Toml(e) => write!(f, "invalid config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Toml(e) => Some(e),
        }
    }
}
