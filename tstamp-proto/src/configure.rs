use std::fmt::Display;

use tracing::{debug, info, warn};

use crate::{
    hardware::{GrantDiscrepancy, HardwareTimestampGrant, HardwareTimestampRequest},
    interface::{InterfaceName, InterfaceSelection, NetworkInterface},
    options::SocketTimestampOptions,
    platform::TimestampingPlatform,
};

/// A configuration step that did not go through.
#[derive(Debug)]
pub enum ConfigError {
    /// The adapter refused hardware timestamping. Other interfaces are unaffected.
    HardwareTimestamp {
        interface: InterfaceName,
        source: std::io::Error,
    },
    SocketOptions(std::io::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HardwareTimestamp { interface, source } => {
                write!(f, "SIOCSHWTSTAMP [{interface}] failed: {source}")
            }
            Self::SocketOptions(e) => write!(f, "could not set timestamping options: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::HardwareTimestamp { source, .. } => Some(source),
            Self::SocketOptions(e) => Some(e),
        }
    }
}

/// Failures after which the socket cannot produce timestamps at all.
#[derive(Debug)]
pub enum SetupError {
    EnumerateInterfaces(std::io::Error),
    SocketOptions(std::io::Error),
}

impl Display for SetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnumerateInterfaces(e) => write!(f, "could not list network interfaces: {e}"),
            Self::SocketOptions(e) => write!(f, "could not set timestamping options: {e}"),
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EnumerateInterfaces(e) | Self::SocketOptions(e) => Some(e),
        }
    }
}

#[derive(Debug)]
pub struct InterfaceOutcome {
    pub interface: InterfaceName,
    pub request: HardwareTimestampRequest,
    pub result: Result<HardwareTimestampGrant, ConfigError>,
}

impl InterfaceOutcome {
    pub fn discrepancy(&self) -> Option<GrantDiscrepancy> {
        self.result
            .as_ref()
            .ok()
            .and_then(|grant| grant.discrepancy(&self.request))
    }
}

/// What happened to each interface during [`setup`].
#[derive(Debug, Default)]
pub struct SetupReport {
    pub interfaces: Vec<InterfaceOutcome>,
}

impl SetupReport {
    pub fn granted(&self) -> impl Iterator<Item = (InterfaceName, HardwareTimestampGrant)> + '_ {
        self.interfaces
            .iter()
            .filter_map(|outcome| Some((outcome.interface, *outcome.result.as_ref().ok()?)))
    }

    pub fn failed(&self) -> impl Iterator<Item = &ConfigError> + '_ {
        self.interfaces
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err())
    }

    pub fn discrepancies(&self) -> impl Iterator<Item = (InterfaceName, GrantDiscrepancy)> + '_ {
        self.interfaces
            .iter()
            .filter_map(|outcome| Some((outcome.interface, outcome.discrepancy()?)))
    }
}

/// Turn on transmit and receive hardware timestamping for a single interface.
pub fn configure_interface_hw_timestamp<P: TimestampingPlatform + ?Sized>(
    platform: &P,
    interface: &InterfaceName,
) -> Result<HardwareTimestampGrant, ConfigError> {
    let request = HardwareTimestampRequest::default();

    let grant = platform
        .set_hardware_timestamping(interface, request)
        .map_err(|source| {
            warn!(%interface, error = %source, "SIOCSHWTSTAMP failed");
            ConfigError::HardwareTimestamp {
                interface: *interface,
                source,
            }
        })?;

    info!(
        %interface,
        tx_type = ?grant.tx_type,
        rx_filter = ?grant.rx_filter,
        "hardware timestamping configured"
    );

    if let Some(discrepancy) = grant.discrepancy(&request) {
        warn!(%interface, %discrepancy, "adapter granted less than requested");
    }

    Ok(grant)
}

/// The interfaces that may be asked for hardware timestamps, loopback and
/// interfaces without a link-layer address excluded.
pub fn enumerate_timestampable_interfaces<P: TimestampingPlatform + ?Sized>(
    platform: &P,
) -> Result<impl Iterator<Item = NetworkInterface>, SetupError> {
    let interfaces = platform
        .interfaces()
        .map_err(SetupError::EnumerateInterfaces)?;

    Ok(interfaces.filter(NetworkInterface::is_timestampable))
}

pub fn apply_socket_timestamp_options<P: TimestampingPlatform + ?Sized>(
    platform: &P,
    options: SocketTimestampOptions,
) -> Result<(), ConfigError> {
    set_socket_options(platform, options).map_err(ConfigError::SocketOptions)
}

fn set_socket_options<P: TimestampingPlatform + ?Sized>(
    platform: &P,
    options: SocketTimestampOptions,
) -> std::io::Result<()> {
    if options.is_empty() {
        warn!("no timestamping options enabled, the socket will not produce timestamps");
    }

    platform.set_socket_options(options)?;
    debug!(?options, "socket timestamping options applied");

    Ok(())
}

/// Configure hardware timestamping on every timestampable interface, then
/// enable timestamp delivery on the socket.
pub fn setup<P: TimestampingPlatform + ?Sized>(
    platform: &P,
    options: SocketTimestampOptions,
) -> Result<SetupReport, SetupError> {
    setup_with_selection(platform, options, &InterfaceSelection::All)
}

pub fn setup_with_selection<P: TimestampingPlatform + ?Sized>(
    platform: &P,
    options: SocketTimestampOptions,
    selection: &InterfaceSelection,
) -> Result<SetupReport, SetupError> {
    let mut report = SetupReport::default();

    for interface in enumerate_timestampable_interfaces(platform)? {
        if !selection.contains(&interface.name) {
            debug!(interface = %interface.name, "skipping unselected interface");
            continue;
        }

        report.interfaces.push(InterfaceOutcome {
            interface: interface.name,
            request: HardwareTimestampRequest::default(),
            result: configure_interface_hw_timestamp(platform, &interface.name),
        });
    }

    // must be last: a failure above must not leave the socket half configured
    set_socket_options(platform, options).map_err(SetupError::SocketOptions)?;

    Ok(report)
}
