//! Negotiating packet timestamps with a network stack and decoding the
//! control messages that carry them.
//!
//! This crate knows nothing about any particular operating system: the
//! [`TimestampingPlatform`] trait is the seam where the socket and interface
//! facilities plug in, and [`decode_bundle`] works on already parsed
//! [`AncillaryEntry`] values.
#![forbid(unsafe_code)]

mod configure;
mod control_message;
mod decode;
mod hardware;
mod interface;
mod options;
mod platform;
mod record;

pub use configure::{
    apply_socket_timestamp_options, configure_interface_hw_timestamp,
    enumerate_timestampable_interfaces, setup, setup_with_selection, ConfigError,
    InterfaceOutcome, SetupError, SetupReport,
};
pub use control_message::{
    AncillaryEntry, ErrorOrigin, ExtendedErrorMeta, TimestampEvent, TimestampTriple, Timespec,
    NO_MESSAGE,
};
pub use decode::{decode_bundle, BundleDecoder};
pub use hardware::{
    GrantDiscrepancy, HardwareTimestampGrant, HardwareTimestampRequest, RxFilter, TxType,
};
pub use interface::{
    InterfaceName, InterfaceNameParseError, InterfaceSelection, NetworkInterface,
    INTERFACE_NAME_SIZE,
};
pub use options::SocketTimestampOptions;
pub use platform::TimestampingPlatform;
pub use record::{Category, Source, TimestampRecord};
