//! Linux implementation of packet timestamping: `SO_TIMESTAMPING`,
//! `SIOCSHWTSTAMP`, the interface table and the control messages that
//! come back from `recvmsg`.

#[cfg(not(target_os = "linux"))]
compile_error!("tstamp-udp uses linux socket timestamping and only builds for linux targets");

#[cfg(target_os = "linux")]
mod control_message;
#[cfg(target_os = "linux")]
mod interface;
#[cfg(target_os = "linux")]
mod platform;
#[cfg(target_os = "linux")]
mod raw_socket;
#[cfg(target_os = "linux")]
mod socket;

#[cfg(target_os = "linux")]
pub use interface::InterfaceIterator;
#[cfg(target_os = "linux")]
pub use platform::{
    query_interface_hw_timestamp, read_socket_timestamp_mask, timestamping_mask, LinuxPlatform,
};
#[cfg(target_os = "linux")]
pub use socket::TimestampedSocket;
