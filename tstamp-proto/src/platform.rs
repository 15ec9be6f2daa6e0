use crate::{
    hardware::{HardwareTimestampGrant, HardwareTimestampRequest},
    interface::{InterfaceName, NetworkInterface},
    options::SocketTimestampOptions,
};

/// The OS facilities needed to turn on timestamping for a socket.
///
/// Implementations borrow the socket; they never open, bind or close it.
pub trait TimestampingPlatform {
    type Interfaces: Iterator<Item = NetworkInterface>;

    /// A fresh snapshot of the host interface table
    fn interfaces(&self) -> std::io::Result<Self::Interfaces>;

    /// Ask the adapter behind `interface` for hardware timestamps, returning
    /// the modes the driver actually applied.
    fn set_hardware_timestamping(
        &self,
        interface: &InterfaceName,
        request: HardwareTimestampRequest,
    ) -> std::io::Result<HardwareTimestampGrant>;

    fn set_socket_options(&self, options: SocketTimestampOptions) -> std::io::Result<()>;
}

impl<T: TimestampingPlatform + ?Sized> TimestampingPlatform for &T {
    type Interfaces = T::Interfaces;

    fn interfaces(&self) -> std::io::Result<Self::Interfaces> {
        (**self).interfaces()
    }

    fn set_hardware_timestamping(
        &self,
        interface: &InterfaceName,
        request: HardwareTimestampRequest,
    ) -> std::io::Result<HardwareTimestampGrant> {
        (**self).set_hardware_timestamping(interface, request)
    }

    fn set_socket_options(&self, options: SocketTimestampOptions) -> std::io::Result<()> {
        (**self).set_socket_options(options)
    }
}
