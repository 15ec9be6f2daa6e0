use tstamp_proto::{
    HardwareTimestampGrant, HardwareTimestampRequest, InterfaceName, SocketTimestampOptions,
    TimestampingPlatform,
};

use crate::{
    interface::InterfaceIterator,
    raw_socket::{
        get_hardware_timestamping, read_timestamping_options, set_hardware_timestamping,
        set_timestamping_options,
    },
};

// linux/net_tstamp.h, not exported by every libc release
const SOF_TIMESTAMPING_OPT_TX_SWHW: u32 = 1 << 14;

/// Compose the `SO_TIMESTAMPING` flags for a set of options
pub fn timestamping_mask(options: SocketTimestampOptions) -> u32 {
    [
        (options.rx_hardware, libc::SOF_TIMESTAMPING_RX_HARDWARE),
        (options.rx_software, libc::SOF_TIMESTAMPING_RX_SOFTWARE),
        (options.tx_hardware, libc::SOF_TIMESTAMPING_TX_HARDWARE),
        (options.tx_software, libc::SOF_TIMESTAMPING_TX_SOFTWARE),
        (options.tx_scheduled, libc::SOF_TIMESTAMPING_TX_SCHED),
        (options.tx_acknowledged, libc::SOF_TIMESTAMPING_TX_ACK),
        (options.report_software, libc::SOF_TIMESTAMPING_SOFTWARE),
        (options.report_raw_hardware, libc::SOF_TIMESTAMPING_RAW_HARDWARE),
        (options.opt_id, libc::SOF_TIMESTAMPING_OPT_ID),
        (options.opt_tsonly, libc::SOF_TIMESTAMPING_OPT_TSONLY),
        (options.opt_tx_swhw, SOF_TIMESTAMPING_OPT_TX_SWHW),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .fold(0, |mask, (_, flag)| mask | flag)
}

/// The timestamping facilities of linux, acting on a borrowed socket.
#[derive(Debug, Clone, Copy)]
pub struct LinuxPlatform<'a> {
    socket: &'a std::net::UdpSocket,
}

impl<'a> LinuxPlatform<'a> {
    pub fn new(socket: &'a std::net::UdpSocket) -> Self {
        Self { socket }
    }
}

/// The `SO_TIMESTAMPING` flags currently applied to the socket
pub fn read_socket_timestamp_mask(socket: &std::net::UdpSocket) -> std::io::Result<u32> {
    read_timestamping_options(socket)
}

/// The modes currently active on an adapter, without changing them
pub fn query_interface_hw_timestamp(
    socket: &std::net::UdpSocket,
    interface: &InterfaceName,
) -> std::io::Result<HardwareTimestampGrant> {
    get_hardware_timestamping(socket, interface)
}

impl TimestampingPlatform for LinuxPlatform<'_> {
    type Interfaces = InterfaceIterator;

    fn interfaces(&self) -> std::io::Result<Self::Interfaces> {
        InterfaceIterator::new()
    }

    fn set_hardware_timestamping(
        &self,
        interface: &InterfaceName,
        request: HardwareTimestampRequest,
    ) -> std::io::Result<HardwareTimestampGrant> {
        set_hardware_timestamping(self.socket, interface, request)
    }

    fn set_socket_options(&self, options: SocketTimestampOptions) -> std::io::Result<()> {
        set_timestamping_options(self.socket, timestamping_mask(options))
    }
}

#[cfg(test)]
mod tests {
    use tstamp_proto::{apply_socket_timestamp_options, enumerate_timestampable_interfaces};

    use super::*;

    #[test]
    fn mask_bits() {
        assert_eq!(timestamping_mask(SocketTimestampOptions::NONE), 0);
        assert_eq!(timestamping_mask(SocketTimestampOptions::ALL), 0x4bdf);

        let software = timestamping_mask(SocketTimestampOptions::SOFTWARE);
        assert_eq!(
            software,
            libc::SOF_TIMESTAMPING_RX_SOFTWARE
                | libc::SOF_TIMESTAMPING_TX_SOFTWARE
                | libc::SOF_TIMESTAMPING_SOFTWARE
                | libc::SOF_TIMESTAMPING_OPT_ID
                | libc::SOF_TIMESTAMPING_OPT_TSONLY
        );

        let only_swhw = SocketTimestampOptions {
            opt_tx_swhw: true,
            ..SocketTimestampOptions::NONE
        };
        assert_eq!(timestamping_mask(only_swhw), 1 << 14);
    }

    #[test]
    fn applying_options_is_idempotent() {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let platform = LinuxPlatform::new(&socket);

        apply_socket_timestamp_options(&platform, SocketTimestampOptions::SOFTWARE).unwrap();
        let first = read_socket_timestamp_mask(&socket).unwrap();

        apply_socket_timestamp_options(&platform, SocketTimestampOptions::SOFTWARE).unwrap();
        let second = read_socket_timestamp_mask(&socket).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, timestamping_mask(SocketTimestampOptions::SOFTWARE));
    }

    #[test]
    fn loopback_is_never_timestampable() {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let platform = LinuxPlatform::new(&socket);

        assert!(enumerate_timestampable_interfaces(&platform)
            .unwrap()
            .all(|interface| !interface.loopback && interface.link_layer));
    }
}
