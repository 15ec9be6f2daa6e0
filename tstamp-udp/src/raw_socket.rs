//! Safe wrappers for the socket-related system calls needed by the
//! timestamped socket and the linux platform.
//!
//! Since the safety of a rust unsafe block depends not only on its
//! contents, but also the context within which it is called, the code
//! here is split up in submodules that are individually as small as
//! possible while still having each a fully safe API interface.
//!
//! All unsafe blocks are preceded with a comment explaining why that
//! specific unsafe code should be safe within the context in which it
//! is used.
pub(crate) use hardware_timestamping::{get_hardware_timestamping, set_hardware_timestamping};
pub(crate) use recv_message::{control_message_space, receive_message, MessageQueue};
pub(crate) use timestamping_options::{read_timestamping_options, set_timestamping_options};

/// Turn a C failure (-1 is returned) into a rust Result
pub(crate) fn cerr(t: libc::c_int) -> std::io::Result<libc::c_int> {
    match t {
        -1 => Err(std::io::Error::last_os_error()),
        _ => Ok(t),
    }
}

mod timestamping_options {
    use std::os::unix::prelude::AsRawFd;

    use super::cerr;

    pub(crate) fn set_timestamping_options(
        udp_socket: &std::net::UdpSocket,
        options: u32,
    ) -> std::io::Result<()> {
        let fd = udp_socket.as_raw_fd();

        // for documentation on SO_TIMESTAMPING see
        // https://www.kernel.org/doc/Documentation/networking/timestamping.txt
        // Safety:
        // we have a reference to the socket, so fd is a valid file descriptor for the duration of the call
        // SOL_SOCKET + SO_TIMESTAMPING expect a *u32 as value (see section 1.3.4. of above), which &options
        // is. Furthermore, we own options hence the pointer is valid for the duration of the call.
        // option_len is set to the size of u32, which is the size for which the value pointer is valid.
        unsafe {
            cerr(libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_TIMESTAMPING,
                &options as *const _ as *const libc::c_void,
                std::mem::size_of::<u32>() as libc::socklen_t,
            ))?
        };

        Ok(())
    }

    pub(crate) fn read_timestamping_options(
        udp_socket: &std::net::UdpSocket,
    ) -> std::io::Result<u32> {
        let fd = udp_socket.as_raw_fd();

        let mut options: u32 = 0;
        let mut option_len = std::mem::size_of::<u32>() as libc::socklen_t;

        // Safety:
        // we have a reference to the socket, so fd is a valid file descriptor for the duration of the call
        // the kernel writes at most option_len bytes, the size of options which we own.
        // Newer kernels can report a larger struct, but then only its leading flags field is copied.
        unsafe {
            cerr(libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_TIMESTAMPING,
                &mut options as *mut _ as *mut libc::c_void,
                &mut option_len,
            ))?
        };

        Ok(options)
    }
}

mod hardware_timestamping {
    use std::os::unix::prelude::AsRawFd;

    use tstamp_proto::{
        HardwareTimestampGrant, HardwareTimestampRequest, InterfaceName, RxFilter, TxType,
    };

    use super::cerr;

    // linux/sockios.h
    const SIOCSHWTSTAMP: libc::c_ulong = 0x89b0;
    const SIOCGHWTSTAMP: libc::c_ulong = 0x89b1;

    // linux/net_tstamp.h
    #[repr(C)]
    #[allow(non_camel_case_types)]
    #[derive(Debug, Default, Clone, Copy)]
    struct hwtstamp_config {
        flags: libc::c_int,
        tx_type: libc::c_int,
        rx_filter: libc::c_int,
    }

    impl hwtstamp_config {
        fn grant(&self) -> HardwareTimestampGrant {
            HardwareTimestampGrant {
                tx_type: TxType::from_raw(self.tx_type as u32),
                rx_filter: RxFilter::from_raw(self.rx_filter as u32),
            }
        }
    }

    fn ifr_name(interface: &InterfaceName) -> [libc::c_char; libc::IFNAMSIZ] {
        // the last byte of an InterfaceName is always NUL
        interface.as_bytes().map(|b| b as libc::c_char)
    }

    fn hardware_timestamp_ioctl(
        udp_socket: &std::net::UdpSocket,
        interface: &InterfaceName,
        request: libc::c_ulong,
        config: &mut hwtstamp_config,
    ) -> std::io::Result<()> {
        let mut ifreq = libc::ifreq {
            ifr_name: ifr_name(interface),
            ifr_ifru: libc::__c_anonymous_ifr_ifru {
                ifru_data: (config as *mut hwtstamp_config).cast::<libc::c_char>(),
            },
        };

        // Safety:
        // we have a reference to the socket, so its fd is valid for the duration of the call.
        // SIOCSHWTSTAMP and SIOCGHWTSTAMP take an ifreq whose data pointer refers to a
        // hwtstamp_config. The config is borrowed mutably for this whole function, so the
        // driver may read and write it during the call.
        cerr(unsafe { libc::ioctl(udp_socket.as_raw_fd(), request as _, &mut ifreq) })?;

        Ok(())
    }

    /// Ask the driver to apply `request`. The driver writes back what it
    /// actually applied, which is what we return.
    pub(crate) fn set_hardware_timestamping(
        udp_socket: &std::net::UdpSocket,
        interface: &InterfaceName,
        request: HardwareTimestampRequest,
    ) -> std::io::Result<HardwareTimestampGrant> {
        let mut config = hwtstamp_config {
            flags: 0,
            tx_type: request.tx_type.to_raw() as libc::c_int,
            rx_filter: request.rx_filter.to_raw() as libc::c_int,
        };

        hardware_timestamp_ioctl(udp_socket, interface, SIOCSHWTSTAMP, &mut config)?;

        Ok(config.grant())
    }

    pub(crate) fn get_hardware_timestamping(
        udp_socket: &std::net::UdpSocket,
        interface: &InterfaceName,
    ) -> std::io::Result<HardwareTimestampGrant> {
        let mut config = hwtstamp_config::default();

        hardware_timestamp_ioctl(udp_socket, interface, SIOCGHWTSTAMP, &mut config)?;

        Ok(config.grant())
    }

}

mod recv_message {
    use std::{io::IoSliceMut, net::SocketAddr, os::unix::prelude::AsRawFd};

    use tracing::warn;

    use crate::{control_message::ControlMessageIterator, interface::sockaddr_storage_to_socket_addr};

    use super::cerr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum MessageQueue {
        Normal,
        Error,
    }

    pub(crate) fn receive_message<'a>(
        socket: &std::net::UdpSocket,
        packet_buf: &mut [u8],
        control_buf: &'a mut [u8],
        queue: MessageQueue,
    ) -> std::io::Result<(usize, ControlMessageIterator<'a>, Option<SocketAddr>)> {
        let mut buf_slice = IoSliceMut::new(packet_buf);
        let mut addr = zeroed_sockaddr_storage();

        let mut mhdr = crate::control_message::empty_msghdr();
        mhdr.msg_control = control_buf.as_mut_ptr().cast::<libc::c_void>();
        mhdr.msg_controllen = control_buf.len() as _;
        mhdr.msg_iov = (&mut buf_slice as *mut IoSliceMut).cast::<libc::iovec>();
        mhdr.msg_iovlen = 1;
        mhdr.msg_name = (&mut addr as *mut libc::sockaddr_storage).cast::<libc::c_void>();
        mhdr.msg_namelen = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

        let receive_flags = match queue {
            MessageQueue::Normal => 0,
            MessageQueue::Error => libc::MSG_ERRQUEUE,
        };

        // Safety:
        // We have a mutable reference to the control buffer for the duration of the
        // call, and controllen is also set to it's length.
        // IoSliceMut is ABI compatible with iovec, and we only have 1 which matches iovlen
        // msg_name is initialized to point to an owned sockaddr_storage and
        // msg_namelen is the size of sockaddr_storage
        // If one of the buffers is too small, recvmsg cuts off data at appropriate boundary
        let received_bytes = loop {
            match cerr(unsafe { libc::recvmsg(socket.as_raw_fd(), &mut mhdr, receive_flags) } as _)
            {
                Err(e) if std::io::ErrorKind::Interrupted == e.kind() => {
                    // retry when the recv was interrupted
                    continue;
                }
                Err(e) => return Err(e),
                Ok(received) => break received as usize,
            }
        };

        // the error queue echoes the sent payload unless OPT_TSONLY is set, we never want it
        if queue == MessageQueue::Normal && mhdr.msg_flags & libc::MSG_TRUNC > 0 {
            warn!(
                max_len = packet_buf.len(),
                "truncated packet because it was larger than expected",
            );
        }

        if mhdr.msg_flags & libc::MSG_CTRUNC > 0 {
            warn!(?queue, "truncated control messages");
        }

        // Clear out the fields for which we are giving up the reference
        mhdr.msg_iov = std::ptr::null_mut();
        mhdr.msg_iovlen = 0;
        mhdr.msg_name = std::ptr::null_mut();
        mhdr.msg_namelen = 0;

        // Safety:
        // recvmsg ensures that the control buffer contains
        // a set of valid control messages and that controllen is
        // the length these take up in the buffer.
        Ok((
            received_bytes,
            unsafe { ControlMessageIterator::new(mhdr) },
            sockaddr_storage_to_socket_addr(&addr),
        ))
    }

    /// The space used to store a control message that contains a value of type T
    pub(crate) const fn control_message_space<T>() -> usize {
        // Safety: CMSG_SPACE is safe to call
        (unsafe { libc::CMSG_SPACE((std::mem::size_of::<T>()) as _) }) as usize
    }

    fn zeroed_sockaddr_storage() -> libc::sockaddr_storage {
        // a zeroed-out sockaddr storage is semantically valid, because a ss_family with value 0 is
        // libc::AF_UNSPEC. Hence the rest of the data does not come with any constraints
        // Safety:
        // the MaybeUninit is zeroed before assumed to be initialized
        unsafe { std::mem::MaybeUninit::zeroed().assume_init() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_round_trip_through_the_kernel() {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        assert_eq!(read_timestamping_options(&socket).unwrap(), 0);

        let options = libc::SOF_TIMESTAMPING_SOFTWARE | libc::SOF_TIMESTAMPING_RX_SOFTWARE;
        set_timestamping_options(&socket, options).unwrap();
        assert_eq!(read_timestamping_options(&socket).unwrap(), options);

        set_timestamping_options(&socket, 0).unwrap();
        assert_eq!(read_timestamping_options(&socket).unwrap(), 0);
    }

    #[test]
    fn empty_error_queue_would_block() {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_nonblocking(true).unwrap();

        let mut control_buf = [0u8; control_message_space::<[libc::timespec; 3]>()];
        let result = receive_message(&socket, &mut [], &mut control_buf, MessageQueue::Error);

        assert_eq!(
            result.map(|(size, _, _)| size).unwrap_err().kind(),
            std::io::ErrorKind::WouldBlock
        );
    }
}
