use std::net::SocketAddr;

use tstamp_proto::{InterfaceName, NetworkInterface};

use crate::raw_socket::cerr;

/// Walks the host interface table as returned by `getifaddrs`.
///
/// An interface shows up once per address family it has an address for; the
/// packet-family entry is the one that marks it as link layer.
pub struct InterfaceIterator {
    base: *mut libc::ifaddrs,
    next: *mut libc::ifaddrs,
}

impl InterfaceIterator {
    pub fn new() -> std::io::Result<Self> {
        let mut addrs = std::mem::MaybeUninit::<*mut libc::ifaddrs>::uninit();

        // Safety:
        // getifaddrs writes a pointer to the head of a linked list into addrs, which is only
        // read after the call reported success. The list lives until freeifaddrs in drop.
        unsafe {
            cerr(libc::getifaddrs(addrs.as_mut_ptr()))?;

            Ok(Self {
                base: addrs.assume_init(),
                next: addrs.assume_init(),
            })
        }
    }
}

impl Drop for InterfaceIterator {
    fn drop(&mut self) {
        // Safety: base came from a successful getifaddrs and is freed exactly once
        unsafe { libc::freeifaddrs(self.base) };
    }
}

impl Iterator for InterfaceIterator {
    type Item = NetworkInterface;

    fn next(&mut self) -> Option<Self::Item> {
        // Safety: next is either NULL or an element of the list owned by self
        let ifaddr = unsafe { self.next.as_ref() }?;

        self.next = ifaddr.ifa_next;

        // Safety: ifa_name is a valid, NUL terminated string for every element
        let ifname = unsafe { std::ffi::CStr::from_ptr(ifaddr.ifa_name) };
        let name = InterfaceName::truncated(&ifname.to_string_lossy());

        // Safety: ifa_addr is NULL or points to a sockaddr that is valid as long as the list is
        let family = unsafe { ifaddr.ifa_addr.as_ref() }.map(|addr| addr.sa_family as libc::c_int);

        let loopback = ifaddr.ifa_flags & libc::IFF_LOOPBACK as libc::c_uint != 0;

        Some(NetworkInterface {
            name,
            link_layer: family == Some(libc::AF_PACKET),
            loopback: loopback || name.is_loopback(),
        })
    }
}

pub(crate) fn sockaddr_storage_to_socket_addr(
    sockaddr_storage: &libc::sockaddr_storage,
) -> Option<SocketAddr> {
    // Safety:
    //
    // sockaddr_storage always has enough space to store either a sockaddr_in or sockaddr_in6
    unsafe { sockaddr_to_socket_addr(sockaddr_storage as *const _ as *const libc::sockaddr) }
}

/// Convert a libc::sockaddr to a rust std::net::SocketAddr
///
/// # Safety
///
/// According to the posix standard, `sockaddr` does not have a defined size: the size depends on
/// the value of the `ss_family` field. We assume this to be correct.
unsafe fn sockaddr_to_socket_addr(sockaddr: *const libc::sockaddr) -> Option<SocketAddr> {
    // Most (but not all) of the fields in a socket addr are in network byte ordering.
    // As such, when doing conversions here, we should start from the NATIVE
    // byte representation, as this will actualy be the big-endian representation
    // of the underlying value regardless of platform.
    match unsafe { (*sockaddr).sa_family as libc::c_int } {
        libc::AF_INET => {
            let inaddr: libc::sockaddr_in =
                unsafe { std::ptr::read_unaligned(sockaddr as *const libc::sockaddr_in) };

            let socketaddr = std::net::SocketAddrV4::new(
                std::net::Ipv4Addr::from(inaddr.sin_addr.s_addr.to_ne_bytes()),
                u16::from_be_bytes(inaddr.sin_port.to_ne_bytes()),
            );

            Some(SocketAddr::V4(socketaddr))
        }
        libc::AF_INET6 => {
            let inaddr: libc::sockaddr_in6 =
                unsafe { std::ptr::read_unaligned(sockaddr as *const libc::sockaddr_in6) };

            let socketaddr = std::net::SocketAddrV6::new(
                std::net::Ipv6Addr::from(inaddr.sin6_addr.s6_addr),
                u16::from_be_bytes(inaddr.sin6_port.to_ne_bytes()),
                inaddr.sin6_flowinfo,
                inaddr.sin6_scope_id,
            );

            Some(SocketAddr::V6(socketaddr))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_table_has_loopback() {
        let loopback: Vec<_> = InterfaceIterator::new()
            .unwrap()
            .filter(|interface| interface.name == InterfaceName::LOOPBACK)
            .collect();

        assert!(!loopback.is_empty());
        assert!(loopback.iter().all(|interface| interface.loopback));
        assert!(loopback.iter().all(|interface| !interface.is_timestampable()));
    }

    #[test]
    fn names_fit_the_kernel_buffer() {
        for interface in InterfaceIterator::new().unwrap() {
            assert!(!interface.name.as_str().is_empty());
            assert_eq!(interface.name.as_bytes()[libc::IFNAMSIZ - 1], 0);
        }
    }

    #[test]
    fn convert_socket_addresses() {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        assert_eq!(sockaddr_storage_to_socket_addr(&storage), None);

        let v4 = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: 123u16.to_be(),
            sin_addr: libc::in_addr {
                s_addr: u32::from_ne_bytes([127, 0, 0, 1]),
            },
            sin_zero: [0; 8],
        };
        unsafe { std::ptr::write((&mut storage as *mut libc::sockaddr_storage).cast(), v4) };

        assert_eq!(
            sockaddr_storage_to_socket_addr(&storage),
            Some("127.0.0.1:123".parse().unwrap())
        );
    }
}
