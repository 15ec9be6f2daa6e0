use std::marker::PhantomData;

use tstamp_proto::{
    AncillaryEntry, ErrorOrigin, ExtendedErrorMeta, TimestampEvent, TimestampTriple, Timespec,
};

/// Backing storage for control messages, aligned like a `cmsghdr`
#[repr(C, align(8))]
pub(crate) struct ControlBuffer<const N: usize>([u8; N]);

impl<const N: usize> ControlBuffer<N> {
    pub(crate) const fn new() -> Self {
        Self([0; N])
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

pub(crate) fn empty_msghdr() -> libc::msghdr {
    // On `target_env = "musl"`, there are several private padding fields.
    // the position of these padding fields depends on the system endianness,
    // so keeping making them public does not really help.
    //
    // Safety:
    //
    // all fields are either integer or pointer types. For those types, 0 is a valid
    // value
    unsafe { std::mem::MaybeUninit::<libc::msghdr>::zeroed().assume_init() }
}

// Invariants:
// self.mhdr points to a valid libc::msghdr with a valid control
// message region.
// self.next_msg points to one of the control messages
// in the region described by self.mhdr or is NULL
//
// These invariants are guaranteed from the safety conditions on
// calling ControlMessageIterator::new, the fact that next preserves
// these invariants and that the fields of ControlMessageIterator
// are not modified outside these two functions.
pub(crate) struct ControlMessageIterator<'a> {
    mhdr: libc::msghdr,
    next_msg: *const libc::cmsghdr,
    phantom: PhantomData<&'a [u8]>,
}

impl<'a> ControlMessageIterator<'a> {
    // Safety assumptions:
    // mhdr has a control and controllen field
    // that together describe a memory region
    // with lifetime 'a containing valid control
    // messages
    pub(crate) unsafe fn new(mhdr: libc::msghdr) -> Self {
        // Safety:
        // mhdr's control and controllen fields are valid and point
        // to valid control messages.
        let current_msg = unsafe { libc::CMSG_FIRSTHDR(&mhdr) };

        // Invariant preservation:
        // The safety assumptions guaranteed by the caller ensure
        // that mhdr points to a valid region with valid control
        // messages. CMSG_FIRSTHDR is then guaranteed to either
        // return the pointer to the first valid control message
        // in that region, or NULL if the region is empty.
        Self {
            mhdr,
            next_msg: current_msg,
            phantom: PhantomData,
        }
    }
}

impl<'a> Iterator for ControlMessageIterator<'a> {
    type Item = AncillaryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        // Safety:
        // By the invariants, self.next_msg either points to a valid control message
        // or is NULL
        let current_msg = unsafe { self.next_msg.as_ref() }?;

        // Safety:
        // Invariants ensure that self.mhdr points to a valid libc::msghdr with a valid control
        // message region, and that self.next_msg either points to a valid control message
        // or is NULL.
        // The previous statement would have returned if self.next_msg were NULL, therefore both passed
        // pointers are valid for use with CMSG_NXTHDR
        // Invariant preservation:
        // CMSG_NXTHDR returns either a pointer to the next valid control message in the control
        // message region described by self.mhdr, or NULL
        self.next_msg = unsafe { libc::CMSG_NXTHDR(&self.mhdr, self.next_msg) };

        let other = AncillaryEntry::Other {
            level: current_msg.cmsg_level,
            kind: current_msg.cmsg_type,
        };

        Some(match (current_msg.cmsg_level, current_msg.cmsg_type) {
            (libc::SOL_SOCKET, libc::SCM_TIMESTAMPING) => {
                if !carries::<[libc::timespec; 3]>(current_msg) {
                    return Some(other);
                }

                // Safety:
                // current_msg was constructed from a pointer that pointed to a valid control message
                // and we checked that its data holds three timespecs.
                let timespecs = unsafe {
                    let ptr = libc::CMSG_DATA(current_msg) as *const [libc::timespec; 3];
                    std::ptr::read_unaligned(ptr)
                };

                AncillaryEntry::Timestamping(TimestampTriple(timespecs.map(read_timespec)))
            }

            (libc::SOL_IP, libc::IP_RECVERR) | (libc::SOL_IPV6, libc::IPV6_RECVERR) => {
                if !carries::<libc::sock_extended_err>(current_msg) {
                    return Some(other);
                }

                // this is part of how send timestamps are reported.
                // Safety:
                // current_msg was constructed from a pointer that pointed to a valid
                // control message and we checked that its data holds a sock_extended_err.
                let error = unsafe {
                    let ptr = libc::CMSG_DATA(current_msg) as *const libc::sock_extended_err;
                    std::ptr::read_unaligned(ptr)
                };

                AncillaryEntry::ExtendedError(read_extended_error(&error))
            }

            _ => other,
        })
    }
}

/// Whether the (possibly truncated) control message has room for a `T`
fn carries<T>(cmsg: &libc::cmsghdr) -> bool {
    // Safety: CMSG_LEN is safe to call
    let needed = unsafe { libc::CMSG_LEN(std::mem::size_of::<T>() as _) } as usize;
    cmsg.cmsg_len as usize >= needed
}

fn read_timespec(timespec: libc::timespec) -> Timespec {
    Timespec::new(timespec.tv_sec as i64, timespec.tv_nsec as i64)
}

fn read_extended_error(error: &libc::sock_extended_err) -> ExtendedErrorMeta {
    ExtendedErrorMeta {
        errno: error.ee_errno,
        origin: ErrorOrigin::from_raw(error.ee_origin),
        event: TimestampEvent::from_raw(error.ee_info),
        correlation_id: error.ee_data,
    }
}

#[cfg(test)]
mod tests {
    use tstamp_proto::{decode_bundle, Category, Source, TimestampRecord, NO_MESSAGE};

    use super::*;
    use crate::raw_socket::control_message_space;

    // linux/errqueue.h
    const SO_EE_ORIGIN_TIMESTAMPING: u8 = 4;
    const SCM_TSTAMP_SND: u32 = 0;

    const BUFFER_SIZE: usize = 3 * control_message_space::<[libc::timespec; 3]>()
        + control_message_space::<libc::sock_extended_err>();

    /// Lay out control messages the way recvmsg would
    fn build(
        buffer: &mut ControlBuffer<BUFFER_SIZE>,
        messages: &[(i32, i32, &[u8])],
    ) -> libc::msghdr {
        let mut mhdr = empty_msghdr();
        mhdr.msg_control = buffer.as_mut_slice().as_mut_ptr().cast();
        mhdr.msg_controllen = BUFFER_SIZE as _;

        let mut used = 0;
        let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&mhdr) };

        for (level, kind, data) in messages {
            let cmsg_ref = unsafe { cmsg.as_mut() }.unwrap();
            cmsg_ref.cmsg_level = *level;
            cmsg_ref.cmsg_type = *kind;
            cmsg_ref.cmsg_len = unsafe { libc::CMSG_LEN(data.len() as _) } as _;

            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), libc::CMSG_DATA(cmsg), data.len())
            };

            used += unsafe { libc::CMSG_SPACE(data.len() as _) } as usize;
            cmsg = unsafe { libc::CMSG_NXTHDR(&mhdr, cmsg) };
        }

        mhdr.msg_controllen = used as _;
        mhdr
    }

    fn bytes_of<T>(value: &T) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts((value as *const T).cast::<u8>(), std::mem::size_of::<T>())
        }
    }

    fn timespecs(software: (i64, i64), hardware: (i64, i64)) -> [libc::timespec; 3] {
        let mut raw: [libc::timespec; 3] = unsafe { std::mem::zeroed() };
        raw[0].tv_sec = software.0 as _;
        raw[0].tv_nsec = software.1 as _;
        raw[2].tv_sec = hardware.0 as _;
        raw[2].tv_nsec = hardware.1 as _;
        raw
    }

    fn extended_error(errno: u32, origin: u8, info: u32, data: u32) -> libc::sock_extended_err {
        let mut error: libc::sock_extended_err = unsafe { std::mem::zeroed() };
        error.ee_errno = errno;
        error.ee_origin = origin;
        error.ee_info = info;
        error.ee_data = data;
        error
    }

    #[test]
    fn no_message_is_enomsg() {
        assert_eq!(NO_MESSAGE, libc::ENOMSG as u32);
    }

    #[test]
    fn empty_region() {
        let mut buffer = ControlBuffer::<BUFFER_SIZE>::new();
        let mhdr = build(&mut buffer, &[]);

        let entries: Vec<_> = unsafe { ControlMessageIterator::new(mhdr) }.collect();
        assert!(entries.is_empty());
    }

    #[test]
    fn send_timestamp_bundle() {
        let stamps = timespecs((1_700_000_000, 123), (1_700_000_000, 456));
        let error = extended_error(
            libc::ENOMSG as u32,
            SO_EE_ORIGIN_TIMESTAMPING,
            SCM_TSTAMP_SND,
            7,
        );

        let mut buffer = ControlBuffer::<BUFFER_SIZE>::new();
        let mhdr = build(
            &mut buffer,
            &[
                (libc::SOL_SOCKET, libc::SCM_TIMESTAMPING, bytes_of(&stamps)),
                (libc::SOL_IP, libc::IP_RECVERR, bytes_of(&error)),
            ],
        );

        let entries: Vec<_> = unsafe { ControlMessageIterator::new(mhdr) }.collect();
        assert_eq!(
            entries,
            [
                AncillaryEntry::Timestamping(TimestampTriple::new(
                    Timespec::new(1_700_000_000, 123),
                    Timespec::new(1_700_000_000, 456),
                )),
                AncillaryEntry::ExtendedError(ExtendedErrorMeta::timestamp_report(
                    TimestampEvent::Snd,
                    7
                )),
            ]
        );

        assert_eq!(
            decode_bundle(entries),
            [
                TimestampRecord::new(
                    Category::Tx,
                    Source::Sw,
                    Some(7),
                    Timespec::new(1_700_000_000, 123)
                ),
                TimestampRecord::new(
                    Category::Tx,
                    Source::Hw,
                    Some(7),
                    Timespec::new(1_700_000_000, 456)
                ),
            ]
        );
    }

    #[test]
    fn ipv6_error_and_unknown_message() {
        let error = extended_error(libc::ECONNREFUSED as u32, 3, 0, 0);
        let unrelated = 1u32;

        let mut buffer = ControlBuffer::<BUFFER_SIZE>::new();
        let mhdr = build(
            &mut buffer,
            &[
                (libc::SOL_IPV6, libc::IPV6_RECVERR, bytes_of(&error)),
                (libc::SOL_IP, libc::IP_TTL, bytes_of(&unrelated)),
            ],
        );

        let entries: Vec<_> = unsafe { ControlMessageIterator::new(mhdr) }.collect();
        assert_eq!(
            entries,
            [
                AncillaryEntry::ExtendedError(ExtendedErrorMeta {
                    errno: libc::ECONNREFUSED as u32,
                    origin: ErrorOrigin::Icmp6,
                    event: TimestampEvent::Snd,
                    correlation_id: 0,
                }),
                AncillaryEntry::Other {
                    level: libc::SOL_IP,
                    kind: libc::IP_TTL,
                },
            ]
        );
    }

    #[test]
    fn short_timestamp_is_not_read() {
        let single: libc::timespec = unsafe { std::mem::zeroed() };

        let mut buffer = ControlBuffer::<BUFFER_SIZE>::new();
        let mhdr = build(
            &mut buffer,
            &[(libc::SOL_SOCKET, libc::SCM_TIMESTAMPING, bytes_of(&single))],
        );

        let entries: Vec<_> = unsafe { ControlMessageIterator::new(mhdr) }.collect();
        assert_eq!(
            entries,
            [AncillaryEntry::Other {
                level: libc::SOL_SOCKET,
                kind: libc::SCM_TIMESTAMPING,
            }]
        );
    }
}
