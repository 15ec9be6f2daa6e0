#![forbid(unsafe_code)]

use std::{io, net::SocketAddr};

use tokio::io::{unix::AsyncFd, Interest};
use tracing::instrument;
use tstamp_proto::{
    decode_bundle, setup_with_selection, InterfaceSelection, SetupError, SetupReport,
    SocketTimestampOptions, TimestampRecord,
};

use crate::{
    control_message::ControlBuffer,
    platform::LinuxPlatform,
    raw_socket::{
        control_message_space, read_timestamping_options, receive_message, MessageQueue,
    },
};

// a receive carries at most one timestamp triple
const RECEIVE_CONTROL_SIZE: usize = control_message_space::<[libc::timespec; 3]>();

// we get back two control messages for a send timestamp: one with the timestamp and one
// sock_extended_err, followed by the socket address of the offender (sockaddr_storage is
// bigger than we need, but sockaddr is too small for ipv6)
const ERROR_CONTROL_SIZE: usize = control_message_space::<[libc::timespec; 3]>()
    + control_message_space::<(libc::sock_extended_err, libc::sockaddr_storage)>();

/// A udp socket that reports the timestamps the kernel and adapters attach to its traffic.
pub struct TimestampedSocket {
    io: AsyncFd<std::net::UdpSocket>,
    /// Mirror of the kernel's send counter, only known while `OPT_ID` is on
    send_counter: Option<u32>,
}

impl TimestampedSocket {
    #[instrument(level = "debug")]
    pub async fn bind(listen_addr: SocketAddr) -> io::Result<TimestampedSocket> {
        let socket = tokio::net::UdpSocket::bind(listen_addr).await?;
        tracing::debug!(local_addr = ?socket.local_addr()?, "socket bound");

        Self::from_std(socket.into_std()?)
    }

    /// Wrap an already bound socket
    ///
    /// When the socket already numbers its sends we cannot know how far the
    /// kernel got, so no correlation ids are handed out until timestamping is
    /// set up again with `opt_id` turned off and on.
    pub fn from_std(socket: std::net::UdpSocket) -> io::Result<TimestampedSocket> {
        socket.set_nonblocking(true)?;

        if read_timestamping_options(&socket)? & libc::SOF_TIMESTAMPING_OPT_ID != 0 {
            tracing::debug!("socket already numbers its sends, correlation ids are unknown");
        }

        Ok(TimestampedSocket {
            io: AsyncFd::new(socket)?,
            send_counter: None,
        })
    }

    pub fn connect(&self, peer_addr: SocketAddr) -> io::Result<()> {
        self.io.get_ref().connect(peer_addr)?;
        tracing::debug!(
            local_addr = ?self.io.get_ref().local_addr()?,
            ?peer_addr,
            "socket connected"
        );

        Ok(())
    }

    pub fn platform(&self) -> LinuxPlatform<'_> {
        LinuxPlatform::new(self.io.get_ref())
    }

    /// Configure hardware timestamping on the selected interfaces and enable
    /// `options` on this socket.
    ///
    /// The kernel only restarts its send numbering when `opt_id` goes from off
    /// to on. Applying it again keeps the running count, and so do we.
    pub fn setup_timestamping(
        &mut self,
        options: SocketTimestampOptions,
        selection: &InterfaceSelection,
    ) -> Result<SetupReport, SetupError> {
        let previous =
            read_timestamping_options(self.io.get_ref()).map_err(SetupError::SocketOptions)?;
        let was_numbered = previous & libc::SOF_TIMESTAMPING_OPT_ID != 0;

        let report = setup_with_selection(&self.platform(), options, selection)?;

        self.send_counter = match (was_numbered, options.opt_id) {
            (_, false) => None,
            (false, true) => Some(0),
            (true, true) => self.send_counter,
        };

        Ok(report)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.io.get_ref().local_addr()
    }

    fn next_correlation_id(&mut self) -> Option<u32> {
        let id = self.send_counter?;
        self.send_counter = Some(id.wrapping_add(1));
        Some(id)
    }

    /// Send to the connected peer, returning the bytes sent and the
    /// correlation id the send timestamps for this packet will carry. There is
    /// no id unless the socket was set up with `opt_id`.
    #[instrument(level = "trace", skip(self, buf), fields(buf_size = buf.len()))]
    pub async fn send(&mut self, buf: &[u8]) -> io::Result<(usize, Option<u32>)> {
        tracing::trace!(size = buf.len(), "sending bytes");

        let result = self
            .io
            .async_io(Interest::WRITABLE, |inner| inner.send(buf))
            .await;

        self.finish_send(result)
    }

    #[instrument(level = "trace", skip(self, buf), fields(buf_size = buf.len()))]
    pub async fn send_to(
        &mut self,
        buf: &[u8],
        addr: SocketAddr,
    ) -> io::Result<(usize, Option<u32>)> {
        tracing::trace!(size = buf.len(), ?addr, "sending bytes");

        let result = self
            .io
            .async_io(Interest::WRITABLE, |inner| inner.send_to(buf, addr))
            .await;

        self.finish_send(result)
    }

    fn finish_send(&mut self, result: io::Result<usize>) -> io::Result<(usize, Option<u32>)> {
        match result {
            Ok(size) => {
                let correlation_id = self.next_correlation_id();
                tracing::trace!(sent = size, ?correlation_id, "sent bytes");
                Ok((size, correlation_id))
            }
            Err(e) => {
                tracing::debug!(error = debug(&e), "error sending data");
                Err(e)
            }
        }
    }

    /// Receive a datagram together with the receive timestamps attached to it
    #[instrument(level = "trace", skip(self, buf), fields(buf_size = buf.len()))]
    pub async fn recv(
        &self,
        buf: &mut [u8],
    ) -> io::Result<(usize, SocketAddr, Vec<TimestampRecord>)> {
        tracing::trace!("waiting for socket to become readable");

        let result = self
            .io
            .async_io(Interest::READABLE, |inner| recv(inner, buf))
            .await;

        match &result {
            Ok((size, addr, records)) => {
                tracing::trace!(size, ?addr, timestamps = records.len(), "received message");
            }
            Err(e) => tracing::debug!(error = ?e, "error receiving data"),
        }

        result
    }

    /// Wait for the next message on the error queue and decode the send
    /// timestamps it carries.
    #[instrument(level = "trace", skip(self))]
    pub async fn recv_timestamps(&self) -> io::Result<Vec<TimestampRecord>> {
        tracing::trace!("waiting for timestamp socket to become readable to fetch a send timestamp");

        // the timestamp being available triggers the error interest
        let result = self.io.async_io(Interest::ERROR, recv_timestamps).await;

        match &result {
            Ok(records) => tracing::trace!(timestamps = records.len(), "fetched send timestamps"),
            Err(e) => tracing::debug!(error = ?e, "error fetching send timestamps"),
        }

        result
    }
}

impl AsRef<std::net::UdpSocket> for TimestampedSocket {
    fn as_ref(&self) -> &std::net::UdpSocket {
        self.io.get_ref()
    }
}

fn recv(
    socket: &std::net::UdpSocket,
    buf: &mut [u8],
) -> io::Result<(usize, SocketAddr, Vec<TimestampRecord>)> {
    let mut control_buf = ControlBuffer::<RECEIVE_CONTROL_SIZE>::new();

    let (bytes_read, control_messages, sock_addr) = receive_message(
        socket,
        buf,
        control_buf.as_mut_slice(),
        MessageQueue::Normal,
    )?;

    let Some(sock_addr) = sock_addr else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "received a datagram without an ip source address",
        ));
    };

    Ok((bytes_read, sock_addr, decode_bundle(control_messages)))
}

fn recv_timestamps(socket: &std::net::UdpSocket) -> io::Result<Vec<TimestampRecord>> {
    let mut control_buf = ControlBuffer::<ERROR_CONTROL_SIZE>::new();

    // without OPT_TSONLY the sent payload is echoed back, which we do not need
    let (_, control_messages, _) = receive_message(
        socket,
        &mut [],
        control_buf.as_mut_slice(),
        MessageQueue::Error,
    )?;

    Ok(decode_bundle(control_messages))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tstamp_proto::{Category, Source};

    use super::*;

    // leave the adapters of the test machine alone
    fn no_adapters() -> InterfaceSelection {
        InterfaceSelection::Only(Vec::new())
    }

    async fn pair() -> (TimestampedSocket, TimestampedSocket) {
        let a = TimestampedSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let b = TimestampedSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        a.connect(b.local_addr().unwrap()).unwrap();
        b.connect(a.local_addr().unwrap()).unwrap();

        (a, b)
    }

    #[tokio::test]
    async fn basic_exchange() {
        let (mut a, mut b) = pair().await;

        // nothing numbers the sends before timestamping is set up
        let (size, id) = a.send(&[1; 48]).await.unwrap();
        assert_eq!((size, id), (48, None));

        let mut buf = [0; 48];
        let (size, addr, records) = b.recv(&mut buf).await.unwrap();
        assert_eq!(size, 48);
        assert_eq!(addr, a.local_addr().unwrap());
        assert_eq!(buf, [1; 48]);
        assert!(records.is_empty());

        let (size, id) = b.send_to(&[2; 48], addr).await.unwrap();
        assert_eq!((size, id), (48, None));
    }

    #[tokio::test]
    async fn receive_timestamps() {
        let (mut a, mut b) = pair().await;
        b.setup_timestamping(SocketTimestampOptions::SOFTWARE, &no_adapters())
            .unwrap();

        // the kernel may enable receive timestamping asynchronously
        tokio::time::sleep(Duration::from_millis(100)).await;
        a.send(&[1; 48]).await.unwrap();

        let mut buf = [0; 48];
        let (_, _, records) = b.recv(&mut buf).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, Category::Rx);
        assert_eq!(records[0].source, Source::Sw);
        assert_eq!(records[0].correlation_id, None);
        assert!(records[0].seconds > 0);
    }

    #[tokio::test]
    async fn send_timestamps_on_error_queue() {
        let (mut a, _b) = pair().await;
        a.setup_timestamping(SocketTimestampOptions::SOFTWARE, &no_adapters())
            .unwrap();

        let (_, first) = a.send(&[1; 48]).await.unwrap();
        let (_, second) = a.send(&[2; 48]).await.unwrap();
        assert_eq!((first, second), (Some(0), Some(1)));

        assert_eq!(reported_ids(&a, 2).await, [0, 1]);
    }

    /// Collect the correlation ids of `count` send timestamps
    async fn reported_ids(socket: &TimestampedSocket, count: usize) -> Vec<u32> {
        let mut ids = Vec::new();

        while ids.len() < count {
            let records = tokio::time::timeout(Duration::from_secs(1), socket.recv_timestamps())
                .await
                .unwrap()
                .unwrap();

            for record in records {
                assert_eq!(record.category, Category::Tx);
                assert_eq!(record.source, Source::Sw);
                ids.extend(record.correlation_id);
            }
        }

        ids
    }

    #[tokio::test]
    async fn repeated_setup_keeps_ids_in_step() {
        let (mut a, _b) = pair().await;

        a.setup_timestamping(SocketTimestampOptions::SOFTWARE, &no_adapters())
            .unwrap();
        let (_, first) = a.send(&[1; 48]).await.unwrap();
        assert_eq!(reported_ids(&a, 1).await, [0]);

        // the kernel keeps counting, so must we
        a.setup_timestamping(SocketTimestampOptions::SOFTWARE, &no_adapters())
            .unwrap();
        let (_, second) = a.send(&[2; 48]).await.unwrap();
        assert_eq!(reported_ids(&a, 1).await, [1]);

        assert_eq!((first, second), (Some(0), Some(1)));
    }

    #[tokio::test]
    async fn no_ids_without_numbering() {
        let (mut a, _b) = pair().await;
        let unnumbered = SocketTimestampOptions {
            opt_id: false,
            ..SocketTimestampOptions::SOFTWARE
        };

        a.setup_timestamping(unnumbered, &no_adapters()).unwrap();
        let (_, first) = a.send(&[1; 48]).await.unwrap();
        let (_, second) = a.send(&[2; 48]).await.unwrap();
        assert_eq!((first, second), (None, None));

        // turning numbering on restarts the kernel's count at 0
        a.setup_timestamping(SocketTimestampOptions::SOFTWARE, &no_adapters())
            .unwrap();
        let (_, third) = a.send(&[3; 48]).await.unwrap();
        assert_eq!(third, Some(0));
    }

    #[test]
    fn wrapping_std_socket_with_numbering_gives_no_ids() {
        let std_socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        crate::raw_socket::set_timestamping_options(
            &std_socket,
            libc::SOF_TIMESTAMPING_SOFTWARE | libc::SOF_TIMESTAMPING_OPT_ID,
        )
        .unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let mut socket = TimestampedSocket::from_std(std_socket).unwrap();
        assert_eq!(socket.next_correlation_id(), None);
    }
}
