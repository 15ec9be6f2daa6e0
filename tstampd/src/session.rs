use std::{fmt::Display, io::Write};

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tstamp_proto::{SetupError, SetupReport, TimestampRecord};
use tstamp_udp::{query_interface_hw_timestamp, TimestampedSocket};

use crate::{config::Config, output::RecordWriter};

#[derive(Debug)]
pub enum SessionError {
    Bind(std::io::Error),
    Setup(SetupError),
    Output(std::io::Error),
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind(e) | Self::Output(e) => Some(e),
            Self::Setup(e) => Some(e),
        }
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind(e) => write!(f, "could not open socket: {e}"),
            Self::Setup(e) => write!(f, "could not enable timestamping: {e}"),
            Self::Output(e) => write!(f, "could not write timestamps: {e}"),
        }
    }
}

/// Open the socket, enable timestamping and print every timestamp that
/// comes back until the configured number of pings is done or we are
/// interrupted.
pub(crate) async fn run(config: &Config, out: impl Write) -> Result<(), SessionError> {
    let mut socket = TimestampedSocket::bind(config.socket.listen)
        .await
        .map_err(SessionError::Bind)?;

    if let Some(peer) = config.socket.peer {
        socket.connect(peer).map_err(SessionError::Bind)?;
    }

    let report = socket
        .setup_timestamping(config.timestamping, &config.socket.selection())
        .map_err(SessionError::Setup)?;
    log_report(&socket, &report);

    let mut writer = RecordWriter::new(config.output.format, out);
    let mut session = Session::new(config);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(config.ping.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let drain = tokio::time::sleep(config.ping.interval);
    tokio::pin!(drain);

    // large enough for any udp payload
    let mut buf = vec![0; u16::MAX as usize];
    let payload = vec![0; config.ping.payload_size];

    loop {
        let records = tokio::select! {
            _ = ticker.tick(), if session.wants_ping() => {
                match socket.send(&payload).await {
                    Ok((size, correlation_id)) => debug!(size, ?correlation_id, "sent ping"),
                    Err(e) => warn!(error = ?e, "could not send ping"),
                }

                if session.ping_sent() {
                    drain.as_mut().reset(Instant::now() + config.ping.interval);
                }

                continue;
            }
            result = socket.recv(&mut buf) => match result {
                Ok((size, peer, records)) => {
                    debug!(size, ?peer, "received packet");
                    records
                }
                Err(e) => {
                    warn!(error = ?e, "could not receive packet");
                    continue;
                }
            },
            result = socket.recv_timestamps() => match result {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = ?e, "could not fetch send timestamps");
                    continue;
                }
            },
            () = &mut drain, if session.is_draining() => {
                info!(pings = session.sent, "all pings sent");
                break;
            }
            _ = &mut shutdown => {
                info!("interrupted");
                break;
            }
        };

        print(&mut writer, &records)?;
    }

    Ok(())
}

fn print(
    writer: &mut RecordWriter<impl Write>,
    records: &[TimestampRecord],
) -> Result<(), SessionError> {
    writer.write_records(records).map_err(SessionError::Output)
}

fn log_report(socket: &TimestampedSocket, report: &SetupReport) {
    for (interface, grant) in report.granted() {
        match query_interface_hw_timestamp(socket.as_ref(), &interface) {
            Ok(current) => debug!(%interface, ?grant, ?current, "hardware timestamping active"),
            Err(e) => debug!(%interface, error = ?e, "could not read back hardware timestamping"),
        }
    }

    let failed = report.failed().count();
    if failed > 0 {
        info!(failed, "some interfaces do not provide hardware timestamps");
    }
}

/// Keeps track of how many pings went out and when the session is done.
#[derive(Debug)]
struct Session {
    has_peer: bool,
    count: u64,
    sent: u64,
}

impl Session {
    fn new(config: &Config) -> Self {
        Self {
            has_peer: config.socket.peer.is_some(),
            count: config.ping.count,
            sent: 0,
        }
    }

    fn wants_ping(&self) -> bool {
        self.has_peer && (self.count == 0 || self.sent < self.count)
    }

    /// Returns true when this was the last ping
    fn ping_sent(&mut self) -> bool {
        self.sent += 1;
        self.count != 0 && self.sent == self.count
    }

    /// All pings are out, we only wait for their last timestamps
    fn is_draining(&self) -> bool {
        self.has_peer && self.count != 0 && self.sent >= self.count
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tstamp_proto::{Category, SocketTimestampOptions};

    use super::*;
    use crate::output::RecordFormat;

    fn config(toml: &str) -> Config {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn bounded_session() {
        let mut session = Session::new(&config(
            "[socket]\npeer = \"127.0.0.1:1\"\n[ping]\ncount = 2",
        ));

        assert!(session.wants_ping());
        assert!(!session.is_draining());
        assert!(!session.ping_sent());
        assert!(session.ping_sent());
        assert!(!session.wants_ping());
        assert!(session.is_draining());
    }

    #[test]
    fn unbounded_session() {
        let mut session = Session::new(&config(
            "[socket]\npeer = \"127.0.0.1:1\"\n[ping]\ncount = 0",
        ));

        for _ in 0..100 {
            assert!(session.wants_ping());
            assert!(!session.ping_sent());
        }
        assert!(!session.is_draining());
    }

    #[test]
    fn listen_only_session() {
        let session = Session::new(&config(""));

        assert!(!session.wants_ping());
        assert!(!session.is_draining());
    }

    #[tokio::test]
    async fn loopback_peer_session() {
        let peer = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();

        let mut config = config("[output]\nformat = \"json\"");
        config.socket.listen = "127.0.0.1:0".parse().unwrap();
        config.socket.peer = Some(peer.local_addr().unwrap());
        // leave the adapters of the test machine alone
        config.socket.interfaces = Some(Vec::new());
        config.timestamping = SocketTimestampOptions::SOFTWARE;
        config.ping.interval = Duration::from_millis(20);
        config.ping.count = 3;

        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), run(&config, &mut out))
            .await
            .unwrap()
            .unwrap();

        let mut buf = [0; 64];
        let (size, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(size, 48);

        let output = String::from_utf8(out).unwrap();
        let records: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        let sent: Vec<_> = records
            .iter()
            .filter(|record| record["category"] == Category::Tx.as_str())
            .map(|record| record["correlation_id"].as_u64().unwrap())
            .collect();
        assert_eq!(sent, [0, 1, 2]);
    }

    #[test]
    fn writer_errors_are_reported() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::ErrorKind::BrokenPipe.into())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let record = TimestampRecord::new(
            Category::Rx,
            tstamp_proto::Source::Sw,
            None,
            tstamp_proto::Timespec::new(1, 0),
        );
        let mut writer = RecordWriter::new(RecordFormat::Text, Broken);

        assert!(matches!(
            print(&mut writer, &[record]),
            Err(SessionError::Output(_))
        ));
    }
}
