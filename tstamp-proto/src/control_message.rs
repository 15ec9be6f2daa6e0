/// `ENOMSG`: the errno of an extended error that carries a timestamp instead of a failure
pub const NO_MESSAGE: u32 = 42;

/// A (seconds, nanoseconds) instant as found in a timestamping control message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timespec {
    pub seconds: i64,
    pub nanos: i64,
}

impl Timespec {
    pub const ZERO: Self = Self {
        seconds: 0,
        nanos: 0,
    };

    pub const fn new(seconds: i64, nanos: i64) -> Self {
        Self { seconds, nanos }
    }

    /// A zeroed instant means "no timestamp", not the epoch
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// The three instants of a single timestamping control message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimestampTriple(pub [Timespec; 3]);

impl TimestampTriple {
    pub const fn new(software: Timespec, hardware: Timespec) -> Self {
        Self([software, Timespec::ZERO, hardware])
    }

    pub fn software(&self) -> Timespec {
        self.0[0]
    }

    /// Position 1 is deprecated by the kernel and never reported
    pub fn legacy(&self) -> Timespec {
        self.0[1]
    }

    pub fn hardware(&self) -> Timespec {
        self.0[2]
    }
}

/// Where an extended error came from (`SO_EE_ORIGIN_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    None,
    Local,
    Icmp,
    Icmp6,
    /// Also known as `TXSTATUS`
    Timestamping,
    ZeroCopy,
    TxTime,
    Unknown(u8),
}

impl ErrorOrigin {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ErrorOrigin::None,
            1 => ErrorOrigin::Local,
            2 => ErrorOrigin::Icmp,
            3 => ErrorOrigin::Icmp6,
            4 => ErrorOrigin::Timestamping,
            5 => ErrorOrigin::ZeroCopy,
            6 => ErrorOrigin::TxTime,
            other => ErrorOrigin::Unknown(other),
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            ErrorOrigin::None => 0,
            ErrorOrigin::Local => 1,
            ErrorOrigin::Icmp => 2,
            ErrorOrigin::Icmp6 => 3,
            ErrorOrigin::Timestamping => 4,
            ErrorOrigin::ZeroCopy => 5,
            ErrorOrigin::TxTime => 6,
            ErrorOrigin::Unknown(other) => other,
        }
    }
}

/// The point in the send path a timestamp was taken at (`SCM_TSTAMP_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampEvent {
    Snd,
    Sched,
    Ack,
    Unknown(u32),
}

impl TimestampEvent {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => TimestampEvent::Snd,
            1 => TimestampEvent::Sched,
            2 => TimestampEvent::Ack,
            other => TimestampEvent::Unknown(other),
        }
    }
}

/// The fields of a `sock_extended_err` that matter for timestamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedErrorMeta {
    pub errno: u32,
    pub origin: ErrorOrigin,
    pub event: TimestampEvent,
    /// Matches the report to the send call that produced it
    pub correlation_id: u32,
}

impl ExtendedErrorMeta {
    pub fn timestamp_report(event: TimestampEvent, correlation_id: u32) -> Self {
        Self {
            errno: NO_MESSAGE,
            origin: ErrorOrigin::Timestamping,
            event,
            correlation_id,
        }
    }

    pub fn is_timestamp_report(&self) -> bool {
        self.errno == NO_MESSAGE && self.origin == ErrorOrigin::Timestamping
    }
}

/// A decoded entry of the control messages attached to a single receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AncillaryEntry {
    Timestamping(TimestampTriple),
    ExtendedError(ExtendedErrorMeta),
    Other { level: i32, kind: i32 },
}
