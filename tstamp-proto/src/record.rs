use serde::Serialize;

use crate::control_message::{ExtendedErrorMeta, TimestampEvent, Timespec};

/// The event a timestamp belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Rx,
    Tx,
    Sched,
    Ack,
    Unknown,
}

impl Category {
    /// Send-side reports carry an event type; anything without one was received
    pub fn classify(error: Option<&ExtendedErrorMeta>) -> Self {
        match error.map(|e| e.event) {
            None => Category::Rx,
            Some(TimestampEvent::Snd) => Category::Tx,
            Some(TimestampEvent::Sched) => Category::Sched,
            Some(TimestampEvent::Ack) => Category::Ack,
            Some(TimestampEvent::Unknown(_)) => Category::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Rx => "RX",
            Category::Tx => "TX",
            Category::Sched => "SCHED",
            Category::Ack => "ACK",
            Category::Unknown => "??",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which clock produced a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Sw,
    Hw,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Sw => "SW",
            Source::Hw => "HW",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimestampRecord {
    pub category: Category,
    pub source: Source,
    /// Absent for received packets
    pub correlation_id: Option<u32>,
    pub seconds: i64,
    pub nanos: i64,
}

impl TimestampRecord {
    pub fn new(
        category: Category,
        source: Source,
        correlation_id: Option<u32>,
        instant: Timespec,
    ) -> Self {
        Self {
            category,
            source,
            correlation_id,
            seconds: instant.seconds,
            nanos: instant.nanos,
        }
    }
}

impl std::fmt::Display for TimestampRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:<6}{}: ", self.category, self.source)?;

        match self.correlation_id {
            Some(id) => write!(f, "[{id:>3}]")?,
            None => write!(f, "[  -]")?,
        }

        write!(f, " {}.{:09}", self.seconds, self.nanos)
    }
}
