use std::io::Write;

use serde::Deserialize;
use tstamp_proto::TimestampRecord;

/// How timestamp records are printed
#[derive(Debug, Default, Copy, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// One aligned line per record
    #[default]
    Text,
    /// One json object per line
    Json,
}

pub struct RecordWriter<W> {
    format: RecordFormat,
    out: W,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(format: RecordFormat, out: W) -> Self {
        Self { format, out }
    }

    pub fn write_records(&mut self, records: &[TimestampRecord]) -> std::io::Result<()> {
        for record in records {
            match self.format {
                RecordFormat::Text => writeln!(self.out, "{record}")?,
                RecordFormat::Json => {
                    serde_json::to_writer(&mut self.out, record)?;
                    writeln!(self.out)?;
                }
            }
        }

        self.out.flush()
    }
}
