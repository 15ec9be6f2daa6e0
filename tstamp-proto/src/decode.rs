use tracing::{debug, warn};

use crate::{
    control_message::{AncillaryEntry, ExtendedErrorMeta, TimestampTriple},
    record::{Category, Source, TimestampRecord},
};

/// Pairs timestamp triples with the extended error reported alongside them.
///
/// The kernel delivers a send timestamp as two control messages in the same
/// bundle: the triple itself and a `sock_extended_err` that says what kind of
/// event it was. Nothing links the two except that they arrive together, so
/// the decoder holds one of each and flushes as soon as both are present.
/// A triple that never gets a partner was a receive timestamp.
///
/// When a second triple shows up before the first one was paired, the first
/// is dropped (and logged).
#[derive(Debug, Default)]
pub struct BundleDecoder {
    pending_triple: Option<TimestampTriple>,
    pending_error: Option<ExtendedErrorMeta>,
}

impl BundleDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: AncillaryEntry, records: &mut Vec<TimestampRecord>) {
        match entry {
            AncillaryEntry::Timestamping(triple) => {
                if let Some(dropped) = self.pending_triple.replace(triple) {
                    warn!(
                        software = ?dropped.software(),
                        hardware = ?dropped.hardware(),
                        "timestamp overwritten before it could be paired"
                    );
                }
            }
            AncillaryEntry::ExtendedError(error) => {
                if error.is_timestamp_report() {
                    self.pending_error = Some(error);
                } else {
                    warn!(
                        errno = error.errno,
                        origin = error.origin.to_raw(),
                        "unsupported ip error"
                    );
                }
            }
            AncillaryEntry::Other { level, kind } => {
                warn!(level, kind, "unsupported control message");
            }
        }

        if let (Some(triple), Some(error)) = (self.pending_triple, self.pending_error) {
            emit(&triple, Some(&error), records);
            self.pending_triple = None;
            self.pending_error = None;
        }
    }

    /// Flush whatever is left once the bundle is exhausted
    pub fn finish(self, records: &mut Vec<TimestampRecord>) {
        if let Some(triple) = self.pending_triple {
            emit(&triple, None, records);
        }

        if let Some(error) = self.pending_error {
            debug!(
                correlation_id = error.correlation_id,
                "timestamp report without timestamp"
            );
        }
    }
}

/// Decode the control messages of a single receive into timestamp records.
pub fn decode_bundle<I>(bundle: I) -> Vec<TimestampRecord>
where
    I: IntoIterator<Item = AncillaryEntry>,
{
    let mut decoder = BundleDecoder::new();
    let mut records = Vec::new();

    for entry in bundle {
        decoder.push(entry, &mut records);
    }

    decoder.finish(&mut records);
    records
}

fn emit(
    triple: &TimestampTriple,
    error: Option<&ExtendedErrorMeta>,
    records: &mut Vec<TimestampRecord>,
) {
    let category = Category::classify(error);
    let correlation_id = error.map(|e| e.correlation_id);

    // the middle instant is never filled in by current kernels
    for (source, instant) in [
        (Source::Sw, triple.software()),
        (Source::Hw, triple.hardware()),
    ] {
        if instant.is_zero() {
            continue;
        }

        records.push(TimestampRecord::new(
            category,
            source,
            correlation_id,
            instant,
        ));
    }
}
