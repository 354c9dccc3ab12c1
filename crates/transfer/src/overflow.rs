//! Drop accounting for the log stream.
//!
//! A full ring drops the record instead of blocking. The number of dropped
//! records is carried forward and emitted as an overflow notice in front of
//! the next record that finds room, so the host knows the stream has a gap.

/// Event id of the overflow notice record.
pub const OVERFLOW_EVENT_ID: u8 = 0x03;

/// Anything that accepts whole log records without blocking.
pub trait LogSink {
    /// Enqueue one record. `false` means it was not written at all.
    fn try_write(&mut self, record: &[u8]) -> bool;
}

impl<T: LogSink + ?Sized> LogSink for &mut T {
    fn try_write(&mut self, record: &[u8]) -> bool {
        (**self).try_write(record)
    }
}

/// Encode an overflow notice: event id, then the drop count (u32 LE).
pub const fn overflow_notice(dropped: u32) -> [u8; 5] {
    let [a, b, c, d] = dropped.to_le_bytes();
    [OVERFLOW_EVENT_ID, a, b, c, d]
}

/// Wraps a [`LogSink`] and counts the records it had to drop.
#[derive(Debug)]
pub struct LogWriter<S> {
    sink: S,
    dropped: u32,
}

impl<S: LogSink> LogWriter<S> {
    /// Wrap `sink` with a zero drop count.
    pub const fn new(sink: S) -> Self {
        Self { sink, dropped: 0 }
    }

    /// Write one record, preceded by a pending overflow notice if any.
    ///
    /// If the notice itself does not fit, the record is dropped too (and
    /// counted), so the notice always precedes the first record after a gap.
    pub fn write(&mut self, record: &[u8]) -> bool {
        if self.dropped != 0 {
            if !self.sink.try_write(&overflow_notice(self.dropped)) {
                self.dropped = self.dropped.saturating_add(1);
                return false;
            }
            debug!("transfer: overflow notice, {} records dropped", self.dropped);
            self.dropped = 0;
        }
        if self.sink.try_write(record) {
            true
        } else {
            self.dropped = self.dropped.saturating_add(1);
            false
        }
    }

    /// Records dropped since the last notice went out.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The wrapped sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Unwrap, discarding the drop count.
    pub fn into_inner(self) -> S {
        self.sink
    }
}
