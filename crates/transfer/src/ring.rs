//! Single-producer/single-consumer byte ring shared across cache domains.
//!
//! `head` is the next byte the producer writes, `tail` the next byte the
//! consumer reads. `head == tail` is empty; one byte is always left free so
//! that `head + 1 == tail` (mod capacity) means full.
//!
//! Each side writes only its own index and only invalidates memory the other
//! side wrote:
//!
//! | Step                | Producer                        | Consumer                         |
//! |---------------------|---------------------------------|----------------------------------|
//! | own index           | read as-is                      | read as-is                       |
//! | foreign index       | invalidate, then read `tail`    | invalidate, then read `head`     |
//! | data                | copy in, writeback              | invalidate, copy out             |
//! | publish             | store `head`, writeback slot    | store `tail`, writeback slot     |
//!
//! Every operation runs inside one critical section.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{fence, Ordering};

use cache::{NoMaintenance, RangeMaintenance};

use crate::layout::{Slot, SLOT_SIZE};
use crate::mode::IndexLocation;

/// Where a transfer lands: `first` bytes at `start`, then `second` bytes
/// at offset 0. `next` is the index after the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    first: usize,
    second: usize,
    next: usize,
}

impl Span {
    const fn direct(start: usize, len: usize, next: usize) -> Self {
        Self {
            start,
            first: len,
            second: 0,
            next,
        }
    }
}

/// Where `len` bytes can be written, if they fit.
fn plan_write(head: usize, tail: usize, cap: usize, len: usize) -> Option<Span> {
    if len >= cap || head >= cap || tail >= cap {
        return None;
    }
    let after = head.checked_add(1)?;
    if after == tail || (after == cap && tail == 0) {
        return None;
    }
    let end = head.checked_add(len)?;
    if tail <= head {
        if end < cap {
            return Some(Span::direct(head, len, end));
        }
        let wrapped = end.checked_sub(cap)?;
        (wrapped < tail).then_some(Span {
            start: head,
            first: cap.checked_sub(head)?,
            second: wrapped,
            next: wrapped,
        })
    } else {
        (end < tail).then_some(Span::direct(head, len, end))
    }
}

/// Where exactly `len` bytes can be read from, if that many are available.
fn plan_read(head: usize, tail: usize, cap: usize, len: usize) -> Option<Span> {
    if len >= cap || head >= cap || tail >= cap || head == tail {
        return None;
    }
    let end = tail.checked_add(len)?;
    if tail < head {
        return (end <= head).then_some(Span::direct(tail, len, end));
    }
    if end < cap {
        return Some(Span::direct(tail, len, end));
    }
    let wrapped = end.checked_sub(cap)?;
    (wrapped <= head).then_some(Span {
        start: tail,
        first: cap.checked_sub(tail)?,
        second: wrapped,
        next: wrapped,
    })
}

/// Bytes written but not yet read.
#[allow(clippy::arithmetic_side_effects)] // Safety: callers pass head, tail < cap
fn occupancy(head: usize, tail: usize, cap: usize) -> usize {
    if head >= tail {
        head - tail
    } else {
        cap - tail + head
    }
}

/// Raw view of one ring: buffer plus the two index words.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawRing {
    base: *mut u8,
    capacity: usize,
    head: *mut usize,
    tail: *mut usize,
    location: IndexLocation,
}

impl RawRing {
    /// # Safety
    ///
    /// `base` must be valid for `capacity` bytes and `head`/`tail` must point
    /// at 8-byte index slots, all for as long as any endpoint built from this
    /// ring is alive. At most one producer and one consumer may exist.
    pub(crate) unsafe fn new(
        base: *mut u8,
        capacity: usize,
        head: *mut usize,
        tail: *mut usize,
        location: IndexLocation,
    ) -> Self {
        Self {
            base,
            capacity,
            head,
            tail,
            location,
        }
    }

    fn at(&self, offset: usize) -> *mut u8 {
        self.base.wrapping_add(offset)
    }

    fn load(index: *mut usize) -> usize {
        // SAFETY: `new` guarantees the slot is valid and aligned.
        unsafe { ptr::read_volatile(index) }
    }

    fn store(index: *mut usize, value: usize) {
        // SAFETY: as in `load`; only the owning endpoint stores to a slot.
        unsafe { ptr::write_volatile(index, value) }
    }

    fn occupancy(&self) -> usize {
        let head = Self::load(self.head);
        let tail = Self::load(self.tail);
        if head >= self.capacity || tail >= self.capacity {
            return 0;
        }
        occupancy(head, tail, self.capacity)
    }
}

/// Fetch a slot the other side writes.
fn refresh<M: RangeMaintenance>(maint: &M, slot: *mut usize) {
    // SAFETY: this side never writes the foreign slot, so no local store is lost.
    unsafe { maint.invalidate_range(slot as usize, SLOT_SIZE) };
}

// ── Producer ────────────────────────────────────────────────────────────────

/// Writing end of a ring.
pub struct RingProducer<'a, M> {
    raw: RawRing,
    maint: M,
    _ring: PhantomData<&'a ()>,
}

// SAFETY: the endpoint is the only writer of its index and of the buffer
// bytes it publishes; moving it to another context keeps that true.
unsafe impl<M: Send> Send for RingProducer<'_, M> {}

impl<M: RangeMaintenance> RingProducer<'_, M> {
    /// # Safety
    ///
    /// See [`RawRing::new`]; the caller picks a lifetime no longer than the
    /// memory behind `raw`.
    pub(crate) unsafe fn new(raw: RawRing, maint: M) -> Self {
        Self {
            raw,
            maint,
            _ring: PhantomData,
        }
    }

    /// Enqueue `data` as one contiguous record. Returns `false`, touching
    /// nothing, when it does not fit.
    pub fn try_write(&mut self, data: &[u8]) -> bool {
        let raw = self.raw;
        if data.len() >= raw.capacity {
            return false;
        }
        critical_section::with(|_| {
            let head = RawRing::load(raw.head);
            refresh(&self.maint, raw.tail);
            let tail = RawRing::load(raw.tail);

            let Some(span) = plan_write(head, tail, raw.capacity, data.len()) else {
                return false;
            };
            let (Some(first), Some(second)) = (data.get(..span.first), data.get(span.first..))
            else {
                return false;
            };

            // SAFETY: `plan_write` keeps both pieces inside the buffer, and the
            // bytes between head and tail belong to the producer.
            unsafe {
                ptr::copy_nonoverlapping(first.as_ptr(), raw.at(span.start), first.len());
                ptr::copy_nonoverlapping(second.as_ptr(), raw.base, second.len());
            }
            self.maint
                .writeback_range(raw.at(span.start) as usize, first.len());
            if !second.is_empty() {
                self.maint.writeback_range(raw.base as usize, second.len());
            }

            fence(Ordering::Release);
            RawRing::store(raw.head, span.next);
            self.maint.writeback_range(raw.head as usize, SLOT_SIZE);
            true
        })
    }

    /// Bytes queued and not yet consumed.
    pub fn len(&self) -> usize {
        refresh(&self.maint, self.raw.tail);
        self.raw.occupancy()
    }

    /// Whether the consumer has caught up.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether not even one more byte fits.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity().saturating_sub(1)
    }

    /// Buffer size in bytes; at most `capacity() - 1` can be queued.
    pub fn capacity(&self) -> usize {
        self.raw.capacity
    }

    /// Where this ring's indices live.
    pub fn location(&self) -> IndexLocation {
        self.raw.location
    }
}

// ── Consumer ────────────────────────────────────────────────────────────────

/// Reading end of a ring.
pub struct RingConsumer<'a, M> {
    raw: RawRing,
    maint: M,
    _ring: PhantomData<&'a ()>,
}

// SAFETY: see `RingProducer`.
unsafe impl<M: Send> Send for RingConsumer<'_, M> {}

impl<M: RangeMaintenance> RingConsumer<'_, M> {
    /// # Safety
    ///
    /// See [`RingProducer::new`].
    pub(crate) unsafe fn new(raw: RawRing, maint: M) -> Self {
        Self {
            raw,
            maint,
            _ring: PhantomData,
        }
    }

    /// Dequeue exactly `out.len()` bytes. Returns `false`, touching nothing,
    /// when fewer are available.
    pub fn try_read(&mut self, out: &mut [u8]) -> bool {
        let raw = self.raw;
        if out.len() >= raw.capacity {
            return false;
        }
        critical_section::with(|_| {
            refresh(&self.maint, raw.head);
            let head = RawRing::load(raw.head);
            let tail = RawRing::load(raw.tail);

            let Some(span) = plan_read(head, tail, raw.capacity, out.len()) else {
                return false;
            };
            let (first, second) = out.split_at_mut(span.first);

            // SAFETY: the producer published these bytes before publishing
            // `head`, and never writes them again until `tail` moves past.
            unsafe {
                self.maint
                    .invalidate_range(raw.at(span.start) as usize, first.len());
                if !second.is_empty() {
                    self.maint.invalidate_range(raw.base as usize, second.len());
                }
            }
            fence(Ordering::Acquire);
            // SAFETY: `plan_read` keeps both pieces inside the buffer.
            unsafe {
                ptr::copy_nonoverlapping(raw.at(span.start), first.as_mut_ptr(), first.len());
                ptr::copy_nonoverlapping(raw.base, second.as_mut_ptr(), second.len());
            }

            fence(Ordering::Release);
            RawRing::store(raw.tail, span.next);
            self.maint.writeback_range(raw.tail as usize, SLOT_SIZE);
            true
        })
    }

    /// Bytes available to read.
    pub fn len(&self) -> usize {
        refresh(&self.maint, self.raw.head);
        self.raw.occupancy()
    }

    /// Whether nothing is available.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the producer cannot add even one byte.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity().saturating_sub(1)
    }

    /// Buffer size in bytes.
    pub fn capacity(&self) -> usize {
        self.raw.capacity
    }

    /// Where this ring's indices live.
    pub fn location(&self) -> IndexLocation {
        self.raw.location
    }
}

// ── Local storage ───────────────────────────────────────────────────────────

/// A ring in ordinary memory, for queues that never leave the core.
///
/// ```
/// use transfer::RingStorage;
///
/// let mut ring = RingStorage::<16>::new();
/// let (mut tx, mut rx) = ring.split();
/// assert!(tx.try_write(b"hello"));
/// let mut out = [0u8; 5];
/// assert!(rx.try_read(&mut out));
/// assert_eq!(&out, b"hello");
/// ```
pub struct RingStorage<const N: usize> {
    buf: UnsafeCell<[u8; N]>,
    head: Slot,
    tail: Slot,
}

impl<const N: usize> RingStorage<N> {
    /// An empty ring.
    pub const fn new() -> Self {
        Self {
            buf: UnsafeCell::new([0; N]),
            head: Slot::new(),
            tail: Slot::new(),
        }
    }

    /// Borrow both ends. Indices persist across splits.
    pub fn split(
        &mut self,
    ) -> (
        RingProducer<'_, NoMaintenance>,
        RingConsumer<'_, NoMaintenance>,
    ) {
        // SAFETY: all three pointers come from `self`, which stays mutably
        // borrowed for as long as the endpoints live.
        unsafe {
            let raw = RawRing::new(
                self.buf.get().cast(),
                N,
                self.head.as_ptr(),
                self.tail.as_ptr(),
                IndexLocation::Unified,
            );
            (
                RingProducer::new(raw, NoMaintenance),
                RingConsumer::new(raw, NoMaintenance),
            )
        }
    }
}

impl<const N: usize> Default for RingStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn write_rejects_when_full() {
        assert_eq!(plan_write(3, 4, 8, 0), None);
        assert_eq!(plan_write(7, 0, 8, 0), None);
    }

    #[test]
    fn write_splits_at_physical_end() {
        let span = plan_write(6, 3, 8, 4).unwrap();
        assert_eq!(
            span,
            Span {
                start: 6,
                first: 2,
                second: 2,
                next: 2
            }
        );
    }

    #[test]
    fn write_ending_exactly_at_capacity_wraps_head_to_zero() {
        let span = plan_write(6, 2, 8, 2).unwrap();
        assert_eq!(span.first, 2);
        assert_eq!(span.second, 0);
        assert_eq!(span.next, 0);
        // ...but not if the consumer is still at zero.
        assert_eq!(plan_write(6, 0, 8, 2), None);
    }

    #[test]
    fn write_behind_tail_must_leave_a_gap() {
        assert_eq!(plan_write(1, 5, 8, 3).map(|s| s.next), Some(4));
        assert_eq!(plan_write(1, 5, 8, 4), None);
    }

    #[test]
    fn read_is_exact() {
        assert_eq!(plan_read(3, 0, 8, 4), None);
        assert_eq!(plan_read(3, 0, 8, 3).map(|s| s.next), Some(3));
        assert_eq!(plan_read(5, 5, 8, 0), None);
    }

    #[test]
    fn read_wraps_around() {
        let span = plan_read(2, 6, 8, 4).unwrap();
        assert_eq!(
            span,
            Span {
                start: 6,
                first: 2,
                second: 2,
                next: 2
            }
        );
        assert_eq!(plan_read(2, 6, 8, 5), None);
    }

    #[test]
    fn occupancy_counts_across_wrap() {
        assert_eq!(occupancy(2, 6, 8), 4);
        assert_eq!(occupancy(6, 2, 8), 4);
        assert_eq!(occupancy(5, 5, 8), 0);
    }

    #[test]
    fn storage_round_trip_with_wrap() {
        let mut ring = RingStorage::<8>::new();
        let (mut tx, mut rx) = ring.split();
        let mut out = [0u8; 5];
        assert!(tx.try_write(&[0; 5]));
        assert!(rx.try_read(&mut out));
        assert!(tx.try_write(b"wraps"));
        assert_eq!(tx.len(), 5);
        assert!(rx.try_read(&mut out));
        assert_eq!(&out, b"wraps");
        assert!(rx.is_empty());
    }

    #[test]
    fn storage_full_at_capacity_minus_one() {
        let mut ring = RingStorage::<8>::new();
        let (mut tx, rx) = ring.split();
        assert!(!tx.try_write(&[1; 8]));
        assert!(tx.try_write(&[1; 7]));
        assert!(tx.is_full());
        assert!(rx.is_full());
        assert!(!tx.try_write(&[]));
        assert_eq!(tx.location(), IndexLocation::Unified);
    }

    #[test]
    fn zero_length_transfers() {
        let mut ring = RingStorage::<8>::new();
        let (mut tx, mut rx) = ring.split();
        assert!(!rx.try_read(&mut []));
        assert!(tx.try_write(&[]));
        assert!(tx.is_empty());
        assert!(tx.try_write(&[9]));
        assert!(rx.try_read(&mut []));
        assert_eq!(rx.len(), 1);
    }
}
