//! DMA buffer maintenance for non-coherent DMA masters.
//!
//! When [`CacheInfo::dma_coherent`](crate::CacheInfo::dma_coherent) is set
//! every helper here is a no-op. Otherwise:
//!
//! - Before a device reads a buffer: [`CacheEngine::dma_writeback_range`].
//! - After a device wrote a buffer: one of the two invalidate helpers.
//!
//! DMA buffers rarely start and end on line boundaries. The first and last
//! lines of such a buffer also hold unrelated CPU data, and invalidating them
//! outright would throw that data away. The two helpers differ only in how
//! they treat these boundary lines:
//!
//! ```text
//!   line N            line N+1           line N+2
//! |----xxxxxxxxxxxx|xxxxxxxxxxxxxxxx|xxxxxxxx--------|
//!      ^ start                               ^ end
//!  ---- unrelated CPU bytes   xxxx DMA buffer
//! ```
//!
//! - [`dma_invalidate_range`](CacheEngine::dma_invalidate_range) flushes the
//!   boundary lines (the CPU bytes survive, the DMA bytes in those lines may
//!   be overwritten by stale cached data).
//! - [`dma_invalidate_range_preserving`](CacheEngine::dma_invalidate_range_preserving)
//!   copies the CPU bytes out, invalidates the boundary line, and copies them
//!   back (the DMA bytes survive too).
//!
//! The preserving variant assumes nothing else writes the boundary line
//! between the copy-out and the copy-back. A DMA write landing in that window
//! on the CPU-owned bytes is lost.

use crate::controller::CacheController;
use crate::engine::CacheEngine;

/// Largest line size a scratch buffer must hold (`mdcm_cfg` SIZE field 5).
pub const MAX_LINE_SIZE: usize = 128;

/// Buffer split into an unaligned head, an aligned middle, and an unaligned
/// tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Boundaries {
    pub start: usize,
    pub end: usize,
    /// First line boundary at or above `start`.
    pub aligned_start: usize,
    /// Last line boundary at or below `end`.
    pub aligned_end: usize,
}

impl Boundaries {
    fn new(start: usize, size: usize, line: usize) -> Self {
        let end = start.saturating_add(size);
        let mask = line.wrapping_sub(1);
        let aligned_start = match start.checked_add(mask) {
            Some(v) => v & !mask,
            None => start & !mask,
        };
        Self {
            start,
            end,
            aligned_start,
            aligned_end: end & !mask,
        }
    }

    /// The buffer lies inside one line without touching a boundary.
    fn within_one_line(&self) -> bool {
        self.aligned_start > self.aligned_end
    }

    fn middle_len(&self) -> usize {
        self.aligned_end.saturating_sub(self.aligned_start)
    }
}

impl<C: CacheController> CacheEngine<C> {
    /// Make CPU writes to `[addr, addr + size)` visible to a DMA master.
    pub fn dma_writeback_range(&self, addr: usize, size: usize) {
        if self.info().dma_coherent() {
            return;
        }
        self.dcache_writeback_range(addr, size);
    }

    /// Make DMA writes to `[addr, addr + size)` visible to the CPU, flushing
    /// partial boundary lines.
    ///
    /// # Safety
    ///
    /// The aligned middle of the range is discarded without writeback. The
    /// caller must not hold dirty CPU data there (it belongs to the device
    /// for the duration of the transfer). DMA bytes in the boundary lines may
    /// be replaced by stale cached contents; size the buffer to whole lines
    /// if that matters, or use
    /// [`dma_invalidate_range_preserving`](Self::dma_invalidate_range_preserving).
    pub unsafe fn dma_invalidate_range(&self, addr: usize, size: usize) {
        let info = self.info();
        if info.dma_coherent() || !info.has_dcache() || size == 0 {
            return;
        }
        let b = Boundaries::new(addr, size, info.line_size());
        critical_section::with(|_| {
            if b.within_one_line() {
                self.dcache_flush_range(b.start, 1);
                return;
            }
            if b.start < b.aligned_start {
                self.dcache_flush_range(b.start, 1);
            }
            if b.aligned_start < b.aligned_end {
                // SAFETY: the middle is line-aligned and owned by the device.
                unsafe { self.dcache_invalidate_range(b.aligned_start, b.middle_len()) };
            }
            if b.aligned_end < b.end {
                self.dcache_flush_range(b.end, 1);
            }
        });
    }

    /// Make DMA writes to `[addr, addr + size)` visible to the CPU, keeping
    /// both the DMA bytes and the neighbouring CPU bytes of boundary lines.
    ///
    /// The transfer must have completed: DMA bytes that land in a boundary
    /// line between the copy-out and the restore can be lost.
    ///
    /// # Safety
    ///
    /// As for [`dma_invalidate_range`](Self::dma_invalidate_range), and in
    /// addition the boundary lines must be readable and writable by the CPU
    /// and no other master may write the CPU-owned bytes of a boundary line
    /// while this runs.
    pub unsafe fn dma_invalidate_range_preserving(&self, addr: usize, size: usize) {
        let info = self.info();
        let line = info.line_size();
        if info.dma_coherent() || line == 0 || size == 0 || line > MAX_LINE_SIZE {
            return;
        }
        let b = Boundaries::new(addr, size, line);
        critical_section::with(|_| {
            if b.within_one_line() {
                // SAFETY: forwarded caller contract.
                unsafe { self.invalidate_partial_line(b.start, b.end, line) };
                return;
            }
            if b.start < b.aligned_start {
                // SAFETY: forwarded caller contract.
                unsafe { self.invalidate_partial_line(b.start, b.aligned_start, line) };
            }
            if b.aligned_start < b.aligned_end {
                // SAFETY: the middle is line-aligned and owned by the device.
                unsafe { self.dcache_invalidate_range(b.aligned_start, b.middle_len()) };
            }
            if b.aligned_end < b.end {
                // SAFETY: forwarded caller contract.
                unsafe { self.invalidate_partial_line(b.aligned_end, b.end, line) };
            }
        });
    }

    /// Invalidate the line containing `[start, end)` while keeping the bytes
    /// of that line outside the range.
    ///
    /// # Safety
    ///
    /// `[start, end)` lies within a single line whose memory is valid for
    /// reads and writes, and `line <= MAX_LINE_SIZE`.
    #[allow(clippy::arithmetic_side_effects)] // Safety: all offsets are within one line (<= MAX_LINE_SIZE)
    unsafe fn invalidate_partial_line(&self, start: usize, end: usize, line: usize) {
        let mask = line - 1;
        let line_start = start & !mask;
        let line_end = (end + mask) & !mask;
        let end_offset = end & mask;
        let head_len = start - line_start;
        let tail_len = line_end - end;

        let mut saved = [0u8; MAX_LINE_SIZE];
        let base = saved.as_mut_ptr();

        // SAFETY: head bytes `[line_start, start)` and tail bytes
        // `[end, line_end)` are inside the caller's valid line. `saved` is
        // MAX_LINE_SIZE long and `end_offset + tail_len == line` when
        // `tail_len != 0`.
        unsafe {
            if head_len != 0 {
                core::ptr::copy_nonoverlapping(line_start as *const u8, base, head_len);
            }
            if tail_len != 0 {
                core::ptr::copy_nonoverlapping(end as *const u8, base.add(end_offset), tail_len);
            }
            self.dcache_invalidate_range(start, 1);
            if head_len != 0 {
                core::ptr::copy_nonoverlapping(base, line_start as *mut u8, head_len);
            }
            if tail_len != 0 {
                core::ptr::copy_nonoverlapping(base.add(end_offset), end as *mut u8, tail_len);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::csr::L1Command;
    use crate::mocks::{CacheOp, MockCache};

    #[test]
    fn boundaries_split_unaligned_buffer() {
        let b = Boundaries::new(0x1010, 0x80, 0x40);
        assert_eq!(b.aligned_start, 0x1040);
        assert_eq!(b.aligned_end, 0x1080);
        assert_eq!(b.end, 0x1090);
        assert!(!b.within_one_line());
        assert_eq!(b.middle_len(), 0x40);

        let b = Boundaries::new(0x1010, 0x10, 0x40);
        assert!(b.within_one_line());
    }

    #[test]
    fn writeback_skipped_when_dma_is_coherent() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64).with_dma_coherency());
        engine.dma_writeback_range(0x2000, 256);
        // SAFETY: mock controller.
        unsafe { engine.dma_invalidate_range(0x2000, 256) };
        assert!(engine.controller().ops().is_empty());
    }

    #[test]
    fn writeback_delegates_when_not_coherent() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64));
        engine.dma_writeback_range(0x2000, 64);
        assert_eq!(
            engine.controller().take_ops(),
            vec![CacheOp::l1(L1Command::DVaWriteback, 0x2000)]
        );
    }

    #[test]
    fn invalidate_flushes_boundaries_and_invalidates_middle() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64));
        // SAFETY: mock controller.
        unsafe { engine.dma_invalidate_range(0x1010, 0x80) };
        assert_eq!(
            engine.controller().take_ops(),
            vec![
                CacheOp::l1(L1Command::DVaWritebackInvalidate, 0x1000),
                CacheOp::l1(L1Command::DVaInvalidate, 0x1040),
                CacheOp::l1(L1Command::DVaWritebackInvalidate, 0x1080),
            ]
        );
    }

    #[test]
    fn invalidate_aligned_buffer_touches_no_boundary() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64));
        // SAFETY: mock controller.
        unsafe { engine.dma_invalidate_range(0x1000, 0x80) };
        assert_eq!(
            engine.controller().take_ops(),
            vec![
                CacheOp::l1(L1Command::DVaInvalidate, 0x1000),
                CacheOp::l1(L1Command::DVaInvalidate, 0x1040),
            ]
        );
    }

    #[test]
    fn invalidate_inside_one_line_flushes_that_line() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64));
        // SAFETY: mock controller.
        unsafe { engine.dma_invalidate_range(0x1008, 0x10) };
        assert_eq!(
            engine.controller().take_ops(),
            vec![CacheOp::l1(L1Command::DVaWritebackInvalidate, 0x1000)]
        );
    }

    #[repr(C, align(64))]
    struct Lines([u8; 192]);

    #[test]
    fn preserving_invalidate_restores_neighbour_bytes() {
        let mut mem = Lines([0xCC; 192]);
        let base = mem.0.as_mut_ptr() as usize;

        let mock = MockCache::new().with_dcache(64);
        // SAFETY: the clobber stays within `mem`, which outlives the engine.
        let mock = unsafe { mock.clobber_on_invalidate(0xEE) };
        let engine = CacheEngine::new(mock);

        // DMA buffer covers bytes 16..144: partial first line, full middle
        // line, partial last line.
        // SAFETY: `mem` is valid for reads and writes.
        unsafe { engine.dma_invalidate_range_preserving(base + 16, 128) };

        // CPU bytes outside the buffer survive the invalidations.
        assert!(mem.0[..16].iter().all(|&b| b == 0xCC));
        assert!(mem.0[144..].iter().all(|&b| b == 0xCC));
        // The fully owned middle line was really invalidated.
        assert!(mem.0[64..128].iter().all(|&b| b == 0xEE));

        let ops = engine.controller().take_ops();
        assert_eq!(
            ops,
            vec![
                CacheOp::l1(L1Command::DVaInvalidate, base),
                CacheOp::l1(L1Command::DVaInvalidate, base + 64),
                CacheOp::l1(L1Command::DVaInvalidate, base + 128),
            ]
        );
    }

    #[test]
    fn preserving_invalidate_within_one_line() {
        let mut mem = Lines([0x11; 192]);
        let base = mem.0.as_mut_ptr() as usize;
        // SAFETY: the clobber stays within `mem`.
        let mock = unsafe { MockCache::new().with_dcache(64).clobber_on_invalidate(0x00) };
        let engine = CacheEngine::new(mock);

        // SAFETY: `mem` is valid for reads and writes.
        unsafe { engine.dma_invalidate_range_preserving(base + 8, 16) };

        assert!(mem.0[..8].iter().all(|&b| b == 0x11));
        assert!(mem.0[8..24].iter().all(|&b| b == 0x00));
        assert!(mem.0[24..64].iter().all(|&b| b == 0x11));
    }
}
