//! Range maintenance seam used by shared-memory consumers.
//!
//! The transfer rings only need three operations on byte ranges. Expressing
//! them as a trait lets the ring code run unchanged against real hardware, a
//! recording mock, or [`NoMaintenance`] when the shared region is uncached.

/// Data-cache maintenance over a byte range.
///
/// Ranges are expanded to whole cache lines by the implementation. A
/// zero-length range is a no-op.
pub trait RangeMaintenance {
    /// Write dirty lines covering `[addr, addr + size)` back to memory.
    fn writeback_range(&self, addr: usize, size: usize);

    /// Discard cached copies of `[addr, addr + size)` without writeback.
    ///
    /// # Safety
    ///
    /// Whole lines are discarded. Any dirty bytes sharing a line with the
    /// range but lying outside it are lost. The caller must guarantee the
    /// range is line-aligned or that neighbouring bytes hold nothing dirty.
    unsafe fn invalidate_range(&self, addr: usize, size: usize);

    /// Write back then invalidate `[addr, addr + size)`.
    fn flush_range(&self, addr: usize, size: usize);
}

impl<T: RangeMaintenance + ?Sized> RangeMaintenance for &T {
    fn writeback_range(&self, addr: usize, size: usize) {
        (**self).writeback_range(addr, size);
    }

    unsafe fn invalidate_range(&self, addr: usize, size: usize) {
        // SAFETY: forwarded contract, upheld by our caller.
        unsafe { (**self).invalidate_range(addr, size) }
    }

    fn flush_range(&self, addr: usize, size: usize) {
        (**self).flush_range(addr, size);
    }
}

/// Maintenance for memory that is not cached (PMA non-cacheable, or no
/// D-cache at all). Every operation does nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoMaintenance;

impl RangeMaintenance for NoMaintenance {
    fn writeback_range(&self, _addr: usize, _size: usize) {}

    unsafe fn invalidate_range(&self, _addr: usize, _size: usize) {}

    fn flush_range(&self, _addr: usize, _size: usize) {}
}
