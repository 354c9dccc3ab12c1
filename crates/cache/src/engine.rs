//! Cache maintenance engine: L1 CCTL per-line commands composed with L2.
//!
//! # Ordering rules
//!
//! | Operation           | Without L2        | With L2                                  |
//! |---------------------|-------------------|------------------------------------------|
//! | writeback range     | L1 WB             | L1 WB, then L2 WB                        |
//! | invalidate range    | L1 INVAL          | L2 INVAL, then L1 INVAL                  |
//! | flush range         | L1 WBINVAL        | L1 WB, L2 WBINVAL, L1 INVAL              |
//! | flush all           | L1 WBINVAL_ALL    | L1 WB_ALL, L2 WBINVAL_ALL, L1 INVAL_ALL  |
//!
//! Data has to leave L1 before an L2 writeback means anything, and L2 has to
//! be invalidated before L1 or a refill can pull the stale L2 line back in.
//!
//! Every public operation runs inside one `critical_section::with`. The L1
//! CCTL interface is a single address/command CSR pair, so an interrupt
//! handler issuing its own command between the two writes would retarget
//! ours.
//!
//! L2 commands take physical addresses. The targets this runs on map
//! memory 1:1, so virtual and physical addresses coincide.

use core::cell::Cell;

use critical_section::Mutex;

use crate::controller::CacheController;
use crate::csr::{L1Command, L2Command};
use crate::info::{CacheGeometry, CacheInfo, Features};
use crate::maintenance::RangeMaintenance;

/// Visit the start address of every `line`-sized block overlapping
/// `[addr, addr + size)`.
///
/// No-op when `size` or `line` is 0. `line` must be a power of two.
pub(crate) fn for_each_line(addr: usize, size: usize, line: usize, mut f: impl FnMut(usize)) {
    if size == 0 || line == 0 {
        return;
    }
    // Inclusive bound so a range ending at the top of the address space
    // does not overflow.
    let last_byte = addr.saturating_add(size.wrapping_sub(1));
    let mut cur = addr & !line.wrapping_sub(1);
    loop {
        f(cur);
        match cur.checked_add(line) {
            Some(next) if next <= last_byte => cur = next,
            _ => break,
        }
    }
}

/// Explicitly constructed cache context.
///
/// Owns the hardware controller and the lazily probed [`CacheInfo`]. Create
/// one at startup (it is `const`-constructible, so a `static` works) and pass
/// it by reference to everything that needs cache maintenance.
pub struct CacheEngine<C> {
    ctrl: C,
    info: Mutex<Cell<Option<CacheInfo>>>,
}

impl<C: CacheController> CacheEngine<C> {
    /// Wrap a controller. No registers are touched until first use.
    pub const fn new(ctrl: C) -> Self {
        Self {
            ctrl,
            info: Mutex::new(Cell::new(None)),
        }
    }

    /// The underlying controller.
    pub fn controller(&self) -> &C {
        &self.ctrl
    }

    /// Cache topology, probed on first call and cached afterwards.
    ///
    /// The check-and-set runs with interrupts masked, so concurrent first
    /// calls from task and interrupt context probe exactly once.
    pub fn info(&self) -> CacheInfo {
        critical_section::with(|cs| {
            let slot = self.info.borrow(cs);
            if let Some(info) = slot.get() {
                return info;
            }
            let info = CacheInfo::probe(&self.ctrl);
            slot.set(Some(info));
            debug!(
                "cache: line={} l2={} dma_coherent={}",
                info.line_size(),
                info.has_l2(),
                info.dma_coherent()
            );
            info
        })
    }

    /// CCTL and PMA capability bits. Read fresh on every call.
    pub fn features(&self) -> Features {
        Features::probe(&self.ctrl)
    }

    // ── L1 primitives ───────────────────────────────────────────────────────

    fn l1_line(&self, cmd: L1Command, addr: usize) {
        self.ctrl.set_l1_address(addr);
        self.ctrl.issue_l1(cmd);
    }

    fn l1_range(&self, cmd: L1Command, addr: usize, size: usize, line: usize) {
        for_each_line(addr, size, line, |a| self.l1_line(cmd, a));
    }

    // ── L2 primitives ───────────────────────────────────────────────────────

    fn l2_wait(&self) {
        while !self.ctrl.l2_status().is_done() {
            core::hint::spin_loop();
        }
    }

    fn l2_line(&self, cmd: L2Command, addr: usize) {
        self.ctrl.set_l2_address(addr);
        self.ctrl.issue_l2(cmd);
        self.l2_wait();
    }

    fn l2_range(&self, cmd: L2Command, addr: usize, size: usize, info: CacheInfo) {
        if !info.has_l2() {
            return;
        }
        for_each_line(addr, size, info.line_size(), |a| self.l2_line(cmd, a));
    }

    // ── Instruction cache ───────────────────────────────────────────────────

    /// Invalidate I-cache lines covering `[addr, addr + size)`.
    ///
    /// Needed after writing code to memory (loaders, patching).
    pub fn icache_invalidate_range(&self, addr: usize, size: usize) {
        let info = self.info();
        critical_section::with(|_| {
            self.l1_range(L1Command::IVaInvalidate, addr, size, info.line_size());
        });
    }

    /// Invalidate the whole I-cache.
    ///
    /// L1 CCTL has no I-cache "invalidate all", so this walks every set and
    /// way by index (`ways * sets * line` bytes of index space).
    pub fn icache_invalidate_all(&self) {
        let info = self.info();
        let line = info.line_size();
        if line == 0 {
            return;
        }
        let geometry = CacheGeometry::decode(self.ctrl.icache_config());
        let Some(span) = geometry.span(line) else {
            return;
        };
        critical_section::with(|_| {
            for_each_line(0, span, line, |index| {
                self.l1_line(L1Command::IIndexInvalidate, index);
            });
        });
    }

    // ── Data cache ──────────────────────────────────────────────────────────

    /// Write dirty D-cache lines covering `[addr, addr + size)` back to
    /// memory (L1 then L2).
    pub fn dcache_writeback_range(&self, addr: usize, size: usize) {
        let info = self.info();
        critical_section::with(|_| {
            self.l1_range(L1Command::DVaWriteback, addr, size, info.line_size());
            self.l2_range(L2Command::PaWriteback, addr, size, info);
        });
    }

    /// Discard D-cache lines covering `[addr, addr + size)` (L2 then L1).
    ///
    /// # Safety
    ///
    /// Whole lines are discarded without writeback. Dirty data in the partial
    /// lines at either end of an unaligned range is lost. Use
    /// [`dma_invalidate_range`](Self::dma_invalidate_range) for unaligned
    /// buffers.
    pub unsafe fn dcache_invalidate_range(&self, addr: usize, size: usize) {
        let info = self.info();
        critical_section::with(|_| {
            self.l2_range(L2Command::PaInvalidate, addr, size, info);
            self.l1_range(L1Command::DVaInvalidate, addr, size, info.line_size());
        });
    }

    /// Write back then invalidate D-cache lines covering `[addr, addr + size)`.
    pub fn dcache_flush_range(&self, addr: usize, size: usize) {
        let info = self.info();
        let line = info.line_size();
        critical_section::with(|_| {
            if info.has_l2() {
                self.l1_range(L1Command::DVaWriteback, addr, size, line);
                self.l2_range(L2Command::PaWritebackInvalidate, addr, size, info);
                self.l1_range(L1Command::DVaInvalidate, addr, size, line);
            } else {
                self.l1_range(L1Command::DVaWritebackInvalidate, addr, size, line);
            }
        });
    }

    /// Write back and invalidate the entire D-cache (and L2 if present).
    pub fn dcache_flush_all(&self) {
        // Probe outside the sequence: the probe stores to memory, and no store
        // may land between the L1 writeback and the L1 invalidate.
        let info = self.info();
        if !info.has_dcache() {
            return;
        }
        critical_section::with(|_| {
            if info.has_l2() {
                self.ctrl.issue_l1(L1Command::DWritebackAll);
                self.ctrl.issue_l2(L2Command::WritebackInvalidateAll);
                self.l2_wait();
                self.ctrl.issue_l1(L1Command::DInvalidateAll);
            } else {
                self.ctrl.issue_l1(L1Command::DWritebackInvalidateAll);
            }
        });
    }
}

impl<C: CacheController> RangeMaintenance for CacheEngine<C> {
    fn writeback_range(&self, addr: usize, size: usize) {
        self.dcache_writeback_range(addr, size);
    }

    unsafe fn invalidate_range(&self, addr: usize, size: usize) {
        // SAFETY: same contract as `RangeMaintenance::invalidate_range`.
        unsafe { self.dcache_invalidate_range(addr, size) }
    }

    fn flush_range(&self, addr: usize, size: usize) {
        self.dcache_flush_range(addr, size);
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)] // Tests index into recorded op logs of known length
mod tests {
    use super::*;
    use crate::mocks::{CacheOp, MockCache};

    fn lines(addr: usize, size: usize, line: usize) -> Vec<usize> {
        let mut v = Vec::new();
        for_each_line(addr, size, line, |a| v.push(a));
        v
    }

    #[test]
    fn for_each_line_covers_partial_lines() {
        assert_eq!(lines(0x1010, 0x40, 0x40), vec![0x1000, 0x1040]);
        assert_eq!(lines(0x1000, 0x40, 0x40), vec![0x1000]);
        assert_eq!(lines(0x103F, 2, 0x40), vec![0x1000, 0x1040]);
    }

    #[test]
    fn for_each_line_zero_size_or_line_is_noop() {
        assert!(lines(0x1000, 0, 64).is_empty());
        assert!(lines(0x1000, 64, 0).is_empty());
    }

    #[test]
    fn for_each_line_stops_at_top_of_address_space() {
        let top = usize::MAX & !63;
        assert_eq!(lines(top, 64, 64), vec![top]);
        assert_eq!(lines(top, 1000, 64), vec![top]);
    }

    #[test]
    fn info_is_probed_once() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64).with_l2());
        let first = engine.info();
        let reads = engine.controller().config_reads();
        for _ in 0..5 {
            assert_eq!(engine.info(), first);
        }
        assert_eq!(engine.controller().config_reads(), reads);
    }

    #[test]
    fn writeback_without_l2_issues_l1_only() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(32));
        engine.dcache_writeback_range(0x2000, 64);
        assert_eq!(
            engine.controller().take_ops(),
            vec![
                CacheOp::l1(L1Command::DVaWriteback, 0x2000),
                CacheOp::l1(L1Command::DVaWriteback, 0x2020),
            ]
        );
    }

    #[test]
    fn writeback_with_l2_goes_l1_then_l2() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64).with_l2());
        engine.dcache_writeback_range(0x2000, 64);
        assert_eq!(
            engine.controller().take_ops(),
            vec![
                CacheOp::l1(L1Command::DVaWriteback, 0x2000),
                CacheOp::l2(L2Command::PaWriteback, 0x2000),
            ]
        );
    }

    #[test]
    fn invalidate_with_l2_goes_l2_then_l1() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64).with_l2());
        // SAFETY: mock controller, no real memory is discarded.
        unsafe { engine.dcache_invalidate_range(0x2000, 64) };
        assert_eq!(
            engine.controller().take_ops(),
            vec![
                CacheOp::l2(L2Command::PaInvalidate, 0x2000),
                CacheOp::l1(L1Command::DVaInvalidate, 0x2000),
            ]
        );
    }

    #[test]
    fn flush_without_l2_uses_single_l1_command() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64));
        engine.dcache_flush_range(0x2000, 1);
        assert_eq!(
            engine.controller().take_ops(),
            vec![CacheOp::l1(L1Command::DVaWritebackInvalidate, 0x2000)]
        );
    }

    #[test]
    fn flush_with_l2_is_wb_l1_flush_l2_inval_l1() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64).with_l2());
        engine.dcache_flush_range(0x2000, 64);
        assert_eq!(
            engine.controller().take_ops(),
            vec![
                CacheOp::l1(L1Command::DVaWriteback, 0x2000),
                CacheOp::l2(L2Command::PaWritebackInvalidate, 0x2000),
                CacheOp::l1(L1Command::DVaInvalidate, 0x2000),
            ]
        );
    }

    #[test]
    fn l2_commands_wait_for_completion() {
        let engine = CacheEngine::new(
            MockCache::new()
                .with_dcache(64)
                .with_l2()
                .with_l2_latency(3),
        );
        engine.dcache_writeback_range(0x2000, 128);
        // Two lines, each polled until the mock reports idle.
        assert_eq!(engine.controller().status_polls(), 2 * 4);
    }

    #[test]
    fn flush_all_sequences() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64));
        engine.dcache_flush_all();
        assert_eq!(
            engine.controller().take_ops(),
            vec![CacheOp::l1_all(L1Command::DWritebackInvalidateAll)]
        );

        let engine = CacheEngine::new(MockCache::new().with_dcache(64).with_l2());
        engine.dcache_flush_all();
        assert_eq!(
            engine.controller().take_ops(),
            vec![
                CacheOp::l1_all(L1Command::DWritebackAll),
                CacheOp::l2_all(L2Command::WritebackInvalidateAll),
                CacheOp::l1_all(L1Command::DInvalidateAll),
            ]
        );
    }

    #[test]
    fn operations_without_dcache_are_noops() {
        let engine = CacheEngine::new(MockCache::new().with_l2());
        engine.dcache_writeback_range(0x2000, 256);
        engine.dcache_flush_range(0x2000, 256);
        // SAFETY: mock controller.
        unsafe { engine.dcache_invalidate_range(0x2000, 256) };
        engine.dcache_flush_all();
        engine.icache_invalidate_all();
        assert!(engine.controller().ops().is_empty());
    }

    #[test]
    fn zero_size_range_is_noop() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(64).with_l2());
        engine.dcache_writeback_range(0x2000, 0);
        engine.dcache_flush_range(0x2000, 0);
        engine.icache_invalidate_range(0x2000, 0);
        assert!(engine.controller().ops().is_empty());
    }

    #[test]
    fn icache_range_uses_va_invalidate() {
        let engine = CacheEngine::new(MockCache::new().with_dcache(32));
        engine.icache_invalidate_range(0x8000_0010, 0x20);
        assert_eq!(
            engine.controller().take_ops(),
            vec![
                CacheOp::l1(L1Command::IVaInvalidate, 0x8000_0000),
                CacheOp::l1(L1Command::IVaInvalidate, 0x8000_0020),
            ]
        );
    }

    #[test]
    fn icache_invalidate_all_walks_every_index() {
        // 64 sets (SET = 0), 2 ways (WAY = 1), 32-byte lines.
        let engine = CacheEngine::new(MockCache::new().with_dcache(32).with_icache(1 << 3));
        engine.icache_invalidate_all();
        let ops = engine.controller().take_ops();
        assert_eq!(ops.len(), 64 * 2);
        assert_eq!(ops[0], CacheOp::l1(L1Command::IIndexInvalidate, 0));
        assert_eq!(
            ops[ops.len() - 1],
            CacheOp::l1(L1Command::IIndexInvalidate, (64 * 2 - 1) * 32)
        );
    }

    #[test]
    fn engine_is_usable_through_range_maintenance() {
        fn publish<M: RangeMaintenance>(m: &M) {
            m.writeback_range(0x4000, 8);
        }
        let engine = CacheEngine::new(MockCache::new().with_dcache(64));
        publish(&engine);
        assert_eq!(
            engine.controller().take_ops(),
            vec![CacheOp::l1(L1Command::DVaWriteback, 0x4000)]
        );
    }
}
