//! Mock cache controller and PMA registers for host tests.
//!
//! [`MockCache`] records every L1/L2 command, with its address operand, in
//! issue order so tests can assert both the commands and their sequencing.
//! [`MockAttributes`] does the same for PMA register writes.
//!
//! Available under `cfg(test)` and with the `std` feature (for downstream
//! crates' tests).

use core::cell::{Cell, RefCell};
use std::vec::Vec;

use crate::controller::CacheController;
use crate::csr::{
    L1Command, L2Command, L2Status, MCACHE_CTL_DC_COHEN, MCACHE_CTL_DC_COHSTA, MMSC_CCTLCSR,
    MMSC_IOCP, MMSC_PPMA, SYSTEMCFG_L2C,
};
use crate::info::decode_line_size;
use crate::pma::AttributeRegister;

/// One recorded cache command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    /// L1 CCTL command, with the `mcctlbeginaddr` operand if it takes one.
    L1 {
        /// Command issued.
        cmd: L1Command,
        /// Address operand.
        addr: Option<usize>,
    },
    /// L2 CCTL command, with the CCTLACC operand if it takes one.
    L2 {
        /// Command issued.
        cmd: L2Command,
        /// Address operand.
        addr: Option<usize>,
    },
}

impl CacheOp {
    /// Per-line L1 command at `addr`.
    pub const fn l1(cmd: L1Command, addr: usize) -> Self {
        Self::L1 {
            cmd,
            addr: Some(addr),
        }
    }

    /// Whole-cache L1 command.
    pub const fn l1_all(cmd: L1Command) -> Self {
        Self::L1 { cmd, addr: None }
    }

    /// Per-line L2 command at `addr`.
    pub const fn l2(cmd: L2Command, addr: usize) -> Self {
        Self::L2 {
            cmd,
            addr: Some(addr),
        }
    }

    /// Whole-cache L2 command.
    pub const fn l2_all(cmd: L2Command) -> Self {
        Self::L2 { cmd, addr: None }
    }

    /// Address operand, if any.
    pub const fn addr(&self) -> Option<usize> {
        match self {
            Self::L1 { addr, .. } | Self::L2 { addr, .. } => *addr,
        }
    }
}

/// A simulated Andes cache controller.
///
/// Defaults to a core with no D-cache, no L2, no CCTL and no PMA. Use the
/// `with_*` builders to describe the CPU under test.
#[derive(Debug, Default)]
pub struct MockCache {
    icache_cfg: usize,
    dcache_cfg: usize,
    misc: u64,
    cache_ctl: usize,
    system: u32,
    l2_latency: usize,
    clobber: Option<u8>,

    l1_addr: Cell<usize>,
    l2_addr: Cell<usize>,
    l2_pending: Cell<usize>,
    status_polls: Cell<usize>,
    config_reads: Cell<usize>,
    ops: RefCell<Vec<CacheOp>>,
}

impl MockCache {
    /// A core without caches or CCTL support.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give the core a D-cache with `line` byte lines (8..=128, power of two).
    #[must_use]
    pub fn with_dcache(mut self, line: usize) -> Self {
        let field = (line.trailing_zeros() as usize).saturating_sub(2);
        self.dcache_cfg = (self.dcache_cfg & !0x1C0) | ((field & 0x7) << 6);
        self
    }

    /// Set the raw `micm_cfg` value.
    #[must_use]
    pub fn with_icache(mut self, micm_cfg: usize) -> Self {
        self.icache_cfg = micm_cfg;
        self
    }

    /// Report an L2 cache controller in SMU SYSTEMCFG.
    #[must_use]
    pub fn with_l2(mut self) -> Self {
        self.system |= SYSTEMCFG_L2C;
        self
    }

    /// Report CCTL CSR support in `mmsc_cfg`.
    #[must_use]
    pub fn with_cctl(mut self) -> Self {
        self.misc |= MMSC_CCTLCSR;
        self
    }

    /// Report programmable PMA support in `mmsc_cfg`.
    #[must_use]
    pub fn with_pma(mut self) -> Self {
        self.misc |= MMSC_PPMA;
        self
    }

    /// Enable and report hardware DMA coherency with an I/O coherence port.
    #[must_use]
    pub fn with_dma_coherency(mut self) -> Self {
        self.cache_ctl |= MCACHE_CTL_DC_COHEN | MCACHE_CTL_DC_COHSTA;
        self.misc |= MMSC_IOCP;
        self
    }

    /// Set the raw `mcache_ctl` value.
    #[must_use]
    pub fn with_cache_control(mut self, value: usize) -> Self {
        self.cache_ctl = value;
        self
    }

    /// OR extra bits into the 64-bit `mmsc_cfg` view.
    #[must_use]
    pub fn with_misc_config(mut self, bits: u64) -> Self {
        self.misc |= bits;
        self
    }

    /// Report `Running` for `polls` status reads after every L2 command.
    #[must_use]
    pub fn with_l2_latency(mut self, polls: usize) -> Self {
        self.l2_latency = polls;
        self
    }

    /// Overwrite the whole line with `fill` on every L1 VA invalidate,
    /// simulating dirty cached bytes being discarded in favour of stale
    /// memory contents.
    ///
    /// # Safety
    ///
    /// Every address later passed to an L1 VA invalidate must lie in a live,
    /// writable allocation that covers the whole line around it.
    #[must_use]
    pub unsafe fn clobber_on_invalidate(mut self, fill: u8) -> Self {
        self.clobber = Some(fill);
        self
    }

    /// Commands recorded so far.
    pub fn ops(&self) -> Vec<CacheOp> {
        self.ops.borrow().clone()
    }

    /// Commands recorded so far, clearing the log.
    pub fn take_ops(&self) -> Vec<CacheOp> {
        core::mem::take(&mut *self.ops.borrow_mut())
    }

    /// Number of L2 status reads.
    pub fn status_polls(&self) -> usize {
        self.status_polls.get()
    }

    /// Number of configuration register reads.
    pub fn config_reads(&self) -> usize {
        self.config_reads.get()
    }

    fn count_config_read(&self) {
        self.config_reads
            .set(self.config_reads.get().saturating_add(1));
    }

    fn line_size(&self) -> usize {
        decode_line_size(self.dcache_cfg)
    }

    fn clobber_line(&self, addr: usize) {
        let (Some(fill), line) = (self.clobber, self.line_size()) else {
            return;
        };
        if line == 0 {
            return;
        }
        let start = addr & !line.wrapping_sub(1);
        // SAFETY: `clobber_on_invalidate` requires the whole line to be
        // writable.
        unsafe { core::ptr::write_bytes(start as *mut u8, fill, line) };
    }
}

impl CacheController for MockCache {
    fn icache_config(&self) -> usize {
        self.count_config_read();
        self.icache_cfg
    }

    fn dcache_config(&self) -> usize {
        self.count_config_read();
        self.dcache_cfg
    }

    fn misc_config(&self) -> u64 {
        self.count_config_read();
        self.misc
    }

    fn cache_control(&self) -> usize {
        self.count_config_read();
        self.cache_ctl
    }

    fn system_config(&self) -> u32 {
        self.count_config_read();
        self.system
    }

    fn set_l1_address(&self, addr: usize) {
        self.l1_addr.set(addr);
    }

    fn issue_l1(&self, cmd: L1Command) {
        let addr = cmd.takes_address().then_some(self.l1_addr.get());
        if let (L1Command::DVaInvalidate, Some(a)) = (cmd, addr) {
            self.clobber_line(a);
        }
        self.ops.borrow_mut().push(CacheOp::L1 { cmd, addr });
    }

    fn set_l2_address(&self, addr: usize) {
        self.l2_addr.set(addr);
    }

    fn issue_l2(&self, cmd: L2Command) {
        let addr = cmd.takes_address().then_some(self.l2_addr.get());
        self.ops.borrow_mut().push(CacheOp::L2 { cmd, addr });
        self.l2_pending.set(self.l2_latency);
    }

    fn l2_status(&self) -> L2Status {
        self.status_polls
            .set(self.status_polls.get().saturating_add(1));
        let pending = self.l2_pending.get();
        if pending == 0 {
            L2Status::Idle
        } else {
            self.l2_pending.set(pending.saturating_sub(1));
            L2Status::Running
        }
    }
}

/// One recorded PMA register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrWrite {
    /// `pmacfg0` write.
    PmaCfg0(usize),
    /// `pmaaddr0` write.
    PmaAddr0(usize),
    /// Synchronisation fence.
    Sync,
}

/// Simulated PMA registers that record writes in order.
#[derive(Debug, Default)]
pub struct MockAttributes {
    pmacfg0: usize,
    pmaaddr0: usize,
    writes: Vec<AttrWrite>,
}

impl MockAttributes {
    /// All entries off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `pmacfg0` holding `value` (other entries already in use).
    pub fn with_pmacfg0(value: usize) -> Self {
        Self {
            pmacfg0: value,
            ..Self::default()
        }
    }

    /// Writes recorded so far.
    pub fn writes(&self) -> &[AttrWrite] {
        &self.writes
    }

    /// Current `pmaaddr0`.
    pub fn pmaaddr0(&self) -> usize {
        self.pmaaddr0
    }
}

impl AttributeRegister for MockAttributes {
    fn pmacfg0(&self) -> usize {
        self.pmacfg0
    }

    fn set_pmacfg0(&mut self, value: usize) {
        self.pmacfg0 = value;
        self.writes.push(AttrWrite::PmaCfg0(value));
    }

    fn set_pmaaddr0(&mut self, value: usize) {
        self.pmaaddr0 = value;
        self.writes.push(AttrWrite::PmaAddr0(value));
    }

    fn sync(&mut self) {
        self.writes.push(AttrWrite::Sync);
    }
}
