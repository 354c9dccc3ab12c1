//! Hardware seam between cache maintenance logic and the CSR/MMIO layer.
//!
//! [`CacheEngine`](crate::CacheEngine) only ever talks to the cache through
//! this trait. On target it is implemented by
//! [`hw::AndesCctl`](crate::hw), on the host by
//! [`mocks::MockCache`](crate::mocks::MockCache), which records every command
//! so tests can assert exact sequences.

use crate::csr::{L1Command, L2Command, L2Status};

/// Register-level access to the L1 CCTL CSRs and the L2 cache controller.
///
/// Every method maps to exactly one CSR or MMIO access. Sequencing (operand
/// before command, polling after L2 commands, interrupt masking) is the
/// caller's job.
pub trait CacheController {
    /// Raw `micm_cfg`.
    fn icache_config(&self) -> usize;

    /// Raw `mdcm_cfg`.
    fn dcache_config(&self) -> usize;

    /// `mmsc_cfg` as a 64-bit view.
    ///
    /// RV32 implementations splice `mmsc_cfg2` into the upper half when
    /// `MSC_EXT` is set, so feature tests are width-independent.
    fn misc_config(&self) -> u64;

    /// Raw `mcache_ctl`.
    fn cache_control(&self) -> usize;

    /// Raw SMU SYSTEMCFG.
    fn system_config(&self) -> u32;

    /// Write the L1 address operand (`mcctlbeginaddr`).
    fn set_l1_address(&self, addr: usize);

    /// Issue an L1 command (`mcctlcommand`).
    fn issue_l1(&self, cmd: L1Command);

    /// Write the L2 address operand (core-0 CCTLACC).
    fn set_l2_address(&self, addr: usize);

    /// Issue an L2 command (core-0 CCTLCMD).
    fn issue_l2(&self, cmd: L2Command);

    /// Read the core-0 L2 CCTL status.
    fn l2_status(&self) -> L2Status;
}

impl<T: CacheController + ?Sized> CacheController for &T {
    fn icache_config(&self) -> usize {
        (**self).icache_config()
    }

    fn dcache_config(&self) -> usize {
        (**self).dcache_config()
    }

    fn misc_config(&self) -> u64 {
        (**self).misc_config()
    }

    fn cache_control(&self) -> usize {
        (**self).cache_control()
    }

    fn system_config(&self) -> u32 {
        (**self).system_config()
    }

    fn set_l1_address(&self, addr: usize) {
        (**self).set_l1_address(addr);
    }

    fn issue_l1(&self, cmd: L1Command) {
        (**self).issue_l1(cmd);
    }

    fn set_l2_address(&self, addr: usize) {
        (**self).set_l2_address(addr);
    }

    fn issue_l2(&self, cmd: L2Command) {
        (**self).issue_l2(cmd);
    }

    fn l2_status(&self) -> L2Status {
        (**self).l2_status()
    }
}
