//! Andes V5 hardware controllers: CCTL CSRs, AE350 L2C/SMU MMIO, PMA CSRs.
//!
//! Only compiled for `riscv32` / `riscv64` targets. CSR numbers come from
//! [`crate::csr`] as `const` operands, so every access is a single
//! `csrr`/`csrw` with the number baked into the instruction.

use core::ptr;

use crate::controller::CacheController;
use crate::csr::{
    L1Command, L2Command, L2Status, L2C_CCTLACC, L2C_CCTLCMD, L2C_CCTLSTATUS, MCACHE_CTL,
    MCCTLBEGINADDR, MCCTLCOMMAND, MDCM_CFG, MICM_CFG, MMSC_CFG, PMAADDR0, PMACFG0,
    SMU_SYSTEMCFG,
};
#[cfg(target_arch = "riscv32")]
use crate::csr::{cctlacc_words, L2C_CCTLACC_HI, MMSC_CFG2, MMSC_MSC_EXT};
use crate::pma::AttributeRegister;

/// AE350 system management unit base address.
pub const AE350_SMU_BASE: usize = 0xF010_0000;
/// AE350 L2 cache controller base address.
pub const AE350_L2C_BASE: usize = 0xE050_0000;

macro_rules! csr_read {
    ($csr:path) => {{
        let value: usize;
        // SAFETY: reading a machine-mode CSR has no side effects.
        unsafe {
            core::arch::asm!(
                "csrr {value}, {csr}",
                value = out(reg) value,
                csr = const $csr,
                options(nomem, nostack),
            );
        }
        value
    }};
}

macro_rules! csr_write {
    ($csr:path, $value:expr) => {{
        let value: usize = $value;
        // SAFETY: the CCTL and PMA CSRs only affect cache and attribute state;
        // callers sequence the writes.
        unsafe {
            core::arch::asm!(
                "csrw {csr}, {value}",
                csr = const $csr,
                value = in(reg) value,
                options(nostack),
            );
        }
    }};
}

/// L1 CCTL through CSRs plus the memory-mapped L2 controller.
#[derive(Debug)]
pub struct AndesCctl {
    smu_base: usize,
    l2c_base: usize,
}

impl AndesCctl {
    /// Controller for a board with the given SMU and L2C base addresses.
    ///
    /// # Safety
    ///
    /// Both addresses must point at the respective register blocks, and
    /// nothing else may drive the core-0 L2 CCTL registers.
    pub const unsafe fn new(smu_base: usize, l2c_base: usize) -> Self {
        Self { smu_base, l2c_base }
    }

    /// Controller for the AE350 memory map.
    ///
    /// # Safety
    ///
    /// See [`AndesCctl::new`].
    pub const unsafe fn ae350() -> Self {
        // SAFETY: forwarded caller contract.
        unsafe { Self::new(AE350_SMU_BASE, AE350_L2C_BASE) }
    }

    fn l2c(&self, offset: usize) -> usize {
        self.l2c_base.wrapping_add(offset)
    }
}

impl CacheController for AndesCctl {
    fn icache_config(&self) -> usize {
        csr_read!(MICM_CFG)
    }

    fn dcache_config(&self) -> usize {
        csr_read!(MDCM_CFG)
    }

    #[cfg(target_arch = "riscv32")]
    fn misc_config(&self) -> u64 {
        let low = csr_read!(MMSC_CFG) as u64;
        if low & MMSC_MSC_EXT == 0 {
            return low;
        }
        let high = csr_read!(MMSC_CFG2) as u64;
        low | (high << 32)
    }

    #[cfg(target_arch = "riscv64")]
    fn misc_config(&self) -> u64 {
        csr_read!(MMSC_CFG) as u64
    }

    fn cache_control(&self) -> usize {
        csr_read!(MCACHE_CTL)
    }

    fn system_config(&self) -> u32 {
        // SAFETY: `new` guarantees `smu_base` maps the SMU block.
        unsafe { ptr::read_volatile(self.smu_base.wrapping_add(SMU_SYSTEMCFG) as *const u32) }
    }

    fn set_l1_address(&self, addr: usize) {
        csr_write!(MCCTLBEGINADDR, addr);
    }

    fn issue_l1(&self, cmd: L1Command) {
        csr_write!(MCCTLCOMMAND, cmd.code());
    }

    #[cfg(target_arch = "riscv32")]
    fn set_l2_address(&self, addr: usize) {
        // CCTLACC is 64 bits wide; the high word must not keep a stale value.
        let (low, high) = cctlacc_words(addr as u64);
        // SAFETY: `new` guarantees `l2c_base` maps the L2C block.
        unsafe {
            ptr::write_volatile(self.l2c(L2C_CCTLACC) as *mut u32, low);
            ptr::write_volatile(self.l2c(L2C_CCTLACC_HI) as *mut u32, high);
        }
    }

    #[cfg(target_arch = "riscv64")]
    fn set_l2_address(&self, addr: usize) {
        // SAFETY: `new` guarantees `l2c_base` maps the L2C block.
        unsafe { ptr::write_volatile(self.l2c(L2C_CCTLACC) as *mut u64, addr as u64) }
    }

    fn issue_l2(&self, cmd: L2Command) {
        // Only the low word of the 64-bit command register is written.
        // SAFETY: `new` guarantees `l2c_base` maps the L2C block.
        unsafe { ptr::write_volatile(self.l2c(L2C_CCTLCMD) as *mut u32, cmd.code()) }
    }

    fn l2_status(&self) -> L2Status {
        // SAFETY: `new` guarantees `l2c_base` maps the L2C block.
        let raw = unsafe { ptr::read_volatile(self.l2c(L2C_CCTLSTATUS) as *const u32) };
        L2Status::from_register(raw)
    }
}

/// PMA entry 0 through `pmacfg0` / `pmaaddr0`.
#[derive(Debug)]
pub struct AndesPma {
    _private: (),
}

impl AndesPma {
    /// Take ownership of PMA entry 0.
    ///
    /// # Safety
    ///
    /// Nothing else may program PMA entry 0, and the core must implement
    /// programmable PMA (`mmsc_cfg.PPMA`).
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl AttributeRegister for AndesPma {
    fn pmacfg0(&self) -> usize {
        csr_read!(PMACFG0)
    }

    fn set_pmacfg0(&mut self, value: usize) {
        csr_write!(PMACFG0, value);
    }

    fn set_pmaaddr0(&mut self, value: usize) {
        csr_write!(PMAADDR0, value);
    }

    fn sync(&mut self) {
        // SAFETY: fences only order memory and instruction fetch.
        unsafe { core::arch::asm!("fence.i", "fence rw, rw", options(nostack)) };
    }
}
