//! Andes V5 cache-related CSR numbers, bit fields and CCTL command codes.
//!
//! # References
//!
//! - Andes AndeStar V5 System Privilege Architecture: `mcache_ctl`,
//!   `mcctlbeginaddr`, `mcctlcommand`, `micm_cfg`, `mdcm_cfg`, `mmsc_cfg`
//! - Andes AE350 Platform: L2 cache controller (L2C) and SMU register maps
//!
//! # Configuration register layout (`micm_cfg` / `mdcm_cfg`)
//!
//! ```text
//! [2:0]  SET   log2(sets) - 6   (0..=6 valid, 7 reserved)
//! [5:3]  WAY   ways - 1
//! [8:6]  SIZE  0 = no cache, 1..=5 → line = 1 << (SIZE + 2), 6/7 reserved
//! ```

// ── CSR numbers ─────────────────────────────────────────────────────────────

/// Cache control: L1 enables and DMA coherency enables.
pub const MCACHE_CTL: usize = 0x7CA;
/// Address operand for VA-based L1 CCTL commands.
pub const MCCTLBEGINADDR: usize = 0x7CB;
/// L1 CCTL command register.
pub const MCCTLCOMMAND: usize = 0x7CC;
/// Instruction cache configuration (read-only).
pub const MICM_CFG: usize = 0xFC0;
/// Data cache configuration (read-only).
pub const MDCM_CFG: usize = 0xFC1;
/// Miscellaneous configuration (read-only).
pub const MMSC_CFG: usize = 0xFC2;
/// Upper half of `mmsc_cfg` on RV32 cores (read-only).
pub const MMSC_CFG2: usize = 0xFC3;
/// PMA configuration register 0 (entries 0..=3 on RV32, 0..=7 on RV64).
pub const PMACFG0: usize = 0xBC0;
/// PMA address register for entry 0.
pub const PMAADDR0: usize = 0xBD0;

// ── Cache configuration fields ──────────────────────────────────────────────

/// `*_CFG` SET field mask.
pub const CFG_SET_MASK: usize = 0x7;
/// `*_CFG` WAY field mask.
pub const CFG_WAY_MASK: usize = 0x38;
/// `*_CFG` WAY field shift.
pub const CFG_WAY_SHIFT: u32 = 3;
/// `*_CFG` SIZE (line size) field mask.
pub const CFG_SIZE_MASK: usize = 0x1C0;
/// `*_CFG` SIZE field shift.
pub const CFG_SIZE_SHIFT: u32 = 6;

// ── mmsc_cfg feature bits ───────────────────────────────────────────────────

/// CCTL CSRs (`mcctlbeginaddr` / `mcctlcommand`) are implemented.
pub const MMSC_CCTLCSR: u64 = 1 << 16;
/// Programmable PMA is implemented.
pub const MMSC_PPMA: u64 = 1 << 30;
/// RV32 only: `mmsc_cfg2` is implemented and holds the upper feature bits.
pub const MMSC_MSC_EXT: u64 = 1 << 31;
/// I/O coherence port present. Bit 15 of `mmsc_cfg2` (RV32) or bit 47 of
/// `mmsc_cfg` (RV64); both land here once spliced into a 64-bit view.
pub const MMSC_IOCP: u64 = 0x8000 << 32;

// ── mcache_ctl ──────────────────────────────────────────────────────────────

/// D-cache coherency enable for DMA masters.
pub const MCACHE_CTL_DC_COHEN: usize = 1 << 19;
/// DMA coherency state (read-only, set when coherency is active).
pub const MCACHE_CTL_DC_COHSTA: usize = 1 << 20;

// ── SMU ─────────────────────────────────────────────────────────────────────

/// SMU SYSTEMCFG register offset.
pub const SMU_SYSTEMCFG: usize = 0x08;
/// SYSTEMCFG: L2 cache controller is present.
pub const SYSTEMCFG_L2C: u32 = 1 << 8;

// ── L2 cache controller (AE350 layout) ──────────────────────────────────────

/// Core-0 CCTL command register offset in the L2C block.
pub const L2C_CCTLCMD: usize = 0x40;
/// Core-0 CCTL access-line (address operand) register offset.
pub const L2C_CCTLACC: usize = 0x48;
/// High word of CCTLACC, written separately on RV32.
pub const L2C_CCTLACC_HI: usize = 0x4C;
/// Split a CCTLACC value into the (low, high) words an RV32 core writes.
#[allow(clippy::cast_possible_truncation)] // each half is taken as 32 bits
pub const fn cctlacc_words(addr: u64) -> (u32, u32) {
    (addr as u32, (addr >> 32) as u32)
}

/// CCTL status register offset.
pub const L2C_CCTLSTATUS: usize = 0x80;
/// Core-0 field of the CCTL status register.
pub const L2C_STATUS_MASK: u32 = 0xF;

/// L1 CCTL command codes written to `mcctlcommand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum L1Command {
    /// Invalidate the D-cache line holding `mcctlbeginaddr`.
    DVaInvalidate = 0,
    /// Write back the D-cache line holding `mcctlbeginaddr`.
    DVaWriteback = 1,
    /// Write back then invalidate the D-cache line holding `mcctlbeginaddr`.
    DVaWritebackInvalidate = 2,
    /// Write back and invalidate the whole D-cache.
    DWritebackInvalidateAll = 6,
    /// Write back the whole D-cache.
    DWritebackAll = 7,
    /// Invalidate the I-cache line holding `mcctlbeginaddr`.
    IVaInvalidate = 8,
    /// Invalidate the whole D-cache without writeback.
    DInvalidateAll = 23,
    /// Invalidate one I-cache line by set/way index.
    IIndexInvalidate = 24,
}

impl L1Command {
    /// Raw command code.
    pub const fn code(self) -> usize {
        self as usize
    }

    /// Whether the command takes an address operand in `mcctlbeginaddr`.
    pub const fn takes_address(self) -> bool {
        !matches!(
            self,
            Self::DWritebackInvalidateAll | Self::DWritebackAll | Self::DInvalidateAll
        )
    }
}

/// L2 CCTL command codes written to the L2C command register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum L2Command {
    /// Invalidate the line holding the physical address in CCTLACC.
    PaInvalidate = 0x08,
    /// Write back the line holding the physical address in CCTLACC.
    PaWriteback = 0x09,
    /// Write back and invalidate the line holding the physical address.
    PaWritebackInvalidate = 0x0A,
    /// Write back and invalidate the whole L2.
    WritebackInvalidateAll = 0x12,
}

impl L2Command {
    /// Raw command code.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Whether the command takes an address operand in CCTLACC.
    pub const fn takes_address(self) -> bool {
        !matches!(self, Self::WritebackInvalidateAll)
    }
}

/// Core-0 L2 CCTL status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum L2Status {
    /// No command in flight.
    Idle,
    /// A command is still executing.
    Running,
    /// The last command was rejected.
    Illegal,
    /// Any other field value.
    Unknown(u8),
}

impl L2Status {
    /// Decode the core-0 field of the CCTL status register.
    // Masked to 4 bits before narrowing.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_register(raw: u32) -> Self {
        match raw & L2C_STATUS_MASK {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Illegal,
            other => Self::Unknown(other as u8),
        }
    }

    /// Whether the controller is done with the last command.
    pub const fn is_done(self) -> bool {
        !matches!(self, Self::Running)
    }
}
