//! Cache topology decoded from the configuration CSRs.
//!
//! [`CacheInfo::probe`] reads the registers once; the result is stored by
//! [`CacheEngine`](crate::CacheEngine) and never changes afterwards. Missing
//! features are never an error: no D-cache is a line size of 0, no L2 is
//! `has_l2 == false`.

use crate::controller::CacheController;
use crate::csr::{
    CFG_SET_MASK, CFG_SIZE_MASK, CFG_SIZE_SHIFT, CFG_WAY_MASK, CFG_WAY_SHIFT,
    MCACHE_CTL_DC_COHEN, MCACHE_CTL_DC_COHSTA, MMSC_CCTLCSR, MMSC_IOCP, MMSC_PPMA, SYSTEMCFG_L2C,
};

/// Data-cache topology relevant to maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CacheInfo {
    line_size: usize,
    has_l2: bool,
    dma_coherent: bool,
}

impl CacheInfo {
    /// Build a descriptor from already-decoded values.
    pub const fn new(line_size: usize, has_l2: bool, dma_coherent: bool) -> Self {
        Self {
            line_size,
            has_l2,
            dma_coherent,
        }
    }

    /// Read the configuration registers through `ctrl`.
    ///
    /// DMA is coherent only when coherency is enabled, reported active, and
    /// the I/O coherence port exists.
    pub fn probe<C: CacheController + ?Sized>(ctrl: &C) -> Self {
        let line_size = decode_line_size(ctrl.dcache_config());
        let has_l2 = ctrl.system_config() & SYSTEMCFG_L2C != 0;

        let mcache_ctl = ctrl.cache_control();
        let coherency_on = mcache_ctl & MCACHE_CTL_DC_COHEN != 0
            && mcache_ctl & MCACHE_CTL_DC_COHSTA != 0;
        let dma_coherent = coherency_on && ctrl.misc_config() & MMSC_IOCP != 0;

        Self::new(line_size, has_l2, dma_coherent)
    }

    /// D-cache line size in bytes, 0 if there is no D-cache.
    pub const fn line_size(&self) -> usize {
        self.line_size
    }

    /// Whether a D-cache is present.
    pub const fn has_dcache(&self) -> bool {
        self.line_size != 0
    }

    /// Whether an L2 cache controller is present.
    pub const fn has_l2(&self) -> bool {
        self.has_l2
    }

    /// Whether DMA masters snoop the D-cache.
    pub const fn dma_coherent(&self) -> bool {
        self.dma_coherent
    }
}

/// Decode the SIZE field of `micm_cfg` / `mdcm_cfg` into a line size.
///
/// Field values 1..=5 give 8..=128 bytes; anything else means no cache.
#[allow(clippy::arithmetic_side_effects)] // Safety: field <= 5, shift <= 7
pub const fn decode_line_size(cfg: usize) -> usize {
    let field = (cfg & CFG_SIZE_MASK) >> CFG_SIZE_SHIFT;
    if field >= 1 && field <= 5 {
        1 << (field + 2)
    } else {
        0
    }
}

/// Set/way geometry of an L1 cache, used for index-based whole-cache walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CacheGeometry {
    /// Number of sets, 0 for a reserved encoding.
    pub sets: usize,
    /// Number of ways.
    pub ways: usize,
}

impl CacheGeometry {
    /// Decode the SET and WAY fields of `micm_cfg` / `mdcm_cfg`.
    #[allow(clippy::arithmetic_side_effects)] // Safety: 3-bit fields, shift <= 12, ways <= 8
    pub const fn decode(cfg: usize) -> Self {
        let set_field = cfg & CFG_SET_MASK;
        let sets = if set_field < 7 { 1 << (set_field + 6) } else { 0 };
        let ways = ((cfg & CFG_WAY_MASK) >> CFG_WAY_SHIFT) + 1;
        Self { sets, ways }
    }

    /// Bytes spanned by an index walk with the given line size.
    pub const fn span(&self, line_size: usize) -> Option<usize> {
        match self.sets.checked_mul(self.ways) {
            Some(lines) => lines.checked_mul(line_size),
            None => None,
        }
    }
}

/// CPU features that decide the coherency strategy of a shared region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Features {
    /// `mcctlbeginaddr` / `mcctlcommand` are implemented.
    pub cctl: bool,
    /// Programmable PMA entries are implemented.
    pub pma: bool,
}

impl Features {
    /// Read the feature bits of `mmsc_cfg` through `ctrl`.
    pub fn probe<C: CacheController + ?Sized>(ctrl: &C) -> Self {
        let misc = ctrl.misc_config();
        Self {
            cctl: misc & MMSC_CCTLCSR != 0,
            pma: misc & MMSC_PPMA != 0,
        }
    }
}
