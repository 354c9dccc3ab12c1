//! PMA (Physical Memory Attribute) configuration for Andes V5 cores
//!
//! # Purpose
//!
//! Memory shared with an agent outside the cache domain (a debugger reading
//! trace buffers over JTAG, a DMA master without a coherence port) is
//! silently corrupted by the D-cache unless either:
//!   (a) a PMA entry marks the region non-cacheable, OR
//!   (b) software issues CCTL maintenance around every access.
//!
//! (a) is cheaper at run time: once the region is non-cacheable no
//! maintenance is needed at all. The region has to satisfy the NAPOT
//! encoding rules though, otherwise the caller falls back to (b).
//!
//! # References
//!
//! - Andes AndeStar V5 SPA: Programmable PMA, `pmacfg0..3`, `pmaaddr0..15`
//!
//! # NAPOT Region Requirements
//!
//! - Minimum region size: **4 KiB**
//! - Size must be a **power of 2**
//! - Base address must be **aligned to the region size**
//! - `pmaaddr` encoding: `(base >> 2) | (((size - 1) >> 1) >> 2)`
//!   - 4 KiB  at 0x0001_0000 → 0x0000_41FF
//!   - 16 KiB at 0x0002_0000 → 0x0000_87FF
//!
//! # Entry Configuration Byte (`pmacfg`, one byte per entry)
//!
//! ```text
//! [6]    NAMO  1 = no atomic memory operations
//! [5:2]  MTYP  memory type (1 device, 3 non-cacheable, 11 cacheable WB)
//! [1:0]  ETYP  0 off, 1 TOR, 3 NAPOT
//! ```
//!
//! Non-cacheable NAPOT with AMOs allowed: **0x0F**.

use thiserror_no_std::Error;

/// Smallest NAPOT region the PMA unit supports.
pub const PMA_NAPOT_MIN_SIZE: usize = 0x1000;

/// PMA region validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PmaError {
    /// Region size is zero.
    #[error("PMA region size is zero")]
    SizeZero,
    /// Region size is not a power of two (NAPOT requirement).
    #[error("PMA region size is not a power of two")]
    SizeNotPowerOfTwo,
    /// Region size is below the 4 KiB NAPOT floor.
    #[error("PMA region size is below 4 KiB")]
    SizeTooSmall,
    /// Base address is not aligned to the region size.
    #[error("PMA region base is not aligned to its size")]
    AddressMisaligned,
}

/// Memory type field of a PMA entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PmaMemoryType {
    /// Device memory, non-bufferable.
    Device,
    /// Normal memory, non-cacheable, bufferable.
    NonCacheable,
    /// Normal memory, write-back, read and write allocate.
    Cacheable,
}

impl PmaMemoryType {
    /// MTYP field value, already shifted into bits [5:2].
    pub const fn bits(self) -> u8 {
        match self {
            Self::Device => 1 << 2,
            Self::NonCacheable => 3 << 2,
            Self::Cacheable => 11 << 2,
        }
    }
}

/// Address-matching mode of a PMA entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PmaEntryType {
    /// Entry disabled.
    Off,
    /// Top-of-range: matches `[previous pmaaddr, this pmaaddr)`.
    Tor,
    /// Naturally aligned power-of-two region.
    Napot,
}

impl PmaEntryType {
    /// ETYP field value, bits [1:0].
    pub const fn bits(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Tor => 1,
            Self::Napot => 3,
        }
    }
}

/// Build one `pmacfg` entry byte.
pub const fn entry_config(etyp: PmaEntryType, mtyp: PmaMemoryType, no_amo: bool) -> u8 {
    let namo = if no_amo { 1 << 6 } else { 0 };
    namo | mtyp.bits() | etyp.bits()
}

/// Entry byte for a non-cacheable NAPOT region with AMOs allowed (`0x0F`).
pub const NON_CACHEABLE_NAPOT: u8 =
    entry_config(PmaEntryType::Napot, PmaMemoryType::NonCacheable, false);

/// A validated NAPOT PMA region.
///
/// Construction via [`PmaRegion::napot`] enforces the size and alignment
/// rules so callers cannot program an encoding the hardware would decode as
/// a different region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PmaRegion {
    base: usize,
    size: usize,
}

impl PmaRegion {
    /// Validate a NAPOT region.
    ///
    /// # Errors
    ///
    /// - [`PmaError::SizeZero`] if `size == 0`
    /// - [`PmaError::SizeTooSmall`] if `size < 4096`
    /// - [`PmaError::SizeNotPowerOfTwo`] if `size` is not a power of two
    /// - [`PmaError::AddressMisaligned`] if `base % size != 0`
    pub fn napot(base: usize, size: usize) -> Result<Self, PmaError> {
        if size == 0 {
            return Err(PmaError::SizeZero);
        }
        if size < PMA_NAPOT_MIN_SIZE {
            return Err(PmaError::SizeTooSmall);
        }
        if !size.is_power_of_two() {
            return Err(PmaError::SizeNotPowerOfTwo);
        }
        // size is a non-zero power of two here
        if base & size.wrapping_sub(1) != 0 {
            return Err(PmaError::AddressMisaligned);
        }
        Ok(Self { base, size })
    }

    /// Base address of this region.
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Size of this region in bytes.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Value for `pmaaddr`: the base in 4-byte units with the low
    /// `log2(size) - 3` bits set to encode the size.
    pub const fn napot_address(&self) -> usize {
        // size >= 4096, so size - 1 cannot wrap
        (self.base >> 2) | ((self.size.wrapping_sub(1) >> 1) >> 2)
    }
}

/// Register-level access to PMA entry 0.
pub trait AttributeRegister {
    /// Read `pmacfg0`.
    fn pmacfg0(&self) -> usize;

    /// Write `pmacfg0`.
    fn set_pmacfg0(&mut self, value: usize);

    /// Write `pmaaddr0`.
    fn set_pmaaddr0(&mut self, value: usize);

    /// Make new attributes visible to subsequent fetches and accesses.
    fn sync(&mut self) {}
}

impl<T: AttributeRegister + ?Sized> AttributeRegister for &mut T {
    fn pmacfg0(&self) -> usize {
        (**self).pmacfg0()
    }

    fn set_pmacfg0(&mut self, value: usize) {
        (**self).set_pmacfg0(value);
    }

    fn set_pmaaddr0(&mut self, value: usize) {
        (**self).set_pmaaddr0(value);
    }

    fn sync(&mut self) {
        (**self).sync();
    }
}

/// Program PMA entry 0 as `config` over `region`.
///
/// Writes the address first, then replaces only the low byte of `pmacfg0`
/// so entries 1.. keep their configuration.
pub fn program_entry0<A: AttributeRegister + ?Sized>(regs: &mut A, region: &PmaRegion, config: u8) {
    regs.set_pmaaddr0(region.napot_address());
    let cfg = (regs.pmacfg0() & !0xFF) | usize::from(config);
    regs.set_pmacfg0(cfg);
    regs.sync();
}

/// Program PMA entry 0 to make `region` non-cacheable.
pub fn make_non_cacheable<A: AttributeRegister + ?Sized>(regs: &mut A, region: &PmaRegion) {
    program_entry0(regs, region, NON_CACHEABLE_NAPOT);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::{AttrWrite, MockAttributes};

    #[test]
    fn test_region_size_must_be_power_of_two() {
        assert!(PmaRegion::napot(0x0001_0000, 0x4000).is_ok());
        assert_eq!(
            PmaRegion::napot(0x0001_0000, 0x3000),
            Err(PmaError::SizeNotPowerOfTwo)
        );
        assert_eq!(PmaRegion::napot(0x0001_0000, 0), Err(PmaError::SizeZero));
    }

    #[test]
    fn test_region_size_has_4k_floor() {
        assert_eq!(
            PmaRegion::napot(0x0001_0000, 0x800),
            Err(PmaError::SizeTooSmall)
        );
        assert!(PmaRegion::napot(0x0001_0000, 0x1000).is_ok());
    }

    #[test]
    fn test_region_address_must_be_aligned_to_size() {
        assert!(PmaRegion::napot(0x0002_0000, 0x2000).is_ok());
        assert_eq!(
            PmaRegion::napot(0x0002_1000, 0x2000),
            Err(PmaError::AddressMisaligned)
        );
    }

    #[test]
    fn test_napot_address_encoding() {
        let r = PmaRegion::napot(0x0001_0000, 0x1000).unwrap();
        assert_eq!(r.napot_address(), 0x41FF);
        let r = PmaRegion::napot(0x0002_0000, 0x4000).unwrap();
        assert_eq!(r.napot_address(), 0x87FF);
    }

    #[test]
    fn test_entry_config_bytes() {
        assert_eq!(NON_CACHEABLE_NAPOT, 0x0F);
        assert_eq!(
            entry_config(PmaEntryType::Napot, PmaMemoryType::Device, true),
            0x47
        );
        assert_eq!(
            entry_config(PmaEntryType::Off, PmaMemoryType::Cacheable, false),
            0x2C
        );
    }

    #[test]
    fn test_programming_preserves_other_entries() {
        let mut regs = MockAttributes::with_pmacfg0(0xAB_CD_EF_77);
        let r = PmaRegion::napot(0x0001_0000, 0x1000).unwrap();
        make_non_cacheable(&mut regs, &r);

        assert_eq!(
            regs.writes(),
            &[
                AttrWrite::PmaAddr0(0x41FF),
                AttrWrite::PmaCfg0(0xAB_CD_EF_0F),
                AttrWrite::Sync,
            ]
        );
        assert_eq!(regs.pmacfg0(), 0xAB_CD_EF_0F);
    }
}
