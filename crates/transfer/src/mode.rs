//! Coherency mode selection.
//!
//! Runs once at channel init:
//!
//! ```text
//! cache not requested ─────────────────────────────► NoCache
//! no D-cache ──────────────────────────────────────► Err(NoDataCache)
//! no CCTL ─────────────────────────────────────────► Err(CctlUnsupported)
//! PMA + region is a valid NAPOT region ─► flush ───► Pma
//! line wider than the layout padding ──────────────► Err(LineTooLarge)
//! otherwise ───────────────────────────────────────► Cctl
//! ```

use cache::{AttributeRegister, CacheController, CacheEngine, PmaRegion};

use crate::config::{TraceConfig, LAYOUT_CACHE_LINE};
use crate::error::InitError;

/// How the shared region is kept coherent with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoherencyMode {
    /// Memory is not cached (or caching was not requested); no maintenance.
    NoCache,
    /// Explicit writeback/invalidate around every shared access.
    Cctl,
    /// Region marked non-cacheable through a PMA entry; no maintenance.
    Pma,
}

impl CoherencyMode {
    /// Short name for log output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoCache => "no-cache",
            Self::Cctl => "cctl",
            Self::Pma => "pma",
        }
    }

    /// Whether every shared access needs explicit maintenance.
    pub const fn needs_maintenance(self) -> bool {
        matches!(self, Self::Cctl)
    }
}

/// Where a ring's head and tail indices live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndexLocation {
    /// Both indices in the control block's ring descriptor.
    Unified,
    /// Each index in the block owned by its writer; the descriptor holds
    /// their addresses.
    Split,
}

impl IndexLocation {
    /// Placement used by `mode`.
    pub const fn for_mode(mode: CoherencyMode) -> Self {
        match mode {
            CoherencyMode::Cctl => Self::Split,
            CoherencyMode::NoCache | CoherencyMode::Pma => Self::Unified,
        }
    }
}

/// Pick the coherency mode for the region `[base, base + size)`.
///
/// In PMA mode the region is flushed and then marked non-cacheable through
/// PMA entry 0 before this returns.
///
/// # Errors
///
/// [`InitError::NoDataCache`] or [`InitError::CctlUnsupported`] when cache
/// handling is requested on a core that cannot provide it, and
/// [`InitError::LineTooLarge`] when CCTL is the only option but the core's
/// lines are wider than [`LAYOUT_CACHE_LINE`].
pub fn select_mode<C, A>(
    engine: &CacheEngine<C>,
    attrs: &mut A,
    base: usize,
    size: usize,
    config: TraceConfig,
) -> Result<CoherencyMode, InitError>
where
    C: CacheController,
    A: AttributeRegister + ?Sized,
{
    if !config.cache_requested() {
        return Ok(CoherencyMode::NoCache);
    }
    if !engine.info().has_dcache() {
        warn!("transfer: cache handling requested but no D-cache");
        return Err(InitError::NoDataCache);
    }
    let features = engine.features();
    if !features.cctl {
        warn!("transfer: cache handling requested but CCTL unsupported");
        return Err(InitError::CctlUnsupported);
    }
    if features.pma {
        match PmaRegion::napot(base, size) {
            Ok(region) => {
                engine.dcache_flush_range(region.base(), region.size());
                cache::pma::make_non_cacheable(attrs, &region);
                return Ok(CoherencyMode::Pma);
            }
            Err(err) => {
                debug!("transfer: PMA rejected region ({}), using CCTL", err);
            }
        }
    }
    let line = engine.info().line_size();
    if line > LAYOUT_CACHE_LINE {
        warn!(
            "transfer: {}-byte D-cache lines exceed the {}-byte layout padding",
            line, LAYOUT_CACHE_LINE
        );
        return Err(InitError::LineTooLarge { line });
    }
    Ok(CoherencyMode::Cctl)
}
