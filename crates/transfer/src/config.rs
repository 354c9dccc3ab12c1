//! Channel configuration and layout constants.

/// Default log ring size in bytes.
pub const DEFAULT_LOG_BUFFER_SIZE: usize = 2048;

/// Command ring size in bytes.
pub const CMD_BUFFER_SIZE: usize = 32;

/// Cache line size the shared layout is padded to.
///
/// Must be at least the largest D-cache line of any supported core, so that
/// no two parts owned by different sides ever share a line.
pub const LAYOUT_CACHE_LINE: usize = 64;

/// Tracer configuration, usually taken from the 64-bit configuration word
/// handed to the tracer at start-up.
///
/// ```
/// use transfer::TraceConfig;
///
/// let cfg = TraceConfig::from_bits(0x1);
/// assert!(cfg.cache_requested());
/// assert_eq!(TraceConfig::new().with_cache(true), cfg);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TraceConfig {
    cache: bool,
}

impl TraceConfig {
    /// Configuration bit: the shared region lives in cacheable memory and
    /// needs coherency handling.
    pub const CACHE_ENABLE: u64 = 1 << 0;

    /// No cache handling.
    pub const fn new() -> Self {
        Self { cache: false }
    }

    /// Decode a configuration word. Unknown bits are ignored.
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            cache: bits & Self::CACHE_ENABLE != 0,
        }
    }

    /// Encode back into a configuration word.
    pub const fn bits(&self) -> u64 {
        if self.cache {
            Self::CACHE_ENABLE
        } else {
            0
        }
    }

    /// Request (or not) coherency handling for cacheable memory.
    #[must_use]
    pub const fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Whether coherency handling was requested.
    pub const fn cache_requested(&self) -> bool {
        self.cache
    }
}
