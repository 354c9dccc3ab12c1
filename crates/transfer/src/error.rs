//! Error types for channel bring-up and host attach.
//!
//! Ring full/empty is not an error: `try_write` / `try_read` report it as
//! `false`.

use thiserror_no_std::Error;

/// Why the target could not bring the channel up.
///
/// The control block stays in the *initializing* state on every error, so a
/// host polling it never sees a half-built channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// Cache handling was requested but the core has no data cache.
    #[error("cache handling requested but the core has no data cache")]
    NoDataCache,
    /// Cache handling was requested but the core implements no CCTL CSRs.
    #[error("cache handling requested but CCTL is not supported")]
    CctlUnsupported,
    /// CCTL mode is needed but the D-cache line is wider than the layout
    /// padding, so the two sides would share lines.
    #[error("D-cache line of {line} bytes exceeds the shared layout padding")]
    LineTooLarge {
        /// D-cache line size in bytes.
        line: usize,
    },
    /// The region or the target block already backs a channel.
    #[error("transfer channel already initialized")]
    AlreadyInitialized,
}

/// Why the host refused to attach to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttachError {
    /// The identifying tag is missing or wrong.
    #[error("control block tag mismatch")]
    TagMismatch,
    /// The tag is present but the status is not *ready* yet.
    #[error("control block not ready")]
    NotReady,
}
