//! Cross-domain transfer channel between a running target and an external
//! host (debugger, trace probe, simulator).
//!
//! The target and the host share one fixed-layout memory region but not a
//! cache domain. The only synchronisation between them is the ordering of
//! cache maintenance: data is written back before the index that publishes
//! it, and foreign indices and data are invalidated before they are read.
//!
//! # Architecture Layers
//!
//! ```text
//! event encoder (external)          host dispatcher (external)
//!         ↓ try_write                       ↑ try_read
//! LogWriter (overflow accounting)   TransferChannel
//!         ↓                                 ↓
//! RingProducer / RingConsumer (this crate)
//!         ↓
//! Coherence: none | CacheEngine (cache crate)
//! ```
//!
//! # Shared region
//!
//! - [`SharedRegion`]: control block, log ring, command ring, host block
//! - [`TargetBlock`]: indices only the target writes (kept outside the
//!   region in CCTL mode)
//! - [`NapotRegion`]: a region padded to a power-of-two block for PMA
//!
//! # Features
//!
//! - `std`: Mock controllers for host-side tests of downstream crates
//! - `defmt`: `defmt::Format` derives and defmt log output
//! - `tracing`: Log through `tracing` (simulator builds)

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

#[macro_use]
mod fmt;

pub mod channel;
pub mod config;
pub mod error;
pub mod host;
pub mod layout;
pub mod mode;
pub mod overflow;
pub mod ring;

pub use channel::TransferChannel;
pub use config::{TraceConfig, CMD_BUFFER_SIZE, DEFAULT_LOG_BUFFER_SIZE, LAYOUT_CACHE_LINE};
pub use error::{AttachError, InitError};
pub use host::HostPort;
pub use layout::{ControlBlock, NapotRegion, SharedRegion, StartFlag, TargetBlock};
pub use mode::{CoherencyMode, IndexLocation};
pub use overflow::{LogSink, LogWriter};
pub use ring::{RingConsumer, RingProducer, RingStorage};
