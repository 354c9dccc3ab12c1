//! Cache maintenance for Andes V5 RISC-V cores.
//!
//! This crate owns everything that touches the CPU caches:
//!
//! - [`CacheInfo`]: cache topology discovered once from the configuration
//!   CSRs (line size, L2 presence, DMA coherency).
//! - [`CacheEngine`]: per-line L1 CCTL operations composed with L2
//!   operations, whole-cache operations, and DMA helpers for unaligned
//!   buffers.
//! - [`pma`]: physical memory attribute (PMA) region encoding used to mark a
//!   region non-cacheable.
//!
//! # Architecture Layers
//!
//! ```text
//! transfer crate (ring buffers, control block)
//!         ↓
//! CacheEngine / RangeMaintenance (this crate)
//!         ↓
//! CacheController + AttributeRegister traits
//!         ↓
//! hw::AndesCctl (CSRs + L2C MMIO)   |   mocks::MockCache (host tests)
//! ```
//!
//! # Features
//!
//! - `std`: Mock controllers for host-side tests of downstream crates
//! - `defmt`: `defmt::Format` derives and defmt log output
//! - `tracing`: Log through `tracing` (simulator builds)
//!
//! # Example
//!
//! ```no_run
//! use cache::{CacheController, CacheEngine};
//!
//! fn publish<C: CacheController>(engine: &CacheEngine<C>, buf: &[u8]) {
//!     engine.dcache_writeback_range(buf.as_ptr() as usize, buf.len());
//! }
//! ```

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
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware crate:
#![allow(clippy::doc_markdown)] // CSR and register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(all(feature = "std", not(test)))]
extern crate std;

#[macro_use]
mod fmt;

pub mod controller;
pub mod csr;
pub mod dma;
pub mod engine;
pub mod info;
pub mod maintenance;
pub mod pma;

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub mod hw;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

pub use controller::CacheController;
pub use csr::{L1Command, L2Command, L2Status};
pub use engine::CacheEngine;
pub use info::{CacheGeometry, CacheInfo, Features};
pub use maintenance::{NoMaintenance, RangeMaintenance};
pub use pma::{AttributeRegister, PmaError, PmaRegion};
