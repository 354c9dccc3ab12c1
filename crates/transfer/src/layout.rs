//! Fixed shared-memory layout seen by both the target and the host.
//!
//! ```text
//! SharedRegion (4 KiB aligned)
//! ├── ControlBlock   tag | start flag ptr | status | log desc | cmd desc
//! │   + init claim   (target only, in the control block's padding)
//! ├── log buffer     LOG bytes, target → host
//! ├── cmd buffer     CMD bytes, host → target
//! └── HostBlock      start flag | log tail | cmd head      (host writes)
//!
//! TargetBlock (outside the region)  log head | cmd tail   (target writes)
//! ```
//!
//! [`NapotRegion`] pads a region to a power-of-two block so PMA can cover
//! layouts larger than 4 KiB.
//!
//! Every part starts on its own cache line, so maintenance on one part never
//! touches bytes owned by the other side. All field accesses are volatile:
//! the other side changes these bytes behind the compiler's back.

use core::cell::{Cell, UnsafeCell};
use core::mem::{align_of, size_of};
use core::ptr;

use critical_section::Mutex;

use crate::config::{CMD_BUFFER_SIZE, DEFAULT_LOG_BUFFER_SIZE, LAYOUT_CACHE_LINE};

/// Identifying tag, written last during init.
pub const TAG: [u8; 16] = *b"_TRANSFER_BLOCK\0";

/// Status bit: the target maintains caches explicitly (CCTL mode) and the
/// index slots of the descriptors hold addresses.
pub const STATUS_CCTL_EN: u32 = 1 << 0;
/// Status state field.
pub const STATUS_STATE_MASK: u32 = 0x7 << 1;
/// State: initialization in progress.
pub const STATE_INIT: u32 = 1 << 1;
/// State: channel ready, host may attach.
pub const STATE_READY: u32 = 2 << 1;

/// Bytes covered by one index slot.
pub const SLOT_SIZE: usize = size_of::<Slot>();

#[allow(clippy::arithmetic_side_effects)] // Safety: usize is at most 8 bytes on every supported target
const SLOT_PAD: usize = 8 - size_of::<usize>();

// ── Slot ────────────────────────────────────────────────────────────────────

/// One 8-byte index field. The native word lives in the low bytes.
#[repr(C, align(8))]
pub struct Slot {
    value: UnsafeCell<usize>,
    _pad: [u8; SLOT_PAD],
}

impl Slot {
    /// A zeroed slot.
    pub const fn new() -> Self {
        Self {
            value: UnsafeCell::new(0),
            _pad: [0; SLOT_PAD],
        }
    }

    /// Raw pointer to the native word.
    pub fn as_ptr(&self) -> *mut usize {
        self.value.get()
    }

    /// Address of the slot.
    pub fn addr(&self) -> usize {
        self.value.get() as usize
    }

    /// Volatile read.
    pub fn load(&self) -> usize {
        // SAFETY: the pointer comes from our own UnsafeCell and is aligned.
        unsafe { ptr::read_volatile(self.value.get()) }
    }

    /// Volatile write.
    pub fn store(&self, value: usize) {
        // SAFETY: as in `load`; each slot has a single writer.
        unsafe { ptr::write_volatile(self.value.get(), value) }
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::new()
    }
}

// ── Ring descriptor ─────────────────────────────────────────────────────────

/// Base, size and index slots of one ring, as published to the host.
///
/// In CCTL mode `head` and `tail` hold the *addresses* of the index slots in
/// the target/host blocks; otherwise they hold the indices themselves.
#[repr(C, align(8))]
pub struct RingDescriptor {
    base: UnsafeCell<u64>,
    size: Slot,
    head: Slot,
    tail: Slot,
}

impl RingDescriptor {
    const fn new() -> Self {
        Self {
            base: UnsafeCell::new(0),
            size: Slot::new(),
            head: Slot::new(),
            tail: Slot::new(),
        }
    }

    /// Publish the buffer location and capacity.
    pub fn set_buffer(&self, base: usize, size: usize) {
        // SAFETY: aligned pointer from our own UnsafeCell; written by the target only.
        unsafe { ptr::write_volatile(self.base.get(), base as u64) };
        self.size.store(size);
    }

    /// Buffer base address.
    #[allow(clippy::cast_possible_truncation)] // Safety: written from a usize by `set_buffer`
    pub fn base(&self) -> usize {
        // SAFETY: aligned pointer from our own UnsafeCell.
        unsafe { ptr::read_volatile(self.base.get()) as usize }
    }

    /// Buffer capacity in bytes.
    pub fn size(&self) -> usize {
        self.size.load()
    }

    /// Producer index slot.
    pub fn head(&self) -> &Slot {
        &self.head
    }

    /// Consumer index slot.
    pub fn tail(&self) -> &Slot {
        &self.tail
    }
}

// ── Control block ───────────────────────────────────────────────────────────

/// ABI-stable root of the shared region.
#[repr(C, align(8))]
pub struct ControlBlock {
    tag: UnsafeCell<[u8; 16]>,
    start_flag: UnsafeCell<u64>,
    status: UnsafeCell<u32>,
    _reserved: u32,
    log: RingDescriptor,
    cmd: RingDescriptor,
}

const _: () = assert!(size_of::<ControlBlock>() == 96);
const _: () = assert!(size_of::<RingDescriptor>() == 32);

fn span<T>(cell: &UnsafeCell<T>) -> (usize, usize) {
    (cell.get() as usize, size_of::<T>())
}

impl ControlBlock {
    /// A block in the *initializing* state with no tag.
    pub const fn new() -> Self {
        Self {
            tag: UnsafeCell::new([0; 16]),
            start_flag: UnsafeCell::new(0),
            status: UnsafeCell::new(STATE_INIT),
            _reserved: 0,
            log: RingDescriptor::new(),
            cmd: RingDescriptor::new(),
        }
    }

    /// Current tag bytes.
    pub fn tag(&self) -> [u8; 16] {
        // SAFETY: aligned pointer from our own UnsafeCell.
        unsafe { ptr::read_volatile(self.tag.get()) }
    }

    /// Overwrite the tag.
    pub fn set_tag(&self, tag: [u8; 16]) {
        // SAFETY: as in `tag`; only the target writes the control block.
        unsafe { ptr::write_volatile(self.tag.get(), tag) }
    }

    /// Address and size of the tag field.
    pub fn tag_span(&self) -> (usize, usize) {
        span(&self.tag)
    }

    /// Raw status word.
    pub fn status(&self) -> u32 {
        // SAFETY: aligned pointer from our own UnsafeCell.
        unsafe { ptr::read_volatile(self.status.get()) }
    }

    /// Overwrite the status word.
    pub fn set_status(&self, status: u32) {
        // SAFETY: as in `status`; only the target writes the control block.
        unsafe { ptr::write_volatile(self.status.get(), status) }
    }

    /// Address and size of the status field.
    pub fn status_span(&self) -> (usize, usize) {
        span(&self.status)
    }

    /// State field of the status word.
    pub fn state(&self) -> u32 {
        self.status() & STATUS_STATE_MASK
    }

    /// Whether the state is *ready*.
    pub fn is_ready(&self) -> bool {
        self.state() == STATE_READY
    }

    /// Whether the CCTL flag is set.
    pub fn cctl_enabled(&self) -> bool {
        self.status() & STATUS_CCTL_EN != 0
    }

    /// Address of the host's start flag byte.
    #[allow(clippy::cast_possible_truncation)] // Safety: written from a usize
    pub fn start_flag_addr(&self) -> usize {
        // SAFETY: aligned pointer from our own UnsafeCell.
        unsafe { ptr::read_volatile(self.start_flag.get()) as usize }
    }

    /// Point the host at its start flag byte.
    pub fn set_start_flag_addr(&self, addr: usize) {
        // SAFETY: aligned pointer from our own UnsafeCell.
        unsafe { ptr::write_volatile(self.start_flag.get(), addr as u64) }
    }

    /// Log ring descriptor.
    pub fn log(&self) -> &RingDescriptor {
        &self.log
    }

    /// Command ring descriptor.
    pub fn cmd(&self) -> &RingDescriptor {
        &self.cmd
    }
}

impl Default for ControlBlock {
    fn default() -> Self {
        Self::new()
    }
}

// ── Start flag ──────────────────────────────────────────────────────────────

/// Host request carried by the start flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartFlag {
    /// No request yet.
    Idle,
    /// Start tracing.
    Start,
    /// Stop tracing.
    Stop,
    /// Unrecognised value.
    Other(u8),
}

impl StartFlag {
    /// Decode the raw byte.
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Start,
            2 => Self::Stop,
            other => Self::Other(other),
        }
    }

    /// Encode as the raw byte.
    pub const fn raw(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Start => 1,
            Self::Stop => 2,
            Self::Other(raw) => raw,
        }
    }
}

// ── Host and target blocks ──────────────────────────────────────────────────

/// Fields written only by the host.
#[repr(C, align(64))]
pub struct HostBlock {
    start_flag: UnsafeCell<u8>,
    _reserved: [u8; 7],
    log_tail: Slot,
    cmd_head: Slot,
}

impl HostBlock {
    const fn new() -> Self {
        Self {
            start_flag: UnsafeCell::new(0),
            _reserved: [0; 7],
            log_tail: Slot::new(),
            cmd_head: Slot::new(),
        }
    }

    /// Address of the start flag byte.
    pub fn start_flag_addr(&self) -> usize {
        self.start_flag.get() as usize
    }

    /// Current start flag.
    pub fn start_flag(&self) -> StartFlag {
        // SAFETY: pointer from our own UnsafeCell.
        StartFlag::from_raw(unsafe { ptr::read_volatile(self.start_flag.get()) })
    }

    /// Write the start flag.
    pub fn set_start_flag(&self, flag: StartFlag) {
        // SAFETY: pointer from our own UnsafeCell; only the host writes it.
        unsafe { ptr::write_volatile(self.start_flag.get(), flag.raw()) }
    }

    /// Log consumer index (CCTL mode).
    pub fn log_tail(&self) -> &Slot {
        &self.log_tail
    }

    /// Command producer index (CCTL mode).
    pub fn cmd_head(&self) -> &Slot {
        &self.cmd_head
    }
}

/// Fields written only by the target, kept outside the shared region.
///
/// Also carries a claim flag, so one block never backs two channels.
#[repr(C, align(64))]
pub struct TargetBlock {
    log_head: Slot,
    cmd_tail: Slot,
    claimed: Mutex<Cell<bool>>,
}

impl TargetBlock {
    /// An unclaimed block with zeroed indices.
    pub const fn new() -> Self {
        Self {
            log_head: Slot::new(),
            cmd_tail: Slot::new(),
            claimed: Mutex::new(Cell::new(false)),
        }
    }

    /// Log producer index (CCTL mode).
    pub fn log_head(&self) -> &Slot {
        &self.log_head
    }

    /// Command consumer index (CCTL mode).
    pub fn cmd_tail(&self) -> &Slot {
        &self.cmd_tail
    }

    /// Address of the block.
    pub fn addr(&self) -> usize {
        ptr::from_ref(self) as usize
    }

    /// Take the claim. Returns `false` if it was already taken.
    pub(crate) fn claim(&self) -> bool {
        critical_section::with(|cs| !self.claimed.borrow(cs).replace(true))
    }

    /// Drop the claim after a failed init.
    pub(crate) fn release(&self) {
        critical_section::with(|cs| self.claimed.borrow(cs).set(false));
    }
}

impl Default for TargetBlock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: every slot has exactly one writer (the target) and is accessed
// with volatile operations; the claim flag sits behind a critical-section mutex.
unsafe impl Sync for TargetBlock {}

// ── Shared region ───────────────────────────────────────────────────────────

/// Pads `T` to whole cache lines.
#[repr(C, align(64))]
pub struct CacheAligned<T>(pub T);

/// The control block and the target's init claim. The claim lives in the
/// padding after the block, in a line only the target writes.
#[repr(C, align(64))]
struct ControlLine {
    block: ControlBlock,
    claimed: Mutex<Cell<bool>>,
}

const _: () = assert!(align_of::<CacheAligned<u8>>() == LAYOUT_CACHE_LINE);
const _: () = assert!(align_of::<HostBlock>() == LAYOUT_CACHE_LINE);
const _: () = assert!(size_of::<ControlLine>() == size_of::<CacheAligned<ControlBlock>>());

/// The memory shared with the host: control block, both ring buffers and
/// the host-owned block.
///
/// Place one in a `static` at the address the host expects:
///
/// ```
/// use transfer::SharedRegion;
///
/// static REGION: SharedRegion = SharedRegion::new();
/// assert_eq!(REGION.addr() % 4096, 0);
/// assert!(!REGION.control().is_ready());
/// ```
#[repr(C, align(4096))]
pub struct SharedRegion<
    const LOG: usize = DEFAULT_LOG_BUFFER_SIZE,
    const CMD: usize = CMD_BUFFER_SIZE,
> {
    control: ControlLine,
    log_buf: CacheAligned<UnsafeCell<[u8; LOG]>>,
    cmd_buf: CacheAligned<UnsafeCell<[u8; CMD]>>,
    host: HostBlock,
}

impl<const LOG: usize, const CMD: usize> SharedRegion<LOG, CMD> {
    const VALID: () = assert!(LOG > 1 && CMD > 1, "ring buffers need at least 2 bytes");

    /// A zeroed region in the *initializing* state.
    #[allow(clippy::let_unit_value)]
    pub const fn new() -> Self {
        let () = Self::VALID;
        Self {
            control: ControlLine {
                block: ControlBlock::new(),
                claimed: Mutex::new(Cell::new(false)),
            },
            log_buf: CacheAligned(UnsafeCell::new([0; LOG])),
            cmd_buf: CacheAligned(UnsafeCell::new([0; CMD])),
            host: HostBlock::new(),
        }
    }

    /// Control block.
    pub fn control(&self) -> &ControlBlock {
        &self.control.block
    }

    /// Take the region for one channel. Returns `false` if a channel was
    /// already brought up over it.
    pub(crate) fn claim(&self) -> bool {
        critical_section::with(|cs| !self.control.claimed.borrow(cs).replace(true))
    }

    /// Drop the claim after a failed init.
    pub(crate) fn release(&self) {
        critical_section::with(|cs| self.control.claimed.borrow(cs).set(false));
    }

    /// Host-owned block.
    pub fn host(&self) -> &HostBlock {
        &self.host
    }

    /// Start of the log buffer.
    pub fn log_buffer(&self) -> *mut u8 {
        self.log_buf.0.get().cast()
    }

    /// Start of the command buffer.
    pub fn cmd_buffer(&self) -> *mut u8 {
        self.cmd_buf.0.get().cast()
    }

    /// Base address of the region.
    pub fn addr(&self) -> usize {
        ptr::from_ref(self) as usize
    }

    /// Size of the region in bytes, padding included.
    pub const fn size(&self) -> usize {
        size_of::<Self>()
    }
}

impl<const LOG: usize, const CMD: usize> Default for SharedRegion<LOG, CMD> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: each byte of the region has a single writer at any time (see the
// module docs) and all index and header accesses are volatile; the claim
// flag sits behind a critical-section mutex.
unsafe impl<const LOG: usize, const CMD: usize> Sync for SharedRegion<LOG, CMD> {}

// ── NAPOT padding ───────────────────────────────────────────────────────────

/// 8 KiB alignment class for [`NapotRegion`].
#[derive(Debug, Clone, Copy)]
#[repr(align(8192))]
pub struct Napot8K;

/// 16 KiB alignment class for [`NapotRegion`].
#[derive(Debug, Clone, Copy)]
#[repr(align(16384))]
pub struct Napot16K;

/// 32 KiB alignment class for [`NapotRegion`].
#[derive(Debug, Clone, Copy)]
#[repr(align(32768))]
pub struct Napot32K;

/// A [`SharedRegion`] padded to one naturally aligned power-of-two block of
/// `align_of::<A>()` bytes, so a single PMA entry can cover it exactly.
///
/// A class too small for the layout is rejected at compile time.
///
/// ```
/// use transfer::layout::{Napot16K, NapotRegion};
///
/// let region = Box::new(NapotRegion::<Napot16K, 8192, 32>::new());
/// assert_eq!(region.size(), 16 * 1024);
/// assert_eq!(region.addr() % region.size(), 0);
/// assert!(region.region().size() < region.size());
/// ```
#[repr(C)]
pub struct NapotRegion<
    A,
    const LOG: usize = DEFAULT_LOG_BUFFER_SIZE,
    const CMD: usize = CMD_BUFFER_SIZE,
> {
    region: SharedRegion<LOG, CMD>,
    _align: [A; 0],
}

impl<A, const LOG: usize, const CMD: usize> NapotRegion<A, LOG, CMD> {
    const FITS: () = assert!(
        size_of::<Self>() == align_of::<Self>(),
        "layout does not fit the NAPOT class"
    );

    /// A zeroed, padded region.
    #[allow(clippy::let_unit_value)]
    pub const fn new() -> Self {
        let () = Self::FITS;
        Self {
            region: SharedRegion::new(),
            _align: [],
        }
    }

    /// The shared region at the start of the block.
    pub fn region(&self) -> &SharedRegion<LOG, CMD> {
        &self.region
    }

    /// Base address of the block.
    pub fn addr(&self) -> usize {
        ptr::from_ref(self) as usize
    }

    /// Size of the block in bytes, a power of two.
    pub const fn size(&self) -> usize {
        size_of::<Self>()
    }
}

impl<A, const LOG: usize, const CMD: usize> Default for NapotRegion<A, LOG, CMD> {
    fn default() -> Self {
        Self::new()
    }
}
