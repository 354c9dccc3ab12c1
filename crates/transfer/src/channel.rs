//! Target side of the transfer channel: bring-up handshake and ring access.

use core::sync::atomic::{fence, Ordering};

use cache::{AttributeRegister, CacheController, CacheEngine, RangeMaintenance};

use crate::config::TraceConfig;
use crate::error::InitError;
use crate::layout::{
    HostBlock, NapotRegion, RingDescriptor, SharedRegion, Slot, StartFlag, TargetBlock, STATE_INIT,
    STATE_READY, STATUS_CCTL_EN, STATUS_STATE_MASK, TAG,
};
use crate::mode::{select_mode, CoherencyMode, IndexLocation};
use crate::overflow::LogSink;
use crate::ring::{RawRing, RingConsumer, RingProducer};

/// Cache maintenance applied to shared accesses, fixed at init.
pub enum Coherence<'a, C> {
    /// Hardware keeps the region coherent (uncached or PMA); nothing to do.
    Implicit,
    /// Every shared access is bracketed by explicit CCTL maintenance.
    Explicit(&'a CacheEngine<C>),
}

impl<C> Clone for Coherence<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Coherence<'_, C> {}

impl<'a, C: CacheController> Coherence<'a, C> {
    fn for_mode(mode: CoherencyMode, engine: &'a CacheEngine<C>) -> Self {
        if mode.needs_maintenance() {
            Self::Explicit(engine)
        } else {
            Self::Implicit
        }
    }
}

impl<C: CacheController> RangeMaintenance for Coherence<'_, C> {
    fn writeback_range(&self, addr: usize, size: usize) {
        if let Self::Explicit(engine) = self {
            engine.dcache_writeback_range(addr, size);
        }
    }

    unsafe fn invalidate_range(&self, addr: usize, size: usize) {
        if let Self::Explicit(engine) = self {
            // SAFETY: forwarded caller contract.
            unsafe { engine.dcache_invalidate_range(addr, size) };
        }
    }

    fn flush_range(&self, addr: usize, size: usize) {
        if let Self::Explicit(engine) = self {
            engine.dcache_flush_range(addr, size);
        }
    }
}

/// Target end of an initialized channel: produces log bytes, consumes
/// command bytes, reads the host's start flag.
pub struct TransferChannel<'a, C> {
    mode: CoherencyMode,
    coherence: Coherence<'a, C>,
    host: &'a HostBlock,
    log: RingProducer<'a, Coherence<'a, C>>,
    cmd: RingConsumer<'a, Coherence<'a, C>>,
}

/// Index slots one ring uses on the target side.
struct Binding<'a> {
    head: &'a Slot,
    tail: &'a Slot,
}

fn bind<'a>(
    desc: &'a RingDescriptor,
    location: IndexLocation,
    split_head: &'a Slot,
    split_tail: &'a Slot,
) -> Binding<'a> {
    match location {
        IndexLocation::Unified => {
            desc.head().store(0);
            desc.tail().store(0);
            Binding {
                head: desc.head(),
                tail: desc.tail(),
            }
        }
        IndexLocation::Split => {
            split_head.store(0);
            split_tail.store(0);
            desc.head().store(split_head.addr());
            desc.tail().store(split_tail.addr());
            Binding {
                head: split_head,
                tail: split_tail,
            }
        }
    }
}

impl<'a, C: CacheController> TransferChannel<'a, C> {
    /// Bring the channel up over `region`.
    ///
    /// Picks the coherency mode, publishes both rings, places their indices,
    /// then writes the tag and finally the *ready* state, each written back
    /// before the next step in CCTL mode. On error the region is left in the
    /// *initializing* state and both `region` and `target` may be claimed
    /// again.
    ///
    /// # Errors
    ///
    /// [`InitError::AlreadyInitialized`] if `region` or `target` already
    /// backs a channel, otherwise the reason the requested coherency mode is
    /// unavailable.
    pub fn init<const LOG: usize, const CMD: usize, A>(
        region: &'a SharedRegion<LOG, CMD>,
        target: &'a TargetBlock,
        engine: &'a CacheEngine<C>,
        attrs: &mut A,
        config: TraceConfig,
    ) -> Result<Self, InitError>
    where
        A: AttributeRegister + ?Sized,
    {
        let span = (region.addr(), region.size());
        Self::bring_up(region, span, target, engine, attrs, config)
    }

    /// [`init`](Self::init) over a padded region; PMA then covers the whole
    /// power-of-two block.
    ///
    /// # Errors
    ///
    /// As for [`init`](Self::init).
    pub fn init_napot<N, const LOG: usize, const CMD: usize, A>(
        padded: &'a NapotRegion<N, LOG, CMD>,
        target: &'a TargetBlock,
        engine: &'a CacheEngine<C>,
        attrs: &mut A,
        config: TraceConfig,
    ) -> Result<Self, InitError>
    where
        A: AttributeRegister + ?Sized,
    {
        let span = (padded.addr(), padded.size());
        Self::bring_up(padded.region(), span, target, engine, attrs, config)
    }

    fn bring_up<const LOG: usize, const CMD: usize, A>(
        region: &'a SharedRegion<LOG, CMD>,
        (base, size): (usize, usize),
        target: &'a TargetBlock,
        engine: &'a CacheEngine<C>,
        attrs: &mut A,
        config: TraceConfig,
    ) -> Result<Self, InitError>
    where
        A: AttributeRegister + ?Sized,
    {
        if !region.claim() {
            warn!("transfer: region already backs a channel");
            return Err(InitError::AlreadyInitialized);
        }
        if !target.claim() {
            warn!("transfer: target block already backs a channel");
            region.release();
            return Err(InitError::AlreadyInitialized);
        }
        let control = region.control();
        control.set_tag([0; 16]);
        control.set_status(STATE_INIT);

        let mode = match select_mode(engine, attrs, base, size, config) {
            Ok(mode) => mode,
            Err(err) => {
                warn!("transfer: init failed: {}", err);
                target.release();
                region.release();
                return Err(err);
            }
        };
        if mode.needs_maintenance() {
            control.set_status(control.status() | STATUS_CCTL_EN);
        }

        control.log().set_buffer(region.log_buffer() as usize, LOG);
        control.cmd().set_buffer(region.cmd_buffer() as usize, CMD);

        let host = region.host();
        let location = IndexLocation::for_mode(mode);
        let log = bind(control.log(), location, target.log_head(), host.log_tail());
        let cmd = bind(control.cmd(), location, host.cmd_head(), target.cmd_tail());
        control.set_start_flag_addr(host.start_flag_addr());

        let coherence = Coherence::for_mode(mode, engine);
        if mode.needs_maintenance() {
            engine.dcache_flush_range(region.addr(), region.size());
            engine.dcache_flush_range(target.addr(), core::mem::size_of::<TargetBlock>());
        }

        fence(Ordering::Release);
        control.set_tag(TAG);
        let (addr, size) = control.tag_span();
        coherence.writeback_range(addr, size);

        fence(Ordering::Release);
        control.set_status((control.status() & !STATUS_STATE_MASK) | STATE_READY);
        let (addr, size) = control.status_span();
        coherence.writeback_range(addr, size);

        info!("transfer: channel ready, mode={}", mode.name());

        // SAFETY: buffers and slots live in `region`/`target`, borrowed for
        // 'a; the claims on both guarantee this is the only target-side
        // endpoint pair for either.
        let (log, cmd) = unsafe {
            let log_raw = RawRing::new(
                region.log_buffer(),
                LOG,
                log.head.as_ptr(),
                log.tail.as_ptr(),
                location,
            );
            let cmd_raw = RawRing::new(
                region.cmd_buffer(),
                CMD,
                cmd.head.as_ptr(),
                cmd.tail.as_ptr(),
                location,
            );
            (
                RingProducer::new(log_raw, coherence),
                RingConsumer::new(cmd_raw, coherence),
            )
        };

        Ok(Self {
            mode,
            coherence,
            host,
            log,
            cmd,
        })
    }

    /// Coherency mode chosen at init.
    pub fn mode(&self) -> CoherencyMode {
        self.mode
    }

    /// Enqueue one log record; `false` if the log ring has no room.
    pub fn try_write(&mut self, record: &[u8]) -> bool {
        self.log.try_write(record)
    }

    /// Dequeue exactly `out.len()` command bytes; `false` if fewer are queued.
    pub fn try_read(&mut self, out: &mut [u8]) -> bool {
        self.cmd.try_read(out)
    }

    /// Current value of the host's start flag.
    pub fn start_flag(&self) -> StartFlag {
        // SAFETY: the start flag is written only by the host.
        unsafe {
            self.coherence
                .invalidate_range(self.host.start_flag_addr(), 1);
        }
        self.host.start_flag()
    }

    /// Log ring endpoint.
    pub fn log(&self) -> &RingProducer<'a, Coherence<'a, C>> {
        &self.log
    }

    /// Command ring endpoint.
    pub fn commands(&self) -> &RingConsumer<'a, Coherence<'a, C>> {
        &self.cmd
    }
}

impl<C: CacheController> LogSink for TransferChannel<'_, C> {
    fn try_write(&mut self, record: &[u8]) -> bool {
        TransferChannel::try_write(self, record)
    }
}

impl<M: RangeMaintenance> LogSink for RingProducer<'_, M> {
    fn try_write(&mut self, record: &[u8]) -> bool {
        RingProducer::try_write(self, record)
    }
}
