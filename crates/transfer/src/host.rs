//! Host end of the channel, decoded purely from the shared-memory ABI.
//!
//! A debugger or simulator maps the region, waits for the tag and the
//! *ready* state, then consumes the log ring and produces into the command
//! ring. Nothing here depends on how the target was configured beyond what
//! the control block says.

use cache::RangeMaintenance;

use crate::error::AttachError;
use crate::layout::{HostBlock, RingDescriptor, SharedRegion, StartFlag, TAG};
use crate::mode::IndexLocation;
use crate::ring::{RawRing, RingConsumer, RingProducer};

/// Host-side view of an initialized channel.
///
/// `M` is the host's own cache maintenance; a host whose view of the region
/// is uncached uses [`cache::NoMaintenance`].
pub struct HostPort<'a, M> {
    host: &'a HostBlock,
    cctl: bool,
    maint: M,
    log: RingConsumer<'a, M>,
    cmd: RingProducer<'a, M>,
}

/// Index slot pointers of one ring, as published in its descriptor.
fn index_slots(desc: &RingDescriptor, location: IndexLocation) -> (*mut usize, *mut usize) {
    match location {
        IndexLocation::Unified => (desc.head().as_ptr(), desc.tail().as_ptr()),
        IndexLocation::Split => (
            desc.head().load() as *mut usize,
            desc.tail().load() as *mut usize,
        ),
    }
}

impl<'a, M: RangeMaintenance + Copy> HostPort<'a, M> {
    /// Attach to `region` once the target has brought it up.
    ///
    /// The tag is checked before the status, mirroring the order in which
    /// the target publishes them.
    ///
    /// # Errors
    ///
    /// [`AttachError::TagMismatch`] if the tag is absent,
    /// [`AttachError::NotReady`] if the tag is there but the state is not
    /// *ready* yet.
    ///
    /// # Safety
    ///
    /// The target side of the region must be alive for `'a`, including the
    /// target block its descriptors point into in CCTL mode, and no other
    /// host port may exist for the region.
    pub unsafe fn attach<const LOG: usize, const CMD: usize>(
        region: &'a SharedRegion<LOG, CMD>,
        maint: M,
    ) -> Result<Self, AttachError> {
        let control = region.control();

        let (addr, size) = control.tag_span();
        // SAFETY: the host never writes the control block.
        unsafe { maint.invalidate_range(addr, size) };
        if control.tag() != TAG {
            debug!("transfer: attach refused, no tag");
            return Err(AttachError::TagMismatch);
        }

        let (addr, size) = control.status_span();
        // SAFETY: as above.
        unsafe { maint.invalidate_range(addr, size) };
        if !control.is_ready() {
            debug!("transfer: attach refused, state {}", control.state());
            return Err(AttachError::NotReady);
        }

        let cctl = control.cctl_enabled();
        let location = if cctl {
            IndexLocation::Split
        } else {
            IndexLocation::Unified
        };
        // SAFETY: as above.
        unsafe {
            maint.invalidate_range(
                core::ptr::from_ref(control) as usize,
                core::mem::size_of_val(control),
            );
        }

        let (log_head, log_tail) = index_slots(control.log(), location);
        let (cmd_head, cmd_tail) = index_slots(control.cmd(), location);
        // SAFETY: the descriptors were published by the target before the
        // ready state; caller guarantees the memory they name outlives 'a.
        let (log, cmd) = unsafe {
            let log_raw = RawRing::new(
                control.log().base() as *mut u8,
                control.log().size(),
                log_head,
                log_tail,
                location,
            );
            let cmd_raw = RawRing::new(
                control.cmd().base() as *mut u8,
                control.cmd().size(),
                cmd_head,
                cmd_tail,
                location,
            );
            (RingConsumer::new(log_raw, maint), RingProducer::new(cmd_raw, maint))
        };

        Ok(Self {
            host: region.host(),
            cctl,
            maint,
            log,
            cmd,
        })
    }

    /// Whether the target maintains caches explicitly, in which case the
    /// host must do the same on its side.
    pub fn cctl_enabled(&self) -> bool {
        self.cctl
    }

    /// Read exactly `out.len()` log bytes.
    pub fn read_log(&mut self, out: &mut [u8]) -> bool {
        self.log.try_read(out)
    }

    /// Read everything currently in the log ring, up to `N` bytes.
    pub fn drain_log<const N: usize>(&mut self) -> heapless::Vec<u8, N> {
        let mut out = heapless::Vec::new();
        let available = self.log.len().min(N);
        if out.resize(available, 0).is_err() || !self.log.try_read(&mut out) {
            out.clear();
        }
        out
    }

    /// Queue command bytes for the target.
    pub fn write_command(&mut self, data: &[u8]) -> bool {
        self.cmd.try_write(data)
    }

    /// Bytes of log data waiting.
    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// Command ring producer.
    pub fn commands(&self) -> &RingProducer<'a, M> {
        &self.cmd
    }

    /// Ask the target to start or stop tracing.
    pub fn set_start_flag(&self, flag: StartFlag) {
        self.host.set_start_flag(flag);
        self.maint.writeback_range(self.host.start_flag_addr(), 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::TraceConfig;
    use crate::layout::{TargetBlock, STATUS_CCTL_EN};
    use crate::TransferChannel;
    use cache::mocks::{MockAttributes, MockCache};
    use cache::{CacheEngine, NoMaintenance};

    #[test]
    fn attach_before_init_is_refused() {
        let region: SharedRegion = SharedRegion::new();
        // SAFETY: region outlives the attempt; no target side exists.
        let err = unsafe { HostPort::attach(&region, NoMaintenance) }.err();
        assert_eq!(err, Some(AttachError::TagMismatch));
    }

    #[test]
    fn attach_with_tag_but_not_ready_is_refused() {
        let region: SharedRegion = SharedRegion::new();
        region.control().set_tag(TAG);
        // SAFETY: as above.
        let err = unsafe { HostPort::attach(&region, NoMaintenance) }.err();
        assert_eq!(err, Some(AttachError::NotReady));
    }

    #[test]
    fn host_decodes_split_indices_from_descriptors() {
        let region: SharedRegion = SharedRegion::new();
        let target = TargetBlock::new();
        let engine = CacheEngine::new(MockCache::new().with_dcache(64).with_cctl());
        let mut ch = TransferChannel::init(
            &region,
            &target,
            &engine,
            &mut MockAttributes::new(),
            TraceConfig::new().with_cache(true),
        )
        .unwrap();
        assert_ne!(region.control().status() & STATUS_CCTL_EN, 0);

        // SAFETY: region and target outlive the port.
        let mut host = unsafe { HostPort::attach(&region, NoMaintenance) }.unwrap();
        assert!(host.cctl_enabled());
        assert_eq!(host.commands().location(), IndexLocation::Split);

        assert!(ch.try_write(b"trace"));
        assert_eq!(target.log_head().load(), 5);
        assert_eq!(host.log_len(), 5);
        let drained: heapless::Vec<u8, 16> = host.drain_log();
        assert_eq!(drained.as_slice(), b"trace");
        assert_eq!(region.host().log_tail().load(), 5);

        assert!(host.write_command(&[7, 7]));
        assert_eq!(region.host().cmd_head().load(), 2);
        let mut cmd = [0u8; 2];
        assert!(ch.try_read(&mut cmd));
        assert_eq!(cmd, [7, 7]);
        assert_eq!(target.cmd_tail().load(), 2);

        host.set_start_flag(StartFlag::Stop);
        assert_eq!(ch.start_flag(), StartFlag::Stop);
    }

    #[test]
    fn drain_is_capped_by_the_output_size() {
        let region: SharedRegion = SharedRegion::new();
        let target = TargetBlock::new();
        let engine = CacheEngine::new(MockCache::new());
        let mut ch = TransferChannel::init(
            &region,
            &target,
            &engine,
            &mut MockAttributes::new(),
            TraceConfig::new(),
        )
        .unwrap();
        // SAFETY: region and target outlive the port.
        let mut host = unsafe { HostPort::attach(&region, NoMaintenance) }.unwrap();

        assert!(ch.try_write(b"0123456789"));
        let first: heapless::Vec<u8, 4> = host.drain_log();
        assert_eq!(first.as_slice(), b"0123");
        let rest: heapless::Vec<u8, 16> = host.drain_log();
        assert_eq!(rest.as_slice(), b"456789");
        let none: heapless::Vec<u8, 16> = host.drain_log();
        assert!(none.is_empty());
    }
}
