//! End-to-end tests: target channel and host port over one shared region.

#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::cast_possible_truncation)]

use cache::mocks::{CacheOp, MockAttributes, MockCache};
use cache::{CacheEngine, L1Command, NoMaintenance};
use transfer::overflow::{overflow_notice, LogWriter};
use transfer::{
    CoherencyMode, HostPort, InitError, SharedRegion, StartFlag, TargetBlock, TraceConfig,
    TransferChannel,
};

/// Small log ring so wrap-around is easy to reach.
type SmallRegion = SharedRegion<64, 32>;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

#[test]
fn no_cache_eight_byte_record_round_trip() {
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
    assert_eq!(ch.mode(), CoherencyMode::NoCache);
    // SAFETY: region and target outlive the port.
    let mut host = unsafe { HostPort::attach(&region, NoMaintenance) }.unwrap();

    let record = *b"\x01\x02\x03\x04\x05\x06\x07\x08";
    assert!(ch.try_write(&record));
    let mut out = [0u8; 8];
    assert!(host.read_log(&mut out));
    assert_eq!(out, record);
    assert!(ch.log().is_empty());
    assert_eq!(host.log_len(), 0);
}

#[test]
fn three_writes_filling_the_ring_wrap_and_read_back_in_order() {
    let region = SmallRegion::new();
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

    // Move both indices off zero so the last write crosses the physical end.
    let mut skip = [0u8; 10];
    assert!(ch.try_write(&skip));
    assert!(host.read_log(&mut skip));

    let records = [pattern(20, 0), pattern(20, 20), pattern(23, 40)];
    for record in &records {
        assert!(ch.try_write(record));
    }
    assert!(ch.log().is_full());
    assert_eq!(ch.log().len(), 63);

    let mut out = vec![0u8; 63];
    assert!(host.read_log(&mut out));
    assert_eq!(out, records.concat());
    assert!(ch.log().is_empty());
}

#[test]
fn rejected_write_succeeds_after_consumer_catches_up() {
    let region = SmallRegion::new();
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

    let first = pattern(40, 1);
    let second = pattern(30, 100);
    assert!(ch.try_write(&first));
    assert!(!ch.try_write(&second));
    assert_eq!(ch.log().len(), 40);

    let mut out = vec![0u8; 40];
    assert!(host.read_log(&mut out));
    assert_eq!(out, first);

    assert!(ch.try_write(&second));
    let mut out = vec![0u8; 30];
    assert!(host.read_log(&mut out));
    assert_eq!(out, second);
}

#[test]
fn capacity_minus_one_fits_and_capacity_does_not() {
    let region = SmallRegion::new();
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

    assert!(!ch.try_write(&[0xAA; 64]));
    assert!(ch.log().is_empty());
    assert!(ch.try_write(&[0xAA; 63]));
    assert!(ch.log().is_full());
    assert!(!ch.try_write(&[0xAA]));
}

#[test]
fn commands_flow_from_host_to_target() {
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

    let mut frag = [0u8; 4];
    assert!(!ch.try_read(&mut frag));
    assert!(host.write_command(&[1, 2, 3, 4, 5, 6]));
    assert!(ch.try_read(&mut frag));
    assert_eq!(frag, [1, 2, 3, 4]);
    // Exact-size reads: only two bytes left.
    assert!(!ch.try_read(&mut frag));
    let mut rest = [0u8; 2];
    assert!(ch.try_read(&mut rest));
    assert_eq!(rest, [5, 6]);
    assert!(!host.write_command(&[0; 32]));

    assert_eq!(ch.start_flag(), StartFlag::Idle);
    host.set_start_flag(StartFlag::Start);
    assert_eq!(ch.start_flag(), StartFlag::Start);
}

#[test]
fn cctl_write_invalidates_tail_then_publishes_data_before_head() {
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
    assert_eq!(ch.mode(), CoherencyMode::Cctl);
    engine.controller().take_ops();

    assert!(ch.try_write(&[9; 8]));
    let host_line = region.host().log_tail().addr() & !63;
    let log_line = region.log_buffer() as usize;
    let target_line = target.log_head().addr() & !63;
    assert_eq!(
        engine.controller().take_ops(),
        vec![
            CacheOp::l1(L1Command::DVaInvalidate, host_line),
            CacheOp::l1(L1Command::DVaWriteback, log_line),
            CacheOp::l1(L1Command::DVaWriteback, target_line),
        ]
    );
}

#[test]
fn cctl_read_invalidates_head_and_data_then_publishes_tail() {
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
    // SAFETY: region and target outlive the port.
    let mut host = unsafe { HostPort::attach(&region, NoMaintenance) }.unwrap();
    assert!(host.write_command(&[1, 2, 3]));
    engine.controller().take_ops();

    let mut frag = [0u8; 3];
    assert!(ch.try_read(&mut frag));
    assert_eq!(frag, [1, 2, 3]);
    let host_line = region.host().cmd_head().addr() & !63;
    let cmd_line = region.cmd_buffer() as usize;
    let target_line = target.cmd_tail().addr() & !63;
    assert_eq!(
        engine.controller().take_ops(),
        vec![
            CacheOp::l1(L1Command::DVaInvalidate, host_line),
            CacheOp::l1(L1Command::DVaInvalidate, cmd_line),
            CacheOp::l1(L1Command::DVaWriteback, target_line),
        ]
    );
}

#[test]
fn dropped_records_are_announced_to_the_host() {
    let region = SmallRegion::new();
    let target = TargetBlock::new();
    let engine = CacheEngine::new(MockCache::new());
    let ch = TransferChannel::init(
        &region,
        &target,
        &engine,
        &mut MockAttributes::new(),
        TraceConfig::new(),
    )
    .unwrap();
    // SAFETY: region and target outlive the port.
    let mut host = unsafe { HostPort::attach(&region, NoMaintenance) }.unwrap();
    let mut log = LogWriter::new(ch);

    assert!(log.write(&[1; 60]));
    assert!(!log.write(&[2; 8]));
    assert!(!log.write(&[3; 8]));
    assert_eq!(log.dropped(), 2);

    let mut first = [0u8; 60];
    assert!(host.read_log(&mut first));
    assert!(log.write(&[4; 8]));

    let stream: heapless::Vec<u8, 64> = host.drain_log();
    let mut expected = overflow_notice(2).to_vec();
    expected.extend_from_slice(&[4; 8]);
    assert_eq!(stream.as_slice(), expected.as_slice());
}

#[test]
fn reinit_with_another_target_block_keeps_the_live_channel() {
    let region: SharedRegion = SharedRegion::new();
    let first_target = TargetBlock::new();
    let second_target = TargetBlock::new();
    let engine = CacheEngine::new(MockCache::new());
    let mut ch = TransferChannel::init(
        &region,
        &first_target,
        &engine,
        &mut MockAttributes::new(),
        TraceConfig::new(),
    )
    .unwrap();
    // SAFETY: region and targets outlive the port.
    let mut host = unsafe { HostPort::attach(&region, NoMaintenance) }.unwrap();
    assert!(ch.try_write(b"first"));

    let second = TransferChannel::init(
        &region,
        &second_target,
        &engine,
        &mut MockAttributes::new(),
        TraceConfig::new(),
    );
    assert_eq!(second.err(), Some(InitError::AlreadyInitialized));
    assert!(region.control().is_ready());

    let mut out = [0u8; 5];
    assert!(host.read_log(&mut out));
    assert_eq!(&out, b"first");
}

#[test]
fn target_block_in_use_leaves_the_other_region_free() {
    let first: SharedRegion = SharedRegion::new();
    let second: SharedRegion = SharedRegion::new();
    let target = TargetBlock::new();
    let engine = CacheEngine::new(MockCache::new());
    let _ch = TransferChannel::init(
        &first,
        &target,
        &engine,
        &mut MockAttributes::new(),
        TraceConfig::new(),
    )
    .unwrap();

    let refused = TransferChannel::init(
        &second,
        &target,
        &engine,
        &mut MockAttributes::new(),
        TraceConfig::new(),
    );
    assert_eq!(refused.err(), Some(InitError::AlreadyInitialized));
    assert!(!second.control().is_ready());

    let spare = TargetBlock::new();
    assert!(TransferChannel::init(
        &second,
        &spare,
        &engine,
        &mut MockAttributes::new(),
        TraceConfig::new(),
    )
    .is_ok());
}
