mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use common::counted_frame;
use plugscan::{FrameGate, GateStats, PipelineState, PixelFormat, RawFrame};

#[test]
fn test_concurrent_admits_take_one_slot() {
    common::init();
    let gate = FrameGate::new();
    let released = Arc::new(AtomicUsize::new(0));
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let gate = gate.clone();
            let barrier = Arc::clone(&barrier);
            let frame = counted_frame(&released, 4, 4);
            thread::spawn(move || {
                barrier.wait();
                gate.admit(frame).into_in_flight()
            })
        })
        .collect();

    let admitted: Vec<_> = handles
        .into_iter()
        .filter_map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(admitted.len(), 1);
    // Every rejected frame was released on arrival
    assert_eq!(released.load(Ordering::SeqCst), threads - 1);
    assert_eq!(gate.state(), PipelineState::Admitted);

    drop(admitted);
    assert_eq!(released.load(Ordering::SeqCst), threads);
    assert_eq!(
        gate.stats(),
        GateStats {
            admitted: 1,
            dropped: (threads - 1) as u64,
            released: 1
        }
    );
    assert!(!gate.is_busy());
}

#[test]
fn test_slot_is_reusable_after_release() {
    let gate = FrameGate::new();
    let released = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let in_flight = gate.admit(counted_frame(&released, 2, 2)).into_in_flight();
        assert!(in_flight.is_some());
        assert!(gate.is_busy());
    }

    assert!(!gate.is_busy());
    assert_eq!(released.load(Ordering::SeqCst), 5);
    let stats = gate.stats();
    assert_eq!(stats.admitted, 5);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.in_flight(), 0);
}

#[test]
fn test_clones_share_the_slot() {
    let gate = FrameGate::new();
    let other = gate.clone();

    let in_flight = gate.admit("a").into_in_flight().unwrap();
    assert!(other.is_busy());
    assert!(!other.admit("b").is_admitted());

    assert!(in_flight.advance(PipelineState::Preprocessing));
    assert_eq!(other.state(), PipelineState::Preprocessing);
    in_flight.release();
    assert_eq!(other.state(), PipelineState::Idle);
}

#[test]
fn test_cancelled_frame_is_released_once() {
    let gate = FrameGate::new();
    let released = Arc::new(AtomicUsize::new(0));

    let stale = gate.admit(counted_frame(&released, 2, 2)).into_in_flight().unwrap();
    assert!(gate.reset());
    assert_eq!(gate.state(), PipelineState::Cancelled);
    assert_eq!(released.load(Ordering::SeqCst), 0);

    // Admission stays closed until the cancelled frame is gone
    assert!(!gate.admit(counted_frame(&released, 2, 2)).is_admitted());
    assert_eq!(released.load(Ordering::SeqCst), 1);

    drop(stale);
    assert_eq!(released.load(Ordering::SeqCst), 2);
    assert!(!gate.is_busy());
    assert_eq!(gate.stats().in_flight(), 0);
}

#[test]
fn test_frame_released_before_slot_reopens() {
    let gate = FrameGate::new();
    let observed = Arc::new(AtomicUsize::new(usize::MAX));

    let frame = {
        let gate = gate.clone();
        let observed = Arc::clone(&observed);
        RawFrame::new(2, 2, PixelFormat::Luma8, vec![0; 4]).with_release_hook(move || {
            observed.store(gate.is_busy() as usize, Ordering::SeqCst);
        })
    };
    gate.admit(frame).into_in_flight().unwrap().release();
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}
