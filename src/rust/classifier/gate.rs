use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

/// Stage of the frame currently holding the gate. `Idle` means the slot is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Admitted,
    Preprocessing,
    Inferring,
    Selecting,
    /// Cancelled while in flight; the slot stays taken until the frame finishes
    Cancelled,
}

/// Admission counters. Once nothing is in flight, `released == admitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateStats {
    pub admitted: u64,
    pub dropped: u64,
    pub released: u64,
}

impl GateStats {
    pub fn in_flight(&self) -> u64 {
        self.admitted.saturating_sub(self.released)
    }
}

#[derive(Debug, Default)]
struct Slot {
    state: PipelineState,
    /// Ticket of the most recent admission; tickets start at 1
    ticket: u64,
}

#[derive(Debug, Default)]
struct GateInner {
    slot: Mutex<Slot>,
    admitted: AtomicU64,
    dropped: AtomicU64,
    released: AtomicU64,
}

/// Single-slot admission in front of the pipeline.
///
/// While a frame is in flight every other frame is dropped on arrival; nothing is
/// queued. This keeps at most one frame in memory and sheds load when frames
/// arrive faster than they can be classified.
///
/// Cancellation only suppresses the result. The slot is freed when the
/// cancelled frame finishes, so two frames never run at the same time.
///
/// The gate is a cheap handle: clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct FrameGate {
    inner: Arc<GateInner>,
}

/// Result of [`FrameGate::admit`].
#[derive(Debug)]
pub enum Admission<T> {
    Admitted(InFlight<T>),
    /// The gate was busy; the frame has already been released
    Dropped,
}

impl<T> Admission<T> {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }

    pub fn into_in_flight(self) -> Option<InFlight<T>> {
        match self {
            Self::Admitted(in_flight) => Some(in_flight),
            Self::Dropped => None,
        }
    }
}

/// Ownership of the gate's single slot together with the admitted frame.
///
/// Dropping it (or calling [`InFlight::release`]) releases the frame and then
/// frees the slot. Because release is tied to the value's lifetime it happens
/// exactly once on every path: success, error, early return or panic.
#[derive(Debug)]
pub struct InFlight<T> {
    frame: Option<T>,
    gate: FrameGate,
    ticket: u64,
}

impl<T> InFlight<T> {
    /// The admitted frame, or `None` once [`release_frame`](Self::release_frame) ran.
    pub fn frame(&self) -> Option<&T> {
        self.frame.as_ref()
    }

    /// Identifies this admission for [`FrameGate::cancel`].
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Releases the frame early while keeping the slot.
    ///
    /// Called once the frame has been turned into a tensor, so a long forward
    /// pass does not pin the capture buffer.
    pub fn release_frame(&mut self) {
        self.frame.take();
    }

    /// True once this frame has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.gate.lock().state == PipelineState::Cancelled
    }

    /// Records the stage this frame has reached. Returns `false` if it was cancelled.
    pub fn advance(&self, state: PipelineState) -> bool {
        let mut slot = self.gate.lock();
        if slot.state == PipelineState::Cancelled {
            return false;
        }
        slot.state = state;
        true
    }

    pub fn release(self) {
        drop(self);
    }
}

impl<T> Drop for InFlight<T> {
    fn drop(&mut self) {
        self.frame.take();
        self.gate.finish();
    }
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the slot if it is free, otherwise releases `frame` and reports `Dropped`.
    pub fn admit<T>(&self, frame: T) -> Admission<T> {
        let mut slot = self.lock();
        if slot.state != PipelineState::Idle {
            self.inner.dropped.fetch_add(1, Ordering::SeqCst);
            drop(slot);
            debug!("Gate busy, dropping frame");
            drop(frame);
            return Admission::Dropped;
        }
        slot.state = PipelineState::Admitted;
        slot.ticket += 1;
        self.inner.admitted.fetch_add(1, Ordering::SeqCst);
        Admission::Admitted(InFlight {
            frame: Some(frame),
            gate: self.clone(),
            ticket: slot.ticket,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.lock().state
    }

    pub fn is_busy(&self) -> bool {
        self.state() != PipelineState::Idle
    }

    /// Cancels whatever frame is in flight. Returns `false` if the gate was idle.
    pub fn reset(&self) -> bool {
        let mut slot = self.lock();
        if slot.state == PipelineState::Idle {
            return false;
        }
        slot.state = PipelineState::Cancelled;
        true
    }

    /// Cancels the admission identified by `ticket` if it is still in flight.
    pub fn cancel(&self, ticket: u64) -> bool {
        let mut slot = self.lock();
        if slot.ticket != ticket || slot.state == PipelineState::Idle {
            return false;
        }
        slot.state = PipelineState::Cancelled;
        true
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            admitted: self.inner.admitted.load(Ordering::SeqCst),
            dropped: self.inner.dropped.load(Ordering::SeqCst),
            released: self.inner.released.load(Ordering::SeqCst),
        }
    }

    fn finish(&self) {
        self.lock().state = PipelineState::Idle;
        self.inner.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_admit_is_dropped() {
        let gate = FrameGate::new();
        let first = gate.admit(1).into_in_flight().unwrap();
        assert!(!gate.admit(2).is_admitted());
        assert_eq!(first.frame(), Some(&1));
        assert_eq!(gate.state(), PipelineState::Admitted);

        first.release();
        assert!(!gate.is_busy());
        assert!(gate.admit(3).is_admitted());
        assert_eq!(
            gate.stats(),
            GateStats {
                admitted: 2,
                dropped: 1,
                released: 2
            }
        );
    }

    #[test]
    fn test_cancelled_frame_keeps_the_slot() {
        let gate = FrameGate::new();
        let stale = gate.admit("old").into_in_flight().unwrap();
        assert!(gate.reset());
        assert!(stale.is_cancelled());
        assert!(!stale.advance(PipelineState::Inferring));
        assert_eq!(gate.state(), PipelineState::Cancelled);

        // No second frame may start while the cancelled one is still running
        assert!(!gate.admit("new").is_admitted());

        stale.release();
        assert!(!gate.is_busy());
        assert!(!gate.reset());
        let fresh = gate.admit("new").into_in_flight().unwrap();
        assert!(!fresh.is_cancelled());
        assert!(fresh.advance(PipelineState::Selecting));
        fresh.release();
        assert_eq!(gate.stats().in_flight(), 0);
    }

    #[test]
    fn test_cancel_by_ticket() {
        let gate = FrameGate::new();
        let first = gate.admit(()).into_in_flight().unwrap();
        let old_ticket = first.ticket();
        first.release();

        let second = gate.admit(()).into_in_flight().unwrap();
        assert_ne!(second.ticket(), old_ticket);
        // A finished admission's ticket no longer cancels anything
        assert!(!gate.cancel(old_ticket));
        assert!(!second.is_cancelled());

        assert!(gate.cancel(second.ticket()));
        assert!(second.is_cancelled());
    }

    #[test]
    fn test_release_frame_keeps_the_slot() {
        let gate = FrameGate::new();
        let mut in_flight = gate.admit(String::from("frame")).into_in_flight().unwrap();
        in_flight.release_frame();
        assert!(in_flight.frame().is_none());
        assert!(gate.is_busy());
        drop(in_flight);
        assert!(!gate.is_busy());
    }
}
