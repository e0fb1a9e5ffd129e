use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{info, warn};

use crate::classifier::{Admission, ClassificationPipeline, ClassificationResult, InFlight, RawFrame};

/// What happened to a frame handed to [`StreamWorker::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Admitted and handed to the analyzer thread
    Queued,
    /// Rejected because a frame was already in flight; released immediately
    Dropped,
    /// Analysis is switched off; released immediately
    Skipped,
}

/// Background analysis context for a live frame source.
///
/// The camera thread calls [`offer`](Self::offer), which never blocks: the
/// frame either takes the pipeline's single slot and moves to the analyzer
/// thread, or it is released on the spot. Results reach `on_result` on the
/// analyzer thread in admission order.
pub struct StreamWorker {
    pipeline: Arc<ClassificationPipeline>,
    mailbox: Option<SyncSender<InFlight<RawFrame>>>,
    handle: Option<JoinHandle<()>>,
    /// Ticket of the last frame this worker queued, 0 before the first
    last_ticket: AtomicU64,
}

impl StreamWorker {
    pub fn spawn<F>(pipeline: Arc<ClassificationPipeline>, mut on_result: F) -> io::Result<Self>
    where
        F: FnMut(&ClassificationResult) + Send + 'static,
    {
        let (mailbox, inbox) = mpsc::sync_channel::<InFlight<RawFrame>>(1);
        let analyzer = Arc::clone(&pipeline);
        let handle = thread::Builder::new()
            .name("plugscan-analyzer".to_string())
            .spawn(move || {
                info!("Analyzer started");
                for in_flight in inbox {
                    analyzer.process(in_flight, &mut on_result);
                }
                info!("Analyzer stopped");
            })?;

        Ok(Self {
            pipeline,
            mailbox: Some(mailbox),
            handle: Some(handle),
            last_ticket: AtomicU64::new(0),
        })
    }

    pub fn offer(&self, frame: RawFrame) -> Offer {
        let Some(mailbox) = &self.mailbox else {
            return Offer::Dropped;
        };
        match self.pipeline.admit(frame) {
            None => Offer::Skipped,
            Some(Admission::Dropped) => Offer::Dropped,
            Some(Admission::Admitted(in_flight)) => {
                self.last_ticket.store(in_flight.ticket(), Ordering::SeqCst);
                match mailbox.try_send(in_flight) {
                    Ok(()) => Offer::Queued,
                    Err(TrySendError::Full(in_flight)) | Err(TrySendError::Disconnected(in_flight)) => {
                        warn!("Analyzer unavailable, releasing frame");
                        in_flight.release();
                        Offer::Dropped
                    }
                }
            }
        }
    }

    pub fn pipeline(&self) -> &Arc<ClassificationPipeline> {
        &self.pipeline
    }

    /// Cancels this worker's frame in flight, closes the mailbox and waits for the analyzer thread.
    ///
    /// A forward pass that is already running finishes first; its result is discarded.
    /// Frames submitted to the shared pipeline by other callers are not affected.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let ticket = self.last_ticket.load(Ordering::SeqCst);
        if ticket != 0 {
            self.pipeline.cancel_frame(ticket);
        }
        self.mailbox.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Analyzer thread panicked");
            }
        }
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
