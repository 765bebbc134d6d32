use std::sync::Arc;

use qr_capture_common::config::Config;
use qr_capture_common::frame::Frame;
use qr_capture_common::payload::DecodedPayload;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::boundary::{DecodeError, SequenceDecoder, SequenceProbe};
use crate::queue::PendingPayloadQueue;
use crate::session::{CaptureSession, DecodeJob, IngestStep, Progress, Resolution};

enum Command {
    Ingest(Frame),
    Reset,
    DecodeFinished {
        generation: u64,
        outcome: Result<Vec<u8>, DecodeError>,
    },
}

/// Async host wrapper around [`CaptureSession`].
///
/// One worker task owns the session; every mutation flows through its
/// command channel, so the read-modify-write inside `ingest` is naturally
/// serialized. The probe runs inline on the worker (classification is
/// cheap); decodes run on the blocking pool and post their result back as
/// a command tagged with the issuing generation, so a result that lands
/// after a reset is recognized as stale and dropped.
pub struct CaptureService {
    cmd_tx: mpsc::Sender<Command>,
    progress_rx: watch::Receiver<Progress>,
    queue: Arc<PendingPayloadQueue>,
    worker: JoinHandle<()>,
}

impl CaptureService {
    /// Start the worker task.
    pub fn spawn<P, D>(probe: P, decoder: Arc<D>, config: &Config) -> Self
    where
        P: SequenceProbe + 'static,
        D: SequenceDecoder + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.channel.detection_buffer.max(1));
        let (progress_tx, progress_rx) = watch::channel(Progress::IDLE);
        let queue = Arc::new(PendingPayloadQueue::new());
        let session = CaptureSession::new(config.session.clone());
        let decoder: Arc<dyn SequenceDecoder> = decoder;

        let worker = tokio::spawn(run_worker(
            session,
            Box::new(probe),
            decoder,
            cmd_rx,
            progress_tx,
            Arc::clone(&queue),
        ));

        Self {
            cmd_tx,
            progress_rx,
            queue,
            worker,
        }
    }

    /// Feed one raw detection string. Non-blocking: when the worker is
    /// saturated the detection is dropped — the camera re-detects the same
    /// code several times per second, so drops heal themselves.
    pub fn ingest(&self, raw_detection: &str) {
        let Some(frame) = Frame::from_detection(raw_detection) else {
            debug!("empty detection, ignoring");
            return;
        };
        if let Err(e) = self.cmd_tx.try_send(Command::Ingest(frame)) {
            debug!(error = %e, "worker saturated, dropping detection");
        }
    }

    /// Abandon the capture in progress. Unlike `ingest` this waits for
    /// channel capacity — a user cancel must never be lost to backpressure.
    pub async fn reset(&self) {
        if self.cmd_tx.send(Command::Reset).await.is_err() {
            warn!("reset requested after worker shutdown");
        }
    }

    /// Latest progress snapshot; safe to poll from any task.
    pub fn progress(&self) -> Progress {
        *self.progress_rx.borrow()
    }

    /// A receiver the UI can await changes on instead of polling.
    pub fn progress_watch(&self) -> watch::Receiver<Progress> {
        self.progress_rx.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Hand the captured payloads to the transaction processor, in capture
    /// order. Atomic with respect to a decode completing concurrently.
    pub fn drain_pending(&self) -> Vec<DecodedPayload> {
        self.queue.drain_all()
    }

    /// Close the command channel and wait for the worker to finish. Any
    /// in-flight decode result is dropped.
    pub async fn shutdown(self) {
        drop(self.cmd_tx);
        if let Err(e) = self.worker.await {
            error!(error = %e, "capture worker panicked");
        }
    }
}

async fn run_worker(
    mut session: CaptureSession,
    probe: Box<dyn SequenceProbe>,
    decoder: Arc<dyn SequenceDecoder>,
    mut cmd_rx: mpsc::Receiver<Command>,
    progress_tx: watch::Sender<Progress>,
    queue: Arc<PendingPayloadQueue>,
) {
    // Decode results come back on their own channel so they can be applied
    // while further detections queue behind them.
    let (done_tx, mut done_rx) = mpsc::channel::<Command>(2);

    info!(
        probe = probe.name(),
        decoder = decoder.name(),
        "capture worker started"
    );

    loop {
        let cmd = tokio::select! {
            // Host commands outrank decode results: a reset queued while a
            // decode lands must be applied first, so the result goes stale.
            biased;
            cmd = cmd_rx.recv() => match cmd {
                Some(c) => c,
                // Host dropped the service.
                None => break,
            },
            done = done_rx.recv() => match done {
                Some(c) => c,
                // Unreachable while done_tx is held below, but harmless.
                None => break,
            },
        };

        match cmd {
            Command::Ingest(frame) => match session.ingest(frame, probe.as_ref()) {
                IngestStep::Ignored | IngestStep::Captured(_) => {}
                IngestStep::DecodeReady(job) => spawn_decode(job, &decoder, &done_tx),
            },
            Command::Reset => session.reset(),
            Command::DecodeFinished {
                generation,
                outcome,
            } => match session.resolve_decode(generation, outcome) {
                Resolution::Stale
                | Resolution::AwaitingCorrection(_)
                | Resolution::Discarded => {}
                Resolution::Completed(payload) => {
                    queue.append(payload);
                    info!(pending = queue.len(), "payload queued for processing");
                }
                Resolution::Retry(job) => spawn_decode(job, &decoder, &done_tx),
            },
        }

        let progress = session.progress();
        progress_tx.send_if_modified(|current| {
            if *current == progress {
                false
            } else {
                *current = progress;
                true
            }
        });
    }

    debug!("capture worker stopped");
}

fn spawn_decode(job: DecodeJob, decoder: &Arc<dyn SequenceDecoder>, done_tx: &mpsc::Sender<Command>) {
    let decoder = Arc::clone(decoder);
    let done_tx = done_tx.clone();
    debug!(
        generation = job.generation,
        frames = job.frames.len(),
        total = job.total,
        "decode dispatched"
    );

    tokio::spawn(async move {
        let DecodeJob {
            generation, frames, ..
        } = job;
        let outcome =
            match tokio::task::spawn_blocking(move || decoder.decode_sequence(&frames)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "decode task failed");
                    Err(DecodeError::Reconstruction("decoder panicked".into()))
                }
            };
        // A closed channel means the worker is gone; the result is moot.
        let _ = done_tx
            .send(Command::DecodeFinished {
                generation,
                outcome,
            })
            .await;
    });
}
