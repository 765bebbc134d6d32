use qr_capture_common::config::SessionConfig;
use qr_capture_common::frame::Frame;
use qr_capture_common::payload::DecodedPayload;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::accumulator::FrameAccumulator;
use crate::boundary::{DecodeError, SequenceProbe};

/// Capture progress for UI display. `total` is `None` until the first
/// frame of a sequence has been classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub captured: usize,
    pub total: Option<usize>,
}

impl Progress {
    pub const IDLE: Progress = Progress {
        captured: 0,
        total: None,
    };
}

/// A decode attempt to hand to the `SequenceDecoder`. Tagged with the
/// session generation it was issued from, so a result that outlives its
/// session is recognized as stale and dropped.
#[derive(Debug, Clone)]
pub struct DecodeJob {
    pub generation: u64,
    pub total: usize,
    /// The accumulated set in first-seen order.
    pub frames: Vec<Frame>,
}

/// Outcome of feeding one detection into the session.
#[derive(Debug)]
pub enum IngestStep {
    /// Nothing changed: duplicate, clutter, or a frame dropped at the
    /// growth bound. Never an error — a bad detection must not disturb an
    /// in-progress capture.
    Ignored,
    /// The frame was admitted; capture continues.
    Captured(Progress),
    /// The declared total is satisfied. Run this job through the decoder
    /// and feed the outcome back via [`CaptureSession::resolve_decode`].
    DecodeReady(DecodeJob),
}

/// Outcome of applying a decode result back into the session.
#[derive(Debug)]
pub enum Resolution {
    /// The job belonged to a session that has since been reset.
    Stale,
    /// Payload reconstructed; the session is idle again.
    Completed(DecodedPayload),
    /// Decode failed at the declared count. Capture holds its position and
    /// waits for a corrective frame; progress does not regress.
    AwaitingCorrection(Progress),
    /// Corrective frames arrived while the decode was in flight: run this
    /// follow-up job immediately.
    Retry(DecodeJob),
    /// A single-frame decode failed; the frame was discarded and the
    /// session is idle again.
    Discarded,
}

enum Phase {
    /// No frame classified yet; the accumulator is empty.
    Idle,
    /// Total known, waiting for the remaining distinct frames.
    Accumulating {
        total: usize,
        frames: FrameAccumulator,
        /// Distinct count at the last failed decode. A new decode fires
        /// only once the count moves past this.
        attempted: Option<usize>,
    },
    /// Count satisfied, decode in flight.
    Completing {
        total: usize,
        frames: FrameAccumulator,
        /// Distinct count when the in-flight job was issued.
        issued_at: usize,
    },
}

/// The capture state machine.
///
/// Owns at most one accumulator at a time and decides when a decode attempt
/// is due; it never calls the decoder itself, so a host can run decodes
/// wherever it likes (see `service` for the async arrangement). All methods
/// take `&mut self` — the caller provides the single-writer discipline.
pub struct CaptureSession {
    phase: Phase,
    /// Bumped on reset and on completion; decode jobs carry the value they
    /// were issued under.
    generation: u64,
    config: SessionConfig,
}

impl CaptureSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            phase: Phase::Idle,
            generation: 0,
            config,
        }
    }

    /// Feed one detection. Duplicates, clutter and over-bound frames are
    /// ignored without error.
    pub fn ingest(&mut self, frame: Frame, probe: &dyn SequenceProbe) -> IngestStep {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => self.probe_first_frame(frame, probe),
            Phase::Accumulating {
                total,
                mut frames,
                attempted,
            } => {
                if frames.contains(&frame) {
                    debug!(?frame, "duplicate frame re-scanned, ignoring");
                    self.phase = Phase::Accumulating {
                        total,
                        frames,
                        attempted,
                    };
                    return IngestStep::Ignored;
                }
                if frames.len() >= total + self.config.accumulator_margin {
                    debug!(
                        ?frame,
                        total,
                        margin = self.config.accumulator_margin,
                        "accumulator at growth bound, dropping frame"
                    );
                    self.phase = Phase::Accumulating {
                        total,
                        frames,
                        attempted,
                    };
                    return IngestStep::Ignored;
                }

                frames.insert(frame);
                let captured = frames.len();
                let due = captured >= total && attempted.map_or(true, |a| captured > a);
                if due {
                    info!(captured, total, "sequence complete, decode due");
                    let job = DecodeJob {
                        generation: self.generation,
                        total,
                        frames: frames.frames().to_vec(),
                    };
                    self.phase = Phase::Completing {
                        total,
                        frames,
                        issued_at: captured,
                    };
                    IngestStep::DecodeReady(job)
                } else {
                    debug!(captured, total, "frame captured");
                    self.phase = Phase::Accumulating {
                        total,
                        frames,
                        attempted,
                    };
                    IngestStep::Captured(progress_of(total, captured))
                }
            }
            Phase::Completing {
                total,
                mut frames,
                issued_at,
            } => {
                // A decode is in flight; keep admitting corrective material
                // but never issue a second job alongside it.
                if frames.contains(&frame)
                    || frames.len() >= total + self.config.accumulator_margin
                {
                    self.phase = Phase::Completing {
                        total,
                        frames,
                        issued_at,
                    };
                    return IngestStep::Ignored;
                }
                frames.insert(frame);
                let captured = frames.len();
                debug!(captured, total, "frame captured while decode in flight");
                self.phase = Phase::Completing {
                    total,
                    frames,
                    issued_at,
                };
                IngestStep::Captured(progress_of(total, captured))
            }
        }
    }

    fn probe_first_frame(&mut self, frame: Frame, probe: &dyn SequenceProbe) -> IngestStep {
        let total = match probe.probe_total(&frame) {
            Ok(n) => n.get(),
            Err(e) => {
                // The camera sees background clutter constantly; an
                // unclassifiable frame is normal operation.
                debug!(probe = probe.name(), error = %e, ?frame, "unclassifiable frame, ignoring");
                return IngestStep::Ignored;
            }
        };
        if total > self.config.max_declared_total {
            warn!(
                total,
                max = self.config.max_declared_total,
                "declared total beyond configured bound, treating probe result as corrupt"
            );
            return IngestStep::Ignored;
        }

        let mut frames = FrameAccumulator::new();
        frames.insert(frame);

        if total == 1 {
            // Single-frame sequence: no accumulation, decode straight away.
            debug!("single-frame sequence, decode due");
            let job = DecodeJob {
                generation: self.generation,
                total,
                frames: frames.frames().to_vec(),
            };
            self.phase = Phase::Completing {
                total,
                frames,
                issued_at: 1,
            };
            IngestStep::DecodeReady(job)
        } else {
            info!(total, "first frame classified, capture started");
            self.phase = Phase::Accumulating {
                total,
                frames,
                attempted: None,
            };
            IngestStep::Captured(progress_of(total, 1))
        }
    }

    /// Apply a decode outcome. `generation` is the tag carried by the job;
    /// a result from a session that has since been reset comes back as
    /// [`Resolution::Stale`] and changes nothing.
    pub fn resolve_decode(
        &mut self,
        generation: u64,
        outcome: Result<Vec<u8>, DecodeError>,
    ) -> Resolution {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "stale decode result, discarding"
            );
            return Resolution::Stale;
        }

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Completing {
                total,
                frames,
                issued_at,
            } => match outcome {
                Ok(data) => {
                    let payload = DecodedPayload::new(data, issued_at);
                    info!(
                        total,
                        frames = issued_at,
                        bytes = payload.size(),
                        "sequence decoded"
                    );
                    self.generation += 1;
                    Resolution::Completed(payload)
                }
                Err(e) if total == 1 => {
                    // A stray static code that probed as a one-frame
                    // sequence; nothing captured is worth keeping.
                    debug!(error = %e, "single-frame decode failed, back to idle");
                    self.generation += 1;
                    Resolution::Discarded
                }
                Err(e) if frames.len() > issued_at => {
                    // Corrective frames already arrived during the flight.
                    warn!(
                        error = %e,
                        captured = frames.len(),
                        total,
                        "decode failed at declared total, retrying with corrective frames"
                    );
                    let issued_at = frames.len();
                    let job = DecodeJob {
                        generation: self.generation,
                        total,
                        frames: frames.frames().to_vec(),
                    };
                    self.phase = Phase::Completing {
                        total,
                        frames,
                        issued_at,
                    };
                    Resolution::Retry(job)
                }
                Err(e) => {
                    // The count was satisfied but the set is not decodable —
                    // a stray frame was admitted and cannot be told apart
                    // from the good ones here. Hold position; a corrective
                    // re-scan or a user reset resolves it.
                    warn!(
                        error = %e,
                        captured = frames.len(),
                        total,
                        "decode failed at declared total, awaiting corrective frame"
                    );
                    let progress = progress_of(total, frames.len());
                    self.phase = Phase::Accumulating {
                        total,
                        frames,
                        attempted: Some(issued_at),
                    };
                    Resolution::AwaitingCorrection(progress)
                }
            },
            other => {
                // Same generation but no decode in flight: nothing to apply.
                self.phase = other;
                Resolution::Stale
            }
        }
    }

    /// Abandon the capture in progress. Any in-flight decode becomes stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        if !matches!(self.phase, Phase::Idle) {
            info!("capture reset");
        }
        self.phase = Phase::Idle;
    }

    /// Current progress snapshot. Side-effect free.
    pub fn progress(&self) -> Progress {
        match &self.phase {
            Phase::Idle => Progress::IDLE,
            Phase::Accumulating { total, frames, .. }
            | Phase::Completing { total, frames, .. } => progress_of(*total, frames.len()),
        }
    }

    /// True when no capture is in progress.
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Corrective frames past the declared total stay invisible to the UI:
/// progress neither regresses nor overshoots.
fn progress_of(total: usize, captured: usize) -> Progress {
    Progress {
        captured: captured.min(total),
        total: Some(total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::ProbeError;
    use std::collections::HashMap;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe that classifies frames by a fixed prefix table and counts its
    /// invocations.
    struct TableProbe {
        totals: HashMap<&'static str, usize>,
        calls: AtomicUsize,
    }

    impl TableProbe {
        fn new(entries: &[(&'static str, usize)]) -> Self {
            Self {
                totals: entries.iter().copied().collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SequenceProbe for TableProbe {
        fn probe_total(&self, frame: &Frame) -> Result<NonZeroUsize, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.totals
                .iter()
                .find(|(prefix, _)| frame.as_str().starts_with(*prefix))
                .and_then(|(_, n)| NonZeroUsize::new(*n))
                .ok_or(ProbeError::Unclassifiable)
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    fn frame(s: &str) -> Frame {
        Frame::from_detection(s).unwrap()
    }

    fn session() -> CaptureSession {
        CaptureSession::new(SessionConfig::default())
    }

    fn frame_strings(job: &DecodeJob) -> Vec<&str> {
        job.frames.iter().map(|f| f.as_str()).collect()
    }

    #[test]
    fn clutter_ignored_while_idle() {
        let probe = TableProbe::new(&[("A", 3)]);
        let mut session = session();
        assert!(matches!(
            session.ingest(frame("not-a-sequence"), &probe),
            IngestStep::Ignored
        ));
        assert!(session.is_idle());
        assert_eq!(session.progress(), Progress::IDLE);
    }

    #[test]
    fn rescan_of_same_frame_is_idempotent() {
        let probe = TableProbe::new(&[("A", 3)]);
        let mut session = session();
        session.ingest(frame("A1"), &probe);
        let before = session.progress();
        assert!(matches!(
            session.ingest(frame("A1"), &probe),
            IngestStep::Ignored
        ));
        assert_eq!(session.progress(), before);
        assert_eq!(before.captured, 1);
        assert_eq!(before.total, Some(3));
    }

    #[test]
    fn three_frame_capture_decodes_in_first_seen_order() {
        let probe = TableProbe::new(&[("A", 3)]);
        let mut session = session();

        session.ingest(frame("A1"), &probe);
        session.ingest(frame("A1"), &probe); // camera lingering
        session.ingest(frame("A2"), &probe);
        assert_eq!(session.progress().captured, 2);

        let job = match session.ingest(frame("A3"), &probe) {
            IngestStep::DecodeReady(job) => job,
            other => panic!("expected decode at declared total, got {other:?}"),
        };
        assert_eq!(frame_strings(&job), vec!["A1", "A2", "A3"]);

        let payload = match session.resolve_decode(job.generation, Ok(vec![0xAA])) {
            Resolution::Completed(payload) => payload,
            other => panic!("expected completion, got {other:?}"),
        };
        assert_eq!(payload.data(), &[0xAA]);
        assert_eq!(payload.frames_used(), 3);
        assert_eq!(session.progress(), Progress::IDLE);
    }

    #[test]
    fn completion_is_order_independent() {
        let probe = TableProbe::new(&[("A", 3)]);
        let mut session = session();
        session.ingest(frame("A3"), &probe);
        session.ingest(frame("A1"), &probe);
        let IngestStep::DecodeReady(job) = session.ingest(frame("A2"), &probe) else {
            panic!("expected decode at third distinct frame");
        };
        // First-seen order, not any intrinsic order.
        assert_eq!(frame_strings(&job), vec!["A3", "A1", "A2"]);
    }

    #[test]
    fn single_frame_sequence_skips_accumulating() {
        let probe = TableProbe::new(&[("S", 1)]);
        let mut session = session();
        let step = session.ingest(frame("S"), &probe);
        let IngestStep::DecodeReady(job) = step else {
            panic!("expected immediate decode for total == 1");
        };
        assert_eq!(job.total, 1);
        assert_eq!(frame_strings(&job), vec!["S"]);

        let resolution = session.resolve_decode(job.generation, Ok(vec![1, 2]));
        assert!(matches!(resolution, Resolution::Completed(_)));
        assert!(session.is_idle());
    }

    #[test]
    fn single_frame_decode_failure_returns_to_idle() {
        let probe = TableProbe::new(&[("S", 1)]);
        let mut session = session();
        let IngestStep::DecodeReady(job) = session.ingest(frame("S"), &probe) else {
            panic!("expected immediate decode");
        };
        let resolution = session.resolve_decode(
            job.generation,
            Err(DecodeError::Reconstruction("garbage".into())),
        );
        assert!(matches!(resolution, Resolution::Discarded));
        assert!(session.is_idle());

        // The session probes fresh sequences again afterwards.
        let probe2 = TableProbe::new(&[("A", 2)]);
        assert!(matches!(
            session.ingest(frame("A1"), &probe2),
            IngestStep::Captured(_)
        ));
    }

    #[test]
    fn reset_clears_everything_and_reprobes() {
        let probe = TableProbe::new(&[("A", 3)]);
        let mut session = session();
        session.ingest(frame("A1"), &probe);
        session.ingest(frame("A2"), &probe);
        assert_eq!(probe.calls(), 1);

        session.reset();
        assert_eq!(session.progress(), Progress::IDLE);

        // A previously-accumulated frame is a fresh first frame now.
        let step = session.ingest(frame("A1"), &probe);
        assert!(matches!(step, IngestStep::Captured(_)));
        assert_eq!(probe.calls(), 2);
        assert_eq!(session.progress().captured, 1);
    }

    #[test]
    fn stale_decode_result_after_reset_changes_nothing() {
        let probe = TableProbe::new(&[("A", 2), ("B", 2)]);
        let mut session = session();
        session.ingest(frame("A1"), &probe);
        let IngestStep::DecodeReady(job) = session.ingest(frame("A2"), &probe) else {
            panic!("expected decode");
        };

        session.reset();
        session.ingest(frame("B1"), &probe);

        let resolution = session.resolve_decode(job.generation, Ok(vec![9]));
        assert!(matches!(resolution, Resolution::Stale));
        // The new capture is untouched.
        assert_eq!(session.progress().captured, 1);
        assert_eq!(session.progress().total, Some(2));
    }

    #[test]
    fn stale_after_completion_too() {
        let probe = TableProbe::new(&[("S", 1)]);
        let mut session = session();
        let IngestStep::DecodeReady(job) = session.ingest(frame("S"), &probe) else {
            panic!("expected decode");
        };
        assert!(matches!(
            session.resolve_decode(job.generation, Ok(vec![1])),
            Resolution::Completed(_)
        ));
        // A duplicate delivery of the same outcome must not complete twice.
        assert!(matches!(
            session.resolve_decode(job.generation, Ok(vec![1])),
            Resolution::Stale
        ));
    }

    #[test]
    fn decode_failure_holds_position_until_corrective_frame() {
        let probe = TableProbe::new(&[("A", 3)]);
        let mut session = session();
        session.ingest(frame("A1"), &probe);
        session.ingest(frame("stray"), &probe); // admitted unprobed mid-capture
        let IngestStep::DecodeReady(job) = session.ingest(frame("A2"), &probe) else {
            panic!("expected decode at declared total");
        };

        let progress = match session.resolve_decode(
            job.generation,
            Err(DecodeError::Reconstruction("missing chunk".into())),
        ) {
            Resolution::AwaitingCorrection(progress) => progress,
            other => panic!("expected the session to hold position, got {other:?}"),
        };
        assert_eq!(progress.captured, 3);
        assert_eq!(progress.total, Some(3));

        // A duplicate does not re-trigger the decoder.
        assert!(matches!(
            session.ingest(frame("A2"), &probe),
            IngestStep::Ignored
        ));

        // The corrective frame does.
        let IngestStep::DecodeReady(job) = session.ingest(frame("A3"), &probe) else {
            panic!("expected retry once a new distinct frame arrived");
        };
        assert_eq!(frame_strings(&job), vec!["A1", "stray", "A2", "A3"]);
    }

    #[test]
    fn corrective_frame_during_flight_retries_immediately() {
        let probe = TableProbe::new(&[("A", 2)]);
        let mut session = session();
        session.ingest(frame("A1"), &probe);
        let IngestStep::DecodeReady(job) = session.ingest(frame("A2"), &probe) else {
            panic!("expected decode");
        };

        // Another distinct frame lands while the decode is in flight.
        assert!(matches!(
            session.ingest(frame("A3"), &probe),
            IngestStep::Captured(_)
        ));

        let retry = match session.resolve_decode(
            job.generation,
            Err(DecodeError::Reconstruction("bad set".into())),
        ) {
            Resolution::Retry(retry) => retry,
            other => panic!("expected immediate retry, got {other:?}"),
        };
        assert_eq!(frame_strings(&retry), vec!["A1", "A2", "A3"]);
    }

    #[test]
    fn growth_bound_drops_excess_frames() {
        let probe = TableProbe::new(&[("A", 2)]);
        let config = SessionConfig {
            accumulator_margin: 1,
            ..SessionConfig::default()
        };
        let mut session = CaptureSession::new(config);

        session.ingest(frame("A1"), &probe);
        let IngestStep::DecodeReady(job) = session.ingest(frame("A2"), &probe) else {
            panic!("expected decode");
        };
        session.resolve_decode(
            job.generation,
            Err(DecodeError::Reconstruction("bad set".into())),
        );

        // One corrective frame fits within the margin...
        let IngestStep::DecodeReady(job) = session.ingest(frame("A3"), &probe) else {
            panic!("expected retry");
        };
        session.resolve_decode(
            job.generation,
            Err(DecodeError::Reconstruction("still bad".into())),
        );

        // ...but the accumulator never grows past total + margin.
        assert!(matches!(
            session.ingest(frame("A4"), &probe),
            IngestStep::Ignored
        ));
        assert_eq!(session.progress().captured, 2); // clamped to total
    }

    #[test]
    fn corrupt_probe_total_is_ignored() {
        let probe = TableProbe::new(&[("A", 1_000_000)]);
        let mut session = session();
        assert!(matches!(
            session.ingest(frame("A1"), &probe),
            IngestStep::Ignored
        ));
        assert!(session.is_idle());
    }

    #[test]
    fn progress_clamps_during_correction_window() {
        let probe = TableProbe::new(&[("A", 2)]);
        let mut session = session();
        session.ingest(frame("A1"), &probe);
        let IngestStep::DecodeReady(_job) = session.ingest(frame("A2"), &probe) else {
            panic!("expected decode");
        };
        session.ingest(frame("A3"), &probe);
        // Three distinct frames held, but the UI sees at most 2/2.
        assert_eq!(session.progress().captured, 2);
    }
}
