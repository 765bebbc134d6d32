//! Frame reassembly engine for optically-transferred payloads.
//!
//! An air-gapped signing device receives everything through the camera:
//! large payloads arrive split across multiple QR frames displayed in
//! rotation. This crate turns the raw stream of scanned frame strings —
//! unordered, duplicated, interleaved with background clutter — into
//! complete logical payloads for an external decoder.
//!
//! [`session::CaptureSession`] is the pure state machine;
//! [`service::CaptureService`] wraps it for async hosts, serializing all
//! mutation on one worker task. The probe and decoder collaborators plug
//! in through the traits in [`boundary`].

pub mod accumulator;
pub mod boundary;
pub mod queue;
pub mod service;
pub mod session;

pub use accumulator::FrameAccumulator;
pub use boundary::{DecodeError, ProbeError, SequenceDecoder, SequenceProbe};
pub use queue::PendingPayloadQueue;
pub use service::CaptureService;
pub use session::{CaptureSession, DecodeJob, IngestStep, Progress, Resolution};
