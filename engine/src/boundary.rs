use std::num::NonZeroUsize;

use qr_capture_common::frame::Frame;

/// Classifies a single frame: how many frames does the sequence it belongs
/// to contain?
///
/// Implementations see every first frame of a prospective capture,
/// including whatever unrelated QR content the camera happens to pass over,
/// so failure is normal operation and must be cheap.
pub trait SequenceProbe: Send + Sync {
    /// Expected frame count (>= 1) for the sequence `frame` belongs to.
    fn probe_total(&self, frame: &Frame) -> Result<NonZeroUsize, ProbeError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Reconstructs the logical payload from a completed frame set.
///
/// Frames arrive in first-seen order. Reconstruction may fail even when the
/// declared count was reached — a stray frame admitted mid-capture can
/// satisfy the count without the set being decodable.
pub trait SequenceDecoder: Send + Sync {
    fn decode_sequence(&self, frames: &[Frame]) -> Result<Vec<u8>, DecodeError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The frame does not belong to any recognized sequence format.
    #[error("unclassifiable frame")]
    Unclassifiable,
    /// The frame matched a known format but its header is inconsistent.
    #[error("malformed frame header: {0}")]
    MalformedHeader(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame set cannot be reconstructed into a payload.
    #[error("sequence reconstruction failed: {0}")]
    Reconstruction(String),
    /// Reconstruction produced bytes the decoder rejected on validation.
    #[error("payload validation failed: {0}")]
    Validation(String),
}
