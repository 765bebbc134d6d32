use std::num::NonZeroUsize;

use qr_capture_common::frame::Frame;
use qr_capture_engine::boundary::{DecodeError, ProbeError, SequenceDecoder, SequenceProbe};
use tracing::debug;

/// One frame of the indexed text format: `total/index:chunk`.
///
/// This is the demo collaborator for the replay harness. A production host
/// plugs its own codec in at the same boundary — the engine never looks
/// inside a frame.
#[derive(Debug, PartialEq, Eq)]
pub struct TextFrame {
    pub total: usize,
    pub index: usize,
    pub chunk: String,
}

impl TryFrom<&str> for TextFrame {
    type Error = FrameParseError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let (header, chunk) = s.split_once(':').ok_or(FrameParseError::MissingDelimiter)?;
        let (total, index) = header
            .split_once('/')
            .ok_or(FrameParseError::MissingDelimiter)?;
        let total: usize = total.parse().map_err(|_| FrameParseError::BadNumber)?;
        let index: usize = index.parse().map_err(|_| FrameParseError::BadNumber)?;
        if total == 0 {
            return Err(FrameParseError::ZeroTotal);
        }
        if index >= total {
            return Err(FrameParseError::IndexOutOfRange { index, total });
        }
        Ok(Self {
            total,
            index,
            chunk: chunk.to_string(),
        })
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameParseError {
    #[error("missing header delimiter")]
    MissingDelimiter,
    #[error("unparsable frame number")]
    BadNumber,
    #[error("declared total of zero")]
    ZeroTotal,
    #[error("frame index {index} out of range for total {total}")]
    IndexOutOfRange { index: usize, total: usize },
}

/// Probe for the indexed text format.
pub struct TextFrameProbe;

impl SequenceProbe for TextFrameProbe {
    fn probe_total(&self, frame: &Frame) -> Result<NonZeroUsize, ProbeError> {
        match TextFrame::try_from(frame.as_str()) {
            Ok(parsed) => NonZeroUsize::new(parsed.total)
                .ok_or_else(|| ProbeError::MalformedHeader("zero total".into())),
            Err(e @ (FrameParseError::ZeroTotal | FrameParseError::IndexOutOfRange { .. })) => {
                Err(ProbeError::MalformedHeader(e.to_string()))
            }
            Err(_) => Err(ProbeError::Unclassifiable),
        }
    }

    fn name(&self) -> &str {
        "text-frame"
    }
}

/// Decoder for the indexed text format: orders chunks by index and joins
/// them.
///
/// Frames foreign to the sequence can legitimately sit in the set (a stray
/// detection admitted mid-capture), so they are skipped rather than fatal —
/// that way a corrective re-scan can still complete the sequence.
pub struct TextFrameDecoder;

impl SequenceDecoder for TextFrameDecoder {
    fn decode_sequence(&self, frames: &[Frame]) -> Result<Vec<u8>, DecodeError> {
        let mut chunks: Vec<Option<String>> = Vec::new();
        let mut declared: Option<usize> = None;
        let mut skipped = 0usize;

        for frame in frames {
            let Ok(parsed) = TextFrame::try_from(frame.as_str()) else {
                skipped += 1;
                continue;
            };
            // The first parsable frame pins the sequence; frames of the
            // same format but a different total belong to someone else.
            let total = *declared.get_or_insert(parsed.total);
            if parsed.total != total {
                skipped += 1;
                continue;
            }
            if chunks.is_empty() {
                chunks.resize(total, None);
            }
            match &chunks[parsed.index] {
                None => chunks[parsed.index] = Some(parsed.chunk),
                Some(existing) if *existing != parsed.chunk => {
                    return Err(DecodeError::Reconstruction(format!(
                        "conflicting contents for chunk {}",
                        parsed.index
                    )));
                }
                Some(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(skipped, "ignored frames foreign to the sequence");
        }

        let total = declared
            .ok_or_else(|| DecodeError::Reconstruction("no usable frames in set".into()))?;
        let mut out = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            match chunk {
                Some(c) => out.extend_from_slice(c.as_bytes()),
                None => {
                    return Err(DecodeError::Reconstruction(format!(
                        "missing chunk {index} of {total}"
                    )))
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "text-frame"
    }
}
