use chrono::{DateTime, Utc};

/// A fully reconstructed logical payload, ready for hand-off to the
/// transaction processor.
///
/// The bytes are opaque at this layer — signature and format validation
/// belong to the decoder that produced them. The metadata rides along for
/// the host's signing-history display.
#[derive(Debug, Clone)]
pub struct DecodedPayload {
    data: Vec<u8>,
    frames_used: usize,
    decoded_at: DateTime<Utc>,
}

impl DecodedPayload {
    pub fn new(data: Vec<u8>, frames_used: usize) -> Self {
        Self {
            data,
            frames_used,
            decoded_at: Utc::now(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Number of distinct frames the sequence was reconstructed from.
    pub fn frames_used(&self) -> usize {
        self.frames_used
    }

    pub fn decoded_at(&self) -> DateTime<Utc> {
        self.decoded_at
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
