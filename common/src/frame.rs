use std::fmt;
use std::sync::Arc;

/// How much frame content the Debug impl shows before truncating.
const DEBUG_PREVIEW_CHARS: usize = 24;

/// One successfully scanned QR code's decoded string content.
///
/// A frame is both the dedup key of the accumulator and the input to the
/// sequence decoder, so it is shared rather than copied: cloning is a
/// reference-count bump. Equality and hashing are by content — the same
/// physical code scanned twice yields equal frames.
///
/// Frames carry no sequence index visible to this layer; membership in a
/// sequence is established only by a successful decode.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame(Arc<str>);

impl Frame {
    /// Wrap one detection's string content, trimming surrounding
    /// whitespace. Empty detections are rejected here so no later layer
    /// has to re-check.
    pub fn from_detection(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(Arc::from(trimmed)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Frame {
    /// Frames are usually long hex blobs; keep log lines readable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.chars().count() <= DEBUG_PREVIEW_CHARS {
            write!(f, "Frame({:?})", &*self.0)
        } else {
            let preview: String = self.0.chars().take(DEBUG_PREVIEW_CHARS).collect();
            write!(f, "Frame({:?}.. {} bytes)", preview, self.0.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_detection_rejected() {
        assert!(Frame::from_detection("").is_none());
        assert!(Frame::from_detection("   \n").is_none());
    }

    #[test]
    fn surrounding_whitespace_trimmed() {
        let frame = Frame::from_detection(" 40438800040a \n").unwrap();
        assert_eq!(frame.as_str(), "40438800040a");
    }

    #[test]
    fn equality_is_by_content() {
        let a = Frame::from_detection("abc123").unwrap();
        let b = Frame::from_detection("abc123").unwrap();
        let c = Frame::from_detection("abc124").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn debug_truncates_long_content() {
        let long = "ab".repeat(100);
        let frame = Frame::from_detection(&long).unwrap();
        let dbg = format!("{frame:?}");
        assert!(dbg.len() < long.len());
        assert!(dbg.contains("200 bytes"));
    }
}
