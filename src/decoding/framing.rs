/// Newline framing for the serial byte stream
use log::{debug, warn};

/// Lines the firmware prints that are not records (boot ROM banner, status echoes)
pub const DEFAULT_MARKERS: [&str; 3] = ["ESP-ROM", "Starting", "Sent"];

pub const DEFAULT_MAX_LINE_BYTES: usize = 1024;

/// Result of feeding one chunk
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Frames {
    pub lines: Vec<String>,
    pub filtered: usize,
    pub overflows: usize,
}

/// Reassembles newline-delimited records from arbitrary byte chunks
///
/// Splitting happens on raw bytes, so a multi-byte character cut by a chunk
/// boundary is decoded once the whole line is present. When the carry-over
/// grows past `max_line_bytes` without a newline it is dropped and everything
/// up to the next newline is skipped.
#[derive(Debug)]
pub struct FrameAssembler {
    carry: Vec<u8>,
    resyncing: bool,
    max_line_bytes: usize,
    markers: Vec<String>,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl FrameAssembler {
    pub fn new(max_line_bytes: usize) -> Self {
        Self::with_markers(
            max_line_bytes,
            DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
        )
    }

    pub fn with_markers(max_line_bytes: usize, markers: Vec<String>) -> Self {
        FrameAssembler {
            carry: Vec::new(),
            resyncing: false,
            max_line_bytes: max_line_bytes.max(1),
            markers,
        }
    }

    /// Append a chunk and return the complete lines it finished
    pub fn feed(&mut self, chunk: &[u8]) -> Frames {
        let mut frames = Frames::default();

        let mut segments = chunk.split(|b| *b == b'\n');
        // `split` always yields at least one segment; the last one has no
        // terminating newline and becomes the new carry-over.
        let mut current = segments.next().unwrap_or_default();
        for next in segments {
            self.complete_line(current, &mut frames);
            current = next;
        }
        self.extend_carry(current, &mut frames);

        frames
    }

    /// Drop any partial line, e.g. when a new session starts
    pub fn reset(&mut self) {
        self.carry.clear();
        self.resyncing = false;
    }

    /// Bytes currently held waiting for a newline
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    fn complete_line(&mut self, tail: &[u8], frames: &mut Frames) {
        if self.resyncing {
            // The newline ending the oversized line: resume with the next one.
            self.resyncing = false;
            self.carry.clear();
            return;
        }

        self.extend_carry(tail, frames);
        if self.resyncing {
            self.resyncing = false;
            self.carry.clear();
            return;
        }

        let line = String::from_utf8_lossy(&self.carry).trim().to_string();
        self.carry.clear();

        if line.is_empty() {
            return;
        }
        if let Some(marker) = self.markers.iter().find(|m| line.contains(m.as_str())) {
            debug!("Skipping non-data line ({}): {:?}", marker, line);
            frames.filtered += 1;
            return;
        }
        frames.lines.push(line);
    }

    fn extend_carry(&mut self, bytes: &[u8], frames: &mut Frames) {
        if self.resyncing {
            return;
        }
        if self.carry.len() + bytes.len() > self.max_line_bytes {
            warn!(
                "Line exceeded {} bytes without a newline, discarding and resyncing",
                self.max_line_bytes
            );
            self.carry.clear();
            self.resyncing = true;
            frames.overflows += 1;
            return;
        }
        self.carry.extend_from_slice(bytes);
    }
}
