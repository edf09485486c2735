use log::{debug, warn};

use crate::decoding::framing::FrameAssembler;
use crate::decoding::record::{decode, notification_text};
use crate::models::Reading;
use crate::transport::Payload;

/// Everything one payload produced
#[derive(Debug, Default)]
pub struct Decoded {
    pub readings: Vec<Reading>,
    pub rejected: usize,
    pub filtered: usize,
    pub overflows: usize,
}

/// Turns transport payloads into readings
///
/// Serial chunks go through the frame assembler first; a BLE notification
/// always carries exactly one record.
#[derive(Debug)]
pub struct RecordPipeline {
    assembler: FrameAssembler,
}

impl RecordPipeline {
    pub fn new(max_line_bytes: usize) -> Self {
        RecordPipeline {
            assembler: FrameAssembler::new(max_line_bytes),
        }
    }

    pub fn process(&mut self, payload: &Payload) -> Decoded {
        let mut decoded = Decoded::default();

        let records = match payload {
            Payload::Notification(bytes) => match notification_text(bytes) {
                Ok(text) => vec![text],
                Err(e) => {
                    warn!("Dropping BLE notification: {}", e);
                    decoded.rejected += 1;
                    return decoded;
                }
            },
            Payload::Chunk(bytes) => {
                let frames = self.assembler.feed(bytes);
                decoded.filtered = frames.filtered;
                decoded.overflows = frames.overflows;
                frames.lines
            }
        };

        for record in records {
            match decode(&record) {
                Ok(reading) => decoded.readings.push(reading),
                Err(e) => {
                    debug!("Dropping record {:?}: {}", record, e);
                    decoded.rejected += 1;
                }
            }
        }

        decoded
    }

    pub fn reset(&mut self) {
        self.assembler.reset();
    }
}
