pub mod framing;
pub mod pipeline;
pub mod record;

pub use framing::{FrameAssembler, Frames};
pub use pipeline::{Decoded, RecordPipeline};
pub use record::{decode, notification_text};
