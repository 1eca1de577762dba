pub mod detection;
pub mod frame;

pub use detection::{BoundingBox, Category, DetectionBatch, EnrichedDetection, RawDetection};
pub use frame::{EncodedFrame, Resolution};
