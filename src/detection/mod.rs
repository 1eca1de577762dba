pub mod client;
pub mod session_tag;

pub use client::{
    DetectionClient, DetectionRequest, DetectionResponse, DetectionService, HttpDetectionService,
    UPLOAD_PATH,
};
pub use session_tag::SessionTag;
