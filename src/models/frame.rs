use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A sampled frame compressed to JPEG at the sampling resolution.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub resolution: Resolution,
}

impl EncodedFrame {
    /// Bare base64 (no `data:` prefix), as the upload endpoint expects.
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.jpeg)
    }
}
