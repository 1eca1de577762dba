use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;
use thiserror::Error;

use crate::models::Resolution;

/// What the controller asks the camera for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub resolution: Resolution,
    pub frame_rate: u32,
}

/// Device failures. All of them are fatal to `start()`; none is retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera device found")]
    NotFound,

    #[error("camera is in use by another application")]
    Busy,

    #[error("camera error: {0}")]
    Other(String),
}

impl DeviceError {
    /// Sorts a platform backend's error text into the cases the UI tells apart.
    pub fn from_backend_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        let mentions = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

        if mentions(&["permission", "denied", "not authorized", "unauthorized"]) {
            DeviceError::PermissionDenied
        } else if mentions(&["busy", "in use", "already open"]) {
            DeviceError::Busy
        } else if mentions(&["no such", "not found", "no device", "no camera", "could not find"]) {
            DeviceError::NotFound
        } else {
            DeviceError::Other(message.trim().to_string())
        }
    }
}

/// A camera that can be opened for exclusive use.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    fn label(&self) -> String;

    /// Suspends until the platform grants (or refuses) access.
    async fn open(&self, constraints: StreamConstraints) -> Result<Arc<dyn VideoStream>, DeviceError>;
}

/// A live camera stream. Owned by the capture controller; everyone else sees
/// it through a [`StreamHandle`].
pub trait VideoStream: Send + Sync {
    fn id(&self) -> &str;

    fn resolution(&self) -> Resolution;

    /// Most recent decoded frame. `None` before the first frame arrives and
    /// after the tracks are stopped.
    fn current_frame(&self) -> Option<RgbImage>;

    fn is_active(&self) -> bool;

    /// Releases every track of the stream. Idempotent.
    fn stop_tracks(&self);
}

/// Read-only view of the live stream, for attaching to a visible video element.
#[derive(Clone)]
pub struct StreamHandle {
    stream: Arc<dyn VideoStream>,
}

impl StreamHandle {
    pub(crate) fn new(stream: Arc<dyn VideoStream>) -> Self {
        Self { stream }
    }

    pub fn id(&self) -> &str {
        self.stream.id()
    }

    pub fn resolution(&self) -> Resolution {
        self.stream.resolution()
    }

    pub fn current_frame(&self) -> Option<RgbImage> {
        self.stream.current_frame()
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_active()
    }

    pub fn same_stream(&self, other: &StreamHandle) -> bool {
        Arc::ptr_eq(&self.stream, &other.stream)
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.id())
            .field("resolution", &self.resolution())
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_backend_messages() {
        let cases = [
            ("Permission denied (os error 13)", DeviceError::PermissionDenied),
            ("Camera access not authorized", DeviceError::PermissionDenied),
            ("Device or resource busy (os error 16)", DeviceError::Busy),
            ("device is in use by another process", DeviceError::Busy),
            ("No such file or directory (os error 2)", DeviceError::NotFound),
            ("Could not find camera at index 3", DeviceError::NotFound),
        ];
        for (message, expected) in cases {
            assert_eq!(DeviceError::from_backend_message(message), expected, "{message}");
        }
    }

    #[test]
    fn unknown_backend_message_is_kept() {
        assert_eq!(
            DeviceError::from_backend_message(" format negotiation failed "),
            DeviceError::Other("format negotiation failed".into())
        );
        assert_eq!(
            DeviceError::Busy.to_string(),
            "camera is in use by another application"
        );
    }
}
