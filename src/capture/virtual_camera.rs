//! Camera that emits a moving test pattern at whatever resolution it is asked for.
//!
//! Physical backends plug in through the same [`CameraDevice`] trait; this one
//! exists so the pipeline can run end to end without hardware, and so tests can
//! simulate a refused permission prompt or a missing device.
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use uuid::Uuid;

use crate::models::Resolution;

use super::device::{CameraDevice, DeviceError, StreamConstraints, VideoStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualCameraMode {
    Available,
    PermissionDenied,
    NoDevice,
}

pub struct VirtualCamera {
    mode: Mutex<VirtualCameraMode>,
    open_delay: Duration,
    opened: AtomicUsize,
}

impl VirtualCamera {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(VirtualCameraMode::Available),
            open_delay: Duration::ZERO,
            opened: AtomicUsize::new(0),
        }
    }

    pub fn with_mode(mode: VirtualCameraMode) -> Self {
        let camera = Self::new();
        camera.set_mode(mode);
        camera
    }

    /// Simulates the time a user spends on the permission prompt.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn set_mode(&self, mode: VirtualCameraMode) {
        match self.mode.lock() {
            Ok(mut guard) => *guard = mode,
            Err(poisoned) => *poisoned.into_inner() = mode,
        }
    }

    fn mode(&self) -> VirtualCameraMode {
        match self.mode.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Number of streams successfully opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Default for VirtualCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDevice for VirtualCamera {
    fn label(&self) -> String {
        "Virtual test pattern".into()
    }

    async fn open(&self, constraints: StreamConstraints) -> Result<Arc<dyn VideoStream>, DeviceError> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        match self.mode() {
            VirtualCameraMode::PermissionDenied => return Err(DeviceError::PermissionDenied),
            VirtualCameraMode::NoDevice => return Err(DeviceError::NotFound),
            VirtualCameraMode::Available => {}
        }

        if constraints.resolution.is_empty() {
            return Err(DeviceError::Other(format!(
                "unsupported resolution {}",
                constraints.resolution
            )));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(VirtualStream::new(constraints.resolution)))
    }
}

pub struct VirtualStream {
    id: String,
    resolution: Resolution,
    active: AtomicBool,
    counter: AtomicU64,
}

impl VirtualStream {
    fn new(resolution: Resolution) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            resolution,
            active: AtomicBool::new(true),
            counter: AtomicU64::new(0),
        }
    }
}

impl VideoStream for VirtualStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn current_frame(&self) -> Option<RgbImage> {
        if !self.is_active() {
            return None;
        }
        let ts = self.counter.fetch_add(1, Ordering::Relaxed);
        let shift = (ts % 256) as u32;
        Some(RgbImage::from_fn(
            self.resolution.width,
            self.resolution.height,
            |x, y| Rgb([((x + shift) % 256) as u8, (y % 256) as u8, shift as u8]),
        ))
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn stop_tracks(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
