//! Platform camera through nokhwa (V4L2, AVFoundation or Media Foundation).
//!
//! A nokhwa `Camera` is not `Send`, so each stream gets its own capture thread
//! that owns the device from open to release. The thread keeps the most recent
//! decoded frame in shared state; the sampler reads it from there.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution as CameraResolution,
    },
    Camera, NokhwaError,
};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::models::Resolution;

use super::device::{CameraDevice, DeviceError, StreamConstraints, VideoStream};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "native_camera";

use crate::{log_info, log_warn};

/// Consecutive failed reads after which the stream counts as lost.
const MAX_FRAME_FAILURES: u32 = 30;
const FRAME_RETRY_DELAY: Duration = Duration::from_millis(50);

pub struct NativeCamera {
    index: u32,
}

impl NativeCamera {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

#[async_trait]
impl CameraDevice for NativeCamera {
    fn label(&self) -> String {
        format!("camera #{}", self.index)
    }

    async fn open(&self, constraints: StreamConstraints) -> Result<Arc<dyn VideoStream>, DeviceError> {
        let shared = Arc::new(SharedFrame::default());
        let (ready_tx, ready_rx) = oneshot::channel();

        let index = self.index;
        let worker = shared.clone();
        thread::Builder::new()
            .name(format!("camera-{index}"))
            .spawn(move || capture_thread(index, constraints, worker, ready_tx))
            .map_err(|err| DeviceError::Other(format!("failed to spawn capture thread: {err}")))?;

        let resolution = ready_rx
            .await
            .map_err(|_| DeviceError::Other("capture thread exited during setup".into()))??;

        Ok(Arc::new(NativeStream {
            id: Uuid::new_v4().to_string(),
            resolution,
            shared,
        }))
    }
}

struct SharedFrame {
    active: AtomicBool,
    latest: Mutex<Option<RgbImage>>,
}

impl Default for SharedFrame {
    fn default() -> Self {
        Self {
            active: AtomicBool::new(true),
            latest: Mutex::new(None),
        }
    }
}

impl SharedFrame {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn shut(&self) {
        self.active.store(false, Ordering::Release);
        self.latest().take();
    }

    fn latest(&self) -> MutexGuard<'_, Option<RgbImage>> {
        match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn capture_thread(
    index: u32,
    constraints: StreamConstraints,
    shared: Arc<SharedFrame>,
    ready: oneshot::Sender<Result<Resolution, DeviceError>>,
) {
    let mut camera = match open_camera(index, constraints) {
        Ok(camera) => camera,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    let negotiated = camera.resolution();
    let resolution = Resolution::new(negotiated.width(), negotiated.height());
    log_info!(
        "camera #{index} streaming at {resolution} ({})",
        camera.info().human_name()
    );
    if ready.send(Ok(resolution)).is_err() {
        // Nobody is waiting for this stream any more.
        shared.shut();
    }

    let mut failures = 0;
    while shared.is_active() {
        match read_frame(&mut camera) {
            Ok(frame) => {
                failures = 0;
                *shared.latest() = Some(frame);
            }
            Err(err) => {
                failures += 1;
                if failures >= MAX_FRAME_FAILURES {
                    log_warn!("camera #{index} lost after {failures} failed reads: {err}");
                    break;
                }
                thread::sleep(FRAME_RETRY_DELAY);
            }
        }
    }

    shared.shut();
    if let Err(err) = camera.stop_stream() {
        log_warn!("camera #{index} did not stop cleanly: {err}");
    }
}

fn open_camera(index: u32, constraints: StreamConstraints) -> Result<Camera, DeviceError> {
    let devices = nokhwa::query(ApiBackend::Auto).map_err(classify)?;
    if devices.is_empty() {
        return Err(DeviceError::NotFound);
    }

    let requested = CameraFormat::new(
        CameraResolution::new(constraints.resolution.width, constraints.resolution.height),
        FrameFormat::MJPEG,
        constraints.frame_rate,
    );
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(requested));

    let mut camera = Camera::new(CameraIndex::Index(index), format).map_err(classify)?;
    camera.open_stream().map_err(classify)?;
    Ok(camera)
}

fn read_frame(camera: &mut Camera) -> Result<RgbImage, NokhwaError> {
    let decoded = camera.frame()?.decode_image::<RgbFormat>()?;
    let (width, height) = decoded.dimensions();
    RgbImage::from_raw(width, height, decoded.into_raw()).ok_or_else(|| {
        NokhwaError::GeneralError(format!("frame buffer does not match {width}x{height}"))
    })
}

fn classify(err: NokhwaError) -> DeviceError {
    DeviceError::from_backend_message(&err.to_string())
}

struct NativeStream {
    id: String,
    resolution: Resolution,
    shared: Arc<SharedFrame>,
}

impl VideoStream for NativeStream {
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
        self.shared.latest().clone()
    }

    fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    fn stop_tracks(&self) {
        self.shared.shut();
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        self.shared.shut();
    }
}
