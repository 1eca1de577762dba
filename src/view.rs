//! The monitoring screen's side of the pipeline.
//!
//! A view borrows the live stream for display and follows the store. It never
//! starts or stops the camera, so mounting and unmounting it (navigation) leaves
//! capture untouched.
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    capture::{CaptureController, StreamHandle, ViewerAttachment, ViewerError},
    models::{EnrichedDetection, RawDetection},
    overlay::{DisplaySize, OverlayBox, OverlayRenderer, OverlaySurface},
    store::DetectionSnapshot,
};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "view";

use crate::log_debug;

pub struct MonitorView {
    attachment: ViewerAttachment,
    renderer: OverlayRenderer,
    display: DisplaySize,
    detections: watch::Receiver<DetectionSnapshot>,
}

impl MonitorView {
    pub fn mount(controller: &CaptureController, display: DisplaySize) -> Result<Self, ViewerError> {
        let attachment = controller.attach_viewer()?;
        log_debug!("view mounted at {}x{}", display.width, display.height);
        Ok(Self {
            renderer: OverlayRenderer::new(controller.sampling_resolution()),
            detections: controller.store().subscribe(),
            attachment,
            display,
        })
    }

    /// Stream for the visible video element; `None` while the camera is off.
    pub fn video_source(&self) -> Option<StreamHandle> {
        self.attachment.stream()
    }

    /// The video element was laid out again; redraws at the new size.
    pub fn set_display_size(
        &mut self,
        display: DisplaySize,
        surface: &mut dyn OverlaySurface,
    ) -> Vec<OverlayBox> {
        self.display = display;
        self.render(surface)
    }

    pub fn is_live(&self) -> bool {
        self.detections.borrow().live
    }

    pub fn raw_results(&self) -> Vec<RawDetection> {
        self.detections.borrow().batch.raw_results.clone()
    }

    /// Rows for the "currently detected" list.
    pub fn current_detections(&self) -> Vec<EnrichedDetection> {
        self.detections.borrow().batch.enriched_results.clone()
    }

    /// Redraws the overlay from the latest batch.
    pub fn render(&mut self, surface: &mut dyn OverlaySurface) -> Vec<OverlayBox> {
        let raw = self.detections.borrow_and_update().batch.raw_results.clone();
        self.renderer.render(&raw, self.display, surface)
    }

    /// Waits for the next store update. Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.detections.changed().await.is_ok()
    }

    /// Renders on mount, then again after every store update and every layout
    /// change, until cancelled or either channel closes.
    pub async fn run(
        &mut self,
        surface: &mut dyn OverlaySurface,
        mut layout: watch::Receiver<DisplaySize>,
        cancel_token: CancellationToken,
    ) {
        self.display = *layout.borrow_and_update();
        self.render(surface);
        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                resized = layout.changed() => {
                    if resized.is_err() {
                        break;
                    }
                    let display = *layout.borrow_and_update();
                    self.set_display_size(display, surface);
                }
                alive = self.detections.changed() => {
                    if alive.is_err() {
                        break;
                    }
                    self.render(surface);
                }
            }
        }
        log_debug!("view render loop finished");
    }
}
