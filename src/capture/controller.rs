use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::Duration,
};
use tokio_util::sync::CancellationToken;

use crate::{
    events::{EventSink, MonitorEvent},
    models::Resolution,
    sampler::{sampling_loop, DetectionPipeline, SamplerContext, SamplerExit},
    settings::Settings,
    store::DetectionStore,
};

use super::{
    device::{CameraDevice, DeviceError, StreamConstraints, StreamHandle, VideoStream},
    surfaces::{DecodeTarget, SamplingSurface},
};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "capture";

use crate::{log_info, log_warn};

const STREAM_ENDED_REASON: &str = "camera stream ended";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureState {
    Idle,
    Starting,
    Live,
    Stopping,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ViewerError {
    #[error("another view is already showing the camera")]
    AlreadyAttached,
}

struct SamplerHandle {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

struct Session {
    stream: Arc<dyn VideoStream>,
    sampler: SamplerHandle,
    epoch: u64,
}

struct Inner {
    device: Arc<dyn CameraDevice>,
    constraints: StreamConstraints,
    surface: SamplingSurface,
    interval: Duration,
    pipeline: DetectionPipeline,
    decode_target: Arc<DecodeTarget>,
    events: Arc<dyn EventSink>,
    session: Mutex<Option<Session>>,
    state_tx: watch::Sender<CaptureState>,
    active_timers: Arc<AtomicUsize>,
    viewer_attached: AtomicBool,
}

/// Owns the camera session. Cloning hands out another reference to the same
/// session; screens keep a clone and never own the stream.
#[derive(Clone)]
pub struct CaptureController {
    inner: Arc<Inner>,
}

impl CaptureController {
    pub fn new(
        device: Arc<dyn CameraDevice>,
        settings: &Settings,
        pipeline: DetectionPipeline,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let resolution = Resolution::new(settings.capture.width, settings.capture.height);
        let (state_tx, _state_rx) = watch::channel(CaptureState::Idle);
        Self {
            inner: Arc::new(Inner {
                device,
                constraints: StreamConstraints {
                    resolution,
                    frame_rate: settings.capture.frame_rate,
                },
                surface: SamplingSurface::new(resolution, settings.sampling.jpeg_quality),
                interval: settings.sampling.interval(),
                pipeline,
                decode_target: Arc::new(DecodeTarget::new()),
                events,
                session: Mutex::new(None),
                state_tx,
                active_timers: Arc::new(AtomicUsize::new(0)),
                viewer_attached: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CaptureState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_live(&self) -> bool {
        self.state() == CaptureState::Live
    }

    pub fn store(&self) -> &DetectionStore {
        self.inner.pipeline.store()
    }

    /// Resolution frames are sampled at; overlay boxes live in this space.
    pub fn sampling_resolution(&self) -> Resolution {
        self.inner.surface.resolution()
    }

    /// The live stream, for showing in a visible video element. `None` unless live.
    pub fn stream_handle(&self) -> Option<StreamHandle> {
        if !self.is_live() {
            return None;
        }
        self.inner.decode_target.attached()
    }

    /// Number of sampling timers currently running: one while live, zero otherwise.
    pub fn active_sampling_timers(&self) -> usize {
        self.inner.active_timers.load(Ordering::SeqCst)
    }

    /// Opens the camera and starts sampling. Calling it while live does nothing.
    pub async fn start(&self) -> Result<CaptureState, DeviceError> {
        let mut session = self.inner.session.lock().await;
        if session.is_some() {
            return Ok(self.state());
        }

        self.set_state(CaptureState::Starting);
        log_info!(
            "opening {} at {}@{}fps",
            self.inner.device.label(),
            self.inner.constraints.resolution,
            self.inner.constraints.frame_rate
        );

        let stream = match self.inner.device.open(self.inner.constraints).await {
            Ok(stream) => stream,
            Err(err) => {
                log_warn!("camera unavailable: {err}");
                self.set_state(CaptureState::Idle);
                self.inner.events.emit(MonitorEvent::CameraUnavailable {
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };

        self.inner
            .decode_target
            .attach(StreamHandle::new(stream.clone()));
        let epoch = self.store().go_live();
        let sampler = self.spawn_sampler(epoch);

        let resolution = stream.resolution();
        *session = Some(Session {
            stream,
            sampler,
            epoch,
        });
        self.set_state(CaptureState::Live);
        self.inner.events.emit(MonitorEvent::CameraStarted {
            width: resolution.width,
            height: resolution.height,
        });
        log_info!("camera live (epoch {epoch})");
        Ok(CaptureState::Live)
    }

    /// Stops sampling, releases the camera and clears the current detections.
    /// Rounds already in flight keep running but can no longer write.
    pub async fn stop(&self) -> CaptureState {
        let mut session = self.inner.session.lock().await;
        let Some(current) = session.take() else {
            return self.state();
        };

        let Session {
            stream,
            sampler,
            epoch,
        } = current;

        self.set_state(CaptureState::Stopping);
        sampler.cancel_token.cancel();
        if let Err(err) = sampler.handle.await {
            log_warn!("sampling task failed to join: {err}");
        }

        self.release(&stream);
        log_info!("camera stopped (epoch {epoch})");
        CaptureState::Idle
    }

    /// Claims the single viewer slot. The slot is freed when the attachment drops.
    pub fn attach_viewer(&self) -> Result<ViewerAttachment, ViewerError> {
        self.inner
            .viewer_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ViewerError::AlreadyAttached)?;
        Ok(ViewerAttachment {
            controller: self.clone(),
        })
    }

    fn spawn_sampler(&self, epoch: u64) -> SamplerHandle {
        let cancel_token = CancellationToken::new();
        let ctx = SamplerContext {
            decode_target: self.inner.decode_target.clone(),
            surface: self.inner.surface,
            pipeline: self.inner.pipeline.clone(),
            interval: self.inner.interval,
        };

        let timer = TimerGuard::new(self.inner.active_timers.clone());
        let controller = self.clone();
        let token = cancel_token.clone();
        let handle = tokio::spawn(async move {
            let exit = sampling_loop(ctx, epoch, token.clone()).await;
            drop(timer);
            if exit == SamplerExit::StreamEnded {
                controller.on_stream_lost(epoch, token).await;
            }
        });

        SamplerHandle {
            cancel_token,
            handle,
        }
    }

    /// Runs on the sampler task itself, so it must not await its own join handle.
    async fn on_stream_lost(&self, epoch: u64, token: CancellationToken) {
        let mut session = tokio::select! {
            // A concurrent stop() already owns the teardown.
            _ = token.cancelled() => return,
            guard = self.inner.session.lock() => guard,
        };
        if session.as_ref().map(|s| s.epoch) != Some(epoch) {
            return;
        }
        let Some(Session {
            stream, sampler, ..
        }) = session.take()
        else {
            return;
        };

        self.set_state(CaptureState::Stopping);
        sampler.cancel_token.cancel();
        self.inner.events.emit(MonitorEvent::CameraUnavailable {
            reason: STREAM_ENDED_REASON.into(),
        });
        self.release(&stream);
        log_warn!("camera lost (epoch {epoch}); session closed");
    }

    fn release(&self, stream: &Arc<dyn VideoStream>) {
        stream.stop_tracks();
        self.inner.decode_target.detach();
        self.store().go_idle();
        self.set_state(CaptureState::Idle);
        self.inner.events.emit(MonitorEvent::CameraStopped);
    }

    fn set_state(&self, state: CaptureState) {
        self.inner.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

struct TimerGuard(Arc<AtomicUsize>);

impl TimerGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Read access to the live stream for one viewing screen.
pub struct ViewerAttachment {
    controller: CaptureController,
}

impl ViewerAttachment {
    pub fn controller(&self) -> &CaptureController {
        &self.controller
    }

    pub fn stream(&self) -> Option<StreamHandle> {
        self.controller.stream_handle()
    }
}

impl Drop for ViewerAttachment {
    fn drop(&mut self) {
        self.controller
            .inner
            .viewer_attached
            .store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        api::ApiError,
        capture::{VirtualCamera, VirtualCameraMode},
        detection::{DetectionClient, DetectionRequest, DetectionResponse, DetectionService},
        enrichment::{testing::StaticDirectory, IdentityEnricher},
        events::ChannelEventSink,
        settings::OrderingPolicy,
    };

    struct NoFaces;

    #[async_trait]
    impl DetectionService for NoFaces {
        async fn detect(&self, _request: &DetectionRequest) -> Result<DetectionResponse, ApiError> {
            Ok(DetectionResponse {
                status: "success".into(),
                results: Vec::new(),
            })
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.capture.width = 64;
        settings.capture.height = 36;
        settings
    }

    fn controller(camera: Arc<VirtualCamera>) -> (CaptureController, Arc<ChannelEventSink>) {
        let events = Arc::new(ChannelEventSink::new(16));
        let pipeline = DetectionPipeline::new(
            DetectionClient::new(Arc::new(NoFaces)),
            IdentityEnricher::new(Arc::new(StaticDirectory::with(&[]))),
            DetectionStore::new(OrderingPolicy::LastWriterWins),
            events.clone(),
        );
        (
            CaptureController::new(camera, &settings(), pipeline, events.clone()),
            events,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn start_goes_live_with_one_timer() {
        let camera = Arc::new(VirtualCamera::new());
        let (controller, events) = controller(camera.clone());
        let mut rx = events.subscribe();

        assert_eq!(controller.start().await, Ok(CaptureState::Live));
        assert!(controller.is_live());
        assert!(controller.store().is_live());
        assert_eq!(controller.active_sampling_timers(), 1);
        assert!(controller.stream_handle().is_some());
        assert_eq!(
            rx.recv().await.unwrap(),
            MonitorEvent::CameraStarted {
                width: 64,
                height: 36
            }
        );

        // Second start is a no-op: no new stream, no second timer.
        controller.start().await.unwrap();
        assert_eq!(camera.open_count(), 1);
        assert_eq!(controller.active_sampling_timers(), 1);

        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_releases_everything() {
        let (controller, _events) = controller(Arc::new(VirtualCamera::new()));
        controller.start().await.unwrap();
        let stream = controller.stream_handle().unwrap();

        assert_eq!(controller.stop().await, CaptureState::Idle);

        assert_eq!(controller.state(), CaptureState::Idle);
        assert_eq!(controller.active_sampling_timers(), 0);
        assert!(!stream.is_active());
        assert!(controller.stream_handle().is_none());
        assert!(!controller.store().is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_joins_the_sampler_before_returning() {
        let (controller, events) = controller(Arc::new(VirtualCamera::new()));
        controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(4100)).await;

        let mut rx = events.subscribe();
        let state = controller.stop().await;

        assert_eq!(state, CaptureState::Idle);
        assert_eq!(controller.active_sampling_timers(), 0);
        assert!(controller.inner.session.lock().await.is_none());
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.last(), Some(&MonitorEvent::CameraStopped));

        // A fresh session after a full teardown.
        controller.start().await.unwrap();
        assert_eq!(controller.active_sampling_timers(), 1);
        controller.stop().await;
        assert_eq!(controller.active_sampling_timers(), 0);
    }

    #[tokio::test]
    async fn stop_while_idle_is_noop() {
        let (controller, events) = controller(Arc::new(VirtualCamera::new()));
        let mut rx = events.subscribe();

        for _ in 0..3 {
            assert_eq!(controller.stop().await, CaptureState::Idle);
        }
        assert_eq!(controller.active_sampling_timers(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn refused_permission_stays_idle_and_notifies() {
        let camera = Arc::new(VirtualCamera::with_mode(VirtualCameraMode::PermissionDenied));
        let (controller, events) = controller(camera);
        let mut rx = events.subscribe();

        assert_eq!(controller.start().await, Err(DeviceError::PermissionDenied));
        assert_eq!(controller.state(), CaptureState::Idle);
        assert_eq!(controller.active_sampling_timers(), 0);
        assert!(matches!(
            rx.recv().await.unwrap(),
            MonitorEvent::CameraUnavailable { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_starts_open_the_camera_once() {
        let camera = Arc::new(VirtualCamera::new().with_open_delay(Duration::from_millis(500)));
        let (controller, _events) = controller(camera.clone());

        let (a, b) = tokio::join!(controller.start(), controller.start());

        assert_eq!(a, Ok(CaptureState::Live));
        assert_eq!(b, Ok(CaptureState::Live));
        assert_eq!(camera.open_count(), 1);
        assert_eq!(controller.active_sampling_timers(), 1);
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn lost_stream_closes_the_session() {
        let (controller, events) = controller(Arc::new(VirtualCamera::new()));
        controller.start().await.unwrap();
        let mut state = controller.subscribe_state();
        let mut rx = events.subscribe();

        controller
            .inner
            .session
            .lock()
            .await
            .as_ref()
            .unwrap()
            .stream
            .stop_tracks();

        state
            .wait_for(|s| *s == CaptureState::Idle)
            .await
            .unwrap();
        assert_eq!(controller.active_sampling_timers(), 0);
        assert!(!controller.store().is_live());
        assert_eq!(
            rx.recv().await.unwrap(),
            MonitorEvent::CameraUnavailable {
                reason: STREAM_ENDED_REASON.into()
            }
        );
        assert_eq!(rx.recv().await.unwrap(), MonitorEvent::CameraStopped);

        // The camera can be started again afterwards.
        controller.start().await.unwrap();
        assert!(controller.is_live());
        controller.stop().await;
    }

    #[tokio::test]
    async fn only_one_viewer_at_a_time() {
        let (controller, _events) = controller(Arc::new(VirtualCamera::new()));

        let first = controller.attach_viewer().unwrap();
        assert_eq!(
            controller.attach_viewer().err(),
            Some(ViewerError::AlreadyAttached)
        );

        drop(first);
        assert!(controller.attach_viewer().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn viewer_sees_stream_only_while_live() {
        let (controller, _events) = controller(Arc::new(VirtualCamera::new()));
        let viewer = controller.attach_viewer().unwrap();
        assert!(viewer.stream().is_none());

        controller.start().await.unwrap();
        assert!(viewer.stream().is_some());

        controller.stop().await;
        assert!(viewer.stream().is_none());
    }
}
