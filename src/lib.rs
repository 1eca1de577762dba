pub mod api;
pub mod capture;
pub mod commands;
pub mod detection;
pub mod enrichment;
pub mod events;
pub mod models;
pub mod overlay;
pub mod sampler;
pub mod settings;
pub mod store;
pub mod utils;
pub mod view;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::LevelFilter;
use tokio::sync::watch;

use api::ApiClient;
use capture::{CameraDevice, CaptureController, VirtualCamera};
#[cfg(feature = "native-camera")]
use capture::NativeCamera;
use detection::{DetectionClient, DetectionService, HttpDetectionService};
use enrichment::{HttpIdentityDirectory, IdentityDirectory, IdentityEnricher};
use events::{EventSink, LogEventSink};
use sampler::DetectionPipeline;
use settings::{CameraSource, Settings, SettingsStore, SETTINGS_PATH_ENV};
use store::{DetectionSnapshot, DetectionStore};

const DEFAULT_SETTINGS_FILE: &str = "presence-monitor.json";

/// Process-wide services. Lives as long as the host process, independent of
/// which screen is mounted.
pub struct AppState {
    pub(crate) capture: CaptureController,
    pub(crate) settings: Settings,
}

impl AppState {
    /// Wires the HTTP-backed detection service and identity directory.
    pub fn build(
        settings: Settings,
        device: Arc<dyn CameraDevice>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(settings.detection.request_timeout_secs);
        let api = ApiClient::new(&settings.api_base_url, timeout)
            .context("failed to build backend HTTP client")?;

        let detector = Arc::new(HttpDetectionService::new(api.clone()));
        let directory = Arc::new(HttpIdentityDirectory::new(
            api.with_bearer_token(settings.enrichment.bearer_token.clone()),
        ));
        Ok(Self::with_services(settings, device, detector, directory, events))
    }

    pub fn with_services(
        settings: Settings,
        device: Arc<dyn CameraDevice>,
        detector: Arc<dyn DetectionService>,
        directory: Arc<dyn IdentityDirectory>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let enricher = IdentityEnricher::new(directory).with_name_cache(Duration::from_secs(
            settings.enrichment.name_cache_ttl_secs,
        ));
        let pipeline = DetectionPipeline::new(
            DetectionClient::new(detector),
            enricher,
            DetectionStore::new(settings.detection.ordering),
            events.clone(),
        );
        let capture = CaptureController::new(device, &settings, pipeline, events);
        Self { capture, settings }
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    pub fn store(&self) -> &DetectionStore {
        self.capture.store()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

fn settings_path() -> PathBuf {
    std::env::var_os(SETTINGS_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
}

/// The camera `capture.source` asks for.
pub fn camera_device(settings: &Settings) -> Result<Arc<dyn CameraDevice>> {
    match settings.capture.source {
        CameraSource::Virtual => Ok(Arc::new(VirtualCamera::new())),
        #[cfg(feature = "native-camera")]
        CameraSource::Native => Ok(Arc::new(NativeCamera::new(settings.capture.device_index))),
        #[cfg(not(feature = "native-camera"))]
        CameraSource::Native => anyhow::bail!(
            "built without the `native-camera` feature; rebuild with `--features native-camera` \
             or set capture.source to \"virtual\""
        ),
    }
}

/// Headless host: runs the pipeline against the configured camera and logs
/// every batch until Ctrl-C.
pub fn run() -> Result<()> {
    let level = if settings::debug_enabled() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    log::info!("Presence monitor starting up...");

    let settings_store = SettingsStore::new(settings_path())?;
    let settings = settings_store.get();
    log::info!(
        "Using backend {} (settings: {})",
        settings.api_base_url,
        settings_store.path().display()
    );

    // Cooperative, single-threaded scheduling; encoding still goes to the blocking pool.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(async move {
        let device = camera_device(&settings)?;
        log::info!("Opening {}", device.label());
        let state = AppState::build(settings, device, Arc::new(LogEventSink))?;

        commands::start_camera(&state)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        let mut detections = state.store().subscribe();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = detections.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    report(&detections);
                }
            }
        }

        commands::stop_camera(&state)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        log::info!("Presence monitor shut down");
        Ok::<(), anyhow::Error>(())
    })
}

fn report(detections: &watch::Receiver<DetectionSnapshot>) {
    let snapshot = detections.borrow();
    if !snapshot.live {
        return;
    }
    if snapshot.batch.is_empty() {
        log::info!("No faces detected");
        return;
    }
    for row in snapshot.enriched_results() {
        if row.display_name.is_empty() {
            log::info!("#{} visitor", row.index);
        } else {
            log::info!(
                "#{} {} ({}, similarity {})",
                row.index,
                row.display_name,
                row.category.as_str(),
                row.formatted_similarity
            );
        }
    }
}
