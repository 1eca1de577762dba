use serde::Serialize;
use tokio::sync::broadcast;

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "events";

use crate::{log_debug, log_info, log_warn};

/// Notifications pushed from the core to whichever UI layer hosts it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum MonitorEvent {
    CameraStarted { width: u32, height: u32 },
    CameraStopped,
    /// The user-facing "unable to access camera" notice.
    CameraUnavailable { reason: String },
    DetectionsUpdated { count: usize },
}

impl MonitorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::CameraStarted { .. } => "camera-started",
            MonitorEvent::CameraStopped => "camera-stopped",
            MonitorEvent::CameraUnavailable { .. } => "camera-unavailable",
            MonitorEvent::DetectionsUpdated { .. } => "detections-updated",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: MonitorEvent);
}

/// Writes events to the log. Used when no UI is attached.
#[derive(Debug, Default, Clone)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: MonitorEvent) {
        match &event {
            MonitorEvent::CameraUnavailable { reason } => {
                log_warn!("Unable to access camera. Please check permissions. ({reason})")
            }
            MonitorEvent::DetectionsUpdated { count } => {
                log_debug!("{} ({count})", event.name())
            }
            other => log_info!("{}", other.name()),
        }
    }
}

/// Fans events out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: broadcast::Sender<MonitorEvent>,
}

impl ChannelEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: MonitorEvent) {
        // No receivers is fine; nobody is listening yet.
        let _ = self.tx.send(event);
    }
}
