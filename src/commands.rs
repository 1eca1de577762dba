//! Entry points for the hosting UI shell.
//!
//! Errors cross the bridge as display strings, the way a webview command
//! reports them, so callers show them as-is.
use serde::Serialize;

use crate::{
    capture::{CaptureController, CaptureState},
    models::{EnrichedDetection, RawDetection},
    overlay::DisplaySize,
    view::MonitorView,
    AppState,
};

/// Everything a freshly mounted screen needs to paint itself.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorState {
    pub is_live: bool,
    pub capture_state: CaptureState,
    pub raw_results: Vec<RawDetection>,
    pub enriched_results: Vec<EnrichedDetection>,
}

fn controller_from_state(state: &AppState) -> CaptureController {
    state.capture.clone()
}

pub async fn start_camera(state: &AppState) -> Result<CaptureState, String> {
    let controller = controller_from_state(state);
    controller.start().await.map_err(|e| e.to_string())
}

pub async fn stop_camera(state: &AppState) -> Result<CaptureState, String> {
    let controller = controller_from_state(state);
    Ok(controller.stop().await)
}

pub fn get_monitor_state(state: &AppState) -> Result<MonitorState, String> {
    let controller = controller_from_state(state);
    // One snapshot, so raw and enriched always belong to the same batch.
    let snapshot = controller.store().snapshot();
    Ok(MonitorState {
        is_live: snapshot.live,
        capture_state: controller.state(),
        raw_results: snapshot.batch.raw_results,
        enriched_results: snapshot.batch.enriched_results,
    })
}

pub fn attach_viewer(state: &AppState, display: DisplaySize) -> Result<MonitorView, String> {
    let controller = controller_from_state(state);
    MonitorView::mount(&controller, display).map_err(|e| e.to_string())
}
