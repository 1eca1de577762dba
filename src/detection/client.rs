use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    api::{ApiClient, ApiError},
    models::{EncodedFrame, RawDetection},
};

use super::session_tag::SessionTag;

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "detection";

use crate::{log_debug, log_warn};

pub const UPLOAD_PATH: &str = "/face/uploadmany";
const SUCCESS_STATUS: &str = "success";

#[derive(Debug, Clone, Serialize)]
pub struct DetectionRequest {
    pub class_id: SessionTag,
    pub image_base64: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DetectionResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub results: Vec<RawDetection>,
}

impl DetectionResponse {
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }
}

/// The remote face detection service.
#[async_trait]
pub trait DetectionService: Send + Sync {
    async fn detect(&self, request: &DetectionRequest) -> Result<DetectionResponse, ApiError>;
}

pub struct HttpDetectionService {
    api: ApiClient,
}

impl HttpDetectionService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DetectionService for HttpDetectionService {
    async fn detect(&self, request: &DetectionRequest) -> Result<DetectionResponse, ApiError> {
        self.api
            .post_json::<_, DetectionResponse>(UPLOAD_PATH, request)
            .await?
            .ok_or_else(|| ApiError::Decode("empty detection response".into()))
    }
}

/// Turns one sampled frame into the raw detections the store should show.
/// Outages and refusals read as "nothing detected"; they never surface as errors.
#[derive(Clone)]
pub struct DetectionClient {
    service: Arc<dyn DetectionService>,
}

impl DetectionClient {
    pub fn new(service: Arc<dyn DetectionService>) -> Self {
        Self { service }
    }

    pub async fn submit(&self, frame: &EncodedFrame, tag: SessionTag) -> Vec<RawDetection> {
        let request = DetectionRequest {
            class_id: tag,
            image_base64: frame.to_base64(),
        };

        match self.service.detect(&request).await {
            Ok(response) if response.is_success() => {
                log_debug!(
                    "{} face(s) in frame {}",
                    response.results.len(),
                    request.class_id
                );
                response.results
            }
            Ok(response) => {
                log_debug!(
                    "detection service answered status {:?} for frame {}",
                    response.status,
                    request.class_id
                );
                Vec::new()
            }
            Err(err) => {
                log_warn!("detection request for frame {} failed: {err}", request.class_id);
                Vec::new()
            }
        }
    }
}
