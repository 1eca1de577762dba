use async_trait::async_trait;
use serde::Deserialize;

use crate::api::{ApiClient, ApiError};

/// Resolves identity references to display names.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// `Ok(None)` when the record exists but carries no name.
    async fn display_name(&self, subject_ref: &str) -> Result<Option<String>, ApiError>;
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    #[serde(default)]
    name: Option<String>,
}

/// `GET /users/{id}` on the dashboard backend.
pub struct HttpIdentityDirectory {
    api: ApiClient,
}

impl HttpIdentityDirectory {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl IdentityDirectory for HttpIdentityDirectory {
    async fn display_name(&self, subject_ref: &str) -> Result<Option<String>, ApiError> {
        let record = self
            .api
            .get_json::<UserRecord>(&format!("/users/{subject_ref}"))
            .await?;
        Ok(record
            .and_then(|user| user.name)
            .filter(|name| !name.is_empty()))
    }
}
