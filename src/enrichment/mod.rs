pub mod cache;
pub mod directory;

pub use cache::NameCache;
pub use directory::{HttpIdentityDirectory, IdentityDirectory};

use std::{sync::Arc, time::Duration};

use futures_util::future::join_all;

use crate::models::{EnrichedDetection, RawDetection};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "enrichment";

use crate::log_warn;

const FALLBACK_PREFIX: &str = "User ";
const FALLBACK_REF_CHARS: usize = 8;

/// Label used when a name cannot be resolved: `User ` plus the first eight
/// characters of the reference.
pub fn fallback_label(subject_ref: &str) -> String {
    let short: String = subject_ref.chars().take(FALLBACK_REF_CHARS).collect();
    format!("{FALLBACK_PREFIX}{short}")
}

/// Derives presentation rows from raw detections.
#[derive(Clone)]
pub struct IdentityEnricher {
    directory: Arc<dyn IdentityDirectory>,
    cache: Option<Arc<NameCache>>,
}

impl IdentityEnricher {
    pub fn new(directory: Arc<dyn IdentityDirectory>) -> Self {
        Self {
            directory,
            cache: None,
        }
    }

    /// A zero TTL leaves the cache off.
    pub fn with_name_cache(mut self, ttl: Duration) -> Self {
        self.cache = (!ttl.is_zero()).then(|| Arc::new(NameCache::new(ttl)));
        self
    }

    /// One row per detection, same order. Lookups for the batch run concurrently
    /// and the call returns once all of them have settled.
    pub async fn enrich(&self, raw: &[RawDetection]) -> Vec<EnrichedDetection> {
        let rows = raw.iter().enumerate().map(|(index, detection)| async move {
            match detection.subject() {
                Some(subject_ref) => {
                    let name = self.resolve_name(subject_ref).await;
                    EnrichedDetection::student(index, name, detection)
                }
                None => EnrichedDetection::unidentified(index),
            }
        });
        join_all(rows).await
    }

    async fn resolve_name(&self, subject_ref: &str) -> String {
        if let Some(name) = self.cache.as_ref().and_then(|cache| cache.get(subject_ref)) {
            return name;
        }

        match self.directory.display_name(subject_ref).await {
            Ok(Some(name)) => {
                if let Some(cache) = &self.cache {
                    cache.insert(subject_ref, &name);
                }
                name
            }
            Ok(None) => fallback_label(subject_ref),
            Err(err) => {
                log_warn!("name lookup for {subject_ref} failed: {err}");
                fallback_label(subject_ref)
            }
        }
    }
}
