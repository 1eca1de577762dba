use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use tokio::time::Instant;

/// Short-lived reference -> name cache so a subject who stays in frame is not
/// looked up on every tick.
pub struct NameCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl NameCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, subject_ref: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(subject_ref) {
            Some((name, stored_at)) if stored_at.elapsed() < self.ttl => Some(name.clone()),
            Some(_) => {
                entries.remove(subject_ref);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, subject_ref: &str, name: &str) {
        let mut entries = self.lock();
        let ttl = self.ttl;
        entries.retain(|_, (_, stored_at)| stored_at.elapsed() < ttl);
        entries.insert(subject_ref.to_string(), (name.to_string(), Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
