use crate::ImageId;
use std::collections::HashMap;
use std::sync::Mutex;

/// Session-lifetime store of finished translations, keyed by image identity.
///
/// Unbounded and never evicted. `put` is last-write-wins; the pipeline's
/// per-identity in-flight guard means at most one writer per identity in
/// practice.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<ImageId, String>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, id: &ImageId) -> bool {
        self.entries.lock().unwrap().contains_key(id)
    }

    pub fn get(&self, id: &ImageId) -> Option<String> {
        self.entries.lock().unwrap().get(id).cloned()
    }

    pub fn put(&self, id: ImageId, translation: String) {
        self.entries.lock().unwrap().insert(id, translation);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
