use std::collections::HashMap;

use crate::types::{StoryId, ValueMap};

#[derive(Debug, Clone, Default)]
struct Bucket {
    initial: ValueMap,
    current: ValueMap,
}

/// Per-story args state: the user-adjustable input values driving a render.
///
/// Neither `update` nor `reset` notifies anyone; readers always go through
/// `StoryStore::get_story_context`, which re-reads current state.
#[derive(Debug, Default)]
pub struct ArgsStore {
    buckets: HashMap<StoryId, Bucket>,
}

impl ArgsStore {
    /// Record a story's initial args the first time it is prepared.
    /// Later preparations of the same id keep any user adjustments.
    pub fn set_initial(&mut self, story_id: &str, initial: ValueMap) {
        self.buckets
            .entry(story_id.to_string())
            .or_insert_with(|| Bucket { initial: initial.clone(), current: initial });
    }

    /// Current args for a story; empty for an id never prepared or updated.
    pub fn get(&self, story_id: &str) -> ValueMap {
        self.buckets
            .get(story_id)
            .map(|bucket| bucket.current.clone())
            .unwrap_or_default()
    }

    /// Merge a patch into one story's args. Unset keys are untouched; an
    /// unknown id lazily materializes an empty bucket, never errors.
    pub fn update(&mut self, story_id: &str, patch: &ValueMap) {
        let bucket = self.buckets.entry(story_id.to_string()).or_default();
        for (key, value) in patch {
            bucket.current.insert(key.clone(), value.clone());
        }
    }

    /// Restore a story's args to its initial values.
    pub fn reset(&mut self, story_id: &str) {
        if let Some(bucket) = self.buckets.get_mut(story_id) {
            bucket.current = bucket.initial.clone();
        }
    }
}

/// Cross-story shared context values (theme, locale, ...), one live mapping
/// per store, mutated only through `update`.
#[derive(Debug, Default)]
pub struct GlobalsStore {
    globals: ValueMap,
}

impl GlobalsStore {
    pub fn new(globals: ValueMap) -> Self {
        Self { globals }
    }

    pub fn get(&self) -> ValueMap {
        self.globals.clone()
    }

    /// Merge a patch into the global mapping.
    pub fn update(&mut self, patch: &ValueMap) {
        for (key, value) in patch {
            self.globals.insert(key.clone(), value.clone());
        }
    }
}
