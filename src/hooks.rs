use std::{collections::HashMap, sync::Mutex};

use serde_json::Value;

/// Per-story hook-lifecycle context.
///
/// Created lazily on a story's first `get_story_context` call, then reused
/// for every re-render of that story until `cleanup_story` releases it.
/// The renderer stashes whatever per-mount state it needs under string keys;
/// the store only owns the lifecycle.
#[derive(Debug, Default)]
pub struct HooksContext {
    state: Mutex<HashMap<String, Value>>,
}

impl HooksContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a hook state slot.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.state.lock().unwrap().insert(key.into(), value);
    }

    /// Read a hook state slot.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().unwrap().get(key).cloned()
    }

    /// Drop all hook state. Called when a story unmounts.
    pub fn clean(&self) {
        self.state.lock().unwrap().clear();
    }

    /// Number of live state slots.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
