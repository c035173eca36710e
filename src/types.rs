use std::{any::Any, sync::Arc};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::csf::ModuleExports;
use crate::hooks::HooksContext;

/// Globally unique story identifier, derived from (title, name).
pub type StoryId = String;

/// Path a story module is imported from. Opaque to the store; only ever
/// handed back to the external import hook.
pub type ImportPath = String;

/// Loosely-typed metadata map (args, parameters, arg type descriptors).
pub type ValueMap = serde_json::Map<String, Value>;

/// Version discriminator of the stories list wire format we accept.
pub const STORIES_LIST_VERSION: u32 = 3;

/// Static description of where one story's module lives and its display names.
///
/// Owned by the external stories-list provider; the store treats entries as
/// read-only input, replaceable wholesale on refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StoriesListEntry {
    pub id: StoryId,
    pub title: String,
    pub name: String,
    pub import_path: ImportPath,
}

/// Snapshot of the full stories index.
///
/// Entries are kept in index order (the provider's declaration order);
/// `extract()` iterates them in this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoriesList {
    pub v: u32,
    pub stories: Vec<StoriesListEntry>,
}

/// A story render function. Receives the live story context and returns the
/// renderer-specific output value.
pub type StoryFn = Arc<dyn Fn(&StoryContext) -> Value + Send + Sync>;

/// A decorator: wraps an inner story function, deciding if/how to call it.
pub type DecoratorFn = Arc<dyn Fn(&StoryFn, &StoryContext) -> Value + Send + Sync>;

/// A loader: async-ish data fetch run before render; modeled as a plain
/// callable returning its loaded value.
pub type LoaderFn = Arc<dyn Fn(&StoryContext) -> Value + Send + Sync>;

/// Renderer-owned DOM hook, passed through the store untouched.
pub type RenderToDomFn = Arc<dyn Any + Send + Sync>;

/// Renderer override for decorator composition.
pub type ApplyDecoratorsFn = Arc<dyn Fn(StoryFn, &[DecoratorFn]) -> StoryFn + Send + Sync>;

/// External import hook: resolves a story file's exports.
pub type ImportFn =
    Arc<dyn Fn(&str) -> BoxFuture<'static, anyhow::Result<ModuleExports>> + Send + Sync>;

/// External stories-list provider.
pub type FetchStoriesListFn =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<StoriesList>> + Send + Sync>;

/// File-level default metadata (the `default` export of a CSF module).
#[derive(Clone, Default)]
pub struct ComponentAnnotations {
    /// Display title; required for any module that exports stories.
    pub title: Option<String>,
    /// Explicit component id; derived from the title when absent.
    pub component_id: Option<String>,
    pub args: ValueMap,
    pub arg_types: ValueMap,
    pub parameters: ValueMap,
    pub decorators: Vec<DecoratorFn>,
    pub loaders: Vec<LoaderFn>,
}

/// Per-export story metadata.
#[derive(Clone, Default)]
pub struct StoryAnnotations {
    /// Explicit display name; derived from the export key when absent.
    pub name: Option<String>,
    pub args: ValueMap,
    pub arg_types: ValueMap,
    pub parameters: ValueMap,
    pub decorators: Vec<DecoratorFn>,
    pub loaders: Vec<LoaderFn>,
    pub render: Option<StoryFn>,
}

/// Project-wide annotations supplied by the embedding application.
///
/// Exactly one live instance exists per store; replaced wholesale by
/// `update_global_annotations`, which re-normalizes and bumps the cache
/// generation.
#[derive(Clone, Default)]
pub struct GlobalAnnotations {
    pub args: ValueMap,
    pub arg_types: ValueMap,
    pub global_types: ValueMap,
    pub globals: ValueMap,
    pub parameters: ValueMap,
    pub decorators: Vec<DecoratorFn>,
    pub loaders: Vec<LoaderFn>,
    pub render: Option<StoryFn>,
    pub render_to_dom: Option<RenderToDomFn>,
    pub apply_decorators: Option<ApplyDecoratorsFn>,
}

/// Live context handed to render/decorator/loader calls.
///
/// `args` and `globals` are re-read from the controllers on every
/// `get_story_context` call, so a context is always fresh without
/// re-preparing the story.
#[derive(Clone)]
pub struct StoryContext {
    pub id: StoryId,
    pub name: String,
    pub title: String,
    pub component_id: String,
    pub parameters: ValueMap,
    pub arg_types: ValueMap,
    pub initial_args: ValueMap,
    pub args: ValueMap,
    pub globals: ValueMap,
    pub hooks: Arc<HooksContext>,
}

/// Sanitize a display string into an id fragment: lowercase, alphanumeric
/// runs joined by single dashes, no leading/trailing dash.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Derive the unique story id from its title and display name.
pub fn story_id(title: &str, name: &str) -> StoryId {
    format!("{}--{}", sanitize(title), sanitize(name))
}

/// Derive a display name from an export key: word-split on delimiters and
/// camelCase boundaries, capitalizing each word (`"myStory"` -> `"My Story"`).
pub fn story_name_from_export(key: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in key.chars() {
        if ch == '_' || ch == '-' || ch == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_numeric();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
