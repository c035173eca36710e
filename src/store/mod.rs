mod args;

pub use args::{ArgsStore, GlobalsStore};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::csf::{process_csf_file, same_csf_files, CsfFile, CsfStory};
use crate::error::{Error, Result};
use crate::normalize::normalize_global_annotations;
use crate::prepare::{default_args, prepare_story, PreparedStory};
use crate::types::{
    FetchStoriesListFn, GlobalAnnotations, ImportFn, ImportPath, StoriesList, StoriesListEntry,
    StoryContext, StoryId, ValueMap, STORIES_LIST_VERSION,
};

/// Lifecycle events emitted to the host UI over the notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The importable module set changed; cached derivations were refreshed.
    ImportFnChanged,
    /// The host should re-render the current story.
    ForceReRender,
}

/// Fire-and-forget notification channel. Emission is synchronous and never
/// awaited or acknowledged.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StoreEvent);
}

/// One prepared-cache entry. `source` records which processed file the
/// story was prepared from, so an entry built from a superseded record is
/// never served once the cell holds a replacement.
struct PreparedEntry {
    generation: u64,
    source: Arc<CsfFile>,
    story: Arc<PreparedStory>,
}

/// Validated stories index: entries in provider order plus an id lookup.
struct StoriesIndex {
    entries: Vec<StoriesListEntry>,
    by_id: HashMap<StoryId, usize>,
}

impl StoriesIndex {
    fn from_list(list: StoriesList) -> Result<Self> {
        if list.v != STORIES_LIST_VERSION {
            return Err(Error::Configuration(format!(
                "unsupported stories list version {} (expected {})",
                list.v, STORIES_LIST_VERSION
            )));
        }
        let mut by_id = HashMap::with_capacity(list.stories.len());
        for (position, entry) in list.stories.iter().enumerate() {
            if by_id.insert(entry.id.clone(), position).is_some() {
                return Err(Error::Configuration(format!(
                    "duplicate story id '{}' in stories index",
                    entry.id
                )));
            }
        }
        Ok(Self { entries: list.stories, by_id })
    }

    fn entry(&self, story_id: &str) -> Option<&StoriesListEntry> {
        self.by_id.get(story_id).map(|position| &self.entries[*position])
    }

    /// Unique import paths in index order.
    fn import_paths(&self) -> Vec<ImportPath> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|entry| seen.insert(entry.import_path.clone()))
            .map(|entry| entry.import_path.clone())
            .collect()
    }
}

/// The story/module cache-and-normalization engine.
///
/// Owns the stories index, the per-path CSF file cache (which doubles as the
/// in-flight import dedupe), the per-story prepared cache, and the mutable
/// args/globals state. All caches are plain maps guarded by short-lived
/// locks; no lock is held across a suspension point.
pub struct StoryStore {
    import_fn: RwLock<ImportFn>,
    fetch_stories_list: FetchStoriesListFn,
    global_annotations: RwLock<GlobalAnnotations>,
    /// Bumped on every `update_global_annotations`; prepared entries carry
    /// the generation they were built against and are lazily recomputed.
    generation: AtomicU64,
    index: RwLock<Option<StoriesIndex>>,
    /// Per-path cells: an uninitialized cell with a waiter is an in-flight
    /// import, so concurrent loads of one path share a single import call.
    csf_cells: Mutex<HashMap<ImportPath, Arc<OnceCell<Arc<CsfFile>>>>>,
    prepared: Mutex<HashMap<StoryId, PreparedEntry>>,
    cached_all: AtomicBool,
    args: RwLock<ArgsStore>,
    globals: RwLock<GlobalsStore>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl StoryStore {
    /// Build a store around the external import hook, the project-wide
    /// annotations (normalized here), and the stories-list provider.
    pub fn new(
        import_fn: ImportFn,
        global_annotations: GlobalAnnotations,
        fetch_stories_list: FetchStoriesListFn,
    ) -> Self {
        let annotations = normalize_global_annotations(global_annotations);

        // Globals start from globalTypes defaultValues, overlaid with the
        // explicitly passed globals.
        let mut globals = default_args(&annotations.global_types);
        for (key, value) in &annotations.globals {
            globals.insert(key.clone(), value.clone());
        }

        Self {
            import_fn: RwLock::new(import_fn),
            fetch_stories_list,
            global_annotations: RwLock::new(annotations),
            generation: AtomicU64::new(0),
            index: RwLock::new(None),
            csf_cells: Mutex::new(HashMap::new()),
            prepared: Mutex::new(HashMap::new()),
            cached_all: AtomicBool::new(false),
            args: RwLock::new(ArgsStore::default()),
            globals: RwLock::new(GlobalsStore::new(globals)),
            event_sink: None,
        }
    }

    /// Attach the notification channel.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Fetch and validate the stories index; optionally eagerly import and
    /// process every CSF file.
    pub async fn initialize(&self, cache_all_csf_files: bool) -> Result<()> {
        let list = (self.fetch_stories_list)().await.map_err(Error::StoriesList)?;
        let index = StoriesIndex::from_list(list)?;
        tracing::debug!("initialized stories index with {} entries", index.entries.len());
        *self.index.write().unwrap() = Some(index);

        if cache_all_csf_files {
            self.cache_all_csf_files().await?;
        }
        Ok(())
    }

    /// The current (normalized) global annotations.
    pub fn global_annotations(&self) -> GlobalAnnotations {
        self.global_annotations.read().unwrap().clone()
    }

    fn index_entry(&self, story_id: &str) -> Result<StoriesListEntry> {
        let index = self.index.read().unwrap();
        let index = index.as_ref().ok_or_else(|| {
            Error::Precondition("store is not initialized; call initialize() first".to_string())
        })?;
        index
            .entry(story_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("story '{}' not in stories index", story_id)))
    }

    /// Import and process one path, deduplicating concurrent requests: a
    /// second caller for a path already being imported awaits the same
    /// in-flight import instead of issuing a duplicate.
    async fn load_csf_file(&self, import_path: &str) -> Result<Arc<CsfFile>> {
        let cell = {
            let mut cells = self.csf_cells.lock().unwrap();
            cells
                .entry(import_path.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let import_fn = self.import_fn.read().unwrap().clone();
        let csf = cell
            .get_or_try_init(|| async {
                tracing::debug!("importing {}", import_path);
                let exports = import_fn(import_path).await.map_err(Error::Import)?;
                Ok::<_, Error>(Arc::new(process_csf_file(&exports, import_path)?))
            })
            .await?
            .clone();
        Ok(csf)
    }

    /// The processed CSF file containing the given story.
    pub async fn load_csf_file_by_story_id(&self, story_id: &str) -> Result<Arc<CsfFile>> {
        let entry = self.index_entry(story_id)?;
        self.load_csf_file(&entry.import_path).await
    }

    /// Import and process every file in the index, in index order. A failure
    /// aborts the call but leaves already-cached files intact and reusable.
    pub async fn load_all_csf_files(&self) -> Result<Vec<(ImportPath, Arc<CsfFile>)>> {
        let paths = {
            let index = self.index.read().unwrap();
            index
                .as_ref()
                .ok_or_else(|| {
                    Error::Precondition(
                        "store is not initialized; call initialize() first".to_string(),
                    )
                })?
                .import_paths()
        };

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let csf = self.load_csf_file(&path).await?;
            files.push((path, csf));
        }
        Ok(files)
    }

    /// Eagerly cache every CSF file, unlocking `extract()`.
    pub async fn cache_all_csf_files(&self) -> Result<()> {
        self.load_all_csf_files().await?;
        self.cached_all.store(true, Ordering::Release);
        Ok(())
    }

    /// Prepare one story through the prepared cache. An entry is reused only
    /// if it was built against the current global-annotations generation and
    /// from the same processed file record the caller holds.
    ///
    /// The generation is read here, after any import suspension: a load that
    /// started before an `update_global_annotations` but prepares after it
    /// is upgraded to the new annotations. The source check keeps a
    /// preparation from a superseded record (a load that raced a hot update)
    /// from ever satisfying a load holding the replacement.
    fn prepare_cached(&self, csf: &Arc<CsfFile>, story: &CsfStory) -> Arc<PreparedStory> {
        let generation = self.generation.load(Ordering::Acquire);
        {
            let prepared = self.prepared.lock().unwrap();
            if let Some(entry) = prepared.get(&story.id) {
                if entry.generation == generation && Arc::ptr_eq(&entry.source, csf) {
                    return entry.story.clone();
                }
            }
        }

        tracing::debug!("preparing story '{}' at generation {}", story.id, generation);
        let global = self.global_annotations.read().unwrap().clone();
        let prepared_story = Arc::new(prepare_story(story, &csf.meta, &global));
        self.args
            .write()
            .unwrap()
            .set_initial(&story.id, prepared_story.initial_args.clone());
        self.prepared.lock().unwrap().insert(
            story.id.clone(),
            PreparedEntry {
                generation,
                source: csf.clone(),
                story: prepared_story.clone(),
            },
        );
        prepared_story
    }

    /// Resolve, import (or reuse cache), process, and prepare one story.
    /// Fails with `NotFound` before any import if the id is not indexed.
    pub async fn load_story(&self, story_id: &str) -> Result<Arc<PreparedStory>> {
        let entry = self.index_entry(story_id)?;
        let csf = self.load_csf_file(&entry.import_path).await?;
        let story = csf.story(story_id).ok_or_else(|| {
            Error::NotFound(format!(
                "story '{}' not found in module '{}'",
                story_id, entry.import_path
            ))
        })?;
        Ok(self.prepare_cached(&csf, story))
    }

    /// All prepared stories of one CSF file, in file declaration order.
    pub fn component_stories_from_csf_file(&self, csf: &Arc<CsfFile>) -> Vec<Arc<PreparedStory>> {
        csf.stories
            .iter()
            .map(|story| self.prepare_cached(csf, story))
            .collect()
    }

    /// Build a live render context: args and globals are re-read from the
    /// controllers on every call, so no re-preparation is needed to observe
    /// updates.
    pub fn get_story_context(&self, story: &PreparedStory) -> StoryContext {
        StoryContext {
            id: story.id.clone(),
            name: story.name.clone(),
            title: story.title.clone(),
            component_id: story.component_id.clone(),
            parameters: story.parameters.clone(),
            arg_types: story.arg_types.clone(),
            initial_args: story.initial_args.clone(),
            args: self.args.read().unwrap().get(&story.id),
            globals: self.globals.read().unwrap().get(),
            hooks: story.hooks(),
        }
    }

    /// Release a story's hook-lifecycle context when it unmounts.
    pub fn cleanup_story(&self, story: &PreparedStory) {
        story.release_hooks();
    }

    /// Merge a patch into one story's args.
    pub fn update_args(&self, story_id: &str, patch: &ValueMap) {
        self.args.write().unwrap().update(story_id, patch);
    }

    /// Restore one story's args to its initial values.
    pub fn reset_args(&self, story_id: &str) {
        self.args.write().unwrap().reset(story_id);
    }

    /// Current args for one story.
    pub fn args(&self, story_id: &str) -> ValueMap {
        self.args.read().unwrap().get(story_id)
    }

    /// Merge a patch into the global mapping.
    pub fn update_globals(&self, patch: &ValueMap) {
        self.globals.write().unwrap().update(patch);
    }

    /// The current globals mapping.
    pub fn globals(&self) -> ValueMap {
        self.globals.read().unwrap().get()
    }

    /// Serializable projection of every indexed story, in index order.
    /// Requires `cache_all_csf_files` to have completed.
    pub fn extract(&self, include_docs_only: bool) -> Result<Vec<Value>> {
        if !self.cached_all.load(Ordering::Acquire) {
            return Err(Error::Precondition(
                "Cannot call extract() unless all CSF files have been cached".to_string(),
            ));
        }

        let entries: Vec<StoriesListEntry> = {
            let index = self.index.read().unwrap();
            index
                .as_ref()
                .map(|index| index.entries.clone())
                .unwrap_or_default()
        };

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let csf = {
                let cells = self.csf_cells.lock().unwrap();
                cells
                    .get(&entry.import_path)
                    .and_then(|cell| cell.get().cloned())
                    .ok_or_else(|| {
                        Error::Precondition(
                            "Cannot call extract() unless all CSF files have been cached"
                                .to_string(),
                        )
                    })?
            };
            let story = csf.story(&entry.id).ok_or_else(|| {
                Error::NotFound(format!(
                    "story '{}' not found in module '{}'",
                    entry.id, entry.import_path
                ))
            })?;
            let prepared = self.prepare_cached(&csf, story);
            if prepared.is_docs_only() && !include_docs_only {
                continue;
            }
            out.push(prepared.to_projection());
        }
        Ok(out)
    }

    /// Legacy-compatible bulk snapshot grouping stories by title. The field
    /// names and the `v: 2` discriminator are part of the compatibility
    /// contract with the presentation layer.
    pub fn get_set_stories_payload(&self) -> Result<Value> {
        let stories = self.extract(true)?;

        let mut kind_parameters = serde_json::Map::new();
        for story in &stories {
            if let Some(title) = story.get("title").and_then(Value::as_str) {
                kind_parameters
                    .entry(title.to_string())
                    .or_insert_with(|| json!({}));
            }
        }

        Ok(json!({
            "v": 2,
            "globals": self.globals(),
            "globalParameters": {},
            "kindParameters": kind_parameters,
            "stories": stories,
        }))
    }

    /// Normalize and swap the global annotations, bumping the generation so
    /// every prepared story is lazily recomputed on its next read. No eager
    /// sweep: stale entries are detected by their generation tag.
    pub fn update_global_annotations(&self, annotations: GlobalAnnotations) {
        let annotations = normalize_global_annotations(annotations);
        *self.global_annotations.write().unwrap() = annotations;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!("global annotations updated; generation is now {}", generation);
    }

    fn drop_prepared_for(&self, csf: &CsfFile) {
        let mut prepared = self.prepared.lock().unwrap();
        for story in &csf.stories {
            prepared.remove(&story.id);
        }
    }

    /// React to a changed importable module set.
    ///
    /// Removed paths are evicted eagerly, together with their prepared
    /// stories. Paths cached before the change are re-imported through the
    /// new hook and structurally compared; an unequal result is treated as
    /// removed-then-added. Added paths populate lazily on first load. A
    /// re-import failure aborts the call (already-refreshed entries stay).
    pub async fn on_import_fn_changed(
        &self,
        import_fn: ImportFn,
        added: Option<&[ImportPath]>,
        removed: Option<&[ImportPath]>,
    ) -> Result<()> {
        *self.import_fn.write().unwrap() = import_fn.clone();

        if let Some(added) = added {
            tracing::debug!("{} added path(s) will populate lazily", added.len());
        }

        let removed_set: HashSet<&str> = removed
            .map(|paths| paths.iter().map(String::as_str).collect())
            .unwrap_or_default();

        // Eager eviction of removed paths.
        let evicted: Vec<Arc<CsfFile>> = {
            let mut cells = self.csf_cells.lock().unwrap();
            removed_set
                .iter()
                .filter_map(|path| cells.remove(*path))
                .filter_map(|cell| cell.get().cloned())
                .collect()
        };
        for csf in &evicted {
            tracing::debug!("evicting removed module {}", csf.import_path);
            self.drop_prepared_for(csf);
        }
        if !removed_set.is_empty() {
            self.cached_all.store(false, Ordering::Release);
        }

        // Surviving cached paths: re-import and structurally compare. A path
        // whose import is still in flight is re-keyed: the pending result
        // lands in an orphaned cell and is discarded, and the path
        // re-imports lazily through the new fn.
        let mut survivors: Vec<(ImportPath, Arc<CsfFile>)> = Vec::new();
        {
            let mut cells = self.csf_cells.lock().unwrap();
            let mut in_flight: Vec<ImportPath> = Vec::new();
            for (path, cell) in cells.iter() {
                match cell.get() {
                    Some(csf) => survivors.push((path.clone(), csf.clone())),
                    None => in_flight.push(path.clone()),
                }
            }
            for path in in_flight {
                tracing::debug!("discarding in-flight import of {}", path);
                cells.remove(&path);
                self.cached_all.store(false, Ordering::Release);
            }
        }

        for (path, old_csf) in survivors {
            let exports = import_fn(&path).await.map_err(Error::Import)?;
            let new_csf = Arc::new(process_csf_file(&exports, &path)?);
            if same_csf_files(&old_csf, &new_csf) {
                continue;
            }
            tracing::debug!("module {} changed; replacing cached records", path);
            self.drop_prepared_for(&old_csf);
            self.csf_cells
                .lock()
                .unwrap()
                .insert(path, Arc::new(OnceCell::new_with(Some(new_csf))));
        }

        if let Some(sink) = &self.event_sink {
            sink.emit(StoreEvent::ImportFnChanged);
        }
        Ok(())
    }
}
