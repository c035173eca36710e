//! Lazy-importing story store.
//!
//! Indexes a dynamically-discoverable collection of stories (named,
//! parameterized render configurations for UI components) and serves any
//! one of them on demand: modules are imported lazily through an external
//! hook, processed into canonical per-file records, prepared into
//! render-ready story objects, and cached so repeated requests are free.
//! User-adjustable args and globals stay consistent across all served
//! stories, and caches are invalidated on hot updates and global-annotation
//! changes.
//!
//! ```ignore
//! use story_store::StoryStore;
//!
//! let store = StoryStore::new(import_fn, global_annotations, fetch_stories_list);
//! store.initialize(false).await?;
//! let story = store.load_story("component-one--a").await?;
//! let context = store.get_story_context(&story);
//! ```

mod csf;
mod error;
mod hooks;
mod normalize;
mod prepare;
mod store;
mod types;

pub use csf::{process_csf_file, same_exports, CsfFile, CsfStory, Export, ModuleExports};
pub use error::{Error, Result};
pub use hooks::HooksContext;
pub use normalize::{normalize_global_annotations, normalize_input_types};
pub use prepare::{combine_parameters, compose_decorators, prepare_story, PreparedStory};
pub use store::{ArgsStore, EventSink, GlobalsStore, StoreEvent, StoryStore};
pub use types::{
    sanitize, story_id, story_name_from_export, ApplyDecoratorsFn, ComponentAnnotations,
    DecoratorFn, FetchStoriesListFn, GlobalAnnotations, ImportFn, ImportPath, LoaderFn,
    RenderToDomFn, StoriesList, StoriesListEntry, StoryAnnotations, StoryContext, StoryFn,
    StoryId, ValueMap, STORIES_LIST_VERSION,
};
