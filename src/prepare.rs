use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::csf::CsfStory;
use crate::hooks::HooksContext;
use crate::normalize::normalize_input_types;
use crate::types::{
    sanitize, ComponentAnnotations, DecoratorFn, GlobalAnnotations, LoaderFn, StoryContext,
    StoryFn, StoryId, ValueMap,
};

/// A fully-resolved, render-ready story.
///
/// Content is a pure function of (CSF story record, global annotations) at
/// preparation time; the store recomputes it when either input changes.
/// Args and globals are intentionally absent: they are read live through
/// `StoryStore::get_story_context`.
pub struct PreparedStory {
    pub id: StoryId,
    pub name: String,
    pub title: String,
    pub component_id: String,
    pub parameters: ValueMap,
    pub arg_types: ValueMap,
    pub initial_args: ValueMap,
    /// The resolved render function, without decorators.
    pub undecorated_story_fn: StoryFn,
    /// The render function with global/file/story decorators composed in.
    pub story_fn: StoryFn,
    pub loaders: Vec<LoaderFn>,
    hooks: Mutex<Option<Arc<HooksContext>>>,
}

impl PreparedStory {
    /// The hook-lifecycle context for this story, created lazily on first
    /// request and reference-identical thereafter.
    pub fn hooks(&self) -> Arc<HooksContext> {
        let mut slot = self.hooks.lock().unwrap();
        match &*slot {
            Some(hooks) => hooks.clone(),
            None => {
                let hooks = Arc::new(HooksContext::new());
                *slot = Some(hooks.clone());
                hooks
            }
        }
    }

    /// Release the hook context (cleaning it first) so the next render
    /// starts from a fresh lifecycle.
    pub fn release_hooks(&self) {
        if let Some(hooks) = self.hooks.lock().unwrap().take() {
            hooks.clean();
        }
    }

    /// Whether this story's resolved parameters mark it docs-only.
    pub fn is_docs_only(&self) -> bool {
        self.parameters.get("docsOnly") == Some(&Value::Bool(true))
    }

    /// Serializable projection with callables and hook state stripped.
    /// Field names are part of the payload compatibility contract.
    pub fn to_projection(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "name": self.name,
            "componentId": self.component_id,
            // Legacy aliases kept for the v2 payload consumers.
            "kind": self.title,
            "story": self.name,
            "parameters": self.parameters,
            "argTypes": self.arg_types,
            "initialArgs": self.initial_args,
        })
    }
}

/// Per-key overlay merge with recursion into plain objects: where both
/// sides hold an object the keys are merged, otherwise the overlay wins.
pub fn combine_parameters(base: &ValueMap, overlay: &ValueMap) -> ValueMap {
    let mut out = base.clone();
    for (key, value) in overlay {
        match (out.get(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                let merged = combine_parameters(existing, incoming);
                out.insert(key.clone(), Value::Object(merged));
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

/// Compose an ordered decorator list around a render function. The first
/// decorator in the list ends up outermost; the last wraps the render call
/// directly.
pub fn compose_decorators(render: StoryFn, decorators: &[DecoratorFn]) -> StoryFn {
    let mut composed = render;
    for decorator in decorators.iter().rev() {
        let decorator = decorator.clone();
        let inner = composed;
        composed = Arc::new(move |context: &StoryContext| decorator(&inner, context));
    }
    composed
}

/// Infer missing arg types from the shapes of the initial args. Inference
/// never overrides an explicitly declared type.
fn infer_arg_types(arg_types: &mut ValueMap, initial_args: &ValueMap) {
    for (key, value) in initial_args {
        let inferred_type = match value {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Null => continue,
        };
        match arg_types.get_mut(key) {
            Some(Value::Object(descriptor)) => {
                descriptor
                    .entry("type")
                    .or_insert_with(|| json!({ "name": inferred_type }));
                descriptor
                    .entry("name")
                    .or_insert_with(|| Value::String(key.clone()));
            }
            _ => {
                arg_types.insert(
                    key.clone(),
                    json!({ "name": key, "type": { "name": inferred_type } }),
                );
            }
        }
    }
}

/// Initial args implied by `defaultValue` fields on the arg types.
pub(crate) fn default_args(arg_types: &ValueMap) -> ValueMap {
    let mut out = ValueMap::new();
    for (key, descriptor) in arg_types {
        if let Some(default) = descriptor.get("defaultValue") {
            out.insert(key.clone(), default.clone());
        }
    }
    out
}

/// Produce the render-ready story object for one CSF story entry.
///
/// Merge order is global < file < story throughout; decorators chain
/// outward-in so the story's own decorators sit closest to the render call.
/// Deterministic: identical inputs give a structurally identical story.
pub fn prepare_story(
    story: &CsfStory,
    meta: &ComponentAnnotations,
    global: &GlobalAnnotations,
) -> PreparedStory {
    let title = meta.title.clone().unwrap_or_default();
    let component_id = meta.component_id.clone().unwrap_or_else(|| sanitize(&title));

    let mut parameters = combine_parameters(&global.parameters, &meta.parameters);
    parameters = combine_parameters(&parameters, &story.annotations.parameters);

    // Global arg types arrive normalized; file/story declarations are raw.
    let mut arg_types =
        combine_parameters(&global.arg_types, &normalize_input_types(&story.annotations.arg_types));

    let mut initial_args = combine_parameters(&default_args(&arg_types), &global.args);
    initial_args = combine_parameters(&initial_args, &story.annotations.args);

    infer_arg_types(&mut arg_types, &initial_args);

    let render = story
        .annotations
        .render
        .clone()
        .or_else(|| global.render.clone())
        .unwrap_or_else(|| Arc::new(|_| Value::Null));

    parameters
        .entry("__isArgsStory")
        .or_insert(Value::Bool(story.annotations.render.is_some()));

    let mut decorators: Vec<DecoratorFn> = Vec::with_capacity(
        global.decorators.len() + meta.decorators.len() + story.annotations.decorators.len(),
    );
    decorators.extend(global.decorators.iter().cloned());
    decorators.extend(meta.decorators.iter().cloned());
    decorators.extend(story.annotations.decorators.iter().cloned());

    let story_fn = match &global.apply_decorators {
        Some(apply) => apply(render.clone(), &decorators),
        None => compose_decorators(render.clone(), &decorators),
    };

    let mut loaders: Vec<LoaderFn> =
        Vec::with_capacity(global.loaders.len() + meta.loaders.len() + story.annotations.loaders.len());
    loaders.extend(global.loaders.iter().cloned());
    loaders.extend(meta.loaders.iter().cloned());
    loaders.extend(story.annotations.loaders.iter().cloned());

    PreparedStory {
        id: story.id.clone(),
        name: story.name.clone(),
        title,
        component_id,
        parameters,
        arg_types,
        initial_args,
        undecorated_story_fn: render,
        story_fn,
        loaders,
        hooks: Mutex::new(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csf::{process_csf_file, ModuleExports};
    use crate::types::StoryAnnotations;
    use serde_json::json;

    fn as_map(value: Value) -> ValueMap {
        value.as_object().cloned().unwrap()
    }

    fn context_for(story: &PreparedStory) -> StoryContext {
        StoryContext {
            id: story.id.clone(),
            name: story.name.clone(),
            title: story.title.clone(),
            component_id: story.component_id.clone(),
            parameters: story.parameters.clone(),
            arg_types: story.arg_types.clone(),
            initial_args: story.initial_args.clone(),
            args: story.initial_args.clone(),
            globals: ValueMap::new(),
            hooks: story.hooks(),
        }
    }

    fn prepared(
        story: StoryAnnotations,
        meta: ComponentAnnotations,
        global: GlobalAnnotations,
    ) -> PreparedStory {
        let meta = ComponentAnnotations { title: Some("One".to_string()), ..meta };
        let exports = ModuleExports::new(meta.clone()).with_story("a", story);
        let csf = process_csf_file(&exports, "./One.stories.js").unwrap();
        prepare_story(&csf.stories[0], &meta, &global)
    }

    #[test]
    fn test_parameter_merge_order() {
        let story = prepared(
            StoryAnnotations {
                parameters: as_map(json!({ "layer": "story", "nested": { "s": 1 } })),
                ..Default::default()
            },
            ComponentAnnotations {
                parameters: as_map(json!({ "layer": "file", "file_only": true, "nested": { "f": 1 } })),
                ..Default::default()
            },
            GlobalAnnotations {
                parameters: as_map(json!({ "layer": "global", "global_only": true, "nested": { "g": 1 } })),
                ..Default::default()
            },
        );

        assert_eq!(story.parameters["layer"], json!("story"));
        assert_eq!(story.parameters["file_only"], json!(true));
        assert_eq!(story.parameters["global_only"], json!(true));
        // Nested objects merge per key across all three layers.
        assert_eq!(story.parameters["nested"], json!({ "g": 1, "f": 1, "s": 1 }));
    }

    #[test]
    fn test_arg_type_inference_does_not_override_explicit() {
        let story = prepared(
            StoryAnnotations {
                args: as_map(json!({ "count": 3, "label": "hi" })),
                arg_types: as_map(json!({ "count": { "type": "range" } })),
                ..Default::default()
            },
            ComponentAnnotations::default(),
            GlobalAnnotations::default(),
        );

        // Explicit declaration survives inference.
        assert_eq!(story.arg_types["count"], json!({ "name": "count", "type": { "name": "range" } }));
        // Undeclared arg gets an inferred type.
        assert_eq!(story.arg_types["label"], json!({ "name": "label", "type": { "name": "string" } }));
    }

    #[test]
    fn test_initial_args_precedence() {
        let story = prepared(
            StoryAnnotations {
                args: as_map(json!({ "b": "story" })),
                ..Default::default()
            },
            ComponentAnnotations::default(),
            GlobalAnnotations {
                args: as_map(json!({ "a": "global", "b": "global" })),
                arg_types: as_map(json!({ "c": { "name": "c", "defaultValue": "typed" } })),
                ..Default::default()
            },
        );

        assert_eq!(story.initial_args["a"], json!("global"));
        assert_eq!(story.initial_args["b"], json!("story"));
        assert_eq!(story.initial_args["c"], json!("typed"));
    }

    #[test]
    fn test_decorators_wrap_outward_in() {
        let label = |tag: &'static str| -> DecoratorFn {
            Arc::new(move |inner, ctx| {
                let inner_value = inner(ctx);
                json!(format!("{}({})", tag, inner_value.as_str().unwrap_or("?")))
            })
        };
        let story = prepared(
            StoryAnnotations {
                decorators: vec![label("s1"), label("s2")],
                render: Some(Arc::new(|_| json!("render"))),
                ..Default::default()
            },
            ComponentAnnotations { decorators: vec![label("f")], ..Default::default() },
            GlobalAnnotations { decorators: vec![label("g")], ..Default::default() },
        );

        let ctx = context_for(&story);
        // Global outermost, then file, then story decorators in array order.
        assert_eq!((story.story_fn)(&ctx), json!("g(f(s1(s2(render))))"));
        assert_eq!((story.undecorated_story_fn)(&ctx), json!("render"));
    }

    #[test]
    fn test_hooks_lazy_and_reference_identical() {
        let story = prepared(
            StoryAnnotations::default(),
            ComponentAnnotations::default(),
            GlobalAnnotations::default(),
        );

        let first = story.hooks();
        let second = story.hooks();
        assert!(Arc::ptr_eq(&first, &second));

        first.set("slot", json!(1));
        story.release_hooks();
        assert!(first.is_empty());
        // Next request builds a fresh context.
        assert!(!Arc::ptr_eq(&first, &story.hooks()));
    }

    #[test]
    fn test_docs_only_flag() {
        let story = prepared(
            StoryAnnotations {
                parameters: as_map(json!({ "docsOnly": true })),
                ..Default::default()
            },
            ComponentAnnotations::default(),
            GlobalAnnotations::default(),
        );
        assert!(story.is_docs_only());
    }

    #[test]
    fn test_projection_strips_callables() {
        let story = prepared(
            StoryAnnotations {
                args: as_map(json!({ "foo": "a" })),
                render: Some(Arc::new(|_| json!("render"))),
                ..Default::default()
            },
            ComponentAnnotations::default(),
            GlobalAnnotations::default(),
        );

        let projection = story.to_projection();
        assert_eq!(projection["id"], json!("one--a"));
        assert_eq!(projection["componentId"], json!("one"));
        assert_eq!(projection["kind"], json!("One"));
        assert_eq!(projection["story"], json!("A"));
        assert_eq!(projection["initialArgs"], json!({ "foo": "a" }));
        assert!(projection.get("storyFn").is_none());
        assert!(projection.get("hooks").is_none());
    }
}
