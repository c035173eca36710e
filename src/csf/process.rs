use crate::csf::{Export, ModuleExports};
use crate::error::{Error, Result};
use crate::types::{
    story_id, story_name_from_export, ComponentAnnotations, ImportPath, StoryAnnotations, StoryId,
    ValueMap,
};

/// One story entry of a processed CSF file.
///
/// `annotations` carries the story-level declarations with the file's
/// defaults already folded in as fallbacks for args/argTypes/parameters.
/// Decorators and loaders stay at their own level so preparation can wrap
/// file decorators outside story decorators.
#[derive(Clone)]
pub struct CsfStory {
    pub id: StoryId,
    pub name: String,
    pub annotations: StoryAnnotations,
}

/// Canonical per-file record derived from one module's exports.
///
/// Created on first import of a path and cached by the store; replaced
/// wholesale when the path's exports later compare unequal.
#[derive(Clone)]
pub struct CsfFile {
    pub import_path: ImportPath,
    pub meta: ComponentAnnotations,
    pub stories: Vec<CsfStory>,
}

impl CsfFile {
    /// Look up one story entry by id.
    pub fn story(&self, id: &str) -> Option<&CsfStory> {
        self.stories.iter().find(|story| story.id == id)
    }

    /// The file's display title.
    pub fn title(&self) -> &str {
        self.meta.title.as_deref().unwrap_or_default()
    }
}

/// Overlay wins per key; base entries survive where the overlay is silent.
fn fold_map(base: &ValueMap, overlay: &ValueMap) -> ValueMap {
    let mut out = base.clone();
    for (key, value) in overlay {
        out.insert(key.clone(), value.clone());
    }
    out
}

/// Extract per-story metadata from one imported module and index it against
/// the file's defaults. Pure function of the exports; memoization lives in
/// the store, keyed by import path.
pub fn process_csf_file(exports: &ModuleExports, import_path: &str) -> Result<CsfFile> {
    let title = exports.meta.title.clone().ok_or_else(|| {
        Error::Configuration(format!(
            "CSF file at '{}' has no default title; every story module must declare one",
            import_path
        ))
    })?;

    let mut stories = Vec::new();
    for (key, export) in &exports.named {
        let story = match export {
            Export::Story(story) => story,
            Export::Value(_) => {
                tracing::debug!("skipping non-story export '{}' in {}", key, import_path);
                continue;
            }
        };

        let name = story
            .name
            .clone()
            .unwrap_or_else(|| story_name_from_export(key));
        let id = story_id(&title, &name);

        let annotations = StoryAnnotations {
            name: Some(name.clone()),
            args: fold_map(&exports.meta.args, &story.args),
            arg_types: fold_map(&exports.meta.arg_types, &story.arg_types),
            parameters: fold_map(&exports.meta.parameters, &story.parameters),
            decorators: story.decorators.clone(),
            loaders: story.loaders.clone(),
            render: story.render.clone(),
        };
        stories.push(CsfStory { id, name, annotations });
    }

    Ok(CsfFile {
        import_path: import_path.to_string(),
        meta: exports.meta.clone(),
        stories,
    })
}

/// Structural comparison of two processed records of the same path, used by
/// the hot-update protocol: unequal records mean the module changed and the
/// cached one must be replaced together with its prepared stories.
pub fn same_csf_files(a: &CsfFile, b: &CsfFile) -> bool {
    use crate::csf::module::{same_meta, same_story};

    same_meta(&a.meta, &b.meta)
        && a.stories.len() == b.stories.len()
        && a.stories.iter().zip(&b.stories).all(|(sa, sb)| {
            sa.id == sb.id && sa.name == sb.name && same_story(&sa.annotations, &sb.annotations)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: serde_json::Value) -> ValueMap {
        value.as_object().cloned().unwrap()
    }

    fn module() -> ModuleExports {
        ModuleExports::new(ComponentAnnotations {
            title: Some("Component One".to_string()),
            args: as_map(json!({ "shared": "default", "foo": "file" })),
            parameters: as_map(json!({ "layout": "centered" })),
            ..Default::default()
        })
        .with_story(
            "a",
            StoryAnnotations {
                args: as_map(json!({ "foo": "a" })),
                ..Default::default()
            },
        )
        .with_story(
            "longStoryName",
            StoryAnnotations {
                parameters: as_map(json!({ "layout": "fullscreen" })),
                ..Default::default()
            },
        )
        .with_value("helper", json!("not a story"))
    }

    #[test]
    fn test_derives_ids_and_names() {
        let csf = process_csf_file(&module(), "./One.stories.js").unwrap();
        let ids: Vec<_> = csf.stories.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["component-one--a", "component-one--long-story-name"]);
        assert_eq!(csf.stories[1].name, "Long Story Name");
    }

    #[test]
    fn test_skips_non_story_exports() {
        let csf = process_csf_file(&module(), "./One.stories.js").unwrap();
        assert_eq!(csf.stories.len(), 2);
        assert!(csf.story("component-one--helper").is_none());
    }

    #[test]
    fn test_file_defaults_are_fallback_not_override() {
        let csf = process_csf_file(&module(), "./One.stories.js").unwrap();
        let a = csf.story("component-one--a").unwrap();
        // Story-local value wins; the file default fills the gap.
        assert_eq!(a.annotations.args["foo"], json!("a"));
        assert_eq!(a.annotations.args["shared"], json!("default"));
        assert_eq!(a.annotations.parameters["layout"], json!("centered"));

        let b = csf.story("component-one--long-story-name").unwrap();
        assert_eq!(b.annotations.parameters["layout"], json!("fullscreen"));
    }

    #[test]
    fn test_explicit_name_annotation_wins() {
        let exports = ModuleExports::new(ComponentAnnotations {
            title: Some("One".to_string()),
            ..Default::default()
        })
        .with_story(
            "a",
            StoryAnnotations { name: Some("Renamed".to_string()), ..Default::default() },
        );
        let csf = process_csf_file(&exports, "./One.stories.js").unwrap();
        assert_eq!(csf.stories[0].id, "one--renamed");
        assert_eq!(csf.stories[0].name, "Renamed");
    }

    #[test]
    fn test_missing_title_is_a_configuration_error() {
        let exports = ModuleExports::default();
        let err = process_csf_file(&exports, "./Broken.stories.js").err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
