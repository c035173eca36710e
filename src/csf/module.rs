use std::sync::Arc;

use serde_json::Value;

use crate::types::{ComponentAnnotations, StoryAnnotations};

/// One named export of a CSF module, classified by shape.
///
/// Only `Story` exports are indexed; anything else (constants, helpers,
/// re-exports) is carried as an opaque value and skipped by the processor.
#[derive(Clone)]
pub enum Export {
    Story(StoryAnnotations),
    Value(Value),
}

/// The raw exports of one imported story module: the `default` metadata
/// object plus named exports in declaration order.
///
/// Transient: the store never retains a `ModuleExports` beyond processing,
/// only the derived `CsfFile` record.
#[derive(Clone, Default)]
pub struct ModuleExports {
    pub meta: ComponentAnnotations,
    pub named: Vec<(String, Export)>,
}

impl ModuleExports {
    pub fn new(meta: ComponentAnnotations) -> Self {
        Self { meta, named: Vec::new() }
    }

    /// Add a named story export. Declaration order is preserved.
    pub fn with_story(mut self, key: impl Into<String>, story: StoryAnnotations) -> Self {
        self.named.push((key.into(), Export::Story(story)));
        self
    }

    /// Add a named non-story export.
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.named.push((key.into(), Export::Value(value)));
        self
    }
}

fn same_callables<T: ?Sized>(a: &[Arc<T>], b: &[Arc<T>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
}

fn same_opt_callable<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

pub(crate) fn same_meta(a: &ComponentAnnotations, b: &ComponentAnnotations) -> bool {
    a.title == b.title
        && a.component_id == b.component_id
        && a.args == b.args
        && a.arg_types == b.arg_types
        && a.parameters == b.parameters
        && same_callables(&a.decorators, &b.decorators)
        && same_callables(&a.loaders, &b.loaders)
}

pub(crate) fn same_story(a: &StoryAnnotations, b: &StoryAnnotations) -> bool {
    a.name == b.name
        && a.args == b.args
        && a.arg_types == b.arg_types
        && a.parameters == b.parameters
        && same_callables(&a.decorators, &b.decorators)
        && same_callables(&a.loaders, &b.loaders)
        && same_opt_callable(&a.render, &b.render)
}

/// Structural comparison used by the hot-update protocol: data fields by
/// value, callables by identity. Unequal exports mean the module changed
/// and its cached records must be replaced.
pub fn same_exports(a: &ModuleExports, b: &ModuleExports) -> bool {
    if !same_meta(&a.meta, &b.meta) || a.named.len() != b.named.len() {
        return false;
    }
    a.named.iter().zip(&b.named).all(|((ka, ea), (kb, eb))| {
        ka == kb
            && match (ea, eb) {
                (Export::Story(sa), Export::Story(sb)) => same_story(sa, sb),
                (Export::Value(va), Export::Value(vb)) => va == vb,
                _ => false,
            }
    })
}
