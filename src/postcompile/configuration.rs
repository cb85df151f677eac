use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::ast::{DynamicFilterId, PlaceholderId, TypeDescriptor, VariantKey};

/// Source of type discriminators for type-test placeholders.
pub trait TypeIdRegistry: Send + Sync {
    /// `None` when the type has no identifier assigned.
    fn type_id(&self, ty: &TypeDescriptor) -> Option<i32>;
}

/// Registry backed by a name → id map.
#[derive(Debug, Default, Clone)]
pub struct TypeIdMap {
    ids: HashMap<String, i32>,
}

impl TypeIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, id: i32) -> Self {
        self.ids.insert(name.into(), id);
        self
    }
}

impl TypeIdRegistry for TypeIdMap {
    fn type_id(&self, ty: &TypeDescriptor) -> Option<i32> {
        self.ids.get(&ty.name).copied()
    }
}

/// Per-execution render settings of a compiled command.
#[derive(Default, Clone)]
pub struct SqlPostCompilerConfiguration {
    alternative_branches: HashSet<VariantKey>,
    placeholder_values: HashMap<PlaceholderId, String>,
    dynamic_filter_values: HashMap<DynamicFilterId, Vec<Vec<String>>>,
    type_ids: Option<Arc<dyn TypeIdRegistry>>,
}

impl SqlPostCompilerConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the alternative branch of every variant keyed by `key`.
    pub fn select_alternative(mut self, key: VariantKey) -> Self {
        self.alternative_branches.insert(key);
        self
    }

    pub fn bind_placeholder(mut self, id: PlaceholderId, value: impl Into<String>) -> Self {
        self.placeholder_values.insert(id, value.into());
        self
    }

    /// Bind the rows of a dynamic filter. Each row holds one rendered value
    /// per filtered expression.
    pub fn bind_dynamic_filter(mut self, id: DynamicFilterId, rows: Vec<Vec<String>>) -> Self {
        self.dynamic_filter_values.insert(id, rows);
        self
    }

    pub fn with_type_registry(mut self, registry: Arc<dyn TypeIdRegistry>) -> Self {
        self.type_ids = Some(registry);
        self
    }

    pub fn is_alternative(&self, key: &VariantKey) -> bool {
        self.alternative_branches.contains(key)
    }

    pub fn placeholder_value(&self, id: &PlaceholderId) -> Option<&str> {
        self.placeholder_values.get(id).map(String::as_str)
    }

    pub fn dynamic_filter_rows(&self, id: &DynamicFilterId) -> Option<&[Vec<String>]> {
        self.dynamic_filter_values.get(id).map(Vec::as_slice)
    }

    pub fn type_id(&self, ty: &TypeDescriptor) -> Option<i32> {
        self.type_ids.as_ref().and_then(|r| r.type_id(ty))
    }
}
