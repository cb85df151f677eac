//! Compiled commands and their final text rendering.
//!
//! The DOM compiler produces a chain of [`PostCompileNode`]s: literal text
//! interleaved with the few pieces that can only be decided per execution
//! (placeholders, alternative branches and dynamic IN-lists). Rendering the
//! chain with a [`SqlPostCompilerConfiguration`] yields the command text. A
//! chain made of text only is frozen into a single string at construction.
mod configuration;

pub use configuration::{SqlPostCompilerConfiguration, TypeIdMap, TypeIdRegistry};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use crate::ast::{DynamicFilterId, ParameterKey, PlaceholderId, QueryParameter, VariantKey};
use crate::error::{Result, SqlError};

#[derive(Debug, Clone, PartialEq)]
pub enum PostCompileNode {
    Text(String),
    Placeholder(PlaceholderId),
    Variant {
        key: VariantKey,
        main: Vec<PostCompileNode>,
        alternative: Vec<PostCompileNode>,
    },
    DynamicFilter {
        id: DynamicFilterId,
        expressions: Vec<Vec<PostCompileNode>>,
    },
}

/// Appends text to a chain, merging it into a trailing text node.
pub fn push_text(chain: &mut Vec<PostCompileNode>, text: &str) {
    if text.is_empty() {
        return;
    }
    match chain.last_mut() {
        Some(PostCompileNode::Text(last)) => last.push_str(text),
        _ => chain.push(PostCompileNode::Text(text.to_string())),
    }
}

/// Appends a chain to another, merging adjacent text.
pub fn append_chain(chain: &mut Vec<PostCompileNode>, other: Vec<PostCompileNode>) {
    for node in other {
        match node {
            PostCompileNode::Text(text) => push_text(chain, &text),
            node => chain.push(node),
        }
    }
}

#[derive(Debug)]
enum Body {
    Frozen(String),
    Chain(Vec<PostCompileNode>),
}

/// Result of compiling one statement, reusable across executions.
///
/// Rendering takes `&self` and is safe to run from several threads at once.
#[derive(Debug)]
pub struct SqlCompilationResult {
    body: Body,
    parameters: Vec<QueryParameter>,
    parameter_names: HashMap<ParameterKey, String>,
    placeholder_defaults: HashMap<PlaceholderId, String>,
    last_length: AtomicUsize,
}

impl SqlCompilationResult {
    /// `parameters` pairs every parameter identity with its SQL name.
    pub fn new(chain: Vec<PostCompileNode>, parameters: Vec<(QueryParameter, String)>) -> Self {
        let mut merged = Vec::with_capacity(chain.len());
        append_chain(&mut merged, chain);
        let body = match merged.as_slice() {
            [] => Body::Frozen(String::new()),
            [PostCompileNode::Text(text)] => Body::Frozen(text.clone()),
            _ => Body::Chain(merged),
        };
        let parameter_names = parameters
            .iter()
            .map(|(p, name)| (p.key(), name.clone()))
            .collect();
        Self {
            body,
            parameters: parameters.into_iter().map(|(p, _)| p).collect(),
            parameter_names,
            placeholder_defaults: HashMap::new(),
            last_length: AtomicUsize::new(0),
        }
    }

    /// Value used for `id` when the configuration does not bind it.
    pub fn with_placeholder_default(mut self, id: PlaceholderId, value: impl Into<String>) -> Self {
        self.placeholder_defaults.insert(id, value.into());
        self
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self.body, Body::Frozen(_))
    }

    /// Parameters in naming order.
    pub fn parameters(&self) -> &[QueryParameter] {
        &self.parameters
    }

    pub fn parameter_name(&self, parameter: &QueryParameter) -> Result<&str> {
        self.parameter_names
            .get(&parameter.key())
            .map(String::as_str)
            .ok_or_else(|| SqlError::ParameterNameNotFound(parameter.hint().to_string()))
    }

    pub fn command_text(&self) -> Result<String> {
        self.command_text_with(&SqlPostCompilerConfiguration::default())
    }

    pub fn command_text_with(&self, config: &SqlPostCompilerConfiguration) -> Result<String> {
        let chain = match &self.body {
            Body::Frozen(text) => return Ok(text.clone()),
            Body::Chain(chain) => chain,
        };
        let mut out = String::with_capacity(self.last_length.load(Ordering::Relaxed));
        self.render(chain, config, &mut out)?;
        self.last_length.store(out.len(), Ordering::Relaxed);
        trace!(length = out.len(), "rendered command text");
        Ok(out)
    }

    /// Length of the most recent rendering; a capacity hint only.
    pub fn size_hint(&self) -> usize {
        self.last_length.load(Ordering::Relaxed)
    }

    fn render(
        &self,
        chain: &[PostCompileNode],
        config: &SqlPostCompilerConfiguration,
        out: &mut String,
    ) -> Result<()> {
        for node in chain {
            match node {
                PostCompileNode::Text(text) => out.push_str(text),
                PostCompileNode::Placeholder(id) => out.push_str(&self.placeholder(id, config)?),
                PostCompileNode::Variant {
                    key,
                    main,
                    alternative,
                } => {
                    let branch = if config.is_alternative(key) {
                        alternative
                    } else {
                        main
                    };
                    self.render(branch, config, out)?;
                }
                PostCompileNode::DynamicFilter { id, expressions } => {
                    self.render_dynamic_filter(id, expressions, config, out)?
                }
            }
        }
        Ok(())
    }

    fn placeholder(&self, id: &PlaceholderId, config: &SqlPostCompilerConfiguration) -> Result<String> {
        if let PlaceholderId::Type(ty) = id {
            if let Some(type_id) = config.type_id(ty) {
                return Ok(type_id.to_string());
            }
        }
        config
            .placeholder_value(id)
            .or_else(|| self.placeholder_defaults.get(id).map(String::as_str))
            .map(str::to_string)
            .ok_or_else(|| SqlError::PlaceholderNotSet(id.to_string()))
    }

    fn render_dynamic_filter(
        &self,
        id: &DynamicFilterId,
        expressions: &[Vec<PostCompileNode>],
        config: &SqlPostCompilerConfiguration,
        out: &mut String,
    ) -> Result<()> {
        let rows = config
            .dynamic_filter_rows(id)
            .ok_or_else(|| SqlError::DynamicFilterNotSet(id.to_string()))?;
        if rows.is_empty() {
            out.push_str("(1 = 0)");
            return Ok(());
        }
        if let Some(row) = rows.iter().find(|r| r.len() != expressions.len()) {
            return Err(SqlError::invalid_argument(
                "rows",
                format!(
                    "dynamic filter {} filters {} expressions, got a row of {}",
                    id,
                    expressions.len(),
                    row.len()
                ),
            ));
        }

        let single = expressions.len() == 1;
        if !single {
            out.push('(');
        }
        for (i, expression) in expressions.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.render(expression, config, out)?;
        }
        out.push_str(if single { " IN (" } else { ") IN (" });
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            if single {
                out.push_str(&row[0]);
            } else {
                out.push('(');
                out.push_str(&row.join(", "));
                out.push(')');
            }
        }
        out.push(')');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::TypeDescriptor;

    fn text(s: &str) -> PostCompileNode {
        PostCompileNode::Text(s.to_string())
    }

    #[test]
    fn test_text_only_chain_is_frozen() {
        let result = SqlCompilationResult::new(vec![text("SELECT "), text("1")], Vec::new());
        assert!(result.is_frozen());
        assert_eq!(result.command_text().unwrap(), "SELECT 1");
    }

    #[test]
    fn test_type_placeholder_uses_registry() {
        let animal = PlaceholderId::Type(TypeDescriptor::new("Animal"));
        let result = SqlCompilationResult::new(
            vec![text("WHERE t0.TypeId = "), PostCompileNode::Placeholder(animal)],
            Vec::new(),
        );
        let config = SqlPostCompilerConfiguration::new()
            .with_type_registry(Arc::new(TypeIdMap::new().register("Animal", 42)));
        assert_eq!(result.command_text_with(&config).unwrap(), "WHERE t0.TypeId = 42");
    }

    #[test]
    fn test_unresolved_placeholder_fails() {
        let id = PlaceholderId::Type(TypeDescriptor::new("Unknown"));
        let result =
            SqlCompilationResult::new(vec![PostCompileNode::Placeholder(id)], Vec::new());
        let config = SqlPostCompilerConfiguration::new()
            .with_type_registry(Arc::new(TypeIdMap::new()));
        assert_eq!(
            result.command_text_with(&config).unwrap_err(),
            SqlError::PlaceholderNotSet("type:Unknown".into())
        );
    }

    #[test]
    fn test_placeholder_falls_back_to_result_default() {
        let id = PlaceholderId::Key("schema".into());
        let result = SqlCompilationResult::new(
            vec![text("SELECT * FROM "), PostCompileNode::Placeholder(id.clone())],
            Vec::new(),
        )
        .with_placeholder_default(id.clone(), "dbo");
        assert_eq!(result.command_text().unwrap(), "SELECT * FROM dbo");
        let config = SqlPostCompilerConfiguration::new().bind_placeholder(id, "sales");
        assert_eq!(result.command_text_with(&config).unwrap(), "SELECT * FROM sales");
    }

    #[test]
    fn test_variant_branch_selection() {
        let p = QueryParameter::new("name");
        let key = VariantKey::NullParameter(p.clone());
        let result = SqlCompilationResult::new(
            vec![
                text("WHERE "),
                PostCompileNode::Variant {
                    key: key.clone(),
                    main: vec![text("a = @p0")],
                    alternative: vec![text("a IS NULL")],
                },
            ],
            vec![(p.clone(), "@p0".into())],
        );
        assert_eq!(result.command_text().unwrap(), "WHERE a = @p0");
        let config = SqlPostCompilerConfiguration::new().select_alternative(key);
        assert_eq!(result.command_text_with(&config).unwrap(), "WHERE a IS NULL");
        assert_eq!(result.parameter_name(&p).unwrap(), "@p0");
    }

    #[test]
    fn test_unknown_parameter_name() {
        let result = SqlCompilationResult::new(vec![text("SELECT 1")], Vec::new());
        assert!(matches!(
            result.parameter_name(&QueryParameter::new("x")),
            Err(SqlError::ParameterNameNotFound(_))
        ));
    }

    fn filter_result(columns: &[&str]) -> (SqlCompilationResult, DynamicFilterId) {
        let id = DynamicFilterId("ids".into());
        let result = SqlCompilationResult::new(
            vec![
                text("WHERE "),
                PostCompileNode::DynamicFilter {
                    id: id.clone(),
                    expressions: columns.iter().map(|c| vec![text(c)]).collect(),
                },
            ],
            Vec::new(),
        );
        (result, id)
    }

    #[test]
    fn test_dynamic_filter_single_expression() {
        let (result, id) = filter_result(&["a"]);
        let config = SqlPostCompilerConfiguration::new()
            .bind_dynamic_filter(id, vec![vec!["1".into()], vec!["2".into()]]);
        assert_eq!(result.command_text_with(&config).unwrap(), "WHERE a IN (1, 2)");
    }

    #[test]
    fn test_dynamic_filter_row_values() {
        let (result, id) = filter_result(&["a", "b"]);
        let config = SqlPostCompilerConfiguration::new().bind_dynamic_filter(
            id,
            vec![vec!["1".into(), "2".into()], vec!["3".into(), "4".into()]],
        );
        assert_eq!(
            result.command_text_with(&config).unwrap(),
            "WHERE (a, b) IN ((1, 2), (3, 4))"
        );
    }

    #[test]
    fn test_dynamic_filter_empty_and_unbound() {
        let (result, id) = filter_result(&["a"]);
        let config = SqlPostCompilerConfiguration::new().bind_dynamic_filter(id, Vec::new());
        assert_eq!(result.command_text_with(&config).unwrap(), "WHERE (1 = 0)");
        assert_eq!(
            result.command_text().unwrap_err(),
            SqlError::DynamicFilterNotSet("ids".into())
        );
    }

    #[test]
    fn test_rendering_is_idempotent_and_tracks_size() {
        let id = PlaceholderId::Key("k".into());
        let result = SqlCompilationResult::new(
            vec![text("SELECT "), PostCompileNode::Placeholder(id.clone())],
            Vec::new(),
        );
        let config = SqlPostCompilerConfiguration::new().bind_placeholder(id, "42");
        let first = result.command_text_with(&config).unwrap();
        let second = result.command_text_with(&config).unwrap();
        assert_eq!(first, second);
        assert_eq!(result.size_hint(), first.len());
    }

    #[test]
    fn test_concurrent_rendering() {
        let id = PlaceholderId::Key("k".into());
        let result = Arc::new(SqlCompilationResult::new(
            vec![text("SELECT "), PostCompileNode::Placeholder(id.clone())],
            Vec::new(),
        ));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let result = Arc::clone(&result);
                let id = id.clone();
                std::thread::spawn(move || {
                    let config =
                        SqlPostCompilerConfiguration::new().bind_placeholder(id, i.to_string());
                    result.command_text_with(&config).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), format!("SELECT {i}"));
        }
    }
}
