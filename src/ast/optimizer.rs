/// SQL DOM rewrite passes.
///
/// Passes run on a compiled tree in place, between the query compiler and
/// the text compiler. Each pass proposes replacements node by node; the
/// optimizer walks the tree bottom-up so a node always sees children that
/// were already rewritten. Shared nodes are visited once.
use std::collections::HashSet;

use tracing::trace;

use super::node::SqlRef;
use super::types::*;
use crate::error::Result;

/// A single rewrite pass over a SQL DOM tree.
///
/// # Example
///
/// ```ignore
/// struct DropNativeComments;
///
/// impl OptimizationPass for DropNativeComments {
///     fn name(&self) -> &str { "drop_native_comments" }
///     fn rewrite(&self, node: &SqlRef) -> Option<SqlRef> {
///         // return a replacement handle, or None to keep the node
///     }
/// }
/// ```
pub trait OptimizationPass: Send + Sync {
    /// Unique name identifying this pass.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Replacement for `node`, or `None` to keep it.
    fn rewrite(&self, node: &SqlRef) -> Option<SqlRef>;
}

/// Manages and executes a pipeline of rewrite passes.
#[derive(Default)]
pub struct Optimizer {
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl Optimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an optimizer with the default set of passes.
    pub fn with_defaults() -> Self {
        let mut opt = Self::new();
        opt.add_pass(Box::new(FoldBooleanConstants));
        opt.add_pass(Box::new(RemoveRedundantCast));
        opt
    }

    pub fn add_pass(&mut self, pass: Box<dyn OptimizationPass>) {
        self.passes.push(pass);
    }

    /// Run all passes on `root` in order. Returns the number of rewrites.
    ///
    /// The root itself can only be rewritten into a node of its own kind.
    pub fn optimize(&self, root: &SqlRef) -> Result<usize> {
        let mut total = 0;
        for pass in &self.passes {
            let count = apply_pass(pass.as_ref(), root)?;
            trace!(pass = pass.name(), rewrites = count, "optimization pass done");
            total += count;
        }
        Ok(total)
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

fn apply_pass(pass: &dyn OptimizationPass, root: &SqlRef) -> Result<usize> {
    let mut count = 0;
    for node in post_order(root) {
        count += node.rewrite_children(&mut |child: &SqlRef| {
            pass.rewrite(child).unwrap_or_else(|| child.clone())
        });
    }
    if let Some(replacement) = pass.rewrite(root) {
        root.replace_with(&replacement)?;
        count += 1;
    }
    Ok(count)
}

/// Distinct nodes of the tree, children before parents.
fn post_order(root: &SqlRef) -> Vec<SqlRef> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![(root.clone(), false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !seen.insert(node.id()) {
            continue;
        }
        let children = node.children();
        stack.push((node, true));
        stack.extend(children.into_iter().rev().map(|c| (c, false)));
    }
    order
}

fn boolean_literal(node: &SqlRef) -> Option<bool> {
    match &*node.node() {
        SqlNode::Literal(SqlLiteral::Boolean(value)) => Some(*value),
        _ => None,
    }
}

/// `x AND TRUE` → `x`, `x OR TRUE` → `TRUE`, `NOT FALSE` → `TRUE`.
pub struct FoldBooleanConstants;

impl OptimizationPass for FoldBooleanConstants {
    fn name(&self) -> &str {
        "fold_boolean_constants"
    }

    fn description(&self) -> &str {
        "Removes boolean literals from AND/OR chains"
    }

    fn rewrite(&self, node: &SqlRef) -> Option<SqlRef> {
        let content = node.node();
        match &*content {
            SqlNode::Binary(SqlBinary { op, left, right })
                if matches!(op, SqlBinaryOperator::And | SqlBinaryOperator::Or) =>
            {
                // identity element of the operator, absorbing element is its negation
                let identity = *op == SqlBinaryOperator::And;
                match (boolean_literal(left), boolean_literal(right)) {
                    (Some(l), _) if l == identity => Some(right.clone()),
                    (_, Some(r)) if r == identity => Some(left.clone()),
                    (Some(_), _) => Some(left.clone()),
                    (_, Some(_)) => Some(right.clone()),
                    _ => None,
                }
            }
            SqlNode::Unary(SqlUnary {
                op: SqlUnaryOperator::Not,
                operand,
            }) => boolean_literal(operand).map(|value| SqlRef::boolean(!value)),
            _ => None,
        }
    }
}

/// `CAST(CAST(x AS t) AS t)` → `CAST(x AS t)`.
pub struct RemoveRedundantCast;

impl OptimizationPass for RemoveRedundantCast {
    fn name(&self) -> &str {
        "remove_redundant_cast"
    }

    fn description(&self) -> &str {
        "Collapses nested casts to the same type"
    }

    fn rewrite(&self, node: &SqlRef) -> Option<SqlRef> {
        let content = node.node();
        let SqlNode::Cast(outer) = &*content else {
            return None;
        };
        let inner = outer.operand.node();
        match &*inner {
            SqlNode::Cast(cast) if cast.target == outer.target => Some(outer.operand.clone()),
            _ => None,
        }
    }
}
