//! Double dispatch over SQL DOM nodes.
//!
//! [`SqlVisitor`] has one required method per node kind and no fallback, so a
//! new node kind does not compile until every visitor handles it.

use std::collections::HashSet;

use super::node::{NodeId, SqlRef};
use super::types::*;

pub trait SqlVisitor {
    type Output;

    fn visit_null(&mut self) -> Self::Output;
    fn visit_literal(&mut self, literal: &SqlLiteral) -> Self::Output;
    fn visit_column(&mut self, column: &SqlColumnRef) -> Self::Output;
    fn visit_variable(&mut self, variable: &SqlVariable) -> Self::Output;
    fn visit_parameter(&mut self, parameter: &QueryParameter) -> Self::Output;
    fn visit_placeholder(&mut self, id: &PlaceholderId) -> Self::Output;
    fn visit_binary(&mut self, binary: &SqlBinary) -> Self::Output;
    fn visit_unary(&mut self, unary: &SqlUnary) -> Self::Output;
    fn visit_function(&mut self, call: &SqlFunctionCall) -> Self::Output;
    fn visit_aggregate(&mut self, aggregate: &SqlAggregate) -> Self::Output;
    fn visit_cast(&mut self, cast: &SqlCast) -> Self::Output;
    fn visit_case(&mut self, case: &SqlCase) -> Self::Output;
    fn visit_row(&mut self, row: &SqlRow) -> Self::Output;
    fn visit_dynamic_filter(&mut self, filter: &SqlDynamicFilter) -> Self::Output;
    fn visit_subquery(&mut self, subquery: &SqlSubQuery) -> Self::Output;
    fn visit_variant(&mut self, variant: &SqlVariant) -> Self::Output;
    fn visit_row_number(&mut self, row_number: &SqlRowNumber) -> Self::Output;
    fn visit_native(&mut self, text: &str) -> Self::Output;
    fn visit_table(&mut self, table: &SqlTableRef) -> Self::Output;
    fn visit_query_ref(&mut self, query_ref: &SqlQueryRef) -> Self::Output;
    fn visit_join(&mut self, join: &SqlJoin) -> Self::Output;
    fn visit_select(&mut self, select: &SqlSelect) -> Self::Output;
    fn visit_insert(&mut self, insert: &SqlInsert) -> Self::Output;
    fn visit_update(&mut self, update: &SqlUpdate) -> Self::Output;
    fn visit_delete(&mut self, delete: &SqlDelete) -> Self::Output;
    fn visit_create_index(&mut self, create: &SqlCreateIndex) -> Self::Output;
}

impl SqlRef {
    /// Dispatch to the visitor method for this node's kind.
    ///
    /// The node stays borrowed for the duration of the call; visitors must
    /// not rewrite the node they are visiting.
    pub fn accept<V: SqlVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        let node = self.node();
        match &*node {
            SqlNode::Null => visitor.visit_null(),
            SqlNode::Literal(l) => visitor.visit_literal(l),
            SqlNode::Column(c) => visitor.visit_column(c),
            SqlNode::Variable(v) => visitor.visit_variable(v),
            SqlNode::Parameter(p) => visitor.visit_parameter(p),
            SqlNode::Placeholder(p) => visitor.visit_placeholder(p),
            SqlNode::Binary(b) => visitor.visit_binary(b),
            SqlNode::Unary(u) => visitor.visit_unary(u),
            SqlNode::Function(f) => visitor.visit_function(f),
            SqlNode::Aggregate(a) => visitor.visit_aggregate(a),
            SqlNode::Cast(c) => visitor.visit_cast(c),
            SqlNode::Case(c) => visitor.visit_case(c),
            SqlNode::Row(r) => visitor.visit_row(r),
            SqlNode::DynamicFilter(d) => visitor.visit_dynamic_filter(d),
            SqlNode::SubQuery(s) => visitor.visit_subquery(s),
            SqlNode::Variant(v) => visitor.visit_variant(v),
            SqlNode::RowNumber(r) => visitor.visit_row_number(r),
            SqlNode::Native(text) => visitor.visit_native(text),
            SqlNode::Table(t) => visitor.visit_table(t),
            SqlNode::QueryRef(q) => visitor.visit_query_ref(q),
            SqlNode::Join(j) => visitor.visit_join(j),
            SqlNode::Select(s) => visitor.visit_select(s),
            SqlNode::Insert(i) => visitor.visit_insert(i),
            SqlNode::Update(u) => visitor.visit_update(u),
            SqlNode::Delete(d) => visitor.visit_delete(d),
            SqlNode::CreateIndex(c) => visitor.visit_create_index(c),
        }
    }
}

/// Collects the distinct query parameters referenced by a tree, in first-use
/// order.
#[derive(Default)]
pub struct ParameterCollector {
    parameters: Vec<QueryParameter>,
    seen: HashSet<NodeId>,
}

impl ParameterCollector {
    pub fn collect(root: &SqlRef) -> Vec<QueryParameter> {
        let mut collector = Self::default();
        collector.walk(root);
        collector.parameters
    }

    fn walk(&mut self, node: &SqlRef) {
        if self.seen.insert(node.id()) {
            node.accept(self);
        }
    }

    fn walk_all<'a>(&mut self, nodes: impl IntoIterator<Item = &'a SqlRef>) {
        for node in nodes {
            self.walk(node);
        }
    }

    fn push(&mut self, parameter: &QueryParameter) {
        if !self.parameters.iter().any(|p| p.same_as(parameter)) {
            self.parameters.push(parameter.clone());
        }
    }
}

impl SqlVisitor for ParameterCollector {
    type Output = ();

    fn visit_null(&mut self) {}
    fn visit_literal(&mut self, _: &SqlLiteral) {}
    fn visit_column(&mut self, _: &SqlColumnRef) {}
    fn visit_variable(&mut self, _: &SqlVariable) {}

    fn visit_parameter(&mut self, parameter: &QueryParameter) {
        self.push(parameter);
    }

    fn visit_placeholder(&mut self, _: &PlaceholderId) {}

    fn visit_binary(&mut self, binary: &SqlBinary) {
        self.walk(&binary.left);
        self.walk(&binary.right);
    }

    fn visit_unary(&mut self, unary: &SqlUnary) {
        self.walk(&unary.operand);
    }

    fn visit_function(&mut self, call: &SqlFunctionCall) {
        self.walk_all(&call.args);
    }

    fn visit_aggregate(&mut self, aggregate: &SqlAggregate) {
        self.walk_all(&aggregate.operand);
    }

    fn visit_cast(&mut self, cast: &SqlCast) {
        self.walk(&cast.operand);
    }

    fn visit_case(&mut self, case: &SqlCase) {
        for (when, then) in &case.branches {
            self.walk(when);
            self.walk(then);
        }
        self.walk_all(&case.otherwise);
    }

    fn visit_row(&mut self, row: &SqlRow) {
        self.walk_all(&row.items);
    }

    fn visit_dynamic_filter(&mut self, filter: &SqlDynamicFilter) {
        self.walk_all(filter.expressions());
    }

    fn visit_subquery(&mut self, subquery: &SqlSubQuery) {
        self.walk(&subquery.query);
    }

    fn visit_variant(&mut self, variant: &SqlVariant) {
        if let VariantKey::NullParameter(p) = &variant.key {
            self.push(p);
        }
        self.walk(&variant.main);
        self.walk(&variant.alternative);
    }

    fn visit_row_number(&mut self, row_number: &SqlRowNumber) {
        self.walk_all(row_number.order_by.iter().map(|o| &o.expr));
    }

    fn visit_native(&mut self, _: &str) {}
    fn visit_table(&mut self, _: &SqlTableRef) {}

    fn visit_query_ref(&mut self, query_ref: &SqlQueryRef) {
        self.walk(&query_ref.query);
    }

    fn visit_join(&mut self, join: &SqlJoin) {
        self.walk(&join.left);
        self.walk(&join.right);
        self.walk_all(&join.on);
    }

    fn visit_select(&mut self, select: &SqlSelect) {
        self.walk_all(select.columns.iter().map(|c| &c.expr));
        self.walk_all(&select.from);
        self.walk_all(&select.filter);
        self.walk_all(&select.group_by);
        self.walk_all(&select.having);
        self.walk_all(select.order_by.iter().map(|o| &o.expr));
        self.walk_all(&select.limit);
        self.walk_all(&select.offset);
    }

    fn visit_insert(&mut self, insert: &SqlInsert) {
        self.walk(&insert.table);
        self.walk_all(&insert.values);
    }

    fn visit_update(&mut self, update: &SqlUpdate) {
        self.walk(&update.table);
        self.walk_all(update.assignments.iter().map(|(_, v)| v));
        self.walk_all(&update.filter);
    }

    fn visit_delete(&mut self, delete: &SqlDelete) {
        self.walk(&delete.table);
        self.walk_all(&delete.filter);
    }

    fn visit_create_index(&mut self, _: &SqlCreateIndex) {}
}

/// Node statistics of a tree, counting shared nodes once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NodeCount {
    pub distinct: usize,
    pub references: usize,
}

pub fn count_nodes(root: &SqlRef) -> NodeCount {
    let mut seen = HashSet::new();
    let mut count = NodeCount::default();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        count.references += 1;
        if seen.insert(node.id()) {
            count.distinct += 1;
            stack.extend(node.children());
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_collector_deduplicates() {
        let p = QueryParameter::new("id");
        let q = QueryParameter::new("id");
        let filter = SqlRef::and(
            SqlRef::eq(SqlRef::column(None, "a"), SqlRef::parameter(p.clone())),
            SqlRef::and(
                SqlRef::eq(SqlRef::column(None, "b"), SqlRef::parameter(q.clone())),
                SqlRef::eq(SqlRef::column(None, "c"), SqlRef::parameter(p.clone())),
            ),
        );
        let params = ParameterCollector::collect(&filter);
        assert_eq!(params.len(), 2);
        assert!(params[0].same_as(&p));
        assert!(params[1].same_as(&q));
    }

    #[test]
    fn test_count_nodes_counts_shared_once() {
        let shared = SqlRef::column(None, "x");
        let expr = SqlRef::binary(SqlBinaryOperator::Plus, shared.clone(), shared);
        let count = count_nodes(&expr);
        assert_eq!(count.distinct, 2);
        assert_eq!(count.references, 3);
    }

    struct KindName;

    impl SqlVisitor for KindName {
        type Output = &'static str;
        fn visit_null(&mut self) -> &'static str { "null" }
        fn visit_literal(&mut self, _: &SqlLiteral) -> &'static str { "literal" }
        fn visit_column(&mut self, _: &SqlColumnRef) -> &'static str { "column" }
        fn visit_variable(&mut self, _: &SqlVariable) -> &'static str { "variable" }
        fn visit_parameter(&mut self, _: &QueryParameter) -> &'static str { "parameter" }
        fn visit_placeholder(&mut self, _: &PlaceholderId) -> &'static str { "placeholder" }
        fn visit_binary(&mut self, _: &SqlBinary) -> &'static str { "binary" }
        fn visit_unary(&mut self, _: &SqlUnary) -> &'static str { "unary" }
        fn visit_function(&mut self, _: &SqlFunctionCall) -> &'static str { "function" }
        fn visit_aggregate(&mut self, _: &SqlAggregate) -> &'static str { "aggregate" }
        fn visit_cast(&mut self, _: &SqlCast) -> &'static str { "cast" }
        fn visit_case(&mut self, _: &SqlCase) -> &'static str { "case" }
        fn visit_row(&mut self, _: &SqlRow) -> &'static str { "row" }
        fn visit_dynamic_filter(&mut self, _: &SqlDynamicFilter) -> &'static str { "dynamic_filter" }
        fn visit_subquery(&mut self, _: &SqlSubQuery) -> &'static str { "subquery" }
        fn visit_variant(&mut self, _: &SqlVariant) -> &'static str { "variant" }
        fn visit_row_number(&mut self, _: &SqlRowNumber) -> &'static str { "row_number" }
        fn visit_native(&mut self, _: &str) -> &'static str { "native" }
        fn visit_table(&mut self, _: &SqlTableRef) -> &'static str { "table" }
        fn visit_query_ref(&mut self, _: &SqlQueryRef) -> &'static str { "query_ref" }
        fn visit_join(&mut self, _: &SqlJoin) -> &'static str { "join" }
        fn visit_select(&mut self, _: &SqlSelect) -> &'static str { "select" }
        fn visit_insert(&mut self, _: &SqlInsert) -> &'static str { "insert" }
        fn visit_update(&mut self, _: &SqlUpdate) -> &'static str { "update" }
        fn visit_delete(&mut self, _: &SqlDelete) -> &'static str { "delete" }
        fn visit_create_index(&mut self, _: &SqlCreateIndex) -> &'static str { "create_index" }
    }

    #[test]
    fn test_accept_dispatches_by_kind() {
        assert_eq!(SqlRef::null().accept(&mut KindName), "null");
        assert_eq!(SqlRef::integer(1).accept(&mut KindName), "literal");
        assert_eq!(SqlRef::native("now()").accept(&mut KindName), "native");
        assert_eq!(
            SqlRef::select(SqlSelect::default()).accept(&mut KindName),
            "select"
        );
    }
}
