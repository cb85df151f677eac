//! Shared node handles, identity and tree cloning.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use super::types::*;
use crate::error::{Result, SqlError};
use crate::schema::IndexDef;

/// Handle to a SQL DOM node.
///
/// `Clone` on the handle shares the node; use [`SqlRef::deep_clone`] or
/// [`SqlRef::copy_tree`] to copy a subtree.
#[derive(Clone)]
pub struct SqlRef(Rc<RefCell<SqlNode>>);

/// Identity of a node: the address of its allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

thread_local! {
    static NULL: SqlRef = SqlRef(Rc::new(RefCell::new(SqlNode::Null)));
}

/// Identity-keyed memo of one deep-clone pass.
#[derive(Default)]
pub struct CloneContext {
    clones: HashMap<NodeId, SqlRef>,
}

impl CloneContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone previously produced for `original` in this pass.
    pub fn get(&self, original: &SqlRef) -> Option<SqlRef> {
        self.clones.get(&original.id()).cloned()
    }

    pub fn len(&self) -> usize {
        self.clones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clones.is_empty()
    }
}

impl SqlRef {
    /// Wrap a node. `SqlNode::Null` yields the interned null.
    pub fn new(node: SqlNode) -> Self {
        match node {
            SqlNode::Null => Self::null(),
            node => SqlRef(Rc::new(RefCell::new(node))),
        }
    }

    /// The shared null node. Nulls carry no state, so there is one per thread.
    pub fn null() -> Self {
        NULL.with(Clone::clone)
    }

    pub fn id(&self) -> NodeId {
        NodeId(Rc::as_ptr(&self.0) as *const () as usize)
    }

    pub fn kind(&self) -> SqlNodeKind {
        self.0.borrow().kind()
    }

    pub fn node(&self) -> Ref<'_, SqlNode> {
        self.0.borrow()
    }

    pub fn is_null(&self) -> bool {
        matches!(&*self.0.borrow(), SqlNode::Null)
    }

    pub fn same_node(&self, other: &SqlRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_select(&self) -> Option<Ref<'_, SqlSelect>> {
        Ref::filter_map(self.0.borrow(), |node| match node {
            SqlNode::Select(select) => Some(select),
            _ => None,
        })
        .ok()
    }

    pub fn select_mut(&self) -> Option<RefMut<'_, SqlSelect>> {
        RefMut::filter_map(self.0.borrow_mut(), |node| match node {
            SqlNode::Select(select) => Some(select),
            _ => None,
        })
        .ok()
    }

    /// Replace this node's content with a shallow copy of `other`'s content.
    ///
    /// Both nodes must be of the same kind; on mismatch nothing changes.
    pub fn replace_with(&self, other: &SqlRef) -> Result<()> {
        if self.same_node(other) {
            return Ok(());
        }
        let expected = self.kind();
        let actual = other.kind();
        if expected != actual {
            return Err(SqlError::NodeKindMismatch { expected, actual });
        }
        let content = other.0.borrow().clone();
        *self.0.borrow_mut() = content;
        Ok(())
    }

    /// Direct children in rendering order.
    pub fn children(&self) -> Vec<SqlRef> {
        let mut children = Vec::new();
        for_each_child(&self.0.borrow(), &mut |child: &SqlRef| {
            children.push(child.clone())
        });
        children
    }

    /// Point this node's children at the handles returned by `f`.
    ///
    /// The node keeps its kind. Returns how many child links changed.
    pub fn rewrite_children(&self, f: &mut dyn FnMut(&SqlRef) -> SqlRef) -> usize {
        let mut changed = 0;
        let rewritten = map_children(&self.0.borrow(), &mut |child: &SqlRef| {
            let replacement = f(child);
            if !replacement.same_node(child) {
                changed += 1;
            }
            replacement
        });
        if changed > 0 {
            *self.0.borrow_mut() = rewritten;
        }
        changed
    }

    /// Deep-copy the subtree.
    ///
    /// A node reached twice yields the same clone twice, so shared
    /// subexpressions stay shared. The clone is registered before its
    /// children are visited, which also terminates on cyclic input.
    pub fn deep_clone(&self, ctx: &mut CloneContext) -> SqlRef {
        if let Some(existing) = ctx.clones.get(&self.id()) {
            return existing.clone();
        }
        if self.is_null() {
            return self.clone();
        }
        let clone = SqlRef(Rc::new(RefCell::new(SqlNode::Null)));
        ctx.clones.insert(self.id(), clone.clone());
        let copied = map_children(&self.0.borrow(), &mut |child: &SqlRef| {
            child.deep_clone(ctx)
        });
        *clone.0.borrow_mut() = copied;
        clone
    }

    /// Deep-copy with a fresh clone context.
    pub fn copy_tree(&self) -> SqlRef {
        self.deep_clone(&mut CloneContext::new())
    }

    // constructors

    pub fn literal(value: SqlLiteral) -> Self {
        Self::new(SqlNode::Literal(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::literal(SqlLiteral::Integer(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(SqlLiteral::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal(SqlLiteral::Boolean(value))
    }

    pub fn column(table: Option<&str>, name: impl Into<String>) -> Self {
        Self::new(SqlNode::Column(SqlColumnRef {
            table: table.map(str::to_string),
            name: name.into(),
        }))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(SqlNode::Variable(SqlVariable { name: name.into() }))
    }

    pub fn parameter(parameter: QueryParameter) -> Self {
        Self::new(SqlNode::Parameter(parameter))
    }

    pub fn placeholder(id: PlaceholderId) -> Self {
        Self::new(SqlNode::Placeholder(id))
    }

    pub fn binary(op: SqlBinaryOperator, left: SqlRef, right: SqlRef) -> Self {
        Self::new(SqlNode::Binary(SqlBinary { op, left, right }))
    }

    pub fn eq(left: SqlRef, right: SqlRef) -> Self {
        Self::binary(SqlBinaryOperator::Eq, left, right)
    }

    pub fn and(left: SqlRef, right: SqlRef) -> Self {
        Self::binary(SqlBinaryOperator::And, left, right)
    }

    pub fn unary(op: SqlUnaryOperator, operand: SqlRef) -> Self {
        Self::new(SqlNode::Unary(SqlUnary { op, operand }))
    }

    pub fn function(function: SqlFunctionType, args: Vec<SqlRef>) -> Self {
        Self::new(SqlNode::Function(SqlFunctionCall { function, args }))
    }

    pub fn aggregate(kind: SqlAggregateType, distinct: bool, operand: Option<SqlRef>) -> Self {
        Self::new(SqlNode::Aggregate(SqlAggregate {
            kind,
            distinct,
            operand,
        }))
    }

    pub fn cast(operand: SqlRef, target: SqlType) -> Self {
        Self::new(SqlNode::Cast(SqlCast { operand, target }))
    }

    pub fn case(branches: Vec<(SqlRef, SqlRef)>, otherwise: Option<SqlRef>) -> Self {
        Self::new(SqlNode::Case(SqlCase {
            branches,
            otherwise,
        }))
    }

    pub fn row(items: Vec<SqlRef>) -> Self {
        Self::new(SqlNode::Row(SqlRow { items }))
    }

    pub fn dynamic_filter(filter: SqlDynamicFilter) -> Self {
        Self::new(SqlNode::DynamicFilter(filter))
    }

    pub fn subquery(query: SqlRef) -> Self {
        Self::new(SqlNode::SubQuery(SqlSubQuery { query }))
    }

    pub fn variant(key: VariantKey, main: SqlRef, alternative: SqlRef) -> Self {
        Self::new(SqlNode::Variant(SqlVariant {
            key,
            main,
            alternative,
        }))
    }

    pub fn row_number(order_by: Vec<SqlOrder>) -> Self {
        Self::new(SqlNode::RowNumber(SqlRowNumber { order_by }))
    }

    pub fn native(text: impl Into<String>) -> Self {
        Self::new(SqlNode::Native(text.into()))
    }

    pub fn table(schema: Option<&str>, name: impl Into<String>, alias: Option<&str>) -> Self {
        Self::new(SqlNode::Table(SqlTableRef {
            schema: schema.map(str::to_string),
            name: name.into(),
            alias: alias.map(str::to_string),
        }))
    }

    pub fn query_ref(query: SqlRef, alias: impl Into<String>) -> Self {
        Self::new(SqlNode::QueryRef(SqlQueryRef {
            query,
            alias: alias.into(),
        }))
    }

    pub fn join(kind: SqlJoinKind, left: SqlRef, right: SqlRef, on: Option<SqlRef>) -> Self {
        Self::new(SqlNode::Join(SqlJoin {
            kind,
            left,
            right,
            on,
        }))
    }

    pub fn select(select: SqlSelect) -> Self {
        Self::new(SqlNode::Select(select))
    }

    pub fn create_index(index: Arc<IndexDef>) -> Self {
        Self::new(SqlNode::CreateIndex(SqlCreateIndex { index }))
    }
}

impl fmt::Debug for SqlRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(node) => node.fmt(f),
            Err(_) => write!(f, "<borrowed {:?}>", self.id()),
        }
    }
}

fn for_each_child(node: &SqlNode, f: &mut dyn FnMut(&SqlRef)) {
    match node {
        SqlNode::Null
        | SqlNode::Literal(_)
        | SqlNode::Column(_)
        | SqlNode::Variable(_)
        | SqlNode::Parameter(_)
        | SqlNode::Placeholder(_)
        | SqlNode::Native(_)
        | SqlNode::Table(_)
        | SqlNode::CreateIndex(_) => {}
        SqlNode::Binary(b) => {
            f(&b.left);
            f(&b.right);
        }
        SqlNode::Unary(u) => f(&u.operand),
        SqlNode::Function(call) => call.args.iter().for_each(|a| f(a)),
        SqlNode::Aggregate(a) => {
            if let Some(operand) = &a.operand {
                f(operand);
            }
        }
        SqlNode::Cast(c) => f(&c.operand),
        SqlNode::Case(c) => {
            for (when, then) in &c.branches {
                f(when);
                f(then);
            }
            if let Some(otherwise) = &c.otherwise {
                f(otherwise);
            }
        }
        SqlNode::Row(r) => r.items.iter().for_each(|i| f(i)),
        SqlNode::DynamicFilter(d) => d.expressions().iter().for_each(|e| f(e)),
        SqlNode::SubQuery(s) => f(&s.query),
        SqlNode::Variant(v) => {
            f(&v.main);
            f(&v.alternative);
        }
        SqlNode::RowNumber(r) => r.order_by.iter().for_each(|o| f(&o.expr)),
        SqlNode::QueryRef(q) => f(&q.query),
        SqlNode::Join(j) => {
            f(&j.left);
            f(&j.right);
            if let Some(on) = &j.on {
                f(on);
            }
        }
        SqlNode::Select(s) => {
            s.columns.iter().for_each(|c| f(&c.expr));
            if let Some(from) = &s.from {
                f(from);
            }
            if let Some(filter) = &s.filter {
                f(filter);
            }
            s.group_by.iter().for_each(|g| f(g));
            if let Some(having) = &s.having {
                f(having);
            }
            s.order_by.iter().for_each(|o| f(&o.expr));
            if let Some(limit) = &s.limit {
                f(limit);
            }
            if let Some(offset) = &s.offset {
                f(offset);
            }
        }
        SqlNode::Insert(i) => {
            f(&i.table);
            i.values.iter().for_each(|v| f(v));
        }
        SqlNode::Update(u) => {
            f(&u.table);
            u.assignments.iter().for_each(|(_, v)| f(v));
            if let Some(filter) = &u.filter {
                f(filter);
            }
        }
        SqlNode::Delete(d) => {
            f(&d.table);
            if let Some(filter) = &d.filter {
                f(filter);
            }
        }
    }
}

fn map_children(node: &SqlNode, f: &mut dyn FnMut(&SqlRef) -> SqlRef) -> SqlNode {
    match node {
        SqlNode::Null => SqlNode::Null,
        SqlNode::Literal(l) => SqlNode::Literal(l.clone()),
        SqlNode::Column(c) => SqlNode::Column(c.clone()),
        SqlNode::Variable(v) => SqlNode::Variable(v.clone()),
        SqlNode::Parameter(p) => SqlNode::Parameter(p.clone()),
        SqlNode::Placeholder(p) => SqlNode::Placeholder(p.clone()),
        SqlNode::Native(text) => SqlNode::Native(text.clone()),
        SqlNode::Table(t) => SqlNode::Table(t.clone()),
        SqlNode::CreateIndex(c) => SqlNode::CreateIndex(c.clone()),
        SqlNode::Binary(b) => SqlNode::Binary(SqlBinary {
            op: b.op,
            left: f(&b.left),
            right: f(&b.right),
        }),
        SqlNode::Unary(u) => SqlNode::Unary(SqlUnary {
            op: u.op,
            operand: f(&u.operand),
        }),
        SqlNode::Function(call) => SqlNode::Function(SqlFunctionCall {
            function: call.function,
            args: call.args.iter().map(|a| f(a)).collect(),
        }),
        SqlNode::Aggregate(a) => SqlNode::Aggregate(SqlAggregate {
            kind: a.kind,
            distinct: a.distinct,
            operand: map_opt(&a.operand, f),
        }),
        SqlNode::Cast(c) => SqlNode::Cast(SqlCast {
            operand: f(&c.operand),
            target: c.target,
        }),
        SqlNode::Case(c) => SqlNode::Case(SqlCase {
            branches: c.branches.iter().map(|(w, t)| (f(w), f(t))).collect(),
            otherwise: map_opt(&c.otherwise, f),
        }),
        SqlNode::Row(r) => SqlNode::Row(SqlRow {
            items: r.items.iter().map(|i| f(i)).collect(),
        }),
        SqlNode::DynamicFilter(d) => SqlNode::DynamicFilter(d.map_expressions(|e| f(e))),
        SqlNode::SubQuery(s) => SqlNode::SubQuery(SqlSubQuery {
            query: f(&s.query),
        }),
        SqlNode::Variant(v) => SqlNode::Variant(SqlVariant {
            key: v.key.clone(),
            main: f(&v.main),
            alternative: f(&v.alternative),
        }),
        SqlNode::RowNumber(r) => SqlNode::RowNumber(SqlRowNumber {
            order_by: map_orders(&r.order_by, f),
        }),
        SqlNode::QueryRef(q) => SqlNode::QueryRef(SqlQueryRef {
            query: f(&q.query),
            alias: q.alias.clone(),
        }),
        SqlNode::Join(j) => SqlNode::Join(SqlJoin {
            kind: j.kind,
            left: f(&j.left),
            right: f(&j.right),
            on: map_opt(&j.on, f),
        }),
        SqlNode::Select(s) => SqlNode::Select(SqlSelect {
            distinct: s.distinct,
            columns: s
                .columns
                .iter()
                .map(|c| SqlColumn {
                    expr: f(&c.expr),
                    alias: c.alias.clone(),
                })
                .collect(),
            from: map_opt(&s.from, f),
            filter: map_opt(&s.filter, f),
            group_by: s.group_by.iter().map(|g| f(g)).collect(),
            having: map_opt(&s.having, f),
            order_by: map_orders(&s.order_by, f),
            limit: map_opt(&s.limit, f),
            offset: map_opt(&s.offset, f),
            lock: s.lock,
        }),
        SqlNode::Insert(i) => SqlNode::Insert(SqlInsert {
            table: f(&i.table),
            columns: i.columns.clone(),
            values: i.values.iter().map(|v| f(v)).collect(),
        }),
        SqlNode::Update(u) => SqlNode::Update(SqlUpdate {
            table: f(&u.table),
            assignments: u
                .assignments
                .iter()
                .map(|(name, v)| (name.clone(), f(v)))
                .collect(),
            filter: map_opt(&u.filter, f),
        }),
        SqlNode::Delete(d) => SqlNode::Delete(SqlDelete {
            table: f(&d.table),
            filter: map_opt(&d.filter, f),
        }),
    }
}

fn map_opt(child: &Option<SqlRef>, f: &mut dyn FnMut(&SqlRef) -> SqlRef) -> Option<SqlRef> {
    child.as_ref().map(|c| f(c))
}

fn map_orders(orders: &[SqlOrder], f: &mut dyn FnMut(&SqlRef) -> SqlRef) -> Vec<SqlOrder> {
    orders
        .iter()
        .map(|o| SqlOrder {
            expr: f(&o.expr),
            ascending: o.ascending,
            nulls_first: o.nulls_first,
        })
        .collect()
}
