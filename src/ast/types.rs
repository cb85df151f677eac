//! SQL DOM node payloads.
//!
//! Every node of a tree is a [`SqlNode`] variant behind a shared [`SqlRef`]
//! handle. The payload types here carry child handles, so a subexpression can
//! be referenced from several places of one tree (the query compiler reuses
//! column expressions in WHERE and ORDER BY) without being duplicated.
//!
//! The node model is dialect independent: nothing in this module knows how a
//! construct is spelled by a particular server.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::node::SqlRef;
use crate::schema::IndexDef;

/// Abstract column and value types. Native spellings come from the driver's
/// type mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { precision: u8, scale: u8 },
    VarChar { length: Option<u32> },
    DateTime,
    Date,
    Guid,
    Binary,
}

impl SqlType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SqlType::Int16
                | SqlType::Int32
                | SqlType::Int64
                | SqlType::Float32
                | SqlType::Float64
                | SqlType::Decimal { .. }
        )
    }
}

/// Literal values embedded directly into command text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlLiteral {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlBinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Concat,
    Like,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlUnaryOperator {
    Not,
    Negate,
    IsNull,
    IsNotNull,
    Exists,
}

/// Closed set of abstract functions a translator maps to dialect text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlFunctionType {
    // arithmetic
    Abs,
    Ceiling,
    Floor,
    Exp,
    Log,
    Log10,
    Power,
    Sign,
    Sqrt,
    Square,
    Round,
    RoundDigits,
    Truncate,
    // trigonometric
    Acos,
    Asin,
    Atan,
    Atan2,
    Cos,
    Cot,
    Sin,
    Tan,
    Degrees,
    Radians,
    // strings
    Concat,
    Length,
    Lower,
    Upper,
    Trim,
    Substring,
    Replace,
    Position,
    // date and time
    CurrentDate,
    CurrentTimestamp,
    DateTimeConstruct,
    DateTimeExtractYear,
    DateTimeExtractMonth,
    DateTimeExtractDay,
    DateTimeExtractHour,
    DateTimeExtractMinute,
    DateTimeExtractSecond,
    DateTimeExtractDayOfWeek,
    DateTimeExtractDayOfYear,
    DateTimeTruncate,
    DateTimeAddYears,
    DateTimeAddMonths,
    DateTimeAddDays,
    IntervalConstruct,
    IntervalToMilliseconds,
    // misc
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlAggregateType {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlJoinKind {
    Inner,
    LeftOuter,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlLockMode {
    Shared,
    Update,
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlLockBehavior {
    Wait,
    NoWait,
    SkipLocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SqlLock {
    pub mode: SqlLockMode,
    pub behavior: SqlLockBehavior,
}

/// A runtime query parameter.
///
/// Parameters are compared by identity, not by name: two parameters built
/// from the same name are different objects and get different SQL names.
#[derive(Clone)]
pub struct QueryParameter(Arc<ParameterInfo>);

#[derive(Debug)]
struct ParameterInfo {
    hint: String,
}

impl QueryParameter {
    pub fn new(hint: impl Into<String>) -> Self {
        QueryParameter(Arc::new(ParameterInfo { hint: hint.into() }))
    }

    /// Name used for diagnostics. Never used as the SQL name.
    pub fn hint(&self) -> &str {
        &self.0.hint
    }

    pub fn key(&self) -> ParameterKey {
        ParameterKey(Arc::as_ptr(&self.0) as usize)
    }

    pub fn same_as(&self, other: &QueryParameter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for QueryParameter {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for QueryParameter {}

impl Hash for QueryParameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for QueryParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryParameter({}@{:#x})", self.0.hint, self.key().0)
    }
}

/// Identity of a [`QueryParameter`] object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterKey(usize);

/// Description of a runtime type taking part in an inheritance hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Identifier of a value resolved at render time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlaceholderId {
    /// Resolved to the type discriminator assigned by the type registry.
    Type(TypeDescriptor),
    /// Resolved from literal placeholder bindings.
    Key(String),
}

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceholderId::Type(ty) => write!(f, "type:{}", ty.name),
            PlaceholderId::Key(key) => write!(f, "{key}"),
        }
    }
}

/// Selects between the two branches of an [`SqlVariant`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariantKey {
    /// Set when the parameter's runtime value is NULL.
    NullParameter(QueryParameter),
    Named(String),
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantKey::NullParameter(p) => write!(f, "null:{}", p.hint()),
            VariantKey::Named(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DynamicFilterId(pub String);

impl fmt::Display for DynamicFilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct SqlColumnRef {
    pub table: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SqlVariable {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SqlBinary {
    pub op: SqlBinaryOperator,
    pub left: SqlRef,
    pub right: SqlRef,
}

#[derive(Debug, Clone)]
pub struct SqlUnary {
    pub op: SqlUnaryOperator,
    pub operand: SqlRef,
}

#[derive(Debug, Clone)]
pub struct SqlFunctionCall {
    pub function: SqlFunctionType,
    pub args: Vec<SqlRef>,
}

/// Aggregate call. `operand: None` is `COUNT(*)`.
#[derive(Debug, Clone)]
pub struct SqlAggregate {
    pub kind: SqlAggregateType,
    pub distinct: bool,
    pub operand: Option<SqlRef>,
}

#[derive(Debug, Clone)]
pub struct SqlCast {
    pub operand: SqlRef,
    pub target: SqlType,
}

#[derive(Debug, Clone)]
pub struct SqlCase {
    pub branches: Vec<(SqlRef, SqlRef)>,
    pub otherwise: Option<SqlRef>,
}

/// Row constructor: `(a, b, c)`.
#[derive(Debug, Clone)]
pub struct SqlRow {
    pub items: Vec<SqlRef>,
}

/// IN-list over a runtime collection whose size is unknown until execution.
///
/// Built with [`DynamicFilterBuilder`]; the expression list cannot change
/// once the filter is part of a tree.
#[derive(Debug, Clone)]
pub struct SqlDynamicFilter {
    id: DynamicFilterId,
    expressions: Vec<SqlRef>,
}

impl SqlDynamicFilter {
    pub fn id(&self) -> &DynamicFilterId {
        &self.id
    }

    pub fn expressions(&self) -> &[SqlRef] {
        &self.expressions
    }

    pub(super) fn map_expressions(&self, mut f: impl FnMut(&SqlRef) -> SqlRef) -> Self {
        Self {
            id: self.id.clone(),
            expressions: self.expressions.iter().map(|e| f(e)).collect(),
        }
    }
}

pub struct DynamicFilterBuilder {
    id: DynamicFilterId,
    expressions: Vec<SqlRef>,
}

impl DynamicFilterBuilder {
    pub fn new(id: DynamicFilterId) -> Self {
        Self {
            id,
            expressions: Vec::new(),
        }
    }

    pub fn expression(mut self, expr: SqlRef) -> Self {
        self.expressions.push(expr);
        self
    }

    pub fn build(self) -> crate::error::Result<SqlDynamicFilter> {
        if self.expressions.is_empty() {
            return Err(crate::error::SqlError::invalid_argument(
                "expressions",
                format!("dynamic filter {} filters no expression", self.id),
            ));
        }
        Ok(SqlDynamicFilter {
            id: self.id,
            expressions: self.expressions,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SqlSubQuery {
    pub query: SqlRef,
}

/// Two mutually exclusive renderings; `main` unless `key` is selected.
#[derive(Debug, Clone)]
pub struct SqlVariant {
    pub key: VariantKey,
    pub main: SqlRef,
    pub alternative: SqlRef,
}

/// `ROW_NUMBER() OVER (ORDER BY ...)`.
#[derive(Debug, Clone)]
pub struct SqlRowNumber {
    pub order_by: Vec<SqlOrder>,
}

#[derive(Debug, Clone)]
pub struct SqlOrder {
    pub expr: SqlRef,
    pub ascending: bool,
    /// Explicit NULLS FIRST / NULLS LAST; server default when `None`.
    pub nulls_first: Option<bool>,
}

impl SqlOrder {
    pub fn new(expr: SqlRef, ascending: bool) -> Self {
        Self {
            expr,
            ascending,
            nulls_first: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlTableRef {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

/// Derived table: `(SELECT ...) AS alias`.
#[derive(Debug, Clone)]
pub struct SqlQueryRef {
    pub query: SqlRef,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub struct SqlJoin {
    pub kind: SqlJoinKind,
    pub left: SqlRef,
    pub right: SqlRef,
    pub on: Option<SqlRef>,
}

#[derive(Debug, Clone)]
pub struct SqlColumn {
    pub expr: SqlRef,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SqlSelect {
    pub distinct: bool,
    pub columns: Vec<SqlColumn>,
    pub from: Option<SqlRef>,
    pub filter: Option<SqlRef>,
    pub group_by: Vec<SqlRef>,
    pub having: Option<SqlRef>,
    pub order_by: Vec<SqlOrder>,
    pub limit: Option<SqlRef>,
    pub offset: Option<SqlRef>,
    pub lock: Option<SqlLock>,
}

impl SqlSelect {
    /// Output name of the column at `index`.
    pub fn column_name(&self, index: usize) -> Option<String> {
        let column = self.columns.get(index)?;
        match &column.alias {
            Some(alias) => Some(alias.clone()),
            None => match &*column.expr.node() {
                SqlNode::Column(c) => Some(c.name.clone()),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlInsert {
    pub table: SqlRef,
    pub columns: Vec<String>,
    pub values: Vec<SqlRef>,
}

#[derive(Debug, Clone)]
pub struct SqlUpdate {
    pub table: SqlRef,
    pub assignments: Vec<(String, SqlRef)>,
    pub filter: Option<SqlRef>,
}

#[derive(Debug, Clone)]
pub struct SqlDelete {
    pub table: SqlRef,
    pub filter: Option<SqlRef>,
}

#[derive(Debug, Clone)]
pub struct SqlCreateIndex {
    pub index: Arc<IndexDef>,
}

/// A SQL DOM node.
#[derive(Debug, Clone)]
pub enum SqlNode {
    // expressions
    Null,
    Literal(SqlLiteral),
    Column(SqlColumnRef),
    Variable(SqlVariable),
    Parameter(QueryParameter),
    Placeholder(PlaceholderId),
    Binary(SqlBinary),
    Unary(SqlUnary),
    Function(SqlFunctionCall),
    Aggregate(SqlAggregate),
    Cast(SqlCast),
    Case(SqlCase),
    Row(SqlRow),
    DynamicFilter(SqlDynamicFilter),
    SubQuery(SqlSubQuery),
    Variant(SqlVariant),
    RowNumber(SqlRowNumber),
    Native(String),
    // table references
    Table(SqlTableRef),
    QueryRef(SqlQueryRef),
    Join(SqlJoin),
    // statements
    Select(SqlSelect),
    Insert(SqlInsert),
    Update(SqlUpdate),
    Delete(SqlDelete),
    CreateIndex(SqlCreateIndex),
}

/// Discriminant of [`SqlNode`], fixed for the lifetime of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNodeKind {
    Null,
    Literal,
    Column,
    Variable,
    Parameter,
    Placeholder,
    Binary,
    Unary,
    Function,
    Aggregate,
    Cast,
    Case,
    Row,
    DynamicFilter,
    SubQuery,
    Variant,
    RowNumber,
    Native,
    Table,
    QueryRef,
    Join,
    Select,
    Insert,
    Update,
    Delete,
    CreateIndex,
}

impl SqlNode {
    pub fn kind(&self) -> SqlNodeKind {
        match self {
            SqlNode::Null => SqlNodeKind::Null,
            SqlNode::Literal(_) => SqlNodeKind::Literal,
            SqlNode::Column(_) => SqlNodeKind::Column,
            SqlNode::Variable(_) => SqlNodeKind::Variable,
            SqlNode::Parameter(_) => SqlNodeKind::Parameter,
            SqlNode::Placeholder(_) => SqlNodeKind::Placeholder,
            SqlNode::Binary(_) => SqlNodeKind::Binary,
            SqlNode::Unary(_) => SqlNodeKind::Unary,
            SqlNode::Function(_) => SqlNodeKind::Function,
            SqlNode::Aggregate(_) => SqlNodeKind::Aggregate,
            SqlNode::Cast(_) => SqlNodeKind::Cast,
            SqlNode::Case(_) => SqlNodeKind::Case,
            SqlNode::Row(_) => SqlNodeKind::Row,
            SqlNode::DynamicFilter(_) => SqlNodeKind::DynamicFilter,
            SqlNode::SubQuery(_) => SqlNodeKind::SubQuery,
            SqlNode::Variant(_) => SqlNodeKind::Variant,
            SqlNode::RowNumber(_) => SqlNodeKind::RowNumber,
            SqlNode::Native(_) => SqlNodeKind::Native,
            SqlNode::Table(_) => SqlNodeKind::Table,
            SqlNode::QueryRef(_) => SqlNodeKind::QueryRef,
            SqlNode::Join(_) => SqlNodeKind::Join,
            SqlNode::Select(_) => SqlNodeKind::Select,
            SqlNode::Insert(_) => SqlNodeKind::Insert,
            SqlNode::Update(_) => SqlNodeKind::Update,
            SqlNode::Delete(_) => SqlNodeKind::Delete,
            SqlNode::CreateIndex(_) => SqlNodeKind::CreateIndex,
        }
    }
}
