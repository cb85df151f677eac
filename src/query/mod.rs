//! Logical query trees and their compilation to the SQL DOM.
//!
//! A [`Provider`] describes what a query computes in terms of record sets:
//! scan a table, filter, project, join, aggregate, sort, page and lock.
//! Column references inside a provider are positions in the header of its
//! source. The [`CompilerChain`] turns a provider tree into a select
//! statement, trying dialect specific fallbacks when the base compiler has
//! no native rendering for an operator.

mod compiler;
mod expression;
mod paging;

pub use compiler::{CompilerChain, CompilerContext, ProviderCompiler, SqlCompiler, SqlProvider};
pub use expression::Expr;
pub use paging::PagingEmulationCompiler;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ast::{SqlAggregateType, SqlLockBehavior, SqlLockMode, SqlType};
use crate::schema::TableDef;

/// One output column of a record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub ty: SqlType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Sort key: column position and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub column: usize,
    pub ascending: bool,
}

impl OrderItem {
    pub fn asc(column: usize) -> Self {
        Self {
            column,
            ascending: true,
        }
    }

    pub fn desc(column: usize) -> Self {
        Self {
            column,
            ascending: false,
        }
    }
}

/// Shape of a record set: its columns and the order its rows come in.
///
/// Column names are unique within a header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    columns: Vec<ColumnInfo>,
    order: Vec<OrderItem>,
}

impl Header {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        let mut header = Header::default();
        for column in columns {
            header.push(column);
        }
        header
    }

    pub fn with_order(mut self, order: Vec<OrderItem>) -> Self {
        self.order = order;
        self
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn order(&self) -> &[OrderItem] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnInfo> {
        self.columns.get(index)
    }

    /// Append a column, renaming it if the name is taken. Returns the name
    /// actually used.
    pub fn push(&mut self, mut column: ColumnInfo) -> String {
        if self.columns.iter().any(|c| c.name == column.name) {
            let base = column.name.clone();
            let mut n = 1;
            while self.columns.iter().any(|c| c.name == column.name) {
                column.name = format!("{base}{n}");
                n += 1;
            }
        }
        let name = column.name.clone();
        self.columns.push(column);
        name
    }
}

/// Table-scan header: every column, ordered by the primary key.
impl From<&TableDef> for Header {
    fn from(table: &TableDef) -> Self {
        let columns = table
            .columns()
            .iter()
            .map(|c| ColumnInfo::new(c.name.clone(), c.ty))
            .collect();
        let order = table.key().iter().map(|&i| OrderItem::asc(i)).collect();
        Header::new(columns).with_order(order)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    LeftOuter,
}

/// One aggregate output column.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateColumn {
    pub name: String,
    pub kind: SqlAggregateType,
    /// Source column; `None` counts rows.
    pub column: Option<usize>,
    /// Declared result type.
    pub ty: SqlType,
}

/// A calculated output column.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatedColumn {
    pub name: String,
    pub expr: Expr,
    pub ty: SqlType,
}

/// Logical operator tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    /// Full scan of a stored table.
    Index { table: Arc<TableDef> },
    /// Native SQL with a declared header.
    Raw { sql: String, header: Header },
    Filter {
        source: Box<Provider>,
        predicate: Expr,
    },
    /// Projection onto a subset of source columns.
    Select {
        source: Box<Provider>,
        columns: Vec<usize>,
    },
    Calculate {
        source: Box<Provider>,
        columns: Vec<CalculatedColumn>,
    },
    /// Equi-join on column pairs (left position, right position).
    Join {
        left: Box<Provider>,
        right: Box<Provider>,
        kind: JoinType,
        pairs: Vec<(usize, usize)>,
    },
    Aggregate {
        source: Box<Provider>,
        group_by: Vec<usize>,
        aggregates: Vec<AggregateColumn>,
    },
    Sort {
        source: Box<Provider>,
        order: Vec<OrderItem>,
    },
    Distinct { source: Box<Provider> },
    Take { source: Box<Provider>, count: Expr },
    Skip { source: Box<Provider>, count: Expr },
    Paging {
        source: Box<Provider>,
        skip: Expr,
        take: Expr,
    },
    Lock {
        source: Box<Provider>,
        mode: SqlLockMode,
        behavior: SqlLockBehavior,
    },
}

impl Provider {
    pub fn index(table: Arc<TableDef>) -> Self {
        Provider::Index { table }
    }

    pub fn filter(self, predicate: Expr) -> Self {
        Provider::Filter {
            source: Box::new(self),
            predicate,
        }
    }

    pub fn select(self, columns: Vec<usize>) -> Self {
        Provider::Select {
            source: Box::new(self),
            columns,
        }
    }

    pub fn calculate(self, columns: Vec<CalculatedColumn>) -> Self {
        Provider::Calculate {
            source: Box::new(self),
            columns,
        }
    }

    pub fn join(self, right: Provider, kind: JoinType, pairs: Vec<(usize, usize)>) -> Self {
        Provider::Join {
            left: Box::new(self),
            right: Box::new(right),
            kind,
            pairs,
        }
    }

    pub fn aggregate(self, group_by: Vec<usize>, aggregates: Vec<AggregateColumn>) -> Self {
        Provider::Aggregate {
            source: Box::new(self),
            group_by,
            aggregates,
        }
    }

    pub fn sort(self, order: Vec<OrderItem>) -> Self {
        Provider::Sort {
            source: Box::new(self),
            order,
        }
    }

    pub fn distinct(self) -> Self {
        Provider::Distinct {
            source: Box::new(self),
        }
    }

    pub fn take(self, count: Expr) -> Self {
        Provider::Take {
            source: Box::new(self),
            count,
        }
    }

    pub fn skip(self, count: Expr) -> Self {
        Provider::Skip {
            source: Box::new(self),
            count,
        }
    }

    pub fn paging(self, skip: Expr, take: Expr) -> Self {
        Provider::Paging {
            source: Box::new(self),
            skip,
            take,
        }
    }

    pub fn lock(self, mode: SqlLockMode, behavior: SqlLockBehavior) -> Self {
        Provider::Lock {
            source: Box::new(self),
            mode,
            behavior,
        }
    }

    /// Operator name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Index { .. } => "Index",
            Provider::Raw { .. } => "Raw",
            Provider::Filter { .. } => "Filter",
            Provider::Select { .. } => "Select",
            Provider::Calculate { .. } => "Calculate",
            Provider::Join { .. } => "Join",
            Provider::Aggregate { .. } => "Aggregate",
            Provider::Sort { .. } => "Sort",
            Provider::Distinct { .. } => "Distinct",
            Provider::Take { .. } => "Take",
            Provider::Skip { .. } => "Skip",
            Provider::Paging { .. } => "Paging",
            Provider::Lock { .. } => "Lock",
        }
    }

    /// Take, Skip and Paging already fix a row sequence of their own.
    pub fn is_paging(&self) -> bool {
        matches!(
            self,
            Provider::Take { .. } | Provider::Skip { .. } | Provider::Paging { .. }
        )
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Index { table } => write!(f, "Index({})", table.name()),
            Provider::Raw { .. } => write!(f, "Raw"),
            Provider::Filter { source, .. }
            | Provider::Select { source, .. }
            | Provider::Calculate { source, .. }
            | Provider::Aggregate { source, .. }
            | Provider::Sort { source, .. }
            | Provider::Distinct { source }
            | Provider::Take { source, .. }
            | Provider::Skip { source, .. }
            | Provider::Paging { source, .. }
            | Provider::Lock { source, .. } => write!(f, "{}({source})", self.name()),
            Provider::Join { left, right, .. } => write!(f, "Join({left}, {right})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableBuilder;

    #[test]
    fn test_header_renames_duplicates() {
        let mut header = Header::new(vec![ColumnInfo::new("id", SqlType::Int32)]);
        assert_eq!(header.push(ColumnInfo::new("id", SqlType::Int32)), "id1");
        assert_eq!(header.push(ColumnInfo::new("id", SqlType::Int32)), "id2");
        assert_eq!(header.len(), 3);
    }

    #[test]
    fn test_table_header_is_key_ordered() {
        let table = TableBuilder::new("people")
            .column("name", SqlType::VarChar { length: Some(50) })
            .column("id", SqlType::Int32)
            .key("id")
            .build()
            .unwrap();
        let header = Header::from(&table);
        assert_eq!(header.order(), &[OrderItem::asc(1)]);
        assert_eq!(header.column(0).unwrap().name, "name");
    }

    #[test]
    fn test_display_names_operators() {
        let table = Arc::new(
            TableBuilder::new("people")
                .column("id", SqlType::Int32)
                .build()
                .unwrap(),
        );
        let provider = Provider::index(table).take(Expr::int(5)).distinct();
        assert_eq!(provider.to_string(), "Distinct(Take(Index(people)))");
    }
}
