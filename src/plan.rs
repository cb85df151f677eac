//! JSON plan documents: a serializable description of a provider tree and
//! the tables it reads.
//!
//! ```json
//! {
//!   "tables": [{ "schema": "public", "name": "people", "key": ["id"],
//!                "columns": [{ "name": "id", "type": "int32" },
//!                            { "name": "name", "type": { "var_char": { "length": 50 } } }] }],
//!   "query": { "op": "take", "count": { "value": { "integer": 10 } },
//!              "source": { "op": "filter",
//!                          "predicate": { "binary": { "op": "eq", "left": { "column": 1 },
//!                                                     "right": { "parameter": "name" } } },
//!                          "source": { "op": "index", "table": "people" } } }
//! }
//! ```
//!
//! Parameters are referenced by name; every occurrence of a name is the
//! same parameter.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ast::{
    DynamicFilterId, PlaceholderId, QueryParameter, SqlAggregateType, SqlBinaryOperator,
    SqlFunctionType, SqlLiteral, SqlLockBehavior, SqlLockMode, SqlType, SqlUnaryOperator,
    TypeDescriptor,
};
use crate::error::{Result, SqlError};
use crate::query::{
    AggregateColumn, CalculatedColumn, ColumnInfo, Expr, Header, JoinType, OrderItem, Provider,
};
use crate::schema::{TableBuilder, TableDef};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    pub query: PlanNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub key: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: SqlType,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatedSpec {
    pub name: String,
    pub expr: PlanExpr,
    #[serde(rename = "type")]
    pub ty: SqlType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub name: String,
    pub kind: SqlAggregateType,
    #[serde(default)]
    pub column: Option<usize>,
    #[serde(rename = "type")]
    pub ty: SqlType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanNode {
    Index {
        table: String,
    },
    Raw {
        sql: String,
        columns: Vec<ColumnSpec>,
    },
    Filter {
        source: Box<PlanNode>,
        predicate: PlanExpr,
    },
    Select {
        source: Box<PlanNode>,
        columns: Vec<usize>,
    },
    Calculate {
        source: Box<PlanNode>,
        columns: Vec<CalculatedSpec>,
    },
    Join {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        #[serde(default = "inner_join")]
        kind: JoinType,
        on: Vec<(usize, usize)>,
    },
    Aggregate {
        source: Box<PlanNode>,
        #[serde(default)]
        group_by: Vec<usize>,
        aggregates: Vec<AggregateSpec>,
    },
    Sort {
        source: Box<PlanNode>,
        order: Vec<OrderItem>,
    },
    Distinct {
        source: Box<PlanNode>,
    },
    Take {
        source: Box<PlanNode>,
        count: PlanExpr,
    },
    Skip {
        source: Box<PlanNode>,
        count: PlanExpr,
    },
    Paging {
        source: Box<PlanNode>,
        skip: PlanExpr,
        take: PlanExpr,
    },
    Lock {
        source: Box<PlanNode>,
        mode: SqlLockMode,
        #[serde(default = "wait")]
        behavior: SqlLockBehavior,
    },
}

fn inner_join() -> JoinType {
    JoinType::Inner
}

fn wait() -> SqlLockBehavior {
    SqlLockBehavior::Wait
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanExpr {
    Column(usize),
    Value(SqlLiteral),
    Null,
    Parameter(String),
    Placeholder(String),
    TypeIs {
        column: usize,
        type_name: String,
    },
    Binary {
        op: SqlBinaryOperator,
        left: Box<PlanExpr>,
        right: Box<PlanExpr>,
    },
    Unary {
        op: SqlUnaryOperator,
        operand: Box<PlanExpr>,
    },
    Function {
        function: SqlFunctionType,
        #[serde(default)]
        args: Vec<PlanExpr>,
    },
    InList {
        id: String,
        columns: Vec<PlanExpr>,
    },
}

/// A plan lowered to a provider tree.
#[derive(Debug, Clone)]
pub struct Plan {
    pub provider: Provider,
    parameters: BTreeMap<String, QueryParameter>,
}

impl Plan {
    pub fn parameter(&self, name: &str) -> Option<&QueryParameter> {
        self.parameters.get(name)
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }
}

impl PlanDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| SqlError::invalid_argument("plan", e.to_string()))
    }

    pub fn build(&self) -> Result<Plan> {
        let mut tables = BTreeMap::new();
        for spec in &self.tables {
            tables.insert(spec.name.clone(), Arc::new(build_table(spec)?));
        }
        let mut lowering = Lowering {
            tables,
            parameters: BTreeMap::new(),
        };
        let provider = lowering.node(&self.query)?;
        Ok(Plan {
            provider,
            parameters: lowering.parameters,
        })
    }
}

fn build_table(spec: &TableSpec) -> Result<TableDef> {
    let mut builder = TableBuilder::new(spec.name.clone());
    if let Some(schema) = &spec.schema {
        builder = builder.schema(schema.clone());
    }
    for column in &spec.columns {
        builder = if column.nullable {
            builder.nullable_column(column.name.clone(), column.ty)
        } else {
            builder.column(column.name.clone(), column.ty)
        };
    }
    for key in &spec.key {
        builder = builder.key(key.clone());
    }
    builder.build()
}

struct Lowering {
    tables: BTreeMap<String, Arc<TableDef>>,
    parameters: BTreeMap<String, QueryParameter>,
}

impl Lowering {
    fn node(&mut self, node: &PlanNode) -> Result<Provider> {
        let provider = match node {
            PlanNode::Index { table } => {
                let table = self.tables.get(table).cloned().ok_or_else(|| {
                    SqlError::invalid_argument("table", format!("unknown table {table}"))
                })?;
                Provider::index(table)
            }
            PlanNode::Raw { sql, columns } => Provider::Raw {
                sql: sql.clone(),
                header: Header::new(
                    columns
                        .iter()
                        .map(|c| ColumnInfo::new(c.name.clone(), c.ty))
                        .collect(),
                ),
            },
            PlanNode::Filter { source, predicate } => {
                let source = self.node(source)?;
                source.filter(self.expr(predicate))
            }
            PlanNode::Select { source, columns } => self.node(source)?.select(columns.clone()),
            PlanNode::Calculate { source, columns } => {
                let source = self.node(source)?;
                let columns = columns
                    .iter()
                    .map(|c| CalculatedColumn {
                        name: c.name.clone(),
                        expr: self.expr(&c.expr),
                        ty: c.ty,
                    })
                    .collect();
                source.calculate(columns)
            }
            PlanNode::Join {
                left,
                right,
                kind,
                on,
            } => {
                let left = self.node(left)?;
                left.join(self.node(right)?, *kind, on.clone())
            }
            PlanNode::Aggregate {
                source,
                group_by,
                aggregates,
            } => self.node(source)?.aggregate(
                group_by.clone(),
                aggregates
                    .iter()
                    .map(|a| AggregateColumn {
                        name: a.name.clone(),
                        kind: a.kind,
                        column: a.column,
                        ty: a.ty,
                    })
                    .collect(),
            ),
            PlanNode::Sort { source, order } => self.node(source)?.sort(order.clone()),
            PlanNode::Distinct { source } => self.node(source)?.distinct(),
            PlanNode::Take { source, count } => {
                let source = self.node(source)?;
                source.take(self.expr(count))
            }
            PlanNode::Skip { source, count } => {
                let source = self.node(source)?;
                source.skip(self.expr(count))
            }
            PlanNode::Paging { source, skip, take } => {
                let source = self.node(source)?;
                source.paging(self.expr(skip), self.expr(take))
            }
            PlanNode::Lock {
                source,
                mode,
                behavior,
            } => self.node(source)?.lock(*mode, *behavior),
        };
        Ok(provider)
    }

    fn expr(&mut self, expr: &PlanExpr) -> Expr {
        match expr {
            PlanExpr::Column(index) => Expr::column(*index),
            PlanExpr::Value(value) => Expr::Constant(value.clone()),
            PlanExpr::Null => Expr::Null,
            PlanExpr::Parameter(name) => Expr::Parameter(self.parameter(name)),
            PlanExpr::Placeholder(key) => Expr::Placeholder(PlaceholderId::Key(key.clone())),
            PlanExpr::TypeIs { column, type_name } => Expr::TypeIs {
                column: *column,
                ty: TypeDescriptor::new(type_name.clone()),
            },
            PlanExpr::Binary { op, left, right } => {
                let left = self.expr(left);
                Expr::binary(*op, left, self.expr(right))
            }
            PlanExpr::Unary { op, operand } => Expr::unary(*op, self.expr(operand)),
            PlanExpr::Function { function, args } => {
                let args = args.iter().map(|a| self.expr(a)).collect();
                Expr::function(*function, args)
            }
            PlanExpr::InList { id, columns } => Expr::InList {
                id: DynamicFilterId(id.clone()),
                columns: columns.iter().map(|c| self.expr(c)).collect(),
            },
        }
    }

    fn parameter(&mut self, name: &str) -> QueryParameter {
        self.parameters
            .entry(name.to_string())
            .or_insert_with(|| QueryParameter::new(name))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLE: &str = r#"{
        "tables": [{
            "schema": "public", "name": "people", "key": ["id"],
            "columns": [
                { "name": "id", "type": "int32" },
                { "name": "name", "type": { "var_char": { "length": 50 } }, "nullable": true }
            ]
        }],
        "query": {
            "op": "filter",
            "predicate": { "binary": {
                "op": "or",
                "left": { "binary": { "op": "eq", "left": { "column": 1 }, "right": { "parameter": "name" } } },
                "right": { "binary": { "op": "eq", "left": { "column": 0 }, "right": { "parameter": "name" } } }
            } },
            "source": { "op": "index", "table": "people" }
        }
    }"#;

    #[test]
    fn test_parameters_are_interned_by_name() {
        let plan = PlanDocument::from_json(PEOPLE).unwrap().build().unwrap();
        assert_eq!(plan.parameter_names().collect::<Vec<_>>(), vec!["name"]);
        let Provider::Filter { predicate, .. } = &plan.provider else {
            panic!("expected filter");
        };
        let Expr::Binary { left, right, .. } = predicate else {
            panic!("expected or");
        };
        let (Expr::Binary { right: a, .. }, Expr::Binary { right: b, .. }) = (&**left, &**right)
        else {
            panic!("expected comparisons");
        };
        match (&**a, &**b) {
            (Expr::Parameter(a), Expr::Parameter(b)) => assert!(a.same_as(b)),
            other => panic!("expected parameters, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_table() {
        let doc = PlanDocument::from_json(r#"{ "query": { "op": "index", "table": "nope" } }"#)
            .unwrap();
        assert!(matches!(
            doc.build(),
            Err(SqlError::InvalidArgument { argument: "table", .. })
        ));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            PlanDocument::from_json(r#"{ "query": { "op": "explode" } }"#),
            Err(SqlError::InvalidArgument { argument: "plan", .. })
        ));
    }

    #[test]
    fn test_lock_defaults_to_wait() {
        let doc = PlanDocument::from_json(
            r#"{ "query": { "op": "lock", "mode": "update",
                 "source": { "op": "raw", "sql": "SELECT 1 AS x", "columns": [{ "name": "x", "type": "int32" }] } } }"#,
        )
        .unwrap();
        let plan = doc.build().unwrap();
        assert!(matches!(
            plan.provider,
            Provider::Lock {
                behavior: SqlLockBehavior::Wait,
                ..
            }
        ));
    }
}
