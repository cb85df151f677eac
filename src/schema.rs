//! Minimal storage model consumed by the compiler: tables and indexes.
//!
//! Definitions are produced by builders and are immutable afterwards.

use crate::ast::SqlType;
use crate::error::{Result, SqlError};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: SqlType,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    schema: Option<String>,
    name: String,
    columns: Vec<ColumnDef>,
    key: Vec<usize>,
}

impl TableDef {
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Indexes of the primary key columns, in key order.
    pub fn key(&self) -> &[usize] {
        &self.key
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

pub struct TableBuilder {
    schema: Option<String>,
    name: String,
    columns: Vec<ColumnDef>,
    key: Vec<String>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            columns: Vec::new(),
            key: Vec::new(),
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn column(self, name: impl Into<String>, ty: SqlType) -> Self {
        self.push_column(name.into(), ty, false)
    }

    pub fn nullable_column(self, name: impl Into<String>, ty: SqlType) -> Self {
        self.push_column(name.into(), ty, true)
    }

    fn push_column(mut self, name: String, ty: SqlType, nullable: bool) -> Self {
        self.columns.push(ColumnDef { name, ty, nullable });
        self
    }

    pub fn key(mut self, column: impl Into<String>) -> Self {
        self.key.push(column.into());
        self
    }

    pub fn build(self) -> Result<TableDef> {
        if self.name.is_empty() {
            return Err(SqlError::invalid_argument("name", "table name is empty"));
        }
        if self.columns.is_empty() {
            return Err(SqlError::invalid_argument(
                "columns",
                format!("table {} has no columns", self.name),
            ));
        }
        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(SqlError::invalid_argument(
                    "columns",
                    format!("duplicate column {} in table {}", column.name, self.name),
                ));
            }
        }
        let mut key = Vec::with_capacity(self.key.len());
        for name in &self.key {
            let index = self
                .columns
                .iter()
                .position(|c| &c.name == name)
                .ok_or_else(|| {
                    SqlError::invalid_argument(
                        "key",
                        format!("key column {} is not a column of {}", name, self.name),
                    )
                })?;
            key.push(index);
        }
        Ok(TableDef {
            schema: self.schema,
            name: self.name,
            columns: self.columns,
            key,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    name: String,
    table_schema: Option<String>,
    table_name: String,
    columns: Vec<IndexColumn>,
    unique: bool,
    fill_factor: Option<u8>,
}

impl IndexDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_schema(&self) -> Option<&str> {
        self.table_schema.as_deref()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[IndexColumn] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Percentage of each index page filled on creation, 1..=100.
    pub fn fill_factor(&self) -> Option<u8> {
        self.fill_factor
    }
}

pub struct IndexBuilder<'a> {
    table: &'a TableDef,
    name: String,
    columns: Vec<IndexColumn>,
    unique: bool,
    fill_factor: Option<u8>,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(name: impl Into<String>, table: &'a TableDef) -> Self {
        Self {
            table,
            name: name.into(),
            columns: Vec::new(),
            unique: false,
            fill_factor: None,
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(IndexColumn {
            name: name.into(),
            ascending: true,
        });
        self
    }

    pub fn descending(mut self, name: impl Into<String>) -> Self {
        self.columns.push(IndexColumn {
            name: name.into(),
            ascending: false,
        });
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn fill_factor(mut self, percent: u8) -> Self {
        self.fill_factor = Some(percent);
        self
    }

    pub fn build(self) -> Result<IndexDef> {
        if self.columns.is_empty() {
            return Err(SqlError::invalid_argument(
                "columns",
                format!("index {} has no columns", self.name),
            ));
        }
        if let Some(column) = self
            .columns
            .iter()
            .find(|c| self.table.column_index(&c.name).is_none())
        {
            return Err(SqlError::invalid_argument(
                "columns",
                format!(
                    "{} is not a column of {}",
                    column.name,
                    self.table.name()
                ),
            ));
        }
        if let Some(fill) = self.fill_factor {
            if !(1..=100).contains(&fill) {
                return Err(SqlError::invalid_argument(
                    "fill_factor",
                    format!("{fill} is outside 1..=100"),
                ));
            }
        }
        Ok(IndexDef {
            name: self.name,
            table_schema: self.table.schema.clone(),
            table_name: self.table.name.clone(),
            columns: self.columns,
            unique: self.unique,
            fill_factor: self.fill_factor,
        })
    }
}
