use std::sync::Arc;

use super::Dialect;
use crate::ast::{QueryParameter, SqlType};
use crate::error::Result;
use crate::query::{Expr, OrderItem, Provider};
use crate::schema::{TableBuilder, TableDef};

const NAME: SqlType = SqlType::VarChar { length: Some(128) };

/// Catalog queries, expressed as providers so they go through the same
/// pipeline as user queries.
#[derive(Debug, Clone)]
pub struct Extractor {
    tables: Arc<TableDef>,
    columns: Arc<TableDef>,
    schema: QueryParameter,
    table: QueryParameter,
}

impl Extractor {
    pub fn new(dialect: Dialect) -> Result<Self> {
        let (tables, columns) = match dialect {
            Dialect::PostgreSql | Dialect::SqlServer => information_schema()?,
            Dialect::Oracle => oracle_dictionary()?,
        };
        Ok(Self {
            tables: Arc::new(tables),
            columns: Arc::new(columns),
            schema: QueryParameter::new("schema"),
            table: QueryParameter::new("table"),
        })
    }

    pub fn schema_parameter(&self) -> &QueryParameter {
        &self.schema
    }

    pub fn table_parameter(&self) -> &QueryParameter {
        &self.table
    }

    /// `(table name)` of every table in the schema, by name.
    pub fn tables(&self) -> Provider {
        Provider::index(self.tables.clone())
            .filter(Expr::eq(Expr::column(0), Expr::parameter(&self.schema)))
            .select(vec![1])
            .sort(vec![OrderItem::asc(0)])
    }

    /// `(column name, type name, nullable)` of the table's columns, in
    /// declaration order.
    pub fn columns(&self) -> Provider {
        Provider::index(self.columns.clone())
            .filter(Expr::and(
                Expr::eq(Expr::column(0), Expr::parameter(&self.schema)),
                Expr::eq(Expr::column(1), Expr::parameter(&self.table)),
            ))
            .sort(vec![OrderItem::asc(4)])
            .select(vec![2, 3, 5])
    }
}

// Catalog column layouts shared by both builders:
// tables:  schema, name
// columns: schema, table, name, type, position, nullable

fn information_schema() -> Result<(TableDef, TableDef)> {
    let tables = TableBuilder::new("tables")
        .schema("information_schema")
        .column("table_schema", NAME)
        .column("table_name", NAME)
        .build()?;
    let columns = TableBuilder::new("columns")
        .schema("information_schema")
        .column("table_schema", NAME)
        .column("table_name", NAME)
        .column("column_name", NAME)
        .column("data_type", NAME)
        .column("ordinal_position", SqlType::Int32)
        .column("is_nullable", SqlType::VarChar { length: Some(3) })
        .build()?;
    Ok((tables, columns))
}

fn oracle_dictionary() -> Result<(TableDef, TableDef)> {
    let tables = TableBuilder::new("ALL_TABLES")
        .column("OWNER", NAME)
        .column("TABLE_NAME", NAME)
        .build()?;
    let columns = TableBuilder::new("ALL_TAB_COLUMNS")
        .column("OWNER", NAME)
        .column("TABLE_NAME", NAME)
        .column("COLUMN_NAME", NAME)
        .column("DATA_TYPE", NAME)
        .column("COLUMN_ID", SqlType::Int32)
        .column("NULLABLE", SqlType::VarChar { length: Some(1) })
        .build()?;
    Ok((tables, columns))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::driver::{ConnectionInfo, Dialect, DriverFactory, ServerVersion};
    use crate::postcompile::SqlPostCompilerConfiguration;

    fn driver(dialect: Dialect, major: u16) -> crate::driver::Driver {
        DriverFactory::create(&ConnectionInfo::new(dialect, ServerVersion::new(major, 0)))
            .unwrap()
    }

    #[test]
    fn test_postgresql_tables_query() {
        let driver = driver(Dialect::PostgreSql, 8);
        let result = driver.extract_tables().unwrap();
        assert_eq!(
            result.command_text().unwrap(),
            r#"SELECT "t0"."table_name" FROM "information_schema"."tables" AS "t0" WHERE "t0"."table_schema" = @p0 ORDER BY "t0"."table_name""#
        );
        let schema = driver.extractor().schema_parameter();
        assert_eq!(result.parameter_name(schema).unwrap(), "@p0");
    }

    #[test]
    fn test_oracle_columns_query() {
        let driver = driver(Dialect::Oracle, 11);
        let sql = driver.extract_columns().unwrap().command_text().unwrap();
        assert_eq!(
            sql,
            r#"SELECT "t0"."COLUMN_NAME", "t0"."DATA_TYPE", "t0"."NULLABLE" FROM "ALL_TAB_COLUMNS" "t0" WHERE "t0"."OWNER" = :p0 AND "t0"."TABLE_NAME" = :p1 ORDER BY "t0"."COLUMN_ID""#
        );
    }

    #[test]
    fn test_sqlserver_tables_with_null_schema() {
        let driver = driver(Dialect::SqlServer, 9);
        let schema = driver.extractor().schema_parameter().clone();
        let config = SqlPostCompilerConfiguration::new()
            .select_alternative(crate::ast::VariantKey::NullParameter(schema));
        let sql = driver
            .extract_tables()
            .unwrap()
            .command_text_with(&config)
            .unwrap();
        assert!(sql.contains("WHERE [t0].[table_schema] IS NULL"));
    }
}
