//! Per-server compilation drivers.
//!
//! A [`Driver`] bundles everything needed to turn a provider tree into
//! command text for one server: its capabilities, translator, type mapper,
//! compiler chain and catalog extractor. [`DriverFactory`] picks the most
//! specific version layers for a [`ConnectionInfo`].

mod extractor;
pub mod server_info;
mod version;

pub use extractor::Extractor;
pub use server_info::{QueryFeatures, ServerInfo};
pub use version::ServerVersion;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ast::{self, Optimizer, SqlRef};
use crate::error::{Result, SqlError};
use crate::postcompile::SqlCompilationResult;
use crate::query::{CompilerChain, CompilerContext, Provider};
use crate::translator::{oracle, postgresql, sqlserver, Translator, TypeMapper};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    PostgreSql,
    SqlServer,
    Oracle,
}

impl Dialect {
    pub fn min_version(&self) -> ServerVersion {
        match self {
            Dialect::PostgreSql => postgresql::MIN_VERSION,
            Dialect::SqlServer => sqlserver::MIN_VERSION,
            Dialect::Oracle => oracle::MIN_VERSION,
        }
    }

    pub fn translator(&self, version: ServerVersion) -> Translator {
        match self {
            Dialect::PostgreSql => postgresql::translator(version),
            Dialect::SqlServer => sqlserver::translator(version),
            Dialect::Oracle => oracle::translator(version),
        }
    }

    pub fn type_mapper(&self, version: ServerVersion) -> TypeMapper {
        match self {
            Dialect::PostgreSql => postgresql::type_mapper(version),
            Dialect::SqlServer => sqlserver::type_mapper(version),
            Dialect::Oracle => oracle::type_mapper(version),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::PostgreSql => "PostgreSQL",
            Dialect::SqlServer => "SQL Server",
            Dialect::Oracle => "Oracle",
        };
        f.write_str(name)
    }
}

impl FromStr for Dialect {
    type Err = SqlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Dialect::PostgreSql),
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            "oracle" => Ok(Dialect::Oracle),
            _ => Err(SqlError::UnsupportedServer(s.to_string())),
        }
    }
}

/// Which server a driver compiles for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub dialect: Dialect,
    pub version: ServerVersion,
}

impl ConnectionInfo {
    pub fn new(dialect: Dialect, version: ServerVersion) -> Self {
        Self { dialect, version }
    }
}

/// Compilation pipeline for one server version. Immutable once built;
/// share it behind an `Arc`.
pub struct Driver {
    server_info: ServerInfo,
    translator: Arc<Translator>,
    type_mapper: Arc<TypeMapper>,
    compilers: CompilerChain,
    optimizer: Optimizer,
    extractor: Extractor,
}

impl Driver {
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub fn translator(&self) -> &Arc<Translator> {
        &self.translator
    }

    pub fn type_mapper(&self) -> &Arc<TypeMapper> {
        &self.type_mapper
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Provider tree → reusable compilation result.
    pub fn compile(&self, provider: &Provider) -> Result<SqlCompilationResult> {
        let mut ctx = CompilerContext::new(&self.server_info);
        let compiled = self.compilers.compile(&mut ctx, provider)?;
        self.compile_statement(&compiled.request)
    }

    /// Compile an already built statement. Optimizer passes rewrite
    /// `statement` in place first.
    pub fn compile_statement(&self, statement: &SqlRef) -> Result<SqlCompilationResult> {
        let rewrites = self.optimizer.optimize(statement)?;
        if rewrites > 0 {
            trace!(rewrites, "optimized statement");
        }
        ast::compile(statement, &self.translator, &self.type_mapper)
    }

    /// Tables of the schema bound to [`Extractor::schema_parameter`].
    pub fn extract_tables(&self) -> Result<SqlCompilationResult> {
        self.compile(&self.extractor.tables())
    }

    /// Columns of the table bound to [`Extractor::table_parameter`], in
    /// declaration order.
    pub fn extract_columns(&self) -> Result<SqlCompilationResult> {
        self.compile(&self.extractor.columns())
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("server", &self.server_info.to_string())
            .field("translator", &self.translator.layer_names())
            .field("compilers", &self.compilers.compiler_names())
            .finish()
    }
}

pub struct DriverFactory;

impl DriverFactory {
    pub fn create(info: &ConnectionInfo) -> Result<Driver> {
        Self::create_with(info, Optimizer::with_defaults())
    }

    pub fn create_with(info: &ConnectionInfo, optimizer: Optimizer) -> Result<Driver> {
        let server_info = ServerInfo::build(info.dialect, info.version)?;
        let translator = info.dialect.translator(info.version);
        debug!(
            server = %server_info,
            layers = ?translator.layer_names(),
            passes = ?optimizer.pass_names(),
            "created driver"
        );
        Ok(Driver {
            translator: Arc::new(translator),
            type_mapper: Arc::new(info.dialect.type_mapper(info.version)),
            compilers: CompilerChain::standard(),
            extractor: Extractor::new(info.dialect)?,
            optimizer,
            server_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::{SqlBinaryOperator, SqlType};
    use crate::query::Expr;
    use crate::schema::TableBuilder;

    fn driver(dialect: Dialect, major: u16, minor: u16) -> Driver {
        DriverFactory::create(&ConnectionInfo::new(dialect, ServerVersion::new(major, minor)))
            .unwrap()
    }

    #[test]
    fn test_dialect_names() {
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::PostgreSql);
        assert_eq!("MSSQL".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert!("db2".parse::<Dialect>().is_err());
        assert_eq!(Dialect::SqlServer.to_string(), "SQL Server");
    }

    #[test]
    fn test_factory_rejects_old_servers() {
        let result = DriverFactory::create(&ConnectionInfo::new(
            Dialect::Oracle,
            ServerVersion::new(8, 1),
        ));
        assert!(matches!(result, Err(SqlError::UnsupportedServer(_))));
    }

    #[test]
    fn test_factory_selects_version_layers() {
        let old = driver(Dialect::PostgreSql, 8, 0);
        let new = driver(Dialect::PostgreSql, 8, 4);
        assert!(old.translator().layer_names().len() < new.translator().layer_names().len());
        assert!(!old.server_info().features.row_number);
        assert!(new.server_info().features.row_number);
    }

    #[test]
    fn test_compile_runs_optimizer() {
        let table = Arc::new(
            TableBuilder::new("flags")
                .column("id", SqlType::Int32)
                .column("on", SqlType::Boolean)
                .build()
                .unwrap(),
        );
        let predicate = Expr::and(
            Expr::binary(SqlBinaryOperator::Gt, Expr::column(0), Expr::int(1)),
            Expr::boolean(true),
        );
        let provider = Provider::index(table).filter(predicate);
        let sql = driver(Dialect::PostgreSql, 8, 4)
            .compile(&provider)
            .unwrap()
            .command_text()
            .unwrap();
        assert_eq!(
            sql,
            r#"SELECT "t0"."id", "t0"."on" FROM "flags" AS "t0" WHERE "t0"."id" > 1"#
        );
    }

    #[test]
    fn test_driver_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Driver>();
        assert_send_sync::<SqlCompilationResult>();
    }
}
