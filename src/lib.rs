pub mod ast;
pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod plan;
pub mod postcompile;
pub mod query;
pub mod schema;
pub mod translator;

pub use error::{Result, SqlError};
