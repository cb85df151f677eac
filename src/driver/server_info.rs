use std::fmt;

use super::{Dialect, ServerVersion};
use crate::error::{Result, SqlError};

/// Query syntax a server accepts natively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryFeatures {
    /// Row limit (`LIMIT`, `TOP`, `FETCH NEXT`).
    pub limit: bool,
    /// Row offset (`OFFSET`).
    pub offset: bool,
    pub row_number: bool,
    pub nulls_ordering: bool,
    pub skip_locked: bool,
    pub fill_factor: bool,
}

/// Capabilities of one server version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub dialect: Dialect,
    pub version: ServerVersion,
    pub features: QueryFeatures,
    pub max_identifier_length: usize,
}

type Patch = (ServerVersion, fn(&mut ServerInfo));

const POSTGRESQL: &[Patch] = &[
    (ServerVersion::new(8, 0), postgresql_8_0),
    (ServerVersion::new(8, 2), with_fill_factor),
    (ServerVersion::new(8, 3), with_nulls_ordering),
    (ServerVersion::new(8, 4), with_row_number),
];

const SQLSERVER: &[Patch] = &[
    (ServerVersion::new(9, 0), sqlserver_9),
    (ServerVersion::new(11, 0), with_offset),
];

const ORACLE: &[Patch] = &[
    (ServerVersion::new(9, 0), oracle_9),
    (ServerVersion::new(11, 0), with_skip_locked),
    (ServerVersion::new(12, 0), oracle_12),
];

fn postgresql_8_0(info: &mut ServerInfo) {
    info.features.limit = true;
    info.features.offset = true;
    info.max_identifier_length = 63;
}

fn sqlserver_9(info: &mut ServerInfo) {
    // TOP only, no offset
    info.features.limit = true;
    info.features.row_number = true;
    info.features.skip_locked = true;
    info.features.fill_factor = true;
    info.max_identifier_length = 128;
}

fn oracle_9(info: &mut ServerInfo) {
    info.features.row_number = true;
    info.features.nulls_ordering = true;
    info.features.fill_factor = true;
    info.max_identifier_length = 30;
}

fn oracle_12(info: &mut ServerInfo) {
    info.features.limit = true;
    info.features.offset = true;
    info.max_identifier_length = 128;
}

fn with_offset(info: &mut ServerInfo) {
    info.features.offset = true;
}

fn with_fill_factor(info: &mut ServerInfo) {
    info.features.fill_factor = true;
}

fn with_nulls_ordering(info: &mut ServerInfo) {
    info.features.nulls_ordering = true;
}

fn with_row_number(info: &mut ServerInfo) {
    info.features.row_number = true;
}

fn with_skip_locked(info: &mut ServerInfo) {
    info.features.skip_locked = true;
}

impl ServerInfo {
    /// Capabilities of `version`: every patch up to and including the
    /// version, applied oldest first.
    pub fn build(dialect: Dialect, version: ServerVersion) -> Result<Self> {
        if version < dialect.min_version() {
            return Err(SqlError::UnsupportedServer(format!(
                "{dialect} {version} (oldest supported is {})",
                dialect.min_version()
            )));
        }
        let patches = match dialect {
            Dialect::PostgreSql => POSTGRESQL,
            Dialect::SqlServer => SQLSERVER,
            Dialect::Oracle => ORACLE,
        };
        let mut info = ServerInfo {
            dialect,
            version,
            features: QueryFeatures::default(),
            max_identifier_length: 0,
        };
        for (since, patch) in patches {
            if version >= *since {
                patch(&mut info);
            }
        }
        Ok(info)
    }
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.dialect, self.version)
    }
}
