//! Oracle 9i - 12c rules.

use chrono::{NaiveDate, NaiveDateTime};

use super::{
    ansi_layer, quote_double, quote_plain, FromlessSelect, LockClause, PagingStyle,
    SqlTemplate, Translator, TranslatorLayer, TypeMapper,
};
use crate::ast::{
    SqlBinaryOperator, SqlFunctionType as F, SqlLock, SqlLockBehavior, SqlLockMode, SqlType,
};
use crate::driver::ServerVersion;

pub const MIN_VERSION: ServerVersion = ServerVersion::new(9, 0);

pub fn translator(version: ServerVersion) -> Translator {
    let mut layers = vec![ansi_layer(), v9()];
    if version >= ServerVersion::new(10, 0) {
        layers.push(v10());
    }
    if version >= ServerVersion::new(11, 0) {
        layers.push(v11());
    }
    if version >= ServerVersion::new(12, 0) {
        layers.push(v12());
    }
    Translator::new(layers)
}

pub fn type_mapper(version: ServerVersion) -> TypeMapper {
    let mut layers: Vec<fn(&SqlType) -> Option<String>> = vec![types_9];
    if version >= ServerVersion::new(10, 0) {
        layers.push(types_10);
    }
    TypeMapper::new("Oracle", layers)
}

fn v9() -> TranslatorLayer {
    let functions = [
        (F::Ceiling, SqlTemplate::Call("CEIL")),
        (F::Log, SqlTemplate::Call("LN")),
        (F::Log10, SqlTemplate::Pattern("LOG(10, {0})")),
        (F::Truncate, SqlTemplate::Call("TRUNC")),
        (F::Atan2, SqlTemplate::Call("ATAN2")),
        (F::Cot, SqlTemplate::Pattern("(1 / TAN({0}))")),
        (F::Degrees, SqlTemplate::Pattern("({0} * 180 / ACOS(-1))")),
        (F::Radians, SqlTemplate::Pattern("({0} * ACOS(-1) / 180)")),
        (F::Concat, SqlTemplate::Infix("||")),
        (F::Length, SqlTemplate::Call("LENGTH")),
        (F::Trim, SqlTemplate::Call("TRIM")),
        (F::Substring, SqlTemplate::Call("SUBSTR")),
        (F::Position, SqlTemplate::Pattern("INSTR({0}, {1})")),
        (F::CurrentDate, SqlTemplate::Pattern("TRUNC(SYSDATE)")),
        (F::CurrentTimestamp, SqlTemplate::Pattern("SYSTIMESTAMP")),
        (
            F::DateTimeConstruct,
            SqlTemplate::Pattern("TO_DATE({0} || '-' || {1} || '-' || {2}, 'YYYY-MM-DD')"),
        ),
        (F::DateTimeExtractYear, SqlTemplate::Pattern("EXTRACT(YEAR FROM {0})")),
        (F::DateTimeExtractMonth, SqlTemplate::Pattern("EXTRACT(MONTH FROM {0})")),
        (F::DateTimeExtractDay, SqlTemplate::Pattern("EXTRACT(DAY FROM {0})")),
        (
            F::DateTimeExtractHour,
            SqlTemplate::Pattern("EXTRACT(HOUR FROM CAST({0} AS TIMESTAMP))"),
        ),
        (
            F::DateTimeExtractMinute,
            SqlTemplate::Pattern("EXTRACT(MINUTE FROM CAST({0} AS TIMESTAMP))"),
        ),
        (
            F::DateTimeExtractSecond,
            SqlTemplate::Pattern("EXTRACT(SECOND FROM CAST({0} AS TIMESTAMP))"),
        ),
        (
            F::DateTimeExtractDayOfWeek,
            SqlTemplate::Pattern("(TO_NUMBER(TO_CHAR({0}, 'D')) - 1)"),
        ),
        (
            F::DateTimeExtractDayOfYear,
            SqlTemplate::Pattern("TO_NUMBER(TO_CHAR({0}, 'DDD'))"),
        ),
        (F::DateTimeTruncate, SqlTemplate::Call("TRUNC")),
        (F::DateTimeAddYears, SqlTemplate::Pattern("ADD_MONTHS({0}, {1} * 12)")),
        (F::DateTimeAddMonths, SqlTemplate::Pattern("ADD_MONTHS({0}, {1})")),
        (F::DateTimeAddDays, SqlTemplate::Pattern("({0} + {1})")),
        (
            F::IntervalConstruct,
            SqlTemplate::Pattern("NUMTODSINTERVAL({0} / 1000, 'SECOND')"),
        ),
        (
            F::IntervalToMilliseconds,
            SqlTemplate::Pattern(
                "(EXTRACT(DAY FROM {0}) * 86400000 + EXTRACT(HOUR FROM {0}) * 3600000 \
                 + EXTRACT(MINUTE FROM {0}) * 60000 + EXTRACT(SECOND FROM {0}) * 1000)",
            ),
        ),
    ]
    .into_iter()
    .collect();

    TranslatorLayer {
        name: "Oracle 9",
        quote_identifier: Some(quote_double),
        string_literal: Some(quote_plain),
        bool_literal: Some(number_literal),
        datetime_literal: Some(timestamp_literal),
        date_literal: Some(date_literal),
        parameter_prefix: Some(":"),
        functions,
        operators: [(SqlBinaryOperator::Modulo, SqlTemplate::Call("MOD"))]
            .into_iter()
            .collect(),
        paging: Some(PagingStyle::Unsupported),
        lock: Some(lock_9),
        table_alias: Some(" "),
        fromless_select: Some(FromlessSelect::Table("DUAL")),
        nulls_ordering: Some(true),
        window_functions: Some(true),
        fill_factor: Some(pct_free),
        ..Default::default()
    }
}

fn v10() -> TranslatorLayer {
    TranslatorLayer::named("Oracle 10")
}

fn v11() -> TranslatorLayer {
    TranslatorLayer {
        name: "Oracle 11",
        lock: Some(lock_11),
        ..Default::default()
    }
}

fn v12() -> TranslatorLayer {
    TranslatorLayer {
        name: "Oracle 12",
        paging: Some(PagingStyle::OffsetFetch),
        ..Default::default()
    }
}

fn number_literal(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn timestamp_literal(value: &NaiveDateTime) -> String {
    format!("TIMESTAMP '{}'", value.format("%Y-%m-%d %H:%M:%S%.3f"))
}

fn date_literal(value: &NaiveDate) -> String {
    format!("DATE '{}'", value.format("%Y-%m-%d"))
}

fn lock_9(lock: SqlLock) -> Option<LockClause> {
    match (lock.mode, lock.behavior) {
        (SqlLockMode::Shared, _) | (_, SqlLockBehavior::SkipLocked) => None,
        (_, SqlLockBehavior::Wait) => Some(LockClause::Suffix(" FOR UPDATE".into())),
        (_, SqlLockBehavior::NoWait) => Some(LockClause::Suffix(" FOR UPDATE NOWAIT".into())),
    }
}

fn lock_11(lock: SqlLock) -> Option<LockClause> {
    match (lock.mode, lock.behavior) {
        (SqlLockMode::Shared, _) => None,
        (_, SqlLockBehavior::SkipLocked) => {
            Some(LockClause::Suffix(" FOR UPDATE SKIP LOCKED".into()))
        }
        _ => lock_9(lock),
    }
}

/// Oracle reserves free space instead of filling to a percentage.
fn pct_free(percent: u8) -> Option<String> {
    Some(format!(" PCTFREE {}", 100 - percent.min(100)))
}

fn types_9(ty: &SqlType) -> Option<String> {
    let name = match ty {
        SqlType::Boolean => "NUMBER(1)".to_string(),
        SqlType::Int16 => "NUMBER(5)".to_string(),
        SqlType::Int32 => "NUMBER(10)".to_string(),
        SqlType::Int64 => "NUMBER(20)".to_string(),
        SqlType::Float32 => "FLOAT(24)".to_string(),
        SqlType::Float64 => "FLOAT(53)".to_string(),
        SqlType::Decimal { precision, scale } => format!("NUMBER({precision}, {scale})"),
        SqlType::VarChar { length: Some(n) } => format!("NVARCHAR2({n})"),
        SqlType::VarChar { length: None } => "NCLOB".to_string(),
        SqlType::DateTime => "TIMESTAMP".to_string(),
        SqlType::Date => "DATE".to_string(),
        SqlType::Guid => "RAW(16)".to_string(),
        SqlType::Binary => "BLOB".to_string(),
    };
    Some(name)
}

fn types_10(ty: &SqlType) -> Option<String> {
    match ty {
        SqlType::Float32 => Some("BINARY_FLOAT".to_string()),
        SqlType::Float64 => Some("BINARY_DOUBLE".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlError;

    fn v(major: u16) -> ServerVersion {
        ServerVersion::new(major, 0)
    }

    #[test]
    fn test_string_is_not_escaped() {
        assert_eq!(
            translator(v(11)).string_literal("O'Brien\\path").unwrap(),
            "'O''Brien\\path'"
        );
    }

    #[test]
    fn test_modulo_and_alias() {
        let t = translator(v(9));
        assert_eq!(
            t.binary(SqlBinaryOperator::Modulo, "a".into(), "b".into()).unwrap(),
            "MOD(a, b)"
        );
        assert_eq!(t.table_alias().unwrap(), " ");
        assert_eq!(t.fromless_select().unwrap(), FromlessSelect::Table("DUAL"));
        assert_eq!(t.parameter_prefix().unwrap(), ":");
    }

    #[test]
    fn test_skip_locked_from_11() {
        let lock = SqlLock {
            mode: SqlLockMode::Update,
            behavior: SqlLockBehavior::SkipLocked,
        };
        assert!(translator(v(10)).lock(lock).is_err());
        assert_eq!(
            translator(v(11)).lock(lock).unwrap(),
            LockClause::Suffix(" FOR UPDATE SKIP LOCKED".into())
        );
    }

    #[test]
    fn test_shared_lock_is_unsupported() {
        let lock = SqlLock {
            mode: SqlLockMode::Shared,
            behavior: SqlLockBehavior::Wait,
        };
        assert!(matches!(
            translator(v(12)).lock(lock),
            Err(SqlError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_pct_free() {
        assert_eq!(
            translator(v(9)).fill_factor(80).unwrap().as_deref(),
            Some(" PCTFREE 20")
        );
    }

    #[test]
    fn test_binary_float_from_10() {
        assert_eq!(type_mapper(v(9)).native_name(&SqlType::Float32).unwrap(), "FLOAT(24)");
        assert_eq!(
            type_mapper(v(10)).native_name(&SqlType::Float64).unwrap(),
            "BINARY_DOUBLE"
        );
    }

    #[test]
    fn test_paging_per_version() {
        assert_eq!(translator(v(11)).paging().unwrap(), PagingStyle::Unsupported);
        assert_eq!(translator(v(12)).paging().unwrap(), PagingStyle::OffsetFetch);
    }
}
