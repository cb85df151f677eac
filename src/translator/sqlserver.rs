//! SQL Server 2005 (9), 2008 (10) and 2012 (11) rules.

use chrono::{NaiveDate, NaiveDateTime};

use super::{
    ansi_layer, FromlessSelect, LockClause, PagingStyle, SqlTemplate, Translator,
    TranslatorLayer, TypeMapper,
};
use crate::ast::{
    SqlAggregateType, SqlBinaryOperator, SqlFunctionType as F, SqlLock, SqlLockBehavior,
    SqlLockMode, SqlType,
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
    Translator::new(layers)
}

pub fn type_mapper(version: ServerVersion) -> TypeMapper {
    let mut layers: Vec<fn(&SqlType) -> Option<String>> = vec![types_9];
    if version >= ServerVersion::new(10, 0) {
        layers.push(types_10);
    }
    TypeMapper::new("SQL Server", layers)
}

fn v9() -> TranslatorLayer {
    let functions = [
        (F::Ceiling, SqlTemplate::Call("CEILING")),
        (F::Log, SqlTemplate::Call("LOG")),
        (F::Log10, SqlTemplate::Call("LOG10")),
        (F::Square, SqlTemplate::Call("SQUARE")),
        (F::Truncate, SqlTemplate::Pattern("ROUND({0}, 0, 1)")),
        (F::Atan2, SqlTemplate::Call("ATN2")),
        (F::Cot, SqlTemplate::Call("COT")),
        (F::Degrees, SqlTemplate::Call("DEGREES")),
        (F::Radians, SqlTemplate::Call("RADIANS")),
        (F::Concat, SqlTemplate::Infix("+")),
        (F::Length, SqlTemplate::Call("LEN")),
        (F::Trim, SqlTemplate::Pattern("LTRIM(RTRIM({0}))")),
        (F::Substring, SqlTemplate::Call("SUBSTRING")),
        (F::Position, SqlTemplate::Pattern("CHARINDEX({1}, {0})")),
        (
            F::CurrentDate,
            SqlTemplate::Pattern("DATEADD(dd, DATEDIFF(dd, 0, GETDATE()), 0)"),
        ),
        (F::CurrentTimestamp, SqlTemplate::Pattern("GETDATE()")),
        (
            F::DateTimeConstruct,
            SqlTemplate::Pattern(
                "DATEADD(dd, {2} - 1, DATEADD(mm, {1} - 1, DATEADD(yy, {0} - 1900, 0)))",
            ),
        ),
        (F::DateTimeExtractYear, SqlTemplate::Pattern("DATEPART(year, {0})")),
        (F::DateTimeExtractMonth, SqlTemplate::Pattern("DATEPART(month, {0})")),
        (F::DateTimeExtractDay, SqlTemplate::Pattern("DATEPART(day, {0})")),
        (F::DateTimeExtractHour, SqlTemplate::Pattern("DATEPART(hour, {0})")),
        (F::DateTimeExtractMinute, SqlTemplate::Pattern("DATEPART(minute, {0})")),
        (F::DateTimeExtractSecond, SqlTemplate::Pattern("DATEPART(second, {0})")),
        (
            F::DateTimeExtractDayOfWeek,
            SqlTemplate::Pattern("(DATEPART(weekday, {0}) - 1)"),
        ),
        (
            F::DateTimeExtractDayOfYear,
            SqlTemplate::Pattern("DATEPART(dayofyear, {0})"),
        ),
        (
            F::DateTimeTruncate,
            SqlTemplate::Pattern("DATEADD(dd, DATEDIFF(dd, 0, {0}), 0)"),
        ),
        (F::DateTimeAddYears, SqlTemplate::Pattern("DATEADD(year, {1}, {0})")),
        (F::DateTimeAddMonths, SqlTemplate::Pattern("DATEADD(month, {1}, {0})")),
        (F::DateTimeAddDays, SqlTemplate::Pattern("DATEADD(day, {1}, {0})")),
        // intervals are carried as bigint milliseconds
        (F::IntervalConstruct, SqlTemplate::Pattern("CAST({0} AS bigint)")),
        (F::IntervalToMilliseconds, SqlTemplate::Pattern("{0}")),
    ]
    .into_iter()
    .collect();

    TranslatorLayer {
        name: "SQL Server 9",
        quote_identifier: Some(quote_bracket),
        string_literal: Some(national_string),
        bool_literal: Some(bit_literal),
        datetime_literal: Some(datetime_literal),
        date_literal: Some(date_literal_9),
        functions,
        aggregates: [(SqlAggregateType::Count, "COUNT_BIG")].into_iter().collect(),
        operators: [(SqlBinaryOperator::Concat, SqlTemplate::Pattern("{0} + {1}"))]
            .into_iter()
            .collect(),
        paging: Some(PagingStyle::Top),
        lock: Some(table_hint),
        fromless_select: Some(FromlessSelect::Omit),
        window_functions: Some(true),
        fill_factor: Some(fill_factor),
        ..Default::default()
    }
}

fn v10() -> TranslatorLayer {
    let functions = [
        (F::CurrentDate, SqlTemplate::Pattern("CAST(GETDATE() AS date)")),
        (F::DateTimeTruncate, SqlTemplate::Pattern("CAST({0} AS date)")),
    ]
    .into_iter()
    .collect();

    TranslatorLayer {
        name: "SQL Server 10",
        date_literal: Some(date_literal_10),
        functions,
        ..Default::default()
    }
}

fn v11() -> TranslatorLayer {
    TranslatorLayer {
        name: "SQL Server 11",
        functions: [(F::DateTimeConstruct, SqlTemplate::Call("DATEFROMPARTS"))]
            .into_iter()
            .collect(),
        paging: Some(PagingStyle::OffsetFetch),
        offset_order_fallback: Some(" ORDER BY (SELECT NULL)"),
        ..Default::default()
    }
}

/// `[name]` with embedded closing brackets doubled.
pub fn quote_bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

fn national_string(value: &str) -> String {
    format!("N{}", super::quote_plain(value))
}

fn bit_literal(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn datetime_literal(value: &NaiveDateTime) -> String {
    format!(
        "CONVERT(datetime, '{}', 126)",
        value.format("%Y-%m-%dT%H:%M:%S%.3f")
    )
}

fn date_literal_9(value: &NaiveDate) -> String {
    format!("CONVERT(datetime, '{}', 126)", value.format("%Y-%m-%d"))
}

fn date_literal_10(value: &NaiveDate) -> String {
    format!("CAST('{}' AS date)", value.format("%Y-%m-%d"))
}

fn table_hint(lock: SqlLock) -> Option<LockClause> {
    let mut hints = vec![match lock.mode {
        SqlLockMode::Shared => "HOLDLOCK",
        SqlLockMode::Update => "UPDLOCK",
        SqlLockMode::Exclusive => "XLOCK",
    }];
    hints.push("ROWLOCK");
    match lock.behavior {
        SqlLockBehavior::Wait => {}
        SqlLockBehavior::NoWait => hints.push("NOWAIT"),
        SqlLockBehavior::SkipLocked => hints.push("READPAST"),
    }
    Some(LockClause::TableHint(format!(" WITH ({})", hints.join(", "))))
}

fn fill_factor(percent: u8) -> Option<String> {
    Some(format!(" WITH (FILLFACTOR = {percent})"))
}

fn types_9(ty: &SqlType) -> Option<String> {
    let name = match ty {
        SqlType::Boolean => "bit".to_string(),
        SqlType::Int16 => "smallint".to_string(),
        SqlType::Int32 => "int".to_string(),
        SqlType::Int64 => "bigint".to_string(),
        SqlType::Float32 => "real".to_string(),
        SqlType::Float64 => "float".to_string(),
        SqlType::Decimal { precision, scale } => format!("decimal({precision}, {scale})"),
        SqlType::VarChar { length: Some(n) } => format!("nvarchar({n})"),
        SqlType::VarChar { length: None } => "nvarchar(max)".to_string(),
        SqlType::DateTime | SqlType::Date => "datetime".to_string(),
        SqlType::Guid => "uniqueidentifier".to_string(),
        SqlType::Binary => "varbinary(max)".to_string(),
    };
    Some(name)
}

fn types_10(ty: &SqlType) -> Option<String> {
    match ty {
        SqlType::Date => Some("date".to_string()),
        SqlType::DateTime => Some("datetime2".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u16) -> ServerVersion {
        ServerVersion::new(major, 0)
    }

    #[test]
    fn test_quoting() {
        let t = translator(v(9));
        assert_eq!(t.quote_identifier("a]b").unwrap(), "[a]]b]");
        assert_eq!(t.string_literal("O'Brien\\path").unwrap(), "N'O''Brien\\path'");
        assert_eq!(
            t.literal(&crate::ast::SqlLiteral::Boolean(true)).unwrap(),
            "1"
        );
    }

    #[test]
    fn test_count_is_count_big() {
        assert_eq!(translator(v(9)).aggregate(SqlAggregateType::Count).unwrap(), "COUNT_BIG");
        assert_eq!(translator(v(11)).aggregate(SqlAggregateType::Sum).unwrap(), "SUM");
    }

    #[test]
    fn test_paging_per_version() {
        assert_eq!(translator(v(9)).paging().unwrap(), PagingStyle::Top);
        assert_eq!(translator(v(10)).paging().unwrap(), PagingStyle::Top);
        assert_eq!(translator(v(11)).paging().unwrap(), PagingStyle::OffsetFetch);
    }

    #[test]
    fn test_date_functions_per_version() {
        let args = vec!["y".to_string(), "m".to_string(), "d".to_string()];
        assert!(translator(v(10))
            .function(F::DateTimeConstruct, &args)
            .unwrap()
            .starts_with("DATEADD("));
        assert_eq!(
            translator(v(11)).function(F::DateTimeConstruct, &args).unwrap(),
            "DATEFROMPARTS(y, m, d)"
        );
        assert_eq!(
            translator(v(10)).function(F::DateTimeTruncate, &args[..1]).unwrap(),
            "CAST(y AS date)"
        );
    }

    #[test]
    fn test_lock_hints() {
        let lock = SqlLock {
            mode: SqlLockMode::Update,
            behavior: SqlLockBehavior::SkipLocked,
        };
        assert_eq!(
            translator(v(9)).lock(lock).unwrap(),
            LockClause::TableHint(" WITH (UPDLOCK, ROWLOCK, READPAST)".into())
        );
    }

    #[test]
    fn test_date_type_from_10() {
        assert_eq!(type_mapper(v(9)).native_name(&SqlType::Date).unwrap(), "datetime");
        assert_eq!(type_mapper(v(10)).native_name(&SqlType::Date).unwrap(), "date");
    }
}
