//! PostgreSQL 8.0 - 8.4 rules.

use chrono::{NaiveDate, NaiveDateTime};

use super::{
    ansi_layer, quote_double, FromlessSelect, LockClause, PagingStyle, SqlTemplate, Translator,
    TranslatorLayer, TypeMapper,
};
use crate::ast::{SqlFunctionType as F, SqlLock, SqlLockBehavior, SqlLockMode, SqlType};
use crate::driver::ServerVersion;

pub const MIN_VERSION: ServerVersion = ServerVersion::new(8, 0);

pub fn translator(version: ServerVersion) -> Translator {
    let mut layers = vec![ansi_layer(), v8_0()];
    if version >= ServerVersion::new(8, 1) {
        layers.push(v8_1());
    }
    if version >= ServerVersion::new(8, 2) {
        layers.push(v8_2());
    }
    if version >= ServerVersion::new(8, 3) {
        layers.push(v8_3());
    }
    if version >= ServerVersion::new(8, 4) {
        layers.push(v8_4());
    }
    Translator::new(layers)
}

pub fn type_mapper(version: ServerVersion) -> TypeMapper {
    let mut layers: Vec<fn(&SqlType) -> Option<String>> = vec![types_8_0];
    if version >= ServerVersion::new(8, 3) {
        layers.push(types_8_3);
    }
    TypeMapper::new("PostgreSQL", layers)
}

fn v8_0() -> TranslatorLayer {
    let functions = [
        (F::Ceiling, SqlTemplate::Call("CEIL")),
        (F::Log, SqlTemplate::Call("LN")),
        (F::Log10, SqlTemplate::Call("LOG")),
        (F::Truncate, SqlTemplate::Call("TRUNC")),
        (F::Atan2, SqlTemplate::Call("ATAN2")),
        (F::Cot, SqlTemplate::Call("COT")),
        (F::Degrees, SqlTemplate::Call("DEGREES")),
        (F::Radians, SqlTemplate::Call("RADIANS")),
        (F::Concat, SqlTemplate::Infix("||")),
        (F::Length, SqlTemplate::Call("LENGTH")),
        (F::Trim, SqlTemplate::Call("TRIM")),
        (F::Substring, SqlTemplate::Call("SUBSTR")),
        (F::Position, SqlTemplate::Pattern("POSITION({1} IN {0})")),
        (F::CurrentDate, SqlTemplate::Pattern("CURRENT_DATE")),
        (
            F::DateTimeConstruct,
            SqlTemplate::Pattern("TO_DATE({0} || '-' || {1} || '-' || {2}, 'YYYY-MM-DD')"),
        ),
        (F::DateTimeExtractYear, SqlTemplate::Pattern("EXTRACT(YEAR FROM {0})")),
        (F::DateTimeExtractMonth, SqlTemplate::Pattern("EXTRACT(MONTH FROM {0})")),
        (F::DateTimeExtractDay, SqlTemplate::Pattern("EXTRACT(DAY FROM {0})")),
        (F::DateTimeExtractHour, SqlTemplate::Pattern("EXTRACT(HOUR FROM {0})")),
        (F::DateTimeExtractMinute, SqlTemplate::Pattern("EXTRACT(MINUTE FROM {0})")),
        (F::DateTimeExtractSecond, SqlTemplate::Pattern("EXTRACT(SECOND FROM {0})")),
        (F::DateTimeExtractDayOfWeek, SqlTemplate::Pattern("EXTRACT(DOW FROM {0})")),
        (F::DateTimeExtractDayOfYear, SqlTemplate::Pattern("EXTRACT(DOY FROM {0})")),
        (F::DateTimeTruncate, SqlTemplate::Pattern("DATE_TRUNC('day', {0})")),
        (F::DateTimeAddYears, SqlTemplate::Pattern("({0} + {1} * INTERVAL '1 year')")),
        (F::DateTimeAddMonths, SqlTemplate::Pattern("({0} + {1} * INTERVAL '1 month')")),
        (F::DateTimeAddDays, SqlTemplate::Pattern("({0} + {1} * INTERVAL '1 day')")),
        (F::IntervalConstruct, SqlTemplate::Pattern("({0} * INTERVAL '1 millisecond')")),
        (
            F::IntervalToMilliseconds,
            SqlTemplate::Pattern("(EXTRACT(EPOCH FROM {0}) * 1000)"),
        ),
    ]
    .into_iter()
    .collect();

    TranslatorLayer {
        name: "PostgreSQL 8.0",
        quote_identifier: Some(quote_double),
        string_literal: Some(string_8_0),
        datetime_literal: Some(timestamp_literal),
        date_literal: Some(date_literal),
        functions,
        paging: Some(PagingStyle::LimitOffset),
        lock: Some(lock_8_0),
        fromless_select: Some(FromlessSelect::Omit),
        fill_factor: Some(no_fill_factor),
        ..Default::default()
    }
}

fn v8_1() -> TranslatorLayer {
    TranslatorLayer {
        name: "PostgreSQL 8.1",
        string_literal: Some(string_8_1),
        lock: Some(lock_8_1),
        ..Default::default()
    }
}

fn v8_2() -> TranslatorLayer {
    TranslatorLayer {
        name: "PostgreSQL 8.2",
        fill_factor: Some(fill_factor),
        ..Default::default()
    }
}

fn v8_3() -> TranslatorLayer {
    TranslatorLayer {
        name: "PostgreSQL 8.3",
        nulls_ordering: Some(true),
        ..Default::default()
    }
}

fn v8_4() -> TranslatorLayer {
    TranslatorLayer {
        name: "PostgreSQL 8.4",
        window_functions: Some(true),
        ..Default::default()
    }
}

/// 8.0 reads backslashes as escapes inside plain literals.
fn string_8_0(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    push_escaped(&mut out, value);
    out.push('\'');
    out
}

/// From 8.1 on, escapes are only honoured in `E'...'` strings.
fn string_8_1(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 3);
    out.push_str("E'");
    push_escaped(&mut out, value);
    out.push('\'');
    out
}

fn push_escaped(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\0' => {}
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
}

fn timestamp_literal(value: &NaiveDateTime) -> String {
    format!("TIMESTAMP '{}'", value.format("%Y-%m-%d %H:%M:%S%.3f"))
}

fn date_literal(value: &NaiveDate) -> String {
    format!("DATE '{}'", value.format("%Y-%m-%d"))
}

fn lock_8_0(lock: SqlLock) -> Option<LockClause> {
    match lock.behavior {
        SqlLockBehavior::Wait => Some(LockClause::Suffix(lock_mode(lock.mode).to_string())),
        SqlLockBehavior::NoWait | SqlLockBehavior::SkipLocked => None,
    }
}

fn lock_8_1(lock: SqlLock) -> Option<LockClause> {
    let mode = lock_mode(lock.mode);
    match lock.behavior {
        SqlLockBehavior::Wait => Some(LockClause::Suffix(mode.to_string())),
        SqlLockBehavior::NoWait => Some(LockClause::Suffix(format!("{mode} NOWAIT"))),
        SqlLockBehavior::SkipLocked => None,
    }
}

fn lock_mode(mode: SqlLockMode) -> &'static str {
    match mode {
        SqlLockMode::Shared => " FOR SHARE",
        SqlLockMode::Update | SqlLockMode::Exclusive => " FOR UPDATE",
    }
}

fn no_fill_factor(_: u8) -> Option<String> {
    None
}

fn fill_factor(percent: u8) -> Option<String> {
    Some(format!(" WITH (FILLFACTOR = {percent})"))
}

fn types_8_0(ty: &SqlType) -> Option<String> {
    let name = match ty {
        SqlType::Boolean => "boolean".to_string(),
        SqlType::Int16 => "smallint".to_string(),
        SqlType::Int32 => "integer".to_string(),
        SqlType::Int64 => "bigint".to_string(),
        SqlType::Float32 => "real".to_string(),
        SqlType::Float64 => "double precision".to_string(),
        SqlType::Decimal { precision, scale } => format!("numeric({precision}, {scale})"),
        SqlType::VarChar { length: Some(n) } => format!("varchar({n})"),
        SqlType::VarChar { length: None } => "text".to_string(),
        SqlType::DateTime => "timestamp".to_string(),
        SqlType::Date => "date".to_string(),
        SqlType::Guid => "char(36)".to_string(),
        SqlType::Binary => "bytea".to_string(),
    };
    Some(name)
}

fn types_8_3(ty: &SqlType) -> Option<String> {
    match ty {
        SqlType::Guid => Some("uuid".to_string()),
        _ => None,
    }
}
