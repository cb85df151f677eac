//! Dialect translators.
//!
//! A translator is an ordered list of rule layers, generic ANSI rules first
//! and the most specific server version last. Each lookup walks the layers
//! from the most specific one and takes the first rule defined; a rule
//! defined by no layer is a [`SqlError::MissingTranslation`].
//!
//! ```text
//! PostgreSQL 8.4 -> 8.3 -> 8.2 -> 8.1 -> 8.0 -> ANSI
//! ```
pub mod oracle;
pub mod postgresql;
pub mod sqlserver;

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::ast::{
    SqlAggregateType, SqlBinaryOperator, SqlFunctionType, SqlLiteral, SqlLock, SqlType,
};
use crate::error::{Result, SqlError};

/// Text shape of a function or operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlTemplate {
    /// `NAME(a, b, ...)`
    Call(&'static str),
    /// `(a op b op ...)`
    Infix(&'static str),
    /// Free text with `{0}`, `{1}`, ... argument slots.
    Pattern(&'static str),
}

/// Piece of an expanded template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Text(String),
    Arg(usize),
}

impl SqlTemplate {
    /// Expand the template for `arity` arguments.
    pub fn parts(&self, arity: usize) -> Vec<TemplatePart> {
        let mut parts = Vec::with_capacity(arity * 2 + 1);
        match self {
            SqlTemplate::Call(name) => {
                parts.push(TemplatePart::Text(format!("{name}(")));
                push_separated(&mut parts, arity, ", ");
                parts.push(TemplatePart::Text(")".to_string()));
            }
            SqlTemplate::Infix(op) => {
                parts.push(TemplatePart::Text("(".to_string()));
                push_separated(&mut parts, arity, &format!(" {op} "));
                parts.push(TemplatePart::Text(")".to_string()));
            }
            SqlTemplate::Pattern(pattern) => parse_pattern(pattern, arity, &mut parts),
        }
        parts
    }

    pub fn apply(&self, args: &[String]) -> String {
        self.parts(args.len())
            .into_iter()
            .map(|part| match part {
                TemplatePart::Text(text) => text,
                TemplatePart::Arg(i) => args[i].clone(),
            })
            .collect()
    }
}

fn push_separated(parts: &mut Vec<TemplatePart>, arity: usize, separator: &str) {
    for i in 0..arity {
        if i > 0 {
            parts.push(TemplatePart::Text(separator.to_string()));
        }
        parts.push(TemplatePart::Arg(i));
    }
}

fn parse_pattern(pattern: &str, arity: usize, parts: &mut Vec<TemplatePart>) {
    let mut text = String::new();
    let mut rest = pattern;
    while let Some(start) = rest.find('{') {
        text.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let slot = after
            .find('}')
            .and_then(|end| after[..end].parse::<usize>().ok().map(|i| (i, end)));
        match slot {
            Some((i, end)) if i < arity => {
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                }
                parts.push(TemplatePart::Arg(i));
                rest = &after[end + 1..];
            }
            _ => {
                text.push('{');
                rest = after;
            }
        }
    }
    text.push_str(rest);
    if !text.is_empty() {
        parts.push(TemplatePart::Text(text));
    }
}

/// How a select's row limit and offset are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
    /// `SELECT TOP (n)`, no offset.
    Top,
    /// No native clause; the query compiler emulates paging.
    Unsupported,
}

/// Where a lock request lands in the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockClause {
    /// Appended after the whole select: ` FOR UPDATE NOWAIT`.
    Suffix(String),
    /// Attached to every table reference: ` WITH (UPDLOCK, ROWLOCK)`.
    TableHint(String),
}

/// Spelling of a select without FROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromlessSelect {
    Omit,
    Table(&'static str),
}

/// One layer of rules. Unset rules fall through to the layer below.
#[derive(Default, Clone)]
pub struct TranslatorLayer {
    pub name: &'static str,
    pub quote_identifier: Option<fn(&str) -> String>,
    pub string_literal: Option<fn(&str) -> String>,
    pub bool_literal: Option<fn(bool) -> String>,
    pub datetime_literal: Option<fn(&NaiveDateTime) -> String>,
    pub date_literal: Option<fn(&NaiveDate) -> String>,
    pub parameter_prefix: Option<&'static str>,
    pub functions: HashMap<SqlFunctionType, SqlTemplate>,
    pub aggregates: HashMap<SqlAggregateType, &'static str>,
    pub operators: HashMap<SqlBinaryOperator, SqlTemplate>,
    pub paging: Option<PagingStyle>,
    /// `None` from the rule means the lock request cannot be expressed.
    pub lock: Option<fn(SqlLock) -> Option<LockClause>>,
    pub table_alias: Option<&'static str>,
    pub fromless_select: Option<FromlessSelect>,
    pub nulls_ordering: Option<bool>,
    pub window_functions: Option<bool>,
    /// `None` from the rule means the storage parameter is not emitted.
    pub fill_factor: Option<fn(u8) -> Option<String>>,
    /// ORDER BY emitted when an offset clause needs one and none is given.
    pub offset_order_fallback: Option<&'static str>,
}

impl TranslatorLayer {
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }
}

/// Immutable, layered rule table of one server version.
pub struct Translator {
    layers: Vec<TranslatorLayer>,
}

impl Translator {
    /// `layers` are ordered from least to most specific.
    pub fn new(layers: Vec<TranslatorLayer>) -> Self {
        Self { layers }
    }

    /// Name of the most specific layer, e.g. `PostgreSQL 8.3`.
    pub fn name(&self) -> &'static str {
        self.layers.last().map(|l| l.name).unwrap_or("empty")
    }

    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name).collect()
    }

    fn resolve<T>(&self, rule: &str, pick: impl Fn(&TranslatorLayer) -> Option<T>) -> Result<T> {
        self.layers
            .iter()
            .rev()
            .find_map(pick)
            .ok_or_else(|| SqlError::MissingTranslation {
                dialect: self.name().to_string(),
                rule: rule.to_string(),
            })
    }

    pub fn unsupported(&self, feature: impl Into<String>) -> SqlError {
        SqlError::unsupported(feature, self.name())
    }

    pub fn quote_identifier(&self, name: &str) -> Result<String> {
        let quote = self.resolve("identifier quoting", |l| l.quote_identifier)?;
        Ok(quote(name))
    }

    pub fn string_literal(&self, value: &str) -> Result<String> {
        let translate = self.resolve("string literal", |l| l.string_literal)?;
        Ok(translate(value))
    }

    pub fn literal(&self, literal: &SqlLiteral) -> Result<String> {
        let text = match literal {
            SqlLiteral::Boolean(b) => {
                let translate = self.resolve("boolean literal", |l| l.bool_literal)?;
                translate(*b)
            }
            SqlLiteral::Integer(i) => i.to_string(),
            SqlLiteral::Float(f) => float_literal(*f)?,
            SqlLiteral::String(s) => self.string_literal(s)?,
            SqlLiteral::DateTime(dt) => {
                let translate = self.resolve("datetime literal", |l| l.datetime_literal)?;
                translate(dt)
            }
            SqlLiteral::Date(d) => {
                let translate = self.resolve("date literal", |l| l.date_literal)?;
                translate(d)
            }
        };
        Ok(text)
    }

    pub fn parameter_prefix(&self) -> Result<&'static str> {
        self.resolve("parameter prefix", |l| l.parameter_prefix)
    }

    pub fn function_template(&self, function: SqlFunctionType) -> Result<SqlTemplate> {
        self.resolve(&format!("function {function:?}"), |l| {
            l.functions.get(&function).copied()
        })
    }

    pub fn function(&self, function: SqlFunctionType, args: &[String]) -> Result<String> {
        Ok(self.function_template(function)?.apply(args))
    }

    pub fn aggregate(&self, kind: SqlAggregateType) -> Result<&'static str> {
        self.resolve(&format!("aggregate {kind:?}"), |l| l.aggregates.get(&kind).copied())
    }

    pub fn operator_template(&self, op: SqlBinaryOperator) -> Result<SqlTemplate> {
        self.resolve(&format!("operator {op:?}"), |l| l.operators.get(&op).copied())
    }

    pub fn binary(&self, op: SqlBinaryOperator, left: String, right: String) -> Result<String> {
        Ok(self.operator_template(op)?.apply(&[left, right]))
    }

    pub fn paging(&self) -> Result<PagingStyle> {
        self.resolve("paging", |l| l.paging)
    }

    pub fn lock(&self, lock: SqlLock) -> Result<LockClause> {
        let rule = self.resolve("lock", |l| l.lock)?;
        rule(lock).ok_or_else(|| {
            self.unsupported(format!("{:?} lock with {:?}", lock.mode, lock.behavior))
        })
    }

    pub fn table_alias(&self) -> Result<&'static str> {
        self.resolve("table alias", |l| l.table_alias)
    }

    pub fn fromless_select(&self) -> Result<FromlessSelect> {
        self.resolve("select without FROM", |l| l.fromless_select)
    }

    pub fn nulls_ordering(&self) -> Result<bool> {
        self.resolve("NULLS ordering", |l| l.nulls_ordering)
    }

    pub fn window_functions(&self) -> Result<bool> {
        self.resolve("window functions", |l| l.window_functions)
    }

    pub fn offset_order_fallback(&self) -> Result<&'static str> {
        self.resolve("offset ordering", |l| l.offset_order_fallback)
    }

    pub fn fill_factor(&self, percent: u8) -> Result<Option<String>> {
        let rule = self.resolve("fill factor", |l| l.fill_factor)?;
        Ok(rule(percent))
    }
}

fn float_literal(value: f64) -> Result<String> {
    if !value.is_finite() {
        return Err(SqlError::invalid_argument(
            "literal",
            format!("{value} has no SQL representation"),
        ));
    }
    let text = value.to_string();
    if text.contains(['.', 'e', 'E']) {
        Ok(text)
    } else {
        Ok(format!("{text}.0"))
    }
}

/// Rules shared by every dialect.
pub fn ansi_layer() -> TranslatorLayer {
    use SqlBinaryOperator::*;

    let operators = [
        (Eq, "{0} = {1}"),
        (NotEq, "{0} <> {1}"),
        (Lt, "{0} < {1}"),
        (LtEq, "{0} <= {1}"),
        (Gt, "{0} > {1}"),
        (GtEq, "{0} >= {1}"),
        (And, "{0} AND {1}"),
        (Or, "{0} OR {1}"),
        (Plus, "{0} + {1}"),
        (Minus, "{0} - {1}"),
        (Multiply, "{0} * {1}"),
        (Divide, "{0} / {1}"),
        (Modulo, "{0} % {1}"),
        (Concat, "{0} || {1}"),
        (Like, "{0} LIKE {1}"),
        (In, "{0} IN {1}"),
        (NotIn, "{0} NOT IN {1}"),
    ]
    .into_iter()
    .map(|(op, pattern)| (op, SqlTemplate::Pattern(pattern)))
    .collect();

    let aggregates = [
        (SqlAggregateType::Count, "COUNT"),
        (SqlAggregateType::Sum, "SUM"),
        (SqlAggregateType::Avg, "AVG"),
        (SqlAggregateType::Min, "MIN"),
        (SqlAggregateType::Max, "MAX"),
    ]
    .into_iter()
    .collect();

    use SqlFunctionType as F;
    let functions = [
        (F::Abs, SqlTemplate::Call("ABS")),
        (F::Floor, SqlTemplate::Call("FLOOR")),
        (F::Exp, SqlTemplate::Call("EXP")),
        (F::Power, SqlTemplate::Call("POWER")),
        (F::Sign, SqlTemplate::Call("SIGN")),
        (F::Sqrt, SqlTemplate::Call("SQRT")),
        (F::Square, SqlTemplate::Pattern("({0} * {0})")),
        (F::Round, SqlTemplate::Call("ROUND")),
        (F::RoundDigits, SqlTemplate::Call("ROUND")),
        (F::Acos, SqlTemplate::Call("ACOS")),
        (F::Asin, SqlTemplate::Call("ASIN")),
        (F::Atan, SqlTemplate::Call("ATAN")),
        (F::Cos, SqlTemplate::Call("COS")),
        (F::Sin, SqlTemplate::Call("SIN")),
        (F::Tan, SqlTemplate::Call("TAN")),
        (F::Lower, SqlTemplate::Call("LOWER")),
        (F::Upper, SqlTemplate::Call("UPPER")),
        (F::Replace, SqlTemplate::Call("REPLACE")),
        (F::Coalesce, SqlTemplate::Call("COALESCE")),
        (F::CurrentTimestamp, SqlTemplate::Pattern("CURRENT_TIMESTAMP")),
    ]
    .into_iter()
    .collect();

    TranslatorLayer {
        name: "ANSI",
        quote_identifier: Some(quote_double),
        string_literal: Some(quote_plain),
        bool_literal: Some(bool_keyword),
        parameter_prefix: Some("@"),
        functions,
        aggregates,
        operators,
        table_alias: Some(" AS "),
        fromless_select: Some(FromlessSelect::Omit),
        nulls_ordering: Some(false),
        window_functions: Some(false),
        offset_order_fallback: Some(""),
        ..Default::default()
    }
}

fn bool_keyword(value: bool) -> String {
    if value { "TRUE" } else { "FALSE" }.to_string()
}

/// `"name"` with embedded quotes doubled.
pub fn quote_double(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `'value'` with quotes doubled and NUL characters dropped.
pub fn quote_plain(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\0' => {}
            '\'' => out.push_str("''"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Native type names, layered like [`Translator`].
pub struct TypeMapper {
    dialect: &'static str,
    layers: Vec<fn(&SqlType) -> Option<String>>,
}

impl TypeMapper {
    pub fn new(dialect: &'static str, layers: Vec<fn(&SqlType) -> Option<String>>) -> Self {
        Self { dialect, layers }
    }

    pub fn native_name(&self, ty: &SqlType) -> Result<String> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer(ty))
            .ok_or_else(|| SqlError::MissingTranslation {
                dialect: self.dialect.to_string(),
                rule: format!("type {ty:?}"),
            })
    }
}
