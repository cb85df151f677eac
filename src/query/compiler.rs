use std::cell::RefMut;
use std::sync::Arc;

use tracing::debug;

use super::expression::column_at;
use super::{
    AggregateColumn, CalculatedColumn, ColumnInfo, Expr, Header, JoinType, OrderItem,
    PagingEmulationCompiler, Provider,
};
use crate::ast::{
    SqlAggregateType, SqlBinaryOperator, SqlColumn, SqlJoinKind, SqlLiteral, SqlLock, SqlNode,
    SqlOrder, SqlRef, SqlSelect, SqlType,
};
use crate::driver::ServerInfo;
use crate::error::{Result, SqlError};
use crate::schema::TableDef;

/// State of one provider-tree compilation.
pub struct CompilerContext<'a> {
    server: &'a ServerInfo,
    aliases: usize,
}

impl<'a> CompilerContext<'a> {
    pub fn new(server: &'a ServerInfo) -> Self {
        Self { server, aliases: 0 }
    }

    pub fn server(&self) -> &ServerInfo {
        self.server
    }

    /// Fresh table alias: `t0`, `t1`, ...
    pub fn next_alias(&mut self) -> String {
        let alias = format!("t{}", self.aliases);
        self.aliases += 1;
        alias
    }
}

/// A provider compiled to a select statement.
///
/// The select's output columns line up with `header`: column `i` of the
/// statement produces header column `i` under the header's name.
#[derive(Debug, Clone)]
pub struct SqlProvider {
    pub request: SqlRef,
    pub header: Header,
}

impl SqlProvider {
    pub fn new(request: SqlRef, header: Header) -> Self {
        Self { request, header }
    }
}

/// One strategy for turning providers into SQL.
///
/// `Ok(None)` means "not mine": the chain moves on to the next compiler.
pub trait ProviderCompiler: Send + Sync {
    fn name(&self) -> &str;

    fn compile(
        &self,
        chain: &CompilerChain,
        ctx: &mut CompilerContext<'_>,
        provider: &Provider,
    ) -> Result<Option<SqlProvider>>;
}

/// Ordered list of compilers; the first one returning a result wins.
pub struct CompilerChain {
    compilers: Vec<Box<dyn ProviderCompiler>>,
}

impl CompilerChain {
    pub fn new(compilers: Vec<Box<dyn ProviderCompiler>>) -> Self {
        Self { compilers }
    }

    /// Native compilation first, ROW_NUMBER paging emulation as fallback.
    pub fn standard() -> Self {
        Self::new(vec![Box::new(SqlCompiler), Box::new(PagingEmulationCompiler)])
    }

    pub fn compiler_names(&self) -> Vec<&str> {
        self.compilers.iter().map(|c| c.name()).collect()
    }

    /// Compile a source provider; `None` when no compiler accepts it.
    pub fn try_compile(
        &self,
        ctx: &mut CompilerContext<'_>,
        provider: &Provider,
    ) -> Result<Option<SqlProvider>> {
        for (i, compiler) in self.compilers.iter().enumerate() {
            if let Some(compiled) = compiler.compile(self, ctx, provider)? {
                if i > 0 {
                    debug!(
                        compiler = compiler.name(),
                        provider = provider.name(),
                        server = %ctx.server(),
                        "fallback compiler selected"
                    );
                }
                return Ok(Some(compiled));
            }
        }
        Ok(None)
    }

    pub fn compile(&self, ctx: &mut CompilerContext<'_>, provider: &Provider) -> Result<SqlProvider> {
        self.try_compile(ctx, provider)?
            .ok_or(SqlError::NotCompilable(provider.name()))
    }
}

/// Compiles every operator the server supports natively.
pub struct SqlCompiler;

impl ProviderCompiler for SqlCompiler {
    fn name(&self) -> &str {
        "sql"
    }

    fn compile(
        &self,
        chain: &CompilerChain,
        ctx: &mut CompilerContext<'_>,
        provider: &Provider,
    ) -> Result<Option<SqlProvider>> {
        // leaves
        match provider {
            Provider::Index { table } => return Ok(Some(compile_index(ctx, table))),
            Provider::Raw { sql, header } => return Ok(Some(compile_raw(ctx, sql, header))),
            _ => {}
        }
        let features = ctx.server().features;
        match provider {
            Provider::Take { .. } if !features.limit => return Ok(None),
            Provider::Skip { .. } if !features.offset => return Ok(None),
            Provider::Paging { .. } if !(features.limit && features.offset) => return Ok(None),
            _ => {}
        }

        if let Provider::Join {
            left,
            right,
            kind,
            pairs,
        } = provider
        {
            let Some(left) = chain.try_compile(ctx, left)? else {
                return Ok(None);
            };
            let Some(right) = chain.try_compile(ctx, right)? else {
                return Ok(None);
            };
            return compile_join(ctx, left, right, *kind, pairs);
        }

        let source = match provider {
            Provider::Filter { source, .. }
            | Provider::Select { source, .. }
            | Provider::Calculate { source, .. }
            | Provider::Aggregate { source, .. }
            | Provider::Sort { source, .. }
            | Provider::Distinct { source }
            | Provider::Take { source, .. }
            | Provider::Skip { source, .. }
            | Provider::Paging { source, .. }
            | Provider::Lock { source, .. } => source,
            Provider::Index { .. } | Provider::Raw { .. } | Provider::Join { .. } => {
                return Ok(None)
            }
        };
        let Some(compiled) = chain.try_compile(ctx, source)? else {
            return Ok(None);
        };
        if compiled.request.as_select().is_none() {
            return Ok(None);
        }
        let ordered = !source.is_paging();

        let result = match provider {
            Provider::Filter { predicate, .. } => {
                compile_filter(wrap_if(ctx, compiled, Shape::Filter), predicate)?
            }
            Provider::Select { columns, .. } => {
                compile_projection(wrap_if(ctx, compiled, Shape::Project), columns)?
            }
            Provider::Calculate { columns, .. } => {
                compile_calculate(wrap_if(ctx, compiled, Shape::Calculate), columns)?
            }
            Provider::Aggregate {
                group_by,
                aggregates,
                ..
            } => compile_aggregate(wrap_if(ctx, compiled, Shape::Aggregate), group_by, aggregates)?,
            Provider::Sort { order, .. } => {
                compile_sort(wrap_if(ctx, compiled, Shape::Sort), order)?
            }
            Provider::Distinct { .. } => {
                compile_distinct(wrap_if(ctx, compiled, Shape::Distinct))?
            }
            Provider::Take { count, .. } => apply_limit(compiled, count.to_sql(&[])?, ordered)?,
            Provider::Skip { count, .. } => {
                apply_offset(wrap_if(ctx, compiled, Shape::Skip), count.to_sql(&[])?, ordered)?
            }
            Provider::Paging { skip, take, .. } => {
                let skipped =
                    apply_offset(wrap_if(ctx, compiled, Shape::Skip), skip.to_sql(&[])?, ordered)?;
                apply_limit(skipped, take.to_sql(&[])?, false)?
            }
            Provider::Lock { mode, behavior, .. } => {
                if let Some(mut select) = compiled.request.select_mut() {
                    select.lock = Some(SqlLock {
                        mode: *mode,
                        behavior: *behavior,
                    });
                }
                compiled
            }
            Provider::Index { .. } | Provider::Raw { .. } | Provider::Join { .. } => {
                return Ok(None)
            }
        };
        Ok(Some(result))
    }
}

fn select_of(request: &SqlRef) -> Result<RefMut<'_, SqlSelect>> {
    request
        .select_mut()
        .ok_or_else(|| SqlError::invalid_argument("provider", "compiled provider is not a select"))
}

fn column_exprs(select: &SqlSelect) -> Vec<SqlRef> {
    select.columns.iter().map(|c| c.expr.clone()).collect()
}

/// Output column producing `expr` under `name`.
fn output_column(expr: SqlRef, name: &str) -> SqlColumn {
    let alias = match &*expr.node() {
        SqlNode::Column(c) if c.name == name => None,
        _ => Some(name.to_string()),
    };
    SqlColumn { expr, alias }
}

/// `SELECT alias.c0, alias.c1, ... FROM from`.
pub(super) fn select_all(from: SqlRef, alias: &str, header: &Header) -> SqlSelect {
    SqlSelect {
        columns: header
            .columns()
            .iter()
            .map(|c| SqlColumn {
                expr: SqlRef::column(Some(alias), c.name.clone()),
                alias: None,
            })
            .collect(),
        from: Some(from),
        ..Default::default()
    }
}

fn compile_index(ctx: &mut CompilerContext<'_>, table: &Arc<TableDef>) -> SqlProvider {
    let alias = ctx.next_alias();
    let header = Header::from(&**table);
    let from = SqlRef::table(table.schema(), table.name(), Some(&alias));
    SqlProvider::new(SqlRef::select(select_all(from, &alias, &header)), header)
}

fn compile_raw(ctx: &mut CompilerContext<'_>, sql: &str, header: &Header) -> SqlProvider {
    let alias = ctx.next_alias();
    let from = SqlRef::query_ref(SqlRef::native(sql), alias.clone());
    SqlProvider::new(SqlRef::select(select_all(from, &alias, header)), header.clone())
}

/// Operations that cannot be merged into every select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Filter,
    Project,
    Calculate,
    Aggregate,
    Sort,
    Distinct,
    Skip,
    Join,
}

fn must_wrap(select: &SqlSelect, shape: Shape) -> bool {
    let paged = select.limit.is_some() || select.offset.is_some();
    let grouped = !select.group_by.is_empty() || select.having.is_some();
    match shape {
        Shape::Filter | Shape::Aggregate => paged || select.distinct || grouped,
        Shape::Project | Shape::Calculate => select.distinct,
        Shape::Sort | Shape::Distinct => paged,
        Shape::Skip => select.limit.is_some(),
        Shape::Join => paged || select.distinct || grouped || select.lock.is_some(),
    }
}

fn wrap_if(ctx: &mut CompilerContext<'_>, source: SqlProvider, shape: Shape) -> SqlProvider {
    let wrap_needed = source
        .request
        .as_select()
        .is_some_and(|s| must_wrap(&s, shape));
    if wrap_needed {
        wrap(ctx, source)
    } else {
        source
    }
}

/// `SELECT ... FROM (source) AS tN`. The source's ordering moves to the
/// outer select unless the source needs it to pick its rows.
pub(super) fn wrap(ctx: &mut CompilerContext<'_>, source: SqlProvider) -> SqlProvider {
    let alias = ctx.next_alias();
    let inner = source.request;
    let from = SqlRef::query_ref(inner.clone(), alias.clone());
    let mut outer = select_all(from, &alias, &source.header);
    if let Some(mut select) = inner.select_mut() {
        let paged = select.limit.is_some() || select.offset.is_some();
        let order = std::mem::take(&mut select.order_by);
        for item in &order {
            let position = select
                .columns
                .iter()
                .position(|c| c.expr.same_node(&item.expr));
            if let Some(i) = position {
                outer.order_by.push(SqlOrder {
                    expr: outer.columns[i].expr.clone(),
                    ascending: item.ascending,
                    nulls_first: item.nulls_first,
                });
            }
        }
        if paged {
            select.order_by = order;
        }
    }
    SqlProvider::new(SqlRef::select(outer), source.header)
}

fn compile_filter(source: SqlProvider, predicate: &Expr) -> Result<SqlProvider> {
    {
        let mut select = select_of(&source.request)?;
        let predicate = predicate.to_sql(&column_exprs(&select))?;
        select.filter = Some(match select.filter.take() {
            Some(existing) => SqlRef::and(existing, predicate),
            None => predicate,
        });
    }
    Ok(source)
}

fn compile_projection(source: SqlProvider, columns: &[usize]) -> Result<SqlProvider> {
    let header = {
        let mut select = select_of(&source.request)?;
        let mut projected = Vec::with_capacity(columns.len());
        let mut infos = Vec::with_capacity(columns.len());
        for &index in columns {
            let column = select.columns.get(index).ok_or(SqlError::ColumnOutOfRange {
                index,
                count: select.columns.len(),
            })?;
            projected.push(column.clone());
            infos.push(source.header.columns()[index].clone());
        }
        select.columns = projected;
        // ordering survives up to the first column that was projected away
        let order = source
            .header
            .order()
            .iter()
            .map_while(|item| {
                columns
                    .iter()
                    .position(|&c| c == item.column)
                    .map(|column| OrderItem { column, ..*item })
            })
            .collect();
        Header::new(infos).with_order(order)
    };
    Ok(SqlProvider::new(source.request, header))
}

fn compile_calculate(mut source: SqlProvider, columns: &[CalculatedColumn]) -> Result<SqlProvider> {
    {
        let mut select = select_of(&source.request)?;
        for column in columns {
            let expr = column.expr.to_sql(&column_exprs(&select))?;
            let name = source
                .header
                .push(ColumnInfo::new(column.name.clone(), column.ty));
            select.columns.push(output_column(expr, &name));
        }
    }
    Ok(source)
}

fn compile_join(
    ctx: &mut CompilerContext<'_>,
    left: SqlProvider,
    right: SqlProvider,
    kind: JoinType,
    pairs: &[(usize, usize)],
) -> Result<Option<SqlProvider>> {
    let left = wrap_if(ctx, left, Shape::Join);
    let right = wrap_if(ctx, right, Shape::Join);
    let (Some(l), Some(r)) = (left.request.as_select(), right.request.as_select()) else {
        return Ok(None);
    };
    let (Some(left_from), Some(right_from)) = (l.from.clone(), r.from.clone()) else {
        return Ok(None);
    };

    let left_exprs = column_exprs(&l);
    let right_exprs = column_exprs(&r);
    let mut condition: Option<SqlRef> = None;
    for &(li, ri) in pairs {
        let eq = SqlRef::eq(column_at(&left_exprs, li)?, column_at(&right_exprs, ri)?);
        condition = Some(and_opt(condition, eq));
    }

    let mut header = left.header.clone();
    let mut columns = l.columns.clone();
    for (column, info) in r.columns.iter().zip(right.header.columns()) {
        let name = header.push(info.clone());
        columns.push(output_column(column.expr.clone(), &name));
    }
    let offset = left.header.len();
    let order = left
        .header
        .order()
        .iter()
        .copied()
        .chain(right.header.order().iter().map(|item| OrderItem {
            column: item.column + offset,
            ..*item
        }))
        .collect();

    let (join_kind, on, filter) = match kind {
        JoinType::Inner => {
            let filter = match (l.filter.clone(), r.filter.clone()) {
                (Some(a), Some(b)) => Some(SqlRef::and(a, b)),
                (a, b) => a.or(b),
            };
            let join_kind = if condition.is_some() {
                SqlJoinKind::Inner
            } else {
                SqlJoinKind::Cross
            };
            (join_kind, condition, filter)
        }
        JoinType::LeftOuter => {
            // right-side filters restrict the matches, not the result
            let mut on = condition.unwrap_or_else(|| SqlRef::eq(SqlRef::integer(1), SqlRef::integer(1)));
            if let Some(filter) = r.filter.clone() {
                on = SqlRef::and(on, filter);
            }
            (SqlJoinKind::LeftOuter, Some(on), l.filter.clone())
        }
    };

    let select = SqlSelect {
        columns,
        from: Some(SqlRef::join(join_kind, left_from, right_from, on)),
        filter,
        ..Default::default()
    };
    Ok(Some(SqlProvider::new(
        SqlRef::select(select),
        header.with_order(order),
    )))
}

fn and_opt(existing: Option<SqlRef>, condition: SqlRef) -> SqlRef {
    match existing {
        Some(existing) => SqlRef::and(existing, condition),
        None => condition,
    }
}

fn compile_aggregate(
    source: SqlProvider,
    group_by: &[usize],
    aggregates: &[AggregateColumn],
) -> Result<SqlProvider> {
    let header = {
        let mut select = select_of(&source.request)?;
        let exprs = column_exprs(&select);
        let mut columns = Vec::new();
        let mut groups = Vec::new();
        let mut header = Header::default();
        for &index in group_by {
            let expr = column_at(&exprs, index)?;
            let name = header.push(source.header.columns()[index].clone());
            columns.push(output_column(expr.clone(), &name));
            groups.push(expr);
        }
        for aggregate in aggregates {
            let expr = aggregate_expr(aggregate, &source.header, &exprs)?;
            let name = header.push(ColumnInfo::new(aggregate.name.clone(), aggregate.ty));
            columns.push(output_column(expr, &name));
        }
        select.columns = columns;
        select.group_by = groups;
        select.order_by.clear();
        let order = (0..group_by.len()).map(OrderItem::asc).collect();
        header.with_order(order)
    };
    Ok(SqlProvider::new(source.request, header))
}

/// Aggregate call with the casts that keep client-visible precision:
/// AVG comes back in the source column's type (REAL is left alone, servers
/// already average it as floating point), SUM in the declared result type
/// unless that type is DECIMAL.
fn aggregate_expr(
    aggregate: &AggregateColumn,
    header: &Header,
    exprs: &[SqlRef],
) -> Result<SqlRef> {
    let operand = aggregate
        .column
        .map(|index| column_at(exprs, index))
        .transpose()?;
    let needs_operand = !matches!(aggregate.kind, SqlAggregateType::Count);
    if needs_operand && operand.is_none() {
        return Err(SqlError::invalid_argument(
            "column",
            format!("{:?} aggregate {} needs a source column", aggregate.kind, aggregate.name),
        ));
    }
    let call = SqlRef::aggregate(aggregate.kind, false, operand);
    let cast_to = match aggregate.kind {
        SqlAggregateType::Avg => aggregate
            .column
            .and_then(|i| header.column(i))
            .map(|c| c.ty)
            .filter(|ty| ty.is_numeric() && *ty != SqlType::Float32),
        SqlAggregateType::Sum => match aggregate.ty {
            SqlType::Decimal { .. } => None,
            ty => Some(ty),
        },
        _ => None,
    };
    Ok(match cast_to {
        Some(ty) => SqlRef::cast(call, ty),
        None => call,
    })
}

fn compile_sort(mut source: SqlProvider, order: &[OrderItem]) -> Result<SqlProvider> {
    {
        let mut select = select_of(&source.request)?;
        let exprs = column_exprs(&select);
        let mut orders = Vec::with_capacity(order.len());
        for item in order {
            orders.push(SqlOrder::new(column_at(&exprs, item.column)?, item.ascending));
        }
        select.order_by = orders;
    }
    source.header = source.header.clone().with_order(order.to_vec());
    Ok(source)
}

fn compile_distinct(source: SqlProvider) -> Result<SqlProvider> {
    {
        let mut select = select_of(&source.request)?;
        select.distinct = true;
        // DISTINCT can only be ordered by selected expressions
        let columns = column_exprs(&select);
        select
            .order_by
            .retain(|o| columns.iter().any(|c| c.same_node(&o.expr)));
    }
    Ok(source)
}

/// ORDER BY from the header ordering, for selects that page without one.
fn order_by_header(select: &mut SqlSelect, header: &Header) {
    if !select.order_by.is_empty() {
        return;
    }
    let exprs = column_exprs(select);
    select.order_by = header
        .order()
        .iter()
        .filter_map(|item| {
            exprs
                .get(item.column)
                .map(|e| SqlOrder::new(e.clone(), item.ascending))
        })
        .collect();
}

/// Set the row limit, never widening an existing one.
fn apply_limit(source: SqlProvider, count: SqlRef, add_order: bool) -> Result<SqlProvider> {
    {
        let mut select = select_of(&source.request)?;
        select.limit = Some(match select.limit.take() {
            Some(existing) => min_count(existing, count),
            None => count,
        });
        if add_order {
            order_by_header(&mut select, &source.header);
        }
    }
    Ok(source)
}

fn apply_offset(source: SqlProvider, count: SqlRef, add_order: bool) -> Result<SqlProvider> {
    {
        let mut select = select_of(&source.request)?;
        select.offset = Some(match select.offset.take() {
            Some(existing) => add_counts(existing, count),
            None => count,
        });
        if add_order {
            order_by_header(&mut select, &source.header);
        }
    }
    Ok(source)
}

pub(super) fn integer_value(node: &SqlRef) -> Option<i64> {
    match &*node.node() {
        SqlNode::Literal(SqlLiteral::Integer(value)) => Some(*value),
        _ => None,
    }
}

/// Smaller of two row counts, folded when both are literals.
pub(super) fn min_count(a: SqlRef, b: SqlRef) -> SqlRef {
    match (integer_value(&a), integer_value(&b)) {
        (Some(x), Some(y)) => SqlRef::integer(x.min(y)),
        _ => SqlRef::case(
            vec![(SqlRef::binary(SqlBinaryOperator::Lt, a.clone(), b.clone()), a)],
            Some(b),
        ),
    }
}

pub(super) fn add_counts(a: SqlRef, b: SqlRef) -> SqlRef {
    match (integer_value(&a), integer_value(&b)) {
        (Some(x), Some(y)) => SqlRef::integer(x.saturating_add(y)),
        _ => SqlRef::binary(SqlBinaryOperator::Plus, a, b),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;

    use super::*;
    use crate::ast::{QueryParameter, SqlLockBehavior, SqlLockMode, VariantKey};
    use crate::driver::{Dialect, ServerVersion};
    use crate::postcompile::{SqlCompilationResult, SqlPostCompilerConfiguration};
    use crate::query::{AggregateColumn, CalculatedColumn};
    use crate::schema::TableBuilder;

    fn people() -> Arc<TableDef> {
        Arc::new(
            TableBuilder::new("people")
                .schema("public")
                .column("id", SqlType::Int32)
                .column("name", SqlType::VarChar { length: Some(50) })
                .column("age", SqlType::Int16)
                .key("id")
                .build()
                .unwrap(),
        )
    }

    fn measures() -> Arc<TableDef> {
        Arc::new(
            TableBuilder::new("measures")
                .column("id", SqlType::Int32)
                .column("score", SqlType::Float32)
                .column(
                    "amount",
                    SqlType::Decimal {
                        precision: 18,
                        scale: 2,
                    },
                )
                .key("id")
                .build()
                .unwrap(),
        )
    }

    fn compile_for(
        provider: &Provider,
        dialect: Dialect,
        version: ServerVersion,
    ) -> Result<SqlCompilationResult> {
        let info = ServerInfo::build(dialect, version)?;
        let mut ctx = CompilerContext::new(&info);
        let compiled = CompilerChain::standard().compile(&mut ctx, provider)?;
        crate::ast::compile(
            &compiled.request,
            &dialect.translator(version),
            &dialect.type_mapper(version),
        )
    }

    fn pg(provider: &Provider) -> String {
        compile_for(provider, Dialect::PostgreSql, ServerVersion::new(8, 4))
            .unwrap()
            .command_text()
            .unwrap()
    }

    fn assert_parses(sql: &str) {
        if let Err(e) = Parser::parse_sql(&PostgreSqlDialect {}, sql) {
            panic!("generated SQL does not parse: {e}\n{sql}");
        }
    }

    const PEOPLE: &str = r#"SELECT "t0"."id", "t0"."name", "t0"."age" FROM "public"."people" AS "t0""#;

    #[test]
    fn test_compile_index_scan() {
        let sql = pg(&Provider::index(people()));
        assert_eq!(sql, PEOPLE);
        assert_parses(&sql);
    }

    #[test]
    fn test_take_only_tightens() {
        let provider = Provider::index(people()).take(Expr::int(3)).take(Expr::int(5));
        let sql = pg(&provider);
        assert_eq!(sql, format!(r#"{PEOPLE} ORDER BY "t0"."id" LIMIT 3"#));
        assert_parses(&sql);
    }

    #[test]
    fn test_take_parameter_over_take() {
        let p = QueryParameter::new("count");
        let provider = Provider::index(people())
            .take(Expr::int(3))
            .take(Expr::parameter(&p));
        assert_eq!(
            pg(&provider),
            format!(r#"{PEOPLE} ORDER BY "t0"."id" LIMIT CASE WHEN 3 < @p0 THEN 3 ELSE @p0 END"#)
        );
    }

    #[test]
    fn test_filter_after_take_wraps() {
        let provider = Provider::index(people())
            .take(Expr::int(10))
            .filter(Expr::binary(SqlBinaryOperator::Gt, Expr::column(2), Expr::int(18)));
        let sql = pg(&provider);
        assert_eq!(
            sql,
            format!(
                r#"SELECT "t1"."id", "t1"."name", "t1"."age" FROM ({PEOPLE} ORDER BY "t0"."id" LIMIT 10) AS "t1" WHERE "t1"."age" > 18 ORDER BY "t1"."id""#
            )
        );
        assert_parses(&sql);
    }

    #[test]
    fn test_filter_reuses_column_expression() {
        let provider = Provider::index(people())
            .calculate(vec![CalculatedColumn {
                name: "next_age".into(),
                expr: Expr::binary(SqlBinaryOperator::Plus, Expr::column(2), Expr::int(1)),
                ty: SqlType::Int32,
            }])
            .filter(Expr::binary(SqlBinaryOperator::Gt, Expr::column(3), Expr::int(30)));
        let info = ServerInfo::build(Dialect::PostgreSql, ServerVersion::new(8, 4)).unwrap();
        let mut ctx = CompilerContext::new(&info);
        let compiled = CompilerChain::standard().compile(&mut ctx, &provider).unwrap();
        let select = compiled.request.as_select().unwrap();
        let filter = select.filter.clone().unwrap();
        let content = filter.node();
        let SqlNode::Binary(comparison) = &*content else {
            panic!("expected comparison");
        };
        assert!(comparison.left.same_node(&select.columns[3].expr));
    }

    #[test]
    fn test_calculate_and_sort() {
        let provider = Provider::index(people())
            .calculate(vec![CalculatedColumn {
                name: "next_age".into(),
                expr: Expr::binary(SqlBinaryOperator::Plus, Expr::column(2), Expr::int(1)),
                ty: SqlType::Int32,
            }])
            .sort(vec![OrderItem::desc(3)]);
        let sql = pg(&provider);
        assert_eq!(
            sql,
            r#"SELECT "t0"."id", "t0"."name", "t0"."age", "t0"."age" + 1 AS "next_age" FROM "public"."people" AS "t0" ORDER BY "t0"."age" + 1 DESC"#
        );
        assert_parses(&sql);
    }

    #[test]
    fn test_avg_cast_follows_source_type() {
        let avg_age = AggregateColumn {
            name: "avg_age".into(),
            kind: SqlAggregateType::Avg,
            column: Some(2),
            ty: SqlType::Float64,
        };
        assert_eq!(
            pg(&Provider::index(people()).aggregate(vec![], vec![avg_age])),
            r#"SELECT CAST(AVG("t0"."age") AS smallint) AS "avg_age" FROM "public"."people" AS "t0""#
        );
        let avg_score = AggregateColumn {
            name: "avg_score".into(),
            kind: SqlAggregateType::Avg,
            column: Some(1),
            ty: SqlType::Float64,
        };
        assert_eq!(
            pg(&Provider::index(measures()).aggregate(vec![], vec![avg_score])),
            r#"SELECT AVG("t0"."score") AS "avg_score" FROM "measures" AS "t0""#
        );
    }

    #[test]
    fn test_sum_cast_skipped_for_decimal() {
        let sums = vec![
            AggregateColumn {
                name: "total".into(),
                kind: SqlAggregateType::Sum,
                column: Some(2),
                ty: SqlType::Decimal {
                    precision: 38,
                    scale: 2,
                },
            },
            AggregateColumn {
                name: "ids".into(),
                kind: SqlAggregateType::Sum,
                column: Some(0),
                ty: SqlType::Int64,
            },
        ];
        assert_eq!(
            pg(&Provider::index(measures()).aggregate(vec![], sums)),
            r#"SELECT SUM("t0"."amount") AS "total", CAST(SUM("t0"."id") AS bigint) AS "ids" FROM "measures" AS "t0""#
        );
    }

    #[test]
    fn test_group_by_count() {
        let count = AggregateColumn {
            name: "n".into(),
            kind: SqlAggregateType::Count,
            column: None,
            ty: SqlType::Int64,
        };
        let provider = Provider::index(people()).aggregate(vec![2], vec![count]);
        let sql = compile_for(&provider, Dialect::SqlServer, ServerVersion::new(9, 0))
            .unwrap()
            .command_text()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT [t0].[age], COUNT_BIG(*) AS [n] FROM [public].[people] AS [t0] GROUP BY [t0].[age]"
        );
    }

    #[test]
    fn test_aggregate_needs_column() {
        let avg = AggregateColumn {
            name: "avg".into(),
            kind: SqlAggregateType::Avg,
            column: None,
            ty: SqlType::Float64,
        };
        let result = compile_for(
            &Provider::index(people()).aggregate(vec![], vec![avg]),
            Dialect::PostgreSql,
            ServerVersion::new(8, 4),
        );
        assert!(matches!(result, Err(SqlError::InvalidArgument { .. })));
    }

    #[test]
    fn test_parameter_equality_renders_null_branch() {
        let p = QueryParameter::new("name");
        let provider =
            Provider::index(people()).filter(Expr::eq(Expr::column(1), Expr::parameter(&p)));
        let result =
            compile_for(&provider, Dialect::PostgreSql, ServerVersion::new(8, 4)).unwrap();
        assert_eq!(
            result.command_text().unwrap(),
            format!(r#"{PEOPLE} WHERE "t0"."name" = @p0"#)
        );
        let config = SqlPostCompilerConfiguration::new()
            .select_alternative(VariantKey::NullParameter(p.clone()));
        assert_eq!(
            result.command_text_with(&config).unwrap(),
            format!(r#"{PEOPLE} WHERE "t0"."name" IS NULL"#)
        );
        assert_eq!(result.parameter_name(&p).unwrap(), "@p0");
    }

    #[test]
    fn test_sqlserver_top_and_row_number_skip() {
        let take = Provider::index(people()).take(Expr::int(5));
        let sql = compile_for(&take, Dialect::SqlServer, ServerVersion::new(9, 0))
            .unwrap()
            .command_text()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT TOP (5) [t0].[id], [t0].[name], [t0].[age] FROM [public].[people] AS [t0] ORDER BY [t0].[id]"
        );

        let skip = Provider::index(people()).skip(Expr::int(10));
        let sql = compile_for(&skip, Dialect::SqlServer, ServerVersion::new(9, 0))
            .unwrap()
            .command_text()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT [t1].[id], [t1].[name], [t1].[age] FROM (SELECT [t0].[id], [t0].[name], [t0].[age], \
             ROW_NUMBER() OVER (ORDER BY [t0].[id]) AS [rn] FROM [public].[people] AS [t0]) AS [t1] \
             WHERE [t1].[rn] > 10 ORDER BY [t1].[rn]"
        );
    }

    #[test]
    fn test_oracle_paging_per_version() {
        let provider = Provider::index(people()).paging(Expr::int(10), Expr::int(5));
        let emulated = compile_for(&provider, Dialect::Oracle, ServerVersion::new(11, 2))
            .unwrap()
            .command_text()
            .unwrap();
        assert!(emulated.ends_with(r#"WHERE "t1"."rn" > 10 AND "t1"."rn" <= 15 ORDER BY "t1"."rn""#));
        assert!(emulated.contains(r#") "t1""#));

        let native = compile_for(&provider, Dialect::Oracle, ServerVersion::new(12, 1))
            .unwrap()
            .command_text()
            .unwrap();
        assert_eq!(
            native,
            r#"SELECT "t0"."id", "t0"."name", "t0"."age" FROM "public"."people" "t0" ORDER BY "t0"."id" OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"#
        );
    }

    #[test]
    fn test_no_fallback_is_not_compilable() {
        let info = ServerInfo::build(Dialect::Oracle, ServerVersion::new(11, 0)).unwrap();
        let chain = CompilerChain::new(vec![Box::new(SqlCompiler)]);
        let provider = Provider::index(people())
            .take(Expr::int(5))
            .filter(Expr::eq(Expr::column(0), Expr::int(1)));
        let mut ctx = CompilerContext::new(&info);
        assert!(matches!(
            chain.compile(&mut ctx, &provider),
            Err(SqlError::NotCompilable("Filter"))
        ));
        let mut ctx = CompilerContext::new(&info);
        assert!(chain.try_compile(&mut ctx, &provider).unwrap().is_none());
    }

    #[test]
    fn test_inner_join() {
        let orders = Arc::new(
            TableBuilder::new("orders")
                .schema("public")
                .column("id", SqlType::Int32)
                .column("person_id", SqlType::Int32)
                .key("id")
                .build()
                .unwrap(),
        );
        let provider = Provider::index(people()).join(
            Provider::index(orders),
            JoinType::Inner,
            vec![(0, 1)],
        );
        let sql = pg(&provider);
        assert_eq!(
            sql,
            r#"SELECT "t0"."id", "t0"."name", "t0"."age", "t1"."id" AS "id1", "t1"."person_id" FROM "public"."people" AS "t0" INNER JOIN "public"."orders" AS "t1" ON "t0"."id" = "t1"."person_id""#
        );
        assert_parses(&sql);
    }

    #[test]
    fn test_left_join_keeps_right_filter_in_on() {
        let right = Provider::index(people()).filter(Expr::binary(
            SqlBinaryOperator::Gt,
            Expr::column(2),
            Expr::int(18),
        ));
        let provider = Provider::index(people()).join(right, JoinType::LeftOuter, vec![(0, 0)]);
        let sql = pg(&provider);
        assert!(sql.contains(
            r#"LEFT OUTER JOIN "public"."people" AS "t1" ON "t0"."id" = "t1"."id" AND "t1"."age" > 18"#
        ));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_distinct_after_take_wraps() {
        let provider = Provider::index(people())
            .select(vec![2])
            .take(Expr::int(5))
            .distinct();
        let sql = pg(&provider);
        assert!(sql.starts_with(r#"SELECT DISTINCT "t1"."age" FROM (SELECT "t0"."age" FROM"#));
        assert_parses(&sql);
    }

    #[test]
    fn test_lock_suffix() {
        let provider = Provider::index(people()).lock(SqlLockMode::Update, SqlLockBehavior::Wait);
        assert_eq!(pg(&provider), format!("{PEOPLE} FOR UPDATE"));
    }

    fn locked_after_wrap() -> Provider {
        Provider::index(people())
            .take(Expr::int(10))
            .filter(Expr::binary(SqlBinaryOperator::Gt, Expr::column(2), Expr::int(18)))
            .lock(SqlLockMode::Update, SqlLockBehavior::Wait)
    }

    #[test]
    fn test_lock_over_wrapped_select() {
        let sql = pg(&locked_after_wrap());
        assert_eq!(
            sql,
            format!(
                r#"SELECT "t1"."id", "t1"."name", "t1"."age" FROM ({PEOPLE} ORDER BY "t0"."id" LIMIT 10) AS "t1" WHERE "t1"."age" > 18 ORDER BY "t1"."id" FOR UPDATE"#
            )
        );
        assert_parses(&sql);
    }

    #[test]
    fn test_table_hint_over_wrapped_select() {
        let sql = compile_for(&locked_after_wrap(), Dialect::SqlServer, ServerVersion::new(10, 0))
            .unwrap()
            .command_text()
            .unwrap();
        assert_eq!(sql.matches("UPDLOCK").count(), 1);
        assert!(sql.contains("FROM [public].[people] AS [t0] WITH (UPDLOCK, ROWLOCK) ORDER BY"));
        assert!(sql.ends_with("WHERE [t1].[age] > 18 ORDER BY [t1].[id]"));
    }

    #[test]
    fn test_row_lock_over_distinct_unsupported() {
        let provider = Provider::index(people())
            .select(vec![2])
            .distinct()
            .lock(SqlLockMode::Update, SqlLockBehavior::Wait);
        let result = compile_for(&provider, Dialect::PostgreSql, ServerVersion::new(8, 4));
        assert!(matches!(result, Err(SqlError::Unsupported { .. })));

        // ROW_NUMBER paging cannot carry FOR UPDATE either
        let paged = Provider::index(people())
            .paging(Expr::int(10), Expr::int(5))
            .lock(SqlLockMode::Update, SqlLockBehavior::Wait);
        let result = compile_for(&paged, Dialect::Oracle, ServerVersion::new(11, 2));
        assert!(matches!(result, Err(SqlError::Unsupported { .. })));
    }

    #[test]
    fn test_projection_out_of_range() {
        let result = compile_for(
            &Provider::index(people()).select(vec![7]),
            Dialect::PostgreSql,
            ServerVersion::new(8, 4),
        );
        assert!(matches!(result, Err(SqlError::ColumnOutOfRange { index: 7, .. })));
    }
}
