use super::compiler::{add_counts, select_all};
use super::{ColumnInfo, CompilerChain, CompilerContext, Provider, ProviderCompiler, SqlProvider};
use crate::ast::{SqlBinaryOperator, SqlColumn, SqlOrder, SqlRef, SqlType};
use crate::error::Result;

/// Pages with `ROW_NUMBER()` on servers without native LIMIT/OFFSET:
///
/// ```text
/// SELECT tN.* FROM (SELECT ..., ROW_NUMBER() OVER (ORDER BY ...) AS rn FROM ...) tN
/// WHERE tN.rn > skip AND tN.rn <= skip + take
/// ORDER BY tN.rn
/// ```
pub struct PagingEmulationCompiler;

impl ProviderCompiler for PagingEmulationCompiler {
    fn name(&self) -> &str {
        "row_number_paging"
    }

    fn compile(
        &self,
        chain: &CompilerChain,
        ctx: &mut CompilerContext<'_>,
        provider: &Provider,
    ) -> Result<Option<SqlProvider>> {
        let (source, skip, take) = match provider {
            Provider::Take { source, count } => (source, None, Some(count)),
            Provider::Skip { source, count } => (source, Some(count), None),
            Provider::Paging { source, skip, take } => (source, Some(skip), Some(take)),
            _ => return Ok(None),
        };
        if !ctx.server().features.row_number {
            return Ok(None);
        }
        let Some(compiled) = chain.try_compile(ctx, source)? else {
            return Ok(None);
        };
        let Some(mut inner) = compiled.request.as_select().map(|s| s.clone()) else {
            return Ok(None);
        };

        let exprs: Vec<SqlRef> = inner.columns.iter().map(|c| c.expr.clone()).collect();
        let numbering = row_order(&inner.order_by, &exprs, &compiled);
        if inner.limit.is_none() && inner.offset.is_none() {
            inner.order_by.clear();
        }
        let mut numbered = compiled.header.clone();
        let rn = numbered.push(ColumnInfo::new("rn", SqlType::Int64));
        inner.columns.push(SqlColumn {
            expr: SqlRef::row_number(numbering),
            alias: Some(rn.clone()),
        });

        let alias = ctx.next_alias();
        let from = SqlRef::query_ref(SqlRef::select(inner), alias.clone());
        let mut outer = select_all(from, &alias, &compiled.header);
        let row = SqlRef::column(Some(&alias), rn);

        let skip = skip.map(|e| e.to_sql(&[])).transpose()?;
        let take = take.map(|e| e.to_sql(&[])).transpose()?;
        let lower = skip
            .clone()
            .map(|s| SqlRef::binary(SqlBinaryOperator::Gt, row.clone(), s));
        let upper = take.map(|t| {
            let last = match skip {
                Some(s) => add_counts(s, t),
                None => t,
            };
            SqlRef::binary(SqlBinaryOperator::LtEq, row.clone(), last)
        });
        outer.filter = match (lower, upper) {
            (Some(l), Some(u)) => Some(SqlRef::and(l, u)),
            (l, u) => l.or(u),
        };
        outer.order_by = vec![SqlOrder::new(row, true)];
        Ok(Some(SqlProvider::new(SqlRef::select(outer), compiled.header)))
    }
}

/// Row numbering order: the source's ORDER BY, else its header ordering,
/// else the first column.
fn row_order(order_by: &[SqlOrder], exprs: &[SqlRef], source: &SqlProvider) -> Vec<SqlOrder> {
    if !order_by.is_empty() {
        return order_by.to_vec();
    }
    let from_header: Vec<SqlOrder> = source
        .header
        .order()
        .iter()
        .filter_map(|item| {
            exprs
                .get(item.column)
                .map(|e| SqlOrder::new(e.clone(), item.ascending))
        })
        .collect();
    if !from_header.is_empty() {
        return from_header;
    }
    exprs
        .first()
        .map(|e| vec![SqlOrder::new(e.clone(), true)])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ast::QueryParameter;
    use crate::driver::{Dialect, ServerInfo, ServerVersion};
    use crate::query::{Expr, OrderItem};
    use crate::schema::TableBuilder;

    fn items() -> Provider {
        Provider::index(Arc::new(
            TableBuilder::new("items")
                .column("code", SqlType::VarChar { length: Some(10) })
                .column("rank", SqlType::Int32)
                .build()
                .unwrap(),
        ))
    }

    fn oracle(provider: &Provider) -> String {
        let version = ServerVersion::new(10, 2);
        let info = ServerInfo::build(Dialect::Oracle, version).unwrap();
        let mut ctx = CompilerContext::new(&info);
        let compiled = CompilerChain::standard().compile(&mut ctx, provider).unwrap();
        crate::ast::compile(
            &compiled.request,
            &Dialect::Oracle.translator(version),
            &Dialect::Oracle.type_mapper(version),
        )
        .unwrap()
        .command_text()
        .unwrap()
    }

    #[test]
    fn test_take_numbers_by_first_column_without_key() {
        assert_eq!(
            oracle(&items().take(Expr::int(3))),
            r#"SELECT "t1"."code", "t1"."rank" FROM (SELECT "t0"."code", "t0"."rank", ROW_NUMBER() OVER (ORDER BY "t0"."code") AS "rn" FROM "items" "t0") "t1" WHERE "t1"."rn" <= 3 ORDER BY "t1"."rn""#
        );
    }

    #[test]
    fn test_sort_moves_into_row_number() {
        let sql = oracle(&items().sort(vec![OrderItem::desc(1)]).skip(Expr::int(20)));
        assert!(sql.contains(r#"ROW_NUMBER() OVER (ORDER BY "t0"."rank" DESC) AS "rn" FROM "items" "t0")"#));
        assert!(sql.ends_with(r#"WHERE "t1"."rn" > 20 ORDER BY "t1"."rn""#));
    }

    #[test]
    fn test_parameter_bounds_are_added() {
        let skip = QueryParameter::new("skip");
        let take = QueryParameter::new("take");
        let sql = oracle(&items().paging(Expr::parameter(&skip), Expr::parameter(&take)));
        assert!(sql.ends_with(r#"WHERE "t1"."rn" > :p0 AND "t1"."rn" <= :p0 + :p1 ORDER BY "t1"."rn""#));
    }

    #[test]
    fn test_declines_without_row_number() {
        let info = ServerInfo::build(Dialect::PostgreSql, ServerVersion::new(8, 3)).unwrap();
        let chain = CompilerChain::new(vec![Box::new(PagingEmulationCompiler)]);
        let mut ctx = CompilerContext::new(&info);
        let result = PagingEmulationCompiler
            .compile(&chain, &mut ctx, &items().take(Expr::int(1)))
            .unwrap();
        assert!(result.is_none());
    }
}
