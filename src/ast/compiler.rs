//! SQL DOM → command text compiler.
//!
//! Walks a statement tree with a dialect translator and emits the
//! post-compile chain of a [`SqlCompilationResult`]. Everything that can be
//! decided now becomes text; placeholders, alternative branches and dynamic
//! filters stay symbolic until the result is rendered.
//!
//! Parameters are named on first use, per parameter object: the same
//! [`QueryParameter`] referenced twice gets one name, two distinct parameters
//! never share one.
use std::collections::HashMap;

use super::node::SqlRef;
use super::types::*;
use super::visitor::SqlVisitor;
use crate::error::Result;
use crate::postcompile::{push_text, PostCompileNode, SqlCompilationResult};
use crate::translator::{
    FromlessSelect, LockClause, PagingStyle, SqlTemplate, TemplatePart, Translator, TypeMapper,
};

/// Compile a statement into a reusable compilation result.
pub fn compile(
    statement: &SqlRef,
    translator: &Translator,
    types: &TypeMapper,
) -> Result<SqlCompilationResult> {
    let mut compiler = ChainCompiler {
        translator,
        types,
        prefix: translator.parameter_prefix()?,
        chain: Vec::new(),
        names: HashMap::new(),
        parameters: Vec::new(),
        table_hint: None,
    };
    statement.accept(&mut compiler)?;
    Ok(SqlCompilationResult::new(compiler.chain, compiler.parameters))
}

struct ChainCompiler<'a> {
    translator: &'a Translator,
    types: &'a TypeMapper,
    prefix: &'static str,
    chain: Vec<PostCompileNode>,
    names: HashMap<ParameterKey, String>,
    parameters: Vec<(QueryParameter, String)>,
    /// Lock hint attached to table references of the select being compiled.
    table_hint: Option<String>,
}

/// Binding strength of a binary operator; higher binds tighter.
fn precedence(op: SqlBinaryOperator) -> u8 {
    use SqlBinaryOperator::*;
    match op {
        Or => 1,
        And => 2,
        Eq | NotEq | Lt | LtEq | Gt | GtEq | Like | In | NotIn => 3,
        Plus | Minus | Concat => 4,
        Multiply | Divide | Modulo => 5,
    }
}

fn binary_op(node: &SqlRef) -> Option<SqlBinaryOperator> {
    match &*node.node() {
        SqlNode::Binary(b) => Some(b.op),
        _ => None,
    }
}

impl ChainCompiler<'_> {
    fn text(&mut self, text: &str) {
        push_text(&mut self.chain, text);
    }

    fn node(&mut self, node: &SqlRef) -> Result<()> {
        node.accept(self)
    }

    /// Compile `node`, parenthesized when it is a binary expression.
    fn grouped(&mut self, node: &SqlRef) -> Result<()> {
        if binary_op(node).is_some() {
            self.text("(");
            self.node(node)?;
            self.text(")");
            Ok(())
        } else {
            self.node(node)
        }
    }

    fn operand(&mut self, parent: SqlBinaryOperator, child: &SqlRef, right: bool) -> Result<()> {
        let wrap = binary_op(child).is_some_and(|op| {
            let (p, c) = (precedence(parent), precedence(op));
            let associative = matches!(parent, SqlBinaryOperator::And | SqlBinaryOperator::Or);
            c < p || (c == p && !associative && (right || p == 3))
        });
        if wrap {
            self.grouped(child)
        } else {
            self.node(child)
        }
    }

    fn sub_chain(&mut self, node: &SqlRef) -> Result<Vec<PostCompileNode>> {
        let outer = std::mem::take(&mut self.chain);
        let result = self.node(node);
        let inner = std::mem::replace(&mut self.chain, outer);
        result.map(|_| inner)
    }

    fn template(&mut self, template: SqlTemplate, args: &[SqlRef]) -> Result<()> {
        let group_args = !matches!(template, SqlTemplate::Call(_));
        for part in template.parts(args.len()) {
            match part {
                TemplatePart::Text(text) => self.text(&text),
                TemplatePart::Arg(i) if group_args => self.grouped(&args[i])?,
                TemplatePart::Arg(i) => self.node(&args[i])?,
            }
        }
        Ok(())
    }

    fn list<'n>(&mut self, nodes: impl IntoIterator<Item = &'n SqlRef>) -> Result<()> {
        for (i, node) in nodes.into_iter().enumerate() {
            if i > 0 {
                self.text(", ");
            }
            self.node(node)?;
        }
        Ok(())
    }

    fn identifier(&mut self, name: &str) -> Result<()> {
        let quoted = self.translator.quote_identifier(name)?;
        self.text(&quoted);
        Ok(())
    }

    fn qualified(&mut self, schema: Option<&str>, name: &str) -> Result<()> {
        if let Some(schema) = schema {
            self.identifier(schema)?;
            self.text(".");
        }
        self.identifier(name)
    }

    fn alias(&mut self, alias: &str) -> Result<()> {
        let keyword = self.translator.table_alias()?;
        self.text(keyword);
        self.identifier(alias)
    }

    fn orders(&mut self, orders: &[SqlOrder]) -> Result<()> {
        for (i, order) in orders.iter().enumerate() {
            if i > 0 {
                self.text(", ");
            }
            self.node(&order.expr)?;
            if !order.ascending {
                self.text(" DESC");
            }
            if let Some(first) = order.nulls_first {
                if !self.translator.nulls_ordering()? {
                    return Err(self.translator.unsupported("NULLS FIRST/LAST ordering"));
                }
                self.text(if first { " NULLS FIRST" } else { " NULLS LAST" });
            }
        }
        Ok(())
    }

    fn select(&mut self, select: &SqlSelect, inherited: Option<String>) -> Result<()> {
        let paging = match (&select.limit, &select.offset) {
            (None, None) => None,
            _ => Some(self.translator.paging()?),
        };
        match paging {
            Some(PagingStyle::Unsupported) => {
                return Err(self.translator.unsupported("LIMIT/OFFSET clause"))
            }
            Some(PagingStyle::Top) if select.offset.is_some() => {
                return Err(self.translator.unsupported("OFFSET clause"))
            }
            _ => {}
        }
        let lock = select.lock.map(|l| self.translator.lock(l)).transpose()?;
        if matches!(lock, Some(LockClause::Suffix(_))) && !lockable(select) {
            return Err(self
                .translator
                .unsupported("row lock over DISTINCT, GROUP BY, aggregate or window results"));
        }

        self.text("SELECT ");
        if select.distinct {
            self.text("DISTINCT ");
        }
        if let (Some(PagingStyle::Top), Some(limit)) = (paging, &select.limit) {
            self.text("TOP (");
            self.node(limit)?;
            self.text(") ");
        }
        if select.columns.is_empty() {
            self.text("*");
        }
        for (i, column) in select.columns.iter().enumerate() {
            if i > 0 {
                self.text(", ");
            }
            self.node(&column.expr)?;
            if let Some(alias) = &column.alias {
                self.text(" AS ");
                self.identifier(alias)?;
            }
        }

        // FROM
        self.table_hint = match &lock {
            Some(LockClause::TableHint(hint)) => Some(hint.clone()),
            _ => inherited,
        };
        let from = match &select.from {
            Some(from) => {
                self.text(" FROM ");
                self.node(from)
            }
            None => match self.translator.fromless_select() {
                Ok(FromlessSelect::Table(table)) => {
                    self.text(" FROM ");
                    self.text(table);
                    Ok(())
                }
                Ok(FromlessSelect::Omit) => Ok(()),
                Err(e) => Err(e),
            },
        };
        self.table_hint = None;
        from?;

        self.filter(&select.filter)?;

        if !select.group_by.is_empty() {
            self.text(" GROUP BY ");
            self.list(&select.group_by)?;
        }
        if let Some(having) = &select.having {
            self.text(" HAVING ");
            self.node(having)?;
        }

        if !select.order_by.is_empty() {
            self.text(" ORDER BY ");
            self.orders(&select.order_by)?;
        } else if paging == Some(PagingStyle::OffsetFetch) {
            let fallback = self.translator.offset_order_fallback()?;
            self.text(fallback);
        }

        match paging {
            Some(PagingStyle::LimitOffset) => {
                if let Some(limit) = &select.limit {
                    self.text(" LIMIT ");
                    self.node(limit)?;
                }
                if let Some(offset) = &select.offset {
                    self.text(" OFFSET ");
                    self.node(offset)?;
                }
            }
            Some(PagingStyle::OffsetFetch) => {
                self.text(" OFFSET ");
                match &select.offset {
                    Some(offset) => self.node(offset)?,
                    None => self.text("0"),
                }
                self.text(" ROWS");
                if let Some(limit) = &select.limit {
                    self.text(" FETCH NEXT ");
                    self.node(limit)?;
                    self.text(" ROWS ONLY");
                }
            }
            _ => {}
        }

        if let Some(LockClause::Suffix(suffix)) = &lock {
            self.text(suffix);
        }
        Ok(())
    }

    fn filter(&mut self, filter: &Option<SqlRef>) -> Result<()> {
        if let Some(filter) = filter {
            self.text(" WHERE ");
            self.node(filter)?;
        }
        Ok(())
    }
}

/// Whether a row lock can reach the rows of `select`, including the rows of
/// its derived tables.
fn lockable(select: &SqlSelect) -> bool {
    !select.distinct
        && select.group_by.is_empty()
        && select.having.is_none()
        && !select.columns.iter().any(|c| computes_rows(&c.expr))
        && select.from.as_ref().map_or(true, lockable_source)
}

fn lockable_source(source: &SqlRef) -> bool {
    match &*source.node() {
        SqlNode::QueryRef(q) => q.query.as_select().map_or(true, |s| lockable(&s)),
        SqlNode::Join(j) => lockable_source(&j.left) && lockable_source(&j.right),
        _ => true,
    }
}

/// Aggregates and window functions, not looking into subqueries.
fn computes_rows(expr: &SqlRef) -> bool {
    match &*expr.node() {
        SqlNode::Aggregate(_) | SqlNode::RowNumber(_) => true,
        SqlNode::SubQuery(_) | SqlNode::Select(_) => false,
        _ => expr.children().iter().any(computes_rows),
    }
}

impl SqlVisitor for ChainCompiler<'_> {
    type Output = Result<()>;

    fn visit_null(&mut self) -> Result<()> {
        self.text("NULL");
        Ok(())
    }

    fn visit_literal(&mut self, literal: &SqlLiteral) -> Result<()> {
        let text = self.translator.literal(literal)?;
        self.text(&text);
        Ok(())
    }

    fn visit_column(&mut self, column: &SqlColumnRef) -> Result<()> {
        self.qualified(column.table.as_deref(), &column.name)
    }

    fn visit_variable(&mut self, variable: &SqlVariable) -> Result<()> {
        let text = format!("{}{}", self.prefix, variable.name);
        self.text(&text);
        Ok(())
    }

    fn visit_parameter(&mut self, parameter: &QueryParameter) -> Result<()> {
        let name = match self.names.get(&parameter.key()) {
            Some(name) => name.clone(),
            None => {
                let name = format!("{}p{}", self.prefix, self.parameters.len());
                self.names.insert(parameter.key(), name.clone());
                self.parameters.push((parameter.clone(), name.clone()));
                name
            }
        };
        self.text(&name);
        Ok(())
    }

    fn visit_placeholder(&mut self, id: &PlaceholderId) -> Result<()> {
        self.chain.push(PostCompileNode::Placeholder(id.clone()));
        Ok(())
    }

    fn visit_binary(&mut self, binary: &SqlBinary) -> Result<()> {
        let template = self.translator.operator_template(binary.op)?;
        for part in template.parts(2) {
            match part {
                TemplatePart::Text(text) => self.text(&text),
                TemplatePart::Arg(0) => self.operand(binary.op, &binary.left, false)?,
                TemplatePart::Arg(_) => self.operand(binary.op, &binary.right, true)?,
            }
        }
        Ok(())
    }

    fn visit_unary(&mut self, unary: &SqlUnary) -> Result<()> {
        match unary.op {
            SqlUnaryOperator::Not => {
                self.text("NOT (");
                self.node(&unary.operand)?;
                self.text(")");
            }
            SqlUnaryOperator::Negate => {
                // Parenthesized so a negative operand never renders as `--`.
                self.text("-(");
                self.node(&unary.operand)?;
                self.text(")");
            }
            SqlUnaryOperator::IsNull => {
                self.grouped(&unary.operand)?;
                self.text(" IS NULL");
            }
            SqlUnaryOperator::IsNotNull => {
                self.grouped(&unary.operand)?;
                self.text(" IS NOT NULL");
            }
            SqlUnaryOperator::Exists => {
                self.text("EXISTS ");
                self.node(&unary.operand)?;
            }
        }
        Ok(())
    }

    fn visit_function(&mut self, call: &SqlFunctionCall) -> Result<()> {
        let template = self.translator.function_template(call.function)?;
        self.template(template, &call.args)
    }

    fn visit_aggregate(&mut self, aggregate: &SqlAggregate) -> Result<()> {
        let name = self.translator.aggregate(aggregate.kind)?;
        self.text(name);
        self.text("(");
        if aggregate.distinct {
            self.text("DISTINCT ");
        }
        match &aggregate.operand {
            Some(operand) => self.node(operand)?,
            None => self.text("*"),
        }
        self.text(")");
        Ok(())
    }

    fn visit_cast(&mut self, cast: &SqlCast) -> Result<()> {
        let target = self.types.native_name(&cast.target)?;
        self.text("CAST(");
        self.node(&cast.operand)?;
        self.text(" AS ");
        self.text(&target);
        self.text(")");
        Ok(())
    }

    fn visit_case(&mut self, case: &SqlCase) -> Result<()> {
        self.text("CASE");
        for (when, then) in &case.branches {
            self.text(" WHEN ");
            self.node(when)?;
            self.text(" THEN ");
            self.node(then)?;
        }
        if let Some(otherwise) = &case.otherwise {
            self.text(" ELSE ");
            self.node(otherwise)?;
        }
        self.text(" END");
        Ok(())
    }

    fn visit_row(&mut self, row: &SqlRow) -> Result<()> {
        self.text("(");
        self.list(&row.items)?;
        self.text(")");
        Ok(())
    }

    fn visit_dynamic_filter(&mut self, filter: &SqlDynamicFilter) -> Result<()> {
        let expressions = filter
            .expressions()
            .iter()
            .map(|e| self.sub_chain(e))
            .collect::<Result<Vec<_>>>()?;
        self.chain.push(PostCompileNode::DynamicFilter {
            id: filter.id().clone(),
            expressions,
        });
        Ok(())
    }

    fn visit_subquery(&mut self, subquery: &SqlSubQuery) -> Result<()> {
        self.text("(");
        self.node(&subquery.query)?;
        self.text(")");
        Ok(())
    }

    fn visit_variant(&mut self, variant: &SqlVariant) -> Result<()> {
        let main = self.sub_chain(&variant.main)?;
        let alternative = self.sub_chain(&variant.alternative)?;
        self.chain.push(PostCompileNode::Variant {
            key: variant.key.clone(),
            main,
            alternative,
        });
        Ok(())
    }

    fn visit_row_number(&mut self, row_number: &SqlRowNumber) -> Result<()> {
        if !self.translator.window_functions()? {
            return Err(self.translator.unsupported("ROW_NUMBER()"));
        }
        self.text("ROW_NUMBER() OVER (");
        if !row_number.order_by.is_empty() {
            self.text("ORDER BY ");
            self.orders(&row_number.order_by)?;
        }
        self.text(")");
        Ok(())
    }

    fn visit_native(&mut self, text: &str) -> Result<()> {
        self.text(text);
        Ok(())
    }

    fn visit_table(&mut self, table: &SqlTableRef) -> Result<()> {
        self.qualified(table.schema.as_deref(), &table.name)?;
        if let Some(alias) = &table.alias {
            self.alias(alias)?;
        }
        if let Some(hint) = self.table_hint.clone() {
            self.text(&hint);
        }
        Ok(())
    }

    fn visit_query_ref(&mut self, query_ref: &SqlQueryRef) -> Result<()> {
        self.text("(");
        self.node(&query_ref.query)?;
        self.text(")");
        self.alias(&query_ref.alias)
    }

    fn visit_join(&mut self, join: &SqlJoin) -> Result<()> {
        self.node(&join.left)?;
        self.text(match join.kind {
            SqlJoinKind::Inner => " INNER JOIN ",
            SqlJoinKind::LeftOuter => " LEFT OUTER JOIN ",
            SqlJoinKind::Cross => " CROSS JOIN ",
        });
        self.node(&join.right)?;
        if let Some(on) = &join.on {
            self.text(" ON ");
            self.node(on)?;
        }
        Ok(())
    }

    fn visit_select(&mut self, select: &SqlSelect) -> Result<()> {
        // An enclosing lock hint applies to this select's FROM clause only.
        let inherited = self.table_hint.take();
        let result = self.select(select, inherited.clone());
        self.table_hint = inherited;
        result
    }

    fn visit_insert(&mut self, insert: &SqlInsert) -> Result<()> {
        self.text("INSERT INTO ");
        self.node(&insert.table)?;
        self.text(" (");
        for (i, column) in insert.columns.iter().enumerate() {
            if i > 0 {
                self.text(", ");
            }
            self.identifier(column)?;
        }
        self.text(") VALUES (");
        self.list(&insert.values)?;
        self.text(")");
        Ok(())
    }

    fn visit_update(&mut self, update: &SqlUpdate) -> Result<()> {
        self.text("UPDATE ");
        self.node(&update.table)?;
        self.text(" SET ");
        for (i, (column, value)) in update.assignments.iter().enumerate() {
            if i > 0 {
                self.text(", ");
            }
            self.identifier(column)?;
            self.text(" = ");
            self.node(value)?;
        }
        self.filter(&update.filter)
    }

    fn visit_delete(&mut self, delete: &SqlDelete) -> Result<()> {
        self.text("DELETE FROM ");
        self.node(&delete.table)?;
        self.filter(&delete.filter)
    }

    fn visit_create_index(&mut self, create: &SqlCreateIndex) -> Result<()> {
        let index = &create.index;
        self.text(if index.is_unique() {
            "CREATE UNIQUE INDEX "
        } else {
            "CREATE INDEX "
        });
        self.identifier(index.name())?;
        self.text(" ON ");
        self.qualified(index.table_schema(), index.table_name())?;
        self.text(" (");
        for (i, column) in index.columns().iter().enumerate() {
            if i > 0 {
                self.text(", ");
            }
            self.identifier(&column.name)?;
            if !column.ascending {
                self.text(" DESC");
            }
        }
        self.text(")");
        if let Some(percent) = index.fill_factor() {
            if let Some(clause) = self.translator.fill_factor(percent)? {
                self.text(&clause);
            }
        }
        Ok(())
    }
}
