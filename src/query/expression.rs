use crate::ast::{
    DynamicFilterBuilder, DynamicFilterId, PlaceholderId, QueryParameter, SqlBinaryOperator,
    SqlFunctionType, SqlLiteral, SqlRef, SqlUnaryOperator, TypeDescriptor, VariantKey,
};
use crate::error::{Result, SqlError};

/// Logical expression over the columns of a provider's source.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(usize),
    Constant(SqlLiteral),
    Null,
    Parameter(QueryParameter),
    Placeholder(PlaceholderId),
    /// Type discriminator test: true when the column holds the registry id
    /// of `ty`.
    TypeIs {
        column: usize,
        ty: TypeDescriptor,
    },
    Binary {
        op: SqlBinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: SqlUnaryOperator,
        operand: Box<Expr>,
    },
    Function {
        function: SqlFunctionType,
        args: Vec<Expr>,
    },
    /// Membership of a row of expressions in a collection bound at
    /// execution time.
    InList {
        id: DynamicFilterId,
        columns: Vec<Expr>,
    },
}

impl Expr {
    pub fn column(index: usize) -> Self {
        Expr::Column(index)
    }

    pub fn int(value: i64) -> Self {
        Expr::Constant(SqlLiteral::Integer(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Constant(SqlLiteral::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Constant(SqlLiteral::Boolean(value))
    }

    pub fn parameter(parameter: &QueryParameter) -> Self {
        Expr::Parameter(parameter.clone())
    }

    pub fn binary(op: SqlBinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(SqlBinaryOperator::Eq, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(SqlBinaryOperator::And, left, right)
    }

    pub fn unary(op: SqlUnaryOperator, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn function(function: SqlFunctionType, args: Vec<Expr>) -> Self {
        Expr::Function { function, args }
    }

    /// Build the DOM for this expression. `columns[i]` is the expression
    /// of source column `i`; it is referenced, not copied.
    pub(crate) fn to_sql(&self, columns: &[SqlRef]) -> Result<SqlRef> {
        let node = match self {
            Expr::Column(index) => column_at(columns, *index)?,
            Expr::Constant(value) => SqlRef::literal(value.clone()),
            Expr::Null => SqlRef::null(),
            Expr::Parameter(p) => SqlRef::parameter(p.clone()),
            Expr::Placeholder(id) => SqlRef::placeholder(id.clone()),
            Expr::TypeIs { column, ty } => SqlRef::eq(
                column_at(columns, *column)?,
                SqlRef::placeholder(PlaceholderId::Type(ty.clone())),
            ),
            Expr::Binary { op, left, right } => {
                let l = left.to_sql(columns)?;
                let r = right.to_sql(columns)?;
                match (op, &**left, &**right) {
                    (SqlBinaryOperator::Eq | SqlBinaryOperator::NotEq, _, Expr::Parameter(p)) => {
                        null_aware_comparison(*op, l, r, p)
                    }
                    (SqlBinaryOperator::Eq | SqlBinaryOperator::NotEq, Expr::Parameter(p), _) => {
                        null_aware_comparison(*op, r, l, p)
                    }
                    _ => SqlRef::binary(*op, l, r),
                }
            }
            Expr::Unary { op, operand } => SqlRef::unary(*op, operand.to_sql(columns)?),
            Expr::Function { function, args } => SqlRef::function(
                *function,
                args.iter()
                    .map(|a| a.to_sql(columns))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Expr::InList { id, columns: exprs } => {
                let mut builder = DynamicFilterBuilder::new(id.clone());
                for expr in exprs {
                    builder = builder.expression(expr.to_sql(columns)?);
                }
                SqlRef::dynamic_filter(builder.build()?)
            }
        };
        Ok(node)
    }
}

pub(super) fn column_at(columns: &[SqlRef], index: usize) -> Result<SqlRef> {
    columns
        .get(index)
        .cloned()
        .ok_or(SqlError::ColumnOutOfRange {
            index,
            count: columns.len(),
        })
}

/// `value = @p` unless `@p` is NULL at execution time, then `value IS NULL`.
fn null_aware_comparison(
    op: SqlBinaryOperator,
    value: SqlRef,
    parameter_node: SqlRef,
    parameter: &QueryParameter,
) -> SqlRef {
    let null_test = if op == SqlBinaryOperator::Eq {
        SqlUnaryOperator::IsNull
    } else {
        SqlUnaryOperator::IsNotNull
    };
    SqlRef::variant(
        VariantKey::NullParameter(parameter.clone()),
        SqlRef::binary(op, value.clone(), parameter_node),
        SqlRef::unary(null_test, value),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{SqlNode, SqlNodeKind};

    fn columns() -> Vec<SqlRef> {
        vec![SqlRef::column(Some("t0"), "id"), SqlRef::column(Some("t0"), "name")]
    }

    #[test]
    fn test_column_reference_is_shared() {
        let cols = columns();
        let node = Expr::column(1).to_sql(&cols).unwrap();
        assert!(node.same_node(&cols[1]));
    }

    #[test]
    fn test_column_out_of_range() {
        let result = Expr::column(5).to_sql(&columns());
        assert!(matches!(
            result,
            Err(SqlError::ColumnOutOfRange { index: 5, count: 2 })
        ));
    }

    #[test]
    fn test_parameter_equality_has_null_branch() {
        let p = QueryParameter::new("name");
        let node = Expr::eq(Expr::parameter(&p), Expr::column(1))
            .to_sql(&columns())
            .unwrap();
        let content = node.node();
        let SqlNode::Variant(variant) = &*content else {
            panic!("expected variant");
        };
        assert_eq!(variant.key, VariantKey::NullParameter(p.clone()));
        assert_eq!(variant.main.kind(), SqlNodeKind::Binary);
        assert_eq!(variant.alternative.kind(), SqlNodeKind::Unary);
    }

    #[test]
    fn test_type_test_uses_type_placeholder() {
        let node = Expr::TypeIs {
            column: 0,
            ty: TypeDescriptor::new("Dog"),
        }
        .to_sql(&columns())
        .unwrap();
        let content = node.node();
        let SqlNode::Binary(binary) = &*content else {
            panic!("expected comparison");
        };
        assert!(matches!(
            &*binary.right.node(),
            SqlNode::Placeholder(PlaceholderId::Type(ty)) if ty.name == "Dog"
        ));
    }

    #[test]
    fn test_in_list_becomes_dynamic_filter() {
        let node = Expr::InList {
            id: DynamicFilterId("ids".into()),
            columns: vec![Expr::column(0)],
        }
        .to_sql(&columns())
        .unwrap();
        assert_eq!(node.kind(), SqlNodeKind::DynamicFilter);
    }
}
