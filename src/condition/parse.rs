use super::{Condition, FieldPath, Operator};
use crate::core::{ModelError, Result, Value};
use sqlparser::ast as sql_ast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

/// Parse a filter expression into a [`Condition`].
///
/// Chains of `AND`/`OR` are kept flat and in source order, so the SQL
/// rendered from the condition re-applies the usual precedence of the
/// expression. Parenthesized groups become sub-conditions.
pub(super) fn parse_condition(input: &str) -> Result<Condition> {
    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(input)
        .map_err(|e| ModelError::InvalidExpression(e.to_string()))?;
    let expr = parser
        .parse_expr()
        .map_err(|e| ModelError::InvalidExpression(e.to_string()))?;

    let trailing = parser.peek_token();
    if trailing.token != Token::EOF {
        return Err(ModelError::InvalidExpression(format!(
            "Unexpected '{}' after filter expression",
            trailing.token
        )));
    }

    ConditionConverter.convert(expr)
}

struct ConditionConverter;

impl ConditionConverter {
    fn convert(&self, expr: sql_ast::Expr) -> Result<Condition> {
        let mut cond = Condition::new();
        self.push(&mut cond, expr, false, false)?;
        Ok(cond)
    }

    fn push(&self, cond: &mut Condition, expr: sql_ast::Expr, is_or: bool, is_not: bool) -> Result<()> {
        use sql_ast::BinaryOperator as SqlOp;

        match expr {
            sql_ast::Expr::BinaryOp {
                left,
                op: op @ (SqlOp::And | SqlOp::Or),
                right,
            } if !is_not => {
                self.push(cond, *left, is_or, false)?;
                self.push(cond, *right, op == SqlOp::Or, false)
            }

            sql_ast::Expr::BinaryOp {
                op: SqlOp::And | SqlOp::Or,
                ..
            } => {
                let sub = self.convert(expr)?;
                *cond = std::mem::take(cond).push_cond(is_or, is_not, sub);
                Ok(())
            }

            sql_ast::Expr::Nested(inner) => {
                let sub = self.convert(*inner)?;
                *cond = std::mem::take(cond).push_cond(is_or, is_not, sub);
                Ok(())
            }

            sql_ast::Expr::UnaryOp {
                op: sql_ast::UnaryOperator::Not,
                expr,
            } => self.push(cond, *expr, is_or, !is_not),

            sql_ast::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let path = self.convert_path(&expr)?;
                let sub = Condition::new()
                    .and(path.clone(), Operator::GreaterOrEqual, self.convert_value(*low)?)
                    .and(path, Operator::LowerOrEqual, self.convert_value(*high)?);
                *cond = std::mem::take(cond).push_cond(is_or, is_not ^ negated, sub);
                Ok(())
            }

            leaf => {
                let (path, operator, arg, negated) = self.convert_leaf(leaf)?;
                *cond = std::mem::take(cond).push_leaf(is_or, is_not ^ negated, path, operator, arg);
                Ok(())
            }
        }
    }

    fn convert_leaf(&self, expr: sql_ast::Expr) -> Result<(FieldPath, Operator, Value, bool)> {
        match expr {
            sql_ast::Expr::BinaryOp { left, op, right } => {
                let operator = self.convert_binary_op(&op)?;
                match self.convert_path(&left) {
                    Ok(path) => Ok((path, operator, self.convert_value(*right)?, false)),
                    // literal on the left: `30 < age`
                    Err(_) => {
                        let path = self.convert_path(&right)?;
                        Ok((path, mirror(operator), self.convert_value(*left)?, false))
                    }
                }
            }

            sql_ast::Expr::Like {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => {
                if escape_char.is_some() {
                    return Err(ModelError::InvalidExpression(
                        "LIKE ESCAPE is not supported".into(),
                    ));
                }
                let path = self.convert_path(&expr)?;
                Ok((path, Operator::LikePattern, self.convert_value(*pattern)?, negated))
            }

            sql_ast::Expr::ILike {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => {
                if escape_char.is_some() {
                    return Err(ModelError::InvalidExpression(
                        "ILIKE ESCAPE is not supported".into(),
                    ));
                }
                let path = self.convert_path(&expr)?;
                Ok((path, Operator::ILikePattern, self.convert_value(*pattern)?, negated))
            }

            sql_ast::Expr::InList {
                expr,
                list,
                negated,
            } => {
                let path = self.convert_path(&expr)?;
                let values = list
                    .into_iter()
                    .map(|e| self.convert_value(e))
                    .collect::<Result<Vec<_>>>()?;
                let operator = if negated { Operator::NotIn } else { Operator::In };
                Ok((path, operator, Value::List(values), false))
            }

            sql_ast::Expr::IsNull(expr) => {
                Ok((self.convert_path(&expr)?, Operator::IsNull, Value::Null, false))
            }

            sql_ast::Expr::IsNotNull(expr) => {
                Ok((self.convert_path(&expr)?, Operator::IsNotNull, Value::Null, false))
            }

            other => Err(ModelError::InvalidExpression(format!(
                "Unsupported filter expression: {}",
                other
            ))),
        }
    }

    fn convert_path(&self, expr: &sql_ast::Expr) -> Result<FieldPath> {
        match expr {
            sql_ast::Expr::Identifier(ident) => Ok(FieldPath::from(vec![ident.value.clone()])),
            sql_ast::Expr::CompoundIdentifier(idents) => Ok(FieldPath::from(
                idents.iter().map(|i| i.value.clone()).collect::<Vec<_>>(),
            )),
            other => Err(ModelError::InvalidExpression(format!(
                "Expected a field name, found '{}'",
                other
            ))),
        }
    }

    fn convert_value(&self, expr: sql_ast::Expr) -> Result<Value> {
        match expr {
            sql_ast::Expr::Value(val) => match val.value {
                sql_ast::Value::Number(n, _) => parse_number(&n),
                sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
                    Ok(Value::Text(s))
                }
                sql_ast::Value::Boolean(b) => Ok(Value::Boolean(b)),
                sql_ast::Value::Null => Ok(Value::Null),
                other => Err(ModelError::InvalidExpression(format!(
                    "Unsupported value: {}",
                    other
                ))),
            },

            sql_ast::Expr::UnaryOp {
                op: sql_ast::UnaryOperator::Minus,
                expr,
            } => match self.convert_value(*expr)? {
                Value::Integer(i) => Ok(Value::Integer(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(ModelError::InvalidExpression(format!(
                    "Cannot negate {}",
                    other
                ))),
            },

            sql_ast::Expr::Nested(inner) => self.convert_value(*inner),

            other => Err(ModelError::InvalidExpression(format!(
                "Expected a literal value, found '{}'",
                other
            ))),
        }
    }

    fn convert_binary_op(&self, op: &sql_ast::BinaryOperator) -> Result<Operator> {
        use sql_ast::BinaryOperator as SqlOp;

        match op {
            SqlOp::Eq => Ok(Operator::Equals),
            SqlOp::NotEq => Ok(Operator::NotEquals),
            SqlOp::Lt => Ok(Operator::Lower),
            SqlOp::LtEq => Ok(Operator::LowerOrEqual),
            SqlOp::Gt => Ok(Operator::Greater),
            SqlOp::GtEq => Ok(Operator::GreaterOrEqual),
            _ => Err(ModelError::InvalidExpression(format!(
                "Unsupported operator: {}",
                op
            ))),
        }
    }
}

fn mirror(operator: Operator) -> Operator {
    match operator {
        Operator::Lower => Operator::Greater,
        Operator::LowerOrEqual => Operator::GreaterOrEqual,
        Operator::Greater => Operator::Lower,
        Operator::GreaterOrEqual => Operator::LowerOrEqual,
        other => other,
    }
}

fn parse_number(n: &str) -> Result<Value> {
    if let Ok(i) = n.parse::<i64>() {
        Ok(Value::Integer(i))
    } else if let Ok(f) = n.parse::<f64>() {
        Ok(Value::Float(f))
    } else {
        Err(ModelError::TypeMismatch(format!("Invalid number: {}", n)))
    }
}
