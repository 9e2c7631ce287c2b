use std::collections::HashSet;

use crate::config::MappingConfig;
use crate::core::{PersistenceError, Result, Value};
use crate::filter::option::{FilterOperator, FilterOption};

/// Tagged predicate expression built from the flat token list.
///
/// `And`/`Or` nodes are left-folded in token order; the positional grammar
/// has no operator precedence beyond explicit grouping, and the tree
/// preserves that.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Compare {
        column: String,
        symbol: &'static str,
        operand: Value,
    },
    Between {
        column: String,
        low: Value,
        high: Value,
    },
    Like {
        column: String,
        pattern: String,
    },
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Group(Box<FilterExpr>),
}

/// Result of parsing: the expression (None for an empty list) plus the set
/// of resolved columns the specific filters constrain, used to de-duplicate
/// the full-text search clause.
#[derive(Debug)]
pub struct ParsedFilter {
    pub expr: Option<FilterExpr>,
    pub constrained_columns: HashSet<String>,
}

/// Parse a flat FilterOption list into an expression tree.
///
/// Implicit AND insertion, as the positional grammar defines it:
/// - between two adjacent comparison tokens
/// - after a right parenthesis followed by a comparison or a left
///   parenthesis
///
/// Anything else (dangling boolean operator, unbalanced parentheses, empty
/// group) is a malformed-filter error.
pub fn parse(filters: &[FilterOption], config: &MappingConfig) -> Result<ParsedFilter> {
    if filters.is_empty() {
        return Ok(ParsedFilter {
            expr: None,
            constrained_columns: HashSet::new(),
        });
    }

    let tokens = insert_implicit_ands(filters);
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        config,
        constrained: HashSet::new(),
    };
    let expr = parser.parse_expr()?;
    if parser.pos != tokens.len() {
        return Err(PersistenceError::MalformedFilter(
            "unbalanced parentheses: unexpected ')'".to_string(),
        ));
    }
    Ok(ParsedFilter {
        expr: Some(expr),
        constrained_columns: parser.constrained,
    })
}

fn insert_implicit_ands(filters: &[FilterOption]) -> Vec<FilterOption> {
    let mut tokens: Vec<FilterOption> = Vec::with_capacity(filters.len());
    for option in filters {
        if let Some(prev) = tokens.last() {
            let prev_op = prev.operator;
            let cur_op = option.operator;
            let implicit = (prev_op.is_comparison() && cur_op.is_comparison())
                || (prev_op == FilterOperator::RightParen
                    && (cur_op.is_comparison() || cur_op == FilterOperator::LeftParen));
            if implicit {
                tokens.push(FilterOption::and());
            }
        }
        tokens.push(option.clone());
    }
    tokens
}

struct Parser<'a> {
    tokens: &'a [FilterOption],
    pos: usize,
    config: &'a MappingConfig,
    constrained: HashSet<String>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&FilterOption> {
        self.tokens.get(self.pos)
    }

    fn parse_expr(&mut self) -> Result<FilterExpr> {
        let mut left = self.parse_operand()?;
        loop {
            let Some(token) = self.peek() else {
                break;
            };
            match token.operator {
                FilterOperator::And => {
                    self.pos += 1;
                    let right = self.parse_operand()?;
                    left = FilterExpr::And(Box::new(left), Box::new(right));
                }
                FilterOperator::Or => {
                    self.pos += 1;
                    let right = self.parse_operand()?;
                    left = FilterExpr::Or(Box::new(left), Box::new(right));
                }
                FilterOperator::RightParen => break,
                other => {
                    return Err(PersistenceError::MalformedFilter(format!(
                        "expected boolean operator, found '{other}'"
                    )));
                }
            }
        }
        Ok(left)
    }

    fn parse_operand(&mut self) -> Result<FilterExpr> {
        let Some(token) = self.peek() else {
            return Err(PersistenceError::MalformedFilter(
                "expression ends where a condition was expected".to_string(),
            ));
        };
        match token.operator {
            FilterOperator::LeftParen => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                match self.peek() {
                    Some(t) if t.operator == FilterOperator::RightParen => {
                        self.pos += 1;
                        Ok(FilterExpr::Group(Box::new(inner)))
                    }
                    _ => Err(PersistenceError::MalformedFilter(
                        "unbalanced parentheses: missing ')'".to_string(),
                    )),
                }
            }
            op if op.is_comparison() => {
                let token = token.clone();
                self.pos += 1;
                self.build_leaf(&token)
            }
            other => Err(PersistenceError::MalformedFilter(format!(
                "'{other}' is not a condition"
            ))),
        }
    }

    fn build_leaf(&mut self, token: &FilterOption) -> Result<FilterExpr> {
        let (entity_type, field) = match (&token.entity_type, &token.field) {
            (Some(t), Some(f)) => (t.as_str(), f.as_str()),
            _ => {
                return Err(PersistenceError::MalformedFilter(format!(
                    "'{}' token without a field reference",
                    token.operator
                )));
            }
        };
        let column = self.config.column_for(entity_type, field);
        self.constrained.insert(column.clone());

        match token.operator {
            FilterOperator::Between => {
                let [low, high] = token.operands.as_slice() else {
                    return Err(PersistenceError::MalformedFilter(format!(
                        "BETWEEN on '{column}' needs exactly two operands"
                    )));
                };
                Ok(FilterExpr::Between {
                    column,
                    low: low.clone(),
                    high: high.clone(),
                })
            }
            FilterOperator::Like => {
                let [operand] = token.operands.as_slice() else {
                    return Err(PersistenceError::MalformedFilter(format!(
                        "LIKE on '{column}' needs exactly one operand"
                    )));
                };
                Ok(FilterExpr::Like {
                    column,
                    pattern: operand.to_string(),
                })
            }
            FilterOperator::In => {
                // Deliberately not rendered; no call site has defined the
                // parameterized-list shape yet.
                Err(PersistenceError::UnsupportedOperator("IN".to_string()))
            }
            op => {
                let symbol = op.sql_symbol().ok_or_else(|| {
                    PersistenceError::UnsupportedOperator(op.to_string())
                })?;
                let [operand] = token.operands.as_slice() else {
                    return Err(PersistenceError::MalformedFilter(format!(
                        "'{op}' on '{column}' needs exactly one operand"
                    )));
                };
                Ok(FilterExpr::Compare {
                    column,
                    symbol,
                    operand: operand.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MappingConfig, MappingSource};

    fn config() -> MappingConfig {
        MappingConfig::merge([MappingSource::new()])
    }

    #[test]
    fn test_empty_list_parses_to_none() {
        let parsed = parse(&[], &config()).unwrap();
        assert!(parsed.expr.is_none());
        assert!(parsed.constrained_columns.is_empty());
    }

    #[test]
    fn test_implicit_and_between_comparisons() {
        let parsed = parse(
            &[
                FilterOption::eq("W", "a", 1_i64),
                FilterOption::eq("W", "b", 2_i64),
            ],
            &config(),
        )
        .unwrap();
        assert!(matches!(parsed.expr, Some(FilterExpr::And(_, _))));
        assert!(parsed.constrained_columns.contains("a"));
        assert!(parsed.constrained_columns.contains("b"));
    }

    #[test]
    fn test_implicit_and_after_right_paren() {
        let parsed = parse(
            &[
                FilterOption::lparen(),
                FilterOption::eq("W", "a", 1_i64),
                FilterOption::rparen(),
                FilterOption::eq("W", "b", 2_i64),
            ],
            &config(),
        )
        .unwrap();
        let Some(FilterExpr::And(left, _)) = parsed.expr else {
            panic!("expected implicit AND after ')'");
        };
        assert!(matches!(*left, FilterExpr::Group(_)));
    }

    #[test]
    fn test_unbalanced_parens_rejected() {
        let missing_close = [FilterOption::lparen(), FilterOption::eq("W", "a", 1_i64)];
        assert!(matches!(
            parse(&missing_close, &config()).unwrap_err(),
            PersistenceError::MalformedFilter(_)
        ));

        let stray_close = [FilterOption::eq("W", "a", 1_i64), FilterOption::rparen()];
        assert!(matches!(
            parse(&stray_close, &config()).unwrap_err(),
            PersistenceError::MalformedFilter(_)
        ));
    }

    #[test]
    fn test_dangling_boolean_operator_rejected() {
        let tokens = [FilterOption::eq("W", "a", 1_i64), FilterOption::or()];
        assert!(matches!(
            parse(&tokens, &config()).unwrap_err(),
            PersistenceError::MalformedFilter(_)
        ));
    }

    #[test]
    fn test_in_operator_is_unsupported() {
        let tokens = [FilterOption::in_list(
            "W",
            "a",
            vec![Value::from(1_i64), Value::from(2_i64)],
        )];
        assert!(matches!(
            parse(&tokens, &config()).unwrap_err(),
            PersistenceError::UnsupportedOperator(op) if op == "IN"
        ));
    }
}
