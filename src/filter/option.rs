use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::Value;

/// Operator of one filter token.
///
/// Comparison operators carry a field reference and operands; the
/// structural tokens (parentheses, AND, OR) carry nothing. `In` is part of
/// the vocabulary but has no SQL rendering; compiling it is a typed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Between,
    Like,
    In,
    LeftParen,
    RightParen,
    And,
    Or,
}

impl FilterOperator {
    /// A "normal" operator in the implicit-AND rule: any operator that
    /// renders to a condition rather than structure.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            FilterOperator::Equal
                | FilterOperator::NotEqual
                | FilterOperator::Greater
                | FilterOperator::GreaterEqual
                | FilterOperator::Less
                | FilterOperator::LessEqual
                | FilterOperator::Between
                | FilterOperator::Like
                | FilterOperator::In
        )
    }

    /// Direct SQL symbol, for the simple comparison operators only.
    pub fn sql_symbol(&self) -> Option<&'static str> {
        match self {
            FilterOperator::Equal => Some("="),
            FilterOperator::NotEqual => Some("!="),
            FilterOperator::Greater => Some(">"),
            FilterOperator::GreaterEqual => Some(">="),
            FilterOperator::Less => Some("<"),
            FilterOperator::LessEqual => Some("<="),
            _ => None,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterOperator::Equal => "=",
            FilterOperator::NotEqual => "!=",
            FilterOperator::Greater => ">",
            FilterOperator::GreaterEqual => ">=",
            FilterOperator::Less => "<",
            FilterOperator::LessEqual => "<=",
            FilterOperator::Between => "BETWEEN",
            FilterOperator::Like => "LIKE",
            FilterOperator::In => "IN",
            FilterOperator::LeftParen => "(",
            FilterOperator::RightParen => ")",
            FilterOperator::And => "AND",
            FilterOperator::Or => "OR",
        };
        write!(f, "{name}")
    }
}

/// One token of a predicate expression.
///
/// A sequence of these is a pre-order list with explicit parenthesis
/// markers, not a tree; the parser in `filter::ast` turns it into one and
/// enforces well-formedness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOption {
    /// Owning entity type, for comparison tokens.
    pub entity_type: Option<String>,
    /// Field name, for comparison tokens.
    pub field: Option<String>,
    pub operator: FilterOperator,
    /// One operand for the simple comparisons and LIKE, two for BETWEEN
    /// (low, high), none for structural tokens.
    pub operands: Vec<Value>,
}

impl FilterOption {
    fn comparison(
        entity_type: &str,
        field: &str,
        operator: FilterOperator,
        operands: Vec<Value>,
    ) -> Self {
        Self {
            entity_type: Some(entity_type.to_string()),
            field: Some(field.to_string()),
            operator,
            operands,
        }
    }

    fn structural(operator: FilterOperator) -> Self {
        Self {
            entity_type: None,
            field: None,
            operator,
            operands: Vec::new(),
        }
    }

    pub fn eq(entity_type: &str, field: &str, value: impl Into<Value>) -> Self {
        Self::comparison(entity_type, field, FilterOperator::Equal, vec![value.into()])
    }

    pub fn ne(entity_type: &str, field: &str, value: impl Into<Value>) -> Self {
        Self::comparison(
            entity_type,
            field,
            FilterOperator::NotEqual,
            vec![value.into()],
        )
    }

    pub fn gt(entity_type: &str, field: &str, value: impl Into<Value>) -> Self {
        Self::comparison(
            entity_type,
            field,
            FilterOperator::Greater,
            vec![value.into()],
        )
    }

    pub fn ge(entity_type: &str, field: &str, value: impl Into<Value>) -> Self {
        Self::comparison(
            entity_type,
            field,
            FilterOperator::GreaterEqual,
            vec![value.into()],
        )
    }

    pub fn lt(entity_type: &str, field: &str, value: impl Into<Value>) -> Self {
        Self::comparison(entity_type, field, FilterOperator::Less, vec![value.into()])
    }

    pub fn le(entity_type: &str, field: &str, value: impl Into<Value>) -> Self {
        Self::comparison(
            entity_type,
            field,
            FilterOperator::LessEqual,
            vec![value.into()],
        )
    }

    pub fn between(
        entity_type: &str,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::comparison(
            entity_type,
            field,
            FilterOperator::Between,
            vec![low.into(), high.into()],
        )
    }

    pub fn like(entity_type: &str, field: &str, value: impl Into<Value>) -> Self {
        Self::comparison(entity_type, field, FilterOperator::Like, vec![value.into()])
    }

    pub fn in_list(entity_type: &str, field: &str, values: Vec<Value>) -> Self {
        Self::comparison(entity_type, field, FilterOperator::In, values)
    }

    pub fn lparen() -> Self {
        Self::structural(FilterOperator::LeftParen)
    }

    pub fn rparen() -> Self {
        Self::structural(FilterOperator::RightParen)
    }

    pub fn and() -> Self {
        Self::structural(FilterOperator::And)
    }

    pub fn or() -> Self {
        Self::structural(FilterOperator::Or)
    }
}

/// Full-text multi-field filter: search every listed `(type, field)` column
/// for every term, OR-joined, ANDed onto the specific filters.
///
/// Terms are rendered as given; callers supply their own wildcards.
/// Ordered collections keep the compiled clause deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFields {
    pub fields: BTreeMap<String, BTreeSet<String>>,
    pub terms: Vec<String>,
}

impl SearchFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, entity_type: &str, field: &str) -> Self {
        self.fields
            .entry(entity_type.to_string())
            .or_default()
            .insert(field.to_string());
        self
    }

    pub fn term(mut self, term: &str) -> Self {
        self.terms.push(term.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() || self.terms.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// One sort key, compiled through the same alias table as filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderByOption {
    pub entity_type: String,
    pub field: String,
    pub direction: SortDirection,
}

impl OrderByOption {
    pub fn asc(entity_type: &str, field: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            field: field.to_string(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(entity_type: &str, field: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            field: field.to_string(),
            direction: SortDirection::Descending,
        }
    }
}
