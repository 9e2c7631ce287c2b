use std::collections::HashSet;

use crate::config::MappingConfig;
use crate::core::Result;
use crate::core::value::escape_sql_text;
use crate::filter::ast::{self, FilterExpr};
use crate::filter::option::{FilterOption, OrderByOption, SearchFields};

/// Compiles filter/sort expressions into SQL fragments using the shared
/// alias table.
#[derive(Debug, Clone)]
pub struct FilterCompiler<'a> {
    config: &'a MappingConfig,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(config: &'a MappingConfig) -> Self {
        Self { config }
    }

    /// Compile the boolean expression. An empty filter list with no
    /// applicable search fields yields an empty string (no WHERE addition).
    pub fn compile(
        &self,
        filters: &[FilterOption],
        search: Option<&SearchFields>,
    ) -> Result<String> {
        let parsed = ast::parse(filters, self.config)?;
        let mut clause = parsed.expr.as_ref().map(render).unwrap_or_default();

        if let Some(search) = search {
            if let Some(search_clause) = self.search_clause(search, &parsed.constrained_columns) {
                clause = if clause.is_empty() {
                    search_clause
                } else {
                    format!("{clause} AND {search_clause}")
                };
            }
        }

        Ok(clause.trim().to_string())
    }

    /// Compile and wrap for composition into a larger `WHERE … AND (…)`
    /// clause: the expression is parenthesized unless it already is fully.
    pub fn compile_fragment(
        &self,
        filters: &[FilterOption],
        search: Option<&SearchFields>,
    ) -> Result<String> {
        let clause = self.compile(filters, search)?;
        if clause.is_empty() || is_fully_parenthesized(&clause) {
            Ok(clause)
        } else {
            Ok(format!("({clause})"))
        }
    }

    /// `(colA LIKE 't1' OR colA LIKE 't2' OR colB LIKE 't1' …)` over every
    /// search field not already constrained by a specific filter. None when
    /// nothing is left to search.
    fn search_clause(
        &self,
        search: &SearchFields,
        constrained_columns: &HashSet<String>,
    ) -> Option<String> {
        if search.is_empty() {
            return None;
        }

        let mut conditions = Vec::new();
        for (entity_type, fields) in &search.fields {
            for field in fields {
                let column = self.config.column_for(entity_type, field);
                if constrained_columns.contains(&column) {
                    continue;
                }
                for term in &search.terms {
                    conditions.push(format!("{column} LIKE '{}'", escape_sql_text(term)));
                }
            }
        }

        if conditions.is_empty() {
            None
        } else {
            Some(format!("({})", conditions.join(" OR ")))
        }
    }

    /// Comma-joined ORDER BY list through the alias table; empty string for
    /// no sort keys.
    pub fn compile_order_by(&self, order: &[OrderByOption]) -> String {
        order
            .iter()
            .map(|o| {
                format!(
                    "{} {}",
                    self.config.column_for(&o.entity_type, &o.field),
                    o.direction.as_sql()
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn render(expr: &FilterExpr) -> String {
    match expr {
        FilterExpr::Compare {
            column,
            symbol,
            operand,
        } => format!("{column} {symbol} {}", operand.sql_literal()),
        FilterExpr::Between { column, low, high } => format!(
            "({} <= {column} AND {column} <= {})",
            low.sql_literal(),
            high.sql_literal()
        ),
        FilterExpr::Like { column, pattern } => {
            format!("{column} LIKE '%{}%'", escape_sql_text(pattern))
        }
        FilterExpr::And(left, right) => format!("{} AND {}", render(left), render(right)),
        FilterExpr::Or(left, right) => format!("{} OR {}", render(left), render(right)),
        FilterExpr::Group(inner) => format!("( {})", render(inner)),
    }
}

/// True when the leading '(' closes only at the very end of the string.
/// Literals containing parentheses are not expected at this layer.
fn is_fully_parenthesized(clause: &str) -> bool {
    if !(clause.starts_with('(') && clause.ends_with(')')) {
        return false;
    }
    let mut depth = 0_i32;
    let last = clause.len() - 1;
    for (index, ch) in clause.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && index != last {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MappingConfig, MappingSource};
    use crate::filter::option::SortDirection;

    fn config() -> MappingConfig {
        MappingConfig::merge([MappingSource::new()])
    }

    #[test]
    fn test_implicit_and_rendering() {
        let compiler_config = config();
        let compiler = FilterCompiler::new(&compiler_config);
        let clause = compiler
            .compile(
                &[
                    FilterOption::eq("W", "a", 1_i64),
                    FilterOption::eq("W", "b", 2_i64),
                ],
                None,
            )
            .unwrap();
        assert_eq!(clause, "a = 1 AND b = 2");
    }

    #[test]
    fn test_grouped_or_rendering() {
        let compiler_config = config();
        let compiler = FilterCompiler::new(&compiler_config);
        let clause = compiler
            .compile(
                &[
                    FilterOption::lparen(),
                    FilterOption::eq("W", "a", 1_i64),
                    FilterOption::or(),
                    FilterOption::eq("W", "b", 2_i64),
                    FilterOption::rparen(),
                ],
                None,
            )
            .unwrap();
        assert_eq!(clause, "( a = 1 OR b = 2)");
    }

    #[test]
    fn test_between_rendering() {
        let compiler_config = config();
        let compiler = FilterCompiler::new(&compiler_config);
        let clause = compiler
            .compile(&[FilterOption::between("W", "a", 1_i64, 10_i64)], None)
            .unwrap();
        assert_eq!(clause, "(1 <= a AND a <= 10)");
    }

    #[test]
    fn test_like_wraps_operand() {
        let compiler_config = config();
        let compiler = FilterCompiler::new(&compiler_config);
        let clause = compiler
            .compile(&[FilterOption::like("W", "name", "wid")], None)
            .unwrap();
        assert_eq!(clause, "name LIKE '%wid%'");
    }

    #[test]
    fn test_string_operands_are_quoted() {
        let compiler_config = config();
        let compiler = FilterCompiler::new(&compiler_config);
        let clause = compiler
            .compile(&[FilterOption::eq("W", "name", "o'brien")], None)
            .unwrap();
        assert_eq!(clause, "name = 'o''brien'");
    }

    #[test]
    fn test_empty_filters_compile_to_empty_string() {
        let compiler_config = config();
        let compiler = FilterCompiler::new(&compiler_config);
        assert_eq!(compiler.compile(&[], None).unwrap(), "");
        assert_eq!(compiler.compile_fragment(&[], None).unwrap(), "");
    }

    #[test]
    fn test_fragment_parenthesizes_only_when_needed() {
        let compiler_config = config();
        let compiler = FilterCompiler::new(&compiler_config);

        let bare = compiler
            .compile_fragment(
                &[
                    FilterOption::eq("W", "a", 1_i64),
                    FilterOption::eq("W", "b", 2_i64),
                ],
                None,
            )
            .unwrap();
        assert_eq!(bare, "(a = 1 AND b = 2)");

        let grouped = compiler
            .compile_fragment(&[FilterOption::between("W", "a", 1_i64, 10_i64)], None)
            .unwrap();
        assert_eq!(grouped, "(1 <= a AND a <= 10)");
    }

    #[test]
    fn test_search_clause_appended_and_deduplicated() {
        let compiler_config = config();
        let compiler = FilterCompiler::new(&compiler_config);
        let search = SearchFields::new()
            .field("W", "a")
            .field("W", "title")
            .term("%x%");
        let clause = compiler
            .compile(&[FilterOption::eq("W", "a", 1_i64)], Some(&search))
            .unwrap();
        // field `a` is already constrained, so only `title` is searched
        assert_eq!(clause, "a = 1 AND (title LIKE '%x%')");
    }

    #[test]
    fn test_search_clause_field_major_term_order() {
        let compiler_config = config();
        let compiler = FilterCompiler::new(&compiler_config);
        let search = SearchFields::new()
            .field("W", "a")
            .field("W", "b")
            .term("t1")
            .term("t2");
        let clause = compiler.compile(&[], Some(&search)).unwrap();
        assert_eq!(
            clause,
            "(a LIKE 't1' OR a LIKE 't2' OR b LIKE 't1' OR b LIKE 't2')"
        );
    }

    #[test]
    fn test_search_fully_shadowed_by_filters_adds_nothing() {
        let compiler_config = config();
        let compiler = FilterCompiler::new(&compiler_config);
        let search = SearchFields::new().field("W", "a").term("t");
        let clause = compiler
            .compile(&[FilterOption::eq("W", "a", 1_i64)], Some(&search))
            .unwrap();
        assert_eq!(clause, "a = 1");
    }

    #[test]
    fn test_order_by_uses_alias_table() {
        let aliased = MappingConfig::merge([MappingSource::new()
            .field_alias("W", "name", "NAME_")]);
        let compiler = FilterCompiler::new(&aliased);
        let order = [
            OrderByOption::asc("W", "name"),
            OrderByOption {
                entity_type: "W".to_string(),
                field: "created".to_string(),
                direction: SortDirection::Descending,
            },
        ];
        assert_eq!(
            compiler.compile_order_by(&order),
            "NAME_ ASC, created DESC"
        );
    }

    #[test]
    fn test_field_alias_flows_through_filters() {
        let aliased = MappingConfig::merge([MappingSource::new()
            .sql_class_alias("W", "T")
            .field_alias("W", "name", "NAME_")]);
        let compiler = FilterCompiler::new(&aliased);
        let clause = compiler
            .compile(&[FilterOption::eq("W", "name", "a")], None)
            .unwrap();
        assert_eq!(clause, "T.NAME_ = 'a'");
    }
}
