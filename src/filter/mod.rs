// ============================================================================
// Filter Compilation Module
// ============================================================================
//
// Turns composable predicate/sort expressions into SQL boolean fragments:
//
// - option: the flat FilterOption token list callers build, plus
//   SearchFields (full-text multi-field) and OrderByOption.
// - ast: parser from the flat list into a small tagged AST, enforcing
//   balanced parentheses and the implicit-AND insertion rule.
// - compiler: AST -> SQL fragment, search-clause de-duplication, order-by
//   rendering through the shared alias table.
//
// ============================================================================

pub mod ast;
pub mod compiler;
pub mod option;

pub use ast::FilterExpr;
pub use compiler::FilterCompiler;
pub use option::{FilterOperator, FilterOption, OrderByOption, SearchFields, SortDirection};
