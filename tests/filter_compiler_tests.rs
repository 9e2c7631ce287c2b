/// Filter compiler tests against the public API
///
/// Run with: cargo test --test filter_compiler_tests
use flowstore::filter::FilterCompiler;
use flowstore::prelude::*;

fn aliased_config() -> MappingConfig {
    MappingConfig::merge([MappingSource::new()
        .sql_class_alias("Execution", "E")
        .field_alias("Execution", "businessKey", "BUSINESS_KEY_")
        .field_alias("Execution", "state", "STATE_")])
}

#[test]
fn test_mixed_expression_with_aliases() {
    let config = aliased_config();
    let compiler = FilterCompiler::new(&config);

    let clause = compiler
        .compile(
            &[
                FilterOption::eq("Execution", "state", "ACTIVE"),
                FilterOption::and(),
                FilterOption::lparen(),
                FilterOption::like("Execution", "businessKey", "order"),
                FilterOption::or(),
                FilterOption::between("Execution", "priority", 1_i64, 5_i64),
                FilterOption::rparen(),
            ],
            None,
        )
        .unwrap();
    assert_eq!(
        clause,
        "E.STATE_ = 'ACTIVE' AND ( E.BUSINESS_KEY_ LIKE '%order%' OR (1 <= E.priority AND E.priority <= 5))"
    );
}

#[test]
fn test_search_dedup_uses_resolved_columns() {
    let config = aliased_config();
    let compiler = FilterCompiler::new(&config);

    let search = SearchFields::new()
        .field("Execution", "businessKey")
        .field("Execution", "state")
        .term("%x%");

    // the specific filter constrains state, so only businessKey is searched
    let clause = compiler
        .compile(
            &[FilterOption::eq("Execution", "state", "ACTIVE")],
            Some(&search),
        )
        .unwrap();
    assert_eq!(
        clause,
        "E.STATE_ = 'ACTIVE' AND (E.BUSINESS_KEY_ LIKE '%x%')"
    );
}

#[test]
fn test_fragment_composes_into_where_clause() {
    let config = aliased_config();
    let compiler = FilterCompiler::new(&config);

    let fragment = compiler
        .compile_fragment(
            &[
                FilterOption::eq("Execution", "state", "ACTIVE"),
                FilterOption::gt("Execution", "priority", 2_i64),
            ],
            None,
        )
        .unwrap();
    assert_eq!(fragment, "(E.STATE_ = 'ACTIVE' AND E.priority > 2)");
}

#[test]
fn test_search_only_descriptor() {
    let config = MappingConfig::merge([MappingSource::new()]);
    let compiler = FilterCompiler::new(&config);

    let search = SearchFields::new()
        .field("Task", "name")
        .field("Task", "owner")
        .term("%smith%");
    let fragment = compiler.compile_fragment(&[], Some(&search)).unwrap();
    assert_eq!(
        fragment,
        "(name LIKE '%smith%' OR owner LIKE '%smith%')"
    );
}

#[test]
fn test_order_by_shares_alias_table() {
    let config = aliased_config();
    let compiler = FilterCompiler::new(&config);

    let order = [
        OrderByOption::desc("Execution", "businessKey"),
        OrderByOption::asc("Execution", "id"),
    ];
    assert_eq!(
        compiler.compile_order_by(&order),
        "E.BUSINESS_KEY_ DESC, E.id ASC"
    );
}

#[test]
fn test_in_operator_rejected() {
    let config = MappingConfig::merge([MappingSource::new()]);
    let compiler = FilterCompiler::new(&config);

    let err = compiler
        .compile(
            &[FilterOption::in_list(
                "Task",
                "state",
                vec![Value::from("OPEN"), Value::from("CLOSED")],
            )],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, PersistenceError::UnsupportedOperator(op) if op == "IN"));
}

#[test]
fn test_malformed_expression_rejected() {
    let config = MappingConfig::merge([MappingSource::new()]);
    let compiler = FilterCompiler::new(&config);

    let err = compiler
        .compile(
            &[
                FilterOption::lparen(),
                FilterOption::eq("Task", "a", 1_i64),
            ],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, PersistenceError::MalformedFilter(_)));
}
