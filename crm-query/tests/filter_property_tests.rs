//! Property-based tests for filter and ordering expressions.

use crm_query::{parse_filter, parse_filter_content, parse_order_by};
use crm_test_utils::fixtures::all_types_object;
use crm_test_utils::generators::{arb_filter_clause, arb_leaf_clause, arb_order_by_items};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// A rendered clause tree parses back into the same tree.
    #[test]
    fn prop_filter_render_then_parse(clause in arb_filter_clause(&all_types_object())) {
        let object = all_types_object();
        let rendered = clause.to_string();
        let parsed = parse_filter(&rendered, &object);
        prop_assert_eq!(parsed, Ok(clause), "expression: {}", rendered);
    }

    /// Joining N clauses with commas under a conjunction yields exactly N
    /// parts, each equal to its source clause.
    #[test]
    fn prop_filter_content_splits_top_level_only(
        clauses in prop::collection::vec(arb_filter_clause(&all_types_object()), 1..5)
    ) {
        let parts: Vec<String> = clauses.iter().map(ToString::to_string).collect();
        let expression = format!("or({})", parts.join(","));
        let split = parse_filter_content(&expression);
        prop_assert_eq!(split, Ok(parts));
    }

    /// Leaves are accepted on their own, read as an implicit `and`.
    #[test]
    fn prop_bare_leaf_is_implicit_and(leaf in arb_leaf_clause(&all_types_object())) {
        let object = all_types_object();
        let parsed = parse_filter(&leaf.to_string(), &object);
        prop_assert_eq!(parsed, Ok(crm_core::FilterClause::and(vec![leaf])));
    }

    /// Every listed field survives into the order, last direction wins.
    #[test]
    fn prop_order_by_keeps_last_direction(items in arb_order_by_items(&all_types_object())) {
        let object = all_types_object();
        let expression = items
            .iter()
            .map(|(field, direction)| format!("{}[{}]", field, direction.as_str()))
            .collect::<Vec<_>>()
            .join(",");
        let order_by = parse_order_by(&expression, &object)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        for (field, _) in &items {
            let last = items
                .iter()
                .rev()
                .find(|(name, _)| name == field)
                .map(|(_, direction)| *direction);
            prop_assert_eq!(
                order_by.get(field).and_then(|node| match node {
                    crm_core::OrderByNode::Direction(direction) => Some(*direction),
                    crm_core::OrderByNode::Nested(_) => None,
                }),
                last
            );
        }
    }
}
