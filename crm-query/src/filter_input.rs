//! REST `filter` parameter → [`FilterClause`].

use crate::error::{QueryBuilderError, QueryBuilderResult};
use crate::field_value::format_field_value;
use crate::fields::lookup_field;
use crate::filter_content::parse_filter_content;
use crate::inputs::QueryParams;
use crm_core::{Conjunction, FilterClause, FilterOperator, ObjectMetadataItem};
use once_cell::sync::Lazy;
use regex::Regex;

static LEAF_CLAUSE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?s)^([A-Za-z][A-Za-z0-9_]*)\[([A-Za-z]+)\]:(.*)$"));

/// Returns the conjunction heading `expression` when it has the shape
/// `and(...)`, `or(...)` or `not(...)`.
fn leading_conjunction(expression: &str) -> Option<Conjunction> {
    let (head, _) = expression.split_once('(')?;
    head.trim().parse().ok()
}

/// Parses a full filter expression against `object`.
///
/// An expression without a leading conjunction is read as `and(...)`.
pub fn parse_filter(expression: &str, object: &ObjectMetadataItem) -> QueryBuilderResult<FilterClause> {
    let expression = expression.trim();
    match leading_conjunction(expression) {
        Some(conjunction) => parse_composite(expression, conjunction, object),
        None => parse_composite(&format!("and({})", expression), Conjunction::And, object),
    }
}

fn parse_composite(
    expression: &str,
    conjunction: Conjunction,
    object: &ObjectMetadataItem,
) -> QueryBuilderResult<FilterClause> {
    let clauses = parse_filter_content(expression)?
        .iter()
        .map(|part| parse_clause(part.trim(), object))
        .collect::<QueryBuilderResult<Vec<_>>>()?;

    if conjunction == Conjunction::Not && clauses.len() != 1 {
        return Err(QueryBuilderError::NotArity {
            count: clauses.len(),
        });
    }
    Ok(FilterClause::Composite {
        conjunction,
        clauses,
    })
}

fn parse_clause(clause: &str, object: &ObjectMetadataItem) -> QueryBuilderResult<FilterClause> {
    if let Some(conjunction) = leading_conjunction(clause) {
        return parse_composite(clause, conjunction, object);
    }
    parse_leaf(clause, object)
}

fn parse_leaf(clause: &str, object: &ObjectMetadataItem) -> QueryBuilderResult<FilterClause> {
    let pattern = LEAF_CLAUSE
        .as_ref()
        .map_err(|e| QueryBuilderError::unparsable(clause, e.to_string()))?;
    let captures = pattern
        .captures(clause)
        .ok_or_else(|| QueryBuilderError::InvalidFilterClause {
            clause: clause.to_string(),
        })?;
    let (field_name, operator_name, raw_value) = (&captures[1], &captures[2], &captures[3]);

    let field = lookup_field(object, field_name)?;
    let allowed = field.field_type.allowed_operators();
    let invalid_operator = || QueryBuilderError::InvalidOperator {
        field: field_name.to_string(),
        operator: operator_name.to_string(),
        allowed: if allowed.is_empty() {
            "none, filter on the join column instead".to_string()
        } else {
            allowed
                .iter()
                .map(FilterOperator::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        },
    };
    let operator: FilterOperator = operator_name.parse().map_err(|_| invalid_operator())?;
    if !allowed.contains(&operator) {
        return Err(invalid_operator());
    }

    let value = format_field_value(raw_value, Some(field.field_type), Some(operator))?;
    Ok(FilterClause::leaf(field_name, operator, value))
}

/// Reads the `filter` query parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterInputFactory;

impl FilterInputFactory {
    pub fn create(
        &self,
        query: &QueryParams,
        object: &ObjectMetadataItem,
    ) -> QueryBuilderResult<Option<FilterClause>> {
        match query.get("filter").map(|f| f.trim()) {
            None | Some("") => Ok(None),
            Some(expression) => {
                let clause = parse_filter(expression, object)?;
                tracing::debug!(object = %object.name_singular, filter = %clause, "Parsed REST filter");
                Ok(Some(clause))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::{standard_objects, FilterValue};

    #[test]
    fn test_implicit_and() -> QueryBuilderResult<()> {
        let company = standard_objects::company();
        let clause = parse_filter("employees[gte]:10,name[eq]:Acme", &company)?;
        assert_eq!(
            clause,
            FilterClause::and(vec![
                FilterClause::leaf("employees", FilterOperator::Gte, FilterValue::Number(10.0)),
                FilterClause::leaf("name", FilterOperator::Eq, FilterValue::text("Acme")),
            ])
        );
        Ok(())
    }

    #[test]
    fn test_nested_conjunctions() -> QueryBuilderResult<()> {
        let company = standard_objects::company();
        let clause = parse_filter(
            "or(idealCustomerProfile[eq]:true,not(domainName[is]:NULL))",
            &company,
        )?;
        assert_eq!(
            clause,
            FilterClause::or(vec![
                FilterClause::leaf(
                    "idealCustomerProfile",
                    FilterOperator::Eq,
                    FilterValue::Boolean(true)
                ),
                FilterClause::not(FilterClause::leaf(
                    "domainName",
                    FilterOperator::Is,
                    FilterValue::text("NULL")
                )),
            ])
        );
        Ok(())
    }

    #[test]
    fn test_not_takes_one_clause() {
        let company = standard_objects::company();
        assert_eq!(
            parse_filter("not(name[eq]:a,name[eq]:b)", &company),
            Err(QueryBuilderError::NotArity { count: 2 })
        );
    }

    #[test]
    fn test_unknown_field() {
        let company = standard_objects::company();
        assert_eq!(
            parse_filter("and(revenue[gt]:1)", &company),
            Err(QueryBuilderError::FieldNotFound {
                field: "revenue".to_string(),
                object: "company".to_string()
            })
        );
    }

    #[test]
    fn test_operator_not_allowed_for_type() {
        let company = standard_objects::company();
        assert!(matches!(
            parse_filter("idealCustomerProfile[gt]:true", &company),
            Err(QueryBuilderError::InvalidOperator { .. })
        ));
        assert!(matches!(
            parse_filter("name[contains]:a", &company),
            Err(QueryBuilderError::InvalidOperator { .. })
        ));
    }

    #[test]
    fn test_malformed_leaf() {
        let company = standard_objects::company();
        assert!(matches!(
            parse_filter("and(name=Acme)", &company),
            Err(QueryBuilderError::InvalidFilterClause { .. })
        ));
        assert!(matches!(
            parse_filter("and()", &company),
            Err(QueryBuilderError::InvalidFilterClause { .. })
        ));
    }

    #[test]
    fn test_unparsable_number_becomes_nan() -> QueryBuilderResult<()> {
        let company = standard_objects::company();
        let clause = parse_filter("employees[eq]:many", &company)?;
        match clause {
            FilterClause::Composite { clauses, .. } => match &clauses[0] {
                FilterClause::Leaf { value, .. } => assert!(value.is_nan()),
                other => panic!("unexpected clause {other:?}"),
            },
            other => panic!("unexpected clause {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_factory_reads_filter_param() -> QueryBuilderResult<()> {
        let company = standard_objects::company();
        let mut query = QueryParams::new();
        assert_eq!(FilterInputFactory.create(&query, &company)?, None);

        query.insert("filter".to_string(), "name[ilike]:\"%acme%\"".to_string());
        assert_eq!(
            FilterInputFactory.create(&query, &company)?,
            Some(FilterClause::and(vec![FilterClause::leaf(
                "name",
                FilterOperator::Ilike,
                FilterValue::text("%acme%")
            )]))
        );
        Ok(())
    }
}
