//! REST `order_by` parameter → [`OrderBy`].

use crate::error::{QueryBuilderError, QueryBuilderResult};
use crate::fields::check_fields;
use crate::inputs::QueryParams;
use crm_core::{ObjectMetadataItem, OrderBy, OrderByDirection, OrderByNode};

pub const DEFAULT_ORDER_DIRECTION: OrderByDirection = OrderByDirection::AscNullsFirst;

/// Reads `order_by=field_1[AscNullsFirst],field_2[DescNullsLast],field_3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderByInputFactory;

impl OrderByInputFactory {
    pub fn create(&self, query: &QueryParams, object: &ObjectMetadataItem) -> QueryBuilderResult<OrderBy> {
        match query.get("order_by") {
            Some(order_by) => parse_order_by(order_by, object),
            None => Ok(OrderBy::new()),
        }
    }
}

/// Parses an `order_by` expression. Dotted paths nest into related objects;
/// later items win over earlier ones with the same top-level field.
pub fn parse_order_by(expression: &str, object: &ObjectMetadataItem) -> QueryBuilderResult<OrderBy> {
    let mut result = OrderBy::new();
    if expression.trim().is_empty() {
        return Ok(result);
    }

    for item in expression.split(',') {
        let item = item.trim();
        let (fields, direction) = match item.split_once('[') {
            Some((fields, rest)) if rest.contains(']') => {
                let direction = rest.replacen(']', "", 1);
                let direction = direction.parse::<OrderByDirection>().map_err(|_| {
                    QueryBuilderError::InvalidOrderByDirection {
                        direction: direction.clone(),
                    }
                })?;
                (fields, direction)
            }
            _ => (item, DEFAULT_ORDER_DIRECTION),
        };

        let mut segments = fields.split('.').rev();
        let innermost = segments.next().unwrap_or_default();
        let mut node = (innermost.to_string(), OrderByNode::Direction(direction));
        for segment in segments {
            let mut nested = OrderBy::new();
            nested.insert(node.0, node.1);
            node = (segment.to_string(), OrderByNode::Nested(nested));
        }
        result.insert(node.0, node.1);
    }

    check_fields(object, result.keys())?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::standard_objects;

    fn query(order_by: &str) -> QueryParams {
        QueryParams::from([("order_by".to_string(), order_by.to_string())])
    }

    #[test]
    fn test_missing_param_is_empty() -> QueryBuilderResult<()> {
        let company = standard_objects::company();
        assert!(OrderByInputFactory.create(&QueryParams::new(), &company)?.is_empty());
        assert!(OrderByInputFactory.create(&query(""), &company)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_directions_and_default() -> QueryBuilderResult<()> {
        let company = standard_objects::company();
        let order_by = OrderByInputFactory.create(
            &query("name[AscNullsFirst],employees[DescNullsLast],domainName"),
            &company,
        )?;
        let items: Vec<_> = order_by.iter().collect();
        assert_eq!(
            items,
            vec![
                ("name", &OrderByNode::Direction(OrderByDirection::AscNullsFirst)),
                ("employees", &OrderByNode::Direction(OrderByDirection::DescNullsLast)),
                ("domainName", &OrderByNode::Direction(OrderByDirection::AscNullsFirst)),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_single_bare_field_defaults_ascending_nulls_first() -> QueryBuilderResult<()> {
        let company = standard_objects::company();
        assert_eq!(
            OrderByInputFactory.create(&query("name"), &company)?,
            OrderBy::single("name", OrderByDirection::AscNullsFirst)
        );
        Ok(())
    }

    #[test]
    fn test_invalid_direction_message() {
        let company = standard_objects::company();
        let result = OrderByInputFactory.create(&query("name[Up]"), &company);
        assert_eq!(
            result.map_err(|e| e.to_string()),
            Err("'order_by' direction 'Up' invalid. Allowed values are 'AscNullsFirst', 'AscNullsLast', 'DescNullsFirst', 'DescNullsLast'. eg: ?order_by=field_1[AscNullsFirst],field_2[DescNullsLast],field_3".to_string())
        );
    }

    #[test]
    fn test_dotted_path_nests() -> QueryBuilderResult<()> {
        let mut person = standard_objects::person();
        person.fields.push(crm_core::FieldMetadata::new(
            "company",
            crm_core::FieldMetadataType::Relation,
        ));
        let order_by = parse_order_by("company.name[DescNullsLast]", &person)?;
        assert_eq!(
            order_by.get("company"),
            Some(&OrderByNode::Nested(OrderBy::single(
                "name",
                OrderByDirection::DescNullsLast
            )))
        );
        Ok(())
    }

    #[test]
    fn test_last_write_wins_in_place() -> QueryBuilderResult<()> {
        let company = standard_objects::company();
        let order_by = parse_order_by("name[DescNullsFirst],employees,name[AscNullsLast]", &company)?;
        assert_eq!(order_by.keys().collect::<Vec<_>>(), vec!["name", "employees"]);
        assert_eq!(
            order_by.get("name"),
            Some(&OrderByNode::Direction(OrderByDirection::AscNullsLast))
        );
        Ok(())
    }

    #[test]
    fn test_unknown_top_level_field() {
        let company = standard_objects::company();
        assert!(matches!(
            parse_order_by("revenue", &company),
            Err(QueryBuilderError::FieldNotFound { .. })
        ));
    }
}
