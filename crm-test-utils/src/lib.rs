//! CRM Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Metadata fixtures (standard workspace, an object with every field type)
//! - Proptest generators for filter clauses and ordering expressions

pub use crm_core::{
    FeatureFlagKey, FieldMetadata, FieldMetadataType, FilterClause, FilterOperator, FilterValue,
    MetadataError, ObjectMetadataBuilder, ObjectMetadataItem, OrderByDirection,
    WorkspaceMetadata,
};

use uuid::Uuid;

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built metadata for common testing scenarios.

    use super::*;
    use crm_core::standard_objects;
    use serde_json::json;

    /// Workspace id used by fixtures.
    pub const WORKSPACE_ID: Uuid = Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0001);

    /// An object carrying one field of each filterable type.
    pub fn all_types_object() -> ObjectMetadataItem {
        ObjectMetadataBuilder::new("testRecord", "testRecords")
            .custom()
            .field(FieldMetadata::new("fieldText", FieldMetadataType::Text))
            .field(FieldMetadata::new("fieldEmail", FieldMetadataType::Email))
            .field(FieldMetadata::new("fieldPhone", FieldMetadataType::Phone))
            .field(FieldMetadata::new("fieldNumber", FieldMetadataType::Number))
            .field(FieldMetadata::new("fieldPosition", FieldMetadataType::Position))
            .field(FieldMetadata::new("fieldBoolean", FieldMetadataType::Boolean))
            .field(FieldMetadata::new("fieldDateTime", FieldMetadataType::DateTime))
            .field(FieldMetadata::new("fieldUuid", FieldMetadataType::Uuid))
            .field(
                FieldMetadata::new("fieldSelect", FieldMetadataType::Select)
                    .options(["OPTION_A", "OPTION_B", "OPTION_C"])
                    .not_null()
                    .default_value(json!("OPTION_A")),
            )
            .field(FieldMetadata::new("fieldRawJson", FieldMetadataType::RawJson))
            .build()
    }

    /// Standard objects, no feature flags.
    pub fn standard_workspace() -> Result<WorkspaceMetadata, MetadataError> {
        standard_objects::standard_workspace(WORKSPACE_ID, [])
    }

    /// Standard objects with every feature flag enabled.
    pub fn fully_enabled_workspace() -> Result<WorkspaceMetadata, MetadataError> {
        standard_objects::standard_workspace(WORKSPACE_ID, FeatureFlagKey::ALL)
    }

    /// Standard objects plus [`all_types_object`].
    pub fn workspace_with_all_types() -> Result<WorkspaceMetadata, MetadataError> {
        standard_objects::standard_workspace_builder(WORKSPACE_ID)
            .object(all_types_object())
            .build()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for query-building inputs.

    use super::*;
    use proptest::prelude::*;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_order_direction() -> impl Strategy<Value = OrderByDirection> {
        prop::sample::select(OrderByDirection::ALL.to_vec())
    }

    /// Text including the characters significant to the splitter: commas,
    /// parentheses, brackets, colons and both quote kinds.
    pub fn arb_filter_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 ,()\\[\\]:._%'\"-]{0,12}"
    }

    /// A scalar value of the shape the formatter yields for `field_type`.
    pub fn arb_scalar_value(field_type: FieldMetadataType) -> BoxedStrategy<FilterValue> {
        match field_type {
            FieldMetadataType::Number | FieldMetadataType::Position => {
                (-1.0e6..1.0e6f64).prop_map(FilterValue::Number).boxed()
            }
            FieldMetadataType::Boolean => any::<bool>().prop_map(FilterValue::Boolean).boxed(),
            _ => arb_filter_text().prop_map(FilterValue::Text).boxed(),
        }
    }

    pub fn arb_filter_value(
        field_type: FieldMetadataType,
        operator: FilterOperator,
    ) -> BoxedStrategy<FilterValue> {
        match operator {
            FilterOperator::Is => prop_oneof![
                Just(FilterValue::text("NULL")),
                Just(FilterValue::text("NOT_NULL")),
            ]
            .boxed(),
            FilterOperator::In => prop::collection::vec(arb_scalar_value(field_type), 0..4)
                .prop_map(FilterValue::List)
                .boxed(),
            _ => arb_scalar_value(field_type),
        }
    }

    /// A leaf clause on one of `object`'s column fields, with an operator
    /// legal for the field's type.
    pub fn arb_leaf_clause(object: &ObjectMetadataItem) -> impl Strategy<Value = FilterClause> {
        let fields: Vec<(String, FieldMetadataType)> = object
            .column_fields()
            .map(|f| (f.name.clone(), f.field_type))
            .collect();
        prop::sample::select(fields)
            .prop_flat_map(|(name, field_type)| {
                let operators = field_type.allowed_operators().to_vec();
                (Just(name), Just(field_type), prop::sample::select(operators))
            })
            .prop_flat_map(|(name, field_type, operator)| {
                arb_filter_value(field_type, operator)
                    .prop_map(move |value| FilterClause::leaf(name.clone(), operator, value))
            })
    }

    /// A clause tree as the parser produces it: always rooted at a
    /// conjunction, `not` always wrapping exactly one clause.
    pub fn arb_filter_clause(object: &ObjectMetadataItem) -> impl Strategy<Value = FilterClause> {
        arb_leaf_clause(object)
            .prop_recursive(3, 24, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 1..4).prop_map(FilterClause::and),
                    prop::collection::vec(inner.clone(), 1..4).prop_map(FilterClause::or),
                    inner.prop_map(FilterClause::not),
                ]
            })
            .prop_map(|clause| match clause {
                leaf @ FilterClause::Leaf { .. } => FilterClause::and(vec![leaf]),
                composite => composite,
            })
    }

    /// `(field, direction)` items over `object`'s column fields.
    pub fn arb_order_by_items(
        object: &ObjectMetadataItem,
    ) -> impl Strategy<Value = Vec<(String, OrderByDirection)>> {
        let names: Vec<String> = object.column_fields().map(|f| f.name.clone()).collect();
        prop::collection::vec(
            (prop::sample::select(names), arb_order_direction()),
            1..5,
        )
    }
}
