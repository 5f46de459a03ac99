//! Workspace metadata model
//!
//! Objects, fields, relations and feature gates describing one workspace's
//! data model. Snapshots are immutable once built; changes produce a new
//! snapshot with a bumped version.

use crate::error::{MetadataError, ParseEnumError};
use crate::filter::FilterOperator;
use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Name of the primary key field every object carries.
pub const ID_FIELD: &str = "id";
/// Creation timestamp field every object carries.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Modification timestamp field every object carries.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

const MAX_NAME_LEN: usize = 63;

// ============================================================================
// FEATURE FLAGS
// ============================================================================

/// Workspace feature flags gating objects and fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureFlagKey {
    IsCalendarEnabled,
    IsMessagingEnabled,
    IsWorkspaceFavoriteEnabled,
}

impl FeatureFlagKey {
    pub const ALL: [FeatureFlagKey; 3] = [
        FeatureFlagKey::IsCalendarEnabled,
        FeatureFlagKey::IsMessagingEnabled,
        FeatureFlagKey::IsWorkspaceFavoriteEnabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureFlagKey::IsCalendarEnabled => "IS_CALENDAR_ENABLED",
            FeatureFlagKey::IsMessagingEnabled => "IS_MESSAGING_ENABLED",
            FeatureFlagKey::IsWorkspaceFavoriteEnabled => "IS_WORKSPACE_FAVORITE_ENABLED",
        }
    }
}

impl fmt::Display for FeatureFlagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureFlagKey {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|flag| flag.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("feature flag", s))
    }
}

/// Set of flags enabled for a workspace.
pub type FeatureFlags = BTreeSet<FeatureFlagKey>;

// ============================================================================
// FIELD METADATA
// ============================================================================

/// Storage and comparison type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldMetadataType {
    Uuid,
    Text,
    Email,
    Phone,
    Number,
    Boolean,
    DateTime,
    Select,
    Position,
    RawJson,
    Relation,
}

impl FieldMetadataType {
    pub const ALL: [FieldMetadataType; 11] = [
        FieldMetadataType::Uuid,
        FieldMetadataType::Text,
        FieldMetadataType::Email,
        FieldMetadataType::Phone,
        FieldMetadataType::Number,
        FieldMetadataType::Boolean,
        FieldMetadataType::DateTime,
        FieldMetadataType::Select,
        FieldMetadataType::Position,
        FieldMetadataType::RawJson,
        FieldMetadataType::Relation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldMetadataType::Uuid => "UUID",
            FieldMetadataType::Text => "TEXT",
            FieldMetadataType::Email => "EMAIL",
            FieldMetadataType::Phone => "PHONE",
            FieldMetadataType::Number => "NUMBER",
            FieldMetadataType::Boolean => "BOOLEAN",
            FieldMetadataType::DateTime => "DATE_TIME",
            FieldMetadataType::Select => "SELECT",
            FieldMetadataType::Position => "POSITION",
            FieldMetadataType::RawJson => "RAW_JSON",
            FieldMetadataType::Relation => "RELATION",
        }
    }

    /// Comparison operators a filter may apply to a field of this type.
    pub fn allowed_operators(&self) -> &'static [FilterOperator] {
        use FilterOperator::*;
        match self {
            FieldMetadataType::Text | FieldMetadataType::Email | FieldMetadataType::Phone => {
                &[Eq, Neq, In, Is, Like, Ilike, StartsWith]
            }
            FieldMetadataType::Number
            | FieldMetadataType::Position
            | FieldMetadataType::DateTime => &[Eq, Neq, Gt, Gte, Lt, Lte, In, Is],
            FieldMetadataType::Uuid | FieldMetadataType::Select => &[Eq, Neq, In, Is],
            FieldMetadataType::Boolean => &[Eq, Neq, Is],
            FieldMetadataType::RawJson => &[Is],
            FieldMetadataType::Relation => &[],
        }
    }

    pub fn supports(&self, operator: FilterOperator) -> bool {
        self.allowed_operators().contains(&operator)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldMetadataType::Number | FieldMetadataType::Position)
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            FieldMetadataType::Text | FieldMetadataType::Email | FieldMetadataType::Phone
        )
    }
}

impl fmt::Display for FieldMetadataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldMetadataType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("field type", s))
    }
}

/// One allowed value of a SELECT field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub position: u32,
}

/// A field of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldMetadataType,
    pub is_nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<FeatureFlagKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    /// Foreign key column backing a relation field on the side that owns it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_column: Option<String>,
}

impl FieldMetadata {
    pub fn new(name: impl Into<String>, field_type: FieldMetadataType) -> Self {
        let name = name.into();
        Self {
            id: Uuid::now_v7(),
            label: name.to_case(Case::Title),
            name,
            description: None,
            field_type,
            is_nullable: true,
            default_value: None,
            is_system: false,
            is_custom: false,
            gate: None,
            options: Vec::new(),
            join_column: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    pub fn custom(mut self) -> Self {
        self.is_custom = true;
        self
    }

    pub fn gated(mut self, flag: FeatureFlagKey) -> Self {
        self.gate = Some(flag);
        self
    }

    pub fn options<'a>(mut self, values: impl IntoIterator<Item = &'a str>) -> Self {
        self.options = values
            .into_iter()
            .enumerate()
            .map(|(position, value)| SelectOption {
                value: value.to_string(),
                label: value.to_lowercase().to_case(Case::Title),
                position: position as u32,
            })
            .collect();
        self
    }

    pub fn join_column(mut self, column: impl Into<String>) -> Self {
        self.join_column = Some(column.into());
        self
    }

    pub fn is_relation(&self) -> bool {
        self.field_type == FieldMetadataType::Relation
    }

    /// Fields maintained by the runner and never accepted as input.
    pub fn is_read_only(&self) -> bool {
        self.name == CREATED_AT_FIELD || self.name == UPDATED_AT_FIELD
    }

    /// Whether a create may omit this field.
    pub fn is_optional_on_create(&self) -> bool {
        self.is_nullable
            || self.default_value.is_some()
            || self.name == ID_FIELD
            || self.is_read_only()
    }

    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|o| o.value == value)
    }

    pub fn is_enabled(&self, flags: &FeatureFlags) -> bool {
        self.gate.map_or(true, |flag| flags.contains(&flag))
    }
}

// ============================================================================
// RELATION METADATA
// ============================================================================

/// Cardinality of a relation, stated from its "from" side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    OneToMany,
    OneToOne,
}

/// What happens to dependent records when the "from" record is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnDeleteAction {
    Cascade,
    SetNull,
    Restrict,
}

/// Cardinality of a relation as seen from one of its sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationDirection {
    OneToMany,
    ManyToOne,
    OneToOne,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationMetadata {
    pub id: Uuid,
    pub relation_type: RelationType,
    pub from_object: String,
    pub from_field: String,
    pub to_object: String,
    pub to_field: String,
    pub on_delete: OnDeleteAction,
}

impl RelationMetadata {
    /// Column on the "to" object holding the "from" record id.
    pub fn join_column(&self) -> String {
        format!("{}Id", self.to_field)
    }
}

/// A relation resolved against one of its sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationLink<'a> {
    pub relation: &'a RelationMetadata,
    pub direction: RelationDirection,
    pub target_object: &'a str,
    pub target_field: &'a str,
    /// True when this side stores the join column.
    pub owns_join_column: bool,
}

impl RelationLink<'_> {
    /// Whether the relation yields at most one record from this side.
    pub fn is_single(&self) -> bool {
        self.direction != RelationDirection::OneToMany
    }
}

// ============================================================================
// OBJECT METADATA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadataItem {
    pub id: Uuid,
    pub name_singular: String,
    pub name_plural: String,
    pub label_singular: String,
    pub label_plural: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<FieldMetadata>,
    #[serde(default)]
    pub relations: Vec<RelationMetadata>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_custom: bool,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<FeatureFlagKey>,
}

impl ObjectMetadataItem {
    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Fields stored as table columns (everything except relation fields).
    pub fn column_fields(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.fields.iter().filter(|f| !f.is_relation())
    }

    pub fn relation_for_field(&self, field_name: &str) -> Option<RelationLink<'_>> {
        self.relations.iter().find_map(|relation| {
            let one_to_one = relation.relation_type == RelationType::OneToOne;
            if relation.from_object == self.name_singular && relation.from_field == field_name {
                Some(RelationLink {
                    relation,
                    direction: if one_to_one {
                        RelationDirection::OneToOne
                    } else {
                        RelationDirection::OneToMany
                    },
                    target_object: &relation.to_object,
                    target_field: &relation.to_field,
                    owns_join_column: false,
                })
            } else if relation.to_object == self.name_singular && relation.to_field == field_name {
                Some(RelationLink {
                    relation,
                    direction: if one_to_one {
                        RelationDirection::OneToOne
                    } else {
                        RelationDirection::ManyToOne
                    },
                    target_object: &relation.from_object,
                    target_field: &relation.from_field,
                    owns_join_column: true,
                })
            } else {
                None
            }
        })
    }

    /// Relations where this object is the "from" side and deletes must
    /// propagate to dependents.
    pub fn dependent_relations(&self) -> impl Iterator<Item = &RelationMetadata> {
        self.relations
            .iter()
            .filter(|r| r.from_object == self.name_singular)
    }

    pub fn is_enabled(&self, flags: &FeatureFlags) -> bool {
        self.is_active && self.gate.map_or(true, |flag| flags.contains(&flag))
    }
}

/// Incremental construction of an [`ObjectMetadataItem`].
///
/// Base fields (`id`, `createdAt`, `updatedAt`) are added up front.
#[derive(Debug, Clone)]
pub struct ObjectMetadataBuilder {
    item: ObjectMetadataItem,
}

impl ObjectMetadataBuilder {
    pub fn new(name_singular: impl Into<String>, name_plural: impl Into<String>) -> Self {
        let name_singular = name_singular.into();
        let name_plural = name_plural.into();
        Self {
            item: ObjectMetadataItem {
                id: Uuid::now_v7(),
                label_singular: name_singular.to_case(Case::Title),
                label_plural: name_plural.to_case(Case::Title),
                name_singular,
                name_plural,
                description: None,
                fields: base_fields(),
                relations: Vec::new(),
                is_system: false,
                is_custom: false,
                is_active: true,
                gate: None,
            },
        }
    }

    pub fn labels(mut self, singular: impl Into<String>, plural: impl Into<String>) -> Self {
        self.item.label_singular = singular.into();
        self.item.label_plural = plural.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.item.description = Some(description.into());
        self
    }

    pub fn system(mut self) -> Self {
        self.item.is_system = true;
        self
    }

    pub fn custom(mut self) -> Self {
        self.item.is_custom = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.item.is_active = false;
        self
    }

    pub fn gated(mut self, flag: FeatureFlagKey) -> Self {
        self.item.gate = Some(flag);
        self
    }

    pub fn field(mut self, field: FieldMetadata) -> Self {
        self.item.fields.push(field);
        self
    }

    pub fn build(self) -> ObjectMetadataItem {
        self.item
    }
}

fn base_fields() -> Vec<FieldMetadata> {
    vec![
        FieldMetadata::new(ID_FIELD, FieldMetadataType::Uuid)
            .label("Id")
            .not_null(),
        FieldMetadata::new(CREATED_AT_FIELD, FieldMetadataType::DateTime)
            .label("Creation date")
            .not_null(),
        FieldMetadata::new(UPDATED_AT_FIELD, FieldMetadataType::DateTime)
            .label("Update date")
            .not_null(),
    ]
}

// ============================================================================
// DEFINITIONS (declarative input for builders)
// ============================================================================

/// Declarative relation between two objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDefinition {
    #[serde(default = "default_relation_type")]
    pub relation_type: RelationType,
    pub from_object: String,
    pub from_field: String,
    pub to_object: String,
    pub to_field: String,
    #[serde(default = "default_on_delete")]
    pub on_delete: OnDeleteAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<FeatureFlagKey>,
}

fn default_relation_type() -> RelationType {
    RelationType::OneToMany
}

fn default_on_delete() -> OnDeleteAction {
    OnDeleteAction::SetNull
}

impl RelationDefinition {
    pub fn one_to_many(
        from: (&str, &str),
        to: (&str, &str),
        on_delete: OnDeleteAction,
    ) -> Self {
        Self {
            relation_type: RelationType::OneToMany,
            from_object: from.0.to_string(),
            from_field: from.1.to_string(),
            to_object: to.0.to_string(),
            to_field: to.1.to_string(),
            on_delete,
            gate: None,
        }
    }

    pub fn gated(mut self, flag: FeatureFlagKey) -> Self {
        self.gate = Some(flag);
        self
    }
}

/// Declarative non-relation field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldMetadataType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<FeatureFlagKey>,
}

fn default_true() -> bool {
    true
}

impl FieldDefinition {
    fn into_metadata(self, custom: bool) -> FieldMetadata {
        let mut field = FieldMetadata::new(self.name, self.field_type)
            .options(self.options.iter().map(String::as_str));
        if let Some(label) = self.label {
            field = field.label(label);
        }
        field.description = self.description;
        field.is_nullable = self.nullable;
        field.default_value = self.default_value;
        field.gate = self.gate;
        field.is_custom = custom;
        field
    }
}

/// Declarative object, as loaded from a manifest or a metadata request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDefinition {
    pub name_singular: String,
    pub name_plural: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_singular: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_plural: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<FeatureFlagKey>,
}

impl ObjectDefinition {
    pub fn into_metadata(self, custom: bool) -> ObjectMetadataItem {
        let mut builder = ObjectMetadataBuilder::new(self.name_singular, self.name_plural);
        if let (Some(singular), Some(plural)) = (self.label_singular, self.label_plural) {
            builder = builder.labels(singular, plural);
        }
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        if let Some(flag) = self.gate {
            builder = builder.gated(flag);
        }
        if custom {
            builder = builder.custom();
        }
        for field in self.fields {
            builder = builder.field(field.into_metadata(custom));
        }
        builder.build()
    }
}

// ============================================================================
// WORKSPACE METADATA
// ============================================================================

/// The object metadata collection of one workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMetadata {
    pub workspace_id: Uuid,
    pub version: u64,
    pub objects: Vec<ObjectMetadataItem>,
    #[serde(default)]
    pub feature_flags: FeatureFlags,
}

impl WorkspaceMetadata {
    pub fn object(&self, name_singular: &str) -> Option<&ObjectMetadataItem> {
        self.objects.iter().find(|o| o.name_singular == name_singular)
    }

    pub fn object_by_plural(&self, name_plural: &str) -> Option<&ObjectMetadataItem> {
        self.objects.iter().find(|o| o.name_plural == name_plural)
    }

    pub fn is_flag_enabled(&self, flag: FeatureFlagKey) -> bool {
        self.feature_flags.contains(&flag)
    }

    pub fn is_object_enabled(&self, object: &ObjectMetadataItem) -> bool {
        object.is_enabled(&self.feature_flags)
    }

    /// A field is exposed when its gate is open and, for relation fields,
    /// the object on the other side is exposed too.
    pub fn is_field_enabled(&self, object: &ObjectMetadataItem, field: &FieldMetadata) -> bool {
        if !field.is_enabled(&self.feature_flags) {
            return false;
        }
        if !field.is_relation() {
            return true;
        }
        object
            .relation_for_field(&field.name)
            .and_then(|link| self.object(link.target_object))
            .is_some_and(|target| self.is_object_enabled(target))
    }

    /// Objects visible to the workspace's API surface.
    pub fn enabled_objects(&self) -> impl Iterator<Item = &ObjectMetadataItem> {
        self.objects.iter().filter(|o| self.is_object_enabled(o))
    }

    /// Fields of `object` visible to the workspace's API surface.
    pub fn enabled_fields<'a>(
        &'a self,
        object: &'a ObjectMetadataItem,
    ) -> impl Iterator<Item = &'a FieldMetadata> + 'a {
        object
            .fields
            .iter()
            .filter(move |f| self.is_field_enabled(object, f))
    }

    /// Copy of `object` restricted to its enabled fields.
    pub fn visible_object(&self, object: &ObjectMetadataItem) -> ObjectMetadataItem {
        let mut visible = object.clone();
        visible.fields.retain(|f| self.is_field_enabled(object, f));
        visible
    }

    /// Enabled object by plural name, projected to its enabled fields.
    pub fn visible_object_by_plural(&self, name_plural: &str) -> Option<ObjectMetadataItem> {
        self.object_by_plural(name_plural)
            .filter(|o| self.is_object_enabled(o))
            .map(|o| self.visible_object(o))
    }

    /// Returns a new snapshot with `definition` registered as a custom object
    /// and `relations` attached. The version is bumped.
    pub fn with_custom_object(
        &self,
        definition: ObjectDefinition,
        relations: Vec<RelationDefinition>,
    ) -> Result<WorkspaceMetadata, MetadataError> {
        let mut next = self.clone();
        if next.object(&definition.name_singular).is_some()
            || next.object_by_plural(&definition.name_plural).is_some()
        {
            return Err(MetadataError::DuplicateObject {
                name: definition.name_singular,
            });
        }
        next.objects.push(definition.into_metadata(true));
        for relation in relations {
            attach_relation(&mut next.objects, relation, true)?;
        }
        next.version = self.version + 1;
        next.validate()?;
        Ok(next)
    }

    /// Returns a new snapshot with `flag` switched on or off. The version is
    /// bumped only when the flag set actually changes.
    pub fn with_feature_flag(&self, flag: FeatureFlagKey, enabled: bool) -> WorkspaceMetadata {
        let mut next = self.clone();
        let changed = if enabled {
            next.feature_flags.insert(flag)
        } else {
            next.feature_flags.remove(&flag)
        };
        if changed {
            next.version = self.version + 1;
        }
        next
    }

    /// Checks naming, uniqueness and relation consistency.
    pub fn validate(&self) -> Result<(), MetadataError> {
        let mut singular = HashSet::new();
        let mut plural = HashSet::new();
        for object in &self.objects {
            validate_name(&object.name_singular)?;
            validate_name(&object.name_plural)?;
            if !singular.insert(object.name_singular.as_str())
                || !plural.insert(object.name_plural.as_str())
            {
                return Err(MetadataError::DuplicateObject {
                    name: object.name_singular.clone(),
                });
            }
        }

        for object in &self.objects {
            let mut names = HashSet::new();
            for field in &object.fields {
                validate_name(&field.name)?;
                if !names.insert(field.name.as_str()) {
                    return Err(MetadataError::DuplicateField {
                        object: object.name_singular.clone(),
                        field: field.name.clone(),
                    });
                }
                if field.field_type == FieldMetadataType::Select {
                    if field.options.is_empty() {
                        return Err(MetadataError::MissingSelectOptions {
                            object: object.name_singular.clone(),
                            field: field.name.clone(),
                        });
                    }
                    for option in &field.options {
                        validate_enum_value(&option.value)?;
                    }
                }
                if field.is_relation() {
                    self.validate_relation_field(object, field)?;
                }
            }
        }
        Ok(())
    }

    fn validate_relation_field(
        &self,
        object: &ObjectMetadataItem,
        field: &FieldMetadata,
    ) -> Result<(), MetadataError> {
        let inconsistent = |reason: String| MetadataError::InconsistentRelation {
            object: object.name_singular.clone(),
            field: field.name.clone(),
            reason,
        };

        let link = object.relation_for_field(&field.name).ok_or_else(|| {
            MetadataError::OrphanRelationField {
                object: object.name_singular.clone(),
                field: field.name.clone(),
            }
        })?;
        let target =
            self.object(link.target_object)
                .ok_or_else(|| MetadataError::RelationTargetMissing {
                    object: object.name_singular.clone(),
                    field: field.name.clone(),
                    target: link.target_object.to_string(),
                })?;

        let inverse = target
            .field(link.target_field)
            .filter(|f| f.is_relation())
            .ok_or_else(|| {
                inconsistent(format!(
                    "inverse field '{}' is not a relation on '{}'",
                    link.target_field, target.name_singular
                ))
            })?;

        let (owner, owner_field) = if link.owns_join_column {
            (object, field)
        } else {
            (target, inverse)
        };
        let expected = link.relation.join_column();
        if owner_field.join_column.as_deref() != Some(expected.as_str()) {
            return Err(inconsistent(format!(
                "join column '{}' missing on '{}.{}'",
                expected, owner.name_singular, owner_field.name
            )));
        }
        match owner.field(&expected) {
            Some(column) if column.field_type == FieldMetadataType::Uuid => Ok(()),
            _ => Err(inconsistent(format!(
                "join column '{}' is not a UUID field on '{}'",
                expected, owner.name_singular
            ))),
        }
    }
}

/// Builds a validated [`WorkspaceMetadata`] from objects and relations.
#[derive(Debug, Clone)]
pub struct WorkspaceMetadataBuilder {
    workspace_id: Uuid,
    version: u64,
    objects: Vec<ObjectMetadataItem>,
    relations: Vec<RelationDefinition>,
    feature_flags: FeatureFlags,
}

impl WorkspaceMetadataBuilder {
    pub fn new(workspace_id: Uuid) -> Self {
        Self {
            workspace_id,
            version: 1,
            objects: Vec::new(),
            relations: Vec::new(),
            feature_flags: FeatureFlags::new(),
        }
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn object(mut self, object: ObjectMetadataItem) -> Self {
        self.objects.push(object);
        self
    }

    pub fn relation(mut self, relation: RelationDefinition) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn feature_flag(mut self, flag: FeatureFlagKey) -> Self {
        self.feature_flags.insert(flag);
        self
    }

    pub fn feature_flags(mut self, flags: impl IntoIterator<Item = FeatureFlagKey>) -> Self {
        self.feature_flags.extend(flags);
        self
    }

    pub fn build(self) -> Result<WorkspaceMetadata, MetadataError> {
        let mut objects = self.objects;
        for relation in self.relations {
            attach_relation(&mut objects, relation, false)?;
        }
        let metadata = WorkspaceMetadata {
            workspace_id: self.workspace_id,
            version: self.version,
            objects,
            feature_flags: self.feature_flags,
        };
        metadata.validate()?;
        Ok(metadata)
    }
}

/// Adds the relation fields, join column and relation metadata to both sides.
fn attach_relation(
    objects: &mut [ObjectMetadataItem],
    definition: RelationDefinition,
    custom: bool,
) -> Result<(), MetadataError> {
    let from_idx = position_of(objects, &definition.from_object)?;
    let to_idx = position_of(objects, &definition.to_object)?;

    let relation = RelationMetadata {
        id: Uuid::now_v7(),
        relation_type: definition.relation_type,
        from_object: definition.from_object.clone(),
        from_field: definition.from_field.clone(),
        to_object: definition.to_object.clone(),
        to_field: definition.to_field.clone(),
        on_delete: definition.on_delete,
    };
    let join_column = relation.join_column();

    let mut from_field = FieldMetadata::new(&definition.from_field, FieldMetadataType::Relation);
    let mut to_field = FieldMetadata::new(&definition.to_field, FieldMetadataType::Relation)
        .join_column(&join_column);
    let mut join_field = FieldMetadata::new(&join_column, FieldMetadataType::Uuid)
        .label(format!("{} id (foreign key)", definition.to_field.to_case(Case::Title)))
        .system();
    for field in [&mut from_field, &mut to_field, &mut join_field] {
        field.gate = definition.gate;
        field.is_custom = custom;
    }

    objects[from_idx].fields.push(from_field);
    objects[to_idx].fields.push(to_field);
    objects[to_idx].fields.push(join_field);
    objects[from_idx].relations.push(relation.clone());
    if from_idx != to_idx {
        objects[to_idx].relations.push(relation);
    }
    Ok(())
}

fn position_of(objects: &[ObjectMetadataItem], name: &str) -> Result<usize, MetadataError> {
    objects
        .iter()
        .position(|o| o.name_singular == name)
        .ok_or_else(|| MetadataError::UnknownObject {
            name: name.to_string(),
        })
}

/// Object and field names: camelCase ASCII, usable as quoted identifiers and
/// GraphQL names.
fn validate_name(name: &str) -> Result<(), MetadataError> {
    let invalid = |reason: &str| MetadataError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        Some(_) => return Err(invalid("must start with a lowercase letter")),
        None => return Err(invalid("must not be empty")),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("must be alphanumeric"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("is too long"));
    }
    Ok(())
}

fn validate_enum_value(value: &str) -> Result<(), MetadataError> {
    let mut chars = value.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MetadataError::InvalidName {
            name: value.to_string(),
            reason: "select option values must be GraphQL enum names".to_string(),
        })
    }
}
