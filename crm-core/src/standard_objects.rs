//! Standard objects every workspace starts with.

use crate::error::MetadataError;
use crate::metadata::{
    FeatureFlagKey, FieldMetadata, FieldMetadataType, ObjectMetadataBuilder, ObjectMetadataItem,
    OnDeleteAction, RelationDefinition, WorkspaceMetadata, WorkspaceMetadataBuilder,
};
use serde_json::json;
use uuid::Uuid;

use FieldMetadataType::{Boolean, DateTime, Email, Number, Phone, Position, Select, Text};

pub fn workspace_member() -> ObjectMetadataItem {
    ObjectMetadataBuilder::new("workspaceMember", "workspaceMembers")
        .description("A workspace member")
        .system()
        .field(FieldMetadata::new("name", Text).not_null().default_value(json!("")))
        .field(FieldMetadata::new("userEmail", Email).label("User Email"))
        .field(
            FieldMetadata::new("userId", FieldMetadataType::Uuid)
                .label("User Id")
                .description("Associated User Id")
                .not_null(),
        )
        .field(
            FieldMetadata::new("locale", Text)
                .description("Preferred language")
                .not_null()
                .default_value(json!("en")),
        )
        .field(
            FieldMetadata::new("colorScheme", Select)
                .label("Color Scheme")
                .options(["LIGHT", "DARK", "SYSTEM"])
                .not_null()
                .default_value(json!("SYSTEM")),
        )
        .build()
}

pub fn company() -> ObjectMetadataItem {
    ObjectMetadataBuilder::new("company", "companies")
        .labels("Company", "Companies")
        .description("A company")
        .field(
            FieldMetadata::new("name", Text)
                .description("The company name")
                .not_null()
                .default_value(json!("")),
        )
        .field(
            FieldMetadata::new("domainName", Text)
                .label("Domain Name")
                .description("The company website URL. We use this url to fetch the company icon"),
        )
        .field(FieldMetadata::new("address", Text).description("The company address"))
        .field(FieldMetadata::new("employees", Number).description("Number of employees in the company"))
        .field(
            FieldMetadata::new("annualRecurringRevenue", Number)
                .label("ARR")
                .description("Annual Recurring Revenue"),
        )
        .field(
            FieldMetadata::new("idealCustomerProfile", Boolean)
                .label("ICP")
                .description("Ideal Customer Profile")
                .not_null()
                .default_value(json!(false)),
        )
        .field(FieldMetadata::new("position", Position).system())
        .build()
}

pub fn person() -> ObjectMetadataItem {
    ObjectMetadataBuilder::new("person", "people")
        .labels("Person", "People")
        .description("A person")
        .field(FieldMetadata::new("name", Text).description("Contact's name"))
        .field(FieldMetadata::new("email", Email).description("Contact's email"))
        .field(FieldMetadata::new("phone", Phone).description("Contact's phone number"))
        .field(FieldMetadata::new("jobTitle", Text).label("Job Title"))
        .field(FieldMetadata::new("city", Text).description("Contact's city"))
        .field(FieldMetadata::new("position", Position).system())
        .build()
}

pub fn opportunity() -> ObjectMetadataItem {
    ObjectMetadataBuilder::new("opportunity", "opportunities")
        .labels("Opportunity", "Opportunities")
        .description("An opportunity")
        .field(FieldMetadata::new("name", Text).not_null().default_value(json!("")))
        .field(FieldMetadata::new("amount", Number).description("Opportunity amount"))
        .field(FieldMetadata::new("closeDate", DateTime).label("Close date"))
        .field(
            FieldMetadata::new("stage", Select)
                .description("Opportunity stage")
                .options(["NEW", "SCREENING", "MEETING", "PROPOSAL", "CUSTOMER"])
                .not_null()
                .default_value(json!("NEW")),
        )
        .field(FieldMetadata::new("probability", Number).description("Opportunity probability"))
        .field(FieldMetadata::new("position", Position).system())
        .build()
}

pub fn connected_account() -> ObjectMetadataItem {
    ObjectMetadataBuilder::new("connectedAccount", "connectedAccounts")
        .labels("Connected Account", "Connected Accounts")
        .description("A connected account")
        .system()
        .field(
            FieldMetadata::new("handle", Text)
                .description("The account handle (email, username, phone number, etc.)"),
        )
        .field(FieldMetadata::new("provider", Text).description("The account provider"))
        .field(
            FieldMetadata::new("accessToken", Text)
                .label("Access Token")
                .description("Messaging provider access token"),
        )
        .field(
            FieldMetadata::new("refreshToken", Text)
                .label("Refresh Token")
                .description("Messaging provider refresh token"),
        )
        .field(
            FieldMetadata::new("lastSyncHistoryId", Text)
                .label("Last sync history ID")
                .description("Last sync history ID"),
        )
        .build()
}

pub fn message_channel() -> ObjectMetadataItem {
    ObjectMetadataBuilder::new("messageChannel", "messageChannels")
        .labels("Message Channel", "Message Channels")
        .description("Message Channels")
        .system()
        .field(FieldMetadata::new("handle", Text).description("Handle"))
        .field(
            FieldMetadata::new("visibility", Select)
                .options(["METADATA", "SUBJECT", "SHARE_EVERYTHING"])
                .not_null()
                .default_value(json!("SHARE_EVERYTHING")),
        )
        .field(
            FieldMetadata::new("type", Select)
                .options(["EMAIL", "SMS"])
                .not_null()
                .default_value(json!("EMAIL")),
        )
        .field(
            FieldMetadata::new("isContactAutoCreationEnabled", Boolean)
                .label("Is Contact Auto Creation Enabled")
                .not_null()
                .default_value(json!(true)),
        )
        .build()
}

pub fn calendar_channel() -> ObjectMetadataItem {
    ObjectMetadataBuilder::new("calendarChannel", "calendarChannels")
        .labels("Calendar Channel", "Calendar Channels")
        .description("Calendar Channels")
        .system()
        .gated(FeatureFlagKey::IsCalendarEnabled)
        .field(FieldMetadata::new("handle", Text).description("Handle"))
        .field(
            FieldMetadata::new("visibility", Select)
                .options(["METADATA", "SHARE_EVERYTHING"])
                .not_null()
                .default_value(json!("SHARE_EVERYTHING")),
        )
        .field(
            FieldMetadata::new("isContactAutoCreationEnabled", Boolean)
                .label("Is Contact Auto Creation Enabled")
                .not_null()
                .default_value(json!(true)),
        )
        .field(
            FieldMetadata::new("isSyncEnabled", Boolean)
                .label("Is Sync Enabled")
                .not_null()
                .default_value(json!(true)),
        )
        .build()
}

pub fn standard_relations() -> Vec<RelationDefinition> {
    vec![
        RelationDefinition::one_to_many(
            ("company", "people"),
            ("person", "company"),
            OnDeleteAction::SetNull,
        ),
        RelationDefinition::one_to_many(
            ("company", "opportunities"),
            ("opportunity", "company"),
            OnDeleteAction::SetNull,
        ),
        RelationDefinition::one_to_many(
            ("person", "pointOfContactForOpportunities"),
            ("opportunity", "pointOfContact"),
            OnDeleteAction::SetNull,
        ),
        RelationDefinition::one_to_many(
            ("workspaceMember", "accountOwnerForCompanies"),
            ("company", "accountOwner"),
            OnDeleteAction::SetNull,
        ),
        RelationDefinition::one_to_many(
            ("workspaceMember", "connectedAccounts"),
            ("connectedAccount", "accountOwner"),
            OnDeleteAction::Cascade,
        ),
        RelationDefinition::one_to_many(
            ("connectedAccount", "messageChannels"),
            ("messageChannel", "connectedAccount"),
            OnDeleteAction::Cascade,
        ),
        RelationDefinition::one_to_many(
            ("connectedAccount", "calendarChannels"),
            ("calendarChannel", "connectedAccount"),
            OnDeleteAction::Cascade,
        )
        .gated(FeatureFlagKey::IsCalendarEnabled),
    ]
}

pub fn standard_objects() -> Vec<ObjectMetadataItem> {
    vec![
        workspace_member(),
        company(),
        person(),
        opportunity(),
        connected_account(),
        message_channel(),
        calendar_channel(),
    ]
}

/// Builder preloaded with the standard objects and relations, ready for
/// custom additions.
pub fn standard_workspace_builder(workspace_id: Uuid) -> WorkspaceMetadataBuilder {
    let builder = standard_objects()
        .into_iter()
        .fold(WorkspaceMetadataBuilder::new(workspace_id), |b, o| b.object(o));
    standard_relations()
        .into_iter()
        .fold(builder, |b, r| b.relation(r))
}

pub fn standard_workspace(
    workspace_id: Uuid,
    flags: impl IntoIterator<Item = FeatureFlagKey>,
) -> Result<WorkspaceMetadata, MetadataError> {
    standard_workspace_builder(workspace_id)
        .feature_flags(flags)
        .build()
}
