//! Workspace storage provisioning
//!
//! Renders idempotent DDL for a workspace: its Postgres schema, one table
//! per object and one foreign key per relation. Gated objects get tables
//! too, so delete rules can follow relations whatever the flags say.

use crate::db::DbClient;
use crate::error::ApiResult;
use crate::runner::sql::{quote_ident, schema_name, table_ref, ParamType};
use crm_core::{
    FieldMetadata, OnDeleteAction, RelationMetadata, WorkspaceMetadata, CREATED_AT_FIELD,
    ID_FIELD, UPDATED_AT_FIELD,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Postgres truncates identifiers beyond this length.
const MAX_IDENTIFIER_LEN: usize = 63;

fn column_definition(field: &FieldMetadata) -> String {
    let column = quote_ident(&field.name);
    let column_type = ParamType::for_field(field.field_type).column_type();
    match field.name.as_str() {
        ID_FIELD => format!("{} {} PRIMARY KEY", column, column_type),
        CREATED_AT_FIELD | UPDATED_AT_FIELD => {
            format!("{} {} NOT NULL DEFAULT now()", column, column_type)
        }
        _ => format!("{} {}", column, column_type),
    }
}

fn constraint_name(relation: &RelationMetadata) -> String {
    let mut name = format!("fk_{}_{}", relation.to_object, relation.join_column());
    if name.len() > MAX_IDENTIFIER_LEN {
        let mut end = MAX_IDENTIFIER_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

fn on_delete_clause(action: OnDeleteAction) -> &'static str {
    match action {
        OnDeleteAction::Cascade => "CASCADE",
        OnDeleteAction::SetNull => "SET NULL",
        OnDeleteAction::Restrict => "RESTRICT",
    }
}

/// DDL statements bringing a workspace's storage up to `metadata`.
/// Every statement can be re-run; columns are only ever added.
pub fn workspace_ddl(metadata: &WorkspaceMetadata) -> Vec<String> {
    let schema = schema_name(metadata.workspace_id);
    let mut statements = vec![format!(
        "CREATE SCHEMA IF NOT EXISTS {}",
        quote_ident(&schema)
    )];

    for object in &metadata.objects {
        let table = table_ref(&schema, object);
        let id = object
            .column_fields()
            .find(|f| f.name == ID_FIELD)
            .map(column_definition)
            .unwrap_or_else(|| format!("{} uuid PRIMARY KEY", quote_ident(ID_FIELD)));
        statements.push(format!("CREATE TABLE IF NOT EXISTS {} ({})", table, id));
        for field in object.column_fields().filter(|f| f.name != ID_FIELD) {
            statements.push(format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
                table,
                column_definition(field)
            ));
        }
    }

    for relation in metadata.objects.iter().flat_map(|o| o.dependent_relations()) {
        let (Some(from), Some(to)) = (
            metadata.object(&relation.from_object),
            metadata.object(&relation.to_object),
        ) else {
            continue;
        };
        let name = constraint_name(relation);
        statements.push(format!(
            "DO $$ BEGIN \
             IF NOT EXISTS (SELECT 1 FROM pg_constraint c \
             JOIN pg_namespace n ON n.oid = c.connamespace \
             WHERE c.conname = '{name}' AND n.nspname = '{schema}') THEN \
             ALTER TABLE {to} ADD CONSTRAINT {constraint} FOREIGN KEY ({column}) \
             REFERENCES {from} ({id}) ON DELETE {action}; \
             END IF; END $$",
            name = name,
            schema = schema,
            to = table_ref(&schema, to),
            constraint = quote_ident(&name),
            column = quote_ident(&relation.join_column()),
            from = table_ref(&schema, from),
            id = quote_ident(ID_FIELD),
            action = on_delete_clause(relation.on_delete),
        ));
    }
    statements
}

/// Applies workspace DDL against the database.
#[derive(Clone)]
pub struct WorkspaceManager {
    db: DbClient,
    /// Last metadata version applied per workspace. The mutex serializes
    /// DDL for one workspace.
    synced: Arc<DashMap<Uuid, Arc<Mutex<Option<u64>>>>>,
}

impl WorkspaceManager {
    pub fn new(db: DbClient) -> Self {
        Self {
            db,
            synced: Arc::new(DashMap::new()),
        }
    }

    /// Syncs storage unless this snapshot's version, or a newer one, has
    /// already been applied. Callers run this before querying a workspace.
    pub async fn ensure_synced(&self, metadata: &WorkspaceMetadata) -> ApiResult<()> {
        let lock = Arc::clone(
            self.synced
                .entry(metadata.workspace_id)
                .or_default()
                .value(),
        );
        let mut applied = lock.lock().await;
        if applied.is_some_and(|version| version >= metadata.version) {
            return Ok(());
        }
        self.sync(metadata).await?;
        *applied = Some(metadata.version);
        Ok(())
    }

    /// Creates or extends the workspace's schema and tables in one
    /// transaction.
    pub async fn sync(&self, metadata: &WorkspaceMetadata) -> ApiResult<()> {
        let statements = workspace_ddl(metadata);
        let mut conn = self.db.get_conn().await?;
        let tx = conn.transaction().await?;
        tx.batch_execute(&statements.join(";\n")).await?;
        tx.commit().await?;
        info!(
            workspace_id = %metadata.workspace_id,
            version = metadata.version,
            statements = statements.len(),
            "Workspace storage synchronized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_test_utils::fixtures::fully_enabled_workspace;

    #[test]
    fn test_ddl_creates_schema_first() -> ApiResult<()> {
        let metadata = fully_enabled_workspace()?;
        let ddl = workspace_ddl(&metadata);
        assert_eq!(
            ddl[0],
            format!(
                "CREATE SCHEMA IF NOT EXISTS \"{}\"",
                schema_name(metadata.workspace_id)
            )
        );
        Ok(())
    }

    #[test]
    fn test_ddl_covers_every_object_and_join_column() -> ApiResult<()> {
        let metadata = fully_enabled_workspace()?;
        let ddl = workspace_ddl(&metadata);
        for object in &metadata.objects {
            let table = format!("\"{}\"", object.name_singular);
            assert!(
                ddl.iter()
                    .any(|s| s.starts_with("CREATE TABLE") && s.contains(&table)),
                "missing table for {}",
                object.name_singular
            );
        }
        assert!(ddl
            .iter()
            .any(|s| s.contains("ADD COLUMN IF NOT EXISTS \"companyId\" uuid")));
        assert!(ddl
            .iter()
            .any(|s| s.contains("\"createdAt\" timestamptz NOT NULL DEFAULT now()")));
        Ok(())
    }

    #[test]
    fn test_foreign_keys_carry_delete_action() -> ApiResult<()> {
        let metadata = fully_enabled_workspace()?;
        let ddl = workspace_ddl(&metadata);
        let person_fk = ddl
            .iter()
            .find(|s| s.contains("fk_person_companyId"))
            .cloned()
            .unwrap_or_default();
        assert!(person_fk.contains("ON DELETE SET NULL"));

        let channel_fk = ddl
            .iter()
            .find(|s| s.contains("fk_messageChannel_connectedAccountId"))
            .cloned()
            .unwrap_or_default();
        assert!(channel_fk.contains("ON DELETE CASCADE"));
        Ok(())
    }

    #[test]
    fn test_constraint_names_fit_identifier_limit() -> ApiResult<()> {
        let metadata = fully_enabled_workspace()?;
        for relation in metadata.objects.iter().flat_map(|o| o.dependent_relations()) {
            assert!(constraint_name(relation).len() <= MAX_IDENTIFIER_LEN);
        }
        Ok(())
    }
}
