//! SQL rendering for workspace tables
//!
//! Each workspace owns a Postgres schema `workspace_<id>` with one table per
//! object, named after the object's singular name. Statements are rendered
//! with typed placeholders (`$n::uuid`) so parameter types never depend on
//! inference, and rows come back as `to_jsonb` records.

use crate::error::{ApiError, ApiResult, ErrorCode};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use crm_core::{
    Conjunction, Cursor, FieldMetadata, FieldMetadataType, FilterClause, FilterOperator,
    FilterValue, NullCheck, ObjectMetadataItem, OrderBy, OrderByDirection, QueryArgs,
    RecordData, WorkspaceMetadata, ID_FIELD, UPDATED_AT_FIELD,
};
use postgres_types::ToSql;
use serde_json::Value;
use uuid::Uuid;

/// Column alias carrying the whole row as JSON.
pub const RECORD_COLUMN: &str = "__record";
const ROOT_ALIAS: &str = "t";
/// Comparison against a value that is not a number: neither true nor
/// false, so it stays unmatched under `NOT`.
const UNKNOWN: &str = "NULL::boolean";

pub fn schema_name(workspace_id: Uuid) -> String {
    format!("workspace_{}", workspace_id.simple())
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn table_ref(schema: &str, object: &ObjectMetadataItem) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(&object.name_singular))
}

fn column_ref(alias: &str, column: &str) -> String {
    format!("{}.{}", quote_ident(alias), quote_ident(column))
}

// ============================================================================
// PARAMETERS
// ============================================================================

/// Postgres representation of a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Uuid,
    Text,
    Float,
    Bool,
    Timestamp,
    Json,
}

impl ParamType {
    /// Relation fields have no column; their join columns are UUID fields.
    pub fn for_field(field_type: FieldMetadataType) -> Self {
        match field_type {
            FieldMetadataType::Uuid | FieldMetadataType::Relation => ParamType::Uuid,
            FieldMetadataType::Text
            | FieldMetadataType::Email
            | FieldMetadataType::Phone
            | FieldMetadataType::Select => ParamType::Text,
            FieldMetadataType::Number | FieldMetadataType::Position => ParamType::Float,
            FieldMetadataType::Boolean => ParamType::Bool,
            FieldMetadataType::DateTime => ParamType::Timestamp,
            FieldMetadataType::RawJson => ParamType::Json,
        }
    }

    pub fn cast(&self) -> &'static str {
        match self {
            ParamType::Uuid => "uuid",
            ParamType::Text => "text",
            ParamType::Float => "float8",
            ParamType::Bool => "bool",
            ParamType::Timestamp => "timestamptz",
            ParamType::Json => "jsonb",
        }
    }

    /// Column type used in DDL.
    pub fn column_type(&self) -> &'static str {
        match self {
            ParamType::Uuid => "uuid",
            ParamType::Text => "text",
            ParamType::Float => "double precision",
            ParamType::Bool => "boolean",
            ParamType::Timestamp => "timestamptz",
            ParamType::Json => "jsonb",
        }
    }
}

/// A bound statement parameter. `None` payloads bind SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Uuid(Option<Uuid>),
    Text(Option<String>),
    Float(Option<f64>),
    Bool(Option<bool>),
    Timestamp(Option<DateTime<Utc>>),
    Json(Option<Value>),
    UuidList(Vec<Uuid>),
    TextList(Vec<String>),
    FloatList(Vec<f64>),
    TimestampList(Vec<DateTime<Utc>>),
}

impl SqlParam {
    pub fn null(kind: ParamType) -> Self {
        match kind {
            ParamType::Uuid => SqlParam::Uuid(None),
            ParamType::Text => SqlParam::Text(None),
            ParamType::Float => SqlParam::Float(None),
            ParamType::Bool => SqlParam::Bool(None),
            ParamType::Timestamp => SqlParam::Timestamp(None),
            ParamType::Json => SqlParam::Json(None),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            SqlParam::Uuid(None)
                | SqlParam::Text(None)
                | SqlParam::Float(None)
                | SqlParam::Bool(None)
                | SqlParam::Timestamp(None)
                | SqlParam::Json(None)
        )
    }

    fn cast(&self) -> String {
        let (kind, list) = match self {
            SqlParam::Uuid(_) => (ParamType::Uuid, false),
            SqlParam::Text(_) => (ParamType::Text, false),
            SqlParam::Float(_) => (ParamType::Float, false),
            SqlParam::Bool(_) => (ParamType::Bool, false),
            SqlParam::Timestamp(_) => (ParamType::Timestamp, false),
            SqlParam::Json(_) => (ParamType::Json, false),
            SqlParam::UuidList(_) => (ParamType::Uuid, true),
            SqlParam::TextList(_) => (ParamType::Text, true),
            SqlParam::FloatList(_) => (ParamType::Float, true),
            SqlParam::TimestampList(_) => (ParamType::Timestamp, true),
        };
        if list {
            format!("{}[]", kind.cast())
        } else {
            kind.cast().to_string()
        }
    }

    /// Reference usable with tokio_postgres.
    pub fn as_to_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            SqlParam::Uuid(v) => v,
            SqlParam::Text(v) => v,
            SqlParam::Float(v) => v,
            SqlParam::Bool(v) => v,
            SqlParam::Timestamp(v) => v,
            SqlParam::Json(v) => v,
            SqlParam::UuidList(v) => v,
            SqlParam::TextList(v) => v,
            SqlParam::FloatList(v) => v,
            SqlParam::TimestampList(v) => v,
        }
    }

    fn into_list(kind: ParamType, items: Vec<SqlParam>) -> ApiResult<SqlParam> {
        fn collect<T>(
            items: Vec<SqlParam>,
            pick: impl Fn(SqlParam) -> Option<T>,
        ) -> ApiResult<Vec<T>> {
            items
                .into_iter()
                .map(|item| {
                    pick(item).ok_or_else(|| ApiError::invalid_filter("'in' list mixes value types"))
                })
                .collect()
        }

        match kind {
            ParamType::Uuid => collect(items, |p| match p {
                SqlParam::Uuid(v) => v,
                _ => None,
            })
            .map(SqlParam::UuidList),
            ParamType::Text => collect(items, |p| match p {
                SqlParam::Text(v) => v,
                _ => None,
            })
            .map(SqlParam::TextList),
            ParamType::Float => collect(items, |p| match p {
                SqlParam::Float(v) => v,
                _ => None,
            })
            .map(SqlParam::FloatList),
            ParamType::Timestamp => collect(items, |p| match p {
                SqlParam::Timestamp(v) => v,
                _ => None,
            })
            .map(SqlParam::TimestampList),
            ParamType::Bool | ParamType::Json => Err(ApiError::invalid_filter(
                "'in' is not supported for this field type",
            )),
        }
    }
}

/// Parses ISO 8601 date-times, plain dates, and zone-less date-times (UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.with_timezone(&Utc));
    }
    if let Ok(value) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(value.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|value| value.and_utc())
}

/// Converts a stored JSON value into a parameter of `kind`.
pub fn json_param(kind: ParamType, field: &str, value: &Value) -> ApiResult<SqlParam> {
    if value.is_null() {
        return Ok(SqlParam::null(kind));
    }
    let mismatch = || ApiError::invalid_format(field, kind.cast());
    match kind {
        ParamType::Uuid => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(|v| SqlParam::Uuid(Some(v)))
            .ok_or_else(mismatch),
        ParamType::Text => value
            .as_str()
            .map(|s| SqlParam::Text(Some(s.to_string())))
            .ok_or_else(mismatch),
        ParamType::Float => value
            .as_f64()
            .map(|v| SqlParam::Float(Some(v)))
            .ok_or_else(mismatch),
        ParamType::Bool => value
            .as_bool()
            .map(|v| SqlParam::Bool(Some(v)))
            .ok_or_else(mismatch),
        ParamType::Timestamp => value
            .as_str()
            .and_then(parse_timestamp)
            .map(|v| SqlParam::Timestamp(Some(v)))
            .ok_or_else(mismatch),
        ParamType::Json => Ok(SqlParam::Json(Some(value.clone()))),
    }
}

/// Escapes `%`, `_` and `\` for use inside a LIKE pattern.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ============================================================================
// STATEMENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlStatement {
    pub fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(SqlParam::as_to_sql).collect()
    }
}

/// One ordering expression of a read.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderExpr {
    /// Dotted field path, the key of the cursor's order values.
    pub key: String,
    pub expr: String,
    pub direction: OrderByDirection,
    pub kind: ParamType,
}

impl OrderExpr {
    fn tie_breaker(alias: &str) -> Self {
        Self {
            key: ID_FIELD.to_string(),
            expr: column_ref(alias, ID_FIELD),
            direction: OrderByDirection::AscNullsLast,
            kind: ParamType::Uuid,
        }
    }

    fn render(&self) -> String {
        format!(
            "{} {} NULLS {}",
            self.expr,
            if self.direction.is_ascending() { "ASC" } else { "DESC" },
            if self.direction.nulls_first() { "FIRST" } else { "LAST" }
        )
    }
}

/// Statements for one page of a read.
#[derive(Debug, Clone, PartialEq)]
pub struct FindManySql {
    pub select: SqlStatement,
    pub count: SqlStatement,
    /// Cursor keys of the `__order_<i>` columns, in column order.
    pub order_keys: Vec<String>,
    pub limit: u32,
    pub backward: bool,
}

pub fn order_column(index: usize) -> String {
    format!("__order_{}", index)
}

/// Accumulates parameters while rendering one statement.
pub struct SqlBuilder<'m> {
    metadata: &'m WorkspaceMetadata,
    schema: String,
    params: Vec<SqlParam>,
    aliases: usize,
}

impl<'m> SqlBuilder<'m> {
    pub fn new(metadata: &'m WorkspaceMetadata) -> Self {
        Self {
            metadata,
            schema: schema_name(metadata.workspace_id),
            params: Vec::new(),
            aliases: 0,
        }
    }

    pub fn table(&self, object: &ObjectMetadataItem) -> String {
        table_ref(&self.schema, object)
    }

    fn bind(&mut self, param: SqlParam) -> String {
        let cast = param.cast();
        self.params.push(param);
        format!("${}::{}", self.params.len(), cast)
    }

    fn next_alias(&mut self) -> String {
        self.aliases += 1;
        format!("r{}", self.aliases)
    }

    pub fn finish(self, sql: String) -> SqlStatement {
        SqlStatement {
            sql,
            params: self.params,
        }
    }

    // ------------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------------

    /// Renders a filter tree against `alias`. An empty `and` is TRUE, an
    /// empty `or` is FALSE.
    pub fn filter(
        &mut self,
        object: &ObjectMetadataItem,
        clause: &FilterClause,
        alias: &str,
    ) -> ApiResult<String> {
        match clause {
            FilterClause::Leaf {
                field,
                operator,
                value,
            } => self.leaf(object, field, *operator, value, alias),
            FilterClause::Composite {
                conjunction,
                clauses,
            } => {
                let parts = clauses
                    .iter()
                    .map(|c| self.filter(object, c, alias))
                    .collect::<ApiResult<Vec<_>>>()?;
                Ok(match (conjunction, parts.is_empty()) {
                    (Conjunction::And, true) => "TRUE".to_string(),
                    (Conjunction::Or, true) | (Conjunction::Not, true) => "FALSE".to_string(),
                    (Conjunction::And, false) => format!("({})", parts.join(" AND ")),
                    (Conjunction::Or, false) => format!("({})", parts.join(" OR ")),
                    (Conjunction::Not, false) => format!("NOT ({})", parts.join(" AND ")),
                })
            }
        }
    }

    fn leaf(
        &mut self,
        object: &ObjectMetadataItem,
        name: &str,
        operator: FilterOperator,
        value: &FilterValue,
        alias: &str,
    ) -> ApiResult<String> {
        let field = object
            .field(name)
            .filter(|f| !f.is_relation())
            .ok_or_else(|| ApiError::field_not_found(&object.name_singular, name))?;
        if !field.field_type.supports(operator) {
            return Err(ApiError::invalid_filter(format!(
                "Operator '{}' is not supported by field '{}' of type {}",
                operator, field.name, field.field_type
            )));
        }
        let column = column_ref(alias, &field.name);

        match operator {
            FilterOperator::Is => match value.as_text().and_then(NullCheck::parse) {
                Some(NullCheck::Null) => Ok(format!("{} IS NULL", column)),
                Some(NullCheck::NotNull) => Ok(format!("{} IS NOT NULL", column)),
                None => Err(ApiError::invalid_filter(format!(
                    "'is' on '{}' expects NULL or NOT_NULL",
                    field.name
                ))),
            },
            FilterOperator::In => {
                let items: Vec<&FilterValue> = match value {
                    FilterValue::List(items) => items.iter().collect(),
                    single => vec![single],
                };
                let mut params = Vec::with_capacity(items.len());
                let mut unknown = false;
                for item in items {
                    match scalar_param(field, item)? {
                        Some(param) => params.push(param),
                        None => unknown = true,
                    }
                }
                match (params.is_empty(), unknown) {
                    (true, false) => return Ok("FALSE".to_string()),
                    (true, true) => return Ok(UNKNOWN.to_string()),
                    _ => {}
                }
                let list = SqlParam::into_list(ParamType::for_field(field.field_type), params)?;
                let any = format!("{} = ANY({})", column, self.bind(list));
                Ok(if unknown {
                    format!("({} OR {})", any, UNKNOWN)
                } else {
                    any
                })
            }
            FilterOperator::StartsWith => {
                let prefix = value.as_text().ok_or_else(|| {
                    ApiError::invalid_filter(format!("'startsWith' on '{}' expects text", field.name))
                })?;
                let placeholder = self.bind(SqlParam::Text(Some(format!("{}%", escape_like(prefix)))));
                Ok(format!("{} LIKE {}", column, placeholder))
            }
            _ => {
                let Some(param) = scalar_param(field, value)? else {
                    return Ok(UNKNOWN.to_string());
                };
                let op = match operator {
                    FilterOperator::Eq => "=",
                    FilterOperator::Neq => "<>",
                    FilterOperator::Gt => ">",
                    FilterOperator::Gte => ">=",
                    FilterOperator::Lt => "<",
                    FilterOperator::Lte => "<=",
                    FilterOperator::Like => "LIKE",
                    _ => "ILIKE",
                };
                let placeholder = self.bind(param);
                Ok(format!("{} {} {}", column, op, placeholder))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Ordering
    // ------------------------------------------------------------------------

    /// Flattens `order_by` into SQL expressions. Nested paths traverse
    /// many-to-one relations through correlated subqueries.
    pub fn order_terms(
        &mut self,
        object: &ObjectMetadataItem,
        order_by: &OrderBy,
        alias: &str,
    ) -> ApiResult<Vec<OrderExpr>> {
        order_by
            .terms()
            .into_iter()
            .map(|term| {
                let (expr, kind) = self.path_expression(object, &term.path, alias)?;
                Ok(OrderExpr {
                    key: term.path.join("."),
                    expr,
                    direction: term.direction,
                    kind,
                })
            })
            .collect()
    }

    fn path_expression(
        &mut self,
        object: &ObjectMetadataItem,
        path: &[String],
        alias: &str,
    ) -> ApiResult<(String, ParamType)> {
        let (head, rest) = path
            .split_first()
            .ok_or_else(|| ApiError::invalid_order_by("Empty order path"))?;
        let field = object
            .field(head)
            .ok_or_else(|| ApiError::field_not_found(&object.name_singular, head))?;

        if rest.is_empty() {
            if field.is_relation() {
                return Err(ApiError::invalid_order_by(format!(
                    "'{}' is a relation, order by one of its fields instead",
                    head
                )));
            }
            return Ok((
                column_ref(alias, &field.name),
                ParamType::for_field(field.field_type),
            ));
        }

        let link = object
            .relation_for_field(head)
            .filter(|link| link.owns_join_column)
            .ok_or_else(|| {
                ApiError::invalid_order_by(format!(
                    "Cannot order through '{}': only many-to-one relations can be traversed",
                    head
                ))
            })?;
        let metadata = self.metadata;
        let target = metadata
            .object(link.target_object)
            .filter(|o| metadata.is_object_enabled(o))
            .map(|o| metadata.visible_object(o))
            .ok_or_else(|| ApiError::object_not_found(link.target_object))?;
        let join_column = field
            .join_column
            .clone()
            .unwrap_or_else(|| link.relation.join_column());

        let inner_alias = self.next_alias();
        let (inner, kind) = self.path_expression(&target, rest, &inner_alias)?;
        Ok((
            format!(
                "(SELECT {} FROM {} AS {} WHERE {} = {})",
                inner,
                self.table(&target),
                quote_ident(&inner_alias),
                column_ref(&inner_alias, ID_FIELD),
                column_ref(alias, &join_column)
            ),
            kind,
        ))
    }

    /// Keyset condition selecting rows strictly after `cursor` in the order
    /// of `terms`, honoring null placement.
    pub fn cursor_condition(&mut self, terms: &[OrderExpr], cursor: &Cursor) -> ApiResult<String> {
        let mut disjuncts = Vec::with_capacity(terms.len());
        let mut equalities: Vec<String> = Vec::with_capacity(terms.len());

        for term in terms {
            let value = if term.key == ID_FIELD && term.kind == ParamType::Uuid {
                SqlParam::Uuid(Some(cursor.id))
            } else {
                let raw = cursor.order_values.get(&term.key).ok_or_else(|| {
                    ApiError::new(
                        ErrorCode::InvalidCursor,
                        format!("Cursor does not match the requested ordering on '{}'", term.key),
                    )
                })?;
                json_param(term.kind, &term.key, raw)
                    .map_err(|_| ApiError::new(ErrorCode::InvalidCursor, "Cursor value has the wrong type"))?
            };

            let (after, equal) = if value.is_null() {
                let after = if term.direction.nulls_first() {
                    format!("{} IS NOT NULL", term.expr)
                } else {
                    "FALSE".to_string()
                };
                (after, format!("{} IS NULL", term.expr))
            } else {
                let placeholder = self.bind(value);
                let op = if term.direction.is_ascending() { ">" } else { "<" };
                let after = if term.direction.nulls_first() {
                    format!("{} {} {}", term.expr, op, placeholder)
                } else {
                    format!("({} {} {} OR {} IS NULL)", term.expr, op, placeholder, term.expr)
                };
                (after, format!("{} = {}", term.expr, placeholder))
            };

            let mut parts = equalities.clone();
            parts.push(after);
            disjuncts.push(format!("({})", parts.join(" AND ")));
            equalities.push(equal);
        }

        Ok(format!("({})", disjuncts.join(" OR ")))
    }
}

/// Converts one filter value for comparison with `field`. `None` means the
/// comparison is unknown (NaN or an unparsable number) and renders as
/// [`UNKNOWN`].
fn scalar_param(field: &FieldMetadata, value: &FilterValue) -> ApiResult<Option<SqlParam>> {
    let kind = ParamType::for_field(field.field_type);
    let mismatch = || {
        ApiError::invalid_filter(format!(
            "Value '{}' does not match type {} of field '{}'",
            value, field.field_type, field.name
        ))
    };
    match (kind, value) {
        (_, FilterValue::List(_)) => Err(ApiError::invalid_filter(format!(
            "List value for '{}' requires the 'in' operator",
            field.name
        ))),
        (_, FilterValue::Number(n)) if n.is_nan() => Ok(None),
        (ParamType::Uuid, FilterValue::Text(s)) => Uuid::parse_str(s.trim())
            .map(|id| Some(SqlParam::Uuid(Some(id))))
            .map_err(|_| {
                ApiError::invalid_filter(format!(
                    "'{}' is not a valid UUID for field '{}'",
                    s, field.name
                ))
            }),
        (ParamType::Text, FilterValue::Text(s)) => Ok(Some(SqlParam::Text(Some(s.clone())))),
        (ParamType::Text, FilterValue::Number(n)) => Ok(Some(SqlParam::Text(Some(n.to_string())))),
        (ParamType::Text, FilterValue::Boolean(b)) => Ok(Some(SqlParam::Text(Some(b.to_string())))),
        (ParamType::Float, FilterValue::Number(n)) => Ok(Some(SqlParam::Float(Some(*n)))),
        (ParamType::Float, FilterValue::Text(s)) => Ok(s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| !n.is_nan())
            .map(|n| SqlParam::Float(Some(n)))),
        (ParamType::Bool, FilterValue::Boolean(b)) => Ok(Some(SqlParam::Bool(Some(*b)))),
        (ParamType::Bool, FilterValue::Text(s)) => match s.trim() {
            "true" => Ok(Some(SqlParam::Bool(Some(true)))),
            "false" => Ok(Some(SqlParam::Bool(Some(false)))),
            _ => Err(mismatch()),
        },
        (ParamType::Timestamp, FilterValue::Text(s)) => parse_timestamp(s)
            .map(|ts| Some(SqlParam::Timestamp(Some(ts))))
            .ok_or_else(mismatch),
        _ => Err(mismatch()),
    }
}

// ============================================================================
// STATEMENT RENDERING
// ============================================================================

/// One page of `object` plus the total count of the filter.
pub fn find_many(
    metadata: &WorkspaceMetadata,
    object: &ObjectMetadataItem,
    args: &QueryArgs,
) -> ApiResult<FindManySql> {
    let backward = args.pagination.is_backward();
    let limit = args.pagination.page_size();
    let root = quote_ident(ROOT_ALIAS);

    let mut count = SqlBuilder::new(metadata);
    let count_where = match &args.filter {
        Some(filter) => count.filter(object, filter, ROOT_ALIAS)?,
        None => "TRUE".to_string(),
    };
    let count_sql = format!(
        "SELECT count(*) FROM {} AS {} WHERE {}",
        count.table(object),
        root,
        count_where
    );
    let count = count.finish(count_sql);

    let mut builder = SqlBuilder::new(metadata);
    let mut conditions = Vec::new();
    if let Some(filter) = &args.filter {
        conditions.push(builder.filter(object, filter, ROOT_ALIAS)?);
    }

    let mut terms = builder.order_terms(object, &args.order_by, ROOT_ALIAS)?;
    let order_keys: Vec<String> = terms.iter().map(|t| t.key.clone()).collect();
    terms.push(OrderExpr::tie_breaker(ROOT_ALIAS));
    if backward {
        for term in &mut terms {
            term.direction = term.direction.reverse();
        }
    }

    let cursor = if backward {
        args.pagination.before.as_ref()
    } else {
        args.pagination.after.as_ref()
    };
    if let Some(cursor) = cursor {
        conditions.push(builder.cursor_condition(&terms, cursor)?);
    }

    let mut columns = vec![format!("to_jsonb({}) AS {}", root, quote_ident(RECORD_COLUMN))];
    for (index, term) in terms.iter().take(order_keys.len()).enumerate() {
        columns.push(format!(
            "to_jsonb({}) AS {}",
            term.expr,
            quote_ident(&order_column(index))
        ));
    }
    let where_clause = if conditions.is_empty() {
        "TRUE".to_string()
    } else {
        conditions.join(" AND ")
    };
    let order_clause = terms
        .iter()
        .map(OrderExpr::render)
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "SELECT {} FROM {} AS {} WHERE {} ORDER BY {} LIMIT {}",
        columns.join(", "),
        builder.table(object),
        root,
        where_clause,
        order_clause,
        u64::from(limit) + 1
    );

    Ok(FindManySql {
        select: builder.finish(sql),
        count,
        order_keys,
        limit,
        backward,
    })
}

/// First record matching `filter`.
pub fn find_one(
    metadata: &WorkspaceMetadata,
    object: &ObjectMetadataItem,
    filter: Option<&FilterClause>,
) -> ApiResult<SqlStatement> {
    let mut builder = SqlBuilder::new(metadata);
    let condition = match filter {
        Some(filter) => builder.filter(object, filter, ROOT_ALIAS)?,
        None => "TRUE".to_string(),
    };
    let root = quote_ident(ROOT_ALIAS);
    let sql = format!(
        "SELECT to_jsonb({}) AS {} FROM {} AS {} WHERE {} LIMIT 1",
        root,
        quote_ident(RECORD_COLUMN),
        builder.table(object),
        root,
        condition
    );
    Ok(builder.finish(sql))
}

/// Parameters for the columns of `record`, in record order.
fn column_params<'a>(
    object: &'a ObjectMetadataItem,
    record: &'a RecordData,
) -> ApiResult<Vec<(&'a str, SqlParam)>> {
    record
        .iter()
        .map(|(name, value)| {
            let field = object
                .field(name)
                .filter(|f| !f.is_relation())
                .ok_or_else(|| ApiError::field_not_found(&object.name_singular, name))?;
            let param = json_param(ParamType::for_field(field.field_type), name, value)?;
            Ok((name.as_str(), param))
        })
        .collect()
}

pub fn insert(
    metadata: &WorkspaceMetadata,
    object: &ObjectMetadataItem,
    record: &RecordData,
) -> ApiResult<SqlStatement> {
    let mut builder = SqlBuilder::new(metadata);
    let mut columns = Vec::with_capacity(record.len());
    let mut values = Vec::with_capacity(record.len());
    for (name, param) in column_params(object, record)? {
        columns.push(quote_ident(name));
        values.push(builder.bind(param));
    }
    let root = quote_ident(ROOT_ALIAS);
    let sql = format!(
        "INSERT INTO {} AS {} ({}) VALUES ({}) RETURNING to_jsonb({}) AS {}",
        builder.table(object),
        root,
        columns.join(", "),
        values.join(", "),
        root,
        quote_ident(RECORD_COLUMN)
    );
    Ok(builder.finish(sql))
}

/// Updates every record matching `filter`; `updatedAt` is always refreshed.
pub fn update(
    metadata: &WorkspaceMetadata,
    object: &ObjectMetadataItem,
    filter: &FilterClause,
    data: &RecordData,
) -> ApiResult<SqlStatement> {
    let mut builder = SqlBuilder::new(metadata);
    let mut assignments = Vec::with_capacity(data.len() + 1);
    for (name, param) in column_params(object, data)? {
        let placeholder = builder.bind(param);
        assignments.push(format!("{} = {}", quote_ident(name), placeholder));
    }
    assignments.push(format!("{} = now()", quote_ident(UPDATED_AT_FIELD)));
    let condition = builder.filter(object, filter, ROOT_ALIAS)?;
    let root = quote_ident(ROOT_ALIAS);
    let sql = format!(
        "UPDATE {} AS {} SET {} WHERE {} RETURNING to_jsonb({}) AS {}",
        builder.table(object),
        root,
        assignments.join(", "),
        condition,
        root,
        quote_ident(RECORD_COLUMN)
    );
    Ok(builder.finish(sql))
}

/// Ids of the records matching `filter`.
pub fn select_ids(
    metadata: &WorkspaceMetadata,
    object: &ObjectMetadataItem,
    filter: &FilterClause,
) -> ApiResult<SqlStatement> {
    let mut builder = SqlBuilder::new(metadata);
    let condition = builder.filter(object, filter, ROOT_ALIAS)?;
    let sql = format!(
        "SELECT {} FROM {} AS {} WHERE {}",
        column_ref(ROOT_ALIAS, ID_FIELD),
        builder.table(object),
        quote_ident(ROOT_ALIAS),
        condition
    );
    Ok(builder.finish(sql))
}

pub fn delete_by_ids(schema: &str, object: &ObjectMetadataItem, ids: &[Uuid]) -> SqlStatement {
    let root = quote_ident(ROOT_ALIAS);
    SqlStatement {
        sql: format!(
            "DELETE FROM {} AS {} WHERE {} = ANY($1::uuid[]) RETURNING to_jsonb({}) AS {}",
            table_ref(schema, object),
            root,
            column_ref(ROOT_ALIAS, ID_FIELD),
            root,
            quote_ident(RECORD_COLUMN)
        ),
        params: vec![SqlParam::UuidList(ids.to_vec())],
    }
}

/// Ids of `object` records whose `join_column` points at one of `ids`.
pub fn select_dependents(
    schema: &str,
    object: &ObjectMetadataItem,
    join_column: &str,
    ids: &[Uuid],
    limit: Option<u32>,
) -> SqlStatement {
    let limit = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    SqlStatement {
        sql: format!(
            "SELECT {} FROM {} AS {} WHERE {} = ANY($1::uuid[]){}",
            column_ref(ROOT_ALIAS, ID_FIELD),
            table_ref(schema, object),
            quote_ident(ROOT_ALIAS),
            column_ref(ROOT_ALIAS, join_column),
            limit
        ),
        params: vec![SqlParam::UuidList(ids.to_vec())],
    }
}

pub fn clear_join_column(
    schema: &str,
    object: &ObjectMetadataItem,
    join_column: &str,
    ids: &[Uuid],
) -> SqlStatement {
    SqlStatement {
        sql: format!(
            "UPDATE {} AS {} SET {} = NULL, {} = now() WHERE {} = ANY($1::uuid[])",
            table_ref(schema, object),
            quote_ident(ROOT_ALIAS),
            quote_ident(join_column),
            quote_ident(UPDATED_AT_FIELD),
            column_ref(ROOT_ALIAS, join_column)
        ),
        params: vec![SqlParam::UuidList(ids.to_vec())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::{OrderByNode, Pagination};
    use crm_test_utils::fixtures::{standard_workspace, workspace_with_all_types, WORKSPACE_ID};
    use serde_json::json;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn object<'a>(metadata: &'a WorkspaceMetadata, name: &str) -> Result<&'a ObjectMetadataItem, String> {
        metadata.object(name).ok_or_else(|| format!("missing object {}", name))
    }

    #[test]
    fn test_schema_and_identifiers() {
        assert_eq!(
            schema_name(WORKSPACE_ID),
            format!("workspace_{}", WORKSPACE_ID.simple())
        );
        assert_eq!(quote_ident("name"), "\"name\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_leaf_operators() -> TestResult {
        let metadata = workspace_with_all_types()?;
        let record = object(&metadata, "testRecord")?;
        let mut builder = SqlBuilder::new(&metadata);

        let eq = FilterClause::leaf("fieldNumber", FilterOperator::Gte, FilterValue::Number(3.0));
        assert_eq!(
            builder.filter(record, &eq, "t")?,
            "\"t\".\"fieldNumber\" >= $1::float8"
        );

        let is = FilterClause::leaf("fieldText", FilterOperator::Is, FilterValue::text("NOT_NULL"));
        assert_eq!(builder.filter(record, &is, "t")?, "\"t\".\"fieldText\" IS NOT NULL");

        let starts = FilterClause::leaf(
            "fieldText",
            FilterOperator::StartsWith,
            FilterValue::text("50%_off"),
        );
        assert_eq!(builder.filter(record, &starts, "t")?, "\"t\".\"fieldText\" LIKE $2::text");

        let statement = builder.finish(String::new());
        assert_eq!(statement.params[0], SqlParam::Float(Some(3.0)));
        assert_eq!(
            statement.params[1],
            SqlParam::Text(Some("50\\%\\_off%".to_string()))
        );
        Ok(())
    }

    #[test]
    fn test_in_and_nan_never_match() -> TestResult {
        let metadata = workspace_with_all_types()?;
        let record = object(&metadata, "testRecord")?;
        let mut builder = SqlBuilder::new(&metadata);

        let empty = FilterClause::leaf("fieldText", FilterOperator::In, FilterValue::List(vec![]));
        assert_eq!(builder.filter(record, &empty, "t")?, "FALSE");

        let nan = FilterClause::leaf("fieldNumber", FilterOperator::Eq, FilterValue::Number(f64::NAN));
        assert_eq!(builder.filter(record, &nan, "t")?, "NULL::boolean");

        let list = FilterClause::leaf(
            "fieldNumber",
            FilterOperator::In,
            FilterValue::List(vec![FilterValue::Number(1.0), FilterValue::Number(f64::NAN)]),
        );
        assert_eq!(
            builder.filter(record, &list, "t")?,
            "(\"t\".\"fieldNumber\" = ANY($1::float8[]) OR NULL::boolean)"
        );
        assert_eq!(builder.finish(String::new()).params, vec![SqlParam::FloatList(vec![1.0])]);
        Ok(())
    }

    #[test]
    fn test_negated_nan_still_matches_nothing() -> TestResult {
        let metadata = workspace_with_all_types()?;
        let record = object(&metadata, "testRecord")?;
        let mut builder = SqlBuilder::new(&metadata);

        let nan = FilterClause::leaf("fieldNumber", FilterOperator::Gt, FilterValue::Number(f64::NAN));
        assert_eq!(
            builder.filter(record, &FilterClause::not(nan), "t")?,
            "NOT (NULL::boolean)"
        );

        let only_nan = FilterClause::leaf(
            "fieldNumber",
            FilterOperator::In,
            FilterValue::List(vec![FilterValue::Number(f64::NAN)]),
        );
        assert_eq!(
            builder.filter(record, &FilterClause::not(only_nan), "t")?,
            "NOT (NULL::boolean)"
        );
        // An empty list is a definite no-match, so its negation matches.
        let empty = FilterClause::leaf("fieldNumber", FilterOperator::In, FilterValue::List(vec![]));
        assert_eq!(builder.filter(record, &FilterClause::not(empty), "t")?, "NOT (FALSE)");
        Ok(())
    }

    #[test]
    fn test_composites() -> TestResult {
        let metadata = workspace_with_all_types()?;
        let record = object(&metadata, "testRecord")?;
        let mut builder = SqlBuilder::new(&metadata);

        let clause = FilterClause::or(vec![
            FilterClause::leaf("fieldBoolean", FilterOperator::Eq, FilterValue::Boolean(true)),
            FilterClause::not(FilterClause::leaf(
                "fieldText",
                FilterOperator::Is,
                FilterValue::text("NULL"),
            )),
        ]);
        assert_eq!(
            builder.filter(record, &clause, "t")?,
            "(\"t\".\"fieldBoolean\" = $1::bool OR NOT (\"t\".\"fieldText\" IS NULL))"
        );
        assert_eq!(builder.filter(record, &FilterClause::and(vec![]), "t")?, "TRUE");
        assert_eq!(builder.filter(record, &FilterClause::or(vec![]), "t")?, "FALSE");
        Ok(())
    }

    #[test]
    fn test_filter_rejections() -> TestResult {
        let metadata = workspace_with_all_types()?;
        let record = object(&metadata, "testRecord")?;
        let mut builder = SqlBuilder::new(&metadata);

        let unknown = FilterClause::leaf("nope", FilterOperator::Eq, FilterValue::text("x"));
        assert_eq!(
            builder.filter(record, &unknown, "t").err().map(|e| e.code),
            Some(ErrorCode::FieldNotFound)
        );

        let bad_uuid = FilterClause::leaf("fieldUuid", FilterOperator::Eq, FilterValue::text("abc"));
        assert_eq!(
            builder.filter(record, &bad_uuid, "t").err().map(|e| e.code),
            Some(ErrorCode::InvalidFilter)
        );

        let bad_op = FilterClause::leaf("fieldBoolean", FilterOperator::Gt, FilterValue::Boolean(true));
        assert_eq!(
            builder.filter(record, &bad_op, "t").err().map(|e| e.code),
            Some(ErrorCode::InvalidFilter)
        );
        Ok(())
    }

    #[test]
    fn test_find_many_defaults() -> TestResult {
        let metadata = standard_workspace()?;
        let company = object(&metadata, "company")?;
        let sql = find_many(&metadata, company, &QueryArgs::default())?;

        assert_eq!(sql.limit, 60);
        assert!(!sql.backward);
        assert!(sql.order_keys.is_empty());
        assert!(sql.select.sql.ends_with("ORDER BY \"t\".\"id\" ASC NULLS LAST LIMIT 61"));
        assert!(sql.select.sql.contains(&format!(
            "FROM \"{}\".\"company\" AS \"t\"",
            schema_name(WORKSPACE_ID)
        )));
        assert_eq!(sql.count.sql.matches("count(*)").count(), 1);
        Ok(())
    }

    #[test]
    fn test_nested_order_uses_subquery() -> TestResult {
        let metadata = standard_workspace()?;
        let person = object(&metadata, "person")?;
        let mut nested = OrderBy::new();
        nested.insert("name", OrderByNode::Direction(OrderByDirection::DescNullsLast));
        let mut order_by = OrderBy::new();
        order_by.insert("company", OrderByNode::Nested(nested));

        let args = QueryArgs {
            order_by,
            ..QueryArgs::default()
        };
        let sql = find_many(&metadata, person, &args)?;
        assert_eq!(sql.order_keys, vec!["company.name".to_string()]);
        assert!(sql.select.sql.contains(
            "(SELECT \"r1\".\"name\" FROM "
        ));
        assert!(sql.select.sql.contains("WHERE \"r1\".\"id\" = \"t\".\"companyId\") DESC NULLS LAST"));
        assert!(sql.select.sql.contains("AS \"__order_0\""));
        Ok(())
    }

    #[test]
    fn test_order_through_one_to_many_is_rejected() -> TestResult {
        let metadata = standard_workspace()?;
        let company = object(&metadata, "company")?;
        let mut nested = OrderBy::new();
        nested.insert("name", OrderByNode::Direction(OrderByDirection::AscNullsFirst));
        let mut order_by = OrderBy::new();
        order_by.insert("people", OrderByNode::Nested(nested));
        let args = QueryArgs {
            order_by,
            ..QueryArgs::default()
        };
        let err = find_many(&metadata, company, &args).err();
        assert_eq!(err.map(|e| e.code), Some(ErrorCode::InvalidOrderBy));
        Ok(())
    }

    #[test]
    fn test_cursor_condition_respects_null_placement() -> TestResult {
        let metadata = standard_workspace()?;
        let company = object(&metadata, "company")?;
        let id = Uuid::now_v7();

        let mut cursor = Cursor::new(id);
        cursor.order_values.insert("employees".to_string(), Value::Null);
        let args = QueryArgs {
            order_by: OrderBy::single("employees", OrderByDirection::AscNullsFirst),
            pagination: Pagination {
                after: Some(cursor),
                ..Pagination::default()
            },
            ..QueryArgs::default()
        };
        let sql = find_many(&metadata, company, &args)?;
        assert!(sql.select.sql.contains(
            "((\"t\".\"employees\" IS NOT NULL) OR (\"t\".\"employees\" IS NULL AND (\"t\".\"id\" > $1::uuid OR \"t\".\"id\" IS NULL)))"
        ));
        assert_eq!(sql.select.params, vec![SqlParam::Uuid(Some(id))]);
        Ok(())
    }

    #[test]
    fn test_backward_pagination_reverses_order() -> TestResult {
        let metadata = standard_workspace()?;
        let company = object(&metadata, "company")?;
        let mut cursor = Cursor::new(Uuid::now_v7());
        cursor.order_values.insert("name".to_string(), json!("Acme"));
        let args = QueryArgs {
            order_by: OrderBy::single("name", OrderByDirection::AscNullsFirst),
            pagination: Pagination {
                last: Some(5),
                before: Some(cursor),
                ..Pagination::default()
            },
            ..QueryArgs::default()
        };
        let sql = find_many(&metadata, company, &args)?;
        assert!(sql.backward);
        assert!(sql
            .select
            .sql
            .contains("ORDER BY \"t\".\"name\" DESC NULLS LAST, \"t\".\"id\" DESC NULLS FIRST LIMIT 6"));
        assert!(sql.select.sql.contains("(\"t\".\"name\" < $1::text OR \"t\".\"name\" IS NULL)"));
        Ok(())
    }

    #[test]
    fn test_cursor_must_match_ordering() -> TestResult {
        let metadata = standard_workspace()?;
        let company = object(&metadata, "company")?;
        let args = QueryArgs {
            order_by: OrderBy::single("name", OrderByDirection::AscNullsFirst),
            pagination: Pagination {
                after: Some(Cursor::new(Uuid::now_v7())),
                ..Pagination::default()
            },
            ..QueryArgs::default()
        };
        let err = find_many(&metadata, company, &args).err();
        assert_eq!(err.map(|e| e.code), Some(ErrorCode::InvalidCursor));
        Ok(())
    }

    #[test]
    fn test_insert_and_update() -> TestResult {
        let metadata = standard_workspace()?;
        let company = object(&metadata, "company")?;
        let id = Uuid::now_v7();
        let mut record = RecordData::new();
        record.insert("id".to_string(), json!(id.to_string()));
        record.insert("name".to_string(), json!("Acme"));
        record.insert("employees".to_string(), Value::Null);

        let insert = insert(&metadata, company, &record)?;
        assert!(insert.sql.contains("(\"id\", \"name\", \"employees\") VALUES ($1::uuid, $2::text, $3::float8)"));
        assert_eq!(insert.params[2], SqlParam::Float(None));

        let mut data = RecordData::new();
        data.insert("name".to_string(), json!("Acme 2"));
        let filter = FilterClause::leaf("id", FilterOperator::Eq, FilterValue::text(id.to_string()));
        let update = update(&metadata, company, &filter, &data)?;
        assert!(update.sql.contains("SET \"name\" = $1::text, \"updatedAt\" = now() WHERE \"t\".\"id\" = $2::uuid"));
        Ok(())
    }

    #[test]
    fn test_relation_fields_are_not_columns() -> TestResult {
        let metadata = standard_workspace()?;
        let person = object(&metadata, "person")?;
        let mut record = RecordData::new();
        record.insert("company".to_string(), json!({}));
        let err = insert(&metadata, person, &record).err();
        assert_eq!(err.map(|e| e.code), Some(ErrorCode::FieldNotFound));
        Ok(())
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-03-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2024-03-01T10:00:00.123").is_some());
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
