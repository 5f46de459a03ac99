//! CRM Query - REST Query Builder
//!
//! Turns REST query strings (`filter`, `order_by`, `limit`, `last_cursor`,
//! `depth`), paths and bodies into structured [`crm_core::WorkspaceQuery`]
//! values. Everything here is pure and synchronous.

pub mod builder;
pub mod error;
pub mod factories;
pub mod field_value;
pub mod fields;
pub mod filter_content;
pub mod filter_input;
pub mod inputs;
pub mod order_by_input;
pub mod path;

pub use builder::{RestMethod, RestQuery, RestQueryBuilder, RestRequest};
pub use error::{QueryBuilderError, QueryBuilderResult};
pub use factories::{
    id_filter, CreateQueryFactory, CreateVariables, CreateVariablesFactory, DeleteQueryFactory,
    DeleteVariablesFactory, FindManyQueryFactory, FindOneQueryFactory, GetVariablesFactory,
    UpdateQueryFactory, UpdateVariablesFactory,
};
pub use field_value::format_field_value;
pub use fields::check_fields;
pub use filter_content::parse_filter_content;
pub use filter_input::{parse_filter, FilterInputFactory};
pub use inputs::{DepthInputFactory, LastCursorInputFactory, LimitInputFactory, QueryParams};
pub use order_by_input::{parse_order_by, OrderByInputFactory, DEFAULT_ORDER_DIRECTION};
pub use path::{parse_record_id, parse_rest_path, resolve_object, RestPath};
