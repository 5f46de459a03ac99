//! Utility macros for reducing boilerplate

/// Macro to implement `FromRef<AppState>` for state extractors.
///
/// # Example
/// ```ignore
/// impl_from_ref!(Arc<WorkspaceSchemaCache>, schemas);
/// // Expands to:
/// impl axum::extract::FromRef<AppState> for Arc<WorkspaceSchemaCache> {
///     fn from_ref(state: &AppState) -> Self {
///         state.schemas.clone()
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $type {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
