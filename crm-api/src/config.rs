//! API Configuration Module
//!
//! Server, CORS, schema cache and workspace provisioning settings. Loaded
//! from environment variables with defaults suited to local development.

use std::path::PathBuf;

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    /// Example: "https://crm.example.com,https://app.crm.example.com"
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Request Handling
    // ========================================================================
    /// Requests served concurrently before callers queue.
    pub max_concurrent_requests: usize,

    // ========================================================================
    // Workspaces
    // ========================================================================
    /// YAML manifest declaring workspaces, their flags and custom objects.
    pub metadata_path: Option<PathBuf>,

    /// Create workspace schemas and tables on startup and on registration.
    pub sync_workspace_schemas: bool,

    /// Unknown workspace ids get the standard objects on first use.
    pub auto_provision_workspaces: bool,

    /// Workspace schemas kept in memory.
    pub schema_cache_capacity: usize,

    /// Deepest GraphQL selection accepted.
    pub graphql_max_depth: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(), // Empty = allow all
            cors_allow_credentials: false,
            cors_max_age_secs: 86400, // 24 hours

            max_concurrent_requests: 512,

            metadata_path: None,
            sync_workspace_schemas: false,
            auto_provision_workspaces: true,
            schema_cache_capacity: 1024,
            graphql_max_depth: crate::graphql::schema::DEFAULT_MAX_DEPTH,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CRM_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `CRM_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `CRM_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `CRM_MAX_CONCURRENT_REQUESTS`: In-flight request limit (default: 512)
    /// - `CRM_METADATA_PATH`: Workspace manifest file (default: none)
    /// - `CRM_SYNC_WORKSPACE_SCHEMAS`: "true" or "false" (default: false)
    /// - `CRM_AUTO_PROVISION_WORKSPACES`: "true" or "false" (default: true)
    /// - `CRM_SCHEMA_CACHE_CAPACITY`: Cached workspace schemas (default: 1024)
    /// - `CRM_GRAPHQL_MAX_DEPTH`: Selection depth limit (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("CRM_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("CRM_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.cors_allow_credentials);

        let cors_max_age_secs = std::env::var("CRM_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let max_concurrent_requests = std::env::var("CRM_MAX_CONCURRENT_REQUESTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.max_concurrent_requests);

        let metadata_path = std::env::var("CRM_METADATA_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let sync_workspace_schemas = std::env::var("CRM_SYNC_WORKSPACE_SCHEMAS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.sync_workspace_schemas);

        let auto_provision_workspaces = std::env::var("CRM_AUTO_PROVISION_WORKSPACES")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.auto_provision_workspaces);

        let schema_cache_capacity = std::env::var("CRM_SCHEMA_CACHE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.schema_cache_capacity);

        let graphql_max_depth = std::env::var("CRM_GRAPHQL_MAX_DEPTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.graphql_max_depth);

        Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs,
            max_concurrent_requests,
            metadata_path,
            sync_workspace_schemas,
            auto_provision_workspaces,
            schema_cache_capacity,
            graphql_max_depth,
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            // Dev mode: allow all
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.crm.example.com
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{}", pattern));
                }
            }
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(!config.cors_allow_credentials);
        assert_eq!(config.cors_max_age_secs, 86400);
        assert!(config.metadata_path.is_none());
        assert!(!config.sync_workspace_schemas);
        assert!(config.auto_provision_workspaces);
        assert_eq!(config.schema_cache_capacity, 1024);
        assert_eq!(config.graphql_max_depth, 10);
    }

    #[test]
    fn test_is_production() {
        let mut config = ApiConfig::default();
        assert!(!config.is_production());

        config.cors_origins = vec!["https://crm.example.com".to_string()];
        assert!(config.is_production());
    }

    #[test]
    fn test_origin_allowed_dev_mode() {
        let config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.com"));
        assert!(config.is_origin_allowed("http://localhost:3000"));
    }

    #[test]
    fn test_origin_allowed_production() {
        let config = ApiConfig {
            cors_origins: vec![
                "https://crm.example.com".to_string(),
                "https://app.crm.example.com".to_string(),
            ],
            ..ApiConfig::default()
        };

        assert!(config.is_origin_allowed("https://crm.example.com"));
        assert!(config.is_origin_allowed("https://app.crm.example.com"));
        assert!(!config.is_origin_allowed("https://evil.com"));
        assert!(!config.is_origin_allowed("https://notcrm.example.com.evil.com"));
    }

    #[test]
    fn test_wildcard_subdomain() {
        let config = ApiConfig {
            cors_origins: vec!["*.crm.example.com".to_string()],
            ..ApiConfig::default()
        };

        assert!(config.is_origin_allowed("https://app.crm.example.com"));
        assert!(config.is_origin_allowed("https://api.crm.example.com"));
        assert!(!config.is_origin_allowed("https://evilcrm.example.com"));
        assert!(!config.is_origin_allowed("http://app.crm.example.com"));
    }
}
