//! Pagination and expansion query parameters.

use crate::error::{QueryBuilderError, QueryBuilderResult};
use crm_core::{Cursor, DEFAULT_DEPTH, DEFAULT_PAGE_SIZE, MAX_DEPTH, MAX_PAGE_SIZE};
use std::collections::HashMap;

/// Decoded query string of a REST request.
pub type QueryParams = HashMap<String, String>;

/// Reads `limit`, defaulting to 60 and capping at 200.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitInputFactory;

impl LimitInputFactory {
    pub fn create(&self, query: &QueryParams) -> QueryBuilderResult<u32> {
        let Some(raw) = query.get("limit") else {
            return Ok(DEFAULT_PAGE_SIZE);
        };
        match raw.trim().parse::<u32>() {
            Ok(limit) if limit > 0 => Ok(limit.min(MAX_PAGE_SIZE)),
            _ => Err(QueryBuilderError::InvalidLimit { value: raw.clone() }),
        }
    }
}

/// Reads `last_cursor`, the end cursor of the previous page.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastCursorInputFactory;

impl LastCursorInputFactory {
    pub fn create(&self, query: &QueryParams) -> QueryBuilderResult<Option<Cursor>> {
        match query.get("last_cursor").map(|c| c.trim()) {
            None | Some("") => Ok(None),
            Some(encoded) => Ok(Some(Cursor::decode(encoded)?)),
        }
    }
}

/// Reads `depth`, the number of relation levels embedded in results.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthInputFactory;

impl DepthInputFactory {
    pub fn create(&self, query: &QueryParams) -> QueryBuilderResult<u8> {
        let Some(raw) = query.get("depth") else {
            return Ok(DEFAULT_DEPTH);
        };
        match raw.trim().parse::<u8>() {
            Ok(depth) if depth <= MAX_DEPTH => Ok(depth),
            _ => Err(QueryBuilderError::InvalidDepth { value: raw.clone() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn params(key: &str, value: &str) -> QueryParams {
        QueryParams::from([(key.to_string(), value.to_string())])
    }

    #[test]
    fn test_limit() -> QueryBuilderResult<()> {
        assert_eq!(LimitInputFactory.create(&QueryParams::new())?, 60);
        assert_eq!(LimitInputFactory.create(&params("limit", "10"))?, 10);
        assert_eq!(LimitInputFactory.create(&params("limit", "5000"))?, 200);
        for bad in ["0", "-1", "ten", "1.5"] {
            assert!(matches!(
                LimitInputFactory.create(&params("limit", bad)),
                Err(QueryBuilderError::InvalidLimit { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn test_last_cursor() -> QueryBuilderResult<()> {
        assert_eq!(LastCursorInputFactory.create(&QueryParams::new())?, None);
        let cursor = Cursor::new(Uuid::now_v7());
        assert_eq!(
            LastCursorInputFactory.create(&params("last_cursor", &cursor.encode()))?,
            Some(cursor)
        );
        assert!(matches!(
            LastCursorInputFactory.create(&params("last_cursor", "not a cursor")),
            Err(QueryBuilderError::InvalidCursor(_))
        ));
        Ok(())
    }

    #[test]
    fn test_depth() -> QueryBuilderResult<()> {
        assert_eq!(DepthInputFactory.create(&QueryParams::new())?, 2);
        assert_eq!(DepthInputFactory.create(&params("depth", "0"))?, 0);
        assert_eq!(
            DepthInputFactory
                .create(&params("depth", "3"))
                .map_err(|e| e.to_string()),
            Err("'depth=3' parameter invalid. Allowed values are 0, 1 or 2".to_string())
        );
        Ok(())
    }
}
