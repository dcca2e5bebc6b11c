//! Runtime options handed to the router by the embedding binary

use std::path::PathBuf;
use std::time::Duration;

/// Limits and paths used by the API
#[derive(Debug, Clone)]
pub struct ViewerOptions {
    /// Prefix the router is mounted under (`""` or `/admin`)
    pub base_path: String,

    /// Directory holding a built front-end, served with an SPA fallback
    pub frontend_dir: Option<PathBuf>,

    /// Pool size per saved connection
    pub max_connections: u32,

    /// How long to wait for a pooled connection
    pub acquire_timeout: Duration,

    /// Upper bound for any single statement
    pub query_timeout: Duration,

    /// Raw queries and exports fail above this many rows
    pub max_result_rows: u64,

    /// Page size when a row request names none
    pub default_page_size: u64,

    /// Largest page a row request may ask for
    pub max_page_size: u64,

    /// How long cached metadata is served before reloading
    pub cache_stale_time: Duration,

    /// Cached entries kept before the oldest are evicted
    pub cache_max_entries: usize,

    /// Column values sampled for pattern detection
    pub pattern_sample_size: u64,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            frontend_dir: None,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(30),
            max_result_rows: 10_000,
            default_page_size: 100,
            max_page_size: 500,
            cache_stale_time: Duration::from_secs(60),
            cache_max_entries: 1024,
            pattern_sample_size: 200,
        }
    }
}

impl ViewerOptions {
    /// Resolve a requested page size against the defaults and the cap
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .filter(|limit| *limit > 0)
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }

    /// Base path without a trailing slash
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim_end_matches('/');
        if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_capped() {
        let options = ViewerOptions::default();
        assert_eq!(options.page_size(None), 100);
        assert_eq!(options.page_size(Some(0)), 100);
        assert_eq!(options.page_size(Some(20)), 20);
        assert_eq!(options.page_size(Some(100_000)), 500);
    }

    #[test]
    fn test_normalized_base_path() {
        let mut options = ViewerOptions::default();
        assert_eq!(options.normalized_base_path(), "");
        options.base_path = "admin/".to_string();
        assert_eq!(options.normalized_base_path(), "/admin");
        options.base_path = "/".to_string();
        assert_eq!(options.normalized_base_path(), "");
    }
}
