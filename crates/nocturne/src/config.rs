use std::collections::HashMap;

use serde::Deserialize;

use crate::naming::{ColumnNaming, NameMapper};

pub const DEFAULT_SQL_CACHE_CAPACITY: usize = 1024;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 120_000;
pub const DEFAULT_CURSOR_TTL_SECS: u64 = 300;
pub const DEFAULT_SWEEPER_THREAD: &str = "nocturne-cursor-sweeper";

/// Session-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How column labels become field names (default: snake_case)
    pub name_mapper: NameMapper,

    /// Exact column label to field name overrides, applied before `name_mapper`
    pub column_overrides: HashMap<String, String>,

    /// Max number of parsed statements kept (default: 1024)
    pub sql_cache_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name_mapper: NameMapper::default(),
            column_overrides: HashMap::new(),
            sql_cache_capacity: DEFAULT_SQL_CACHE_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Load from `NOCTURNE_*` environment variables. Missing or invalid
    /// values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        SessionConfig {
            name_mapper: var("NOCTURNE_NAME_MAPPER")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            column_overrides: HashMap::new(),
            sql_cache_capacity: var("NOCTURNE_SQL_CACHE_CAPACITY")
                .unwrap_or_else(|| DEFAULT_SQL_CACHE_CAPACITY.to_string())
                .parse()
                .unwrap_or(DEFAULT_SQL_CACHE_CAPACITY),
        }
    }

    pub fn naming(&self) -> ColumnNaming {
        ColumnNaming::new(self.name_mapper.clone()).with_overrides(self.column_overrides.clone())
    }
}

/// Settings of a [`CursorCache`](crate::cursor_cache::CursorCache).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CursorCacheConfig {
    /// How often the sweeper wakes up (default: 2 minutes)
    pub sweep_interval_ms: u64,

    /// TTL used by `register_default` (default: 300)
    pub default_ttl_secs: u64,

    /// Start the sweeper thread on first registration (default: true)
    pub auto_sweep: bool,

    /// Name of the sweeper thread
    pub thread_name: String,
}

impl Default for CursorCacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            default_ttl_secs: DEFAULT_CURSOR_TTL_SECS,
            auto_sweep: true,
            thread_name: DEFAULT_SWEEPER_THREAD.to_string(),
        }
    }
}

impl CursorCacheConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        CursorCacheConfig {
            sweep_interval_ms: var("NOCTURNE_SWEEP_INTERVAL_MS")
                .unwrap_or_else(|| DEFAULT_SWEEP_INTERVAL_MS.to_string())
                .parse()
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_MS),
            default_ttl_secs: var("NOCTURNE_CURSOR_TTL_SECS")
                .unwrap_or_else(|| DEFAULT_CURSOR_TTL_SECS.to_string())
                .parse()
                .unwrap_or(DEFAULT_CURSOR_TTL_SECS),
            auto_sweep: !matches!(
                var("NOCTURNE_AUTO_SWEEP")
                    .unwrap_or_default()
                    .to_lowercase()
                    .as_str(),
                "false" | "0" | "no"
            ),
            thread_name: var("NOCTURNE_SWEEPER_THREAD")
                .unwrap_or_else(|| DEFAULT_SWEEPER_THREAD.to_string()),
        }
    }

    /// Without a background thread; eviction only happens through
    /// [`sweep_now`](crate::cursor_cache::CursorCache::sweep_now).
    pub fn manual() -> Self {
        Self {
            auto_sweep: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::from_lookup(vars(&[]));
        assert!(matches!(config.name_mapper, NameMapper::SnakeCase));
        assert_eq!(config.sql_cache_capacity, DEFAULT_SQL_CACHE_CAPACITY);
    }

    #[test]
    fn test_session_from_vars() {
        let config = SessionConfig::from_lookup(vars(&[
            ("NOCTURNE_NAME_MAPPER", "camel_case"),
            ("NOCTURNE_SQL_CACHE_CAPACITY", "16"),
        ]));
        assert!(matches!(config.name_mapper, NameMapper::CamelCase));
        assert_eq!(config.sql_cache_capacity, 16);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = CursorCacheConfig::from_lookup(vars(&[
            ("NOCTURNE_SWEEP_INTERVAL_MS", "soon"),
            ("NOCTURNE_AUTO_SWEEP", "no"),
        ]));
        assert_eq!(config.sweep_interval_ms, DEFAULT_SWEEP_INTERVAL_MS);
        assert_eq!(config.default_ttl_secs, DEFAULT_CURSOR_TTL_SECS);
        assert!(!config.auto_sweep);
        assert_eq!(config.thread_name, DEFAULT_SWEEPER_THREAD);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"name_mapper": "as_is", "column_overrides": {"PK": "id"}}"#,
        )
        .unwrap();
        assert_eq!(config.sql_cache_capacity, DEFAULT_SQL_CACHE_CAPACITY);
        assert_eq!(config.naming().field_name("PK"), "id");
        assert_eq!(config.naming().field_name("NAME"), "NAME");
    }
}
