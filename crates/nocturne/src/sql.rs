//! Parsed SQL and the parsed-SQL cache.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::params::{self, ParameterMap};

/// SQL text split into its driver-ready positional form and parameter map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSql {
    original: String,
    normalized: String,
    parameters: ParameterMap,
}

impl ParsedSql {
    /// Scan `sql` for named parameters.
    pub fn parse(sql: &str) -> Result<Self> {
        let (normalized, parameters) = params::extract(sql)?;
        Ok(Self {
            original: sql.to_string(),
            normalized,
            parameters,
        })
    }

    /// Use `sql` as-is. Colons are not interpreted, so casts like `x::int` pass through.
    pub fn verbatim(sql: &str) -> Self {
        Self {
            original: sql.to_string(),
            normalized: sql.to_string(),
            parameters: ParameterMap::default(),
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// The SQL handed to the driver.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }
}

/// Memoizes [`ParsedSql`] by exact SQL text.
///
/// Keys are FNV-1a hashes; a hit is confirmed against the stored text so
/// colliding statements are simply parsed again. Once `capacity` entries are
/// held, new statements are parsed but no longer stored.
pub struct SqlCache {
    entries: RwLock<HashMap<u64, Arc<ParsedSql>>>,
    capacity: usize,
}

impl SqlCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(capacity.min(256))),
            capacity,
        }
    }

    /// Look up or parse the SQL.
    pub fn get_or_parse(&self, sql: &str) -> Result<Arc<ParsedSql>> {
        let hash = Self::hash_sql(sql);
        if let Some(hit) = self.entries.read().get(&hash) {
            if hit.original() == sql {
                return Ok(Arc::clone(hit));
            }
        }

        let parsed = Arc::new(ParsedSql::parse(sql)?);
        let mut entries = self.entries.write();
        if entries.len() < self.capacity || entries.contains_key(&hash) {
            entries.insert(hash, Arc::clone(&parsed));
        }
        Ok(parsed)
    }

    /// Number of cached statements.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// FNV-1a hash for SQL strings (fast, no allocations).
    fn hash_sql(sql: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in sql.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
}

impl Default for SqlCache {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SQL_CACHE_CAPACITY)
    }
}
