use std::sync::Arc;

use nocturne_sql::{Cursor, Executor};

use crate::config::SessionConfig;
use crate::convert::ConverterRegistry;
use crate::error::Result;
use crate::extract::{MapExtractor, ShapeExtractor};
use crate::plan::Materializer;
use crate::query::Query;
use crate::shape::Shape;
use crate::sql::{ParsedSql, SqlCache};

/// Composition root: one converter registry, one plan cache and one parsed-SQL
/// cache shared by every query created from it. `Session` is `Sync`; share it
/// behind an `Arc` or a `static` and create queries per connection.
pub struct Session {
    config: SessionConfig,
    registry: Arc<ConverterRegistry>,
    materializer: Materializer,
    sql_cache: SqlCache,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_registry(config, ConverterRegistry::standard())
    }

    /// A session over a registry with custom converters.
    pub fn with_registry(config: SessionConfig, registry: ConverterRegistry) -> Self {
        let registry = Arc::new(registry);
        let materializer = Materializer::new(Arc::clone(&registry), config.naming());
        let sql_cache = SqlCache::new(config.sql_cache_capacity);
        Self {
            config,
            registry,
            materializer,
            sql_cache,
        }
    }

    pub fn from_env() -> Self {
        Self::new(SessionConfig::from_env())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    pub fn sql_cache(&self) -> &SqlCache {
        &self.sql_cache
    }

    /// Parse named-parameter SQL, reusing a cached parse when there is one.
    pub fn prepare(&self, sql: &str) -> Result<Arc<ParsedSql>> {
        self.sql_cache.get_or_parse(sql)
    }

    pub fn query<E: Executor>(&self, executor: E, sql: &str) -> Result<Query<'_, E>> {
        Ok(Query::new(self, executor, self.prepare(sql)?))
    }

    /// A query over SQL that is passed to the driver untouched. Use this for
    /// statements whose colons are not parameters, e.g. `::` casts.
    pub fn static_query<E: Executor>(&self, executor: E, sql: &str) -> Query<'_, E> {
        Query::new(self, executor, Arc::new(ParsedSql::verbatim(sql)))
    }

    /// Materialize `S` from a cursor obtained elsewhere.
    pub fn extractor<S: Shape, C: Cursor>(&self, cursor: C) -> Result<ShapeExtractor<S, C>> {
        self.materializer.extractor(cursor)
    }

    pub fn map_extractor<C: Cursor>(&self, cursor: C) -> MapExtractor<C> {
        self.materializer.map_extractor(cursor)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::NameMapper;

    #[test]
    fn test_prepare_uses_cache() {
        let session = Session::default();
        let a = session.prepare("SELECT :a").unwrap();
        let b = session.prepare("SELECT :a").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(session.sql_cache().len(), 1);
    }

    #[test]
    fn test_static_query_keeps_casts() {
        let session = Session::default();
        let mut db = nocturne_sql::memory::MemoryExecutor::new();
        let query = session.static_query(&mut db, "SELECT '1'::int");
        assert_eq!(query.sql().normalized(), "SELECT '1'::int");
        assert!(session.prepare("SELECT x::int").is_err());
    }

    #[test]
    fn test_config_reaches_materializer() {
        let mut config = SessionConfig::default();
        config.name_mapper = NameMapper::AsIs;
        config.column_overrides.insert("PK".into(), "id".into());
        let session = Session::new(config);
        let naming = session.materializer().naming();
        assert_eq!(naming.field_name("PK"), "id");
        assert_eq!(naming.field_name("NAME"), "NAME");
    }
}
