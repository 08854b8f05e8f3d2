//! Cursor-driven extraction of shapes and maps.

use std::sync::Arc;

use indexmap::IndexMap;
use nocturne_sql::{Cursor, SqlValue};

use crate::error::{Error, Result};
use crate::plan::MaterializationPlan;
use crate::shape::Shape;

/// Pulls rows from a cursor and materializes them as `S`.
///
/// Once the cursor reports exhaustion the extractor stays empty and the
/// cursor is not touched again.
pub struct ShapeExtractor<S: 'static, C> {
    cursor: C,
    plan: Arc<MaterializationPlan<S>>,
    sql: String,
    empty: bool,
}

impl<S: Shape, C: Cursor> ShapeExtractor<S, C> {
    pub fn new(cursor: C, plan: Arc<MaterializationPlan<S>>) -> Self {
        Self {
            cursor,
            plan,
            sql: String::new(),
            empty: false,
        }
    }

    /// Statement the cursor belongs to; driver errors raised while reading
    /// carry it.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = sql.into();
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Consume exactly one row.
    pub fn extract_one(&mut self) -> Result<Option<S>> {
        if self.empty {
            return Ok(None);
        }
        let row = self
            .cursor
            .next_row()
            .map_err(|e| Error::driver(self.sql.as_str(), e))?;
        match row {
            Some(row) => self.plan.materialize(&row).map(Some),
            None => {
                self.empty = true;
                Ok(None)
            }
        }
    }

    /// Up to `n` rows; fewer when the cursor runs out.
    pub fn extract(&mut self, n: usize) -> Result<Vec<S>> {
        let mut out = Vec::with_capacity(n.min(1024));
        while out.len() < n {
            match self.extract_one()? {
                Some(item) => out.push(item),
                None => break,
            }
        }
        Ok(out)
    }

    /// Every remaining row.
    pub fn extract_all(&mut self) -> Result<Vec<S>> {
        let mut out = Vec::new();
        while let Some(item) = self.extract_one()? {
            out.push(item);
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn plan(&self) -> &Arc<MaterializationPlan<S>> {
        &self.plan
    }

    pub fn cursor_mut(&mut self) -> &mut C {
        &mut self.cursor
    }

    pub fn into_inner(self) -> C {
        self.cursor
    }
}

impl<S: Shape, C: Cursor> Iterator for ShapeExtractor<S, C> {
    type Item = Result<S>;

    fn next(&mut self) -> Option<Self::Item> {
        self.extract_one().transpose()
    }
}

/// Rows as insertion-ordered maps of mapped column name to value.
pub struct MapExtractor<C> {
    cursor: C,
    keys: Vec<String>,
    sql: String,
    empty: bool,
}

impl<C: Cursor> MapExtractor<C> {
    pub(crate) fn new(cursor: C, keys: Vec<String>) -> Self {
        Self {
            cursor,
            keys,
            sql: String::new(),
            empty: false,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = sql.into();
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn extract_one(&mut self) -> Result<Option<IndexMap<String, SqlValue>>> {
        if self.empty {
            return Ok(None);
        }
        let row = self
            .cursor
            .next_row()
            .map_err(|e| Error::driver(self.sql.as_str(), e))?;
        let Some(row) = row else {
            self.empty = true;
            return Ok(None);
        };
        Ok(Some(
            self.keys
                .iter()
                .cloned()
                .zip(row.into_values())
                .collect(),
        ))
    }

    pub fn extract(&mut self, n: usize) -> Result<Vec<IndexMap<String, SqlValue>>> {
        let mut out = Vec::new();
        while out.len() < n {
            match self.extract_one()? {
                Some(map) => out.push(map),
                None => break,
            }
        }
        Ok(out)
    }

    pub fn extract_all(&mut self) -> Result<Vec<IndexMap<String, SqlValue>>> {
        let mut out = Vec::new();
        while let Some(map) = self.extract_one()? {
            out.push(map);
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn into_inner(self) -> C {
        self.cursor
    }
}

impl<C: Cursor> Iterator for MapExtractor<C> {
    type Item = Result<IndexMap<String, SqlValue>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.extract_one().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nocturne_sql::memory::MemoryCursor;
    use nocturne_sql::{Column, SqlType};

    use crate::convert::ConverterRegistry;
    use crate::naming::{ColumnNaming, NameMapper};
    use crate::plan::Materializer;
    use crate::shape::{Field, ShapeDescriptor};

    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Tag {
        id: i32,
    }

    impl Shape for Tag {
        fn descriptor() -> &'static ShapeDescriptor<Self> {
            static DESCRIPTOR: std::sync::OnceLock<ShapeDescriptor<Tag>> =
                std::sync::OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                ShapeDescriptor::mutable(
                    "Tag",
                    Tag::default,
                    vec![Field::new("id", |t: &Tag| &t.id)
                        .setter(|t: &mut Tag, v| t.id = v)
                        .build()],
                )
            })
        }
    }

    fn cursor(n: i32) -> MemoryCursor {
        MemoryCursor::new(
            vec![
                Column::new("ID", SqlType::Integer),
                Column::new("TAG_NAME", SqlType::Varchar),
            ],
            (0..n)
                .map(|i| vec![SqlValue::Int(i), SqlValue::Text(format!("t{}", i))])
                .collect(),
        )
    }

    fn materializer() -> Materializer {
        Materializer::new(
            Arc::new(ConverterRegistry::standard()),
            ColumnNaming::new(NameMapper::SnakeCase),
        )
    }

    #[test]
    fn test_emptiness_is_sticky() {
        let cursor = cursor(2);
        let probe = cursor.probe();
        let mut extractor = materializer().extractor::<Tag, _>(cursor).unwrap();

        assert_eq!(extractor.extract_one().unwrap(), Some(Tag { id: 0 }));
        assert_eq!(extractor.extract_one().unwrap(), Some(Tag { id: 1 }));
        assert_eq!(extractor.extract_one().unwrap(), None);
        assert!(extractor.is_empty());
        let advances = probe.advances();
        assert_eq!(extractor.extract_one().unwrap(), None);
        assert!(extractor.extract_all().unwrap().is_empty());
        assert_eq!(probe.advances(), advances);
    }

    #[test]
    fn test_extract_n_and_iterate() {
        let mut extractor = materializer().extractor::<Tag, _>(cursor(5)).unwrap();
        assert_eq!(extractor.extract(2).unwrap().len(), 2);
        let rest: Vec<Tag> = extractor.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(rest, vec![Tag { id: 2 }, Tag { id: 3 }, Tag { id: 4 }]);
        assert!(extractor.next().is_none());
    }

    #[test]
    fn test_read_failure_names_the_statement() {
        let mut extractor = materializer()
            .extractor::<Tag, _>(cursor(2))
            .unwrap()
            .with_sql("SELECT ID, TAG_NAME FROM TAGS");
        extractor.cursor_mut().close().unwrap();
        let err = extractor.extract_one().unwrap_err();
        assert_eq!(
            err.to_string(),
            "cursor closed **** while executing: SELECT ID, TAG_NAME FROM TAGS"
        );

        let mut closed = cursor(1);
        closed.close().unwrap();
        let mut maps = materializer().map_extractor(closed).with_sql("SELECT 1");
        let err = maps.extract_one().unwrap_err();
        assert!(err.to_string().ends_with("while executing: SELECT 1"), "{}", err);
    }

    #[test]
    fn test_map_extractor_uses_mapped_names() {
        let mut maps = materializer().map_extractor(cursor(1));
        assert_eq!(maps.keys(), ["id", "tag_name"]);
        let row = maps.extract_one().unwrap().unwrap();
        let keys: Vec<_> = row.keys().cloned().collect();
        assert_eq!(keys, vec!["id", "tag_name"]);
        assert_eq!(row["tag_name"], SqlValue::Text("t0".into()));
        assert!(maps.extract_one().unwrap().is_none());
    }
}
