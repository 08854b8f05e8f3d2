//! Materialization plans and the plan cache.

use std::any::{Any, TypeId};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use log::{debug, trace};
use nocturne_sql::{Column, Cursor, Row};

use crate::convert::ConverterRegistry;
use crate::error::{Error, Result};
use crate::extract::{MapExtractor, ShapeExtractor};
use crate::naming::ColumnNaming;
use crate::shape::{Construction, FieldChannel, Shape, ShapeArgs, ShapeDescriptor};

/// Ordered (label, type) pairs of a result set. Only used as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowShapeIdentity(Vec<Column>);

impl RowShapeIdentity {
    pub fn of(columns: &[Column]) -> Self {
        Self(columns.to_vec())
    }

    pub fn columns(&self) -> &[Column] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PlanKey {
    shape: TypeId,
    row: RowShapeIdentity,
}

struct Step<S> {
    column: usize,
    field: usize,
    channel: Box<dyn FieldChannel<S>>,
}

/// How to build one `S` from a row of a particular result-set layout.
/// Immutable once built.
pub struct MaterializationPlan<S: 'static> {
    shape: &'static ShapeDescriptor<S>,
    steps: Vec<Step<S>>,
}

impl<S: Shape> MaterializationPlan<S> {
    pub(crate) fn build(
        registry: &ConverterRegistry,
        naming: &ColumnNaming,
        columns: &[Column],
    ) -> Result<Self> {
        let shape = S::descriptor();
        let mut steps = Vec::new();

        for (index, column) in columns.iter().enumerate() {
            let Some(field) = resolve_field(shape, naming, &column.label) else {
                debug!(
                    "Column {} has no counterpart in {}; skipped",
                    column.label,
                    shape.name()
                );
                continue;
            };
            let descriptor = &shape.fields()[field];
            if !shape.is_immutable() && !descriptor.is_writable() {
                return Err(Error::shape_mismatch(
                    shape.name(),
                    format!("field {} has no setter", descriptor.name()),
                ));
            }
            let subject = format!(
                "column {} into {}.{}",
                column.label,
                shape.name(),
                descriptor.name()
            );
            let channel = descriptor.channel(registry, column.sql_type, index, subject)?;
            steps.push(Step {
                column: index,
                field,
                channel,
            });
        }

        if shape.is_immutable() {
            check_constructor_order(shape, &steps)?;
        }
        Ok(Self { shape, steps })
    }

    /// Build one `S` from `row`.
    pub fn materialize(&self, row: &Row) -> Result<S> {
        match self.shape.construction() {
            Construction::Mutable(ctor) => {
                let mut target = ctor();
                for step in &self.steps {
                    step.channel.apply(row, &mut target)?;
                }
                Ok(target)
            }
            Construction::Immutable(ctor) => {
                let values = self
                    .steps
                    .iter()
                    .map(|step| step.channel.read_arg(row).map(Some))
                    .collect::<Result<Vec<_>>>()?;
                ctor(&mut ShapeArgs::new(self.shape.name(), values))
            }
        }
    }

    /// (column index, field name) for every mapped column, in column order.
    pub fn mapped(&self) -> impl Iterator<Item = (usize, &'static str)> + '_ {
        self.steps
            .iter()
            .map(|step| (step.column, self.shape.fields()[step.field].name()))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn resolve_field<S: 'static>(
    shape: &ShapeDescriptor<S>,
    naming: &ColumnNaming,
    label: &str,
) -> Option<usize> {
    let fields = shape.fields();
    if let Some(i) = fields.iter().position(|f| f.column() == Some(label)) {
        return Some(i);
    }
    if let Some(i) = fields
        .iter()
        .position(|f| f.column().is_some_and(|c| c.eq_ignore_ascii_case(label)))
    {
        return Some(i);
    }
    let name = naming.field_name(label);
    fields
        .iter()
        .position(|f| f.column().is_none() && f.name() == name)
}

fn check_constructor_order<S: 'static>(shape: &ShapeDescriptor<S>, steps: &[Step<S>]) -> Result<()> {
    let mapped: Vec<usize> = steps.iter().map(|s| s.field).collect();
    let expected: Vec<usize> = (0..shape.fields().len()).collect();
    if mapped == expected {
        return Ok(());
    }
    let names = |ids: &[usize]| {
        ids.iter()
            .map(|&i| shape.fields()[i].name())
            .collect::<Vec<_>>()
            .join(", ")
    };
    Err(Error::shape_mismatch(
        shape.name(),
        format!(
            "constructor takes ({}) but the result set supplies ({})",
            names(&expected),
            names(&mapped)
        ),
    ))
}

/// Builds and caches materialization plans, one per (shape, result-set
/// layout). Construction happens at most once per key, also when several
/// threads ask for the same plan at the same time.
pub struct Materializer {
    registry: Arc<ConverterRegistry>,
    naming: ColumnNaming,
    plans: DashMap<PlanKey, Arc<dyn Any + Send + Sync>>,
    builds: AtomicUsize,
}

impl Materializer {
    pub fn new(registry: Arc<ConverterRegistry>, naming: ColumnNaming) -> Self {
        Self {
            registry,
            naming,
            plans: DashMap::new(),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<ConverterRegistry> {
        &self.registry
    }

    pub fn naming(&self) -> &ColumnNaming {
        &self.naming
    }

    /// The plan for `S` over `columns`, built on first use.
    pub fn plan<S: Shape>(&self, columns: &[Column]) -> Result<Arc<MaterializationPlan<S>>> {
        let key = PlanKey {
            shape: TypeId::of::<S>(),
            row: RowShapeIdentity::of(columns),
        };
        let cached = match self.plans.get(&key) {
            Some(hit) => Arc::clone(hit.value()),
            None => {
                let entry = self.plans.entry(key).or_try_insert_with(|| {
                    self.builds.fetch_add(1, Ordering::Relaxed);
                    trace!("Building materialization plan for {}", S::descriptor().name());
                    MaterializationPlan::<S>::build(&self.registry, &self.naming, columns)
                        .map(|plan| Arc::new(plan) as Arc<dyn Any + Send + Sync>)
                })?;
                Arc::clone(entry.value())
            }
        };
        cached.downcast::<MaterializationPlan<S>>().map_err(|_| {
            Error::shape_mismatch(S::descriptor().name(), "cached plan has a different shape")
        })
    }

    /// Number of plans constructed so far.
    pub fn plans_built(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn cached_plans(&self) -> usize {
        self.plans.len()
    }

    pub fn extractor<S: Shape, C: Cursor>(&self, cursor: C) -> Result<ShapeExtractor<S, C>> {
        let plan = self.plan::<S>(cursor.columns())?;
        Ok(ShapeExtractor::new(cursor, plan))
    }

    pub fn map_extractor<C: Cursor>(&self, cursor: C) -> MapExtractor<C> {
        let keys = cursor
            .columns()
            .iter()
            .map(|c| self.naming.field_name(&c.label).into_owned())
            .collect();
        MapExtractor::new(cursor, keys)
    }
}
