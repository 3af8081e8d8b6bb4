//! Counter request resolution and per-instance performance queries.

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::warn;

use super::catalog::CounterCatalog;
use crate::error::{Error, Result};
use crate::target::{EntityRef, EntityType, MetricId, QuerySpec, RawSeries, TargetApi};

/// Counter names for one entity type, resolved against a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterRequest {
    pub metric_ids: Vec<MetricId>,
    pub unresolved: Vec<String>,
}

impl CounterRequest {
    /// Resolves `names` in order, dropping duplicates. Unknown names are
    /// recorded in `unresolved` and logged; they never fail the request.
    pub fn resolve(
        catalog: &CounterCatalog,
        entity_type: EntityType,
        names: &[String],
        instance_filter: &str,
    ) -> Self {
        let mut request = Self::default();
        let mut seen = std::collections::HashSet::new();

        for name in names {
            if !seen.insert(name.as_str()) {
                continue;
            }
            match catalog.id_of(name) {
                Some(counter_id) => request.metric_ids.push(MetricId {
                    counter_id,
                    instance: instance_filter.to_string(),
                }),
                None => {
                    let err = Error::UnresolvedCounter {
                        counter: name.clone(),
                        entity_type,
                    };
                    warn!(entity_type = %entity_type, counter = %name, "{}", err);
                    request.unresolved.push(name.clone());
                }
            }
        }
        request
    }

    pub fn is_empty(&self) -> bool {
        self.metric_ids.is_empty()
    }
}

/// Outcome of the query for one instance.
#[derive(Debug)]
pub struct InstanceQuery {
    pub entity: EntityRef,
    /// `Ok(None)` means the target had no data for the instance.
    pub result: Result<Option<Vec<RawSeries>>>,
}

/// Issues one real-time query per instance, at most `pool` threads at a time.
pub struct PerformanceQueryExecutor<'a, T: TargetApi + ?Sized> {
    target: &'a T,
    pool: &'a ThreadPool,
}

impl<'a, T: TargetApi + ?Sized> PerformanceQueryExecutor<'a, T> {
    pub fn new(target: &'a T, pool: &'a ThreadPool) -> Self {
        Self { target, pool }
    }

    pub fn query(
        &self,
        entity: &EntityRef,
        request: &CounterRequest,
    ) -> Result<Option<Vec<RawSeries>>> {
        let spec = QuerySpec::realtime(entity.reference.clone(), request.metric_ids.clone());

        let returned = self
            .target
            .query_performance(&spec)
            .map_err(|e| Error::QueryFailed {
                entity_type: entity.entity_type,
                instance: entity.name.clone(),
                reason: e.to_string(),
            })?;

        match returned.into_iter().next() {
            Some(metrics) => Ok(Some(metrics.value)),
            None => {
                warn!(
                    entity_type = %entity.entity_type,
                    instance = %entity.name,
                    "No results returned from query execution"
                );
                Ok(None)
            }
        }
    }

    /// Queries every instance; results come back in `entities` order and a
    /// failed instance never affects its siblings.
    pub fn query_all(
        &self,
        entities: &[EntityRef],
        request: &CounterRequest,
    ) -> Vec<InstanceQuery> {
        self.pool.install(|| {
            entities
                .par_iter()
                .map(|entity| InstanceQuery {
                    entity: entity.clone(),
                    result: self.query(entity, request),
                })
                .collect()
        })
    }
}
