//! In-process target backed by an inventory snapshot.
//!
//! A snapshot is a JSON document listing counters, partitions and the
//! entities inside them, each with an optional `summary` and the series
//! the endpoint would return for it. The collector binaries replay
//! snapshots; tests build targets programmatically and inject failures.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{
    CounterInfo, EntityMetrics, EntityRef, EntitySummary, EntityType, ManagedObjectRef,
    PartitionRef, QuerySpec, RawSeries, SummaryObject, TargetApi,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureEntity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub reference: String,
    #[serde(default)]
    pub summary: Option<EntitySummary>,
    #[serde(default)]
    pub series: Vec<RawSeries>,
}

impl FixtureEntity {
    pub fn new(entity_type: EntityType, name: &str, reference: &str) -> Self {
        Self {
            entity_type,
            name: name.to_string(),
            reference: reference.to_string(),
            summary: None,
            series: Vec::new(),
        }
    }

    pub fn with_summary(mut self, summary: EntitySummary) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn with_series(mut self, series: RawSeries) -> Self {
        self.series.push(series);
        self
    }

    fn entity_ref(&self) -> EntityRef {
        EntityRef {
            name: self.name.clone(),
            reference: self.object_ref(),
            entity_type: self.entity_type,
        }
    }

    fn object_ref(&self) -> ManagedObjectRef {
        ManagedObjectRef::new(self.entity_type.type_name(), &self.reference)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturePartition {
    pub name: String,
    /// Overrides the target-wide counter list for this partition.
    #[serde(default)]
    pub counters: Option<Vec<CounterInfo>>,
    #[serde(default)]
    pub entities: Vec<FixtureEntity>,
}

impl FixturePartition {
    fn partition_ref(&self) -> PartitionRef {
        PartitionRef {
            name: self.name.clone(),
            reference: ManagedObjectRef::new("Datacenter", &self.name),
        }
    }
}

/// Calls that can be made to fail on a fixture target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureFailure {
    ListPartitions,
    CounterMetadata { partition: String },
    Enumerate { partition: String, entity_type: EntityType },
    Summaries { partition: String, entity_type: EntityType },
    Query { reference: String },
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FixtureTarget {
    #[serde(default)]
    pub counters: Vec<CounterInfo>,
    #[serde(default)]
    pub partitions: Vec<FixturePartition>,
    #[serde(skip)]
    failures: Vec<FixtureFailure>,
    #[serde(skip)]
    query_delay: Option<Duration>,
    #[serde(skip)]
    queries: AtomicUsize,
    #[serde(skip)]
    in_flight: AtomicUsize,
    #[serde(skip)]
    peak_in_flight: AtomicUsize,
}

impl FixtureTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_counter(mut self, key: i32, group: &str, name: &str, rollup: &str) -> Self {
        self.counters.push(CounterInfo {
            key,
            group: group.to_string(),
            name: name.to_string(),
            rollup: rollup.to_string(),
            level: 1,
        });
        self
    }

    pub fn with_partition(mut self, name: &str) -> Self {
        self.partitions.push(FixturePartition {
            name: name.to_string(),
            counters: None,
            entities: Vec::new(),
        });
        self
    }

    pub fn with_partition_counters(mut self, partition: &str, counters: Vec<CounterInfo>) -> Self {
        if let Some(p) = self.partitions.iter_mut().find(|p| p.name == partition) {
            p.counters = Some(counters);
        }
        self
    }

    /// Adds an entity to `partition`, creating the partition if needed.
    pub fn with_entity(mut self, partition: &str, entity: FixtureEntity) -> Self {
        if !self.partitions.iter().any(|p| p.name == partition) {
            self = self.with_partition(partition);
        }
        if let Some(p) = self.partitions.iter_mut().find(|p| p.name == partition) {
            p.entities.push(entity);
        }
        self
    }

    pub fn with_failure(mut self, failure: FixtureFailure) -> Self {
        self.failures.push(failure);
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = Some(delay);
        self
    }

    /// Number of performance queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Highest number of performance queries observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn fails(&self, failure: &FixtureFailure) -> bool {
        self.failures.contains(failure)
    }

    fn partition(&self, partition: &PartitionRef) -> Result<&FixturePartition> {
        self.partitions
            .iter()
            .find(|p| p.name == partition.name)
            .ok_or_else(|| Error::target(format!("unknown datacenter {}", partition.name)))
    }

    fn answer_query(&self, spec: &QuerySpec) -> Result<Vec<EntityMetrics>> {
        if self.fails(&FixtureFailure::Query {
            reference: spec.entity.value.clone(),
        }) {
            return Err(Error::target(format!("query rejected for {}", spec.entity)));
        }

        let entity = self
            .partitions
            .iter()
            .flat_map(|p| p.entities.iter())
            .find(|e| e.object_ref() == spec.entity)
            .ok_or_else(|| Error::target(format!("managed object not found: {}", spec.entity)))?;

        let value: Vec<RawSeries> = entity
            .series
            .iter()
            .filter(|series| match series.metric_id() {
                Some(id) => spec.metric_ids.iter().any(|wanted| {
                    wanted.counter_id == id.counter_id
                        && (wanted.instance == "*" || wanted.instance == id.instance)
                }),
                None => true,
            })
            .cloned()
            .collect();

        if value.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![EntityMetrics {
            entity: spec.entity.clone(),
            value,
        }])
    }
}

fn matches_pattern(name: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == pattern,
    }
}

impl TargetApi for FixtureTarget {
    fn list_partitions(&self) -> Result<Vec<PartitionRef>> {
        if self.fails(&FixtureFailure::ListPartitions) {
            return Err(Error::target("datacenter listing rejected"));
        }
        Ok(self.partitions.iter().map(FixturePartition::partition_ref).collect())
    }

    fn fetch_counter_metadata(&self, partition: &PartitionRef) -> Result<Vec<CounterInfo>> {
        if self.fails(&FixtureFailure::CounterMetadata {
            partition: partition.name.clone(),
        }) {
            return Err(Error::target("could not retrieve performance manager"));
        }
        let p = self.partition(partition)?;
        Ok(p.counters.clone().unwrap_or_else(|| self.counters.clone()))
    }

    fn enumerate(
        &self,
        partition: &PartitionRef,
        entity_type: EntityType,
        pattern: &str,
    ) -> Result<Vec<EntityRef>> {
        if self.fails(&FixtureFailure::Enumerate {
            partition: partition.name.clone(),
            entity_type,
        }) {
            return Err(Error::target(format!("{} listing rejected", entity_type)));
        }
        let p = self.partition(partition)?;
        Ok(p.entities
            .iter()
            .filter(|e| e.entity_type == entity_type && matches_pattern(&e.name, pattern))
            .map(FixtureEntity::entity_ref)
            .collect())
    }

    fn retrieve_summaries(
        &self,
        partition: &PartitionRef,
        entity_type: EntityType,
    ) -> Result<Vec<SummaryObject>> {
        if self.fails(&FixtureFailure::Summaries {
            partition: partition.name.clone(),
            entity_type,
        }) {
            return Err(Error::target("container view retrieval rejected"));
        }
        let p = self.partition(partition)?;
        Ok(p.entities
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .filter_map(|e| {
                e.summary.as_ref().map(|summary| SummaryObject {
                    reference: e.object_ref(),
                    name: e.name.clone(),
                    summary: summary.clone(),
                })
            })
            .collect())
    }

    fn query_performance(&self, spec: &QuerySpec) -> Result<Vec<EntityMetrics>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.query_delay {
            std::thread::sleep(delay);
        }
        let result = self.answer_query(spec);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "fixture"
    }
}
