//! Drives a collection pass across partitions and entity types.
//!
//! Per partition: catalog first, then every summary set, then one
//! enumerate/resolve/query/correlate/merge round per entity type. Failures
//! stay inside the smallest scope they occur in; only partition resolution
//! fails the whole pass. Without a catalog a partition still emits its
//! summary attributes.

use rayon::ThreadPool;
use tracing::{debug, error, info, warn};

use super::catalog::CounterCatalog;
use super::correlate::SampleCorrelator;
use super::enumerator::EntityEnumerator;
use super::query::{CounterRequest, PerformanceQueryExecutor};
use super::summary::{SummaryAttributeFetcher, SummaryAttributeSet};
use super::types::MetricRecord;
use crate::config::{CollectorConfig, PartitionSelector};
use crate::error::{Error, Result};
use crate::storage::MetricSink;
use crate::target::{EntityType, PartitionRef, TargetApi};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTypeReport {
    pub entity_type: EntityType,
    pub instances: usize,
    pub records_emitted: usize,
    pub unresolved_counters: Vec<String>,
    pub failed_instances: Vec<String>,
    pub warnings: usize,
    /// Enumeration or summary failure for the whole type.
    pub error: Option<String>,
}

impl EntityTypeReport {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            instances: 0,
            records_emitted: 0,
            unresolved_counters: Vec::new(),
            failed_instances: Vec::new(),
            warnings: 0,
            error: None,
        }
    }
}

#[derive(Debug)]
pub struct PartitionReport {
    pub partition: String,
    /// Set when counter metadata was unavailable; records then carry
    /// summary attributes only.
    pub catalog_error: Option<String>,
    pub entity_types: Vec<EntityTypeReport>,
}

impl PartitionReport {
    pub fn records_emitted(&self) -> usize {
        self.entity_types.iter().map(|r| r.records_emitted).sum()
    }

    pub fn for_type(&self, entity_type: EntityType) -> Option<&EntityTypeReport> {
        self.entity_types
            .iter()
            .find(|r| r.entity_type == entity_type)
    }
}

#[derive(Debug, Default)]
pub struct PassReport {
    pub partitions: Vec<PartitionReport>,
}

impl PassReport {
    pub fn records_emitted(&self) -> usize {
        self.partitions
            .iter()
            .map(PartitionReport::records_emitted)
            .sum()
    }

    pub fn partition(&self, name: &str) -> Option<&PartitionReport> {
        self.partitions.iter().find(|p| p.partition == name)
    }
}

pub struct CollectionOrchestrator<'a, T: TargetApi + ?Sized> {
    target: &'a T,
    config: &'a CollectorConfig,
    pool: ThreadPool,
}

impl<'a, T: TargetApi + ?Sized> CollectionOrchestrator<'a, T> {
    pub fn new(target: &'a T, config: &'a CollectorConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_in_flight)
            .thread_name(|i| format!("vmperf-query-{}", i))
            .build()
            .map_err(|e| Error::config(format!("cannot start query workers: {}", e)))?;

        Ok(Self {
            target,
            config,
            pool,
        })
    }

    pub fn resolve_partitions(&self) -> Result<Vec<PartitionRef>> {
        let partitions = self.target.list_partitions()?;

        match &self.config.partition {
            PartitionSelector::All => Ok(partitions),
            PartitionSelector::Default => match partitions.len() {
                1 => Ok(partitions),
                0 => Err(Error::PartitionNotFound("no default datacenter".to_string())),
                n => Err(Error::PartitionNotFound(format!(
                    "default datacenter resolves to {} datacenters",
                    n
                ))),
            },
            PartitionSelector::Named(name) => partitions
                .into_iter()
                .find(|p| &p.name == name)
                .map(|p| vec![p])
                .ok_or_else(|| Error::PartitionNotFound(name.clone())),
        }
    }

    /// Runs one pass. Records go to `sink` as soon as they are assembled.
    pub fn run(&self, sink: &mut dyn MetricSink) -> Result<PassReport> {
        let partitions = self.resolve_partitions()?;
        let mut report = PassReport::default();

        for partition in &partitions {
            info!(partition = %partition.name, "Populating metrics for datacenter");
            report.partitions.push(self.collect_partition(partition, sink));
        }

        Ok(report)
    }

    pub fn collect_partition(
        &self,
        partition: &PartitionRef,
        sink: &mut dyn MetricSink,
    ) -> PartitionReport {
        let log_available = self.config.log_available_counters;
        let (catalog, catalog_error) =
            match CounterCatalog::build(self.target, partition, log_available) {
                Ok(catalog) => (Some(catalog), None),
                Err(e) => {
                    error!(
                        partition = %partition.name,
                        scope = e.scope(),
                        "{}, collecting summaries only",
                        e
                    );
                    (None, Some(e.to_string()))
                }
            };

        let fetcher = SummaryAttributeFetcher::new(self.target);
        let mut summaries: Vec<(EntityType, std::result::Result<SummaryAttributeSet, String>)> =
            Vec::new();
        for entity_type in EntityType::ALL {
            let fetched = fetcher.fetch(partition, entity_type).map_err(|e| {
                warn!(
                    partition = %partition.name,
                    entity_type = %entity_type,
                    scope = e.scope(),
                    "{}",
                    e
                );
                e.to_string()
            });
            summaries.push((entity_type, fetched));
        }

        let mut entity_types = Vec::with_capacity(summaries.len());
        for (entity_type, summary) in &summaries {
            let empty = SummaryAttributeSet::new();
            let (summary, summary_error) = match summary {
                Ok(set) => (set, None),
                Err(e) => (&empty, Some(e.clone())),
            };
            let mut type_report =
                self.collect_entity_type(partition, *entity_type, catalog.as_ref(), summary, sink);
            if type_report.error.is_none() {
                type_report.error = summary_error;
            }
            entity_types.push(type_report);
        }

        PartitionReport {
            partition: partition.name.clone(),
            catalog_error,
            entity_types,
        }
    }

    fn collect_entity_type(
        &self,
        partition: &PartitionRef,
        entity_type: EntityType,
        catalog: Option<&CounterCatalog>,
        summary: &SummaryAttributeSet,
        sink: &mut dyn MetricSink,
    ) -> EntityTypeReport {
        let mut report = EntityTypeReport::new(entity_type);

        let entities = match EntityEnumerator::new(self.target).list(partition, entity_type) {
            Ok(entities) => entities,
            Err(e) => {
                warn!(
                    partition = %partition.name,
                    entity_type = %entity_type,
                    scope = e.scope(),
                    "{}",
                    e
                );
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.instances = entities.len();
        if entities.is_empty() {
            return report;
        }

        let request = match catalog {
            Some(catalog) => CounterRequest::resolve(
                catalog,
                entity_type,
                self.config.counters.for_type(entity_type),
                self.config.instance_filter(entity_type),
            ),
            None => CounterRequest::default(),
        };
        report.unresolved_counters = request.unresolved.clone();

        let results = if request.is_empty() {
            debug!(
                partition = %partition.name,
                entity_type = %entity_type,
                "No counters requested, emitting summaries only"
            );
            Vec::new()
        } else {
            PerformanceQueryExecutor::new(self.target, &self.pool).query_all(&entities, &request)
        };

        let correlator = catalog.map(SampleCorrelator::new);
        for (index, entity) in entities.iter().enumerate() {
            let mut record = MetricRecord::new(&partition.name, entity);
            if let Some(attributes) = summary.get(&entity.reference) {
                for (key, value) in attributes {
                    record.set(key.clone(), value.clone());
                }
            }

            match (results.get(index).map(|q| &q.result), &correlator) {
                (Some(Ok(Some(series))), Some(correlator)) => {
                    let correlation = correlator.correlate(entity, series);
                    report.warnings += correlation.warnings.len();
                    record.extend_samples(&correlation.samples);
                }
                (Some(Err(e)), _) => {
                    warn!(partition = %partition.name, scope = e.scope(), "{}", e);
                    report.failed_instances.push(entity.name.clone());
                }
                _ => {}
            }

            match sink.emit(record) {
                Ok(()) => report.records_emitted += 1,
                Err(e) => error!(
                    instance = %entity.name,
                    sink = sink.name(),
                    "Failed to emit record: {}",
                    e
                ),
            }
        }

        info!(
            partition = %partition.name,
            entity_type = %entity_type,
            "Emitted {} of {} records",
            report.records_emitted,
            report.instances
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::types::MetricValue;
    use crate::target::fixture::{FixtureEntity, FixtureFailure};
    use crate::target::{CounterInfo, EntitySummary, FixtureTarget, HostSummary, RawSeries};
    use crate::storage::MemorySink;

    fn host(name: &str, reference: &str) -> FixtureEntity {
        FixtureEntity::new(EntityType::Host, name, reference)
            .with_summary(EntitySummary::Host(HostSummary {
                cpu_mhz: 2000,
                num_cpu_cores: 2,
                memory_size: 8 << 30,
                overall_cpu_usage: 500,
                overall_memory_usage: 1024,
            }))
            .with_series(RawSeries::int(6, "", vec![55]))
    }

    fn config_for(partition: PartitionSelector) -> CollectorConfig {
        CollectorConfig {
            partition,
            max_in_flight: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_partition_requires_exactly_one() {
        let config = config_for(PartitionSelector::Default);

        let none = FixtureTarget::new();
        let orchestrator = CollectionOrchestrator::new(&none, &config).unwrap();
        assert!(matches!(
            orchestrator.resolve_partitions(),
            Err(Error::PartitionNotFound(_))
        ));

        let two = FixtureTarget::new().with_partition("dc1").with_partition("dc2");
        let orchestrator = CollectionOrchestrator::new(&two, &config).unwrap();
        assert!(orchestrator.resolve_partitions().is_err());

        let one = FixtureTarget::new().with_partition("dc1");
        let orchestrator = CollectionOrchestrator::new(&one, &config).unwrap();
        assert_eq!(orchestrator.resolve_partitions().unwrap()[0].name, "dc1");
    }

    #[test]
    fn test_named_partition() {
        let target = FixtureTarget::new().with_partition("dc1").with_partition("dc2");

        let config = config_for(PartitionSelector::Named("dc2".to_string()));
        let orchestrator = CollectionOrchestrator::new(&target, &config).unwrap();
        let partitions = orchestrator.resolve_partitions().unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].name, "dc2");

        let config = config_for(PartitionSelector::Named("dc9".to_string()));
        let orchestrator = CollectionOrchestrator::new(&target, &config).unwrap();
        let mut sink = MemorySink::new();
        assert!(orchestrator.run(&mut sink).is_err());
    }

    #[test]
    fn test_summary_and_samples_merge() {
        let target = FixtureTarget::new()
            .with_counter(6, "cpu", "usage", "average")
            .with_entity("dc1", host("esx01", "host-10"));
        let config = config_for(PartitionSelector::Default);
        let orchestrator = CollectionOrchestrator::new(&target, &config).unwrap();
        let mut sink = MemorySink::new();

        let report = orchestrator.run(&mut sink).unwrap();
        assert_eq!(report.records_emitted(), 1);

        let record = &sink.records()[0];
        assert_eq!(record.event_type, "ESXHostSystemSample");
        assert_eq!(record.get("hs.totalCPU"), Some(&MetricValue::Integer(4000)));
        assert_eq!(record.get("cpu.usage.average"), Some(&MetricValue::Integer(55)));
        assert_eq!(record.get("objectName"), Some(&MetricValue::from("esx01")));

        let dc = report.partition("dc1").unwrap();
        let hosts = dc.for_type(EntityType::Host).unwrap();
        // builtin host list minus the one counter the target advertises
        assert_eq!(hosts.unresolved_counters.len(), 12);
    }

    #[test]
    fn test_failed_query_still_emits_summary() {
        let target = FixtureTarget::new()
            .with_counter(6, "cpu", "usage", "average")
            .with_entity("dc1", host("esx01", "host-10"))
            .with_entity("dc1", host("esx02", "host-11"))
            .with_failure(FixtureFailure::Query {
                reference: "host-10".to_string(),
            });
        let config = config_for(PartitionSelector::Default);
        let orchestrator = CollectionOrchestrator::new(&target, &config).unwrap();
        let mut sink = MemorySink::new();

        let report = orchestrator.run(&mut sink).unwrap();
        let dc = report.partition("dc1").unwrap();
        assert_eq!(
            dc.for_type(EntityType::Host).unwrap().failed_instances,
            vec!["esx01".to_string()]
        );

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].get("cpu.usage.average").is_none());
        assert!(records[0].get("hs.totalCPU").is_some());
        assert_eq!(records[1].get("cpu.usage.average"), Some(&MetricValue::Integer(55)));
    }

    #[test]
    fn test_summary_failure_proceeds_with_empty_set() {
        let target = FixtureTarget::new()
            .with_counter(6, "cpu", "usage", "average")
            .with_entity("dc1", host("esx01", "host-10"))
            .with_failure(FixtureFailure::Summaries {
                partition: "dc1".to_string(),
                entity_type: EntityType::Host,
            });
        let config = config_for(PartitionSelector::Default);
        let orchestrator = CollectionOrchestrator::new(&target, &config).unwrap();
        let mut sink = MemorySink::new();

        let report = orchestrator.run(&mut sink).unwrap();
        let dc = report.partition("dc1").unwrap();
        assert!(dc.for_type(EntityType::Host).unwrap().error.is_some());

        let record = &sink.records()[0];
        assert!(record.get("hs.totalCPU").is_none());
        assert_eq!(record.get("cpu.usage.average"), Some(&MetricValue::Integer(55)));
    }

    #[test]
    fn test_no_counters_skips_queries() {
        let target = FixtureTarget::new()
            .with_counter(6, "cpu", "usage", "average")
            .with_entity(
                "dc1",
                FixtureEntity::new(EntityType::ResourcePool, "Resources", "resgroup-8")
                    .with_summary(EntitySummary::ResourcePool),
            );
        let config = config_for(PartitionSelector::Default);
        let orchestrator = CollectionOrchestrator::new(&target, &config).unwrap();
        let mut sink = MemorySink::new();

        orchestrator.run(&mut sink).unwrap();
        assert_eq!(target.query_count(), 0);
        assert_eq!(sink.records()[0].get("rp.name"), Some(&MetricValue::from("Resources")));
    }

    #[test]
    fn test_zero_in_flight_is_rejected() {
        let target = FixtureTarget::new();
        let config = CollectorConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        assert!(CollectionOrchestrator::new(&target, &config).is_err());
    }

    #[test]
    fn test_catalog_failure_emits_summaries_only() {
        let target = FixtureTarget::new()
            .with_counter(6, "cpu", "usage", "average")
            .with_entity("dc1", host("esx01", "host-10"))
            .with_failure(FixtureFailure::CounterMetadata {
                partition: "dc1".to_string(),
            });
        let config = config_for(PartitionSelector::Default);
        let orchestrator = CollectionOrchestrator::new(&target, &config).unwrap();
        let mut sink = MemorySink::new();

        let report = orchestrator.run(&mut sink).unwrap();
        let dc = report.partition("dc1").unwrap();
        assert!(dc.catalog_error.is_some());
        assert!(dc.for_type(EntityType::Host).unwrap().unresolved_counters.is_empty());
        assert_eq!(target.query_count(), 0);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("hs.totalCPU"), Some(&MetricValue::Integer(4000)));
        assert_eq!(records[0].get("objectName"), Some(&MetricValue::from("esx01")));
        assert!(records[0].get("cpu.usage.average").is_none());
    }

    #[test]
    fn test_catalog_rebuilt_per_partition() {
        let remapped = vec![CounterInfo {
            key: 300,
            group: "cpu".to_string(),
            name: "usage".to_string(),
            rollup: "average".to_string(),
            level: 1,
        }];
        let target = FixtureTarget::new()
            .with_counter(6, "cpu", "usage", "average")
            .with_entity("dc1", host("esx01", "host-10"))
            .with_entity(
                "dc2",
                FixtureEntity::new(EntityType::Host, "esx02", "host-20")
                    .with_series(RawSeries::int(300, "", vec![80]))
                    .with_series(RawSeries::int(6, "", vec![1])),
            )
            .with_partition_counters("dc2", remapped);
        let config = config_for(PartitionSelector::All);
        let orchestrator = CollectionOrchestrator::new(&target, &config).unwrap();
        let mut sink = MemorySink::new();

        orchestrator.run(&mut sink).unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("cpu.usage.average"), Some(&MetricValue::Integer(55)));
        assert_eq!(records[1].partition, "dc2");
        assert_eq!(records[1].get("cpu.usage.average"), Some(&MetricValue::Integer(80)));
    }
}
