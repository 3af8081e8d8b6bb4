//! Counter name <-> ID catalog.
//!
//! IDs are only meaningful for the session and partition the catalog was
//! built from, so the orchestrator builds a fresh one per partition and
//! hands it to the other components by reference.

use std::collections::HashMap;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::target::{CounterInfo, PartitionRef, TargetApi};

#[derive(Debug, Clone, Default)]
pub struct CounterCatalog {
    name_to_id: HashMap<String, i32>,
    id_to_name: HashMap<i32, String>,
    levels: HashMap<i32, i32>,
}

impl CounterCatalog {
    /// Fetches counter metadata in one round trip and indexes it.
    pub fn build<T: TargetApi + ?Sized>(
        target: &T,
        partition: &PartitionRef,
        log_available: bool,
    ) -> Result<Self> {
        let counters =
            target
                .fetch_counter_metadata(partition)
                .map_err(|e| Error::CatalogUnavailable {
                    partition: partition.name.clone(),
                    reason: e.to_string(),
                })?;

        if log_available {
            info!(
                partition = %partition.name,
                "Logging all {} available counters",
                counters.len()
            );
        }

        let catalog = Self::from_counters(&counters);
        if log_available {
            for (name, level) in catalog.entries() {
                info!(partition = %partition.name, "\t {} [{}]", name, level);
            }
        }
        Ok(catalog)
    }

    /// Indexes `counters`. A name or ID seen twice keeps its first mapping so
    /// the two directions stay exact inverses.
    pub fn from_counters(counters: &[CounterInfo]) -> Self {
        let mut catalog = Self::default();
        for counter in counters {
            let full_name = counter.full_name();
            if catalog.name_to_id.contains_key(&full_name)
                || catalog.id_to_name.contains_key(&counter.key)
            {
                warn!(
                    counter = %full_name,
                    counter_id = counter.key,
                    "Duplicate counter definition ignored"
                );
                continue;
            }
            catalog.name_to_id.insert(full_name.clone(), counter.key);
            catalog.id_to_name.insert(counter.key, full_name);
            catalog.levels.insert(counter.key, counter.level);
        }
        catalog
    }

    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.name_to_id.get(name).copied()
    }

    pub fn name_of(&self, id: i32) -> Option<&str> {
        self.id_to_name.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_id.is_empty()
    }

    /// Counter names with their collection level, sorted by name.
    pub fn entries(&self) -> Vec<(&str, i32)> {
        let mut entries: Vec<(&str, i32)> = self
            .id_to_name
            .iter()
            .map(|(id, name)| (name.as_str(), self.levels.get(id).copied().unwrap_or(0)))
            .collect();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{fixture::FixtureFailure, FixtureTarget};

    fn counter(key: i32, group: &str, name: &str, rollup: &str) -> CounterInfo {
        CounterInfo {
            key,
            group: group.to_string(),
            name: name.to_string(),
            rollup: rollup.to_string(),
            level: 1,
        }
    }

    #[test]
    fn test_catalog_is_invertible() {
        let catalog = CounterCatalog::from_counters(&[
            counter(2, "cpu", "usage", "none"),
            counter(6, "cpu", "usage", "average"),
            counter(24, "mem", "usage", "average"),
            counter(125, "disk", "usage", "average"),
        ]);

        assert_eq!(catalog.name_to_id.len(), catalog.id_to_name.len());
        for name in catalog.name_to_id.keys() {
            let id = catalog.id_of(name).unwrap();
            assert_eq!(catalog.name_of(id), Some(name.as_str()));
        }
        assert_eq!(catalog.id_of("cpu.usage.average"), Some(6));
    }

    #[test]
    fn test_duplicates_keep_first_mapping() {
        let catalog = CounterCatalog::from_counters(&[
            counter(6, "cpu", "usage", "average"),
            counter(7, "cpu", "usage", "average"),
            counter(6, "mem", "usage", "average"),
        ]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.id_of("cpu.usage.average"), Some(6));
        assert_eq!(catalog.name_of(7), None);
        assert_eq!(catalog.id_of("mem.usage.average"), None);
    }

    #[test]
    fn test_build_from_target() {
        let target = FixtureTarget::new()
            .with_counter(6, "cpu", "usage", "average")
            .with_partition("dc1");
        let dc = &target.list_partitions().unwrap()[0];

        let catalog = CounterCatalog::build(&target, dc, true).unwrap();
        assert_eq!(catalog.entries(), vec![("cpu.usage.average", 1)]);
    }

    #[test]
    fn test_zero_counters_is_valid() {
        let target = FixtureTarget::new().with_partition("dc1");
        let dc = &target.list_partitions().unwrap()[0];

        let catalog = CounterCatalog::build(&target, dc, false).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_metadata_failure_is_catalog_unavailable() {
        let target = FixtureTarget::new()
            .with_partition("dc1")
            .with_failure(FixtureFailure::CounterMetadata {
                partition: "dc1".to_string(),
            });
        let dc = &target.list_partitions().unwrap()[0];

        let err = CounterCatalog::build(&target, dc, false).unwrap_err();
        assert!(matches!(err, Error::CatalogUnavailable { .. }));
    }
}
