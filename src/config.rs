//! Collector configuration.
//!
//! Counter lists come either from the built-in defaults or from a JSON file
//! shaped like `{"Host": [...], "VM": [...], "ResourcePool": [...],
//! "ClusterComputeResource": [...], "Datastore": [...]}`. A file replaces the
//! defaults wholesale; keys it omits collect no counters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::collectors::enumerator::WILDCARD;
use crate::error::{Error, Result};
use crate::target::EntityType;

const DEFAULT_HOST_COUNTERS: &[&str] = &[
    "cpu.usage.average",
    "cpu.usagemhz.average",
    "cpu.ready.summation",
    "mem.usage.average",
    "mem.consumed.average",
    "mem.active.average",
    "mem.swapused.average",
    "disk.usage.average",
    "disk.maxTotalLatency.latest",
    "net.usage.average",
    "net.received.average",
    "net.transmitted.average",
    "sys.uptime.latest",
];

const DEFAULT_VM_COUNTERS: &[&str] = &[
    "cpu.usage.average",
    "cpu.usagemhz.average",
    "cpu.ready.summation",
    "mem.usage.average",
    "mem.active.average",
    "mem.consumed.average",
    "mem.vmmemctl.average",
    "disk.usage.average",
    "net.usage.average",
    "virtualDisk.totalReadLatency.average",
    "virtualDisk.totalWriteLatency.average",
    "sys.uptime.latest",
];

pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterDefinitions {
    #[serde(rename = "Host")]
    pub host: Vec<String>,
    #[serde(rename = "VM")]
    pub vm: Vec<String>,
    #[serde(rename = "ResourcePool")]
    pub resource_pool: Vec<String>,
    #[serde(rename = "ClusterComputeResource")]
    pub cluster_compute_resource: Vec<String>,
    #[serde(rename = "Datastore")]
    pub datastore: Vec<String>,
}

impl CounterDefinitions {
    pub fn builtin() -> Self {
        let owned = |names: &[&str]| names.iter().map(|n| n.to_string()).collect();
        Self {
            host: owned(DEFAULT_HOST_COUNTERS),
            vm: owned(DEFAULT_VM_COUNTERS),
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Reading configuration file {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read configuration file '{}': {}", path.display(), e))
        })?;
        let definitions: Self = serde_json::from_str(&contents).map_err(|e| {
            Error::config(format!("cannot parse configuration file '{}': {}", path.display(), e))
        })?;

        for entity_type in EntityType::ALL {
            debug!(
                entity_type = %entity_type,
                "Counters from configuration = {:?}",
                definitions.for_type(entity_type)
            );
        }
        Ok(definitions)
    }

    pub fn for_type(&self, entity_type: EntityType) -> &[String] {
        match entity_type {
            EntityType::Host => &self.host,
            EntityType::VirtualMachine => &self.vm,
            EntityType::ResourcePool => &self.resource_pool,
            EntityType::ClusterComputeResource => &self.cluster_compute_resource,
            EntityType::Datastore => &self.datastore,
        }
    }
}

/// Which partitions a pass covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSelector {
    /// The one and only partition on the target.
    Default,
    All,
    Named(String),
}

impl FromStr for PartitionSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(Error::config("datacenter must not be empty")),
            "default" => Ok(PartitionSelector::Default),
            "all" => Ok(PartitionSelector::All),
            name => Ok(PartitionSelector::Named(name.to_string())),
        }
    }
}

impl fmt::Display for PartitionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionSelector::Default => f.write_str("default"),
            PartitionSelector::All => f.write_str("all"),
            PartitionSelector::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub partition: PartitionSelector,
    pub counters: CounterDefinitions,
    /// Instance filter per entity type; `"*"` when absent.
    pub instance_filters: HashMap<EntityType, String>,
    /// Upper bound on concurrent performance queries against the target.
    pub max_in_flight: usize,
    pub log_available_counters: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            partition: PartitionSelector::Default,
            counters: CounterDefinitions::builtin(),
            instance_filters: HashMap::new(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            log_available_counters: false,
        }
    }
}

impl CollectorConfig {
    pub fn instance_filter(&self, entity_type: EntityType) -> &str {
        self.instance_filters
            .get(&entity_type)
            .map(String::as_str)
            .unwrap_or(WILDCARD)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(Error::config("max_in_flight must be at least 1"));
        }
        if let Some((entity_type, _)) = self.instance_filters.iter().find(|(_, f)| f.is_empty()) {
            return Err(Error::config(format!("empty instance filter for {}", entity_type)));
        }
        Ok(())
    }
}
