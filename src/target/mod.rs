//! The monitored endpoint, seen as an RPC boundary.
//!
//! Types here mirror the shapes a vSphere-style endpoint returns: counter
//! metadata, managed object references, `summary` properties and
//! performance series. Connection setup and authentication live outside
//! this crate; anything that implements [`TargetApi`] can be collected from.

pub mod fixture;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

pub use fixture::FixtureTarget;

/// The managed-entity types a collection pass walks, in pass order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "HostSystem")]
    Host,
    VirtualMachine,
    ResourcePool,
    ClusterComputeResource,
    Datastore,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Host,
        EntityType::VirtualMachine,
        EntityType::ResourcePool,
        EntityType::ClusterComputeResource,
        EntityType::Datastore,
    ];

    /// Managed object type name used by the target.
    pub fn type_name(&self) -> &'static str {
        match self {
            EntityType::Host => "HostSystem",
            EntityType::VirtualMachine => "VirtualMachine",
            EntityType::ResourcePool => "ResourcePool",
            EntityType::ClusterComputeResource => "ClusterComputeResource",
            EntityType::Datastore => "Datastore",
        }
    }

    /// Event-type label attached to every record of this type downstream.
    pub fn event_type(&self) -> &'static str {
        match self {
            EntityType::Host => "ESXHostSystemSample",
            EntityType::VirtualMachine => "ESXVirtualMachineSample",
            EntityType::ResourcePool => "ESXResourcePoolSample",
            EntityType::ClusterComputeResource => "ESXClusterComputeResourceSample",
            EntityType::Datastore => "ESXDatastoreSample",
        }
    }

    /// Whether the target exposes a `summary` property worth fetching.
    pub fn has_summary(&self) -> bool {
        !matches!(self, EntityType::ClusterComputeResource)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityType::Host => "Host System",
            EntityType::VirtualMachine => "Virtual Machine",
            EntityType::ResourcePool => "Resource Pool",
            EntityType::ClusterComputeResource => "Cluster Compute Resource",
            EntityType::Datastore => "Datastore",
        };
        f.write_str(label)
    }
}

/// Opaque reference to a managed object, e.g. `HostSystem:host-10`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagedObjectRef {
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.value)
    }
}

/// A logical partition of the inventory (a datacenter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRef {
    pub name: String,
    pub reference: ManagedObjectRef,
}

/// One managed-entity instance as listed by the target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    pub reference: ManagedObjectRef,
    pub entity_type: EntityType,
}

/// Counter metadata as advertised by the target's performance manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterInfo {
    pub key: i32,
    pub group: String,
    pub name: String,
    pub rollup: String,
    #[serde(default)]
    pub level: i32,
}

impl CounterInfo {
    /// Canonical `group.name.rollup` name.
    pub fn full_name(&self) -> String {
        format!("{}.{}.{}", self.group, self.name, self.rollup)
    }
}

/// A counter ID plus the instance filter applied to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricId {
    pub counter_id: i32,
    #[serde(default)]
    pub instance: String,
}

/// Real-time sampling granularity of the target, in seconds.
pub const REALTIME_INTERVAL_ID: i32 = 20;

/// One latest-sample query for a single entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub entity: ManagedObjectRef,
    pub max_sample: i32,
    pub interval_id: i32,
    pub metric_ids: Vec<MetricId>,
}

impl QuerySpec {
    pub fn realtime(entity: ManagedObjectRef, metric_ids: Vec<MetricId>) -> Self {
        Self {
            entity,
            max_sample: 1,
            interval_id: REALTIME_INTERVAL_ID,
            metric_ids,
        }
    }
}

/// Integer-valued series for one counter and instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntSeries {
    pub id: MetricId,
    #[serde(default)]
    pub value: Vec<i64>,
}

/// Every series kind the target can return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawSeries {
    Int(IntSeries),
    Csv { id: MetricId, value: String },
    #[serde(other)]
    Unrecognized,
}

impl RawSeries {
    pub fn int(counter_id: i32, instance: &str, value: Vec<i64>) -> Self {
        RawSeries::Int(IntSeries {
            id: MetricId {
                counter_id,
                instance: instance.to_string(),
            },
            value,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RawSeries::Int(_) => "int",
            RawSeries::Csv { .. } => "csv",
            RawSeries::Unrecognized => "unrecognized",
        }
    }

    pub fn metric_id(&self) -> Option<&MetricId> {
        match self {
            RawSeries::Int(series) => Some(&series.id),
            RawSeries::Csv { id, .. } => Some(id),
            RawSeries::Unrecognized => None,
        }
    }
}

/// Query result for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetrics {
    pub entity: ManagedObjectRef,
    pub value: Vec<RawSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSummary {
    pub cpu_mhz: i32,
    pub num_cpu_cores: i32,
    /// Physical memory in bytes.
    pub memory_size: i64,
    /// MHz.
    #[serde(default)]
    pub overall_cpu_usage: i32,
    /// MiB.
    #[serde(default)]
    pub overall_memory_usage: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatastoreInfo {
    Nas {
        remote_host: String,
        remote_path: String,
    },
    Vmfs,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatastoreSummary {
    #[serde(rename = "type")]
    pub ds_type: String,
    pub url: String,
    pub capacity: i64,
    pub free_space: i64,
    #[serde(default)]
    pub uncommitted: i64,
    pub accessible: bool,
    #[serde(default)]
    pub info: DatastoreInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOff,
    Suspended,
    PoweredOn,
    #[serde(other)]
    Unknown,
}

impl PowerState {
    /// Ordinal consumed downstream: off=0, suspended=1, on=2.
    pub fn ordinal(&self) -> Option<i64> {
        match self {
            PowerState::PoweredOff => Some(0),
            PowerState::Suspended => Some(1),
            PowerState::PoweredOn => Some(2),
            PowerState::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VmQuickStats {
    pub ballooned_memory: i64,
    pub compressed_memory: i64,
    pub consumed_overhead_memory: i64,
    pub distributed_cpu_entitlement: i64,
    pub distributed_memory_entitlement: i64,
    pub guest_memory_usage: i64,
    pub host_memory_usage: i64,
    pub overall_cpu_demand: i64,
    pub overall_cpu_usage: i64,
    pub private_memory: i64,
    pub shared_memory: i64,
    pub ssd_swapped_memory: i64,
    pub static_cpu_entitlement: i64,
    pub static_memory_entitlement: i64,
    pub swapped_memory: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmSummary {
    #[serde(default)]
    pub guest_full_name: String,
    pub memory_size_mb: i32,
    #[serde(default)]
    pub quick_stats: VmQuickStats,
    pub power_state: PowerState,
}

/// The `summary` property of one managed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EntitySummary {
    #[serde(rename = "HostSystem")]
    Host(HostSummary),
    Datastore(DatastoreSummary),
    VirtualMachine(VmSummary),
    ResourcePool,
}

/// A managed object retrieved through a container view with its summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryObject {
    pub reference: ManagedObjectRef,
    pub name: String,
    pub summary: EntitySummary,
}

/// Calls the collection pipeline makes against the endpoint.
///
/// Every call is a synchronous round trip. Implementations must be usable
/// from several query workers at once.
pub trait TargetApi: Send + Sync {
    fn list_partitions(&self) -> Result<Vec<PartitionRef>>;

    fn fetch_counter_metadata(&self, partition: &PartitionRef) -> Result<Vec<CounterInfo>>;

    fn enumerate(
        &self,
        partition: &PartitionRef,
        entity_type: EntityType,
        pattern: &str,
    ) -> Result<Vec<EntityRef>>;

    /// Retrieves the `summary` property of every instance of `entity_type`
    /// under `partition` in one batched call.
    fn retrieve_summaries(
        &self,
        partition: &PartitionRef,
        entity_type: EntityType,
    ) -> Result<Vec<SummaryObject>>;

    fn query_performance(&self, spec: &QuerySpec) -> Result<Vec<EntityMetrics>>;

    fn name(&self) -> &str;
}
