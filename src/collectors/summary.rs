//! Point-in-time `summary` attributes, fetched in one batched call per
//! entity type and keyed by managed object reference.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::types::MetricValue;
use crate::error::{Error, Result};
use crate::target::{
    DatastoreInfo, DatastoreSummary, EntitySummary, EntityType, HostSummary, ManagedObjectRef,
    PartitionRef, SummaryObject, TargetApi, VmSummary,
};

const BYTES_PER_MIB: i64 = 1024 * 1024;
const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

pub type Attributes = BTreeMap<String, MetricValue>;

#[derive(Debug, Clone, Default)]
pub struct SummaryAttributeSet {
    by_reference: HashMap<ManagedObjectRef, Attributes>,
}

impl SummaryAttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: ManagedObjectRef, attributes: Attributes) {
        self.by_reference.insert(reference, attributes);
    }

    pub fn get(&self, reference: &ManagedObjectRef) -> Option<&Attributes> {
        self.by_reference.get(reference)
    }

    pub fn len(&self) -> usize {
        self.by_reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }
}

pub struct SummaryAttributeFetcher<'a, T: TargetApi + ?Sized> {
    target: &'a T,
}

impl<'a, T: TargetApi + ?Sized> SummaryAttributeFetcher<'a, T> {
    pub fn new(target: &'a T) -> Self {
        Self { target }
    }

    pub fn fetch(
        &self,
        partition: &PartitionRef,
        entity_type: EntityType,
    ) -> Result<SummaryAttributeSet> {
        let mut set = SummaryAttributeSet::new();
        if !entity_type.has_summary() {
            return Ok(set);
        }

        let objects = self
            .target
            .retrieve_summaries(partition, entity_type)
            .map_err(|e| Error::FetchFailed {
                partition: partition.name.clone(),
                entity_type,
                reason: e.to_string(),
            })?;

        for object in objects {
            let SummaryObject {
                reference,
                name,
                summary,
            } = object;
            let attributes = extract(&name, &summary);
            set.insert(reference, attributes);
        }

        debug!(
            partition = %partition.name,
            entity_type = %entity_type,
            "Fetched {} summaries",
            set.len()
        );
        Ok(set)
    }
}

pub fn extract(name: &str, summary: &EntitySummary) -> Attributes {
    match summary {
        EntitySummary::Host(host) => host_attributes(host),
        EntitySummary::Datastore(ds) => datastore_attributes(ds),
        EntitySummary::VirtualMachine(vm) => vm_attributes(vm),
        EntitySummary::ResourcePool => {
            let mut attributes = Attributes::new();
            attributes.insert("rp.name".to_string(), MetricValue::from(name));
            attributes
        }
    }
}

fn host_attributes(host: &HostSummary) -> Attributes {
    let total_cpu = i64::from(host.cpu_mhz) * i64::from(host.num_cpu_cores);
    let free_cpu = total_cpu - i64::from(host.overall_cpu_usage);
    let memory_usage = i64::from(host.overall_memory_usage) * BYTES_PER_MIB;
    let free_memory = host.memory_size - memory_usage;

    let mut attributes = Attributes::new();
    attributes.insert("hs.totalCPU".to_string(), total_cpu.into());
    attributes.insert("hs.freeCPU".to_string(), free_cpu.into());
    attributes.insert("hs.overallCPU".to_string(), i64::from(host.overall_cpu_usage).into());
    attributes.insert("hs.memoryUsage".to_string(), memory_usage.into());
    attributes.insert("hs.memorySize".to_string(), host.memory_size.into());
    attributes.insert("hs.freeMemory".to_string(), free_memory.into());
    attributes
}

fn datastore_attributes(ds: &DatastoreSummary) -> Attributes {
    let gib = |bytes: i64| MetricValue::Float(bytes as f64 / BYTES_PER_GIB);

    let mut attributes = Attributes::new();
    attributes.insert("ds.type".to_string(), ds.ds_type.as_str().into());
    attributes.insert("ds.url".to_string(), ds.url.as_str().into());
    attributes.insert("ds.capacity".to_string(), gib(ds.capacity));
    attributes.insert("ds.freespace".to_string(), gib(ds.free_space));
    attributes.insert("ds.uncommitted".to_string(), gib(ds.uncommitted));
    attributes.insert("ds.accessible".to_string(), ds.accessible.into());

    if let DatastoreInfo::Nas {
        remote_host,
        remote_path,
    } = &ds.info
    {
        attributes.insert("ds.nas.remoteHost".to_string(), remote_host.as_str().into());
        attributes.insert("ds.nas.remotePath".to_string(), remote_path.as_str().into());
    }
    attributes
}

fn vm_attributes(vm: &VmSummary) -> Attributes {
    let stats = &vm.quick_stats;
    let quick_stats = [
        ("balloonedMemory", stats.ballooned_memory),
        ("compressedMemory", stats.compressed_memory),
        ("consumedOverheadMemory", stats.consumed_overhead_memory),
        ("distributedCpuEntitlement", stats.distributed_cpu_entitlement),
        ("distributedMemoryEntitlement", stats.distributed_memory_entitlement),
        ("guestMemoryUsage", stats.guest_memory_usage),
        ("hostMemoryUsage", stats.host_memory_usage),
        ("overallCpuDemand", stats.overall_cpu_demand),
        ("overallCpuUsage", stats.overall_cpu_usage),
        ("privateMemory", stats.private_memory),
        ("sharedMemory", stats.shared_memory),
        ("ssdSwappedMemory", stats.ssd_swapped_memory),
        ("staticCpuEntitlement", stats.static_cpu_entitlement),
        ("staticMemoryEntitlement", stats.static_memory_entitlement),
        ("swappedMemory", stats.swapped_memory),
    ];

    let mut attributes = Attributes::new();
    attributes.insert("vm.guestFullName".to_string(), vm.guest_full_name.as_str().into());
    attributes.insert("vm.memorySize".to_string(), i64::from(vm.memory_size_mb).into());
    for (key, value) in quick_stats {
        attributes.insert(format!("vm.{}", key), value.into());
    }
    if let Some(ordinal) = vm.power_state.ordinal() {
        attributes.insert("vm.powerState".to_string(), ordinal.into());
    }
    attributes
}
