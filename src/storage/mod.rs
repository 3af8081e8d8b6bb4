use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::io::Write;
use tracing::warn;
use uuid::Uuid;

use crate::collectors::types::{ClassifiedValue, MetricRecord};
use crate::error::Result;

pub mod sqlite;

pub use sqlite::SqliteSink;

pub const INTEGRATION_NAME: &str = "com.vmperf.vsphere";
pub const PROTOCOL_VERSION: &str = "3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRound {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub records_count: usize,
}

impl CollectionRound {
    pub fn new(records_count: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            records_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_records: i64,
    pub total_collection_rounds: i64,
    pub latest_collection: Option<CollectionRound>,
    pub database_size_bytes: Option<u64>,
}

/// Receives the records of a pass as they are produced.
pub trait MetricSink {
    fn emit(&mut self, record: MetricRecord) -> Result<()>;

    /// Publishes whatever the pass produced and closes the round.
    fn finish(&mut self) -> Result<CollectionRound>;

    fn name(&self) -> &str;
}

/// Keeps records in memory; every finished round is retained.
#[derive(Debug, Default)]
pub struct MemorySink {
    pending: Vec<MetricRecord>,
    rounds: Vec<(CollectionRound, Vec<MetricRecord>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records emitted since the last `finish`.
    pub fn records(&self) -> &[MetricRecord] {
        &self.pending
    }

    pub fn rounds(&self) -> &[(CollectionRound, Vec<MetricRecord>)] {
        &self.rounds
    }
}

impl MetricSink for MemorySink {
    fn emit(&mut self, record: MetricRecord) -> Result<()> {
        self.pending.push(record);
        Ok(())
    }

    fn finish(&mut self) -> Result<CollectionRound> {
        let records = std::mem::take(&mut self.pending);
        let round = CollectionRound::new(records.len());
        self.rounds.push((round.clone(), records));
        Ok(round)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Publishes each round as one integration-protocol JSON document: one
/// datacenter entity per partition, each with its metric sets.
pub struct JsonSink<W: Write> {
    writer: W,
    pretty: bool,
    pending: Vec<MetricRecord>,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W, pretty: bool) -> Self {
        Self {
            writer,
            pretty,
            pending: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn metric_set(record: &MetricRecord) -> Value {
        let mut set = Map::new();
        set.insert("event_type".to_string(), json!(record.event_type));
        for (key, value) in &record.values {
            match value.classify(key) {
                Ok(ClassifiedValue::Attribute(s)) => {
                    set.insert(key.clone(), json!(s));
                }
                Ok(ClassifiedValue::Gauge(g)) => {
                    set.insert(key.clone(), json!(g));
                }
                Err(e) => warn!(instance = %record.entity.name, "{}", e),
            }
        }
        Value::Object(set)
    }

    fn payload(&self) -> Value {
        let mut data: Vec<(String, Vec<Value>)> = Vec::new();
        for record in &self.pending {
            let set = Self::metric_set(record);
            match data.iter_mut().find(|(partition, _)| *partition == record.partition) {
                Some((_, sets)) => sets.push(set),
                None => data.push((record.partition.clone(), vec![set])),
            }
        }

        let data: Vec<Value> = data
            .into_iter()
            .map(|(partition, metrics)| {
                json!({
                    "entity": {"name": partition, "type": "datacenter"},
                    "metrics": metrics,
                    "inventory": {},
                    "events": [],
                })
            })
            .collect();

        json!({
            "name": INTEGRATION_NAME,
            "protocol_version": PROTOCOL_VERSION,
            "integration_version": env!("CARGO_PKG_VERSION"),
            "data": data,
        })
    }
}

impl<W: Write> MetricSink for JsonSink<W> {
    fn emit(&mut self, record: MetricRecord) -> Result<()> {
        self.pending.push(record);
        Ok(())
    }

    fn finish(&mut self) -> Result<CollectionRound> {
        let payload = self.payload();
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, &payload)?;
        } else {
            serde_json::to_writer(&mut self.writer, &payload)?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        let round = CollectionRound::new(self.pending.len());
        self.pending.clear();
        Ok(round)
    }

    fn name(&self) -> &str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{EntityRef, EntityType, ManagedObjectRef};

    fn record(partition: &str, name: &str) -> MetricRecord {
        let entity = EntityRef {
            name: name.to_string(),
            reference: ManagedObjectRef::new("Datastore", name),
            entity_type: EntityType::Datastore,
        };
        let mut record = MetricRecord::new(partition, &entity);
        record.set("ds.accessible", true);
        record.set("ds.capacity", 512.0);
        record.set("ds.uncommitted", f64::INFINITY);
        record
    }

    #[test]
    fn test_memory_sink_rounds() {
        let mut sink = MemorySink::new();
        sink.emit(record("dc1", "ds-a")).unwrap();
        sink.emit(record("dc1", "ds-b")).unwrap();
        assert_eq!(sink.records().len(), 2);

        let round = sink.finish().unwrap();
        assert_eq!(round.records_count, 2);
        assert!(sink.records().is_empty());
        assert_eq!(sink.rounds().len(), 1);
        assert_eq!(sink.rounds()[0].0, round);
    }

    #[test]
    fn test_json_payload_groups_by_partition() {
        let mut sink = JsonSink::new(Vec::new(), false);
        sink.emit(record("dc1", "ds-a")).unwrap();
        sink.emit(record("dc2", "ds-b")).unwrap();
        sink.emit(record("dc1", "ds-c")).unwrap();
        let round = sink.finish().unwrap();
        assert_eq!(round.records_count, 3);

        let output = sink.into_inner();
        let payload: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(payload["protocol_version"], "3");

        let data = payload["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["entity"]["name"], "dc1");
        assert_eq!(data[0]["metrics"].as_array().unwrap().len(), 2);

        let set = &data[0]["metrics"][0];
        assert_eq!(set["event_type"], "ESXDatastoreSample");
        assert_eq!(set["objectName"], "ds-a");
        assert_eq!(set["ds.accessible"], 1.0);
        assert_eq!(set["ds.capacity"], 512.0);
        assert!(set.get("ds.uncommitted").is_none());
    }
}
