use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::target::{EntityRef, EntityType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

/// How the sink stores a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Attribute,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Attribute => "attribute",
            MetricKind::Gauge => "gauge",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedValue<'a> {
    Attribute(&'a str),
    Gauge(f64),
}

impl ClassifiedValue<'_> {
    pub fn kind(&self) -> MetricKind {
        match self {
            ClassifiedValue::Attribute(_) => MetricKind::Attribute,
            ClassifiedValue::Gauge(_) => MetricKind::Gauge,
        }
    }
}

impl MetricValue {
    /// Strings are attributes; booleans, integers and finite floats are gauges.
    pub fn classify(&self, key: &str) -> Result<ClassifiedValue<'_>> {
        match self {
            MetricValue::String(s) => Ok(ClassifiedValue::Attribute(s)),
            MetricValue::Boolean(b) => Ok(ClassifiedValue::Gauge(if *b { 1.0 } else { 0.0 })),
            MetricValue::Integer(i) => Ok(ClassifiedValue::Gauge(*i as f64)),
            MetricValue::Float(f) if f.is_finite() => Ok(ClassifiedValue::Gauge(*f)),
            MetricValue::Float(f) => Err(Error::UnrecognizedValue {
                key: key.to_string(),
                reason: format!("non-finite gauge {}", f),
            }),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Integer(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Boolean(v)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::String(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::String(v.to_string())
    }
}

/// One reading of one counter on one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub entity: EntityRef,
    pub counter_name: String,
    /// Empty for the aggregate instance.
    pub instance: String,
    pub value: i64,
}

impl MetricSample {
    /// Record key: the counter name, suffixed with the instance when the
    /// series is not the aggregate.
    pub fn key(&self) -> String {
        if self.instance.is_empty() {
            self.counter_name.clone()
        } else {
            format!("{}[{}]", self.counter_name, self.instance)
        }
    }
}

/// Everything emitted for one entity instance in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub event_type: String,
    pub partition: String,
    pub entity: EntityRef,
    pub values: BTreeMap<String, MetricValue>,
    pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
    pub fn new(partition: &str, entity: &EntityRef) -> Self {
        let mut values = BTreeMap::new();
        values.insert("objectName".to_string(), MetricValue::from(entity.name.as_str()));
        Self {
            event_type: entity.entity_type.event_type().to_string(),
            partition: partition.to_string(),
            entity: entity.clone(),
            values,
            timestamp: Utc::now(),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity.entity_type
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetricValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.values.get(key)
    }

    pub fn extend_samples(&mut self, samples: &[MetricSample]) {
        for sample in samples {
            self.values.insert(sample.key(), MetricValue::Integer(sample.value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::ManagedObjectRef;

    fn host() -> EntityRef {
        EntityRef {
            name: "esx01".to_string(),
            reference: ManagedObjectRef::new("HostSystem", "host-10"),
            entity_type: EntityType::Host,
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            MetricValue::from("vmfs").classify("ds.type").unwrap(),
            ClassifiedValue::Attribute("vmfs")
        );
        assert_eq!(
            MetricValue::from(true).classify("ds.accessible").unwrap(),
            ClassifiedValue::Gauge(1.0)
        );
        assert_eq!(
            MetricValue::from(false).classify("ds.accessible").unwrap(),
            ClassifiedValue::Gauge(0.0)
        );
        assert_eq!(
            MetricValue::from(4000i64).classify("hs.totalCPU").unwrap().kind(),
            MetricKind::Gauge
        );
        assert!(MetricValue::from(f64::NAN).classify("ds.capacity").is_err());
    }

    #[test]
    fn test_record_starts_with_object_name() {
        let record = MetricRecord::new("dc1", &host());
        assert_eq!(record.event_type, "ESXHostSystemSample");
        assert_eq!(record.get("objectName"), Some(&MetricValue::from("esx01")));
    }

    #[test]
    fn test_instance_samples_do_not_overwrite_aggregate() {
        let mut record = MetricRecord::new("dc1", &host());
        let aggregate = MetricSample {
            entity: host(),
            counter_name: "cpu.usage.average".to_string(),
            instance: String::new(),
            value: 55,
        };
        let core = MetricSample {
            instance: "0".to_string(),
            value: 70,
            ..aggregate.clone()
        };
        record.extend_samples(&[aggregate, core]);

        assert_eq!(record.get("cpu.usage.average"), Some(&MetricValue::Integer(55)));
        assert_eq!(record.get("cpu.usage.average[0]"), Some(&MetricValue::Integer(70)));
    }
}
