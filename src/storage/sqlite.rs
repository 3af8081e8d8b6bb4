use super::{CollectionRound, MetricSink, StorageStats};
use crate::collectors::types::{ClassifiedValue, MetricRecord};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use tracing::warn;

pub struct SqliteSink {
    db_path: String,
    pending: Vec<MetricRecord>,
}

impl SqliteSink {
    pub fn new(db_path: Option<String>) -> Self {
        let path = db_path.unwrap_or_else(|| {
            let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            format!("{}/.vmperf/vmperf.db", home_dir)
        });

        Self {
            db_path: path,
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    pub fn initialize(&self) -> Result<()> {
        self.ensure_db_directory()?;
        self.create_tables()?;
        Ok(())
    }

    fn ensure_db_directory(&self) -> Result<()> {
        let db_path = Path::new(&self.db_path);
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn get_connection(&self) -> rusqlite::Result<Connection> {
        Connection::open(&self.db_path)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.get_connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS collection_rounds (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                records_count INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection_round_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                datacenter TEXT NOT NULL,
                entity_name TEXT NOT NULL,
                entity_ref TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                FOREIGN KEY(collection_round_id) REFERENCES collection_rounds(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS record_values (
                record_id INTEGER NOT NULL,
                metric_key TEXT NOT NULL,
                kind TEXT NOT NULL,
                value_text TEXT,
                value_gauge REAL,
                FOREIGN KEY(record_id) REFERENCES records(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_collection_round
             ON records(collection_round_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_record_values_key
             ON record_values(metric_key)",
            [],
        )?;

        Ok(())
    }

    pub fn get_stats(&self) -> Result<StorageStats> {
        let conn = self.get_connection()?;

        let total_records: i64 =
            conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;

        let total_collection_rounds: i64 =
            conn.query_row("SELECT COUNT(*) FROM collection_rounds", [], |row| row.get(0))?;

        let latest_collection = conn
            .query_row(
                "SELECT id, timestamp, records_count FROM collection_rounds
                 ORDER BY timestamp DESC LIMIT 1",
                [],
                |row| {
                    let id: String = row.get(0)?;
                    let timestamp_str: String = row.get(1)?;
                    let records_count: usize = row.get::<_, i64>(2)? as usize;

                    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                        .map_err(|_e| {
                            rusqlite::Error::InvalidColumnType(
                                1,
                                "timestamp".to_string(),
                                rusqlite::types::Type::Text,
                            )
                        })?
                        .with_timezone(&Utc);

                    Ok(CollectionRound {
                        id,
                        timestamp,
                        records_count,
                    })
                },
            )
            .optional()?;

        let database_size_bytes = fs::metadata(&self.db_path).map(|m| m.len()).ok();

        Ok(StorageStats {
            total_records,
            total_collection_rounds,
            latest_collection,
            database_size_bytes,
        })
    }
}

impl MetricSink for SqliteSink {
    fn emit(&mut self, record: MetricRecord) -> Result<()> {
        self.pending.push(record);
        Ok(())
    }

    /// Writes the round and all of its records in one transaction.
    fn finish(&mut self) -> Result<CollectionRound> {
        let records = std::mem::take(&mut self.pending);
        let round = CollectionRound::new(records.len());

        let conn = self.get_connection()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO collection_rounds (id, timestamp, records_count) VALUES (?1, ?2, ?3)",
            params![round.id, round.timestamp.to_rfc3339(), round.records_count],
        )?;

        for record in &records {
            tx.execute(
                "INSERT INTO records
                 (collection_round_id, event_type, datacenter, entity_name, entity_ref, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    round.id,
                    record.event_type,
                    record.partition,
                    record.entity.name,
                    record.entity.reference.to_string(),
                    record.timestamp.to_rfc3339()
                ],
            )?;
            let record_id = tx.last_insert_rowid();

            for (key, value) in &record.values {
                let classified = match value.classify(key) {
                    Ok(classified) => classified,
                    Err(e) => {
                        warn!(instance = %record.entity.name, "{}", e);
                        continue;
                    }
                };
                let kind = classified.kind().as_str();
                let (text, gauge) = match classified {
                    ClassifiedValue::Attribute(s) => (Some(s), None),
                    ClassifiedValue::Gauge(g) => (None, Some(g)),
                };
                tx.execute(
                    "INSERT INTO record_values
                     (record_id, metric_key, kind, value_text, value_gauge)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![record_id, key, kind, text, gauge],
                )?;
            }
        }

        tx.commit()?;
        Ok(round)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{EntityRef, EntityType, ManagedObjectRef};

    fn sink_in(dir: &tempfile::TempDir) -> SqliteSink {
        let path = dir.path().join("nested").join("vmperf.db");
        let sink = SqliteSink::new(Some(path.to_string_lossy().into_owned()));
        sink.initialize().unwrap();
        sink
    }

    fn host_record() -> MetricRecord {
        let entity = EntityRef {
            name: "esx01".to_string(),
            reference: ManagedObjectRef::new("HostSystem", "host-10"),
            entity_type: EntityType::Host,
        };
        let mut record = MetricRecord::new("dc1", &entity);
        record.set("hs.totalCPU", 4000i64);
        record.set("cpu.usage.average", 55i64);
        record
    }

    #[test]
    fn test_storage_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(&dir);

        let stats = sink.get_stats().unwrap();
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.total_collection_rounds, 0);
        assert!(stats.latest_collection.is_none());
    }

    #[test]
    fn test_finish_stores_round() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(&dir);

        sink.emit(host_record()).unwrap();
        let round = sink.finish().unwrap();
        assert_eq!(round.records_count, 1);

        let stats = sink.get_stats().unwrap();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.total_collection_rounds, 1);
        assert_eq!(stats.latest_collection.unwrap().id, round.id);

        let conn = sink.get_connection().unwrap();
        let (kind, text): (String, String) = conn
            .query_row(
                "SELECT kind, value_text FROM record_values WHERE metric_key = 'objectName'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(kind, "attribute");
        assert_eq!(text, "esx01");

        let gauge: f64 = conn
            .query_row(
                "SELECT value_gauge FROM record_values WHERE metric_key = 'hs.totalCPU'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(gauge, 4000.0);
    }
}
