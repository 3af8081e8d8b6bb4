pub mod catalog;
pub mod correlate;
pub mod enumerator;
pub mod orchestrator;
pub mod query;
pub mod summary;
pub mod types;

pub use catalog::CounterCatalog;
pub use correlate::{Correlation, CorrelationWarning, SampleCorrelator};
pub use enumerator::EntityEnumerator;
pub use orchestrator::{CollectionOrchestrator, EntityTypeReport, PartitionReport, PassReport};
pub use query::{CounterRequest, InstanceQuery, PerformanceQueryExecutor};
pub use summary::{SummaryAttributeFetcher, SummaryAttributeSet};
pub use types::*;
