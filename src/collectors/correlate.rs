use tracing::warn;

use super::catalog::CounterCatalog;
use super::types::MetricSample;
use crate::error::Error;
use crate::target::{EntityRef, RawSeries};

/// A series that was dropped or trimmed during correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationWarning {
    /// The counter ID is not in the catalog.
    UnknownCounter { counter_id: i32 },
    /// More than one value under `maxSamples = 1`; only the first was kept.
    MultipleValues { counter: String, count: usize },
    UnrecognizedSeries { kind: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    pub samples: Vec<MetricSample>,
    pub warnings: Vec<CorrelationWarning>,
}

/// Maps returned series back to counter names.
pub struct SampleCorrelator<'a> {
    catalog: &'a CounterCatalog,
}

impl<'a> SampleCorrelator<'a> {
    pub fn new(catalog: &'a CounterCatalog) -> Self {
        Self { catalog }
    }

    pub fn correlate(&self, entity: &EntityRef, series: &[RawSeries]) -> Correlation {
        let mut correlation = Correlation::default();

        for s in series {
            let int_series = match s {
                RawSeries::Int(int_series) => int_series,
                RawSeries::Csv { .. } | RawSeries::Unrecognized => {
                    let err = Error::UnrecognizedSeriesType(s.kind().to_string());
                    warn!(
                        entity_type = %entity.entity_type,
                        instance = %entity.name,
                        "{}",
                        err
                    );
                    correlation.warnings.push(CorrelationWarning::UnrecognizedSeries {
                        kind: s.kind().to_string(),
                    });
                    continue;
                }
            };

            let counter_id = int_series.id.counter_id;
            let Some(counter) = self.catalog.name_of(counter_id) else {
                warn!(
                    entity_type = %entity.entity_type,
                    instance = %entity.name,
                    counter_id,
                    "Series for counter ID missing from catalog"
                );
                correlation
                    .warnings
                    .push(CorrelationWarning::UnknownCounter { counter_id });
                continue;
            };

            let Some(&first) = int_series.value.first() else {
                continue;
            };

            if int_series.value.len() > 1 {
                warn!(
                    entity_type = %entity.entity_type,
                    instance = %entity.name,
                    counter = %counter,
                    "Series contains more than one value {}",
                    int_series.value.len()
                );
                correlation.warnings.push(CorrelationWarning::MultipleValues {
                    counter: counter.to_string(),
                    count: int_series.value.len(),
                });
            }

            correlation.samples.push(MetricSample {
                entity: entity.clone(),
                counter_name: counter.to_string(),
                instance: int_series.id.instance.clone(),
                value: first,
            });
        }

        correlation
    }
}
