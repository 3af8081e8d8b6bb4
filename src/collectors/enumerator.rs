use tracing::debug;

use crate::error::{Error, Result};
use crate::target::{EntityRef, EntityType, PartitionRef, TargetApi};

pub const WILDCARD: &str = "*";

/// Lists managed-entity instances of one type inside a partition.
pub struct EntityEnumerator<'a, T: TargetApi + ?Sized> {
    target: &'a T,
}

impl<'a, T: TargetApi + ?Sized> EntityEnumerator<'a, T> {
    pub fn new(target: &'a T) -> Self {
        Self { target }
    }

    pub fn list(
        &self,
        partition: &PartitionRef,
        entity_type: EntityType,
    ) -> Result<Vec<EntityRef>> {
        let entities = self
            .target
            .enumerate(partition, entity_type, WILDCARD)
            .map_err(|e| Error::EnumerationFailed {
                partition: partition.name.clone(),
                entity_type,
                reason: e.to_string(),
            })?;

        debug!(
            partition = %partition.name,
            entity_type = %entity_type,
            "Found {} instances",
            entities.len()
        );
        Ok(entities)
    }
}
