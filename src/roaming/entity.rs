//! Entities that migrate together with their terminus.

use crate::protocol::CodecError;
use std::any::Any;
use std::sync::Arc;

/// An entity that can be linked to a terminus and moved to another scene.
///
/// `snapshot` and `restore` must round-trip the entity's state. Destination scenes find the
/// restore function by [`RoamingEntity::ENTITY_TYPE`], so the type has to be registered there
/// with [`HandlerSet::roaming_entity`](crate::dispatch::HandlerSet::roaming_entity).
pub trait RoamingEntity: Send + Sync + Sized + 'static {
    const ENTITY_TYPE: &'static str;

    fn snapshot(&self) -> Result<Vec<u8>, CodecError>;

    fn restore(bytes: &[u8]) -> Result<Self, CodecError>;
}

/// Object-safe view of a [`RoamingEntity`].
pub trait RoamingObject: Send + Sync + 'static {
    fn entity_type(&self) -> &'static str;

    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: RoamingEntity> RoamingObject for E {
    fn entity_type(&self) -> &'static str {
        E::ENTITY_TYPE
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        self.snapshot()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Restores a transferred entity from its snapshot bytes.
pub type EntityLoader = fn(&[u8]) -> Result<Arc<dyn RoamingObject>, CodecError>;

pub(crate) fn loader<E: RoamingEntity>(bytes: &[u8]) -> Result<Arc<dyn RoamingObject>, CodecError> {
    Ok(Arc::new(E::restore(bytes)?))
}
