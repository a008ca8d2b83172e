use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use tracing::debug;

use crate::error::PersistenceError;

use super::Entity;
use super::descriptor::EntityDescriptor;

type Registry = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

static DESCRIPTORS: LazyLock<RwLock<Registry>> = LazyLock::new(|| RwLock::new(HashMap::new()));

fn poisoned() -> PersistenceError {
    PersistenceError::state("entity descriptor registry lock poisoned")
}

fn downcast<T: Entity>(
    entry: Arc<dyn Any + Send + Sync>,
) -> Result<Arc<EntityDescriptor<T>>, PersistenceError> {
    entry.downcast::<EntityDescriptor<T>>().map_err(|_| {
        PersistenceError::state(format!(
            "descriptor registered for {} has another type",
            std::any::type_name::<T>()
        ))
    })
}

/// Descriptor of `T`, resolved from [`Entity::mapping`] on first use and shared afterwards.
///
/// # Errors
/// Returns `PersistenceError::Schema` if the mapping of `T` is invalid; the failure is not
/// cached, so every request reports it.
pub fn descriptor<T: Entity>() -> Result<Arc<EntityDescriptor<T>>, PersistenceError> {
    let key = TypeId::of::<T>();
    if let Some(entry) = DESCRIPTORS.read().map_err(|_| poisoned())?.get(&key) {
        return downcast(Arc::clone(entry));
    }

    // Built outside the lock; when two threads race the first stored descriptor wins.
    let built: Arc<dyn Any + Send + Sync> = Arc::new(T::mapping().build()?);
    let entry = {
        let mut registry = DESCRIPTORS.write().map_err(|_| poisoned())?;
        Arc::clone(registry.entry(key).or_insert_with(|| {
            debug!(entity = std::any::type_name::<T>(), "entity descriptor resolved");
            built
        }))
    };
    downcast(entry)
}
