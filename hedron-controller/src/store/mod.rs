//! Object store
//!
//! The store is the system of record and the only integration surface. It
//! holds every Project, Revision and Job, enforces optimistic concurrency on
//! writes, keeps the owner index, garbage-collects children when their
//! controlling owner is deleted, and broadcasts a change event for every
//! write.
//!
//! [`ObjectStore`] works on untyped [`DynamicObject`]s so it stays
//! object-safe; [`Api`] is the typed facade the rest of the crate uses.

pub mod memory;
pub mod postgres;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use hedron_core::domain::meta::{Kind, ObjectKey, ObjectMeta, OwnerReference, Resource};
use hedron_core::domain::naming;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ErrorClass;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Capacity of the change-event broadcast channel
pub const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: Kind, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    #[error("{kind} {key} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        kind: Kind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::NotFound { .. } => ErrorClass::NotFound,
            StoreError::AlreadyExists { .. } | StoreError::Conflict { .. } => ErrorClass::Conflict,
            StoreError::Unavailable(_) => ErrorClass::Transient,
            StoreError::Invalid(_) | StoreError::Serialization(_) => ErrorClass::Permanent,
            StoreError::Database(sqlx::Error::RowNotFound) => ErrorClass::NotFound,
            StoreError::Database(_) => ErrorClass::Transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What happened to an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Modified,
    Deleted,
}

/// Change notification broadcast by the store after every write
#[derive(Debug, Clone)]
pub struct ObjectEvent {
    pub kind: Kind,
    pub change: Change,
    /// Metadata of the object as written (or as last stored, for deletions)
    pub metadata: ObjectMeta,
}

impl ObjectEvent {
    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn owner(&self) -> Option<&OwnerReference> {
        self.metadata.controller()
    }
}

/// An object of any kind as the store sees it
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicObject {
    pub kind: Kind,
    pub metadata: ObjectMeta,
    /// Everything except the metadata: `spec` and `status`
    pub data: Value,
}

impl DynamicObject {
    pub fn from_resource<K: Resource>(object: &K) -> StoreResult<Self> {
        let mut data = serde_json::to_value(object)?;
        if let Some(map) = data.as_object_mut() {
            map.remove("metadata");
        }

        Ok(Self {
            kind: K::KIND,
            metadata: object.metadata().clone(),
            data,
        })
    }

    pub fn into_resource<K: Resource>(self) -> StoreResult<K> {
        if self.kind != K::KIND {
            return Err(StoreError::Invalid(format!(
                "expected a {} but found a {}",
                K::KIND,
                self.kind
            )));
        }

        let mut data = self.data;
        let map = data
            .as_object_mut()
            .ok_or_else(|| StoreError::Invalid("object body is not a JSON object".to_string()))?;
        map.insert("metadata".to_string(), serde_json::to_value(&self.metadata)?);

        Ok(serde_json::from_value(data)?)
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn spec(&self) -> Option<&Value> {
        self.data.get("spec")
    }

    pub fn status(&self) -> Option<&Value> {
        self.data.get("status")
    }

    /// Uid of the controlling owner, the value the owner index is keyed on
    pub fn owner_uid(&self) -> Option<Uuid> {
        self.metadata.controller().map(|owner| owner.uid)
    }
}

/// Operations consumed from the object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<DynamicObject>;

    /// Persists a new object, assigning its uid, version and creation time
    async fn create(&self, object: DynamicObject) -> StoreResult<DynamicObject>;

    /// Replaces metadata and spec; the stored status is kept
    ///
    /// Fails with `Conflict` unless `object.metadata.resource_version`
    /// matches the stored version.
    async fn replace(&self, object: DynamicObject) -> StoreResult<DynamicObject>;

    /// Replaces status only, with the same version check as `replace`
    async fn replace_status(&self, object: DynamicObject) -> StoreResult<DynamicObject>;

    /// Deletes an object and, transitively, everything it controls
    async fn delete(&self, kind: Kind, key: &ObjectKey) -> StoreResult<()>;

    async fn list(&self, kind: Kind, namespace: Option<&str>) -> StoreResult<Vec<DynamicObject>>;

    /// Objects of `kind` in `namespace` whose controlling owner is `owner`
    async fn list_owned(
        &self,
        kind: Kind,
        namespace: &str,
        owner: Uuid,
    ) -> StoreResult<Vec<DynamicObject>>;

    fn watch(&self) -> broadcast::Receiver<ObjectEvent>;
}

/// Typed access to one kind of object
pub struct Api<K> {
    store: Arc<dyn ObjectStore>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for Api<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _kind: PhantomData,
        }
    }
}

impl<K: Resource> Api<K> {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    pub async fn get(&self, key: &ObjectKey) -> StoreResult<K> {
        self.store.get(K::KIND, key).await?.into_resource()
    }

    /// Like `get`, but absence is `Ok(None)`; every other failure is an error
    pub async fn get_opt(&self, key: &ObjectKey) -> StoreResult<Option<K>> {
        match self.get(key).await {
            Ok(object) => Ok(Some(object)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn create(&self, object: &K) -> StoreResult<K> {
        let object = DynamicObject::from_resource(object)?;
        self.store.create(object).await?.into_resource()
    }

    pub async fn replace(&self, object: &K) -> StoreResult<K> {
        let object = DynamicObject::from_resource(object)?;
        self.store.replace(object).await?.into_resource()
    }

    pub async fn replace_status(&self, object: &K) -> StoreResult<K> {
        let object = DynamicObject::from_resource(object)?;
        self.store.replace_status(object).await?.into_resource()
    }

    pub async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        self.store.delete(K::KIND, key).await
    }

    pub async fn list(&self, namespace: Option<&str>) -> StoreResult<Vec<K>> {
        self.store
            .list(K::KIND, namespace)
            .await?
            .into_iter()
            .map(DynamicObject::into_resource)
            .collect()
    }

    pub async fn list_owned(&self, namespace: &str, owner: Uuid) -> StoreResult<Vec<K>> {
        self.store
            .list_owned(K::KIND, namespace, owner)
            .await?
            .into_iter()
            .map(DynamicObject::into_resource)
            .collect()
    }
}

// =============================================================================
// Write rules shared by the store implementations
// =============================================================================

/// Validates a new object and stamps the fields the store owns
///
/// The caller assigns `resource_version`.
pub(crate) fn prepare_create(
    mut object: DynamicObject,
    now: chrono::DateTime<chrono::Utc>,
) -> StoreResult<DynamicObject> {
    naming::validate_name(&object.metadata.name)
        .map_err(|err| StoreError::Invalid(err.to_string()))?;
    naming::validate_name(&object.metadata.namespace)
        .map_err(|err| StoreError::Invalid(format!("namespace: {}", err)))?;

    if object.data.get("spec").is_none() {
        return Err(StoreError::Invalid(format!(
            "{} {} has no spec",
            object.kind,
            object.key()
        )));
    }

    object.metadata.uid = Some(Uuid::new_v4());
    object.metadata.generation = 1;
    object.metadata.creation_timestamp = Some(now);

    Ok(object)
}

fn check_version(existing: &DynamicObject, incoming: &DynamicObject) -> StoreResult<()> {
    if existing.metadata.resource_version != incoming.metadata.resource_version {
        return Err(StoreError::Conflict {
            kind: existing.kind,
            key: existing.key(),
            expected: incoming.metadata.resource_version,
            actual: existing.metadata.resource_version,
        });
    }
    Ok(())
}

/// Merges a full replace onto the stored object
///
/// Identity fields and status come from the stored copy; labels, owner
/// references and spec from the incoming one. `generation` moves only when
/// `spec` actually changes. The caller assigns `resource_version`.
pub(crate) fn merge_replace(
    existing: DynamicObject,
    incoming: DynamicObject,
) -> StoreResult<DynamicObject> {
    check_version(&existing, &incoming)?;

    let spec_changed = existing.spec() != incoming.spec();
    let mut merged = existing;

    if let (Some(target), Some(spec)) = (merged.data.as_object_mut(), incoming.spec()) {
        target.insert("spec".to_string(), spec.clone());
    }
    merged.metadata.labels = incoming.metadata.labels;
    merged.metadata.owner_references = incoming.metadata.owner_references;
    if spec_changed {
        merged.metadata.generation += 1;
    }

    Ok(merged)
}

/// Merges a status-only write onto the stored object
pub(crate) fn merge_status(
    existing: DynamicObject,
    incoming: DynamicObject,
) -> StoreResult<DynamicObject> {
    check_version(&existing, &incoming)?;

    let mut merged = existing;
    if let Some(target) = merged.data.as_object_mut() {
        match incoming.status() {
            Some(status) => target.insert("status".to_string(), status.clone()),
            None => target.remove("status"),
        };
    }

    Ok(merged)
}
