//! In-memory object store
//!
//! Backs tests and single-process development runs. Objects do not survive a
//! restart.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use hedron_core::domain::meta::{Kind, ObjectKey};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    Change, DynamicObject, EVENT_BUFFER, ObjectEvent, ObjectStore, StoreError, StoreResult,
    merge_replace, merge_status, prepare_create,
};

#[derive(Default)]
struct State {
    objects: BTreeMap<(Kind, ObjectKey), DynamicObject>,
    /// Last resource version handed out; versions are global, like an etcd revision
    version: u64,
}

impl State {
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    fn find_by_uid(&self, uid: Uuid) -> Option<&DynamicObject> {
        self.objects
            .values()
            .find(|object| object.metadata.uid == Some(uid))
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    events: broadcast::Sender<ObjectEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Mutex::new(State::default()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, kind: Kind, change: Change, object: &DynamicObject) {
        // No receivers is fine: nobody is watching yet
        let _ = self.events.send(ObjectEvent {
            kind,
            change,
            metadata: object.metadata.clone(),
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<DynamicObject> {
        self.lock()
            .objects
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })
    }

    async fn create(&self, object: DynamicObject) -> StoreResult<DynamicObject> {
        let mut object = prepare_create(object, chrono::Utc::now())?;
        let id = (object.kind, object.key());

        let created = {
            let mut state = self.lock();

            if state.objects.contains_key(&id) {
                return Err(StoreError::AlreadyExists {
                    kind: id.0,
                    key: id.1,
                });
            }

            if let Some(owner) = object.metadata.controller() {
                if state.find_by_uid(owner.uid).is_none() {
                    return Err(StoreError::Invalid(format!(
                        "owner {} {} (uid {}) does not exist",
                        owner.kind, owner.name, owner.uid
                    )));
                }
            }

            object.metadata.resource_version = state.next_version();
            state.objects.insert(id, object.clone());
            object
        };

        self.emit(created.kind, Change::Created, &created);
        Ok(created)
    }

    async fn replace(&self, object: DynamicObject) -> StoreResult<DynamicObject> {
        let updated = {
            let mut state = self.lock();
            let id = (object.kind, object.key());
            let existing = state
                .objects
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    kind: id.0,
                    key: id.1.clone(),
                })?;

            let mut merged = merge_replace(existing, object)?;
            merged.metadata.resource_version = state.next_version();
            state.objects.insert(id, merged.clone());
            merged
        };

        self.emit(updated.kind, Change::Modified, &updated);
        Ok(updated)
    }

    async fn replace_status(&self, object: DynamicObject) -> StoreResult<DynamicObject> {
        let updated = {
            let mut state = self.lock();
            let id = (object.kind, object.key());
            let existing = state
                .objects
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    kind: id.0,
                    key: id.1.clone(),
                })?;

            let mut merged = merge_status(existing, object)?;
            merged.metadata.resource_version = state.next_version();
            state.objects.insert(id, merged.clone());
            merged
        };

        self.emit(updated.kind, Change::Modified, &updated);
        Ok(updated)
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> StoreResult<()> {
        let removed = {
            let mut state = self.lock();
            let root = state
                .objects
                .remove(&(kind, key.clone()))
                .ok_or_else(|| StoreError::NotFound {
                    kind,
                    key: key.clone(),
                })?;

            // Garbage-collect everything the deleted objects controlled
            let mut removed = vec![root];
            let mut cursor = 0;
            while cursor < removed.len() {
                let Some(parent_uid) = removed[cursor].metadata.uid else {
                    cursor += 1;
                    continue;
                };

                let orphans: Vec<(Kind, ObjectKey)> = state
                    .objects
                    .iter()
                    .filter(|(_, object)| object.owner_uid() == Some(parent_uid))
                    .map(|(id, _)| id.clone())
                    .collect();

                for id in orphans {
                    if let Some(orphan) = state.objects.remove(&id) {
                        removed.push(orphan);
                    }
                }
                cursor += 1;
            }
            removed
        };

        for object in &removed {
            self.emit(object.kind, Change::Deleted, object);
        }
        Ok(())
    }

    async fn list(&self, kind: Kind, namespace: Option<&str>) -> StoreResult<Vec<DynamicObject>> {
        Ok(self
            .lock()
            .objects
            .values()
            .filter(|object| object.kind == kind)
            .filter(|object| namespace.is_none_or(|ns| object.metadata.namespace == ns))
            .cloned()
            .collect())
    }

    async fn list_owned(
        &self,
        kind: Kind,
        namespace: &str,
        owner: Uuid,
    ) -> StoreResult<Vec<DynamicObject>> {
        Ok(self
            .lock()
            .objects
            .values()
            .filter(|object| object.kind == kind && object.metadata.namespace == namespace)
            .filter(|object| object.owner_uid() == Some(owner))
            .cloned()
            .collect())
    }

    fn watch(&self) -> broadcast::Receiver<ObjectEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Api;
    use hedron_core::domain::meta::{OwnerReference, Resource};
    use hedron_core::domain::naming::ContentHash;
    use hedron_core::domain::project::{Project, ProjectSpec};
    use hedron_core::domain::revision::{Revision, RevisionSpec, RevisionStatus};
    use hedron_core::domain::meta::ObjectMeta;
    use std::sync::Arc;

    fn project(name: &str) -> Project {
        let mut spec = ProjectSpec::default();
        spec.image.name = "alpine:3".to_string();
        spec.repository.url = "https://example.com/demo.git".to_string();
        Project::new("default", name, spec)
    }

    fn revision_of(project: &Project, hash: &str) -> Revision {
        let mut metadata = ObjectMeta::new("default", format!("{}-{}", project.metadata.name, hash));
        metadata
            .owner_references
            .push(OwnerReference::controlled_by(project).unwrap());
        Revision {
            metadata,
            spec: RevisionSpec {
                project_ref: project.metadata.name.clone(),
                content_hash: ContentHash::parse(hash).unwrap(),
                image: Default::default(),
                repository: Default::default(),
            },
            status: RevisionStatus::default(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let projects = Api::<Project>::new(store);

        let created = projects.create(&project("demo")).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.resource_version > 0);
        assert_eq!(created.metadata.generation, 1);
        assert!(created.metadata.creation_timestamp.is_some());
    }

    #[tokio::test]
    async fn test_create_twice_is_already_exists() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let projects = Api::<Project>::new(store);

        projects.create(&project("demo")).await.unwrap();
        let err = projects.create(&project("demo")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let projects = Api::<Project>::new(store);

        let key = ObjectKey::new("default", "ghost");
        assert!(projects.get(&key).await.unwrap_err().is_not_found());
        assert!(projects.get_opt(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let projects = Api::<Project>::new(store);

        let created = projects.create(&project("demo")).await.unwrap();

        let mut first = created.clone();
        first.status.message = Some("first".to_string());
        projects.replace_status(&first).await.unwrap();

        let mut second = created;
        second.status.message = Some("second".to_string());
        let err = projects.replace_status(&second).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_create_with_unknown_owner_is_rejected() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let revisions = Api::<Revision>::new(store);

        let mut ghost = project("ghost");
        ghost.metadata.uid = Some(Uuid::new_v4());

        let err = revisions.create(&revision_of(&ghost, "abc123")).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_owned_objects() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let projects = Api::<Project>::new(store.clone());
        let revisions = Api::<Revision>::new(store.clone());

        let demo = projects.create(&project("demo")).await.unwrap();
        let other = projects.create(&project("other")).await.unwrap();
        revisions.create(&revision_of(&demo, "abc123")).await.unwrap();
        revisions.create(&revision_of(&demo, "def456")).await.unwrap();
        revisions.create(&revision_of(&other, "abc123")).await.unwrap();

        let owned = revisions
            .list_owned("default", demo.metadata.uid.unwrap())
            .await
            .unwrap();
        assert_eq!(owned.len(), 2);

        let mut events = store.watch();
        projects.delete(&demo.key()).await.unwrap();

        let remaining = revisions.list(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].metadata.name, "other-abc123");

        let mut deleted = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.change, Change::Deleted);
            deleted.push(event.key().name);
        }
        assert_eq!(deleted.len(), 3);
        assert!(deleted.contains(&"demo".to_string()));
    }

    #[tokio::test]
    async fn test_writes_emit_events() {
        let store = MemoryStore::new();
        let mut events = store.watch();
        let store: Arc<dyn ObjectStore> = Arc::new(store);
        let projects = Api::<Project>::new(store);

        let created = projects.create(&project("demo")).await.unwrap();
        let mut changed = created.clone();
        changed.spec.repository.reference = "develop".to_string();
        let replaced = projects.replace(&changed).await.unwrap();
        assert_eq!(replaced.metadata.generation, 2);

        let first = events.recv().await.unwrap();
        assert_eq!(first.change, Change::Created);
        assert_eq!(first.kind, Kind::Project);

        let second = events.recv().await.unwrap();
        assert_eq!(second.change, Change::Modified);
        assert_eq!(second.metadata.generation, 2);
    }
}
