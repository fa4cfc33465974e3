//! Object metadata shared by every stored kind
//!
//! Children point at their parent through an [`OwnerReference`] carrying the
//! parent's kind, name and uid. The store uses the uid for its owner index and
//! for cascading deletion; the controller uses the name to re-derive the
//! parent's key when a child changes.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Label carried by Revisions and Jobs naming the Project they were built from
pub const LABEL_PROJECT: &str = "hedron.build/project";

/// Label carried by Jobs naming the Revision they execute
pub const LABEL_REVISION: &str = "hedron.build/revision";

/// Namespace used when a request does not name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Object kinds known to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    Project,
    Revision,
    Job,
}

impl Kind {
    pub const ALL: [Kind; 3] = [Kind::Project, Kind::Revision, Kind::Job];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Project => "Project",
            Kind::Revision => "Revision",
            Kind::Job => "Job",
        }
    }

    pub fn parse(s: &str) -> Option<Kind> {
        match s {
            "Project" => Some(Kind::Project),
            "Revision" => Some(Kind::Revision),
            "Job" => Some(Kind::Job),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespaced name addressing a single object of a given kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference from a child object to the object that controls it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: Kind,
    pub name: String,
    pub uid: Uuid,
    /// Only the controlling owner drives garbage collection and re-triggering
    #[serde(default)]
    pub controller: bool,
}

impl OwnerReference {
    /// Builds a controller reference pointing at `parent`
    ///
    /// The parent must already be persisted: its uid is assigned by the store
    /// on creation and is what cascading deletion keys on.
    pub fn controlled_by<P: Resource>(parent: &P) -> Result<Self, MetaError> {
        let meta = parent.metadata();
        let uid = meta.uid.ok_or_else(|| MetaError::NotPersisted {
            kind: P::KIND,
            name: meta.name.clone(),
        })?;

        Ok(Self {
            kind: P::KIND,
            name: meta.name.clone(),
            uid,
            controller: true,
        })
    }
}

/// Metadata common to all stored objects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,

    /// Assigned by the store on creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,

    /// Optimistic concurrency token, bumped by the store on every write.
    /// Zero means the object has never been persisted.
    #[serde(default)]
    pub resource_version: u64,

    /// Bumped by the store whenever `spec` changes
    #[serde(default)]
    pub generation: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<chrono::DateTime<chrono::Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// The controlling owner, if any
    pub fn controller(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|owner| owner.controller)
    }

    /// Whether `uid` is the controlling owner of this object
    pub fn is_controlled_by(&self, uid: Uuid) -> bool {
        self.controller().is_some_and(|owner| owner.uid == uid)
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A kind of object that can be held by the store
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: Kind;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.metadata().key()
    }
}

/// Errors raised while building or validating object metadata
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    #[error("{kind} {name} has not been persisted yet and cannot own children")]
    NotPersisted { kind: Kind, name: String },

    #[error("invalid object name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid content hash {hash:?}: {reason}")]
    InvalidContentHash { hash: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::{Project, ProjectSpec};

    #[test]
    fn test_controlled_by_requires_uid() {
        let project = Project::new("default", "demo", ProjectSpec::default());
        let err = OwnerReference::controlled_by(&project).unwrap_err();
        assert!(matches!(err, MetaError::NotPersisted { kind: Kind::Project, .. }));
    }

    #[test]
    fn test_controlled_by_copies_identity() {
        let mut project = Project::new("default", "demo", ProjectSpec::default());
        let uid = Uuid::new_v4();
        project.metadata.uid = Some(uid);

        let owner = OwnerReference::controlled_by(&project).unwrap();
        assert_eq!(owner.kind, Kind::Project);
        assert_eq!(owner.name, "demo");
        assert_eq!(owner.uid, uid);
        assert!(owner.controller);
    }

    #[test]
    fn test_controller_ignores_non_controlling_owners() {
        let mut meta = ObjectMeta::new("default", "child");
        meta.owner_references.push(OwnerReference {
            kind: Kind::Project,
            name: "watcher".to_string(),
            uid: Uuid::new_v4(),
            controller: false,
        });
        assert!(meta.controller().is_none());

        let uid = Uuid::new_v4();
        meta.owner_references.push(OwnerReference {
            kind: Kind::Revision,
            name: "parent".to_string(),
            uid,
            controller: true,
        });
        assert_eq!(meta.controller().map(|o| o.name.as_str()), Some("parent"));
        assert!(meta.is_controlled_by(uid));
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in Kind::ALL {
            assert_eq!(Kind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(Kind::parse("Pod"), None);
    }
}
