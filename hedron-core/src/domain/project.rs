//! Project domain types

use serde::{Deserialize, Serialize};

use super::meta::{Kind, ObjectMeta, Resource};

/// A build pipeline definition
///
/// Created and edited by users. The controller only ever writes its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub metadata: ObjectMeta,
    pub spec: ProjectSpec,
    #[serde(default)]
    pub status: ProjectStatus,
}

impl Project {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: ProjectSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: ProjectStatus::default(),
        }
    }
}

impl Resource for Project {
    const KIND: Kind = Kind::Project;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub image: Image,
    pub repository: Repository,
}

/// Container image the build runs in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
}

/// Source repository the build is taken from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub url: String,
    /// Branch, tag or full reference name. Empty means the remote's HEAD.
    #[serde(default)]
    pub reference: String,
}

/// Observed state written by the controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    /// Name of the Revision built from the most recently resolved HEAD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_revision: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_content_hash: Option<String>,

    /// Why the last reconcile could not resolve the repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub observed_generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_deserializes_without_status() {
        let json = serde_json::json!({
            "metadata": { "name": "demo", "namespace": "default" },
            "spec": {
                "image": { "name": "alpine:3", "cmd": ["make", "test"] },
                "repository": { "url": "https://example.com/demo.git", "reference": "main" }
            }
        });

        let project: Project = serde_json::from_value(json).unwrap();
        assert_eq!(project.metadata.name, "demo");
        assert_eq!(project.spec.image.cmd, vec!["make", "test"]);
        assert!(project.spec.image.entrypoint.is_empty());
        assert_eq!(project.status, ProjectStatus::default());
    }
}
