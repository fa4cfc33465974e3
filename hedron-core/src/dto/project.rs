//! Project DTOs

use serde::{Deserialize, Serialize};

use crate::domain::meta::DEFAULT_NAMESPACE;
use crate::domain::project::ProjectSpec;

/// Request to create a new project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub spec: ProjectSpec,
}

impl CreateProject {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }
}

/// Request to replace a project's spec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProject {
    pub spec: ProjectSpec,
}
