//! Project API endpoints

use hedron_core::domain::project::Project;
use hedron_core::domain::revision::Revision;
use hedron_core::dto::project::{CreateProject, UpdateProject};

use crate::ControllerClient;
use crate::error::Result;

impl ControllerClient {
    /// Create a new project
    pub async fn create_project(&self, req: CreateProject) -> Result<Project> {
        let url = format!("{}/api/projects", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Replace a project's spec
    ///
    /// The controller bumps the generation, which triggers a fresh resolve.
    pub async fn update_project(&self, namespace: &str, name: &str, req: UpdateProject) -> Result<Project> {
        let url = format!("{}/api/projects/{}/{}", self.base_url, namespace, name);
        let response = self.client.put(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// List projects, optionally restricted to one namespace
    pub async fn list_projects(&self, namespace: Option<&str>) -> Result<Vec<Project>> {
        let url = format!("{}/api/projects", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(namespace) = namespace {
            request = request.query(&[("namespace", namespace)]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// Get a project by namespace and name
    pub async fn get_project(&self, namespace: &str, name: &str) -> Result<Project> {
        let url = format!("{}/api/projects/{}/{}", self.base_url, namespace, name);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Delete a project
    ///
    /// Its revisions and jobs are garbage collected along with it.
    pub async fn delete_project(&self, namespace: &str, name: &str) -> Result<()> {
        let url = format!("{}/api/projects/{}/{}", self.base_url, namespace, name);
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    /// List the revisions owned by a project
    pub async fn list_project_revisions(&self, namespace: &str, name: &str) -> Result<Vec<Revision>> {
        let url = format!("{}/api/projects/{}/{}/revisions", self.base_url, namespace, name);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
