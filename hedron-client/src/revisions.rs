//! Revision API endpoints

use hedron_core::domain::revision::Revision;

use crate::ControllerClient;
use crate::error::Result;

impl ControllerClient {
    /// Get a revision by namespace and name
    pub async fn get_revision(&self, namespace: &str, name: &str) -> Result<Revision> {
        let url = format!("{}/api/revisions/{}/{}", self.base_url, namespace, name);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
