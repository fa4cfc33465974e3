//! Job API endpoints

use hedron_core::domain::job::{Job, JobStatus};

use crate::ControllerClient;
use crate::error::Result;

impl ControllerClient {
    /// Get a job by namespace and name
    pub async fn get_job(&self, namespace: &str, name: &str) -> Result<Job> {
        let url = format!("{}/api/jobs/{}/{}", self.base_url, namespace, name);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Report a job's completion counters
    ///
    /// This is how an execution backend tells the controller that a job
    /// started, succeeded or failed. The owning revision's state follows.
    pub async fn report_job_status(&self, namespace: &str, name: &str, status: &JobStatus) -> Result<Job> {
        let url = format!("{}/api/jobs/{}/{}/status", self.base_url, namespace, name);
        let response = self.client.put(&url).json(status).send().await?;

        self.handle_response(response).await
    }
}
