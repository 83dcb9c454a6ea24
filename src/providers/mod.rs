pub mod zoho;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ZohoError;
use crate::model::bug::{Ack, NewBug};
use crate::model::project::Project;
use crate::model::status::Status;
use crate::model::task::{NewTask, Task};
use crate::model::token::AccessToken;

/// Everything the panel can ask of the project-management backend.
#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn get_token(&self) -> Result<AccessToken, ZohoError>;
    async fn refresh_token(&self) -> Result<AccessToken, ZohoError>;
    async fn list_projects(&self, token: &AccessToken) -> Result<Vec<Project>, ZohoError>;
    async fn list_tasks(
        &self,
        token: &AccessToken,
        project_id: &str,
    ) -> Result<Vec<Task>, ZohoError>;
    /// Never fails: falls back to the seed catalog.
    async fn list_statuses(&self, token: &AccessToken, project_id: &str) -> Vec<Status>;
    async fn create_task(
        &self,
        token: &AccessToken,
        project_id: &str,
        task: &NewTask,
    ) -> Result<Task, ZohoError>;
    async fn create_bug(
        &self,
        token: &AccessToken,
        project_id: &str,
        bug: &NewBug,
    ) -> Result<Ack, ZohoError>;
    async fn update_task_status(
        &self,
        token: &AccessToken,
        project_id: &str,
        task_id: &str,
        status: &str,
    ) -> Result<Ack, ZohoError>;
}


pub fn create_service(config: &AppConfig) -> Arc<dyn ProjectService> {
    Arc::new(zoho::ZohoService::new(config))
}
