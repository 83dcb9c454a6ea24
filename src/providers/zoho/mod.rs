pub mod auth;
pub mod gateway;
pub mod normalize;


use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use self::auth::CredentialManager;
use self::gateway::{resource_path, ApiVersion, Expect, Gateway};
use super::ProjectService;
use crate::config::AppConfig;
use crate::error::ZohoError;
use crate::model::bug::{Ack, NewBug};
use crate::model::project::{Project, Tasklist};
use crate::model::status::{Status, StatusCatalog};
use crate::model::task::{NewTask, Task};
use crate::model::token::AccessToken;

#[derive(Debug, Clone)]
enum TasklistSlot {
    Ready(Tasklist),
    Failed(String),
}

#[derive(Default)]
struct SessionCache {
    tasklists: HashMap<String, TasklistSlot>,
    catalogs: HashMap<String, StatusCatalog>,
}

pub struct ZohoService {
    portal_id: Option<String>,
    default_tasklist: String,
    seed: Vec<Status>,
    credentials: CredentialManager,
    gateway: Gateway,
    cache: Mutex<SessionCache>,
}

impl ZohoService {
    pub fn new(config: &AppConfig) -> Self {
        let zoho = &config.zoho;
        Self {
            portal_id: zoho.portal_id.clone().filter(|p| !p.trim().is_empty()),
            default_tasklist: zoho.default_tasklist.clone(),
            seed: config.seed_catalog(),
            credentials: CredentialManager::new(zoho),
            gateway: Gateway::new(
                &zoho.api_url,
                zoho.request_timeout_secs.map(Duration::from_secs),
                zoho.preview_limit,
            ),
            cache: Mutex::new(SessionCache::default()),
        }
    }

    fn path(&self, version: ApiVersion, segments: &[&str]) -> Result<String, ZohoError> {
        let portal = self
            .portal_id
            .as_deref()
            .ok_or_else(|| ZohoError::MissingConfiguration {
                missing: vec!["ZOHO_PORTAL_ID"],
            })?;
        Ok(resource_path(version, portal, segments))
    }

    fn require_project(project_id: &str) -> Result<&str, ZohoError> {
        let project_id = project_id.trim();
        if project_id.is_empty() {
            return Err(ZohoError::Validation {
                field: "Project id",
            });
        }
        Ok(project_id)
    }

    async fn try_fetch_catalog(
        &self,
        token: &AccessToken,
        project_id: &str,
    ) -> Result<StatusCatalog, ZohoError> {
        let path = self.path(ApiVersion::Rest, &["projects", project_id, "statuses"])?;
        let raw = self
            .gateway
            .call(Method::GET, &path, token, None, Expect::Collection)
            .await?;
        let catalog = StatusCatalog::from_upstream(normalize::statuses(&raw), &self.seed);
        if catalog.is_seeded() {
            info!(project_id, "no statuses upstream, using seed catalog");
        }
        self.cache
            .lock()
            .await
            .catalogs
            .insert(project_id.to_string(), catalog.clone());
        Ok(catalog)
    }

    // Seed fallbacks from failures are not cached.
    async fn fetch_catalog(&self, token: &AccessToken, project_id: &str) -> StatusCatalog {
        self.try_fetch_catalog(token, project_id)
            .await
            .unwrap_or_else(|err| {
                warn!(project_id, error = %err, "status catalog unavailable, using seed catalog");
                StatusCatalog::seeded(&self.seed)
            })
    }

    async fn catalog_for(
        &self,
        token: &AccessToken,
        project_id: &str,
    ) -> Result<StatusCatalog, ZohoError> {
        let cached = self.cache.lock().await.catalogs.get(project_id).cloned();
        if let Some(catalog) = cached {
            return Ok(catalog);
        }
        match self.try_fetch_catalog(token, project_id).await {
            Ok(catalog) => Ok(catalog),
            Err(ZohoError::Unauthorized) => Err(ZohoError::Unauthorized),
            Err(err) => {
                warn!(project_id, error = %err, "status catalog unavailable, using seed catalog");
                Ok(StatusCatalog::seeded(&self.seed))
            }
        }
    }

    async fn resolve_statuses(
        &self,
        token: &AccessToken,
        project_id: &str,
        tasks: &mut [Task],
    ) -> Result<(), ZohoError> {
        let mut catalog = self.catalog_for(token, project_id).await?;
        for task in tasks.iter_mut() {
            task.status = catalog.absorb(&task.status);
        }
        self.cache
            .lock()
            .await
            .catalogs
            .insert(project_id.to_string(), catalog);
        Ok(())
    }

    async fn find_tasklist(
        &self,
        token: &AccessToken,
        project_id: &str,
    ) -> Result<Option<Tasklist>, ZohoError> {
        let path = self.path(ApiVersion::V3, &["projects", project_id, "tasklists"])?;
        let raw = self
            .gateway
            .call(Method::GET, &path, token, None, Expect::Collection)
            .await?;
        let mut tasklists = normalize::tasklists(&raw, project_id);
        let preferred = tasklists
            .iter()
            .position(|tl| tl.name.eq_ignore_ascii_case(&self.default_tasklist))
            .unwrap_or(0);
        if tasklists.is_empty() {
            Ok(None)
        } else {
            Ok(Some(tasklists.swap_remove(preferred)))
        }
    }

    async fn create_tasklist(
        &self,
        token: &AccessToken,
        project_id: &str,
    ) -> Result<Tasklist, ZohoError> {
        let path = self.path(ApiVersion::V3, &["projects", project_id, "tasklists"])?;
        let body = json!({ "name": self.default_tasklist });
        let raw = self
            .gateway
            .call(Method::POST, &path, token, Some(&body), Expect::Write)
            .await?;

        if let Some(obj) = normalize::written(&raw, "tasklists", "tasklist") {
            let tasklist = normalize::tasklist(obj, project_id);
            if !tasklist.id.is_empty() {
                return Ok(tasklist);
            }
        }

        // Acknowledged without an id: look for what was just created.
        let listed = self.find_tasklist(token, project_id).await;
        Self::tasklist_after_ack(project_id, listed)
    }

    // The POST already went through, so every failure here uses up the
    // session's creation attempt, 401 included.
    fn tasklist_after_ack(
        project_id: &str,
        listed: Result<Option<Tasklist>, ZohoError>,
    ) -> Result<Tasklist, ZohoError> {
        let reason = match listed {
            Ok(Some(tasklist)) => return Ok(tasklist),
            Ok(None) => "tasklist creation was acknowledged but no tasklist appeared".to_string(),
            Err(err) => format!("tasklist creation was acknowledged but listing it failed: {err}"),
        };
        Err(ZohoError::PrerequisiteCreationFailed {
            project_id: project_id.to_string(),
            reason,
        })
    }

    /// Creation is attempted at most once per project per session.
    async fn ensure_tasklist(
        &self,
        token: &AccessToken,
        project_id: &str,
    ) -> Result<Tasklist, ZohoError> {
        let mut cache = self.cache.lock().await;
        match cache.tasklists.get(project_id) {
            Some(TasklistSlot::Ready(tasklist)) => return Ok(tasklist.clone()),
            Some(TasklistSlot::Failed(reason)) => {
                return Err(ZohoError::PrerequisiteCreationFailed {
                    project_id: project_id.to_string(),
                    reason: format!("earlier attempt this session failed: {reason}"),
                })
            }
            None => {}
        }

        if let Some(existing) = self.find_tasklist(token, project_id).await? {
            cache
                .tasklists
                .insert(project_id.to_string(), TasklistSlot::Ready(existing.clone()));
            return Ok(existing);
        }

        info!(project_id, name = %self.default_tasklist, "project has no tasklist, creating one");
        match self.create_tasklist(token, project_id).await {
            Ok(tasklist) => {
                cache
                    .tasklists
                    .insert(project_id.to_string(), TasklistSlot::Ready(tasklist.clone()));
                Ok(tasklist)
            }
            // The request was never authorized, so it does not use up the attempt.
            Err(ZohoError::Unauthorized) => Err(ZohoError::Unauthorized),
            Err(err) => {
                let reason = match err {
                    ZohoError::PrerequisiteCreationFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!(project_id, %reason, "tasklist creation failed");
                cache
                    .tasklists
                    .insert(project_id.to_string(), TasklistSlot::Failed(reason.clone()));
                Err(ZohoError::PrerequisiteCreationFailed {
                    project_id: project_id.to_string(),
                    reason,
                })
            }
        }
    }
}

#[async_trait]
impl ProjectService for ZohoService {
    async fn get_token(&self) -> Result<AccessToken, ZohoError> {
        self.credentials.current_or_acquire().await
    }

    async fn refresh_token(&self) -> Result<AccessToken, ZohoError> {
        self.credentials.invalidate().await;
        Ok(self.credentials.acquire().await?.access_token().clone())
    }

    async fn list_projects(&self, token: &AccessToken) -> Result<Vec<Project>, ZohoError> {
        let path = self.path(ApiVersion::V3, &["projects"])?;
        let raw = self
            .gateway
            .call(Method::GET, &path, token, None, Expect::Collection)
            .await?;
        Ok(normalize::projects(&raw))
    }

    async fn list_tasks(
        &self,
        token: &AccessToken,
        project_id: &str,
    ) -> Result<Vec<Task>, ZohoError> {
        let project_id = Self::require_project(project_id)?;
        let path = self.path(ApiVersion::Rest, &["projects", project_id, "tasks"])?;
        let raw = self
            .gateway
            .call(Method::GET, &path, token, None, Expect::Collection)
            .await?;
        let mut tasks = normalize::tasks(&raw, project_id);
        if !tasks.is_empty() {
            self.resolve_statuses(token, project_id, &mut tasks).await?;
        }
        Ok(tasks)
    }

    async fn list_statuses(&self, token: &AccessToken, project_id: &str) -> Vec<Status> {
        let catalog = match Self::require_project(project_id) {
            Ok(project_id) => self.fetch_catalog(token, project_id).await,
            Err(_) => StatusCatalog::seeded(&self.seed),
        };
        catalog.statuses().to_vec()
    }

    async fn create_task(
        &self,
        token: &AccessToken,
        project_id: &str,
        new: &NewTask,
    ) -> Result<Task, ZohoError> {
        let project_id = Self::require_project(project_id)?;
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ZohoError::Validation { field: "Task name" });
        }

        let tasklist = self.ensure_tasklist(token, project_id).await?;

        let path = self.path(ApiVersion::V3, &["projects", project_id, "tasks"])?;
        let body = json!({
            "name": name,
            "description": new.description,
            "priority": new.priority.as_str(),
            "tasklist": { "id": tasklist.id },
        });
        let raw = self
            .gateway
            .call(Method::POST, &path, token, Some(&body), Expect::Write)
            .await?;

        let mut task = Task {
            id: String::new(),
            project_id: project_id.to_string(),
            tasklist_id: Some(tasklist.id.clone()),
            name: name.to_string(),
            description: new.description.clone(),
            priority: new.priority,
            status: Status::open_sentinel(),
            owners: Vec::new(),
            created_by: None,
        };
        match normalize::written(&raw, "tasks", "task") {
            Some(obj) => {
                let created = normalize::task(obj, project_id);
                task.id = created.id;
                if created.tasklist_id.is_some() {
                    task.tasklist_id = created.tasklist_id;
                }
                if !created.name.is_empty() {
                    task.name = created.name;
                }
                task.status = created.status;
                task.owners = created.owners;
                task.created_by = created.created_by;
            }
            None => warn!(project_id, name, "task creation acknowledged without a task body"),
        }

        self.resolve_statuses(token, project_id, std::slice::from_mut(&mut task))
            .await?;
        info!(project_id, task_id = %task.id, tasklist_id = %tasklist.id, "task created");
        Ok(task)
    }

    async fn create_bug(
        &self,
        token: &AccessToken,
        project_id: &str,
        bug: &NewBug,
    ) -> Result<Ack, ZohoError> {
        let project_id = Self::require_project(project_id)?;
        let title = bug.title.trim();
        if title.is_empty() {
            return Err(ZohoError::Validation { field: "Bug title" });
        }

        let path = self.path(ApiVersion::V3, &["projects", project_id, "issues"])?;
        let body = json!({
            "name": title,
            "description": bug.description,
            "severity": bug.severity.as_str(),
        });
        let raw = self
            .gateway
            .call(Method::POST, &path, token, Some(&body), Expect::Write)
            .await?;
        let ack = normalize::ack(&raw, "Bug created successfully");
        info!(project_id, bug_id = ?ack.id, "bug created");
        Ok(ack)
    }

    async fn update_task_status(
        &self,
        token: &AccessToken,
        project_id: &str,
        task_id: &str,
        status: &str,
    ) -> Result<Ack, ZohoError> {
        let project_id = Self::require_project(project_id)?;
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(ZohoError::Validation { field: "Task id" });
        }
        if status.trim().is_empty() {
            return Err(ZohoError::Validation { field: "Status" });
        }

        let catalog = self.catalog_for(token, project_id).await?;
        let resolved = catalog
            .resolve(status)
            .filter(|s| !s.id.is_empty())
            .cloned()
            .ok_or_else(|| ZohoError::UnknownStatus {
                project_id: project_id.to_string(),
                requested: status.trim().to_string(),
            })?;

        let path = self.path(ApiVersion::Rest, &["projects", project_id, "tasks", task_id])?;
        let body = json!({ "custom_status": resolved.id });
        let raw = self
            .gateway
            .call(Method::POST, &path, token, Some(&body), Expect::Write)
            .await?;
        info!(project_id, task_id, status = %resolved.name, "task status updated");
        let mut ack = normalize::ack(&raw, &format!("Task moved to {}", resolved.name));
        ack.id.get_or_insert_with(|| task_id.to_string());
        Ok(ack)
    }
}
