use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ZohoError;
use crate::model::bug::{Ack, NewBug};
use crate::model::filter::TaskFilter;
use crate::model::project::Project;
use crate::model::status::Status;
use crate::model::task::{NewTask, Task};
use crate::model::token::AccessToken;
use crate::providers::ProjectService;

#[derive(Debug, Clone)]
pub enum Action {
    TokenRenewed(AccessToken),
    TasksLoaded {
        ticket: FetchTicket,
        tasks: Vec<Task>,
        statuses: Vec<Status>,
    },
    FetchError {
        ticket: FetchTicket,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub project_id: String,
    pub generation: u64,
}

pub struct App {
    pub token: Option<AccessToken>,
    pub projects: Vec<Project>,
    pub selected_project: Option<String>,
    pub tasks: Vec<Task>,
    pub statuses: Vec<Status>,
    pub filter: TaskFilter,
    pub loading: bool,
    pub flash_message: Option<(String, Instant)>,
    pub debug: bool,
    generation: u64,
    service: Arc<dyn ProjectService>,
    action_tx: mpsc::UnboundedSender<Action>,
}

async fn with_reauth<T, F, Fut>(
    service: Arc<dyn ProjectService>,
    token: AccessToken,
    op: F,
) -> (Result<T, ZohoError>, Option<AccessToken>)
where
    F: Fn(Arc<dyn ProjectService>, AccessToken) -> Fut,
    Fut: Future<Output = Result<T, ZohoError>>,
{
    match op(Arc::clone(&service), token).await {
        Err(ZohoError::Unauthorized) => {
            warn!("access token rejected, renewing");
            match service.refresh_token().await {
                Ok(fresh) => (op(service, fresh.clone()).await, Some(fresh)),
                Err(err) => (Err(err), None),
            }
        }
        other => (other, None),
    }
}

impl App {
    pub fn new(
        service: Arc<dyn ProjectService>,
        action_tx: mpsc::UnboundedSender<Action>,
        debug: bool,
    ) -> Self {
        Self {
            token: None,
            projects: Vec::new(),
            selected_project: None,
            tasks: Vec::new(),
            statuses: Vec::new(),
            filter: TaskFilter::default(),
            loading: false,
            flash_message: None,
            debug,
            generation: 0,
            service,
            action_tx,
        }
    }

    pub async fn init(&mut self, preferred_project: Option<&str>) -> Result<(), ZohoError> {
        let token = match self.service.get_token().await {
            Ok(token) => token,
            Err(err) => {
                self.flash(self.report(&err));
                return Err(err);
            }
        };
        self.token = Some(token);

        let projects = self
            .authorized(|svc, token| async move { svc.list_projects(&token).await })
            .await?;
        info!(count = projects.len(), "projects loaded");
        self.projects = projects;

        let chosen = preferred_project
            .and_then(|want| {
                self.projects
                    .iter()
                    .find(|p| p.id == want || p.name.eq_ignore_ascii_case(want))
            })
            .or_else(|| self.projects.first())
            .map(|p| p.id.clone());

        match chosen {
            Some(project_id) => {
                self.select_project(&project_id);
            }
            None => self.flash("No projects found".into()),
        }
        Ok(())
    }

    pub fn update(&mut self, action: Action) {
        if let Some((_, t)) = &self.flash_message {
            if t.elapsed().as_secs() >= 3 {
                self.flash_message = None;
            }
        }

        match action {
            Action::TokenRenewed(token) => {
                self.token = Some(token);
            }
            Action::TasksLoaded {
                ticket,
                tasks,
                statuses,
            } => {
                if !self.is_current(&ticket) {
                    debug!(project_id = %ticket.project_id, "discarding stale task list");
                    return;
                }
                self.tasks = tasks;
                self.statuses = statuses;
                self.loading = false;
            }
            Action::FetchError { ticket, message } => {
                if !self.is_current(&ticket) {
                    return;
                }
                self.loading = false;
                self.flash(format!("Fetch error: {message}"));
            }
        }
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
            && self.selected_project.as_deref() == Some(ticket.project_id.as_str())
    }

    pub fn select_project(&mut self, project_id: &str) -> Option<FetchTicket> {
        let project_id = project_id.trim();
        if project_id.is_empty() {
            return None;
        }
        self.selected_project = Some(project_id.to_string());
        self.tasks.clear();
        self.statuses.clear();
        self.request_tasks()
    }

    pub fn selected_project(&self) -> Option<&Project> {
        let id = self.selected_project.as_deref()?;
        self.projects.iter().find(|p| p.id == id)
    }

    // The outcome arrives as an `Action` tagged with the returned ticket.
    pub fn request_tasks(&mut self) -> Option<FetchTicket> {
        let project_id = self.selected_project.clone()?;
        let Some(token) = self.token.clone() else {
            self.flash("Not signed in".into());
            return None;
        };

        self.generation += 1;
        let ticket = FetchTicket {
            project_id,
            generation: self.generation,
        };
        self.loading = true;

        let service = Arc::clone(&self.service);
        let tx = self.action_tx.clone();
        let debug = self.debug;
        let spawned = ticket.clone();
        tokio::spawn(async move {
            let project_id = spawned.project_id.clone();
            let (result, renewed) = with_reauth(Arc::clone(&service), token.clone(), {
                let project_id = project_id.clone();
                move |svc: Arc<dyn ProjectService>, token: AccessToken| {
                    let project_id = project_id.clone();
                    async move { svc.list_tasks(&token, &project_id).await }
                }
            })
            .await;
            let token = match renewed {
                Some(fresh) => {
                    let _ = tx.send(Action::TokenRenewed(fresh.clone()));
                    fresh
                }
                None => token,
            };

            let action = match result {
                Ok(tasks) => {
                    let statuses = service.list_statuses(&token, &project_id).await;
                    Action::TasksLoaded {
                        ticket: spawned,
                        tasks,
                        statuses,
                    }
                }
                Err(err) => {
                    warn!(%project_id, error = %err, "task fetch failed");
                    Action::FetchError {
                        ticket: spawned,
                        message: err.report(debug),
                    }
                }
            };
            let _ = tx.send(action);
        });

        Some(ticket)
    }

    pub async fn create_task(&mut self, task: NewTask) -> Result<Task, ZohoError> {
        let project_id = self.require_project()?;
        let created = self
            .authorized(move |svc, token| {
                let project_id = project_id.clone();
                let task = task.clone();
                async move { svc.create_task(&token, &project_id, &task).await }
            })
            .await?;
        self.flash(format!("Task created: {}", created.name));
        self.request_tasks();
        Ok(created)
    }

    pub async fn create_bug(&mut self, bug: NewBug) -> Result<Ack, ZohoError> {
        let project_id = self.require_project()?;
        let ack = self
            .authorized(move |svc, token| {
                let project_id = project_id.clone();
                let bug = bug.clone();
                async move { svc.create_bug(&token, &project_id, &bug).await }
            })
            .await?;
        self.flash(ack.message.clone());
        self.request_tasks();
        Ok(ack)
    }

    pub async fn update_task_status(
        &mut self,
        task_id: &str,
        status: &str,
    ) -> Result<Ack, ZohoError> {
        let project_id = self.require_project()?;
        let task_id = task_id.to_string();
        let status = status.to_string();
        let ack = self
            .authorized(move |svc, token| {
                let project_id = project_id.clone();
                let task_id = task_id.clone();
                let status = status.clone();
                async move {
                    svc.update_task_status(&token, &project_id, &task_id, &status)
                        .await
                }
            })
            .await?;
        self.flash(ack.message.clone());
        self.request_tasks();
        Ok(ack)
    }

    pub fn set_search(&mut self, term: &str) {
        self.filter.search = term.to_string();
    }

    pub fn set_requester_email(&mut self, email: &str) {
        self.filter.requester_email = email.to_string();
    }

    pub fn visible_tasks(&self) -> Vec<&Task> {
        self.filter.apply(&self.tasks)
    }

    pub fn report(&self, err: &ZohoError) -> String {
        err.report(self.debug)
    }

    fn flash(&mut self, message: String) {
        self.flash_message = Some((message, Instant::now()));
    }

    fn require_project(&self) -> Result<String, ZohoError> {
        self.selected_project.clone().ok_or(ZohoError::Validation {
            field: "Project",
        })
    }

    async fn current_token(&mut self) -> Result<AccessToken, ZohoError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let token = self.service.get_token().await?;
        self.token = Some(token.clone());
        Ok(token)
    }

    async fn authorized<T, F, Fut>(&mut self, op: F) -> Result<T, ZohoError>
    where
        F: Fn(Arc<dyn ProjectService>, AccessToken) -> Fut,
        Fut: Future<Output = Result<T, ZohoError>>,
    {
        let token = self.current_token().await?;
        let (result, renewed) = with_reauth(Arc::clone(&self.service), token, op).await;
        if let Some(fresh) = renewed {
            self.token = Some(fresh);
        }
        if let Err(err) = &result {
            self.flash(self.report(err));
        }
        result
    }
}
