//! Reusable task templates
//!
//! A template is a named set of task skeletons owned by its creator. Applying
//! it to a list creates one task per skeleton.

use chrono::{DateTime, Utc};
use listshare_store::{FieldOps, Query};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::types::{NewTask, Priority};
use super::TaskService;
use crate::collections::TEMPLATES;
use crate::error::{Error, Result};
use crate::lists::Action;
use crate::live::{run_merged, Keyed, LiveQuery, MergedFeed};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl TemplateTask {
    pub fn new(title: &str, priority: Priority) -> Self {
        Self {
            title: title.to_string(),
            description: None,
            priority,
            due_date: None,
        }
    }

    fn to_new_task(&self) -> NewTask {
        NewTask {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            due_date: self.due_date,
            ..NewTask::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TemplateTask>,
    pub created_by: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Keyed for TaskTemplate {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    pub tasks: Vec<TemplateTask>,
}

impl NewTemplate {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn task(mut self, task: TemplateTask) -> Self {
        self.tasks.push(task);
        self
    }
}

fn by_name(templates: &mut Vec<TaskTemplate>) {
    templates.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
}

impl TaskService {
    pub async fn create_template(&self, session: &Session, template: NewTemplate) -> Result<String> {
        let principal = session.ensure_active()?;
        let name = template.name.trim();
        if name.is_empty() {
            return Err(Error::invalid_argument("template name cannot be empty"));
        }
        if template.tasks.iter().any(|t| t.title.trim().is_empty()) {
            return Err(Error::invalid_argument("template task title cannot be empty"));
        }
        let mut ops = FieldOps::new()
            .set("name", name)
            .set_json("tasks", &template.tasks)?
            .set("createdBy", principal.id.as_str())
            .server_timestamp("createdAt");
        if let Some(description) = template.description {
            ops = ops.set("description", description);
        }
        let doc = self.store.create(TEMPLATES, ops).await?;
        info!(template_id = %doc.id, "created template");
        Ok(doc.id)
    }

    /// Live view of the principal's templates, by name.
    pub async fn list_templates(&self, session: &Session) -> Result<LiveQuery<TaskTemplate>> {
        let principal = session.ensure_active()?;
        let stream = self
            .store
            .watch(TEMPLATES, Query::new().eq("createdBy", principal.id.as_str()))
            .await?;
        let feed = MergedFeed::new(TEMPLATES, 1, by_name);
        Ok(LiveQuery::spawn(session, move |tx| run_merged(vec![stream], feed, tx)))
    }

    async fn own_template(&self, session: &Session, template_id: &str) -> Result<TaskTemplate> {
        let principal = session.ensure_active()?;
        let template: TaskTemplate = self.store.get(TEMPLATES, template_id).await?.decode()?;
        if template.created_by != principal.id {
            return Err(Error::permission_denied(format!(
                "template {template_id} belongs to another user"
            )));
        }
        Ok(template)
    }

    pub async fn delete_template(&self, session: &Session, template_id: &str) -> Result<()> {
        self.own_template(session, template_id).await?;
        self.store.delete(TEMPLATES, template_id).await?;
        info!(template_id, "deleted template");
        Ok(())
    }

    /// Create one task per template entry in `list_id`. Requires write on
    /// the list. Returns the new task ids in template order.
    pub async fn apply_template(&self, session: &Session, list_id: &str, template_id: &str) -> Result<Vec<String>> {
        self.authorize_list(session, list_id, Action::Edit).await?;
        let template = self.own_template(session, template_id).await?;
        let mut ids = Vec::with_capacity(template.tasks.len());
        for task in &template.tasks {
            ids.push(self.create_task(session, list_id, task.to_new_task()).await?);
        }
        info!(template_id, list_id, tasks = ids.len(), "applied template");
        Ok(ids)
    }
}
