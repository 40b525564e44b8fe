use chrono::{DateTime, Utc};
use listshare_store::FieldOps;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::live::Keyed;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

const TAG_PALETTE: [&str; 8] = [
    "#3b82f6", "#ef4444", "#10b981", "#f59e0b", "#8b5cf6", "#ec4899", "#14b8a6", "#f97316",
];

/// Display color for a tag without one. Stable for a given name.
pub fn palette_color(name: &str) -> &'static str {
    let sum = name
        .to_lowercase()
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    TAG_PALETTE[sum % TAG_PALETTE.len()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl Tag {
    pub fn new(name: &str, color: Option<&str>) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_argument("tag name cannot be empty"));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            color: color.unwrap_or_else(|| palette_color(name)).to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl SubTask {
    pub fn new(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::invalid_argument("subtask text cannot be empty"));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            completed: false,
        })
    }
}

/// A task. Access is derived entirely from the list it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<DateTime<Utc>>,
    pub list_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub subtasks: Vec<SubTask>,
    /// Creator of the task, not the list owner
    #[serde(alias = "userId")]
    pub owner_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn subtask_progress(&self) -> (usize, usize) {
        let done = self.subtasks.iter().filter(|s| s.completed).count();
        (done, self.subtasks.len())
    }
}

impl Keyed for Task {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Fields for a new task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder: Option<DateTime<Utc>>,
    pub category_id: Option<String>,
    pub tags: Vec<Tag>,
    pub subtasks: Vec<SubTask>,
}

impl NewTask {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn reminder(mut self, at: DateTime<Utc>) -> Self {
        self.reminder = Some(at);
        self
    }

    pub fn category(mut self, category_id: &str) -> Self {
        self.category_id = Some(category_id.to_string());
        self
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub(crate) fn into_ops(self, list_id: &str, owner_id: &str) -> Result<FieldOps> {
        let title = validate_title(&self.title)?;
        check_unique_tags(&self.tags)?;
        let mut ops = FieldOps::new()
            .set("title", title)
            .set("completed", false)
            .set_json("priority", &self.priority)?
            .set("listId", list_id)
            .set("ownerId", owner_id)
            .set_json("tags", &self.tags)?
            .set_json("subtasks", &self.subtasks)?
            .server_timestamp("createdAt")
            .server_timestamp("updatedAt");
        if let Some(description) = self.description {
            ops = ops.set("description", description);
        }
        if let Some(due) = self.due_date {
            ops = ops.set_json("dueDate", &due)?;
        }
        if let Some(reminder) = self.reminder {
            ops = ops.set_json("reminder", &reminder)?;
        }
        if let Some(category_id) = self.category_id {
            ops = ops.set("categoryId", category_id);
        }
        Ok(ops)
    }
}

/// Partial update of a task. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub reminder: Option<Option<DateTime<Utc>>>,
    pub category_id: Option<Option<String>>,
    pub tags: Option<Vec<Tag>>,
    pub subtasks: Option<Vec<SubTask>>,
}

impl TaskPatch {
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn due_date(mut self, due: Option<DateTime<Utc>>) -> Self {
        self.due_date = Some(due);
        self
    }

    pub(crate) fn into_ops(self) -> Result<FieldOps> {
        let mut ops = FieldOps::new();
        if let Some(title) = self.title {
            ops = ops.set("title", validate_title(&title)?);
        }
        ops = set_or_remove(ops, "description", self.description)?;
        if let Some(completed) = self.completed {
            ops = ops.set("completed", completed);
        }
        if let Some(priority) = self.priority {
            ops = ops.set_json("priority", &priority)?;
        }
        ops = set_or_remove(ops, "dueDate", self.due_date)?;
        ops = set_or_remove(ops, "reminder", self.reminder)?;
        ops = set_or_remove(ops, "categoryId", self.category_id)?;
        if let Some(tags) = self.tags {
            check_unique_tags(&tags)?;
            ops = ops.set_json("tags", &tags)?;
        }
        if let Some(subtasks) = self.subtasks {
            ops = ops.set_json("subtasks", &subtasks)?;
        }
        Ok(ops.server_timestamp("updatedAt"))
    }
}

fn set_or_remove<T: Serialize>(ops: FieldOps, field: &str, value: Option<Option<T>>) -> Result<FieldOps> {
    Ok(match value {
        Some(Some(v)) => ops.set_json(field, &v)?,
        Some(None) => ops.remove(field),
        None => ops,
    })
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::invalid_argument("task title cannot be empty"));
    }
    Ok(title.to_string())
}

pub(crate) fn check_unique_tags(tags: &[Tag]) -> Result<()> {
    for (i, tag) in tags.iter().enumerate() {
        if tags[..i].iter().any(|t| t.name.eq_ignore_ascii_case(&tag.name)) {
            return Err(Error::invalid_argument(format!("duplicate tag: {}", tag.name)));
        }
    }
    Ok(())
}
