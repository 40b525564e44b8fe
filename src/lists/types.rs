use chrono::{DateTime, Utc};
use listshare_store::{FieldOps, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::permission::Permission;
use crate::error::{Error, Result};
use crate::live::Keyed;

/// One collaborator's grant on a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareEntry {
    pub email: String,
    pub permission: Permission,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_by: Option<String>,
}

/// A shared to-do list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Owner email; holds admin and never appears in `shared_with`
    pub owner: String,
    #[serde(default)]
    pub shared_with: Vec<ShareEntry>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl List {
    pub fn grant_for(&self, email: &str) -> Option<&ShareEntry> {
        self.shared_with.iter().find(|s| s.email == email)
    }
}

impl Keyed for List {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Changes to a list's presentation fields. Owner and grants are changed
/// only through the sharing operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    /// `Some(None)` clears the icon
    pub icon: Option<Option<String>>,
}

impl ListPatch {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    pub fn icon(mut self, icon: Option<&str>) -> Self {
        self.icon = Some(icon.map(str::to_string));
        self
    }

    pub(crate) fn into_ops(self) -> Result<FieldOps> {
        let mut ops = FieldOps::new();
        if let Some(name) = self.name {
            ops = ops.set("name", validate_name(&name)?);
        }
        if let Some(color) = self.color {
            ops = ops.set("color", color);
        }
        match self.icon {
            Some(Some(icon)) => ops = ops.set("icon", icon),
            Some(None) => ops = ops.remove("icon"),
            None => {}
        }
        Ok(ops.server_timestamp("updatedAt"))
    }
}

/// Result of a successful share
#[derive(Debug, Clone)]
pub struct ShareOutcome {
    pub list: List,
    /// Id of the `list_shared` notification, if sending it succeeded
    pub notification_id: Option<String>,
}

pub(crate) fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_argument("name cannot be empty"));
    }
    Ok(name.to_string())
}

/// Set ops replacing the grant array together with its email index.
pub(crate) fn grant_ops(grants: &[ShareEntry]) -> std::result::Result<FieldOps, StoreError> {
    let emails: Vec<Value> = grants
        .iter()
        .map(|g| Value::String(g.email.clone()))
        .collect();
    Ok(FieldOps::new()
        .set_json("sharedWith", &grants)?
        .set("sharedWithEmails", Value::Array(emails))
        .server_timestamp("updatedAt"))
}
