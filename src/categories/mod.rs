//! Per-user task categories

use std::sync::Arc;

use chrono::{DateTime, Utc};
use listshare_store::{DocumentStore, FieldOps, Query};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::collections::CATEGORIES;
use crate::error::{Error, Result};
use crate::live::{run_merged, Keyed, LiveQuery, MergedFeed};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Keyed for Category {
    fn key(&self) -> &str {
        &self.id
    }
}

fn by_created(categories: &mut Vec<Category>) {
    categories.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[derive(Clone)]
pub struct CategoryService {
    store: Arc<dyn DocumentStore>,
}

impl CategoryService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create_category(
        &self,
        session: &Session,
        name: &str,
        color: &str,
        icon: Option<&str>,
    ) -> Result<String> {
        let principal = session.ensure_active()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_argument("category name cannot be empty"));
        }
        let mut ops = FieldOps::new()
            .set("name", name)
            .set("color", color)
            .set("userId", principal.id.as_str())
            .server_timestamp("createdAt");
        if let Some(icon) = icon {
            ops = ops.set("icon", icon);
        }
        let doc = self.store.create(CATEGORIES, ops).await?;
        info!(category_id = %doc.id, "created category");
        Ok(doc.id)
    }

    /// Live view of the principal's categories, oldest first.
    pub async fn list_categories(&self, session: &Session) -> Result<LiveQuery<Category>> {
        let principal = session.ensure_active()?;
        let stream = self
            .store
            .watch(CATEGORIES, Query::new().eq("userId", principal.id.as_str()))
            .await?;
        let feed = MergedFeed::new(CATEGORIES, 1, by_created);
        Ok(LiveQuery::spawn(session, move |tx| run_merged(vec![stream], feed, tx)))
    }

    pub async fn delete_category(&self, session: &Session, category_id: &str) -> Result<()> {
        let principal = session.ensure_active()?;
        let category: Category = self.store.get(CATEGORIES, category_id).await?.decode()?;
        if category.user_id != principal.id {
            return Err(Error::permission_denied(format!(
                "category {category_id} belongs to another user"
            )));
        }
        self.store.delete(CATEGORIES, category_id).await?;
        info!(category_id, "deleted category");
        Ok(())
    }
}
