//! Notification layer
//!
//! Append-only feed keyed by recipient email. Notifications are created as a
//! side effect of other operations and only ever change by being marked read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use listshare_auth::Principal;
use listshare_store::{DocumentStore, FieldOps, Precondition, Query};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::collections::NOTIFICATIONS;
use crate::error::{Error, Result};
use crate::lists::{validate_email, List};
use crate::live::{run_merged, Keyed, LiveQuery, MergedFeed};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ListShared,
    TaskAssigned,
    TaskCompleted,
}

/// Correlation payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub recipient_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NotificationData>,
}

impl Keyed for Notification {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub recipient_email: String,
    pub data: Option<NotificationData>,
}

impl NewNotification {
    /// Notice sent to a grantee when a list is shared with them.
    pub fn list_shared(sharer: &Principal, list: &List, recipient_email: &str) -> Self {
        Self {
            kind: NotificationType::ListShared,
            title: "List shared with you".to_string(),
            message: format!("{} shared \"{}\" with you", sharer.email, list.name),
            recipient_email: recipient_email.to_string(),
            data: Some(NotificationData {
                list_id: Some(list.id.clone()),
                task_id: None,
                sender_id: Some(sharer.id.clone()),
            }),
        }
    }
}

/// Unread notifications in a snapshot.
pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}

fn newest_first(notifications: &mut Vec<Notification>) {
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Notification layer
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn DocumentStore>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Append a notification, unread. Returns its id.
    pub async fn create_notification(&self, notification: NewNotification) -> Result<String> {
        let recipient = validate_email(&notification.recipient_email)?;
        let mut ops = FieldOps::new()
            .set_json("type", &notification.kind)?
            .set("title", notification.title)
            .set("message", notification.message)
            .set("read", false)
            .set("recipientEmail", recipient.as_str())
            .server_timestamp("createdAt");
        if let Some(data) = &notification.data {
            ops = ops.set_json("data", data)?;
        }
        let doc = self.store.create(NOTIFICATIONS, ops).await?;
        info!(notification_id = %doc.id, recipient = %recipient, kind = ?notification.kind, "created notification");
        Ok(doc.id)
    }

    /// Live view of the principal's notifications, newest first.
    pub async fn list_notifications(&self, session: &Session) -> Result<LiveQuery<Notification>> {
        let principal = session.ensure_active()?;
        let stream = self
            .store
            .watch(
                NOTIFICATIONS,
                Query::new().eq("recipientEmail", principal.email.as_str()),
            )
            .await?;
        let feed = MergedFeed::new(NOTIFICATIONS, 1, newest_first);
        Ok(LiveQuery::spawn(session, move |tx| run_merged(vec![stream], feed, tx)))
    }

    /// Mark one notification read. Only the recipient may do this; marking
    /// an already read notification succeeds without writing.
    pub async fn mark_as_read(&self, session: &Session, notification_id: &str) -> Result<()> {
        let principal = session.ensure_active()?;
        let doc = self.store.get(NOTIFICATIONS, notification_id).await?;
        let notification: Notification = doc.decode()?;
        if notification.recipient_email != principal.email {
            return Err(Error::permission_denied(format!(
                "notification {notification_id} is addressed to someone else"
            )));
        }
        if notification.read {
            debug!(notification_id, "notification already read");
            return Ok(());
        }
        self.store
            .update(
                NOTIFICATIONS,
                notification_id,
                FieldOps::new().set("read", true),
                Some(Precondition::Exists),
            )
            .await?;
        Ok(())
    }

    /// Mark every unread notification of the principal read. Returns how
    /// many changed.
    pub async fn mark_all_as_read(&self, session: &Session) -> Result<usize> {
        let principal = session.ensure_active()?;
        let query = Query::new()
            .eq("recipientEmail", principal.email.as_str())
            .eq("read", false);
        let unread = self.store.query(NOTIFICATIONS, &query).await?;
        for doc in &unread {
            self.store
                .update(
                    NOTIFICATIONS,
                    &doc.id,
                    FieldOps::new().set("read", true),
                    Some(Precondition::Exists),
                )
                .await?;
        }
        info!(email = %principal.email, count = unread.len(), "marked notifications read");
        Ok(unread.len())
    }
}
