//! List access layer
//!
//! Owns the list lifecycle and the grants on each list. All other layers ask
//! this one whether a principal may act on a list.

pub mod permission;
pub mod stats;
pub mod types;

use std::sync::Arc;

use chrono::Utc;
use listshare_auth::normalize_email;
use listshare_store::{Document, DocumentStore, FieldOps, Precondition, Query, StoreError};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::collections::{LISTS, TASKS};
use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::live::{decode_all, run_merged, FeedMerge, LiveQuery, MergedFeed};
use crate::notifications::{NewNotification, NotificationService};
use crate::session::Session;

pub use permission::{authorize, effective_access, Access, Action, Permission};
pub use stats::{list_stats, ListStats};
pub use types::{List, ListPatch, ShareEntry, ShareOutcome};

use types::{grant_ops, validate_name};

/// List access layer
#[derive(Clone)]
pub struct ListService {
    store: Arc<dyn DocumentStore>,
    notifications: NotificationService,
    options: ClientOptions,
}

impl ListService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifications: NotificationService,
        options: ClientOptions,
    ) -> Self {
        Self {
            store,
            notifications,
            options,
        }
    }

    /// Fetch a list without any access check.
    pub(crate) async fn load(&self, list_id: &str) -> Result<(List, u64)> {
        let doc = self.store.get(LISTS, list_id).await?;
        Ok((doc.decode()?, doc.revision))
    }

    /// Create a list owned by the session's principal. Returns the new id.
    pub async fn create_list(
        &self,
        session: &Session,
        name: &str,
        color: &str,
        icon: Option<&str>,
    ) -> Result<String> {
        let principal = session.ensure_active()?;
        let mut ops = FieldOps::new()
            .set("name", validate_name(name)?)
            .set("color", color)
            .set("owner", principal.email.as_str())
            .set("sharedWith", Value::Array(Vec::new()))
            .set("sharedWithEmails", Value::Array(Vec::new()))
            .server_timestamp("createdAt")
            .server_timestamp("updatedAt");
        if let Some(icon) = icon {
            ops = ops.set("icon", icon);
        }
        let doc = self.store.create(LISTS, ops).await?;
        info!(list_id = %doc.id, owner = %principal.email, "created list");
        Ok(doc.id)
    }

    /// Fetch a list the principal can read.
    pub async fn get_list(&self, session: &Session, list_id: &str) -> Result<List> {
        let principal = session.ensure_active()?;
        let (list, _) = self.load(list_id).await?;
        authorize(&list, &principal.email, Action::Read)?;
        Ok(list)
    }

    /// The principal's effective access on a list.
    pub async fn access(&self, session: &Session, list_id: &str) -> Result<Access> {
        let principal = session.ensure_active()?;
        let (list, _) = self.load(list_id).await?;
        Ok(effective_access(&list, &principal.email))
    }

    /// Apply a write built from the freshly read list, guarded by the list's
    /// revision. When another writer commits first the list is re-read and
    /// `build` runs again, up to the configured retry budget.
    async fn modify<F>(&self, list_id: &str, mut build: F) -> Result<Document>
    where
        F: FnMut(&List) -> Result<FieldOps>,
    {
        let mut attempt = 0;
        loop {
            let (list, revision) = self.load(list_id).await?;
            let ops = build(&list)?;
            match self
                .store
                .update(LISTS, list_id, ops, Some(Precondition::Revision(revision)))
                .await
            {
                Ok(doc) => return Ok(doc),
                Err(StoreError::PreconditionFailed { .. }) if attempt < self.options.max_write_retries => {
                    attempt += 1;
                    debug!(list_id, attempt, "list changed concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Change name, color or icon. Requires write.
    pub async fn update_list(&self, session: &Session, list_id: &str, patch: ListPatch) -> Result<List> {
        let principal = session.ensure_active()?;
        let doc = self
            .modify(list_id, |list| {
                authorize(list, &principal.email, Action::Edit)?;
                patch.clone().into_ops()
            })
            .await?;
        debug!(list_id, "updated list");
        Ok(doc.decode()?)
    }

    /// Delete a list and every task in it. Requires admin.
    ///
    /// Tasks go first, so a run interrupted halfway leaves the list in place
    /// and can simply be repeated.
    pub async fn delete_list(&self, session: &Session, list_id: &str) -> Result<()> {
        let principal = session.ensure_active()?;
        let (list, _) = self.load(list_id).await?;
        authorize(&list, &principal.email, Action::Administer)?;

        let tasks = self
            .store
            .query(TASKS, &Query::new().eq("listId", list_id))
            .await?;
        for task in &tasks {
            match self.store.delete(TASKS, &task.id).await {
                Ok(()) | Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.store.delete(LISTS, list_id).await?;
        info!(list_id, tasks = tasks.len(), "deleted list");
        Ok(())
    }

    /// Grant `email` access to a list. Requires admin.
    ///
    /// On success the grantee is sent a `list_shared` notification. A failed
    /// notification does not undo the share; it shows up as a missing
    /// `notification_id` in the outcome.
    pub async fn share_list(
        &self,
        session: &Session,
        list_id: &str,
        email: &str,
        permission: Permission,
    ) -> Result<ShareOutcome> {
        let principal = session.ensure_active()?.clone();
        let grantee = validate_email(email)?;
        if grantee == principal.email {
            return Err(Error::invalid_argument("cannot share a list with yourself"));
        }

        let doc = self
            .modify(list_id, |list| {
                if grantee == list.owner {
                    return Err(Error::invalid_argument(format!(
                        "{grantee} owns list {} and already holds admin",
                        list.id
                    )));
                }
                authorize(list, &principal.email, Action::Administer)?;
                if list.grant_for(&grantee).is_some() {
                    return Err(Error::AlreadyShared {
                        list_id: list.id.clone(),
                        email: grantee.clone(),
                    });
                }
                let entry = ShareEntry {
                    email: grantee.clone(),
                    permission,
                    added_at: Utc::now(),
                    added_by: Some(principal.email.clone()),
                };
                Ok(FieldOps::new()
                    .array_union("sharedWith", vec![serde_json::to_value(&entry)?])
                    .array_union("sharedWithEmails", vec![Value::String(grantee.clone())])
                    .server_timestamp("updatedAt"))
            })
            .await?;
        let list: List = doc.decode()?;
        info!(list_id, grantee = %grantee, %permission, "shared list");

        let notification = NewNotification::list_shared(&principal, &list, &grantee);
        let notification_id = match self.notifications.create_notification(notification).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(list_id, grantee = %grantee, error = %e, "share notification not sent");
                None
            }
        };
        Ok(ShareOutcome {
            list,
            notification_id,
        })
    }

    /// Change the permission of an existing grant. Requires admin.
    pub async fn update_share(
        &self,
        session: &Session,
        list_id: &str,
        email: &str,
        permission: Permission,
    ) -> Result<List> {
        let principal = session.ensure_active()?;
        let grantee = normalize_email(email);
        let doc = self
            .modify(list_id, |list| {
                authorize(list, &principal.email, Action::Administer)?;
                if list.grant_for(&grantee).is_none() {
                    return Err(Error::not_found("Share", &grantee));
                }
                let grants: Vec<ShareEntry> = list
                    .shared_with
                    .iter()
                    .cloned()
                    .map(|mut g| {
                        if g.email == grantee {
                            g.permission = permission;
                        }
                        g
                    })
                    .collect();
                Ok(grant_ops(&grants)?)
            })
            .await?;
        info!(list_id, grantee = %grantee, %permission, "updated share");
        Ok(doc.decode()?)
    }

    /// Remove a grant. Requires admin.
    pub async fn revoke_share(&self, session: &Session, list_id: &str, email: &str) -> Result<List> {
        let principal = session.ensure_active()?;
        let grantee = normalize_email(email);
        let doc = self
            .modify(list_id, |list| {
                authorize(list, &principal.email, Action::Administer)?;
                without_grant(list, &grantee)
            })
            .await?;
        info!(list_id, grantee = %grantee, "revoked share");
        Ok(doc.decode()?)
    }

    /// Drop the principal's own grant on a list.
    pub async fn leave_list(&self, session: &Session, list_id: &str) -> Result<()> {
        let principal = session.ensure_active()?;
        self.modify(list_id, |list| {
            if list.owner == principal.email {
                return Err(Error::invalid_argument("the owner cannot leave their own list"));
            }
            without_grant(list, &principal.email)
        })
        .await?;
        info!(list_id, email = %principal.email, "left list");
        Ok(())
    }

    fn accessible_queries(email: &str) -> [Query; 2] {
        [
            Query::new().eq("owner", email),
            Query::new().array_contains("sharedWithEmails", email),
        ]
    }

    /// Live view of every list the principal owns or holds a grant on.
    pub async fn list_accessible_lists(&self, session: &Session) -> Result<LiveQuery<List>> {
        let principal = session.ensure_active()?;
        let mut streams = Vec::with_capacity(2);
        for query in Self::accessible_queries(&principal.email) {
            streams.push(self.store.watch(LISTS, query).await?);
        }
        let feed = MergedFeed::new(LISTS, streams.len(), sort_lists);
        Ok(LiveQuery::spawn(session, move |tx| run_merged(streams, feed, tx)))
    }

    /// One-shot version of [`ListService::list_accessible_lists`].
    pub async fn fetch_accessible_lists(&self, session: &Session) -> Result<Vec<List>> {
        let principal = session.ensure_active()?;
        let mut merge: FeedMerge<List> = FeedMerge::new(2);
        for (source, query) in Self::accessible_queries(&principal.email).iter().enumerate() {
            let docs = self.store.query(LISTS, query).await?;
            merge.apply(source, decode_all(LISTS, &docs));
        }
        let mut lists = merge.merged().unwrap_or_default();
        sort_lists(&mut lists);
        Ok(lists)
    }
}

fn without_grant(list: &List, email: &str) -> Result<FieldOps> {
    if list.grant_for(email).is_none() {
        return Err(Error::not_found("Share", email));
    }
    let grants: Vec<ShareEntry> = list
        .shared_with
        .iter()
        .filter(|g| g.email != email)
        .cloned()
        .collect();
    Ok(grant_ops(&grants)?)
}

fn sort_lists(lists: &mut Vec<List>) {
    lists.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Normalize an email and reject obviously malformed ones.
pub(crate) fn validate_email(email: &str) -> Result<String> {
    let email = normalize_email(email);
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(Error::invalid_argument(format!("invalid email address: {email:?}")))
    }
}
