//! Task layer
//!
//! Every call re-derives the principal's access from the task's list through
//! [`crate::lists::permission`]. A principal with no access to the list gets
//! `NotFound`; read-only access gets `PermissionDenied` on writes.

pub mod templates;
pub mod types;
pub mod view;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use listshare_store::{DocumentStore, FieldOps, Precondition, Query, StoreError, WatchEvent, MAX_IN_VALUES};
use tracing::{debug, info};

use crate::collections::TASKS;
use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::lists::{authorize, effective_access, list_stats, Access, Action, List, ListService, ListStats};
use crate::live::{decode_all, tag_watches, LiveQuery, LiveSender, LiveState, MergedFeed, TaggedWatches};
use crate::session::Session;

pub use templates::{NewTemplate, TaskTemplate, TemplateTask};
pub use types::{palette_color, NewTask, Priority, SubTask, Tag, Task, TaskPatch};
pub use view::{filter_and_sort, sort_tasks, TaskFilter, TaskSort};

/// Task layer
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn DocumentStore>,
    lists: ListService,
    options: ClientOptions,
}

impl TaskService {
    pub fn new(store: Arc<dyn DocumentStore>, lists: ListService, options: ClientOptions) -> Self {
        Self {
            store,
            lists,
            options,
        }
    }

    /// Resolve a list for `action`. Lists the principal cannot see at all
    /// are reported as missing.
    async fn authorize_list(&self, session: &Session, list_id: &str, action: Action) -> Result<List> {
        let principal = session.ensure_active()?;
        let (list, _) = self.lists.load(list_id).await?;
        if effective_access(&list, &principal.email) == Access::None {
            return Err(Error::not_found("List", list_id));
        }
        authorize(&list, &principal.email, action)?;
        Ok(list)
    }

    async fn authorize_task(&self, session: &Session, task_id: &str, action: Action) -> Result<(Task, u64)> {
        session.ensure_active()?;
        let doc = self.store.get(TASKS, task_id).await?;
        let task: Task = doc.decode()?;
        match self.authorize_list(session, &task.list_id, action).await {
            Ok(_) => Ok((task, doc.revision)),
            Err(Error::NotFound { .. }) => Err(Error::not_found("Task", task_id)),
            Err(e) => Err(e),
        }
    }

    /// Read-check-write on one task, guarded by its revision and retried
    /// when a concurrent writer commits first.
    async fn modify<F>(&self, session: &Session, task_id: &str, mut build: F) -> Result<Task>
    where
        F: FnMut(&Task) -> Result<FieldOps>,
    {
        let mut attempt = 0;
        loop {
            let (task, revision) = self.authorize_task(session, task_id, Action::Edit).await?;
            let ops = build(&task)?;
            match self
                .store
                .update(TASKS, task_id, ops, Some(Precondition::Revision(revision)))
                .await
            {
                Ok(doc) => return Ok(doc.decode()?),
                Err(StoreError::PreconditionFailed { .. }) if attempt < self.options.max_write_retries => {
                    attempt += 1;
                    debug!(task_id, attempt, "task changed concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Create a task in a list. Requires write on the list.
    pub async fn create_task(&self, session: &Session, list_id: &str, task: NewTask) -> Result<String> {
        self.authorize_list(session, list_id, Action::Edit).await?;
        let ops = task.into_ops(list_id, session.user_id())?;
        let doc = self.store.create(TASKS, ops).await?;
        info!(task_id = %doc.id, list_id, "created task");
        Ok(doc.id)
    }

    pub async fn get_task(&self, session: &Session, task_id: &str) -> Result<Task> {
        let (task, _) = self.authorize_task(session, task_id, Action::Read).await?;
        Ok(task)
    }

    pub async fn update_task(&self, session: &Session, task_id: &str, patch: TaskPatch) -> Result<Task> {
        self.modify(session, task_id, |_| patch.clone().into_ops()).await
    }

    pub async fn delete_task(&self, session: &Session, task_id: &str) -> Result<()> {
        self.authorize_task(session, task_id, Action::Edit).await?;
        self.store.delete(TASKS, task_id).await?;
        info!(task_id, "deleted task");
        Ok(())
    }

    /// Flip `completed`. The new value is computed from a fresh read and
    /// written only if nobody changed the task in between, so two toggles
    /// always cancel out.
    pub async fn toggle_task(&self, session: &Session, task_id: &str) -> Result<Task> {
        self.modify(session, task_id, |task| {
            Ok(FieldOps::new()
                .set("completed", !task.completed)
                .server_timestamp("updatedAt"))
        })
        .await
    }

    pub async fn add_tag(&self, session: &Session, task_id: &str, name: &str, color: Option<&str>) -> Result<Task> {
        self.modify(session, task_id, |task| {
            if task.has_tag(name) {
                return Err(Error::invalid_argument(format!("duplicate tag: {}", name.trim())));
            }
            let mut tags = task.tags.clone();
            tags.push(Tag::new(name, color)?);
            Ok(FieldOps::new()
                .set_json("tags", &tags)?
                .server_timestamp("updatedAt"))
        })
        .await
    }

    pub async fn remove_tag(&self, session: &Session, task_id: &str, tag_id: &str) -> Result<Task> {
        self.modify(session, task_id, |task| {
            if !task.tags.iter().any(|t| t.id == tag_id) {
                return Err(Error::not_found("Tag", tag_id));
            }
            let tags: Vec<&Tag> = task.tags.iter().filter(|t| t.id != tag_id).collect();
            Ok(FieldOps::new()
                .set_json("tags", &tags)?
                .server_timestamp("updatedAt"))
        })
        .await
    }

    pub async fn add_subtask(&self, session: &Session, task_id: &str, text: &str) -> Result<Task> {
        self.modify(session, task_id, |task| {
            let mut subtasks = task.subtasks.clone();
            subtasks.push(SubTask::new(text)?);
            Ok(FieldOps::new()
                .set_json("subtasks", &subtasks)?
                .server_timestamp("updatedAt"))
        })
        .await
    }

    pub async fn toggle_subtask(&self, session: &Session, task_id: &str, subtask_id: &str) -> Result<Task> {
        self.modify(session, task_id, |task| {
            let mut subtasks = task.subtasks.clone();
            let subtask = subtasks
                .iter_mut()
                .find(|s| s.id == subtask_id)
                .ok_or_else(|| Error::not_found("Subtask", subtask_id))?;
            subtask.completed = !subtask.completed;
            Ok(FieldOps::new()
                .set_json("subtasks", &subtasks)?
                .server_timestamp("updatedAt"))
        })
        .await
    }

    pub async fn remove_subtask(&self, session: &Session, task_id: &str, subtask_id: &str) -> Result<Task> {
        self.modify(session, task_id, |task| {
            if !task.subtasks.iter().any(|s| s.id == subtask_id) {
                return Err(Error::not_found("Subtask", subtask_id));
            }
            let subtasks: Vec<&SubTask> = task.subtasks.iter().filter(|s| s.id != subtask_id).collect();
            Ok(FieldOps::new()
                .set_json("subtasks", &subtasks)?
                .server_timestamp("updatedAt"))
        })
        .await
    }

    /// Current tasks of one list, newest first. Requires read.
    pub async fn fetch_list_tasks(&self, session: &Session, list_id: &str) -> Result<Vec<Task>> {
        self.authorize_list(session, list_id, Action::Read).await?;
        let docs = self
            .store
            .query(TASKS, &Query::new().eq("listId", list_id))
            .await?;
        let mut tasks = decode_all(TASKS, &docs);
        sort_tasks(&mut tasks, TaskSort::CreatedAt);
        Ok(tasks)
    }

    /// Counters for one list as of `now`. Requires read.
    pub async fn list_stats(&self, session: &Session, list_id: &str, now: DateTime<Utc>) -> Result<ListStats> {
        let tasks = self.fetch_list_tasks(session, list_id).await?;
        Ok(list_stats(&tasks, now))
    }

    /// Live view of every task in every list the principal can read.
    ///
    /// The task watches follow the accessible-list feed: whenever the set of
    /// list ids changes, the old watches are dropped and new ones opened.
    pub async fn list_tasks(&self, session: &Session) -> Result<LiveQuery<Task>> {
        let lists = self.lists.list_accessible_lists(session).await?;
        let store = self.store.clone();
        Ok(LiveQuery::spawn(session, move |tx| run_task_feed(store, lists, tx)))
    }
}

fn newest_first(tasks: &mut Vec<Task>) {
    sort_tasks(tasks, TaskSort::CreatedAt);
}

async fn open_task_watches(
    store: &Arc<dyn DocumentStore>,
    list_ids: &[String],
) -> std::result::Result<Vec<listshare_store::WatchStream>, StoreError> {
    let mut streams = Vec::new();
    for chunk in list_ids.chunks(MAX_IN_VALUES) {
        let query = Query::new().in_values("listId", chunk.to_vec());
        streams.push(store.watch(TASKS, query).await?);
    }
    Ok(streams)
}

async fn next_event(events: &mut Option<TaggedWatches>) -> Option<(usize, WatchEvent)> {
    match events {
        Some(events) => events.next().await,
        None => std::future::pending().await,
    }
}

enum Step {
    Lists(Option<LiveState<List>>),
    Tasks(Option<(usize, WatchEvent)>),
}

async fn run_task_feed(
    store: Arc<dyn DocumentStore>,
    mut lists: LiveQuery<List>,
    tx: LiveSender<Task>,
) {
    let mut list_ids: Option<Vec<String>> = None;
    let mut events: Option<TaggedWatches> = None;
    let mut feed = MergedFeed::new(TASKS, 0, newest_first);
    let mut pending = Some(lists.state());

    loop {
        let step = match pending.take() {
            Some(state) => Step::Lists(Some(state)),
            None => tokio::select! {
                state = lists.changed() => Step::Lists(state),
                event = next_event(&mut events) => Step::Tasks(event),
            },
        };

        let publish = match step {
            Step::Lists(None) => Some(LiveState::Failed("accessible lists feed stopped".to_string())),
            Step::Lists(Some(LiveState::Loading)) => None,
            Step::Lists(Some(LiveState::Failed(msg))) => Some(LiveState::Failed(msg)),
            Step::Lists(Some(LiveState::Ready(accessible))) => {
                let mut ids: Vec<String> = accessible.into_iter().map(|l| l.id).collect();
                ids.sort();
                ids.dedup();
                if list_ids.as_ref() == Some(&ids) {
                    None
                } else {
                    debug!(lists = ids.len(), "resubscribing task watches");
                    events = None;
                    let opened = open_task_watches(&store, &ids).await;
                    list_ids = Some(ids);
                    match opened {
                        Ok(streams) if streams.is_empty() => {
                            feed = MergedFeed::new(TASKS, 0, newest_first);
                            Some(LiveState::Ready(Vec::new()))
                        }
                        Ok(streams) => {
                            feed = MergedFeed::new(TASKS, streams.len(), newest_first);
                            events = Some(tag_watches(streams));
                            None
                        }
                        Err(e) => Some(LiveState::Failed(e.to_string())),
                    }
                }
            }
            Step::Tasks(Some((source, event))) => feed.handle(source, event),
            Step::Tasks(None) => Some(LiveState::Failed("task watches closed by the store".to_string())),
        };

        if let Some(state) = publish {
            let terminal = state.is_failed();
            if !tx.send(state) || terminal {
                return;
            }
        }
    }
}
