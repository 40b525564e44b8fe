//! listshare
//!
//! Client core for collaborative to-do lists. Users own lists, share them
//! with collaborators at `read`, `write` or `admin` level, and manage tasks
//! inside them. Every task operation re-derives access from the task's list.
//! Views of lists, tasks, notifications and categories are live: they follow
//! the document store as other collaborators write to it.
//!
//! The layers run against any [`DocumentStore`]; [`ListShare::from_env`]
//! wires up the HTTP store and identity provider, while tests and demos use
//! [`MemoryStore`].
//!
//! ```no_run
//! use listshare::prelude::*;
//!
//! # async fn run() -> listshare::Result<()> {
//! let app = ListShare::from_env()?;
//! let session = app.sign_in("alice@x.com", "password").await?;
//! let list_id = app.lists().create_list(&session, "Groceries", "#3b82f6", None).await?;
//! app.lists().share_list(&session, &list_id, "bob@x.com", Permission::Write).await?;
//! # Ok(())
//! # }
//! ```

pub mod categories;
pub mod config;
pub mod error;
pub mod lists;
pub mod live;
pub mod notifications;
pub mod session;
pub mod tasks;

use std::sync::Arc;

use listshare_auth::{AuthClient, AuthOptions};
use listshare_store::{RestStore, RestStoreOptions};
use tracing::info;

pub use listshare_auth as auth;
pub use listshare_store as store;
pub use listshare_store::{DocumentStore, MemoryStore};

pub use crate::categories::CategoryService;
pub use crate::config::{ClientOptions, StoreConfig};
pub use crate::error::{Error, Result};
pub use crate::lists::ListService;
pub use crate::notifications::NotificationService;
pub use crate::session::Session;
pub use crate::tasks::TaskService;

/// Collection names in the document store
pub mod collections {
    pub const LISTS: &str = "lists";
    pub const TASKS: &str = "todos";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const CATEGORIES: &str = "categories";
    pub const TEMPLATES: &str = "taskTemplates";
}

/// The main entry point: a document store plus the layers built on it
pub struct ListShare {
    rest: Option<RestStore>,
    auth: Option<AuthClient>,
    options: ClientOptions,
    lists: ListService,
    tasks: TaskService,
    notifications: NotificationService,
    categories: CategoryService,
}

impl ListShare {
    /// Build the layers over an existing store, without an identity provider.
    /// Sessions are then created directly with [`Session::new`].
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::new_with_options(store, ClientOptions::default())
    }

    pub fn new_with_options(store: Arc<dyn DocumentStore>, options: ClientOptions) -> Self {
        let notifications = NotificationService::new(store.clone());
        let lists = ListService::new(store.clone(), notifications.clone(), options.clone());
        let tasks = TaskService::new(store.clone(), lists.clone(), options.clone());
        let categories = CategoryService::new(store);
        Self {
            rest: None,
            auth: None,
            options,
            lists,
            tasks,
            notifications,
            categories,
        }
    }

    /// Connect to the remote store and identity provider.
    pub fn from_config(config: &StoreConfig, options: ClientOptions) -> Result<Self> {
        let rest = RestStore::new_with_options(
            config.url.as_str(),
            &config.project_id,
            &config.api_key,
            RestStoreOptions {
                request_timeout: options.request_timeout,
                poll_interval: options.poll_interval,
            },
        )
        .map_err(|e| Error::config(format!("cannot create store client: {e}")))?;

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = options.request_timeout {
            http = http.timeout(timeout);
        }
        let http = http
            .build()
            .map_err(|e| Error::config(format!("cannot create http client: {e}")))?;
        let auth = AuthClient::new(config.url.as_str(), &config.api_key, http, AuthOptions::default());

        info!(url = %config.url, project_id = %config.project_id, "connecting listshare client");
        let mut app = Self::new_with_options(Arc::new(rest.clone()), options);
        app.rest = Some(rest);
        app.auth = Some(auth);
        Ok(app)
    }

    /// Connect using `LISTSHARE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config = StoreConfig::from_env()?;
        Self::from_config(&config, ClientOptions::default())
    }

    pub fn lists(&self) -> &ListService {
        &self.lists
    }

    pub fn tasks(&self) -> &TaskService {
        &self.tasks
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    pub fn categories(&self) -> &CategoryService {
        &self.categories
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// The identity provider, when connected through [`ListShare::from_config`]
    pub fn auth(&self) -> Option<&AuthClient> {
        self.auth.as_ref()
    }

    fn require_auth(&self) -> Result<&AuthClient> {
        self.auth
            .as_ref()
            .ok_or_else(|| Error::config("no identity provider configured"))
    }

    fn use_token(&self, token: Option<String>) {
        if let Some(rest) = &self.rest {
            rest.set_auth(token);
        }
    }

    /// Sign in and open a session. The session ends by itself when the
    /// identity provider reports a sign-out.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let auth = self.require_auth()?;
        let changes = auth.on_auth_state_change();
        let auth_session = auth.sign_in_with_password(email, password).await?;
        self.use_token(Some(auth_session.access_token.clone()));
        let session = Session::from_auth(&auth_session)?;
        session.end_on_sign_out(changes);
        Ok(session)
    }

    /// Refresh the access token used for store calls.
    pub async fn refresh(&self) -> Result<()> {
        let auth_session = self.require_auth()?.refresh_session().await?;
        self.use_token(Some(auth_session.access_token));
        Ok(())
    }

    /// End `session` and sign out of the identity provider. Live queries
    /// stop before the sign-out request goes out.
    pub async fn sign_out(&self, session: &Session) -> Result<()> {
        session.end();
        self.use_token(None);
        if let Some(auth) = &self.auth {
            auth.sign_out().await?;
        }
        Ok(())
    }
}

/// Commonly used types
pub mod prelude {
    pub use crate::categories::Category;
    pub use crate::config::{ClientOptions, StoreConfig};
    pub use crate::error::{Error, Result};
    pub use crate::lists::{Access, Action, List, ListPatch, ListStats, Permission, ShareEntry};
    pub use crate::live::{LiveQuery, LiveState};
    pub use crate::notifications::{Notification, NotificationType};
    pub use crate::session::Session;
    pub use crate::tasks::{
        NewTask, NewTemplate, Priority, SubTask, Tag, Task, TaskFilter, TaskPatch, TaskSort,
        TemplateTask,
    };
    pub use crate::ListShare;
    pub use listshare_auth::Principal;
    pub use listshare_store::{DocumentStore, MemoryStore};
}
