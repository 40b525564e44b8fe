//! Identity provider client for listshare
//!
//! Wraps the hosted auth service: sign up, sign in with password, token
//! refresh, sign out and password recovery. The client keeps the current
//! session and broadcasts every change to it, so higher layers can tear
//! down state when the principal signs out.

use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Auth error type
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing session")]
    MissingSession,

    #[error("Account {0} has no email address")]
    MissingEmail(String),
}

/// Normalize an email address for use as a sharing key.
///
/// Grants are looked up by email, so every email entering the system goes
/// through here: surrounding whitespace is dropped and the address is
/// lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// An authenticated user as seen by the list, task and notification layers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: &str) -> Self {
        Self {
            id: id.into(),
            email: normalize_email(email),
        }
    }
}

/// User record returned by the auth service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl User {
    /// The principal for this user. Fails for accounts without an email,
    /// since ownership and sharing are keyed by email.
    pub fn principal(&self) -> Result<Principal, AuthError> {
        let email = self
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| AuthError::MissingEmail(self.id.clone()))?;
        Ok(Principal::new(self.id.clone(), email))
    }
}

/// Tokens plus the user they were issued to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub user: User,
}

/// Events published on [`AuthClient::on_auth_state_change`]
#[derive(Debug, Clone)]
pub enum AuthStateChange {
    SignedIn(AuthSession),
    TokenRefreshed(AuthSession),
    SignedOut,
}

/// Client options
#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// Keep the returned session in the client
    pub persist_session: bool,
    /// Capacity of the auth state change channel
    pub state_channel_capacity: usize,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            persist_session: true,
            state_channel_capacity: 16,
        }
    }
}

/// Auth service client
pub struct AuthClient {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    current_session: Arc<RwLock<Option<AuthSession>>>,
    state_change: broadcast::Sender<AuthStateChange>,
}

impl AuthClient {
    /// Create a new auth client
    pub fn new(url: &str, key: &str, http_client: Client, options: AuthOptions) -> Self {
        let (state_change, _) = broadcast::channel(options.state_channel_capacity.max(1));
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            current_session: Arc::new(RwLock::new(None)),
            state_change,
        }
    }

    /// Subscribe to session changes
    pub fn on_auth_state_change(&self) -> broadcast::Receiver<AuthStateChange> {
        self.state_change.subscribe()
    }

    fn publish(&self, change: AuthStateChange) {
        // no receivers is fine
        if self.state_change.send(change).is_err() {
            debug!("auth state change had no listeners");
        }
    }

    fn store_session(&self, session: &AuthSession) {
        if self.options.persist_session {
            let mut guard = self
                .current_session
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *guard = Some(session.clone());
        }
    }

    async fn post_for_session(
        &self,
        url: &str,
        payload: serde_json::Value,
    ) -> Result<AuthSession, AuthError> {
        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::Api(error_text));
        }

        Ok(response.json().await?)
    }

    /// Register a new account
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let url = format!("{}/auth/v1/signup", self.url);
        let payload = serde_json::json!({
            "email": normalize_email(email),
            "password": password,
        });

        let session = self.post_for_session(&url, payload).await?;
        info!("signed up user {}", session.user.id);

        self.store_session(&session);
        self.publish(AuthStateChange::SignedIn(session.clone()));
        Ok(session)
    }

    /// Sign in with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.url);
        let payload = serde_json::json!({
            "email": normalize_email(email),
            "password": password,
        });

        let session = self.post_for_session(&url, payload).await?;
        info!("signed in user {}", session.user.id);

        self.store_session(&session);
        self.publish(AuthStateChange::SignedIn(session.clone()));
        Ok(session)
    }

    /// The current session, if any
    pub fn get_session(&self) -> Option<AuthSession> {
        self.current_session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install a session obtained elsewhere (e.g. restored from disk)
    pub fn set_session(&self, session: AuthSession) {
        self.store_session(&session);
        self.publish(AuthStateChange::SignedIn(session));
    }

    /// Principal of the current session
    pub fn principal(&self) -> Result<Principal, AuthError> {
        self.get_session()
            .ok_or(AuthError::MissingSession)?
            .user
            .principal()
    }

    /// Fetch the current user from the service
    pub async fn get_user(&self) -> Result<User, AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;
        let url = format!("{}/auth/v1/user", self.url);

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::Api(error_text));
        }

        Ok(response.json().await?)
    }

    /// Exchange the refresh token for a new session
    pub async fn refresh_session(&self) -> Result<AuthSession, AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.url);
        let payload = serde_json::json!({
            "refresh_token": session.refresh_token,
        });

        let new_session = self.post_for_session(&url, payload).await?;
        self.store_session(&new_session);
        self.publish(AuthStateChange::TokenRefreshed(new_session.clone()));
        Ok(new_session)
    }

    /// Sign out. The local session is cleared even when the service call
    /// fails, so a dead token never keeps a principal signed in.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;
        let url = format!("{}/auth/v1/logout", self.url);

        let result = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .bearer_auth(&session.access_token)
            .send()
            .await;

        {
            let mut guard = self
                .current_session
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *guard = None;
        }
        self.publish(AuthStateChange::SignedOut);

        let response = result?;
        if !response.status().is_success() {
            let error_text = response.text().await?;
            warn!("logout request failed: {}", error_text);
            return Err(AuthError::Api(error_text));
        }
        Ok(())
    }

    /// Send a password recovery email
    pub async fn reset_password_for_email(&self, email: &str) -> Result<(), AuthError> {
        let url = format!("{}/auth/v1/recover", self.url);
        let payload = serde_json::json!({
            "email": normalize_email(email),
        });

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::Api(error_text));
        }

        Ok(())
    }
}
