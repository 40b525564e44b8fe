//! HTTP-backed document store.
//!
//! Speaks a small JSON document dialect:
//!
//! - `GET    {base}/v1/projects/{project}/collections/{collection}/documents/{id}`
//! - `POST   {base}/v1/projects/{project}/collections/{collection}/documents`
//! - `PATCH  {base}/v1/projects/{project}/collections/{collection}/documents/{id}`
//! - `DELETE {base}/v1/projects/{project}/collections/{collection}/documents/{id}`
//! - `POST   {base}/v1/projects/{project}/collections/{collection}/documents:query`
//!
//! Live watches poll the query and emit whenever the `(id, revision)` set
//! of the result changes.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::document::{Document, FieldOps, Precondition};
use crate::error::StoreError;
use crate::query::Query;
use crate::watch::{WatchEvent, WatchStream};
use crate::DocumentStore;

/// Tuning for [`RestStore`]
#[derive(Debug, Clone)]
pub struct RestStoreOptions {
    /// Per-request timeout
    pub request_timeout: Option<Duration>,
    /// How often a live watch re-runs its query
    pub poll_interval: Duration,
}

impl Default for RestStoreOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Document store client over HTTP
#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    project_id: String,
    api_key: String,
    http_client: Client,
    access_token: Arc<RwLock<Option<String>>>,
    options: RestStoreOptions,
}

impl RestStore {
    pub fn new(base_url: &str, project_id: &str, api_key: &str) -> Result<Self, StoreError> {
        Self::new_with_options(base_url, project_id, api_key, RestStoreOptions::default())
    }

    pub fn new_with_options(
        base_url: &str,
        project_id: &str,
        api_key: &str,
        options: RestStoreOptions,
    ) -> Result<Self, StoreError> {
        let parsed = Url::parse(base_url)?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(StoreError::Url(format!("unsupported URL scheme: {}", other)));
            }
        }

        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            api_key: api_key.to_string(),
            http_client,
            access_token: Arc::new(RwLock::new(None)),
            options,
        })
    }

    /// Set (or clear) the bearer token sent with every request.
    pub fn set_auth(&self, token: Option<String>) {
        debug!("setting store auth token (is_some: {})", token.is_some());
        let mut guard = self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = token;
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/v1/projects/{}/collections/{}/documents",
            self.base_url, self.project_id, collection
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut req = self
            .http_client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Content-Type", "application/json");
        let token = self
            .access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send(
        &self,
        req: RequestBuilder,
        collection: &str,
        id: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(StoreError::not_found(collection, id)),
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                Err(StoreError::precondition_failed(collection, id))
            }
            StatusCode::BAD_REQUEST => Err(StoreError::InvalidQuery(text)),
            s if s.is_server_error() => Err(StoreError::Unavailable(format!(
                "request failed with status {}: {}",
                s, text
            ))),
            s => Err(StoreError::Http(format!(
                "request failed with status {}: {}",
                s, text
            ))),
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        collection: &str,
        id: &str,
    ) -> Result<T, StoreError> {
        let response = self.send(req, collection, id).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl DocumentStore for RestStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        let req = self.request(Method::GET, &self.document_url(collection, id));
        self.send_json(req, collection, id).await
    }

    async fn create(&self, collection: &str, ops: FieldOps) -> Result<Document, StoreError> {
        let req = self
            .request(Method::POST, &self.collection_url(collection))
            .json(&ops);
        self.send_json(req, collection, "").await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        ops: FieldOps,
        precondition: Option<Precondition>,
    ) -> Result<Document, StoreError> {
        let body = json!({
            "ops": ops.ops(),
            "precondition": precondition,
        });
        let req = self
            .request(Method::PATCH, &self.document_url(collection, id))
            .json(&body);
        self.send_json(req, collection, id).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let req = self.request(Method::DELETE, &self.document_url(collection, id));
        self.send(req, collection, id).await?;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        query.validate()?;
        let url = format!("{}:query", self.collection_url(collection));
        let req = self.request(Method::POST, &url).json(query);
        self.send_json(req, collection, "").await
    }

    async fn watch(&self, collection: &str, query: Query) -> Result<WatchStream, StoreError> {
        query.validate()?;
        let (tx, stream) = WatchStream::channel();
        let store = self.clone();
        let collection = collection.to_string();
        let interval = self.options.poll_interval;

        let task = tokio::spawn(async move {
            let mut last: Option<Vec<(String, u64)>> = None;
            loop {
                match store.query(&collection, &query).await {
                    Ok(docs) => {
                        let signature: Vec<(String, u64)> =
                            docs.iter().map(|d| (d.id.clone(), d.revision)).collect();
                        if last.as_ref() != Some(&signature) {
                            last = Some(signature);
                            if tx.send(WatchEvent::Snapshot(docs)).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("watch on '{}' failed: {}", collection, e);
                        let _ = tx.send(WatchEvent::Error(e));
                        break;
                    }
                }
                if tx.is_closed() {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
            debug!("watch on '{}' stopped", collection);
        });

        Ok(stream.with_task(task))
    }
}
