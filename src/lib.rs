// src/lib.rs
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use thiserror::Error;

pub mod decision;
pub mod manager;
pub mod resolver;
pub mod store;
#[cfg(feature = "tower-middleware")]
pub mod middleware;

pub use crate::decision::{Attributes, Decision, VariableValue};
pub use crate::manager::AccessManager;
pub use crate::resolver::{DecisionContext, EvaluationClient, Resolver};

use crate::decision::Datafile;
use crate::store::{DatafileStore, MemoryStore};

const BASE_URL: &str = "http://127.0.0.1:8080";
const MAX_RETRIES: u32 = 3;
const TIMEOUT_SECS: u64 = 10;

const ENV_SDK_KEY: &str = "CATEGORY_GATE_SDK_KEY";
const ENV_BASE_URL: &str = "CATEGORY_GATE_BASE_URL";
const ENV_MAX_RETRIES: &str = "CATEGORY_GATE_MAX_RETRIES";

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Missing authentication: {0}")]
    AuthError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Initialization failed: {0}")]
    InitializationFailure(String),

    #[error("Client is not ready")]
    NotReady,

    #[error("Variable '{0}' not found in decision")]
    MissingVariable(String),

    #[error("Variable '{0}' does not hold a list of user types")]
    UnparseableVariable(String),
}

/// HTTP evaluation client backed by a remotely fetched datafile.
pub struct Client {
    base_url: String,
    http_client: reqwest::Client,
    store: Box<dyn DatafileStore + Send + Sync>,
    max_retries: u32,
    sdk_key: Option<String>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn debug_info(&self) -> String {
        format!(
            "Client {{ base_url: {}, max_retries: {}, sdk_key set: {} }}",
            self.base_url,
            self.max_retries,
            self.sdk_key.is_some()
        )
    }

    pub fn revision(&self) -> Option<String> {
        self.store.revision()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.store.fetched_at()
    }

    fn datafile_url(&self) -> Result<String, AccessError> {
        let sdk_key = match &self.sdk_key {
            Some(key) if !key.is_empty() => key,
            _ => return Err(AccessError::AuthError("SDK key is required".to_string())),
        };
        Ok(format!("{}/datafiles/{}.json", self.base_url.trim_end_matches('/'), sdk_key))
    }

    async fn fetch_datafile(&self, url: &str) -> Result<Datafile, AccessError> {
        let mut headers = HeaderMap::new();
        headers.insert("User-Agent", HeaderValue::from_static("Category-Gate-Rust"));
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let response = self.http_client.get(url).headers(headers).send().await?;

        match response.status() {
            status if status.is_success() => {
                let body = response.text().await?;
                serde_json::from_str::<Datafile>(&body)
                    .map_err(|e| AccessError::ParseError(format!("invalid datafile: {}", e)))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AccessError::AuthError(
                format!("SDK key rejected with status {}", response.status()),
            )),
            status => Err(AccessError::ApiError(format!(
                "Unexpected status code: {}",
                status
            ))),
        }
    }

    async fn fetch_with_retries(&self) -> Result<Datafile, AccessError> {
        let url = self.datafile_url()?;
        let attempts = self.max_retries.max(1);
        let mut last_error = None;

        for retry in 0..attempts {
            match self.fetch_datafile(&url).await {
                Ok(datafile) => return Ok(datafile),
                // A rejected key or a malformed datafile will not change on retry.
                Err(e @ (AccessError::AuthError(_) | AccessError::ParseError(_))) => return Err(e),
                Err(e) => {
                    warn!("Datafile fetch attempt {} of {} failed: {}", retry + 1, attempts, e);
                    last_error = Some(e);
                    if retry + 1 < attempts {
                        tokio::time::sleep(Duration::from_secs((retry + 1) as u64)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AccessError::InitializationFailure("no fetch attempt was made".to_string())
        }))
    }
}

#[async_trait]
impl EvaluationClient for Client {
    async fn start(&self) -> Result<(), AccessError> {
        let datafile = self.fetch_with_retries().await.map_err(|e| {
            error!("Failed to fetch datafile: {}", e);
            AccessError::InitializationFailure(e.to_string())
        })?;

        debug!(
            "Loaded datafile revision {:?} with {} flags",
            datafile.revision,
            datafile.feature_flags.len()
        );
        self.store
            .refresh(datafile)
            .map_err(|e| AccessError::StoreError(e.to_string()))
    }

    fn decide_for(
        &self,
        user_id: &str,
        _attributes: &Attributes,
        flag_key: &str,
    ) -> Result<Decision, AccessError> {
        if !self.store.is_loaded() {
            return Err(AccessError::NotReady);
        }

        let flag = self
            .store
            .get(flag_key)
            .map_err(|e| AccessError::StoreError(e.to_string()))?;

        let decision = match flag {
            Some(flag) => Decision {
                flag_key: flag.key,
                enabled: flag.enabled,
                variables: flag.variables,
            },
            None => {
                debug!("Flag '{}' not in datafile, deciding disabled", flag_key);
                Decision::disabled(flag_key)
            }
        };
        debug!("Decided flag '{}' for user {}", flag_key, user_id);
        Ok(decision)
    }
}

pub struct ClientBuilder {
    base_url: String,
    max_retries: u32,
    timeout: Duration,
    sdk_key: Option<String>,
    store: Option<Box<dyn DatafileStore + Send + Sync>>,
}

impl ClientBuilder {
    fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            max_retries: MAX_RETRIES,
            timeout: Duration::from_secs(TIMEOUT_SECS),
            sdk_key: None,
            store: None,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sdk_key(mut self, sdk_key: &str) -> Self {
        self.sdk_key = Some(sdk_key.to_string());
        self
    }

    pub fn with_store(mut self, store: Box<dyn DatafileStore + Send + Sync>) -> Self {
        self.store = Some(store);
        self
    }

    /// Applies any `CATEGORY_GATE_*` settings found in the environment.
    pub fn from_env(mut self) -> Self {
        if let Ok(sdk_key) = env::var(ENV_SDK_KEY) {
            self.sdk_key = Some(sdk_key);
        }
        if let Ok(base_url) = env::var(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Ok(raw) = env::var(ENV_MAX_RETRIES) {
            match raw.parse() {
                Ok(max_retries) => self.max_retries = max_retries,
                Err(_) => warn!("Ignoring invalid {} value '{}'", ENV_MAX_RETRIES, raw),
            }
        }
        self
    }

    pub fn build(self) -> Result<Client, AccessError> {
        let store = self
            .store
            .unwrap_or_else(|| Box::new(MemoryStore::new()));

        Ok(Client {
            base_url: self.base_url,
            http_client: reqwest::Client::builder().timeout(self.timeout).build()?,
            store,
            max_retries: self.max_retries,
            sdk_key: self.sdk_key,
        })
    }
}
