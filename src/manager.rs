// src/manager.rs
use std::sync::{Arc, OnceLock};

use log::{debug, error, info};
use tokio::sync::OnceCell;

use crate::resolver::{EvaluationClient, Resolver};
use crate::{AccessError, Client};

/// Owns the evaluation client lifecycle and answers access checks.
///
/// Initialization runs at most once. Callers arriving while it is in flight
/// wait for that same attempt. A failed start leaves the manager not ready
/// for good, and every check is denied.
pub struct AccessManager<C: EvaluationClient> {
    resolver: Resolver<C>,
    started: OnceCell<bool>,
}

impl<C: EvaluationClient> AccessManager<C> {
    pub fn new(client: C) -> Self {
        Self::with_shared_client(Arc::new(client))
    }

    pub fn with_shared_client(client: Arc<C>) -> Self {
        Self {
            resolver: Resolver::new(client),
            started: OnceCell::new(),
        }
    }

    pub fn client(&self) -> &C {
        self.resolver.client()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.started.get(), Some(true))
    }

    /// Starts the client once and reports whether it is ready.
    pub async fn initialize(&self) -> bool {
        let ready = self
            .started
            .get_or_init(|| async {
                info!("Starting feature-flag client");
                match self.resolver.client().start().await {
                    Ok(()) => {
                        info!("Feature-flag client ready");
                        true
                    }
                    Err(e) => {
                        error!("Error initializing feature-flag client: {}", e);
                        false
                    }
                }
            })
            .await;
        *ready
    }

    pub fn check_access(&self, flag_key: &str, user_category: &str, variable_key: &str) -> bool {
        if !self.is_ready() {
            debug!(
                "Denying '{}' on flag '{}': {}",
                user_category,
                flag_key,
                AccessError::NotReady
            );
            return false;
        }
        self.resolver.evaluate(flag_key, user_category, variable_key)
    }
}

impl AccessManager<Client> {
    /// Process-wide manager whose client is configured from the environment.
    pub fn shared() -> Result<&'static AccessManager<Client>, AccessError> {
        static SHARED: OnceLock<AccessManager<Client>> = OnceLock::new();

        if let Some(manager) = SHARED.get() {
            return Ok(manager);
        }
        let manager = AccessManager::new(Client::builder().from_env().build()?);
        Ok(SHARED.get_or_init(|| manager))
    }
}
