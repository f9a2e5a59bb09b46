// src/resolver.rs
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::decision::{Attributes, Decision, VariableValue};
use crate::AccessError;

/// Key holding the allow-list inside object-shaped variables.
pub const USER_TYPES_KEY: &str = "userTypes";

/// A feature-flag client that can fetch its configuration and evaluate flags.
///
/// `start` performs the network fetch. Decisions are read from the
/// configuration already in memory and never block on I/O.
#[async_trait]
pub trait EvaluationClient: Send + Sync {
    async fn start(&self) -> Result<(), AccessError>;

    fn decide_for(
        &self,
        user_id: &str,
        attributes: &Attributes,
        flag_key: &str,
    ) -> Result<Decision, AccessError>;

    fn create_decision_context(&self, user_id: &str, attributes: Attributes) -> DecisionContext<'_, Self> {
        DecisionContext {
            client: self,
            user_id: user_id.to_string(),
            attributes,
        }
    }
}

/// A user bound to a client, ready to evaluate flags.
pub struct DecisionContext<'a, C: EvaluationClient + ?Sized> {
    client: &'a C,
    user_id: String,
    attributes: Attributes,
}

impl<'a, C: EvaluationClient + ?Sized> DecisionContext<'a, C> {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn decide(&self, flag_key: &str) -> Result<Decision, AccessError> {
        self.client.decide_for(&self.user_id, &self.attributes, flag_key)
    }
}

#[derive(Debug, Deserialize)]
struct UserTypes {
    #[serde(rename = "userTypes")]
    user_types: Vec<String>,
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Pulls the allow-list out of a decision variable.
///
/// Object shapes must carry a `userTypes` list of strings; a bare list is
/// used as is. Returns `None` when the value has no usable list.
pub fn extract_allow_list(value: &VariableValue) -> Option<Vec<String>> {
    match value {
        VariableValue::Structured(map) => string_list(map.get(USER_TYPES_KEY)?),
        VariableValue::JsonString(raw) => serde_json::from_str::<UserTypes>(raw)
            .ok()
            .map(|parsed| parsed.user_types),
        VariableValue::Mapping(map) => match map.get(USER_TYPES_KEY)? {
            VariableValue::List(items) => Some(items.clone()),
            VariableValue::Other(other) => string_list(other),
            _ => None,
        },
        VariableValue::List(items) => Some(items.clone()),
        VariableValue::Other(_) => None,
    }
}

/// Case-insensitive membership test.
pub fn is_member(allow_list: &[String], user_category: &str) -> bool {
    let allowed: HashSet<String> = allow_list.iter().map(|c| c.to_lowercase()).collect();
    allowed.contains(&user_category.to_lowercase())
}

/// Turns flag decisions into access results.
pub struct Resolver<C: EvaluationClient> {
    client: Arc<C>,
}

impl<C: EvaluationClient> Clone for Resolver<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<C: EvaluationClient> Resolver<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns whether `user_category` is in the allow-list stored under
    /// `variable_key` of the `flag_key` decision. Every failure denies access.
    pub fn evaluate(&self, flag_key: &str, user_category: &str, variable_key: &str) -> bool {
        match self.resolve(flag_key, user_category, variable_key) {
            Ok(granted) => granted,
            Err(AccessError::NotReady) => {
                debug!("Flag '{}' evaluated before the client was ready", flag_key);
                false
            }
            Err(e) => {
                warn!("Access check on flag '{}' denied: {}", flag_key, e);
                false
            }
        }
    }

    /// Like [`Resolver::evaluate`] but reports why access could not be decided.
    pub fn resolve(
        &self,
        flag_key: &str,
        user_category: &str,
        variable_key: &str,
    ) -> Result<bool, AccessError> {
        let user_id = Uuid::new_v4().to_string();
        let decision = self
            .client
            .create_decision_context(&user_id, Attributes::new())
            .decide(flag_key)?;

        debug!("Looking up variable '{}' on flag '{}'", variable_key, flag_key);
        let value = decision
            .variable(variable_key)
            .ok_or_else(|| AccessError::MissingVariable(variable_key.to_string()))?;

        let allow_list = extract_allow_list(value)
            .ok_or_else(|| AccessError::UnparseableVariable(variable_key.to_string()))?;

        let normalized: Vec<String> = allow_list.iter().map(|c| c.to_lowercase()).collect();
        let granted = is_member(&normalized, user_category);
        debug!(
            "Checking if '{}' is in allowed categories {:?}: {}",
            user_category.to_lowercase(),
            normalized,
            if granted { "allowed" } else { "denied" }
        );
        Ok(granted)
    }
}
