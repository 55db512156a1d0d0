//! Engine configuration — storage key prefixes, the guest namespace label,
//! the remote collection names, and the level picker bound.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Namespace segment used when no user is signed in.
    pub guest_namespace: String,
    /// Local key prefix for cart sequences (`<prefix>:<namespace>`).
    pub cart_key_prefix: String,
    /// Local key prefix for owned-item sequences.
    pub owned_key_prefix: String,
    /// Remote collection holding one summary document per user.
    pub users_collection: String,
    /// Remote sub-collection holding one progress document per activity.
    pub activities_collection: String,
    /// Largest level count a single unlock map may cover.
    pub max_levels: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            guest_namespace: "guest".to_string(),
            cart_key_prefix: "cart".to_string(),
            owned_key_prefix: "owned".to_string(),
            users_collection: "users".to_string(),
            activities_collection: "activities".to_string(),
            max_levels: 1000,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("guestNamespace", &self.guest_namespace),
            ("cartKeyPrefix", &self.cart_key_prefix),
            ("ownedKeyPrefix", &self.owned_key_prefix),
            ("usersCollection", &self.users_collection),
            ("activitiesCollection", &self.activities_collection),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(EngineError::Config(format!("{} must not be empty", name)));
            }
        }
        // "user:<id>" is reserved for signed-in namespaces.
        if self.guest_namespace.contains(':') {
            return Err(EngineError::Config(
                "guestNamespace must not contain ':'".to_string(),
            ));
        }
        if self.cart_key_prefix == self.owned_key_prefix {
            return Err(EngineError::Config(
                "cartKeyPrefix and ownedKeyPrefix must differ".to_string(),
            ));
        }
        for (name, value) in [
            ("usersCollection", &self.users_collection),
            ("activitiesCollection", &self.activities_collection),
        ] {
            if value.contains('/') {
                return Err(EngineError::Config(format!("{} must not contain '/'", name)));
            }
        }
        if self.max_levels == 0 {
            return Err(EngineError::Config("maxLevels must be positive".to_string()));
        }
        Ok(())
    }
}
