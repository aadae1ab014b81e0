//! Actor identity passed explicitly into every operation.

use serde::{Deserialize, Serialize};

use crate::models::audit::ActorType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorContext {
    pub actor_id: String,
    pub actor_type: ActorType,
}

impl ActorContext {
    pub fn user(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_type: ActorType::User,
        }
    }

    pub fn service_account(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_type: ActorType::ServiceAccount,
        }
    }

    /// Identity used by background jobs and migrations.
    pub fn system() -> Self {
        Self {
            actor_id: "system".into(),
            actor_type: ActorType::System,
        }
    }
}
