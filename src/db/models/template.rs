use serde::Serialize;
use sqlx::FromRow;

use super::event::decode_offsets;
use super::roster::RoleSpec;

/// Reusable event blueprint, unique per (group, name).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Template {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
    pub max_participants: i64,
    #[serde(skip)]
    pub roles_json: String,
    pub comment: String,
    #[serde(skip)]
    pub reminder_offsets: String,
    pub created_by: i64,
    pub created_at: i64,
}

impl Template {
    pub fn roles(&self) -> Vec<RoleSpec> {
        decode_roles(&self.roles_json)
    }

    pub fn reminder_offsets(&self) -> Vec<i64> {
        decode_offsets(&self.reminder_offsets)
    }
}

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub group_id: i64,
    pub name: String,
    pub max_participants: i64,
    pub roles: Vec<RoleSpec>,
    pub comment: String,
    pub reminder_offsets: Vec<i64>,
    pub created_by: i64,
}

pub fn encode_roles(roles: &[RoleSpec]) -> String {
    serde_json::to_string(roles).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a stored role map. A corrupt value decodes as an empty set.
pub fn decode_roles(raw: &str) -> Vec<RoleSpec> {
    match serde_json::from_str::<Vec<RoleSpec>>(raw) {
        Ok(roles) => roles,
        Err(e) => {
            tracing::warn!("Ignoring unreadable role map {:?}: {}", raw, e);
            Vec::new()
        }
    }
}
