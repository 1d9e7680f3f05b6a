use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named slot group on an event. Capacity `0` keeps the name but disables it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Role {
    pub event_id: i64,
    pub name: String,
    pub capacity: i64,
    pub position: i64,
}

/// Role name plus capacity, as parsed from user input or stored in templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    pub capacity: i64,
}

impl RoleSpec {
    pub fn new(name: impl Into<String>, capacity: i64) -> Self {
        Self {
            name: name.into(),
            capacity,
        }
    }
}

impl From<&Role> for RoleSpec {
    fn from(role: &Role) -> Self {
        RoleSpec::new(role.name.clone(), role.capacity)
    }
}

/// A confirmed participant. `created_at` is the join timestamp used for FIFO ordering.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Signup {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub role_name: String,
    pub created_at: i64,
}

/// A user waiting for a slot in `role_name`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WaitlistEntry {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub role_name: String,
    pub created_at: i64,
}
