use serde::{Deserialize, Serialize};

/// Per-user quota state. One row per external chat identity, created
/// lazily on first contact and never deleted. Counters only ever grow:
/// capacity via activation, usage via consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntitlement {
    /// External chat user id (stable, unique).
    pub user_id: i64,
    /// Total requests granted in the current cumulative package.
    pub plan_capacity: i64,
    /// Requests consumed from the package. Never reset.
    pub plan_used: i64,
    /// Requests consumed across all packages (audit counter).
    pub lifetime_used: i64,
    /// Unix seconds. None = never activated.
    pub expires_at: Option<i64>,
    pub last_activation_at: Option<i64>,
    pub last_request_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserEntitlement {
    /// May go negative under a defensive read of inconsistent counters;
    /// callers report it as-is and deny access either way.
    pub fn remaining(&self) -> i64 {
        self.plan_capacity - self.plan_used
    }
}
