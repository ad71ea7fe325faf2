use serde::{Deserialize, Serialize};

/// A redeemable token that grants or extends an entitlement.
///
/// A code transitions exactly once from unredeemed (`owner_id = None`)
/// to redeemed, and the binding is permanent: codes are single-use,
/// single-owner, and never transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationCode {
    /// Unique, case-sensitive lookup key.
    pub code: String,
    pub owner_id: Option<i64>,
    /// Free-text issuance label (e.g. the payment source).
    pub note: Option<String>,
    pub created_at: i64,
    pub redeemed_at: Option<i64>,
}

impl ActivationCode {
    pub fn is_redeemed(&self) -> bool {
        self.owner_id.is_some()
    }
}
