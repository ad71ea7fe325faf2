//! Plan activation: code redemption and administrative issuance.
//!
//! Two code families share one atomic claim primitive but grant
//! differently:
//!
//! - generic codes reset the expiry to `now + plan_days` on every
//!   redemption, even the Nth;
//! - paid-family codes (`PAID-` prefix, digit suffix) extend from the
//!   later of the current expiry and now, and clear the usage counter on
//!   a first activation.
//!
//! The asymmetry is product behavior for two distinct tiers. Keep the
//! paths separate; do not unify them.

use rusqlite::{Connection, TransactionBehavior};

use super::{PlanConfig, notify};
use crate::db::queries;
use crate::error::Result;
use crate::models::{ActivationCode, UserEntitlement};

/// Fixed prefix of the paid code family.
pub const PAID_CODE_PREFIX: &str = "PAID-";

/// Outcome of a redemption attempt. Failures here are business results,
/// not errors: the message is rendered to the user verbatim.
#[derive(Debug, Clone)]
pub struct Redemption {
    pub ok: bool,
    pub message: String,
}

impl Redemption {
    fn ok(message: String) -> Self {
        Self { ok: true, message }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

enum Claim {
    Won,
    AlreadyYours,
    OwnedByOther,
}

/// Register-if-unknown, then a single guarded UPDATE to take ownership.
/// Exactly one concurrent caller wins a fresh code; everyone else lands
/// in one of the two failure arms.
fn claim(conn: &Connection, code: &str, user_id: i64, now: i64) -> Result<Claim> {
    queries::ensure_code(conn, code, now)?;
    if queries::claim_code(conn, code, user_id, now)? {
        return Ok(Claim::Won);
    }
    match queries::get_code(conn, code)?.and_then(|c| c.owner_id) {
        Some(owner) if owner == user_id => Ok(Claim::AlreadyYours),
        _ => Ok(Claim::OwnedByOther),
    }
}

/// Parse a paid-family code: fixed prefix plus a non-empty all-digit
/// suffix. The suffix identifies the payment and carries no quota value;
/// grant amounts always come from [`PlanConfig`].
pub fn parse_paid_code(code: &str) -> Option<&str> {
    let suffix = code.strip_prefix(PAID_CODE_PREFIX)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(suffix)
}

const MSG_ALREADY_YOURS: &str = "⚠️ You have already redeemed this code.";
const MSG_OWNED_BY_OTHER: &str =
    "❌ This code is invalid or has already been used by another user.";
const MSG_BAD_PAID_FORMAT: &str = "❌ Invalid code format.";

/// Redeem a generic activation code for `user_id`.
///
/// Unknown codes are auto-registered and redeemed in the same
/// transaction (self-issuing scheme). A successful claim grants one
/// standard plan increment with the expiry reset to `now + plan_days`,
/// regardless of any later expiry already on the account.
pub fn redeem(
    conn: &mut Connection,
    cfg: &PlanConfig,
    code: &str,
    user_id: i64,
    now: i64,
) -> Result<Redemption> {
    // IMMEDIATE takes the write lock up front: a deferred transaction
    // upgrading read-to-write mid-redemption would hit SQLITE_BUSY when
    // two connections interleave.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    queries::get_or_create_entitlement(&tx, user_id, now)?;

    let outcome = match claim(&tx, code, user_id, now)? {
        Claim::AlreadyYours => Redemption::failed(MSG_ALREADY_YOURS),
        Claim::OwnedByOther => Redemption::failed(MSG_OWNED_BY_OTHER),
        Claim::Won => {
            queries::add_plan_grant(&tx, user_id, cfg.plan_requests, cfg.expiry_from(now), now)?;
            let entitlement = queries::get_or_create_entitlement(&tx, user_id, now)?;
            tracing::info!(user_id, code, "generic code redeemed");
            Redemption::ok(activation_summary(&entitlement))
        }
    };

    tx.commit()?;
    Ok(outcome)
}

/// Redeem a paid-family code for `user_id`.
///
/// First activation sets the package outright; renewal adds capacity and
/// extends the expiry from `max(current_expiry, now)`, so remaining days
/// on an active plan are never lost and a lapsed plan restarts from now.
pub fn redeem_paid(
    conn: &mut Connection,
    cfg: &PlanConfig,
    code: &str,
    user_id: i64,
    now: i64,
) -> Result<Redemption> {
    if parse_paid_code(code).is_none() {
        // No state change of any kind on a malformed code.
        return Ok(Redemption::failed(MSG_BAD_PAID_FORMAT));
    }

    // IMMEDIATE here too: the first-activation-vs-renewal decision reads
    // the entitlement before the claim UPDATE.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let entitlement = queries::get_or_create_entitlement(&tx, user_id, now)?;

    let outcome = match claim(&tx, code, user_id, now)? {
        Claim::AlreadyYours => Redemption::failed(MSG_ALREADY_YOURS),
        Claim::OwnedByOther => Redemption::failed(MSG_OWNED_BY_OTHER),
        Claim::Won => {
            if entitlement.plan_capacity == 0 {
                queries::set_initial_grant(
                    &tx,
                    user_id,
                    cfg.plan_requests,
                    cfg.expiry_from(now),
                    now,
                )?;
            } else {
                let base = entitlement.expires_at.filter(|&e| e > now).unwrap_or(now);
                queries::add_plan_grant(
                    &tx,
                    user_id,
                    cfg.plan_requests,
                    cfg.expiry_from(base),
                    now,
                )?;
            }
            let entitlement = queries::get_or_create_entitlement(&tx, user_id, now)?;
            tracing::info!(user_id, code, "paid code redeemed");
            Redemption::ok(activation_summary(&entitlement))
        }
    };

    tx.commit()?;
    Ok(outcome)
}

/// Administrative issuance of a pre-registered, unredeemed code.
/// Collides with `AppError::DuplicateCode` if the code already exists.
pub fn issue(
    conn: &Connection,
    code: &str,
    note: Option<&str>,
    now: i64,
) -> Result<ActivationCode> {
    let issued = queries::insert_code(conn, code, note, now)?;
    tracing::info!(code, note, "activation code issued");
    Ok(issued)
}

fn activation_summary(entitlement: &UserEntitlement) -> String {
    let until = entitlement
        .expires_at
        .map(notify::format_datetime)
        .unwrap_or_else(|| "—".to_string());
    format!(
        "✅ Access activated!\n\n\
         📦 Requests available: {} of {}\n\
         📅 Valid until: {}",
        entitlement.remaining(),
        entitlement.plan_capacity,
        until,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paid_code_format() {
        assert_eq!(parse_paid_code("PAID-12345"), Some("12345"));
        assert_eq!(parse_paid_code("PAID-7"), Some("7"));
        assert_eq!(parse_paid_code("PAID-"), None);
        assert_eq!(parse_paid_code("PAID-12a45"), None);
        assert_eq!(parse_paid_code("paid-12345"), None);
        assert_eq!(parse_paid_code("ABC123"), None);
        assert_eq!(parse_paid_code("PAID-123 "), None);
    }
}
