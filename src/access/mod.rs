//! Access and quota core: the state machine that decides whether a user
//! may relay a message, charges their quota, and derives low-quota
//! warnings.
//!
//! Evaluation is a pure read over an entitlement snapshot plus a clock
//! value; all mutation lives in [`consume`] and [`activation`]. Keeping
//! the two apart is deliberate: the remote backend call happens between
//! check and charge, so a failed call is never billed. The resulting
//! check-then-act window means a rapid same-user double-send can slip
//! past the nominal quota by a small bounded margin; that liveness
//! tradeoff is accepted rather than locking a row across a network
//! round-trip.

pub mod activation;
pub mod notify;

use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::error::Result;
use crate::models::UserEntitlement;

pub const SECONDS_PER_DAY: i64 = 86400;

/// Immutable plan parameters, injected wherever quota decisions are made
/// so tests can vary them per case.
#[derive(Debug, Clone)]
pub struct PlanConfig {
    /// Requests granted per redeemed code.
    pub plan_requests: i64,
    /// Validity in days per redeemed code.
    pub plan_days: i64,
    /// Display-only price line for upsell texts.
    pub price_label: String,
    /// Where to send users who need to buy access.
    pub payment_link: Option<String>,
    /// Descending; a warning fires on exact equality with `remaining`.
    pub request_warning_thresholds: Vec<i64>,
    /// Descending; compared against floor days until expiry.
    pub day_warning_thresholds: Vec<i64>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            plan_requests: 100,
            plan_days: 30,
            price_label: "1500 RUB".to_string(),
            payment_link: None,
            request_warning_thresholds: vec![30, 10, 3],
            day_warning_thresholds: vec![7, 3, 1],
        }
    }
}

impl PlanConfig {
    /// Expiry for a plan granted at `base` (epoch seconds).
    pub fn expiry_from(&self, base: i64) -> i64 {
        base + self.plan_days * SECONDS_PER_DAY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenialReason {
    /// Never activated, or capacity zeroed out: always reported first.
    NoPlan,
    Expired { expires_at: i64 },
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Warning {
    RequestsLow { remaining: i64, capacity: i64 },
    ExpiresSoon { days_remaining: i64, expires_at: i64 },
}

/// Snapshot of a user's standing at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct AccessStatus {
    pub has_access: bool,
    /// `plan_capacity - plan_used`; negative values are reported as-is.
    pub remaining_requests: i64,
    pub plan_capacity: i64,
    pub plan_used: i64,
    pub lifetime_used: i64,
    pub expires_at: Option<i64>,
    pub warning: Option<Warning>,
    pub denial: Option<DenialReason>,
}

/// Pure evaluation of an entitlement against the clock. No mutation, no
/// I/O; callers do the storage lookup beforehand.
pub fn evaluate(entitlement: &UserEntitlement, cfg: &PlanConfig, now: i64) -> AccessStatus {
    let remaining = entitlement.remaining();
    let expired = entitlement.expires_at.is_some_and(|e| now >= e);
    let exhausted = remaining <= 0;
    let has_access = entitlement.plan_capacity > 0 && !expired && !exhausted;

    // Exactly one reason, in priority order: the capacity check outranks
    // the date check, which outranks exhaustion.
    let denial = if has_access {
        None
    } else if entitlement.plan_capacity == 0 {
        Some(DenialReason::NoPlan)
    } else if expired {
        entitlement
            .expires_at
            .map(|expires_at| DenialReason::Expired { expires_at })
    } else {
        Some(DenialReason::Exhausted)
    };

    let warning = if has_access {
        select_warning(entitlement, cfg, remaining, now)
    } else {
        None
    };

    AccessStatus {
        has_access,
        remaining_requests: remaining,
        plan_capacity: entitlement.plan_capacity,
        plan_used: entitlement.plan_used,
        lifetime_used: entitlement.lifetime_used,
        expires_at: entitlement.expires_at,
        warning,
        denial,
    }
}

/// At most one warning per evaluation; request thresholds outrank day
/// thresholds. Matching is exact equality, not at-or-below: consuming
/// past a threshold in one jump emits nothing for it. That is the
/// intended product behavior, not an off-by-one.
fn select_warning(
    entitlement: &UserEntitlement,
    cfg: &PlanConfig,
    remaining: i64,
    now: i64,
) -> Option<Warning> {
    for &threshold in &cfg.request_warning_thresholds {
        if remaining == threshold {
            return Some(Warning::RequestsLow {
                remaining,
                capacity: entitlement.plan_capacity,
            });
        }
    }

    let expires_at = entitlement.expires_at?;
    let days_remaining = (expires_at - now) / SECONDS_PER_DAY;
    for &threshold in &cfg.day_warning_thresholds {
        if days_remaining == threshold {
            return Some(Warning::ExpiresSoon {
                days_remaining,
                expires_at,
            });
        }
    }

    None
}

/// Look up (lazily creating on first contact) and evaluate.
pub fn check(conn: &Connection, user_id: i64, cfg: &PlanConfig, now: i64) -> Result<AccessStatus> {
    let entitlement = queries::get_or_create_entitlement(conn, user_id, now)?;
    Ok(evaluate(&entitlement, cfg, now))
}

/// Charge one request and return the fresh standing. Unconditional: the
/// caller has already evaluated access, and the backend call in between
/// succeeded.
pub fn consume(conn: &Connection, user_id: i64, cfg: &PlanConfig, now: i64) -> Result<AccessStatus> {
    queries::get_or_create_entitlement(conn, user_id, now)?;
    queries::record_consumption(conn, user_id, now)?;
    check(conn, user_id, cfg, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entitlement(capacity: i64, used: i64, expires_at: Option<i64>) -> UserEntitlement {
        UserEntitlement {
            user_id: 1,
            plan_capacity: capacity,
            plan_used: used,
            lifetime_used: used,
            expires_at,
            last_activation_at: None,
            last_request_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn no_plan_outranks_every_other_reason() {
        // Capacity 0 with an expired date and over-consumed usage still
        // reports NoPlan.
        let ent = entitlement(0, 5, Some(NOW - 100));
        let status = evaluate(&ent, &PlanConfig::default(), NOW);
        assert!(!status.has_access);
        assert_eq!(status.denial, Some(DenialReason::NoPlan));
    }

    #[test]
    fn expired_outranks_exhausted() {
        let expires_at = NOW - 1;
        let ent = entitlement(100, 100, Some(expires_at));
        let status = evaluate(&ent, &PlanConfig::default(), NOW);
        assert_eq!(status.denial, Some(DenialReason::Expired { expires_at }));
    }

    #[test]
    fn exhausted_when_dates_are_fine() {
        let ent = entitlement(100, 100, Some(NOW + SECONDS_PER_DAY));
        let status = evaluate(&ent, &PlanConfig::default(), NOW);
        assert_eq!(status.denial, Some(DenialReason::Exhausted));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        // now >= expires_at denies, so the exact instant is already out.
        let ent = entitlement(100, 0, Some(NOW));
        assert!(!evaluate(&ent, &PlanConfig::default(), NOW).has_access);
        let ent = entitlement(100, 0, Some(NOW + 1));
        assert!(evaluate(&ent, &PlanConfig::default(), NOW).has_access);
    }

    #[test]
    fn negative_remaining_is_reported_verbatim() {
        let ent = entitlement(100, 103, Some(NOW + SECONDS_PER_DAY));
        let status = evaluate(&ent, &PlanConfig::default(), NOW);
        assert!(!status.has_access);
        assert_eq!(status.remaining_requests, -3);
    }

    #[test]
    fn request_warning_fires_on_exact_threshold_only() {
        let cfg = PlanConfig::default();
        let far_future = Some(NOW + 100 * SECONDS_PER_DAY);

        let status = evaluate(&entitlement(100, 90, far_future), &cfg, NOW);
        assert_eq!(
            status.warning,
            Some(Warning::RequestsLow {
                remaining: 10,
                capacity: 100
            })
        );

        // 9 skipped past the 10 threshold: nothing fires. Documented
        // exact-equality semantics.
        let status = evaluate(&entitlement(100, 91, far_future), &cfg, NOW);
        assert_eq!(status.warning, None);
    }

    #[test]
    fn every_configured_request_threshold_fires() {
        let cfg = PlanConfig::default();
        let far_future = Some(NOW + 100 * SECONDS_PER_DAY);
        for &threshold in &[30, 10, 3] {
            let status = evaluate(&entitlement(100, 100 - threshold, far_future), &cfg, NOW);
            assert_eq!(
                status.warning,
                Some(Warning::RequestsLow {
                    remaining: threshold,
                    capacity: 100
                }),
                "threshold {threshold}"
            );
        }
    }

    #[test]
    fn day_warning_uses_floor_of_delta() {
        let cfg = PlanConfig::default();
        // 3 days + 1 hour away floors to 3 days.
        let expires_at = NOW + 3 * SECONDS_PER_DAY + 3600;
        let status = evaluate(&entitlement(100, 50, Some(expires_at)), &cfg, NOW);
        assert_eq!(
            status.warning,
            Some(Warning::ExpiresSoon {
                days_remaining: 3,
                expires_at
            })
        );
    }

    #[test]
    fn request_warning_suppresses_day_warning() {
        let cfg = PlanConfig::default();
        // Both remaining == 10 and 3 days left: only the request warning.
        let expires_at = NOW + 3 * SECONDS_PER_DAY + 60;
        let status = evaluate(&entitlement(100, 90, Some(expires_at)), &cfg, NOW);
        assert!(matches!(status.warning, Some(Warning::RequestsLow { .. })));
    }

    #[test]
    fn no_warning_without_access() {
        let cfg = PlanConfig::default();
        let status = evaluate(&entitlement(0, 0, None), &cfg, NOW);
        assert_eq!(status.warning, None);
    }

    #[test]
    fn never_activated_user_has_no_access() {
        let status = evaluate(&entitlement(0, 0, None), &PlanConfig::default(), NOW);
        assert!(!status.has_access);
        assert_eq!(status.denial, Some(DenialReason::NoPlan));
    }
}
