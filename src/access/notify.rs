//! User-facing text for denials, warnings, and the profile summary.
//!
//! Everything here is infallible: formatting runs on already-normalized
//! snapshots and degrades to placeholders instead of propagating. The
//! transport renders these strings verbatim.

use chrono::DateTime;

use super::{AccessStatus, DenialReason, PlanConfig, Warning};
use crate::models::UserEntitlement;

/// Generic fallback when a profile cannot be assembled at all (storage
/// failure under the formatting call). Never let an internal error leak
/// into the chat.
pub const PROFILE_FALLBACK: &str =
    "⚠️ Could not load your profile right now. Please try again later.";

/// `dd.mm.yyyy`, or a placeholder for an out-of-range timestamp.
pub fn format_date(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| "unknown date".to_string())
}

/// `dd.mm.yyyy HH:MM UTC`.
pub fn format_datetime(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%d.%m.%Y %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown date".to_string())
}

fn reason_text(reason: &DenialReason) -> String {
    match reason {
        DenialReason::NoPlan => {
            "You don't have an active package. Activate access with a code or purchase a plan."
                .to_string()
        }
        DenialReason::Expired { expires_at } => format!(
            "Your access expired on {}. Renew to continue.",
            format_date(*expires_at)
        ),
        DenialReason::Exhausted => {
            "You have used up all requests in the current package. Renew to get more requests."
                .to_string()
        }
    }
}

fn upsell_block(cfg: &PlanConfig) -> String {
    let mut text = format!(
        "💰 Plan: {} requests / {} days — {}\n",
        cfg.plan_requests, cfg.plan_days, cfg.price_label
    );
    match &cfg.payment_link {
        Some(link) => {
            text.push_str(&format!("\n🔗 To activate or renew, follow the link:\n{link}"));
        }
        None => {
            text.push_str("\n💬 Contact the administrator to get an activation code.");
        }
    }
    text
}

pub fn denial_message(reason: &DenialReason, cfg: &PlanConfig) -> String {
    format!("❌ {}\n\n{}", reason_text(reason), upsell_block(cfg))
}

pub fn warning_message(warning: &Warning) -> String {
    match warning {
        Warning::RequestsLow {
            remaining,
            capacity,
        } => format!("⚠️ You have {remaining} requests left out of {capacity}."),
        Warning::ExpiresSoon {
            days_remaining,
            expires_at,
        } => {
            let unit = if *days_remaining == 1 { "day" } else { "days" };
            format!(
                "⚠️ Your access expires in {} {} ({}).",
                days_remaining,
                unit,
                format_date(*expires_at)
            )
        }
    }
}

/// Profile summary for the status snapshot. Appends the upsell block when
/// access is gone or the package is running low.
pub fn profile_text(
    entitlement: &UserEntitlement,
    status: &AccessStatus,
    cfg: &PlanConfig,
) -> String {
    let (status_emoji, status_text) = if status.has_access {
        ("✅", "Active")
    } else {
        ("❌", "Inactive")
    };

    let mut text = format!(
        "👤 Your profile\n\n\
         {status_emoji} Status: {status_text}\n\
         📦 Requests in package: {}\n\
         ✅ Used: {}\n\
         📊 Remaining: {}\n",
        entitlement.plan_capacity,
        entitlement.plan_used,
        entitlement.remaining(),
    );

    if let Some(expires_at) = entitlement.expires_at {
        text.push_str(&format!("📅 Valid until: {}\n", format_datetime(expires_at)));
    }

    text.push_str(&format!(
        "📈 Total requests all time: {}\n",
        entitlement.lifetime_used
    ));

    if !status.has_access || entitlement.remaining() < 20 {
        text.push('\n');
        text.push_str(&upsell_block(cfg));
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{PlanConfig, evaluate};

    fn entitlement(capacity: i64, used: i64, expires_at: Option<i64>) -> UserEntitlement {
        UserEntitlement {
            user_id: 7,
            plan_capacity: capacity,
            plan_used: used,
            lifetime_used: used + 5,
            expires_at,
            last_activation_at: None,
            last_request_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn denial_message_includes_plan_line() {
        let cfg = PlanConfig::default();
        let msg = denial_message(&DenialReason::NoPlan, &cfg);
        assert!(msg.contains("100 requests / 30 days"));
        assert!(msg.contains("administrator"));
    }

    #[test]
    fn denial_message_prefers_payment_link() {
        let cfg = PlanConfig {
            payment_link: Some("https://pay.example.com/plan".into()),
            ..PlanConfig::default()
        };
        let msg = denial_message(&DenialReason::Exhausted, &cfg);
        assert!(msg.contains("https://pay.example.com/plan"));
        assert!(!msg.contains("administrator"));
    }

    #[test]
    fn expired_reason_carries_the_date() {
        let cfg = PlanConfig::default();
        // 2023-11-14 in epoch seconds.
        let msg = denial_message(
            &DenialReason::Expired {
                expires_at: 1_699_971_200,
            },
            &cfg,
        );
        assert!(msg.contains("expired on 14.11.2023"));
    }

    #[test]
    fn healthy_profile_has_no_upsell() {
        let cfg = PlanConfig::default();
        let ent = entitlement(100, 10, Some(NOW + 10 * 86400));
        let status = evaluate(&ent, &cfg, NOW);
        let text = profile_text(&ent, &status, &cfg);
        assert!(text.contains("Status: Active"));
        assert!(text.contains("Remaining: 90"));
        assert!(!text.contains("Plan:"));
    }

    #[test]
    fn low_remaining_profile_appends_upsell() {
        let cfg = PlanConfig::default();
        let ent = entitlement(100, 85, Some(NOW + 10 * 86400));
        let status = evaluate(&ent, &cfg, NOW);
        let text = profile_text(&ent, &status, &cfg);
        assert!(text.contains("Remaining: 15"));
        assert!(text.contains("Plan: 100 requests / 30 days"));
    }

    #[test]
    fn singular_day_in_expiry_warning() {
        let msg = warning_message(&Warning::ExpiresSoon {
            days_remaining: 1,
            expires_at: NOW,
        });
        assert!(msg.contains("in 1 day ("));
    }
}
