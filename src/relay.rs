//! Per-message control flow: evaluate → backend → consume → warn.
//!
//! This is the transport-free service seam. The chat adapter calls these
//! functions and renders the returned strings verbatim; no business
//! logic lives in the adapter, and none of these functions touch the
//! wire protocol.

use crate::access::{self, activation};
use crate::backend::Backend;
use crate::db::AppState;
use crate::db::queries;
use crate::error::Result;

/// Apology shown when storage itself is unavailable for a request.
/// Storage trouble on the message path never crashes the bot loop.
const STORAGE_APOLOGY: &str =
    "❌ Something went wrong while checking your access. Please try again later.";

/// Handle an ordinary text message end to end and return the reply text.
///
/// The quota check and the charge are intentionally separated by the
/// backend call: a failed call is never billed. Under a rapid same-user
/// double-send both messages can pass the check before either consumes,
/// over-admitting by a small bounded margin, an accepted tradeoff over
/// holding a row lock across a network round-trip that can take tens of
/// seconds.
pub async fn handle_message<B: Backend>(
    state: &AppState,
    backend: &B,
    user_id: i64,
    text: &str,
) -> String {
    let status = match check_access(state, user_id) {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(user_id, error = %e, "access check failed");
            return STORAGE_APOLOGY.to_string();
        }
    };

    if !status.has_access {
        let reason = status.denial.unwrap_or(access::DenialReason::NoPlan);
        return access::notify::denial_message(&reason, &state.config.plan);
    }

    let output = match backend.process(text, user_id).await {
        Ok(output) => output,
        Err(e) => {
            tracing::error!(user_id, error = %e, "backend call failed, not consuming");
            return e.user_message();
        }
    };

    match consume(state, user_id) {
        Ok(updated) => match updated.warning {
            Some(warning) => {
                format!("{output}\n\n{}", access::notify::warning_message(&warning))
            }
            None => output,
        },
        Err(e) => {
            // The user got their answer; losing one charge beats losing
            // the reply.
            tracing::error!(user_id, error = %e, "failed to record consumption");
            output
        }
    }
}

/// `/start [code]`: with a code, attempt a redemption (paid-family codes
/// are routed by their prefix); without one, greet and show standing.
pub fn handle_start(state: &AppState, user_id: i64, code_arg: Option<&str>) -> String {
    match code_arg {
        Some(code) => match redeem(state, user_id, code) {
            Ok(redemption) => redemption.message,
            Err(e) => {
                tracing::error!(user_id, error = %e, "redemption failed");
                STORAGE_APOLOGY.to_string()
            }
        },
        None => match check_access(state, user_id) {
            Ok(status) => welcome_text(state, &status),
            Err(e) => {
                tracing::error!(user_id, error = %e, "access check failed");
                STORAGE_APOLOGY.to_string()
            }
        },
    }
}

/// `/profile`: full quota summary, falling back to a generic message on
/// any storage failure; profile rendering never propagates an error.
pub fn handle_profile(state: &AppState, user_id: i64) -> String {
    let profile = || -> Result<String> {
        let conn = state.db.get()?;
        let now = queries::now();
        let entitlement = queries::get_or_create_entitlement(&conn, user_id, now)?;
        let status = access::evaluate(&entitlement, &state.config.plan, now);
        Ok(access::notify::profile_text(
            &entitlement,
            &status,
            &state.config.plan,
        ))
    };
    profile().unwrap_or_else(|e| {
        tracing::error!(user_id, error = %e, "failed to build profile");
        access::notify::PROFILE_FALLBACK.to_string()
    })
}

/// `/new_dialog`: ask the backend to drop the conversation history.
pub async fn handle_new_dialog<B: Backend>(backend: &B, user_id: i64) -> String {
    if backend.reset_dialog(user_id).await {
        "🔄 Starting a new dialog. Previous context has been cleared — \
         just send your first question."
            .to_string()
    } else {
        "🔄 Starting a new dialog. The previous context could not be cleared \
         right now, but you can simply continue with a new topic."
            .to_string()
    }
}

fn check_access(state: &AppState, user_id: i64) -> Result<access::AccessStatus> {
    let conn = state.db.get()?;
    access::check(&conn, user_id, &state.config.plan, queries::now())
}

fn consume(state: &AppState, user_id: i64) -> Result<access::AccessStatus> {
    let conn = state.db.get()?;
    access::consume(&conn, user_id, &state.config.plan, queries::now())
}

fn redeem(state: &AppState, user_id: i64, code: &str) -> Result<activation::Redemption> {
    let mut conn = state.db.get()?;
    let now = queries::now();
    if code.starts_with(activation::PAID_CODE_PREFIX) {
        activation::redeem_paid(&mut conn, &state.config.plan, code, user_id, now)
    } else {
        activation::redeem(&mut conn, &state.config.plan, code, user_id, now)
    }
}

fn welcome_text(state: &AppState, status: &access::AccessStatus) -> String {
    let mut text = String::from("🤖 Welcome! I relay your questions to the processing backend.\n\n");

    if status.has_access {
        text.push_str(&format!(
            "✅ Your access is active!\n📊 Requests available: {} of {}\n",
            status.remaining_requests, status.plan_capacity
        ));
        if let Some(expires_at) = status.expires_at {
            text.push_str(&format!(
                "📅 Valid until: {}\n",
                access::notify::format_datetime(expires_at)
            ));
        }
        text.push_str("\n📝 Send me any question to get started!");
    } else {
        text.push_str(
            "❌ You don't have active access yet.\n\n\
             To activate:\n\
             1. Get an activation code\n\
             2. Send: /start CODE\n",
        );
        if let Some(link) = &state.config.plan.payment_link {
            text.push_str(&format!("\n🔗 Or purchase access:\n{link}"));
        }
    }

    text
}
