//! Paid-code issuance endpoint.
//!
//! External payment systems call `POST /issue_paid_code` after a
//! successful payment; the shared secret is the whole authorization
//! story. The response carries the code and the plan parameters it will
//! grant on redemption.

use axum::{Json, extract::State, http::StatusCode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::access::activation::{self, PAID_CODE_PREFIX};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};

/// Digits without 0 and 1 to avoid confusion with O and I on manual
/// entry.
const CODE_DIGITS: &[u8] = b"23456789";
const CODE_SUFFIX_LEN: usize = 10;
const MAX_GENERATION_ATTEMPTS: usize = 10;

#[derive(Debug, Deserialize)]
pub struct IssuePaidCodeRequest {
    /// Shared secret authorizing the caller.
    pub secret: String,
    /// Optional free-text payment-source label.
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssuePaidCodeResponse {
    pub code: String,
    pub limit_requests: i64,
    pub days_valid: i64,
}

/// Generate a paid-family code: the fixed prefix plus a random digit
/// suffix. The suffix is an identifier only; quota amounts come from the
/// plan configuration at redemption time.
pub fn generate_paid_code() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CODE_SUFFIX_LEN)
        .map(|_| CODE_DIGITS[rng.gen_range(0..CODE_DIGITS.len())] as char)
        .collect();
    format!("{PAID_CODE_PREFIX}{suffix}")
}

/// Insert a freshly generated code, regenerating on collision up to
/// [`MAX_GENERATION_ATTEMPTS`] times. The generator is a parameter so
/// the retry bound is reachable from tests.
fn issue_unique_code(
    conn: &rusqlite::Connection,
    note: &str,
    mut generate: impl FnMut() -> String,
) -> Result<crate::models::ActivationCode> {
    for attempt in 1..=MAX_GENERATION_ATTEMPTS {
        let code = generate();
        match activation::issue(conn, &code, Some(note), queries::now()) {
            Ok(issued) => return Ok(issued),
            Err(AppError::DuplicateCode(_)) => {
                tracing::warn!(attempt, "paid code collision, regenerating");
            }
            Err(e) => return Err(e),
        }
    }
    Err(AppError::Internal(
        "could not generate a unique activation code".into(),
    ))
}

pub async fn issue_paid_code(
    State(state): State<AppState>,
    Json(payload): Json<IssuePaidCodeRequest>,
) -> Result<(StatusCode, Json<IssuePaidCodeResponse>)> {
    let expected = state
        .config
        .payment_api_secret
        .as_deref()
        .ok_or_else(|| AppError::Config("PAYMENT_API_SECRET is not set".into()))?;

    if payload.secret.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() != 1 {
        tracing::warn!("issue_paid_code called with an invalid secret");
        return Err(AppError::Unauthorized("Invalid secret".into()));
    }

    let conn = state.db.get()?;
    let note = payload.note.as_deref().unwrap_or("paid");

    let issued = issue_unique_code(&conn, note, generate_paid_code)?;
    tracing::info!(code = %issued.code, note, "paid activation code issued");
    Ok((
        StatusCode::CREATED,
        Json(IssuePaidCodeResponse {
            code: issued.code,
            limit_requests: state.config.plan.plan_requests,
            days_valid: state.config.plan.plan_days,
        }),
    ))
}
