use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{AppError, Result};
use crate::models::{ActivationCode, UserEntitlement};

pub fn now() -> i64 {
    Utc::now().timestamp()
}

const ENTITLEMENT_COLS: &str = "user_id, plan_capacity, plan_used, lifetime_used, \
     expires_at, last_activation_at, last_request_at, created_at, updated_at";

const CODE_COLS: &str = "code, owner_id, note, created_at, redeemed_at";

/// Single normalization point for entitlement rows: numeric counters from
/// older schema revisions can be NULL and are coalesced to 0 here, so no
/// caller ever sees a partially-initialized record.
fn entitlement_from_row(row: &Row) -> rusqlite::Result<UserEntitlement> {
    Ok(UserEntitlement {
        user_id: row.get(0)?,
        plan_capacity: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
        plan_used: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
        lifetime_used: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        expires_at: row.get(4)?,
        last_activation_at: row.get(5)?,
        last_request_at: row.get(6)?,
        created_at: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        updated_at: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
    })
}

fn code_from_row(row: &Row) -> rusqlite::Result<ActivationCode> {
    Ok(ActivationCode {
        code: row.get(0)?,
        owner_id: row.get(1)?,
        note: row.get(2)?,
        created_at: row.get(3)?,
        redeemed_at: row.get(4)?,
    })
}

// ============ Entitlements ============

pub fn get_entitlement(conn: &Connection, user_id: i64) -> Result<Option<UserEntitlement>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM entitlements WHERE user_id = ?1", ENTITLEMENT_COLS),
            params![user_id],
            entitlement_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Fetch the user's entitlement, creating a zero-valued row on first
/// contact. Rows are never deleted afterwards.
pub fn get_or_create_entitlement(
    conn: &Connection,
    user_id: i64,
    now: i64,
) -> Result<UserEntitlement> {
    conn.execute(
        "INSERT OR IGNORE INTO entitlements (user_id, created_at, updated_at)
         VALUES (?1, ?2, ?2)",
        params![user_id, now],
    )?;
    get_entitlement(conn, user_id)?
        .ok_or_else(|| AppError::Internal(format!("entitlement row missing for user {user_id}")))
}

/// Charge one request: bump both usage counters and stamp the request
/// time. No access check here; callers evaluate first.
pub fn record_consumption(conn: &Connection, user_id: i64, now: i64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE entitlements
         SET plan_used = plan_used + 1,
             lifetime_used = lifetime_used + 1,
             last_request_at = ?2,
             updated_at = ?2
         WHERE user_id = ?1",
        params![user_id, now],
    )?;
    Ok(updated > 0)
}

/// Add a plan increment on top of the existing capacity and move the
/// expiry to the given timestamp. Used by both redemption families; the
/// families differ only in how `expires_at` is computed by the caller.
pub fn add_plan_grant(
    conn: &Connection,
    user_id: i64,
    requests: i64,
    expires_at: i64,
    now: i64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE entitlements
         SET plan_capacity = plan_capacity + ?2,
             expires_at = ?3,
             last_activation_at = ?4,
             updated_at = ?4
         WHERE user_id = ?1",
        params![user_id, requests, expires_at, now],
    )?;
    Ok(updated > 0)
}

/// First activation of a never-activated user: set capacity outright and
/// clear the usage counter for the fresh package.
pub fn set_initial_grant(
    conn: &Connection,
    user_id: i64,
    requests: i64,
    expires_at: i64,
    now: i64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE entitlements
         SET plan_capacity = ?2,
             plan_used = 0,
             expires_at = ?3,
             last_activation_at = ?4,
             updated_at = ?4
         WHERE user_id = ?1",
        params![user_id, requests, expires_at, now],
    )?;
    Ok(updated > 0)
}

// ============ Activation codes ============

pub fn get_code(conn: &Connection, code: &str) -> Result<Option<ActivationCode>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM activation_codes WHERE code = ?1", CODE_COLS),
            params![code],
            code_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Register a code if it does not exist yet, without claiming it.
/// Self-issuing scheme: unknown codes are auto-registered unredeemed and
/// then claimed through [`claim_code`], so concurrent redeemers of the
/// same fresh code still race through a single guarded UPDATE.
pub fn ensure_code(conn: &Connection, code: &str, now: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO activation_codes (code, created_at) VALUES (?1, ?2)",
        params![code, now],
    )?;
    Ok(())
}

/// Atomic check-and-set of code ownership. The `owner_id IS NULL` guard
/// makes this a single-statement claim: exactly one caller wins, every
/// other caller sees zero affected rows.
pub fn claim_code(conn: &Connection, code: &str, user_id: i64, now: i64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE activation_codes
         SET owner_id = ?2, redeemed_at = ?3
         WHERE code = ?1 AND owner_id IS NULL",
        params![code, user_id, now],
    )?;
    Ok(updated > 0)
}

/// Insert a pre-registered, unredeemed code (administrative issuance).
/// A collision on the primary key surfaces as `DuplicateCode`.
pub fn insert_code(
    conn: &Connection,
    code: &str,
    note: Option<&str>,
    now: i64,
) -> Result<ActivationCode> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO activation_codes (code, note, created_at) VALUES (?1, ?2, ?3)",
        params![code, note, now],
    )?;
    if inserted == 0 {
        return Err(AppError::DuplicateCode(code.to_string()));
    }
    Ok(ActivationCode {
        code: code.to_string(),
        owner_id: None,
        note: note.map(String::from),
        created_at: now,
        redeemed_at: None,
    })
}
