//! Two-factor authentication lifecycle: setup, enable, disable, status,
//! recovery-code management, and the unified verification entry point.
//!
//! All state lives in the database; every multi-write runs inside an explicit
//! transaction so partial states are never observable.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;

use crate::config::TwoFactorConfig;
use crate::error::{AppError, Result};
use crate::models::prelude::{TwoFactorRecoveryCode, User};
use crate::models::{two_factor_recovery_code, user};
use crate::services::security::{
    generate_recovery_codes, generate_totp_secret, get_totp_provisioning_uri, hash_recovery_code,
    verify_password, verify_totp,
};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TwoFactorSetupResponse {
    pub secret: String,
    pub provisioning_uri: String,
}

#[derive(Debug, Serialize)]
pub struct TwoFactorEnableResponse {
    pub enabled: bool,
    pub recovery_codes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TwoFactorDisableResponse {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct TwoFactorStatusResponse {
    pub enabled: bool,
    pub configured: bool,
    pub remaining_recovery_codes: u64,
}

// ============================================================================
// Access Gate
// ============================================================================

/// Per-request verification signal supplied by the transport layer, typically
/// set right after a successful [`verify_2fa`] call.
pub trait TwoFactorGate {
    fn is_two_factor_verified(&self) -> bool;
}

/// Admit a sensitive operation: unconditionally when the user has no 2FA,
/// otherwise only with a fresh verification signal from the gate.
pub async fn require_two_factor(
    db: &DatabaseConnection,
    user_id: i64,
    gate: &dyn TwoFactorGate,
) -> Result<()> {
    let user_record = load_user(db, user_id).await?;

    if user_record.totp_enabled && !gate.is_two_factor_verified() {
        return Err(AppError::Unauthorized(
            "Two-factor verification required".to_string(),
        ));
    }

    Ok(())
}

// ============================================================================
// State Machine Operations
// ============================================================================

async fn load_user(db: &DatabaseConnection, user_id: i64) -> Result<user::Model> {
    User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Set up 2FA: generate a fresh secret and provisioning URI.
///
/// Setup always wins: any previous secret is overwritten, `totp_enabled` is
/// forced off even if it was on, and every stored recovery code is purged in
/// the same transaction (a stale secret's codes must not outlive it). The
/// caller has to pass `enable` again before the new factor protects anything.
/// Two racing setups both succeed; the last write determines the secret.
pub async fn setup(
    db: &DatabaseConnection,
    config: &TwoFactorConfig,
    user_id: i64,
    label: &str,
) -> Result<TwoFactorSetupResponse> {
    let user_record = load_user(db, user_id).await?;

    let secret = generate_totp_secret();
    let provisioning_uri = get_totp_provisioning_uri(config, &secret, label);

    let now = Utc::now();
    let txn = db.begin().await?;

    let mut user_model: user::ActiveModel = user_record.into();
    user_model.totp_secret = Set(Some(secret.clone()));
    user_model.totp_enabled = Set(false);
    user_model.totp_verified_at = Set(None);
    user_model.updated_at = Set(now);
    user_model.update(&txn).await?;

    TwoFactorRecoveryCode::delete_many()
        .filter(two_factor_recovery_code::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(user_id, "two-factor secret provisioned");

    Ok(TwoFactorSetupResponse {
        secret,
        provisioning_uri,
    })
}

/// Enable 2FA: verify the candidate against the stored secret and activate.
///
/// On success a fresh recovery-code batch is minted and the plaintexts are
/// returned to the caller exactly once; only hashes are kept.
pub async fn enable(
    db: &DatabaseConnection,
    config: &TwoFactorConfig,
    user_id: i64,
    code: &str,
) -> Result<TwoFactorEnableResponse> {
    let user_record = load_user(db, user_id).await?;

    if user_record.totp_enabled {
        return Err(AppError::BadRequest(
            "Two-factor authentication is already enabled".to_string(),
        ));
    }

    let secret = user_record
        .totp_secret
        .clone()
        .ok_or(AppError::NotConfigured)?;

    let now = Utc::now();
    if !verify_totp(config, &secret, code, now.timestamp() as u64)? {
        return Err(AppError::InvalidToken);
    }

    let codes = generate_recovery_codes(config);

    let txn = db.begin().await?;

    replace_recovery_codes(&txn, user_id, &codes, now).await?;

    let mut user_model: user::ActiveModel = user_record.into();
    user_model.totp_enabled = Set(true);
    user_model.totp_verified_at = Set(Some(now));
    user_model.updated_at = Set(now);
    user_model.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(user_id, "two-factor authentication enabled");

    Ok(TwoFactorEnableResponse {
        enabled: true,
        recovery_codes: codes,
    })
}

/// Disable 2FA. Requires the account password to be re-verified first; the
/// secret, the enabled flag, and all recovery codes are cleared together.
pub async fn disable(
    db: &DatabaseConnection,
    user_id: i64,
    password: &str,
) -> Result<TwoFactorDisableResponse> {
    let user_record = load_user(db, user_id).await?;

    if !user_record.totp_enabled {
        return Err(AppError::BadRequest(
            "Two-factor authentication is not enabled".to_string(),
        ));
    }

    if !verify_password(password, &user_record.hashed_password) {
        return Err(AppError::Unauthorized("Incorrect password".to_string()));
    }

    let now = Utc::now();
    let txn = db.begin().await?;

    let mut user_model: user::ActiveModel = user_record.into();
    user_model.totp_secret = Set(None);
    user_model.totp_enabled = Set(false);
    user_model.totp_verified_at = Set(None);
    user_model.updated_at = Set(now);
    user_model.update(&txn).await?;

    TwoFactorRecoveryCode::delete_many()
        .filter(two_factor_recovery_code::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(user_id, "two-factor authentication disabled");

    Ok(TwoFactorDisableResponse { enabled: false })
}

/// Read-only status: enabled flag, whether a secret exists, and how many
/// recovery codes remain unspent.
pub async fn status(db: &DatabaseConnection, user_id: i64) -> Result<TwoFactorStatusResponse> {
    let user_record = load_user(db, user_id).await?;

    let remaining_recovery_codes = TwoFactorRecoveryCode::find()
        .filter(two_factor_recovery_code::Column::UserId.eq(user_id))
        .filter(two_factor_recovery_code::Column::UsedAt.is_null())
        .count(db)
        .await?;

    Ok(TwoFactorStatusResponse {
        enabled: user_record.totp_enabled,
        configured: user_record.totp_secret.is_some(),
        remaining_recovery_codes,
    })
}

/// Replace the recovery-code batch. Requires a valid TOTP code; `enabled` is
/// left untouched. Returns the new plaintexts exactly once.
pub async fn regenerate_recovery_codes(
    db: &DatabaseConnection,
    config: &TwoFactorConfig,
    user_id: i64,
    code: &str,
) -> Result<Vec<String>> {
    let user_record = load_user(db, user_id).await?;

    let secret = user_record
        .totp_secret
        .clone()
        .ok_or(AppError::NotConfigured)?;

    if !user_record.totp_enabled {
        return Err(AppError::BadRequest(
            "Two-factor authentication is not enabled".to_string(),
        ));
    }

    let now = Utc::now();
    if !verify_totp(config, &secret, code, now.timestamp() as u64)? {
        return Err(AppError::InvalidToken);
    }

    let codes = generate_recovery_codes(config);

    let txn = db.begin().await?;
    replace_recovery_codes(&txn, user_id, &codes, now).await?;
    txn.commit().await?;

    tracing::info!(user_id, "recovery codes regenerated");

    Ok(codes)
}

/// Delete every recovery code for the user and insert the new batch.
///
/// Callers run this inside a transaction: a reader must observe the old batch
/// or the new one, never a mix, and a crash in between leaves zero valid
/// codes rather than a fail-open state.
async fn replace_recovery_codes<C: ConnectionTrait>(
    conn: &C,
    user_id: i64,
    codes: &[String],
    now: DateTime<Utc>,
) -> Result<()> {
    TwoFactorRecoveryCode::delete_many()
        .filter(two_factor_recovery_code::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;

    let rows: Vec<two_factor_recovery_code::ActiveModel> = codes
        .iter()
        .map(|code| two_factor_recovery_code::ActiveModel {
            user_id: Set(user_id),
            code_hash: Set(hash_recovery_code(code)),
            used_at: Set(None),
            created_at: Set(now),
            ..Default::default()
        })
        .collect();

    TwoFactorRecoveryCode::insert_many(rows).exec(conn).await?;

    Ok(())
}

// ============================================================================
// Verification Facade
// ============================================================================

/// Unified verification entry point for login challenges and step-up checks:
/// tries the candidate as a TOTP code first, then as a recovery code.
///
/// Never fails on a bad code. Unknown user, 2FA not enabled, wrong code, and
/// an already-spent recovery code all come back as a plain `false` so callers
/// cannot distinguish the failure modes; only infrastructure errors surface
/// as `Err`.
pub async fn verify_2fa(
    db: &DatabaseConnection,
    config: &TwoFactorConfig,
    user_id: i64,
    code: &str,
) -> Result<bool> {
    let Some(user_record) = User::find_by_id(user_id).one(db).await? else {
        return Ok(false);
    };

    if !user_record.totp_enabled {
        return Ok(false);
    }

    let Some(secret) = user_record.totp_secret.as_deref() else {
        return Ok(false);
    };

    let now = Utc::now();
    match verify_totp(config, secret, code, now.timestamp() as u64) {
        Ok(true) => return Ok(true),
        Ok(false) => {}
        // Not shaped like a TOTP code; it may still be a recovery code.
        Err(AppError::InvalidTokenFormat) => {}
        Err(e) => return Err(e),
    }

    verify_recovery_code(db, user_id, code, now).await
}

/// Spend a recovery code.
///
/// The lookup and the used-flip are one conditional UPDATE guarded by
/// `used_at IS NULL`, so two concurrent submissions of the same code cannot
/// both succeed: whichever statement runs second affects zero rows.
async fn verify_recovery_code(
    db: &DatabaseConnection,
    user_id: i64,
    candidate: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Ok(false);
    }

    let code_hash = hash_recovery_code(candidate);

    let result = TwoFactorRecoveryCode::update_many()
        .col_expr(two_factor_recovery_code::Column::UsedAt, Expr::value(now))
        .filter(two_factor_recovery_code::Column::UserId.eq(user_id))
        .filter(two_factor_recovery_code::Column::CodeHash.eq(code_hash))
        .filter(two_factor_recovery_code::Column::UsedAt.is_null())
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        tracing::info!(user_id, "recovery code accepted");
        Ok(true)
    } else {
        Ok(false)
    }
}
