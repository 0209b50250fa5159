use rand::Rng;
use sha2::{Digest, Sha256};
use totp_rs::{Algorithm, Secret, TOTP};

use crate::config::TwoFactorConfig;
use crate::error::{AppError, Result};

/// Hash a password using bcrypt
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against its hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Generate a cryptographically secure random string (hex)
pub fn generate_random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..length).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

// ==========================================================================
// TOTP (Time-based One-Time Password) Functions
// ==========================================================================

/// Generate a new TOTP secret (base32 encoded, 160 bits)
pub fn generate_totp_secret() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

/// Create a TOTP instance with an explicit tolerance (skew) in steps.
///
/// Used for code generation and checking only; provisioning URIs are built
/// separately. Secret strength is enforced where secrets are minted
/// (`generate_totp_secret`), so stored secrets are decoded without a length
/// check here and short externally provisioned secrets still verify.
fn create_totp(config: &TwoFactorConfig, secret: &str, skew: u8) -> Result<TOTP> {
    let secret_bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| AppError::Internal(format!("Invalid TOTP secret: {}", e)))?;

    Ok(TOTP::new_unchecked(
        Algorithm::SHA1,
        config.digits,
        skew,
        config.period,
        secret_bytes,
    ))
}

/// Validate candidate code format: trimmed, exactly `digits` ASCII digits.
///
/// Runs before any cryptographic work so malformed input fails fast without
/// touching the secret.
pub fn validate_code_format(code: &str, digits: usize) -> Result<&str> {
    let code = code.trim();
    if code.len() != digits || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidTokenFormat);
    }
    Ok(code)
}

/// Generate the code for the counter containing `time` (Unix seconds).
pub fn generate_totp_code(config: &TwoFactorConfig, secret: &str, time: u64) -> Result<String> {
    Ok(create_totp(config, secret, 0)?.generate(time))
}

/// Verify a TOTP code at an explicit time with a single tolerance tier.
pub fn verify_totp_code(
    config: &TwoFactorConfig,
    secret: &str,
    code: &str,
    time: u64,
    skew: u8,
) -> Result<bool> {
    let code = validate_code_format(code, config.digits)?;
    Ok(create_totp(config, secret, skew)?.check(code, time))
}

/// Verify a TOTP code using the escalating tolerance policy.
///
/// Tiers from `config.tolerance_tiers` are tried in order; the first tier
/// that accepts the code wins. Acceptance beyond the first tier means the
/// submitting clock drifted well past the step length, so it is logged at
/// WARN.
pub fn verify_totp(config: &TwoFactorConfig, secret: &str, code: &str, time: u64) -> Result<bool> {
    let code = validate_code_format(code, config.digits)?;

    for (tier, &skew) in config.tolerance_tiers.iter().enumerate() {
        let totp = create_totp(config, secret, skew)?;
        if totp.check(code, time) {
            if tier == 0 {
                tracing::debug!(tier, skew, "TOTP code accepted");
            } else {
                tracing::warn!(tier, skew, "TOTP code accepted at widened tolerance tier");
            }
            return Ok(true);
        }
        tracing::debug!(tier, skew, "TOTP code rejected at tolerance tier");
    }

    Ok(false)
}

/// Build the otpauth:// provisioning URI consumed by authenticator apps.
///
/// The format is parsed verbatim by third-party apps, so it is assembled by
/// hand rather than delegated: issuer and label are percent-encoded, the
/// secret stays unpadded base32, and the period parameter is always present.
pub fn get_totp_provisioning_uri(config: &TwoFactorConfig, secret: &str, label: &str) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        urlencoding::encode(&config.issuer),
        urlencoding::encode(label),
        secret,
        urlencoding::encode(&config.issuer),
        config.digits,
        config.period,
    )
}

// ==========================================================================
// Recovery Code Functions
// ==========================================================================

/// Generate a batch of single-use recovery codes (uppercase hex).
pub fn generate_recovery_codes(config: &TwoFactorConfig) -> Vec<String> {
    (0..config.recovery_code_count)
        .map(|_| generate_random_string(config.recovery_code_bytes).to_ascii_uppercase())
        .collect()
}

/// Hash a recovery code for storage or lookup (SHA-256, hex).
///
/// Candidates are normalized (trimmed, uppercased) first so user input
/// matches regardless of case. The hash is deterministic so a spend is a
/// single conditional UPDATE on the stored hash.
pub fn hash_recovery_code(code: &str) -> String {
    let normalized = code.trim().to_ascii_uppercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
