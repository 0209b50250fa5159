//! Tests for the security service primitives: password hashing, TOTP code
//! generation and verification, provisioning URIs, and recovery codes.

use std::collections::HashSet;

use glowbook_twofactor::config::TwoFactorConfig;
use glowbook_twofactor::error::AppError;
use glowbook_twofactor::services::security::{
    generate_random_string, generate_recovery_codes, generate_totp_code, generate_totp_secret,
    get_totp_provisioning_uri, hash_password, hash_recovery_code, validate_code_format,
    verify_password, verify_totp, verify_totp_code,
};

/// Well-known example secret ("Hello!" + 0xDEADBEEF), 80 bits.
const KNOWN_SECRET: &str = "JBSWY3DPEHPK3PXP";

// A counter-aligned timestamp so window arithmetic below stays readable.
const T0: u64 = 1_500_000_000;

// ==========================================================================
// Password Hashing Tests
// ==========================================================================

#[test]
fn test_password_hashing() {
    let password = "test_password123";
    let hash = hash_password(password).unwrap();
    assert!(verify_password(password, &hash));
    assert!(!verify_password("wrong_password", &hash));
}

#[test]
fn test_password_hashing_unicode() {
    let password = "пароль密码🔐";
    let hash = hash_password(password).unwrap();
    assert!(verify_password(password, &hash));
}

#[test]
fn test_verify_password_invalid_hash() {
    assert!(!verify_password("test", "not_a_valid_hash"));
}

// ==========================================================================
// Random String Generation Tests
// ==========================================================================

#[test]
fn test_random_string() {
    let s1 = generate_random_string(16);
    let s2 = generate_random_string(16);
    assert_eq!(s1.len(), 32); // hex encoding doubles length
    assert_ne!(s1, s2);
}

// ==========================================================================
// TOTP Secret Generation Tests
// ==========================================================================

#[test]
fn test_generated_secret_is_base32() {
    let secret = generate_totp_secret();
    // 160-bit secret: 20 bytes, 32 base32 characters, no padding
    assert_eq!(secret.len(), 32);
    assert!(secret
        .chars()
        .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
}

#[test]
fn test_generated_secrets_are_unique() {
    let s1 = generate_totp_secret();
    let s2 = generate_totp_secret();
    assert_ne!(s1, s2);
}

// ==========================================================================
// Code Format Validation Tests
// ==========================================================================

#[test]
fn test_code_format_accepts_six_digits() {
    assert_eq!(validate_code_format("123456", 6).unwrap(), "123456");
    // surrounding whitespace is stripped, not rejected
    assert_eq!(validate_code_format(" 123456 ", 6).unwrap(), "123456");
}

#[test]
fn test_code_format_rejections() {
    for bad in ["", "12345", "1234567", "12a456", "abcdef", "12 456", "１２３４５６"] {
        assert!(
            matches!(validate_code_format(bad, 6), Err(AppError::InvalidTokenFormat)),
            "format check must reject {:?}",
            bad
        );
    }
}

#[test]
fn test_verify_rejects_malformed_before_crypto() {
    let config = TwoFactorConfig::default();
    assert!(matches!(
        verify_totp(&config, KNOWN_SECRET, "12ab56", T0),
        Err(AppError::InvalidTokenFormat)
    ));
    assert!(matches!(
        verify_totp_code(&config, KNOWN_SECRET, "", T0, 0),
        Err(AppError::InvalidTokenFormat)
    ));
}

// ==========================================================================
// TOTP Code Verification Tests
// ==========================================================================

#[test]
fn test_known_code_at_counter_zero() {
    let config = TwoFactorConfig::default();
    // SHA1, 6 digits, period 30, counter 0
    assert_eq!(
        generate_totp_code(&config, KNOWN_SECRET, 0).unwrap(),
        "282760"
    );
    assert!(verify_totp_code(&config, KNOWN_SECRET, "282760", 0, 0).unwrap());
    assert!(!verify_totp_code(&config, KNOWN_SECRET, "000000", 0, 0).unwrap());
}

#[test]
fn test_code_round_trip_zero_tolerance() {
    let config = TwoFactorConfig::default();
    let secret = generate_totp_secret();
    let code = generate_totp_code(&config, &secret, T0).unwrap();
    assert!(verify_totp_code(&config, &secret, &code, T0, 0).unwrap());
    // same counter, different instant
    assert!(verify_totp_code(&config, &secret, &code, T0 + 29, 0).unwrap());
    // next counter
    assert!(!verify_totp_code(&config, &secret, &code, T0 + 30, 0).unwrap());
}

#[test]
fn test_tolerance_window_boundaries() {
    let config = TwoFactorConfig::default();
    let secret = generate_totp_secret();
    let code = generate_totp_code(&config, &secret, T0).unwrap();

    // 2 steps away: inside the +/-2 window, outside nothing narrower
    assert!(verify_totp_code(&config, &secret, &code, T0 + 60, 2).unwrap());
    assert!(!verify_totp_code(&config, &secret, &code, T0 + 90, 2).unwrap());

    // 3..5 steps away: only the +/-5 window accepts
    assert!(verify_totp_code(&config, &secret, &code, T0 + 90, 5).unwrap());
    assert!(verify_totp_code(&config, &secret, &code, T0 + 150, 5).unwrap());
    assert!(!verify_totp_code(&config, &secret, &code, T0 + 180, 5).unwrap());

    // 6..10 steps away: only the +/-10 window accepts
    assert!(verify_totp_code(&config, &secret, &code, T0 + 300, 10).unwrap());
    assert!(!verify_totp_code(&config, &secret, &code, T0 + 330, 10).unwrap());

    // the window is symmetric
    assert!(verify_totp_code(&config, &secret, &code, T0 - 60, 2).unwrap());
    assert!(!verify_totp_code(&config, &secret, &code, T0 - 90, 2).unwrap());
}

#[test]
fn test_escalating_tolerance_policy() {
    let config = TwoFactorConfig::default();
    let secret = generate_totp_secret();
    let code = generate_totp_code(&config, &secret, T0).unwrap();

    // each tier of [2, 5, 10] steps accepts drift the previous tier rejects
    assert!(verify_totp(&config, &secret, &code, T0).unwrap());
    assert!(verify_totp(&config, &secret, &code, T0 + 60).unwrap());
    assert!(verify_totp(&config, &secret, &code, T0 + 150).unwrap());
    assert!(verify_totp(&config, &secret, &code, T0 + 300).unwrap());
    // beyond the widest tier
    assert!(!verify_totp(&config, &secret, &code, T0 + 330).unwrap());
}

#[test]
fn test_single_tier_config() {
    // a deployment can narrow the policy to one strict tier
    let config = TwoFactorConfig {
        tolerance_tiers: vec![1],
        ..Default::default()
    };
    let secret = generate_totp_secret();
    let code = generate_totp_code(&config, &secret, T0).unwrap();

    assert!(verify_totp(&config, &secret, &code, T0 + 30).unwrap());
    assert!(!verify_totp(&config, &secret, &code, T0 + 60).unwrap());
}

// ==========================================================================
// Provisioning URI Tests
// ==========================================================================

#[test]
fn test_provisioning_uri_format() {
    let config = TwoFactorConfig::default();
    let uri = get_totp_provisioning_uri(&config, KNOWN_SECRET, "stylist@example.com");
    assert_eq!(
        uri,
        "otpauth://totp/Glowbook:stylist%40example.com?secret=JBSWY3DPEHPK3PXP&issuer=Glowbook&algorithm=SHA1&digits=6&period=30"
    );
}

#[test]
fn test_provisioning_uri_percent_encodes_issuer() {
    let config = TwoFactorConfig::new("Glowbook Staging");
    let uri = get_totp_provisioning_uri(&config, KNOWN_SECRET, "a b@c.com");
    assert!(uri.starts_with("otpauth://totp/Glowbook%20Staging:a%20b%40c.com?"));
    assert!(uri.contains("&issuer=Glowbook%20Staging&"));
}

// ==========================================================================
// Recovery Code Tests
// ==========================================================================

#[test]
fn test_recovery_code_batch_shape() {
    let config = TwoFactorConfig::default();
    let codes = generate_recovery_codes(&config);

    assert_eq!(codes.len(), 10);
    for code in &codes {
        assert_eq!(code.len(), 8);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    let unique: HashSet<&String> = codes.iter().collect();
    assert_eq!(unique.len(), codes.len());
}

#[test]
fn test_recovery_code_width_is_configurable() {
    let config = TwoFactorConfig {
        recovery_code_bytes: 8,
        recovery_code_count: 4,
        ..Default::default()
    };
    let codes = generate_recovery_codes(&config);
    assert_eq!(codes.len(), 4);
    assert!(codes.iter().all(|c| c.len() == 16));
}

#[test]
fn test_recovery_code_hash_normalizes_input() {
    let hash = hash_recovery_code("A1B2C3D4");
    assert_eq!(hash_recovery_code("a1b2c3d4"), hash);
    assert_eq!(hash_recovery_code("  A1B2C3D4  "), hash);
    assert_ne!(hash_recovery_code("A1B2C3D5"), hash);
    // SHA-256 hex digest
    assert_eq!(hash.len(), 64);
}
