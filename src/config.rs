/// Algorithm and policy parameters for the two-factor subsystem.
///
/// Passed explicitly into every operation that needs them; there is no
/// ambient global, so tests can inject their own values and clocks.
#[derive(Debug, Clone)]
pub struct TwoFactorConfig {
    /// Issuer name shown in authenticator apps and embedded in provisioning URIs.
    pub issuer: String,
    /// Number of code digits.
    pub digits: usize,
    /// Step length in seconds.
    pub period: u64,
    /// Escalating tolerance policy: each entry is a skew in steps, tried in
    /// order until one accepts the code. Widening past the first tier accepts
    /// codes well outside normal clock drift; deployments wanting a strict
    /// window should shrink this to a single tier.
    pub tolerance_tiers: Vec<u8>,
    /// Codes per recovery batch.
    pub recovery_code_count: usize,
    /// Random bytes per recovery code (hex encoding doubles the length).
    pub recovery_code_bytes: usize,
}

impl TwoFactorConfig {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }
}

impl Default for TwoFactorConfig {
    fn default() -> Self {
        Self {
            issuer: "Glowbook".to_string(),
            digits: 6,
            period: 30,
            tolerance_tiers: vec![2, 5, 10],
            recovery_code_count: 10,
            recovery_code_bytes: 4,
        }
    }
}
