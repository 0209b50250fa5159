pub mod two_factor_recovery_code;
pub mod user;

#[allow(unused_imports)]
pub mod prelude {
    pub use super::two_factor_recovery_code::{self, Entity as TwoFactorRecoveryCode};
    pub use super::user::{self, Entity as User};
}
