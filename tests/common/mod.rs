//! Test helpers shared by the integration test suites.

#![allow(dead_code)]

use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use glowbook_twofactor::migrations::Migrator;

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> DatabaseConnection {
    // Use simple in-memory SQLite - each connection gets its own database
    let db_url = "sqlite::memory:";

    let db = Database::connect(db_url)
        .await
        .expect("Failed to create test database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run test migrations");

    db
}

/// Create a test user and return the user model
pub async fn create_test_user(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> glowbook_twofactor::models::user::Model {
    use glowbook_twofactor::models::user;
    use glowbook_twofactor::services::security::hash_password;
    use sea_orm::{ActiveModelTrait, Set};

    let hashed = hash_password(password).unwrap();
    let now = chrono::Utc::now();

    let new_user = user::ActiveModel {
        email: Set(email.to_string()),
        hashed_password: Set(hashed),
        totp_secret: Set(None),
        totp_enabled: Set(false),
        totp_verified_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    new_user.insert(db).await.unwrap()
}
