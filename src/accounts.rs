//! Identity & profile operations.
//!
//! Every account owns exactly one profile row; the two are created in a
//! single transaction so no account can exist without its profile.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    config::Config,
    errors::{AppError, AppResult},
    models::{Role, User, UserProfile, UserRecord},
    utils::hash_password,
};

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// Create a user account together with its profile row, atomically.
///
/// # Errors
/// Returns `UsernameTaken` when the username is already registered, or
/// hashing/database errors.
pub async fn create_account(db: &PgPool, new: &NewAccount) -> AppResult<(User, UserProfile)> {
    let password_hash = hash_password(&new.password)?;

    let mut tx = db.begin().await?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, username, email, password_hash, first_name, last_name, role)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING id, username, email, password_hash, first_name, last_name, role, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(&new.username)
    .bind(&new.email)
    .bind(&password_hash)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(new.role)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::UsernameTaken,
        _ => AppError::Database(e),
    })?;

    let profile = sqlx::query_as::<_, UserProfile>(
        "INSERT INTO user_profiles (user_id)
         VALUES ($1)
         RETURNING user_id, is_subscribed, subscription_start_date, subscription_end_date",
    )
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((user, profile))
}

/// Look up a user by username.
///
/// # Errors
/// Returns database errors.
pub async fn find_by_username(db: &PgPool, username: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, first_name, last_name, role, created_at
         FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Look up a user by id.
///
/// # Errors
/// Returns `NotFound` when no such user exists, or database errors.
pub async fn find_by_id(db: &PgPool, id: Uuid) -> AppResult<User> {
    sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, first_name, last_name, role, created_at
         FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound)
}

/// Fetch the profile row for a user.
///
/// # Errors
/// Returns `NotFound` when the profile is missing, or database errors.
pub async fn find_profile(db: &PgPool, user_id: Uuid) -> AppResult<UserProfile> {
    sqlx::query_as::<_, UserProfile>(
        "SELECT user_id, is_subscribed, subscription_start_date, subscription_end_date
         FROM user_profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound)
}

/// User records joined with their subscription state, optionally filtered
/// by it.
///
/// # Errors
/// Returns database errors.
pub async fn list_profiles(db: &PgPool, subscribed: Option<bool>) -> AppResult<Vec<UserRecord>> {
    let records = match subscribed {
        Some(flag) => {
            sqlx::query_as::<_, UserRecord>(
                "SELECT u.username AS userid, u.email, p.is_subscribed,
                        p.subscription_start_date, p.subscription_end_date
                 FROM user_profiles p JOIN users u ON u.id = p.user_id
                 WHERE p.is_subscribed = $1
                 ORDER BY u.username",
            )
            .bind(flag)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as::<_, UserRecord>(
                "SELECT u.username AS userid, u.email, p.is_subscribed,
                        p.subscription_start_date, p.subscription_end_date
                 FROM user_profiles p JOIN users u ON u.id = p.user_id
                 ORDER BY u.username",
            )
            .fetch_all(db)
            .await?
        }
    };
    Ok(records)
}

/// Seed the admin account from configuration at startup. The admin secret is
/// stored as an Argon2 hash and verified through the ordinary login flow.
/// Does nothing when no admin credentials are configured or the account
/// already exists.
///
/// # Errors
/// Returns hashing or database errors.
pub async fn ensure_admin_account(db: &PgPool, config: &Config) -> AppResult<()> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    if find_by_username(db, username).await?.is_some() {
        return Ok(());
    }

    let account = NewAccount {
        username: username.clone(),
        email: String::new(),
        password: password.clone(),
        first_name: String::new(),
        last_name: String::new(),
        role: Role::Admin,
    };

    match create_account(db, &account).await {
        Ok((user, _)) => {
            info!("seeded admin account {}", user.username);
            Ok(())
        }
        // Concurrent startup may have seeded it first.
        Err(AppError::UsernameTaken) => Ok(()),
        Err(e) => Err(e),
    }
}
