use std::borrow::ToOwned;
use std::time::Duration;

use argon2::{
    password_hash::{
        rand_core::OsRng, Error as PasswordHashError, PasswordHash, PasswordHasher,
        PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::task;
use tracing::{debug, error};

use crate::users::{self, UserError, UserRecord};

/// Minimum required length for passwords, in characters.
pub const PASSWORD_MIN_CHARS: usize = 8;
/// Argon2 memory cost in kibibytes (~19 MB).
const ARGON2_MEMORY_COST: u32 = 19_456;
/// Argon2 time cost (iterations).
const ARGON2_TIME_COST: u32 = 2;
/// Argon2 parallelism (lanes).
const ARGON2_PARALLELISM: u32 = 1;
/// Length of the produced password hash output (bytes).
const ARGON2_OUTPUT_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication failed")]
    InvalidCredentials,
    #[error("Password hashing join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Password hashing error: {0:?}")]
    PasswordHash(PasswordHashError),
    #[error("Argon2 error: {0:?}")]
    Argon2(argon2::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("email address is already registered")]
    DuplicateEmail,
}

impl From<UserError> for AuthError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::DuplicateEmail => AuthError::DuplicateEmail,
            UserError::Database(err) => AuthError::Database(err),
        }
    }
}

/// Combine the optional pepper with the provided password.
fn combine_password_and_pepper(password: &str, pepper: Option<&str>) -> String {
    match pepper {
        Some(pepper) => format!("{pepper}{password}"),
        None => password.to_owned(),
    }
}

fn configured_argon2() -> Result<Argon2<'static>, AuthError> {
    let params = Params::new(
        ARGON2_MEMORY_COST,
        ARGON2_TIME_COST,
        ARGON2_PARALLELISM,
        Some(ARGON2_OUTPUT_LENGTH),
    )
    .map_err(AuthError::Argon2)?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password with Argon2id on the blocking pool.
pub async fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, AuthError> {
    let password = password.to_owned();
    let pepper = pepper.map(ToOwned::to_owned);

    task::spawn_blocking(move || {
        let password_material = combine_password_and_pepper(&password, pepper.as_deref());
        let salt = SaltString::generate(&mut OsRng);
        let hash = configured_argon2()?
            .hash_password(password_material.as_bytes(), &salt)
            .map_err(AuthError::PasswordHash)?
            .to_string();
        Ok::<_, AuthError>(hash)
    })
    .await?
}

/// The outcome of a successful password check.
#[derive(Debug, Clone, Copy)]
pub struct PasswordVerification {
    pub needs_rehash: bool,
}

/// Verify a password against a stored hash and signal whether a rehash is required.
pub async fn verify_password(
    password: &str,
    stored_hash: &str,
    pepper: Option<&str>,
) -> Result<PasswordVerification, AuthError> {
    let password = password.to_owned();
    let stored_hash = stored_hash.to_owned();
    let pepper = pepper.map(ToOwned::to_owned);

    task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&stored_hash).map_err(AuthError::PasswordHash)?;
        let password_material = combine_password_and_pepper(&password, pepper.as_deref());

        match configured_argon2()?.verify_password(password_material.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(PasswordVerification {
                needs_rehash: password_needs_rehash(&parsed_hash)?,
            }),
            Err(PasswordHashError::Password) => Err(AuthError::InvalidCredentials),
            Err(err) => Err(AuthError::PasswordHash(err)),
        }
    })
    .await?
}

fn password_needs_rehash(hash: &PasswordHash<'_>) -> Result<bool, AuthError> {
    let params = Params::try_from(hash).map_err(AuthError::PasswordHash)?;
    let version_mismatch = hash.version != Some(Version::V0x13 as u32);
    let algorithm_mismatch = hash.algorithm.as_str() != "argon2id";
    let output_length = hash.hash.map(|digest| digest.len()).unwrap_or_default();

    Ok(params.m_cost() < ARGON2_MEMORY_COST
        || params.t_cost() < ARGON2_TIME_COST
        || params.p_cost() < ARGON2_PARALLELISM
        || version_mismatch
        || algorithm_mismatch
        || output_length < ARGON2_OUTPUT_LENGTH)
}

/// Hash the password and create the account. A taken email surfaces as
/// [`AuthError::DuplicateEmail`].
pub async fn register_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password: &str,
    pepper: Option<&str>,
) -> Result<i64, AuthError> {
    let hashed_password = hash_password(password, pepper).await?;
    let id = users::insert_user(pool, name, email, &hashed_password).await?;
    Ok(id)
}

/// Check an email/password pair.
///
/// Unknown emails and wrong passwords both yield
/// [`AuthError::InvalidCredentials`]; callers must not tell them apart.
pub async fn authenticate(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    pepper: Option<&str>,
) -> Result<UserRecord, AuthError> {
    let Some(user) = users::find_user_by_email(pool, email).await? else {
        return Err(AuthError::InvalidCredentials);
    };

    let verification = verify_password(password, &user.hashed_password, pepper).await?;

    if verification.needs_rehash {
        match hash_password(password, pepper).await {
            Ok(new_hash) => {
                if let Err(err) = users::update_password_hash(pool, user.id, &new_hash).await {
                    error!(target: "auth", %err, user_id = user.id, "failed to store rehashed password");
                } else {
                    debug!(target: "auth", user_id = user.id, "password hash upgraded");
                }
            }
            Err(err) => {
                error!(target: "auth", %err, user_id = user.id, "failed to rehash password");
            }
        }
    }

    Ok(user)
}

/// Introduce a small random backoff when login fails to slow brute-force attempts.
pub async fn randomized_backoff() {
    let base_delay = Duration::from_millis(150);
    let jitter = Duration::from_millis(fastrand::u64(0..150));
    tokio::time::sleep(base_delay + jitter).await;
}
