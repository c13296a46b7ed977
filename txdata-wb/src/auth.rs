//! User accounts, password hashing and login sessions
//!
//! Passwords are hashed as SHA-256 iterated over `salt || password` with a
//! random per-user salt. Sessions are opaque random bearer tokens stored in
//! the `sessions` table with an expiry.

use chrono::{Datelike, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{info, warn};
use txdata_common::config::SessionConfig;

use crate::db::{self, sessions, users};
use crate::db::users::{NewUser, User, ADMIN_ROLE};
use crate::error::{ApiError, ApiResult};
use crate::workspace::Workspace;

/// Hash iterations
pub const HASH_ROUNDS: u32 = 10_000;

/// Environment variable holding the admin initialization key
pub const ADMIN_INIT_ENV: &str = "ADMIN_INIT_PW";

const INVALID_LOGIN: &str = "Invalid email or password. Please try again.";

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// New random salt (16 bytes, hex)
pub fn generate_salt() -> String {
    random_hex(16)
}

/// New random session token (32 bytes, hex)
pub fn generate_token() -> String {
    random_hex(32)
}

/// Hex digest of the iterated salted hash
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let mut digest = hasher.finalize();

    for _ in 1..HASH_ROUNDS {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(digest);
        digest = hasher.finalize();
    }

    format!("{:x}", digest)
}

/// Compare a password against stored material in constant time
pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    let actual = hash_password(password, salt);
    if actual.len() != expected_hash.len() {
        return false;
    }
    actual
        .bytes()
        .zip(expected_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Registration form
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// Successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: String,
    pub user: User,
}

fn validate_email(email: &str) -> ApiResult<()> {
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("'{}' is not a valid email address.", email)))
    }
}

/// Create an account with a generated user code
pub async fn register(pool: &SqlitePool, form: &Registration) -> ApiResult<User> {
    let username = form.username.trim();
    let email = form.email.trim().to_lowercase();

    if username.is_empty() || email.is_empty() || form.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Username, email and password are required.".to_string(),
        ));
    }
    validate_email(&email)?;

    if users::find_by_email(pool, &email).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered.".to_string()));
    }
    if users::find_by_username(pool, username).await?.is_some() {
        return Err(ApiError::Conflict("Username already taken.".to_string()));
    }
    if form.password != form.password_confirm {
        return Err(ApiError::BadRequest("Passwords do not match.".to_string()));
    }

    let salt = generate_salt();
    let hash = hash_password(&form.password, &salt);
    let user_code = users::next_user_code(pool, Utc::now().year()).await?;

    let id = users::insert_user(
        pool,
        &NewUser {
            username,
            email: &email,
            password_hash: &hash,
            password_salt: &salt,
            user_code: &user_code,
        },
    )
    .await?;

    info!(user_id = id, user_code = %user_code, "Registered new user");

    users::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::Internal("User vanished after insert".to_string()))
}

/// Check credentials and open a session
pub async fn login(
    pool: &SqlitePool,
    sessions_config: &SessionConfig,
    email: &str,
    password: &str,
    remember: bool,
) -> ApiResult<LoginOutcome> {
    let email = email.trim().to_lowercase();
    let user = users::find_by_email(pool, &email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(INVALID_LOGIN.to_string()))?;

    let record = users::password_record(pool, user.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(INVALID_LOGIN.to_string()))?;

    if !verify_password(password, &record.salt, &record.hash) {
        warn!(user_id = user.id, "Failed login attempt");
        return Err(ApiError::Unauthorized(INVALID_LOGIN.to_string()));
    }

    let ttl_hours = if remember {
        sessions_config.remember_ttl_hours
    } else {
        sessions_config.ttl_hours
    };
    let now = Utc::now();
    let expires_at = db::timestamp(now + Duration::hours(ttl_hours.max(1)));
    let token = generate_token();

    sessions::create_session(pool, &token, user.id, &db::timestamp(now), &expires_at).await?;
    let purged = sessions::delete_expired(pool, &db::timestamp(now)).await?;
    if purged > 0 {
        info!("Purged {} expired sessions", purged);
    }

    info!(user_id = user.id, "User logged in");
    Ok(LoginOutcome {
        token,
        expires_at,
        user,
    })
}

/// User owning a live session token
pub async fn authenticate(pool: &SqlitePool, token: &str) -> ApiResult<Option<User>> {
    Ok(sessions::find_session_user(pool, token, &db::now_timestamp()).await?)
}

/// End a session and drop the user's cached workspace files
pub async fn logout(pool: &SqlitePool, workspace: &Workspace, token: &str, user_id: i64) -> ApiResult<()> {
    sessions::delete_session(pool, token).await?;
    workspace.cleanup_user_session(user_id).await?;
    info!(user_id, "User logged out");
    Ok(())
}

/// Admin bootstrap request (command line)
#[derive(Debug, Clone)]
pub struct AdminRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    /// Key typed by the operator; must equal the configured key
    pub init_key: String,
}

/// Create or promote an administrator
///
/// `configured_key` is the value of `ADMIN_INIT_PW`; without it no admin can
/// be created. An existing user matched by email or username is promoted and
/// gets the new password; otherwise a new account is created.
pub async fn create_admin(
    pool: &SqlitePool,
    request: &AdminRequest,
    configured_key: Option<&str>,
) -> ApiResult<User> {
    let configured_key = configured_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            ApiError::Forbidden(format!("{} is not set; refusing to create an admin", ADMIN_INIT_ENV))
        })?;

    if request.init_key != configured_key {
        return Err(ApiError::Forbidden("Admin initialization key is incorrect".to_string()));
    }

    let email = request.email.trim().to_lowercase();
    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return Err(ApiError::BadRequest("Username and password are required.".to_string()));
    }
    validate_email(&email)?;

    let role_id = users::ensure_role(pool, ADMIN_ROLE, "Administrators").await?;

    let existing = match users::find_by_email(pool, &email).await? {
        Some(user) => Some(user),
        None => users::find_by_username(pool, username).await?,
    };

    let salt = generate_salt();
    let hash = hash_password(&request.password, &salt);

    let user_id = match existing {
        Some(user) => {
            users::update_identity(pool, user.id, username, &email).await?;
            users::update_password(pool, user.id, &hash, &salt).await?;
            info!(user_id = user.id, "Promoting existing user to admin");
            user.id
        }
        None => {
            let user_code = users::next_user_code(pool, Utc::now().year()).await?;
            let id = users::insert_user(
                pool,
                &NewUser {
                    username,
                    email: &email,
                    password_hash: &hash,
                    password_salt: &salt,
                    user_code: &user_code,
                },
            )
            .await?;
            info!(user_id = id, "Created admin user");
            id
        }
    };

    users::set_role(pool, user_id, role_id).await?;

    users::find_by_id(pool, user_id)
        .await?
        .ok_or_else(|| ApiError::Internal("Admin user vanished after update".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use txdata_common::db::init_memory_database;

    fn form(username: &str, email: &str, pw: &str, confirm: &str) -> Registration {
        Registration {
            username: username.to_string(),
            email: email.to_string(),
            password: pw.to_string(),
            password_confirm: confirm.to_string(),
        }
    }

    #[test]
    fn test_hash_is_salted_and_verifiable() {
        let salt = generate_salt();
        let hash = hash_password("secret", &salt);
        assert_eq!(hash.len(), 64);
        assert!(verify_password("secret", &salt, &hash));
        assert!(!verify_password("Secret", &salt, &hash));
        assert_ne!(hash, hash_password("secret", &generate_salt()));
    }

    #[tokio::test]
    async fn test_register_validations() {
        let pool = init_memory_database().await.unwrap();
        let user = register(&pool, &form("ana", "Ana@Example.org", "pw", "pw")).await.unwrap();
        assert_eq!(user.email, "ana@example.org");
        assert!(user.user_code.as_deref().unwrap().starts_with("DL-"));

        let dup_email = register(&pool, &form("other", "ana@example.org", "pw", "pw")).await;
        assert!(matches!(dup_email, Err(ApiError::Conflict(m)) if m == "Email already registered."));

        let dup_name = register(&pool, &form("ana", "new@example.org", "pw", "pw")).await;
        assert!(matches!(dup_name, Err(ApiError::Conflict(m)) if m == "Username already taken."));

        let mismatch = register(&pool, &form("ben", "ben@example.org", "pw", "px")).await;
        assert!(matches!(mismatch, Err(ApiError::BadRequest(m)) if m == "Passwords do not match."));
    }

    #[tokio::test]
    async fn test_login_and_authenticate() {
        let pool = init_memory_database().await.unwrap();
        register(&pool, &form("ana", "ana@example.org", "pw", "pw")).await.unwrap();
        let cfg = SessionConfig::default();

        let bad = login(&pool, &cfg, "ana@example.org", "nope", false).await;
        assert!(matches!(bad, Err(ApiError::Unauthorized(_))));

        let outcome = login(&pool, &cfg, "ana@example.org", "pw", false).await.unwrap();
        let user = authenticate(&pool, &outcome.token).await.unwrap().unwrap();
        assert_eq!(user.username, "ana");
        assert!(authenticate(&pool, "bogus").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_admin_requires_key() {
        let pool = init_memory_database().await.unwrap();
        let request = AdminRequest {
            email: "root@example.org".to_string(),
            username: "root".to_string(),
            password: "pw".to_string(),
            init_key: "let-me-in".to_string(),
        };

        assert!(matches!(create_admin(&pool, &request, None).await, Err(ApiError::Forbidden(_))));
        assert!(matches!(
            create_admin(&pool, &request, Some("other")).await,
            Err(ApiError::Forbidden(_))
        ));

        let admin = create_admin(&pool, &request, Some("let-me-in")).await.unwrap();
        assert!(admin.is_admin());
    }

    #[tokio::test]
    async fn test_create_admin_promotes_existing_user() {
        let pool = init_memory_database().await.unwrap();
        let user = register(&pool, &form("ana", "ana@example.org", "pw", "pw")).await.unwrap();
        assert!(!user.is_admin());

        let request = AdminRequest {
            email: "ana@example.org".to_string(),
            username: "ana".to_string(),
            password: "new-pw".to_string(),
            init_key: "k".to_string(),
        };
        let admin = create_admin(&pool, &request, Some("k")).await.unwrap();
        assert_eq!(admin.id, user.id);
        assert!(admin.is_admin());

        let cfg = SessionConfig::default();
        assert!(login(&pool, &cfg, "ana@example.org", "new-pw", false).await.is_ok());
    }
}
