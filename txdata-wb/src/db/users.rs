//! User and role database operations

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use txdata_common::Result;

/// Role granting administrative access
pub const ADMIN_ROLE: &str = "Admin";

/// Prefix of generated user codes (`DL-<year>-<seq>`)
pub const USER_CODE_PREFIX: &str = "DL";

/// A registered user (credentials excluded)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub user_code: Option<String>,
    pub role: Option<String>,
    pub created_at: String,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            username: row.get("username"),
            email: row.get("email"),
            user_code: row.get("user_code"),
            role: row.get("role"),
            created_at: row.get("created_at"),
        }
    }
}

/// Stored password material
#[derive(Debug, Clone)]
pub struct PasswordRecord {
    pub hash: String,
    pub salt: String,
}

pub(crate) const USER_SELECT: &str = r#"
    SELECT u.id, u.username, u.email, u.user_code, u.created_at, r.name AS role
    FROM users u
    LEFT JOIN roles r ON r.id = u.role_id
"#;

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub password_salt: &'a str,
    pub user_code: &'a str,
}

/// Insert a user and return its id
pub async fn insert_user(pool: &SqlitePool, user: &NewUser<'_>) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, password_salt, user_code, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.username)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.password_salt)
    .bind(user.user_code)
    .bind(super::now_timestamp())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("{} WHERE u.id = ?", USER_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(User::from_row))
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("{} WHERE u.email = ?", USER_SELECT))
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(User::from_row))
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("{} WHERE u.username = ?", USER_SELECT))
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(User::from_row))
}

/// Password hash and salt for a user
pub async fn password_record(pool: &SqlitePool, user_id: i64) -> Result<Option<PasswordRecord>> {
    let row = sqlx::query("SELECT password_hash, password_salt FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| PasswordRecord {
        hash: r.get("password_hash"),
        salt: r.get("password_salt"),
    }))
}

pub async fn update_password(pool: &SqlitePool, user_id: i64, hash: &str, salt: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ?, password_salt = ? WHERE id = ?")
        .bind(hash)
        .bind(salt)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_identity(pool: &SqlitePool, user_id: i64, username: &str, email: &str) -> Result<()> {
    sqlx::query("UPDATE users SET username = ?, email = ? WHERE id = ?")
        .bind(username)
        .bind(email)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Next free user code for the given year: `DL-2024-0007`
pub async fn next_user_code(pool: &SqlitePool, year: i32) -> Result<String> {
    let prefix = format!("{}-{}-", USER_CODE_PREFIX, year);
    let codes: Vec<String> =
        sqlx::query_scalar("SELECT user_code FROM users WHERE user_code LIKE ?")
            .bind(format!("{}%", prefix))
            .fetch_all(pool)
            .await?;

    let last = codes
        .iter()
        .filter_map(|c| c.strip_prefix(&prefix))
        .filter_map(|seq| seq.parse::<u32>().ok())
        .max()
        .unwrap_or(0);

    Ok(format!("{}{:04}", prefix, last + 1))
}

/// Find a role by name, creating it when missing
pub async fn ensure_role(pool: &SqlitePool, name: &str, description: &str) -> Result<i64> {
    sqlx::query("INSERT OR IGNORE INTO roles (name, description) VALUES (?, ?)")
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

pub async fn set_role(pool: &SqlitePool, user_id: i64, role_id: i64) -> Result<()> {
    sqlx::query("UPDATE users SET role_id = ? WHERE id = ?")
        .bind(role_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use txdata_common::db::init_memory_database;

    async fn add_user(pool: &SqlitePool, name: &str, code: &str) -> i64 {
        insert_user(
            pool,
            &NewUser {
                username: name,
                email: &format!("{}@example.org", name),
                password_hash: "h",
                password_salt: "s",
                user_code: code,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_user_code_sequence_per_year() {
        let pool = init_memory_database().await.unwrap();
        assert_eq!(next_user_code(&pool, 2024).await.unwrap(), "DL-2024-0001");

        add_user(&pool, "ana", "DL-2024-0001").await;
        add_user(&pool, "ben", "DL-2024-0009").await;
        add_user(&pool, "cal", "DL-2023-0042").await;

        assert_eq!(next_user_code(&pool, 2024).await.unwrap(), "DL-2024-0010");
        assert_eq!(next_user_code(&pool, 2023).await.unwrap(), "DL-2023-0043");
    }

    #[tokio::test]
    async fn test_role_assignment() {
        let pool = init_memory_database().await.unwrap();
        let id = add_user(&pool, "ana", "DL-2024-0001").await;

        let role_id = ensure_role(&pool, ADMIN_ROLE, "Administrators").await.unwrap();
        assert_eq!(ensure_role(&pool, ADMIN_ROLE, "again").await.unwrap(), role_id);
        set_role(&pool, id, role_id).await.unwrap();

        let user = find_by_email(&pool, "ana@example.org").await.unwrap().unwrap();
        assert!(user.is_admin());
        assert_eq!(find_by_username(&pool, "ana").await.unwrap().unwrap().id, id);
    }
}
