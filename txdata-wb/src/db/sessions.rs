//! Login session persistence

use sqlx::SqlitePool;
use txdata_common::Result;

use super::users::{User, USER_SELECT};

pub async fn create_session(
    pool: &SqlitePool,
    token: &str,
    user_id: i64,
    created_at: &str,
    expires_at: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(token)
        .bind(user_id)
        .bind(created_at)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// User owning an unexpired session token
pub async fn find_session_user(pool: &SqlitePool, token: &str, now: &str) -> Result<Option<User>> {
    let sql = format!(
        "{} JOIN sessions s ON s.user_id = u.id WHERE s.token = ? AND s.expires_at > ?",
        USER_SELECT
    );
    let row = sqlx::query(&sql)
        .bind(token)
        .bind(now)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(User::from_row))
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove expired sessions; returns how many were deleted
pub async fn delete_expired(pool: &SqlitePool, now: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users::{insert_user, NewUser};
    use txdata_common::db::init_memory_database;

    #[tokio::test]
    async fn test_expired_session_not_found() {
        let pool = init_memory_database().await.unwrap();
        let user_id = insert_user(
            &pool,
            &NewUser {
                username: "ana",
                email: "ana@example.org",
                password_hash: "h",
                password_salt: "s",
                user_code: "DL-2024-0001",
            },
        )
        .await
        .unwrap();

        create_session(&pool, "live", user_id, "2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z")
            .await
            .unwrap();
        create_session(&pool, "old", user_id, "2023-01-01T00:00:00Z", "2023-01-02T00:00:00Z")
            .await
            .unwrap();

        let now = "2024-01-01T12:00:00Z";
        assert_eq!(find_session_user(&pool, "live", now).await.unwrap().unwrap().id, user_id);
        assert!(find_session_user(&pool, "old", now).await.unwrap().is_none());

        assert_eq!(delete_expired(&pool, now).await.unwrap(), 1);
        delete_session(&pool, "live").await.unwrap();
        assert!(find_session_user(&pool, "live", now).await.unwrap().is_none());
    }
}
