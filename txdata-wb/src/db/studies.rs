//! Study (project) database operations

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use txdata_common::{Error, Result};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Study {
    pub id: i64,
    pub name: String,
    pub topic: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
    pub map_filename: String,
    pub project_code: String,
    pub user_id: i64,
}

impl Study {
    /// Base file name shared by every file of the study (`map_filename` without `.json`)
    pub fn base_name(&self) -> &str {
        self.map_filename
            .strip_suffix(".json")
            .unwrap_or(&self.map_filename)
    }

    /// Uploaded source data
    pub fn source_filename(&self) -> String {
        format!("{}.csv", self.base_name())
    }

    /// Bootstrap output
    pub fn simulated_filename(&self) -> String {
        format!("simulated_{}.csv", self.base_name())
    }

    pub fn encoded_filename(&self) -> String {
        format!("{}_encoded.csv", self.base_name())
    }

    pub fn codebook_filename(&self) -> String {
        format!("{}_codebook.json", self.base_name())
    }

    /// Working copy of the encoded data modified during analysis
    pub fn analysis_filename(&self) -> String {
        format!("{}_analysis.csv", self.base_name())
    }

    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            topic: row.get("topic"),
            description: row.get("description"),
            created_at: row.get("created_at"),
            map_filename: row.get("map_filename"),
            project_code: row.get("project_code"),
            user_id: row.get("user_id"),
        }
    }
}

pub struct NewStudy<'a> {
    pub name: &'a str,
    pub topic: Option<&'a str>,
    pub description: Option<&'a str>,
    pub map_filename: &'a str,
    pub project_code: &'a str,
    pub user_id: i64,
}

pub async fn insert_study(pool: &SqlitePool, study: &NewStudy<'_>) -> Result<Study> {
    let result = sqlx::query(
        r#"
        INSERT INTO studies (name, topic, description, created_at, map_filename, project_code, user_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(study.name)
    .bind(study.topic)
    .bind(study.description)
    .bind(super::now_timestamp())
    .bind(study.map_filename)
    .bind(study.project_code)
    .bind(study.user_id)
    .execute(pool)
    .await?;

    get_study(pool, result.last_insert_rowid()).await
}

/// Study by id or `NotFound`
pub async fn get_study(pool: &SqlitePool, id: i64) -> Result<Study> {
    find_study(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Study {} not found", id)))
}

pub async fn find_study(pool: &SqlitePool, id: i64) -> Result<Option<Study>> {
    let row = sqlx::query("SELECT * FROM studies WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(Study::from_row))
}

pub async fn find_study_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Study>> {
    let row = sqlx::query("SELECT * FROM studies WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(Study::from_row))
}

pub async fn find_study_by_map_filename(pool: &SqlitePool, map_filename: &str) -> Result<Option<Study>> {
    let row = sqlx::query("SELECT * FROM studies WHERE map_filename = ?")
        .bind(map_filename)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(Study::from_row))
}

/// Studies owned by a user, newest first
pub async fn list_studies_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Study>> {
    let rows = sqlx::query("SELECT * FROM studies WHERE user_id = ? ORDER BY created_at DESC, id DESC")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(Study::from_row).collect())
}

pub async fn list_all_studies(pool: &SqlitePool) -> Result<Vec<Study>> {
    let rows = sqlx::query("SELECT * FROM studies ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(Study::from_row).collect())
}

pub async fn update_study(
    pool: &SqlitePool,
    id: i64,
    name: &str,
    topic: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE studies SET name = ?, topic = ?, description = ? WHERE id = ?")
        .bind(name)
        .bind(topic)
        .bind(description)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a study; definitions and column rows cascade
pub async fn delete_study(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM studies WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_all_studies(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM studies").execute(pool).await?;
    Ok(result.rows_affected())
}

/// Next project code for a day and owner initial: `20240315-A-003`
///
/// The sequence continues the highest existing code with the same prefix;
/// an unparsable suffix restarts at 1.
pub async fn next_project_code(pool: &SqlitePool, date: &str, initial: char) -> Result<String> {
    let prefix = format!("{}-{}-", date, initial);
    let codes: Vec<String> =
        sqlx::query_scalar("SELECT project_code FROM studies WHERE project_code LIKE ?")
            .bind(format!("{}%", prefix))
            .fetch_all(pool)
            .await?;

    let seq = codes
        .iter()
        .filter_map(|code| code.strip_prefix(&prefix))
        .filter_map(|s| s.parse::<u32>().ok())
        .max()
        .map(|n| n + 1)
        .unwrap_or(1);

    Ok(format!("{}{:03}", prefix, seq))
}

/// Upper-cased first letter of a username, `X` when there is none
pub fn owner_initial(username: Option<&str>) -> char {
    username
        .and_then(|u| u.chars().next())
        .filter(|c| c.is_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('X')
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::users::{insert_user, NewUser};
    use txdata_common::db::init_memory_database;

    pub(crate) async fn seed_user(pool: &SqlitePool, name: &str) -> i64 {
        insert_user(
            pool,
            &NewUser {
                username: name,
                email: &format!("{}@example.org", name),
                password_hash: "h",
                password_salt: "s",
                user_code: &format!("DL-2024-{}", name),
            },
        )
        .await
        .unwrap()
    }

    pub(crate) async fn seed_study(pool: &SqlitePool, user_id: i64, name: &str) -> Study {
        let code = next_project_code(pool, "20240315", 'A').await.unwrap();
        insert_study(
            pool,
            &NewStudy {
                name,
                topic: None,
                description: None,
                map_filename: &format!("{}.json", name),
                project_code: &code,
                user_id,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_project_codes_increment() {
        let pool = init_memory_database().await.unwrap();
        let user = seed_user(&pool, "ana").await;

        let first = seed_study(&pool, user, "alpha").await;
        let second = seed_study(&pool, user, "beta").await;
        assert_eq!(first.project_code, "20240315-A-001");
        assert_eq!(second.project_code, "20240315-A-002");
        assert_eq!(
            next_project_code(&pool, "20240316", 'A').await.unwrap(),
            "20240316-A-001"
        );
    }

    #[tokio::test]
    async fn test_list_newest_first_and_file_names() {
        let pool = init_memory_database().await.unwrap();
        let user = seed_user(&pool, "ana").await;
        seed_study(&pool, user, "alpha").await;
        let beta = seed_study(&pool, user, "beta").await;

        let studies = list_studies_for_user(&pool, user).await.unwrap();
        assert_eq!(studies[0].id, beta.id);
        assert_eq!(beta.simulated_filename(), "simulated_beta.csv");
        assert_eq!(beta.encoded_filename(), "beta_encoded.csv");
        assert_eq!(beta.codebook_filename(), "beta_codebook.json");
    }

    #[test]
    fn test_owner_initial() {
        assert_eq!(owner_initial(Some("maria")), 'M');
        assert_eq!(owner_initial(None), 'X');
        assert_eq!(owner_initial(Some("")), 'X');
    }
}
