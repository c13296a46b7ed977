//! Encoder prototypes, study definitions and column assignments

use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use txdata_common::{Error, Result};

/// A seeded encoder kind
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Prototype {
    pub id: i64,
    pub name: String,
    pub encoder_type: String,
    pub description: String,
}

/// Study-scoped named configuration built on a prototype
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Definition {
    pub id: i64,
    pub study_id: i64,
    pub prototype_id: i64,
    pub prototype_name: String,
    pub encoder_type: String,
    pub name: String,
    pub configuration: Value,
}

/// One column of a study and its (optional) assigned definition
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnEncoding {
    pub id: i64,
    pub study_id: i64,
    pub encoder_definition_id: Option<i64>,
    pub column_key: String,
    pub original_name: String,
    pub definition_name: Option<String>,
    pub encoder_type: Option<String>,
    pub configuration: Option<Value>,
}

const DEFINITION_SELECT: &str = r#"
    SELECT d.id, d.study_id, d.prototype_id, d.name, d.configuration,
           p.name AS prototype_name, p.encoder_type
    FROM encoder_definitions d
    JOIN encoder_prototypes p ON p.id = d.prototype_id
"#;

const COLUMN_SELECT: &str = r#"
    SELECT c.id, c.study_id, c.encoder_definition_id, c.column_key, c.original_name,
           d.name AS definition_name, d.configuration, p.encoder_type
    FROM column_encodings c
    LEFT JOIN encoder_definitions d ON d.id = c.encoder_definition_id
    LEFT JOIN encoder_prototypes p ON p.id = d.prototype_id
"#;

fn parse_configuration(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(Default::default()))
}

fn prototype_from_row(row: &SqliteRow) -> Prototype {
    Prototype {
        id: row.get("id"),
        name: row.get("name"),
        encoder_type: row.get("encoder_type"),
        description: row.get("description"),
    }
}

fn definition_from_row(row: &SqliteRow) -> Definition {
    let raw: String = row.get("configuration");
    Definition {
        id: row.get("id"),
        study_id: row.get("study_id"),
        prototype_id: row.get("prototype_id"),
        prototype_name: row.get("prototype_name"),
        encoder_type: row.get("encoder_type"),
        name: row.get("name"),
        configuration: parse_configuration(&raw),
    }
}

fn column_from_row(row: &SqliteRow) -> ColumnEncoding {
    let raw: Option<String> = row.get("configuration");
    ColumnEncoding {
        id: row.get("id"),
        study_id: row.get("study_id"),
        encoder_definition_id: row.get("encoder_definition_id"),
        column_key: row.get("column_key"),
        original_name: row.get("original_name"),
        definition_name: row.get("definition_name"),
        encoder_type: row.get("encoder_type"),
        configuration: raw.as_deref().map(parse_configuration),
    }
}

// -----------------------------------------------------------------------------
// Prototypes
// -----------------------------------------------------------------------------

/// Insert a prototype unless one with the same name exists; true when inserted
pub async fn insert_prototype_if_absent(
    pool: &SqlitePool,
    name: &str,
    encoder_type: &str,
    description: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO encoder_prototypes (name, encoder_type, description) VALUES (?, ?, ?)",
    )
    .bind(name)
    .bind(encoder_type)
    .bind(description)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_prototypes(pool: &SqlitePool) -> Result<Vec<Prototype>> {
    let rows = sqlx::query("SELECT * FROM encoder_prototypes ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(prototype_from_row).collect())
}

pub async fn find_prototype(pool: &SqlitePool, id: i64) -> Result<Option<Prototype>> {
    let row = sqlx::query("SELECT * FROM encoder_prototypes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(prototype_from_row))
}

pub async fn find_prototype_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Prototype>> {
    let row = sqlx::query("SELECT * FROM encoder_prototypes WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(prototype_from_row))
}

// -----------------------------------------------------------------------------
// Definitions
// -----------------------------------------------------------------------------

pub async fn insert_definition(
    pool: &SqlitePool,
    study_id: i64,
    prototype_id: i64,
    name: &str,
    configuration: &Value,
) -> Result<Definition> {
    let result = sqlx::query(
        "INSERT INTO encoder_definitions (study_id, prototype_id, name, configuration) VALUES (?, ?, ?, ?)",
    )
    .bind(study_id)
    .bind(prototype_id)
    .bind(name)
    .bind(serde_json::to_string(configuration)?)
    .execute(pool)
    .await?;

    get_definition(pool, result.last_insert_rowid()).await
}

pub async fn get_definition(pool: &SqlitePool, id: i64) -> Result<Definition> {
    find_definition(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Encoder definition {} not found", id)))
}

pub async fn find_definition(pool: &SqlitePool, id: i64) -> Result<Option<Definition>> {
    let row = sqlx::query(&format!("{} WHERE d.id = ?", DEFINITION_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(definition_from_row))
}

pub async fn find_definition_by_name(
    pool: &SqlitePool,
    study_id: i64,
    name: &str,
) -> Result<Option<Definition>> {
    let row = sqlx::query(&format!("{} WHERE d.study_id = ? AND d.name = ?", DEFINITION_SELECT))
        .bind(study_id)
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(definition_from_row))
}

/// Definitions of a study ordered by name
pub async fn list_definitions(pool: &SqlitePool, study_id: i64) -> Result<Vec<Definition>> {
    let rows = sqlx::query(&format!("{} WHERE d.study_id = ? ORDER BY d.name", DEFINITION_SELECT))
        .bind(study_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(definition_from_row).collect())
}

pub async fn update_definition(
    pool: &SqlitePool,
    id: i64,
    name: &str,
    configuration: &Value,
) -> Result<()> {
    sqlx::query("UPDATE encoder_definitions SET name = ?, configuration = ? WHERE id = ?")
        .bind(name)
        .bind(serde_json::to_string(configuration)?)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Replace a definition's configuration inside an open transaction
pub async fn set_definition_configuration(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
    configuration: &Value,
) -> Result<()> {
    sqlx::query("UPDATE encoder_definitions SET configuration = ? WHERE id = ?")
        .bind(serde_json::to_string(configuration)?)
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn delete_definition(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM encoder_definitions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Number of columns currently assigned to a definition
pub async fn count_assigned_columns(pool: &SqlitePool, definition_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM column_encodings WHERE encoder_definition_id = ?",
    )
    .bind(definition_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

// -----------------------------------------------------------------------------
// Column encodings
// -----------------------------------------------------------------------------

/// Columns of a study ordered by id (insertion order)
pub async fn list_columns(pool: &SqlitePool, study_id: i64) -> Result<Vec<ColumnEncoding>> {
    let rows = sqlx::query(&format!("{} WHERE c.study_id = ? ORDER BY c.id", COLUMN_SELECT))
        .bind(study_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(column_from_row).collect())
}

/// Insert a column row unless the key exists; true when inserted
pub async fn insert_column_if_absent(
    pool: &SqlitePool,
    study_id: i64,
    column_key: &str,
    original_name: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO column_encodings (study_id, column_key, original_name) VALUES (?, ?, ?)",
    )
    .bind(study_id)
    .bind(column_key)
    .bind(original_name)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Point the given columns of a study at a definition (or `None` to unassign)
///
/// Ids that belong to another study are ignored.
pub async fn set_column_definition(
    pool: &SqlitePool,
    study_id: i64,
    column_ids: &[i64],
    definition_id: Option<i64>,
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut updated = 0;
    for column_id in column_ids {
        let result = sqlx::query(
            "UPDATE column_encodings SET encoder_definition_id = ? WHERE id = ? AND study_id = ?",
        )
        .bind(definition_id)
        .bind(column_id)
        .bind(study_id)
        .execute(&mut *tx)
        .await?;
        updated += result.rows_affected();
    }
    tx.commit().await?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::studies::tests::{seed_study, seed_user};
    use serde_json::json;
    use txdata_common::db::init_memory_database;

    #[tokio::test]
    async fn test_prototype_insert_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        assert!(insert_prototype_if_absent(&pool, "Likert 5", "Likert", "").await.unwrap());
        assert!(!insert_prototype_if_absent(&pool, "Likert 5", "Likert", "").await.unwrap());
        assert_eq!(list_prototypes(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_definition_and_assignment_round_trip() {
        let pool = init_memory_database().await.unwrap();
        let user = seed_user(&pool, "ana").await;
        let study = seed_study(&pool, user, "alpha").await;
        let other = seed_study(&pool, user, "beta").await;
        insert_prototype_if_absent(&pool, "Likert 5", "Likert", "").await.unwrap();
        let proto = find_prototype_by_name(&pool, "Likert 5").await.unwrap().unwrap();

        let def = insert_definition(&pool, study.id, proto.id, "Agree", &json!({"map": {"Agree": 4}}))
            .await
            .unwrap();
        assert_eq!(def.encoder_type, "Likert");
        assert_eq!(def.configuration["map"]["Agree"], 4);

        insert_column_if_absent(&pool, study.id, "q1", "Q one").await.unwrap();
        assert!(!insert_column_if_absent(&pool, study.id, "q1", "Q one").await.unwrap());
        insert_column_if_absent(&pool, other.id, "q1", "Q one").await.unwrap();

        let cols = list_columns(&pool, study.id).await.unwrap();
        let foreign = list_columns(&pool, other.id).await.unwrap();
        let ids = vec![cols[0].id, foreign[0].id];
        let updated = set_column_definition(&pool, study.id, &ids, Some(def.id)).await.unwrap();
        assert_eq!(updated, 1);

        let cols = list_columns(&pool, study.id).await.unwrap();
        assert_eq!(cols[0].definition_name.as_deref(), Some("Agree"));
        assert_eq!(cols[0].encoder_type.as_deref(), Some("Likert"));
        assert_eq!(count_assigned_columns(&pool, def.id).await.unwrap(), 1);
    }
}
