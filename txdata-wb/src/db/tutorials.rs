//! Tutorial content tree: levels → sections → topics → subtopics

use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use txdata_common::{Error, Result};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TutorialNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Subtopic {
    pub id: i64,
    pub topic_id: i64,
    pub title: String,
    pub short_description: Option<String>,
    pub definition_text: Option<String>,
    pub video_url: Option<String>,
    pub examples: Value,
}

/// Tree level; each maps to one table and its parent column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Level,
    Section,
    Topic,
}

impl NodeKind {
    fn table(self) -> &'static str {
        match self {
            NodeKind::Level => "tutorial_levels",
            NodeKind::Section => "tutorial_sections",
            NodeKind::Topic => "tutorial_topics",
        }
    }

    fn parent_column(self) -> Option<&'static str> {
        match self {
            NodeKind::Level => None,
            NodeKind::Section => Some("level_id"),
            NodeKind::Topic => Some("section_id"),
        }
    }
}

fn node_from_row(row: &SqliteRow, kind: NodeKind) -> TutorialNode {
    TutorialNode {
        id: row.get("id"),
        parent_id: kind.parent_column().map(|c| row.get(c)),
        title: row.get("title"),
        description: row.get("description"),
    }
}

fn subtopic_from_row(row: &SqliteRow) -> Subtopic {
    let raw: String = row.get("examples");
    Subtopic {
        id: row.get("id"),
        topic_id: row.get("topic_id"),
        title: row.get("title"),
        short_description: row.get("short_description"),
        definition_text: row.get("definition_text"),
        video_url: row.get("video_url"),
        examples: serde_json::from_str(&raw).unwrap_or(Value::Null),
    }
}

/// Find a node by title under a parent, creating it when missing
///
/// Returns the id and whether the node was created.
pub async fn find_or_create_node(
    pool: &SqlitePool,
    kind: NodeKind,
    parent_id: Option<i64>,
    title: &str,
    description: Option<&str>,
) -> Result<(i64, bool)> {
    let table = kind.table();
    let existing: Option<i64> = match kind.parent_column() {
        Some(parent_col) => {
            sqlx::query_scalar(&format!(
                "SELECT id FROM {} WHERE title = ? AND {} = ?",
                table, parent_col
            ))
            .bind(title)
            .bind(parent_id)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query_scalar(&format!("SELECT id FROM {} WHERE title = ?", table))
                .bind(title)
                .fetch_optional(pool)
                .await?
        }
    };

    if let Some(id) = existing {
        return Ok((id, false));
    }

    let result = match kind.parent_column() {
        Some(parent_col) => {
            sqlx::query(&format!(
                "INSERT INTO {} ({}, title, description) VALUES (?, ?, ?)",
                table, parent_col
            ))
            .bind(parent_id)
            .bind(title)
            .bind(description)
            .execute(pool)
            .await?
        }
        None => {
            sqlx::query(&format!("INSERT INTO {} (title, description) VALUES (?, ?)", table))
                .bind(title)
                .bind(description)
                .execute(pool)
                .await?
        }
    };

    Ok((result.last_insert_rowid(), true))
}

pub struct NewSubtopic<'a> {
    pub topic_id: i64,
    pub title: &'a str,
    pub short_description: Option<&'a str>,
    pub definition_text: Option<&'a str>,
    pub video_url: Option<&'a str>,
    pub examples: &'a Value,
}

/// Insert a subtopic unless its title already exists under the topic; true when inserted
pub async fn insert_subtopic_if_absent(pool: &SqlitePool, sub: &NewSubtopic<'_>) -> Result<bool> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM tutorial_subtopics WHERE title = ? AND topic_id = ?")
            .bind(sub.title)
            .bind(sub.topic_id)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO tutorial_subtopics
            (topic_id, title, short_description, definition_text, video_url, examples)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(sub.topic_id)
    .bind(sub.title)
    .bind(sub.short_description)
    .bind(sub.definition_text)
    .bind(sub.video_url)
    .bind(serde_json::to_string(sub.examples)?)
    .execute(pool)
    .await?;

    Ok(true)
}

/// Children of a node (all levels when `kind` is `Level`), ordered by id
pub async fn list_nodes(pool: &SqlitePool, kind: NodeKind, parent_id: Option<i64>) -> Result<Vec<TutorialNode>> {
    let rows = match kind.parent_column() {
        Some(parent_col) => {
            sqlx::query(&format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY id",
                kind.table(),
                parent_col
            ))
            .bind(parent_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!("SELECT * FROM {} ORDER BY id", kind.table()))
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows.iter().map(|r| node_from_row(r, kind)).collect())
}

pub async fn node_exists(pool: &SqlitePool, kind: NodeKind, id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(&format!("SELECT id FROM {} WHERE id = ?", kind.table()))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

pub async fn list_subtopics(pool: &SqlitePool, topic_id: i64) -> Result<Vec<Subtopic>> {
    let rows = sqlx::query("SELECT * FROM tutorial_subtopics WHERE topic_id = ? ORDER BY id")
        .bind(topic_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(subtopic_from_row).collect())
}

pub async fn get_subtopic(pool: &SqlitePool, id: i64) -> Result<Subtopic> {
    let row = sqlx::query("SELECT * FROM tutorial_subtopics WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref()
        .map(subtopic_from_row)
        .ok_or_else(|| Error::NotFound(format!("Tutorial subtopic {} not found", id)))
}

pub struct SubtopicUpdate<'a> {
    pub title: &'a str,
    pub short_description: Option<&'a str>,
    pub definition_text: Option<&'a str>,
    pub video_url: Option<&'a str>,
    pub examples: &'a Value,
}

pub async fn update_subtopic(pool: &SqlitePool, id: i64, update: &SubtopicUpdate<'_>) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE tutorial_subtopics
        SET title = ?, short_description = ?, definition_text = ?, video_url = ?, examples = ?
        WHERE id = ?
        "#,
    )
    .bind(update.title)
    .bind(update.short_description)
    .bind(update.definition_text)
    .bind(update.video_url)
    .bind(serde_json::to_string(update.examples)?)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Tutorial subtopic {} not found", id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use txdata_common::db::init_memory_database;

    #[tokio::test]
    async fn test_nodes_are_found_not_duplicated() {
        let pool = init_memory_database().await.unwrap();
        let (level, created) = find_or_create_node(&pool, NodeKind::Level, None, "Beginner", None)
            .await
            .unwrap();
        assert!(created);
        let (again, created) = find_or_create_node(&pool, NodeKind::Level, None, "Beginner", None)
            .await
            .unwrap();
        assert_eq!(level, again);
        assert!(!created);

        let (section, _) = find_or_create_node(&pool, NodeKind::Section, Some(level), "Stats", None)
            .await
            .unwrap();
        let sections = list_nodes(&pool, NodeKind::Section, Some(level)).await.unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].id, section);
        assert_eq!(sections[0].parent_id, Some(level));
    }

    #[tokio::test]
    async fn test_subtopic_insert_and_update() {
        let pool = init_memory_database().await.unwrap();
        let (level, _) = find_or_create_node(&pool, NodeKind::Level, None, "L", None).await.unwrap();
        let (section, _) = find_or_create_node(&pool, NodeKind::Section, Some(level), "S", None).await.unwrap();
        let (topic, _) = find_or_create_node(&pool, NodeKind::Topic, Some(section), "T", None).await.unwrap();

        let examples = json!({"content": "x"});
        let new = NewSubtopic {
            topic_id: topic,
            title: "Mean",
            short_description: None,
            definition_text: Some("Average"),
            video_url: None,
            examples: &examples,
        };
        assert!(insert_subtopic_if_absent(&pool, &new).await.unwrap());
        assert!(!insert_subtopic_if_absent(&pool, &new).await.unwrap());

        let sub = &list_subtopics(&pool, topic).await.unwrap()[0];
        assert_eq!(sub.examples["content"], "x");

        let new_examples = json!({"list_content": ["a"]});
        update_subtopic(
            &pool,
            sub.id,
            &SubtopicUpdate {
                title: "Arithmetic mean",
                short_description: Some("avg"),
                definition_text: None,
                video_url: Some("https://video.example/mean"),
                examples: &new_examples,
            },
        )
        .await
        .unwrap();

        let updated = get_subtopic(&pool, sub.id).await.unwrap();
        assert_eq!(updated.title, "Arithmetic mean");
        assert!(get_subtopic(&pool, 9999).await.is_err());
    }
}
