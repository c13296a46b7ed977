//! Tutorial content: seeding, reading and editing
//!
//! The tree is `levels → sections → topics → subtopics`. Seeding is
//! idempotent: nodes are matched by title within their parent.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;
use txdata_common::config::{TomlConfig, TutorialLevelSeed};
use txdata_common::{Error, Result};

use crate::db::tutorials::{self, NewSubtopic, NodeKind, Subtopic, SubtopicUpdate, TutorialNode};
use crate::db::users::User;
use crate::error::{ApiError, ApiResult};

/// Normalize stored examples to a JSON object, merging `images` when given
///
/// A list becomes `{"list_content": [...]}`, an object is kept and any
/// other value becomes `{"content": value}`.
pub fn normalize_examples(examples: Option<&Value>, images: Option<&Value>) -> Value {
    let mut object = match examples {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Array(items)) => {
            let mut m = Map::new();
            m.insert("list_content".to_string(), Value::Array(items.clone()));
            m
        }
        Some(Value::Object(m)) => m.clone(),
        Some(other) => {
            let mut m = Map::new();
            m.insert("content".to_string(), other.clone());
            m
        }
    };
    if let Some(images) = images.filter(|v| !v.is_null()) {
        object.insert("images".to_string(), images.clone());
    }
    Value::Object(object)
}

/// Read tutorial levels from a JSON list or a TOML file with `[[levels]]`
pub fn load_levels_file(path: &Path) -> Result<Vec<TutorialLevelSeed>> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        serde_json::from_str(&content).map_err(|e| Error::Config(format!("Invalid tutorial JSON: {}", e)))
    } else {
        Ok(TomlConfig::from_toml_str(&content)?.levels)
    }
}

/// Insert missing tutorial content; returns how many subtopics were added
pub async fn seed_tutorials(pool: &SqlitePool, levels: &[TutorialLevelSeed]) -> ApiResult<usize> {
    let mut added = 0;
    for level in levels {
        let (level_id, _) =
            tutorials::find_or_create_node(pool, NodeKind::Level, None, &level.title, level.description.as_deref())
                .await?;
        for section in &level.sections {
            let (section_id, _) = tutorials::find_or_create_node(
                pool,
                NodeKind::Section,
                Some(level_id),
                &section.title,
                section.description.as_deref(),
            )
            .await?;
            for topic in &section.topics {
                let (topic_id, _) = tutorials::find_or_create_node(
                    pool,
                    NodeKind::Topic,
                    Some(section_id),
                    &topic.title,
                    topic.description.as_deref(),
                )
                .await?;
                for sub in &topic.subtopics {
                    let examples = normalize_examples(sub.examples.as_ref(), sub.images.as_ref());
                    let inserted = tutorials::insert_subtopic_if_absent(
                        pool,
                        &NewSubtopic {
                            topic_id,
                            title: &sub.title,
                            short_description: sub.description.as_deref(),
                            definition_text: sub.definition.as_deref(),
                            video_url: sub.video_link.as_deref(),
                            examples: &examples,
                        },
                    )
                    .await?;
                    if inserted {
                        added += 1;
                    }
                }
            }
        }
    }
    info!(levels = levels.len(), added, "Seeded tutorial content");
    Ok(added)
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicTree {
    #[serde(flatten)]
    pub topic: TutorialNode,
    pub subtopics: Vec<Subtopic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionTree {
    #[serde(flatten)]
    pub section: TutorialNode,
    pub topics: Vec<TopicTree>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelTree {
    #[serde(flatten)]
    pub level: TutorialNode,
    pub sections: Vec<SectionTree>,
}

/// The whole tutorial tree ordered by id at every depth
pub async fn hierarchy(pool: &SqlitePool) -> ApiResult<Vec<LevelTree>> {
    let mut levels = Vec::new();
    for level in tutorials::list_nodes(pool, NodeKind::Level, None).await? {
        let mut sections = Vec::new();
        for section in tutorials::list_nodes(pool, NodeKind::Section, Some(level.id)).await? {
            let mut topics = Vec::new();
            for topic in tutorials::list_nodes(pool, NodeKind::Topic, Some(section.id)).await? {
                let subtopics = tutorials::list_subtopics(pool, topic.id).await?;
                topics.push(TopicTree { topic, subtopics });
            }
            sections.push(SectionTree { section, topics });
        }
        levels.push(LevelTree { level, sections });
    }
    Ok(levels)
}

pub async fn subtopic(pool: &SqlitePool, id: i64) -> ApiResult<Subtopic> {
    Ok(tutorials::get_subtopic(pool, id).await?)
}

pub fn require_admin(user: &User) -> ApiResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Admin access required.".to_string()))
    }
}

async fn require_node(pool: &SqlitePool, kind: NodeKind, id: i64, what: &str) -> ApiResult<()> {
    if !tutorials::node_exists(pool, kind, id).await? {
        return Err(ApiError::NotFound(format!("Tutorial {} {} not found", what, id)));
    }
    Ok(())
}

pub async fn sections_of(pool: &SqlitePool, level_id: i64) -> ApiResult<Vec<TutorialNode>> {
    require_node(pool, NodeKind::Level, level_id, "level").await?;
    Ok(tutorials::list_nodes(pool, NodeKind::Section, Some(level_id)).await?)
}

pub async fn topics_of(pool: &SqlitePool, section_id: i64) -> ApiResult<Vec<TutorialNode>> {
    require_node(pool, NodeKind::Section, section_id, "section").await?;
    Ok(tutorials::list_nodes(pool, NodeKind::Topic, Some(section_id)).await?)
}

pub async fn subtopics_of(pool: &SqlitePool, topic_id: i64) -> ApiResult<Vec<Subtopic>> {
    require_node(pool, NodeKind::Topic, topic_id, "topic").await?;
    Ok(tutorials::list_subtopics(pool, topic_id).await?)
}

/// Editable subtopic fields
#[derive(Debug, Clone, Deserialize)]
pub struct SubtopicForm {
    pub title: String,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub definition_text: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    /// Replaces the stored examples when present (normalized like seeding)
    #[serde(default)]
    pub examples: Option<Value>,
}

pub async fn update_subtopic(pool: &SqlitePool, id: i64, form: &SubtopicForm) -> ApiResult<Subtopic> {
    let title = form.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Subtopic title cannot be empty.".to_string()));
    }
    let current = tutorials::get_subtopic(pool, id).await?;
    let examples = match &form.examples {
        Some(v) => normalize_examples(Some(v), None),
        None => current.examples,
    };
    tutorials::update_subtopic(
        pool,
        id,
        &SubtopicUpdate {
            title,
            short_description: blank_to_none(&form.short_description),
            definition_text: blank_to_none(&form.definition_text),
            video_url: blank_to_none(&form.video_url),
            examples: &examples,
        },
    )
    .await?;
    info!(subtopic_id = id, "Updated tutorial subtopic");
    Ok(tutorials::get_subtopic(pool, id).await?)
}

fn blank_to_none(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Subtopic as returned to readers, with an empty object for missing examples
pub fn reader_view(sub: &Subtopic) -> Value {
    json!({
        "id": sub.id,
        "topic_id": sub.topic_id,
        "title": sub.title,
        "short_description": sub.short_description,
        "definition_text": sub.definition_text,
        "video_url": sub.video_url,
        "examples": if sub.examples.is_null() { json!({}) } else { sub.examples.clone() },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use txdata_common::db::init_memory_database;

    const LEVELS: &str = r#"
[[levels]]
title = "Beginner"

[[levels.sections]]
title = "Descriptive statistics"

[[levels.sections.topics]]
title = "Central tendency"

[[levels.sections.topics.subtopics]]
title = "Mean"
definition = "The arithmetic average."
examples = ["(1 + 2 + 3) / 3 = 2"]
images = ["mean.png"]

[[levels.sections.topics.subtopics]]
title = "Median"
examples = "The middle value."
"#;

    #[test]
    fn test_normalize_examples_shapes() {
        assert_eq!(normalize_examples(None, None), json!({}));
        assert_eq!(
            normalize_examples(Some(&json!(["a", "b"])), None),
            json!({"list_content": ["a", "b"]})
        );
        assert_eq!(normalize_examples(Some(&json!({"x": 1})), None), json!({"x": 1}));
        assert_eq!(
            normalize_examples(Some(&json!(42)), Some(&json!(["p.png"]))),
            json!({"content": 42, "images": ["p.png"]})
        );
    }

    #[tokio::test]
    async fn test_seed_is_idempotent_and_builds_hierarchy() {
        let pool = init_memory_database().await.unwrap();
        let levels = TomlConfig::from_toml_str(LEVELS).unwrap().levels;

        assert_eq!(seed_tutorials(&pool, &levels).await.unwrap(), 2);
        assert_eq!(seed_tutorials(&pool, &levels).await.unwrap(), 0);

        let tree = hierarchy(&pool).await.unwrap();
        assert_eq!(tree.len(), 1);
        let topic = &tree[0].sections[0].topics[0];
        assert_eq!(topic.topic.title, "Central tendency");
        assert_eq!(topic.subtopics[0].examples, json!({"list_content": ["(1 + 2 + 3) / 3 = 2"], "images": ["mean.png"]}));
        assert_eq!(topic.subtopics[1].examples, json!({"content": "The middle value."}));
    }

    #[tokio::test]
    async fn test_update_subtopic_and_missing_nodes() {
        let pool = init_memory_database().await.unwrap();
        let levels = TomlConfig::from_toml_str(LEVELS).unwrap().levels;
        seed_tutorials(&pool, &levels).await.unwrap();
        let tree = hierarchy(&pool).await.unwrap();
        let mean_id = tree[0].sections[0].topics[0].subtopics[0].id;

        let form = SubtopicForm {
            title: "Arithmetic mean".to_string(),
            short_description: Some("  ".to_string()),
            definition_text: Some("Sum divided by count.".to_string()),
            video_url: None,
            examples: None,
        };
        let updated = update_subtopic(&pool, mean_id, &form).await.unwrap();
        assert_eq!(updated.title, "Arithmetic mean");
        assert_eq!(updated.short_description, None);
        assert_eq!(updated.examples["images"], json!(["mean.png"]));

        let err = sections_of(&pool, 999).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
        let err = subtopic(&pool, 999).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
