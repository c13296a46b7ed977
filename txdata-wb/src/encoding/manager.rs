//! Encoding configuration manager
//!
//! Owns the study-scoped side of encoding: seeding prototypes, creating and
//! assigning definitions, resolving assignments into an [`EncoderConfig`]
//! and writing value maps learned by the encoder back into definitions.

use serde_json::{Map, Value};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use txdata_common::config::PrototypeSeed;
use txdata_common::QuestionMap;

use super::{EncoderConfig, EncoderType, LearnedMaps};
use crate::db::encoders::{self, ColumnEncoding, Definition};
use crate::db::studies::{self, NewStudy, Study};
use crate::error::{ApiError, ApiResult};
use crate::workspace::Workspace;

/// Insert every seed whose name is not yet present; returns how many were added
pub async fn seed_prototypes(pool: &SqlitePool, seeds: &[PrototypeSeed]) -> ApiResult<usize> {
    let mut added = 0;
    for seed in seeds {
        if EncoderType::parse(&seed.encoder_type).is_none() {
            warn!(
                prototype = %seed.name,
                "Unknown encoder type '{}', seeding anyway",
                seed.encoder_type
            );
        }
        if encoders::insert_prototype_if_absent(pool, &seed.name, &seed.encoder_type, &seed.description).await? {
            added += 1;
        }
    }
    if added > 0 {
        info!("Seeded {} encoder prototype(s)", added);
    }
    Ok(added)
}

/// The study's stored question map
///
/// A missing or unparsable map yields an empty map and a warning.
pub async fn get_column_map(store: &Workspace, study: &Study) -> ApiResult<QuestionMap> {
    let text = store
        .get_file(study.user_id, &study.project_code, &study.map_filename)
        .await?;
    let Some(text) = text else {
        warn!(study_id = study.id, "Question map '{}' not found", study.map_filename);
        return Ok(QuestionMap::new());
    };

    match QuestionMap::from_json(&text) {
        Ok(map) => Ok(map),
        Err(e) => {
            warn!(study_id = study.id, "Question map '{}' is invalid: {}", study.map_filename, e);
            Ok(QuestionMap::new())
        }
    }
}

/// Study with the given name, created for the user when absent
pub async fn get_or_create_study(
    pool: &SqlitePool,
    user_id: i64,
    username: Option<&str>,
    name: &str,
    map_filename: &str,
    topic: Option<&str>,
    description: Option<&str>,
) -> ApiResult<Study> {
    if let Some(study) = studies::find_study_by_name(pool, name).await? {
        return Ok(study);
    }

    let date = chrono::Utc::now().format("%Y%m%d").to_string();
    let code = studies::next_project_code(pool, &date, studies::owner_initial(username)).await?;
    let study = studies::insert_study(
        pool,
        &NewStudy {
            name,
            topic,
            description,
            map_filename,
            project_code: &code,
            user_id,
        },
    )
    .await?;
    info!(study_id = study.id, project = %study.project_code, "Created study '{}'", name);
    Ok(study)
}

/// Column rows of a study in id order with their assigned definitions
pub async fn get_column_configs_for_study(pool: &SqlitePool, study_id: i64) -> ApiResult<Vec<ColumnEncoding>> {
    Ok(encoders::list_columns(pool, study_id).await?)
}

/// Add a column row for every map key not already present; returns how many were added
pub async fn initialize_columns_for_study(
    pool: &SqlitePool,
    study_id: i64,
    column_map: &QuestionMap,
) -> ApiResult<usize> {
    let mut added = 0;
    for (key, question) in column_map.iter() {
        if encoders::insert_column_if_absent(pool, study_id, key, question).await? {
            added += 1;
        }
    }
    if added > 0 {
        debug!(study_id, added, "Initialized study columns");
    }
    Ok(added)
}

fn require_object(configuration: &Value) -> ApiResult<()> {
    if configuration.is_object() {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "Configuration must be a JSON object.".to_string(),
        ))
    }
}

pub async fn create_encoder_definition(
    pool: &SqlitePool,
    study_id: i64,
    prototype_id: i64,
    name: &str,
    configuration: &Value,
) -> ApiResult<Definition> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Definition name is required.".to_string()));
    }
    require_object(configuration)?;

    if encoders::find_prototype(pool, prototype_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Encoder prototype {} not found.", prototype_id)));
    }
    if encoders::find_definition_by_name(pool, study_id, name).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "A definition named '{}' already exists for this study.",
            name
        )));
    }

    let definition = encoders::insert_definition(pool, study_id, prototype_id, name, configuration).await?;
    info!(study_id, definition_id = definition.id, "Created encoder definition '{}'", name);
    Ok(definition)
}

/// Definition by id, checked to belong to the study
pub async fn definition_for_study(pool: &SqlitePool, study_id: i64, definition_id: i64) -> ApiResult<Definition> {
    match encoders::find_definition(pool, definition_id).await? {
        Some(def) if def.study_id == study_id => Ok(def),
        Some(_) => Err(ApiError::Forbidden(format!(
            "Encoder definition {} does not belong to this study.",
            definition_id
        ))),
        None => Err(ApiError::NotFound(format!(
            "Encoder definition {} not found.",
            definition_id
        ))),
    }
}

/// Point columns of the study at a definition; returns how many rows changed
pub async fn assign_encoder_to_columns(
    pool: &SqlitePool,
    study_id: i64,
    column_ids: &[i64],
    definition_id: i64,
) -> ApiResult<u64> {
    definition_for_study(pool, study_id, definition_id).await?;
    let updated = encoders::set_column_definition(pool, study_id, column_ids, Some(definition_id)).await?;
    debug!(study_id, definition_id, updated, "Assigned definition to columns");
    Ok(updated)
}

pub async fn unassign_columns(pool: &SqlitePool, study_id: i64, column_ids: &[i64]) -> ApiResult<u64> {
    let updated = encoders::set_column_definition(pool, study_id, column_ids, None).await?;
    debug!(study_id, updated, "Unassigned columns");
    Ok(updated)
}

/// Assign a definition to every column from `start_key` through `end_key` (id order)
pub async fn assign_definition_to_range(
    pool: &SqlitePool,
    study_id: i64,
    start_key: &str,
    end_key: &str,
    definition_id: i64,
) -> ApiResult<u64> {
    definition_for_study(pool, study_id, definition_id).await?;

    let columns = encoders::list_columns(pool, study_id).await?;
    let start = columns.iter().position(|c| c.column_key == start_key);
    let end = columns.iter().position(|c| c.column_key == end_key);
    let (Some(start), Some(end)) = (start, end) else {
        return Err(ApiError::BadRequest(
            "Start or end key not found for bulk update.".to_string(),
        ));
    };
    if start > end {
        return Err(ApiError::BadRequest(
            "Start column must come before end column.".to_string(),
        ));
    }

    let ids: Vec<i64> = columns[start..=end].iter().map(|c| c.id).collect();
    let updated = encoders::set_column_definition(pool, study_id, &ids, Some(definition_id)).await?;
    info!(study_id, definition_id, updated, "Assigned definition to {}..{}", start_key, end_key);
    Ok(updated)
}

pub async fn update_encoder_definition(
    pool: &SqlitePool,
    study_id: i64,
    definition_id: i64,
    new_name: &str,
    new_configuration: &Value,
) -> ApiResult<Definition> {
    let current = definition_for_study(pool, study_id, definition_id).await?;
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Err(ApiError::BadRequest("Definition name is required.".to_string()));
    }
    require_object(new_configuration)?;

    if new_name != current.name {
        if let Some(other) = encoders::find_definition_by_name(pool, study_id, new_name).await? {
            if other.id != definition_id {
                return Err(ApiError::Conflict(format!(
                    "A definition named '{}' already exists for this study.",
                    new_name
                )));
            }
        }
    }

    encoders::update_definition(pool, definition_id, new_name, new_configuration).await?;
    info!(study_id, definition_id, "Updated encoder definition '{}'", new_name);
    Ok(encoders::get_definition(pool, definition_id).await?)
}

/// Find or create a definition by name, then assign it to the columns
pub async fn apply_definition_to_columns(
    pool: &SqlitePool,
    study_id: i64,
    column_ids: &[i64],
    definition_name: &str,
    definition_config: &Value,
    prototype_name: &str,
) -> ApiResult<u64> {
    let definition = match encoders::find_definition_by_name(pool, study_id, definition_name).await? {
        Some(def) => def,
        None => {
            let prototype = encoders::find_prototype_by_name(pool, prototype_name)
                .await?
                .ok_or_else(|| {
                    ApiError::NotFound(format!("Encoder prototype '{}' not found.", prototype_name))
                })?;
            create_encoder_definition(pool, study_id, prototype.id, definition_name, definition_config).await?
        }
    };

    let updated = encoders::set_column_definition(pool, study_id, column_ids, Some(definition.id)).await?;
    Ok(updated)
}

/// Resolve the study's assignments into an encoder configuration
///
/// Columns are visited in id order; assignments with an unknown encoder
/// type are skipped with a warning.
pub async fn generate_encoder_config(
    pool: &SqlitePool,
    store: &Workspace,
    study: &Study,
) -> ApiResult<EncoderConfig> {
    let column_map = get_column_map(store, study).await?;
    let mut config = EncoderConfig::new(column_map);

    for column in encoders::list_columns(pool, study.id).await? {
        let (Some(type_name), Some(configuration)) = (&column.encoder_type, &column.configuration) else {
            continue;
        };
        let Some(encoder_type) = EncoderType::parse(type_name) else {
            warn!(
                study_id = study.id,
                column = %column.column_key,
                "Unknown encoder type '{}'. Skipping column.",
                type_name
            );
            continue;
        };
        config.insert(encoder_type, &column.column_key, configuration.clone());
    }

    if tracing::enabled!(tracing::Level::DEBUG) {
        match serde_json::to_string_pretty(&config) {
            Ok(json) => debug!(study_id = study.id, "Generated encoder config:\n{}", json),
            Err(e) => debug!(study_id = study.id, "Generated encoder config (unprintable: {})", e),
        }
    }
    Ok(config)
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Value map as order-insensitive string pairs
fn comparable(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.iter().map(|(k, v)| (k.clone(), label_text(v))).collect()
}

/// Persist value maps learned by factorizing Nominal columns
///
/// A definition that already carries a different non-empty `value_map` is
/// a conflict; nothing is written in that case. Returns the number of
/// definitions updated.
pub async fn update_definition_configurations(
    pool: &SqlitePool,
    study_id: i64,
    learned_maps: &LearnedMaps,
) -> ApiResult<usize> {
    if learned_maps.is_empty() {
        return Ok(0);
    }

    let columns = encoders::list_columns(pool, study_id).await?;
    // Working copies so two columns sharing a definition see each other's maps.
    let mut pending: BTreeMap<i64, (String, Value)> = BTreeMap::new();

    for (column_key, learned) in learned_maps.iter() {
        let Some(column) = columns.iter().find(|c| c.column_key == column_key) else {
            warn!(study_id, column = column_key, "Learned map for unknown column. Skipping.");
            continue;
        };
        let Some(definition_id) = column.encoder_definition_id else {
            continue;
        };

        if !pending.contains_key(&definition_id) {
            let def = encoders::get_definition(pool, definition_id).await?;
            pending.insert(definition_id, (def.name, def.configuration));
        }
        let Some((def_name, configuration)) = pending.get_mut(&definition_id) else {
            continue;
        };

        let learned_object: Map<String, Value> = learned
            .iter()
            .map(|(code, label)| (code.to_string(), Value::String(label.clone())))
            .collect();

        let existing = configuration
            .get("value_map")
            .and_then(Value::as_object)
            .filter(|m| !m.is_empty());
        if let Some(existing) = existing {
            if comparable(existing) != comparable(&learned_object) {
                return Err(ApiError::Conflict(format!(
                    "Incompatible Value Maps for definition '{}' (used by column {}). \
                     The data produced categories that differ from the stored value map.",
                    def_name, column_key
                )));
            }
            continue;
        }

        if !configuration.is_object() {
            *configuration = Value::Object(Map::new());
        }
        if let Some(obj) = configuration.as_object_mut() {
            obj.insert("value_map".to_string(), Value::Object(learned_object));
        }
    }

    let mut tx = pool.begin().await?;
    let mut updated = 0;
    for (definition_id, (_, configuration)) in &pending {
        encoders::set_definition_configuration(&mut tx, *definition_id, configuration).await?;
        updated += 1;
    }
    tx.commit().await?;

    if updated > 0 {
        info!(study_id, updated, "Stored learned value maps");
    }
    Ok(updated)
}

/// Delete a definition that no column uses
pub async fn delete_encoder_definition(pool: &SqlitePool, study_id: i64, definition_id: i64) -> ApiResult<()> {
    let definition = definition_for_study(pool, study_id, definition_id).await?;
    let assigned = encoders::count_assigned_columns(pool, definition_id).await?;
    if assigned > 0 {
        return Err(ApiError::Conflict(format!(
            "Cannot delete definition '{}' because it is currently assigned to {} column(s). \
             Please unassign it first.",
            definition.name, assigned
        )));
    }
    encoders::delete_definition(pool, definition_id).await?;
    info!(study_id, definition_id, "Deleted encoder definition '{}'", definition.name);
    Ok(())
}

/// Copy every definition of one study into another; existing names are kept
pub async fn clone_definitions(pool: &SqlitePool, from_study_id: i64, to_study_id: i64) -> ApiResult<usize> {
    let mut cloned = 0;
    for def in encoders::list_definitions(pool, from_study_id).await? {
        if encoders::find_definition_by_name(pool, to_study_id, &def.name).await?.is_some() {
            continue;
        }
        encoders::insert_definition(pool, to_study_id, def.prototype_id, &def.name, &def.configuration).await?;
        cloned += 1;
    }
    info!(from_study_id, to_study_id, cloned, "Cloned encoder definitions");
    Ok(cloned)
}
