//! Encoding workflow endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::CurrentUser;
use crate::db::encoders::Definition;
use crate::encoding::manager;
use crate::encoding::workflow::{self, AssignPage, DefinitionsPage, EncodingResults, EncodingRun, EncodingSource};
use crate::error::ApiResult;
use crate::studies;
use crate::AppState;

/// GET /encoding/:id/definitions
pub async fn definitions_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<DefinitionsPage>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    Ok(Json(workflow::definitions_page(&state.db, &state.store, study).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateDefinition {
    pub prototype_id: i64,
    pub name: String,
    #[serde(default = "empty_object")]
    pub configuration: Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDefinition {
    pub name: String,
    #[serde(default = "empty_object")]
    pub configuration: Value,
}

fn empty_object() -> Value {
    json!({})
}

/// POST /encoding/:id/definitions
pub async fn create_definition(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
    Json(req): Json<CreateDefinition>,
) -> ApiResult<(StatusCode, Json<Definition>)> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let definition =
        manager::create_encoder_definition(&state.db, study.id, req.prototype_id, &req.name, &req.configuration)
            .await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

/// PUT /encoding/:id/definitions/:definition_id
pub async fn update_definition(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((study_id, definition_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateDefinition>,
) -> ApiResult<Json<Definition>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let definition =
        manager::update_encoder_definition(&state.db, study.id, definition_id, &req.name, &req.configuration)
            .await?;
    Ok(Json(definition))
}

/// DELETE /encoding/:id/definitions/:definition_id
pub async fn delete_definition(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((study_id, definition_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Value>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    manager::delete_encoder_definition(&state.db, study.id, definition_id).await?;
    Ok(Json(json!({ "deleted": definition_id })))
}

/// GET /encoding/:id/assign
pub async fn assign_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<AssignPage>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    Ok(Json(workflow::assign_page(&state.db, &state.store, study).await?))
}

#[derive(Debug, Deserialize)]
pub struct AssignColumns {
    pub column_ids: Vec<i64>,
    pub definition_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AssignRange {
    pub start_key: String,
    pub end_key: String,
    pub definition_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UnassignColumns {
    pub column_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyDefinition {
    pub column_ids: Vec<i64>,
    pub definition_name: String,
    #[serde(default = "empty_object")]
    pub configuration: Value,
    pub prototype_name: String,
}

/// POST /encoding/:id/assign
pub async fn assign(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
    Json(req): Json<AssignColumns>,
) -> ApiResult<Json<Value>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let updated = manager::assign_encoder_to_columns(&state.db, study.id, &req.column_ids, req.definition_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// POST /encoding/:id/assign-range
pub async fn assign_range(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
    Json(req): Json<AssignRange>,
) -> ApiResult<Json<Value>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let updated =
        manager::assign_definition_to_range(&state.db, study.id, &req.start_key, &req.end_key, req.definition_id)
            .await?;
    Ok(Json(json!({ "updated": updated })))
}

/// POST /encoding/:id/unassign
pub async fn unassign(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
    Json(req): Json<UnassignColumns>,
) -> ApiResult<Json<Value>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let updated = manager::unassign_columns(&state.db, study.id, &req.column_ids).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// POST /encoding/:id/apply
///
/// Finds or creates the named definition, then assigns it.
pub async fn apply(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
    Json(req): Json<ApplyDefinition>,
) -> ApiResult<Json<Value>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let updated = manager::apply_definition_to_columns(
        &state.db,
        study.id,
        &req.column_ids,
        &req.definition_name,
        &req.configuration,
        &req.prototype_name,
    )
    .await?;
    Ok(Json(json!({ "updated": updated })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RunEncoding {
    #[serde(default)]
    pub source: EncodingSource,
}

/// POST /encoding/:id/run
pub async fn run(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
    Json(req): Json<RunEncoding>,
) -> ApiResult<Json<EncodingRun>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    Ok(Json(
        workflow::run_encoding(&state.db, &state.store, &state.workspace, &study, req.source).await?,
    ))
}

/// GET /encoding/:id/results
pub async fn results(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<EncodingResults>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    Ok(Json(workflow::results(&state.store, &study).await?))
}

/// POST /encoding/refresh-prototypes
///
/// Re-seeds the configured prototypes; existing names are left alone.
pub async fn refresh_prototypes(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let added = manager::seed_prototypes(&state.db, &state.config.prototypes_or_default()).await?;
    Ok(Json(json!({ "added": added })))
}
