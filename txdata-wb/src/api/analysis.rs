//! Analysis dashboard endpoints
//!
//! Each request loads the study's working copy; mutating endpoints
//! persist it back to the session workspace.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use txdata_common::frame::Table;

use super::auth::CurrentUser;
use crate::analysis::{AnalysisManager, AnalysisResult, AnalysisRun, VariableTypes};
use crate::error::ApiResult;
use crate::studies;
use crate::AppState;

const DASHBOARD_ROWS: usize = 100;

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub variable_types: VariableTypes,
    pub data: Table,
    pub total_rows: usize,
}

/// GET /analysis/:id
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<Dashboard>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let manager = AnalysisManager::load(&state.store, &state.workspace, &study).await?;
    Ok(Json(Dashboard {
        variable_types: manager.variable_types(),
        data: manager.labeled_data(DASHBOARD_ROWS),
        total_rows: manager.data().n_rows(),
    }))
}

/// POST /analysis/:id/run
pub async fn run(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
    Json(req): Json<AnalysisRun>,
) -> ApiResult<Json<AnalysisResult>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let manager = AnalysisManager::load(&state.store, &state.workspace, &study).await?;
    Ok(Json(manager.run(&req).await?))
}

#[derive(Debug, Deserialize)]
pub struct CompositeRequest {
    pub name: String,
    pub variables: Vec<String>,
}

/// POST /analysis/:id/composite
pub async fn composite(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
    Json(req): Json<CompositeRequest>,
) -> ApiResult<Json<Value>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let mut manager = AnalysisManager::load(&state.store, &state.workspace, &study).await?;
    let message = manager.create_composite_variable(&req.name, &req.variables).await?;
    Ok(Json(json!({
        "message": message,
        "variable_types": manager.variable_types(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct TamperRequest {
    pub column: String,
    pub new_value: String,
    pub num_rows: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// POST /analysis/:id/tamper
pub async fn tamper(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
    Json(req): Json<TamperRequest>,
) -> ApiResult<Json<Value>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let mut manager = AnalysisManager::load(&state.store, &state.workspace, &study).await?;
    let rows = manager
        .run_data_tampering(&req.column, &req.new_value, req.num_rows, req.seed)
        .await?;
    Ok(Json(json!({
        "message": format!("Replaced {} value(s) in '{}'.", rows.len(), req.column),
        "rows": rows,
    })))
}

/// POST /analysis/:id/reset
pub async fn reset(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let removed = AnalysisManager::reset(&state.workspace, &study).await?;
    Ok(Json(json!({ "reset": removed })))
}
