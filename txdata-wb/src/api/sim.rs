//! Bootstrap simulation endpoints

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::{json, Value};

use super::auth::CurrentUser;
use crate::error::ApiResult;
use crate::simulation::{self, FileView, MapView, SimulationRequest, SimulationResults, SimulationRun};
use crate::studies;
use crate::AppState;

/// GET /sim/:id/map
///
/// Generates and stores the question map on first use.
pub async fn get_map(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<MapView>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    Ok(Json(simulation::ensure_column_map(&state.store, &study).await?))
}

/// POST /sim/:id/map/recreate
pub async fn recreate_map(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<MapView>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    Ok(Json(simulation::recreate_column_map(&state.store, &study).await?))
}

/// GET /sim/:id/preview
pub async fn preview(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let html = simulation::preview(&state.store, &study).await?;
    Ok(Json(json!({ "table_html": html })))
}

/// POST /sim/:id/run
pub async fn run(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
    Json(req): Json<SimulationRequest>,
) -> ApiResult<Json<SimulationRun>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    Ok(Json(
        simulation::run_simulation(&state.store, &state.workspace, &study, &req).await?,
    ))
}

/// GET /sim/:id/results
pub async fn results(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<SimulationResults>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    Ok(Json(simulation::results(&state.store, &state.workspace, &study).await?))
}

/// GET /sim/:id/view/:name
pub async fn view_file(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((study_id, name)): Path<(i64, String)>,
) -> ApiResult<Json<FileView>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    Ok(Json(
        simulation::view_file(&state.store, &state.workspace, &study, &name).await?,
    ))
}
