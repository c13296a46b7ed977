//! Project (study) endpoints

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::CurrentUser;
use crate::db::studies::Study;
use crate::error::{ApiError, ApiResult};
use crate::studies::{self, NewProject, StudyOverview};
use crate::workspace::WorkspaceFile;
use crate::AppState;

/// GET /projects
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Study>>> {
    Ok(Json(studies::list_studies(&state.db, current.user.id).await?))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Invalid form data: {}", e))
}

/// POST /projects (multipart: name, topic, description, clone_from_study_id, file)
pub async fn create_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Study>)> {
    let mut project = NewProject {
        name: String::new(),
        topic: None,
        description: None,
        filename: String::new(),
        bytes: Vec::new(),
        clone_from_study_id: None,
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                project.filename = field.file_name().unwrap_or_default().to_string();
                project.bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
            }
            "name" => project.name = field.text().await.map_err(multipart_error)?,
            "topic" => project.topic = Some(field.text().await.map_err(multipart_error)?),
            "description" => project.description = Some(field.text().await.map_err(multipart_error)?),
            "clone_from_study_id" => {
                let text = field.text().await.map_err(multipart_error)?;
                let text = text.trim();
                if !text.is_empty() {
                    let id = text.parse::<i64>().map_err(|_| {
                        ApiError::BadRequest(format!("Invalid study id '{}' to clone from.", text))
                    })?;
                    project.clone_from_study_id = Some(id);
                }
            }
            _ => {}
        }
    }

    let study = studies::create_study(&state.db, &state.store, &current.user, project).await?;
    Ok((StatusCode::CREATED, Json(study)))
}

/// GET /projects/:id
pub async fn project_overview(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<StudyOverview>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    Ok(Json(studies::study_admin(&state.store, study).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProject {
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// PUT /projects/:id
pub async fn update_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
    Json(req): Json<UpdateProject>,
) -> ApiResult<Json<Study>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let updated = studies::update_study(
        &state.db,
        &study,
        &req.name,
        req.topic.as_deref(),
        req.description.as_deref(),
    )
    .await?;
    Ok(Json(updated))
}

/// DELETE /projects/:id
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    studies::delete_study(&state.db, &state.store, &state.workspace, &study).await?;
    Ok(Json(json!({ "message": format!("Study '{}' deleted.", study.name) })))
}

/// POST /projects/purge (Admin only)
pub async fn purge_projects(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Value>> {
    let deleted = studies::purge(&state.db, &state.store, &state.workspace, &current.user).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// GET /projects/:id/files
pub async fn list_project_files(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(study_id): Path<i64>,
) -> ApiResult<Json<Vec<WorkspaceFile>>> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    Ok(Json(state.store.list_files(study.user_id, &study.project_code).await?))
}

fn content_type_for(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.ends_with(".csv") {
        "text/csv; charset=utf-8"
    } else if lower.ends_with(".json") {
        "application/json"
    } else if lower.ends_with(".svg") {
        "image/svg+xml"
    } else {
        "application/octet-stream"
    }
}

/// GET /projects/:id/files/:name
///
/// Raw download from the project store.
pub async fn download_project_file(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((study_id, name)): Path<(i64, String)>,
) -> ApiResult<Response> {
    let study = studies::owned_study(&state.db, study_id, &current.user).await?;
    let bytes = state
        .store
        .get_bytes(study.user_id, &study.project_code, &name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("File '{}' not found.", name)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_for(&name).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", name),
            ),
        ],
        bytes,
    )
        .into_response())
}
