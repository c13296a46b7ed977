//! Tutorial reader and admin endpoints

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::Value;

use super::auth::CurrentUser;
use crate::db::tutorials::{Subtopic, TutorialNode};
use crate::error::ApiResult;
use crate::tutorials::{self, LevelTree, SubtopicForm};
use crate::AppState;

/// GET /tutorials
pub async fn hierarchy(State(state): State<AppState>) -> ApiResult<Json<Vec<LevelTree>>> {
    Ok(Json(tutorials::hierarchy(&state.db).await?))
}

/// GET /tutorials/subtopics/:id
pub async fn subtopic(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let sub = tutorials::subtopic(&state.db, id).await?;
    Ok(Json(tutorials::reader_view(&sub)))
}

/// GET /tutorial_admin/levels/:id/sections
pub async fn admin_sections(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(level_id): Path<i64>,
) -> ApiResult<Json<Vec<TutorialNode>>> {
    tutorials::require_admin(&current.user)?;
    Ok(Json(tutorials::sections_of(&state.db, level_id).await?))
}

/// GET /tutorial_admin/sections/:id/topics
pub async fn admin_topics(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(section_id): Path<i64>,
) -> ApiResult<Json<Vec<TutorialNode>>> {
    tutorials::require_admin(&current.user)?;
    Ok(Json(tutorials::topics_of(&state.db, section_id).await?))
}

/// GET /tutorial_admin/topics/:id/subtopics
pub async fn admin_subtopics(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(topic_id): Path<i64>,
) -> ApiResult<Json<Vec<Subtopic>>> {
    tutorials::require_admin(&current.user)?;
    Ok(Json(tutorials::subtopics_of(&state.db, topic_id).await?))
}

/// GET /tutorial_admin/subtopics/:id
pub async fn admin_subtopic(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Subtopic>> {
    tutorials::require_admin(&current.user)?;
    Ok(Json(tutorials::subtopic(&state.db, id).await?))
}

/// PUT /tutorial_admin/subtopics/:id
pub async fn admin_update_subtopic(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(form): Json<SubtopicForm>,
) -> ApiResult<Json<Subtopic>> {
    tutorials::require_admin(&current.user)?;
    Ok(Json(tutorials::update_subtopic(&state.db, id, &form).await?))
}
