//! Study (project) management
//!
//! A study owns one uploaded CSV plus every file derived from it. Files
//! live in the project store under `<user_id>/<project_code>/`; the
//! session workspace mirrors that layout for per-session artifacts.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use txdata_common::frame::Table;
use txdata_common::Frame;

use crate::db::studies::{self, NewStudy, Study};
use crate::db::users::User;
use crate::encoding::manager;
use crate::error::{ApiError, ApiResult};
use crate::workspace::{Workspace, WorkspaceFile};

const PREVIEW_ROWS: usize = 5;

/// Upload and metadata for a new study
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub topic: Option<String>,
    pub description: Option<String>,
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Study whose encoder definitions are copied into the new one
    pub clone_from_study_id: Option<i64>,
}

/// Study metadata with a short data preview and its stored files
#[derive(Debug, Clone, Serialize)]
pub struct StudyOverview {
    pub study: Study,
    pub preview: Option<Table>,
    pub preview_error: Option<String>,
    pub files: Vec<WorkspaceFile>,
}

/// File-system safe base name derived from a study name
///
/// Lowercased, spaces become `_`, and only ASCII alphanumerics, `_`, `-`
/// and `.` are kept. Leading and trailing `.`/`_` are stripped.
pub fn secure_base_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn optional(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Study by id that must belong to the user (404 unknown, 403 foreign)
pub async fn owned_study(pool: &SqlitePool, study_id: i64, user: &User) -> ApiResult<Study> {
    let study = studies::find_study(pool, study_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Study {} not found.", study_id)))?;
    if study.user_id != user.id {
        warn!(study_id, user_id = user.id, "Study access denied");
        return Err(ApiError::Forbidden(
            "You do not have permission to access this study.".to_string(),
        ));
    }
    Ok(study)
}

pub async fn create_study(
    pool: &SqlitePool,
    store: &Workspace,
    user: &User,
    project: NewProject,
) -> ApiResult<Study> {
    let name = project.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Study name is required.".to_string()));
    }
    if project.filename.trim().is_empty() || project.bytes.is_empty() {
        return Err(ApiError::BadRequest("A CSV file is required.".to_string()));
    }
    if !project.filename.to_lowercase().ends_with(".csv") {
        return Err(ApiError::BadRequest(
            "Invalid file type. Please upload a CSV file.".to_string(),
        ));
    }

    let base = secure_base_name(name);
    if base.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Study name '{}' does not produce a valid file name.",
            name
        )));
    }
    let map_filename = format!("{}.json", base);

    if studies::find_study_by_name(pool, name).await?.is_some() {
        return Err(ApiError::Conflict(format!("A study named '{}' already exists.", name)));
    }
    if studies::find_study_by_map_filename(pool, &map_filename).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "A study with the file name '{}' already exists. Choose a different name.",
            base
        )));
    }

    // Reject files that cannot be read as CSV before anything is stored.
    let headers = Frame::headers_from_csv(&txdata_common::frame::decode_text(&project.bytes))?;
    if headers.is_empty() {
        return Err(ApiError::BadRequest("The uploaded CSV has no header row.".to_string()));
    }

    let date = chrono::Utc::now().format("%Y%m%d").to_string();
    let code = studies::next_project_code(pool, &date, studies::owner_initial(Some(&user.username))).await?;
    let study = studies::insert_study(
        pool,
        &NewStudy {
            name,
            topic: optional(project.topic.as_deref()),
            description: optional(project.description.as_deref()),
            map_filename: &map_filename,
            project_code: &code,
            user_id: user.id,
        },
    )
    .await?;

    if let Err(e) = store
        .save_file(user.id, &study.project_code, &study.source_filename(), &project.bytes)
        .await
    {
        studies::delete_study(pool, study.id).await?;
        return Err(e.into());
    }

    if let Some(source_id) = project.clone_from_study_id {
        match studies::find_study(pool, source_id).await? {
            Some(source) if source.user_id == user.id => {
                manager::clone_definitions(pool, source.id, study.id).await?;
            }
            _ => warn!(study_id = study.id, source_id, "Clone source not available; skipping"),
        }
    }

    info!(
        study_id = study.id,
        project = %study.project_code,
        columns = headers.len(),
        "Created study '{}'",
        study.name
    );
    Ok(study)
}

/// The user's studies, newest first
pub async fn list_studies(pool: &SqlitePool, user_id: i64) -> ApiResult<Vec<Study>> {
    Ok(studies::list_studies_for_user(pool, user_id).await?)
}

pub async fn study_admin(store: &Workspace, study: Study) -> ApiResult<StudyOverview> {
    let source = store
        .get_file(study.user_id, &study.project_code, &study.source_filename())
        .await?;

    let (preview, preview_error) = match source {
        Some(text) => match Frame::from_csv_str(&text) {
            Ok(frame) => (Some(frame.to_table(PREVIEW_ROWS)), None),
            Err(e) => (None, Some(format!("Could not read data preview: {}", e))),
        },
        None => (
            None,
            Some(format!("Source file '{}' not found.", study.source_filename())),
        ),
    };

    let files = store.list_files(study.user_id, &study.project_code).await?;
    Ok(StudyOverview {
        study,
        preview,
        preview_error,
        files,
    })
}

pub async fn update_study(
    pool: &SqlitePool,
    study: &Study,
    name: &str,
    topic: Option<&str>,
    description: Option<&str>,
) -> ApiResult<Study> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Study name is required.".to_string()));
    }
    if let Some(other) = studies::find_study_by_name(pool, name).await? {
        if other.id != study.id {
            return Err(ApiError::Conflict(format!("A study named '{}' already exists.", name)));
        }
    }

    studies::update_study(pool, study.id, name, optional(topic), optional(description)).await?;
    info!(study_id = study.id, "Updated study '{}'", name);
    Ok(studies::get_study(pool, study.id).await?)
}

/// Remove a study's files from both stores, then the row
pub async fn delete_study(
    pool: &SqlitePool,
    store: &Workspace,
    workspace: &Workspace,
    study: &Study,
) -> ApiResult<()> {
    store.clear_project(study.user_id, &study.project_code).await?;
    workspace.clear_project(study.user_id, &study.project_code).await?;
    studies::delete_study(pool, study.id).await?;
    info!(study_id = study.id, project = %study.project_code, "Deleted study '{}'", study.name);
    Ok(())
}

/// Delete every study of every user and clear both stores (Admin only)
pub async fn purge(
    pool: &SqlitePool,
    store: &Workspace,
    workspace: &Workspace,
    user: &User,
) -> ApiResult<u64> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden(
            "Only administrators can purge all studies.".to_string(),
        ));
    }
    let deleted = studies::delete_all_studies(pool).await?;
    store.clear_all().await?;
    workspace.clear_all().await?;
    warn!(user_id = user.id, deleted, "Purged all studies");
    Ok(deleted)
}
