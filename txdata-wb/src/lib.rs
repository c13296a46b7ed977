//! txdata-wb library - research-data workbench
//!
//! Upload a survey CSV, simulate more respondents by bootstrapping, encode
//! answers to numeric codes with reusable definitions, then run statistical
//! analyses over the encoded data.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use txdata_common::config::TomlConfig;

pub mod analysis;
pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod charts;
pub mod db;
pub mod encoding;
pub mod error;
pub mod simulation;
pub mod stats;
pub mod studies;
pub mod tutorials;
pub mod workspace;

use workspace::Workspace;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Persistent project files (uploads and generated artifacts)
    pub store: Workspace,
    /// Per-session cache, cleared at logout
    pub workspace: Workspace,
    pub config: Arc<TomlConfig>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, store: Workspace, workspace: Workspace, config: TomlConfig) -> Self {
        Self {
            db,
            store,
            workspace,
            config: Arc::new(config),
        }
    }
}

/// Build application router
///
/// `/`, `/health`, registration and login are public; everything else
/// requires a session token.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/auth/logout", post(api::auth::logout))
        .route("/auth/me", get(api::auth::me))
        // Projects
        .route(
            "/projects",
            get(api::projects::list_projects).post(api::projects::create_project),
        )
        .route("/projects/purge", post(api::projects::purge_projects))
        .route(
            "/projects/:id",
            get(api::projects::project_overview)
                .put(api::projects::update_project)
                .delete(api::projects::delete_project),
        )
        .route("/projects/:id/files", get(api::projects::list_project_files))
        .route("/projects/:id/files/:name", get(api::projects::download_project_file))
        // Simulation
        .route("/sim/:id/map", get(api::sim::get_map))
        .route("/sim/:id/map/recreate", post(api::sim::recreate_map))
        .route("/sim/:id/preview", get(api::sim::preview))
        .route("/sim/:id/run", post(api::sim::run))
        .route("/sim/:id/results", get(api::sim::results))
        .route("/sim/:id/view/:name", get(api::sim::view_file))
        // Encoding
        .route("/encoding/refresh-prototypes", post(api::encoding::refresh_prototypes))
        .route(
            "/encoding/:id/definitions",
            get(api::encoding::definitions_page).post(api::encoding::create_definition),
        )
        .route(
            "/encoding/:id/definitions/:definition_id",
            axum::routing::put(api::encoding::update_definition).delete(api::encoding::delete_definition),
        )
        .route(
            "/encoding/:id/assign",
            get(api::encoding::assign_page).post(api::encoding::assign),
        )
        .route("/encoding/:id/assign-range", post(api::encoding::assign_range))
        .route("/encoding/:id/unassign", post(api::encoding::unassign))
        .route("/encoding/:id/apply", post(api::encoding::apply))
        .route("/encoding/:id/run", post(api::encoding::run))
        .route("/encoding/:id/results", get(api::encoding::results))
        // Analysis
        .route("/analysis/:id", get(api::analysis::dashboard))
        .route("/analysis/:id/run", post(api::analysis::run))
        .route("/analysis/:id/composite", post(api::analysis::composite))
        .route("/analysis/:id/tamper", post(api::analysis::tamper))
        .route("/analysis/:id/reset", post(api::analysis::reset))
        // Tutorials
        .route("/tutorials", get(api::tutorials::hierarchy))
        .route("/tutorials/subtopics/:id", get(api::tutorials::subtopic))
        .route("/tutorial_admin/levels/:id/sections", get(api::tutorials::admin_sections))
        .route("/tutorial_admin/sections/:id/topics", get(api::tutorials::admin_topics))
        .route("/tutorial_admin/topics/:id/subtopics", get(api::tutorials::admin_subtopics))
        .route(
            "/tutorial_admin/subtopics/:id",
            get(api::tutorials::admin_subtopic).put(api::tutorials::admin_update_subtopic),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/", get(api::serve_index))
        .route("/auth/register", post(api::auth::register))
        .route("/auth/login", post(api::auth::login))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
