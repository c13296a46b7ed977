//! Bootstrap simulation workflow for a study
//!
//! Reads the study's source CSV from the project store, makes sure a
//! question map exists, runs the requested bootstrap and stores the
//! simulated CSV (original question headers) in the project store. The
//! comparison plots of a run are session artifacts and go to the session
//! workspace.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use txdata_common::frame::Table;
use txdata_common::{Frame, QuestionMap};

use crate::analysis::TABLE_CLASS;
use crate::bootstrap::{comparison_plot_filename, BootstrapMethod, DataBootstrapper};
use crate::charts;
use crate::db::studies::Study;
use crate::encoding::manager;
use crate::error::{ApiError, ApiResult};
use crate::workspace::Workspace;

const PREVIEW_ROWS: usize = 10;
const RESULT_ROWS: usize = 50;
const VIEW_MAX_ROWS: usize = 500;

/// Question map of a study and its keys in order
#[derive(Debug, Clone, Serialize)]
pub struct MapView {
    pub column_map: QuestionMap,
    pub keys: Vec<String>,
    /// True when the map was generated from the CSV headers by this call
    pub generated: bool,
}

/// Bootstrap request: method fields flattened next to the sample count
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationRequest {
    #[serde(flatten)]
    pub method: BootstrapMethod,
    pub n_samples: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationRun {
    pub simulated_file: String,
    pub rows: usize,
    pub columns: usize,
    /// Keys whose comparison plot was stored
    pub plotted_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonPlot {
    pub key: String,
    pub question_text: String,
    pub plot: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResults {
    pub simulated_file: String,
    pub table: Table,
    pub table_html: String,
    pub total_rows: usize,
    pub plots: Vec<ComparisonPlot>,
}

/// A stored file rendered for display
#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    pub filename: String,
    pub kind: &'static str,
    pub content: String,
    pub note: Option<String>,
}

async fn source_text(store: &Workspace, study: &Study) -> ApiResult<String> {
    let name = study.source_filename();
    Ok(store
        .require_file(study.user_id, &study.project_code, &name, || {
            format!("Source data '{}' not found.", name)
        })
        .await?)
}

/// Bootstrapper over the source CSV; a map generated from the headers is stored
pub async fn load_bootstrapper(store: &Workspace, study: &Study) -> ApiResult<DataBootstrapper> {
    let text = source_text(store, study).await?;
    let stored = manager::get_column_map(store, study).await?;
    let bootstrapper = DataBootstrapper::new(&text, Some(stored))?;

    if bootstrapper.map_generated() {
        let json = bootstrapper.column_map().to_json_pretty()?;
        store
            .save_file(study.user_id, &study.project_code, &study.map_filename, json.as_bytes())
            .await?;
        info!(study_id = study.id, "Stored generated question map '{}'", study.map_filename);
    }
    Ok(bootstrapper)
}

/// The study's question map, generated and stored when missing
pub async fn ensure_column_map(store: &Workspace, study: &Study) -> ApiResult<MapView> {
    let bootstrapper = load_bootstrapper(store, study).await?;
    Ok(MapView {
        column_map: bootstrapper.column_map().clone(),
        keys: bootstrapper.keys(),
        generated: bootstrapper.map_generated(),
    })
}

/// Drop the stored map and generate a fresh one from the headers
pub async fn recreate_column_map(store: &Workspace, study: &Study) -> ApiResult<MapView> {
    let removed = store
        .delete_file(study.user_id, &study.project_code, &study.map_filename)
        .await?;
    debug!(study_id = study.id, removed, "Recreating question map");
    ensure_column_map(store, study).await
}

/// First rows of the source CSV as an HTML table
pub async fn preview(store: &Workspace, study: &Study) -> ApiResult<String> {
    let frame = Frame::from_csv_str(&source_text(store, study).await?)?;
    Ok(frame.to_table(PREVIEW_ROWS).to_html(TABLE_CLASS))
}

/// Key-named frame renamed back to the question texts of the map
fn with_question_headers(frame: &Frame, map: &QuestionMap) -> Frame {
    let renames: HashMap<String, String> = map.iter().map(|(k, q)| (k.to_string(), q.clone())).collect();
    let mut out = frame.clone();
    out.rename_columns(&renames);
    out
}

pub async fn run_simulation(
    store: &Workspace,
    workspace: &Workspace,
    study: &Study,
    request: &SimulationRequest,
) -> ApiResult<SimulationRun> {
    let bootstrapper = load_bootstrapper(store, study).await?;
    let simulated = bootstrapper.run(&request.method, request.n_samples, request.seed)?;

    let simulated_file = study.simulated_filename();
    let csv = with_question_headers(&simulated, bootstrapper.column_map()).to_csv_string()?;
    store
        .save_file(study.user_id, &study.project_code, &simulated_file, csv.as_bytes())
        .await?;

    // Plots from an earlier run would no longer match the new data.
    for file in workspace.list_files(study.user_id, &study.project_code).await? {
        if file.name.starts_with("comparison_") && file.name.ends_with(".svg") {
            workspace
                .delete_file(study.user_id, &study.project_code, &file.name)
                .await?;
        }
    }

    let mut plotted_keys = Vec::new();
    for key in bootstrapper.plotted_keys(&request.method) {
        match bootstrapper.plot_comparison(&simulated, &key)? {
            Some(svg) => {
                workspace
                    .save_file(
                        study.user_id,
                        &study.project_code,
                        &comparison_plot_filename(&key),
                        svg.as_bytes(),
                    )
                    .await?;
                plotted_keys.push(key);
            }
            None => debug!(study_id = study.id, key = %key, "No comparison plot for non-numeric column"),
        }
    }

    info!(
        study_id = study.id,
        method = ?request.method,
        rows = simulated.n_rows(),
        "Simulation complete"
    );
    Ok(SimulationRun {
        simulated_file,
        rows: simulated.n_rows(),
        columns: simulated.n_cols(),
        plotted_keys,
    })
}

/// Simulated data preview plus the comparison plots of the last run
pub async fn results(store: &Workspace, workspace: &Workspace, study: &Study) -> ApiResult<SimulationResults> {
    let simulated_file = study.simulated_filename();
    let text = store
        .get_file(study.user_id, &study.project_code, &simulated_file)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Simulated data '{}' not found. Run bootstrap simulation first.",
                simulated_file
            ))
        })?;
    let frame = Frame::from_csv_str(&text)?;
    let table = frame.to_table(RESULT_ROWS);
    let map = manager::get_column_map(store, study).await?;

    let mut plots = Vec::new();
    for key in map.keys() {
        let name = comparison_plot_filename(&key);
        if let Some(svg) = workspace.get_file(study.user_id, &study.project_code, &name).await? {
            plots.push(ComparisonPlot {
                question_text: map.question_text(&key).to_string(),
                plot: charts::to_data_uri(&svg),
                key,
            });
        }
    }

    Ok(SimulationResults {
        simulated_file,
        table_html: table.to_html(TABLE_CLASS),
        table,
        total_rows: frame.n_rows(),
        plots,
    })
}

/// Render a stored file: CSV as a truncated HTML table, JSON pretty-printed
///
/// The project store is searched first, then the session workspace.
pub async fn view_file(
    store: &Workspace,
    workspace: &Workspace,
    study: &Study,
    filename: &str,
) -> ApiResult<FileView> {
    let mut text = store.get_file(study.user_id, &study.project_code, filename).await?;
    if text.is_none() {
        text = workspace.get_file(study.user_id, &study.project_code, filename).await?;
    }
    let text = text.ok_or_else(|| ApiError::NotFound(format!("File '{}' not found.", filename)))?;

    let lower = filename.to_lowercase();
    if lower.ends_with(".csv") {
        let frame = Frame::from_csv_str(&text)?;
        let note = (frame.n_rows() > VIEW_MAX_ROWS).then(|| {
            format!(
                "Showing the first {} of {} rows.",
                VIEW_MAX_ROWS,
                frame.n_rows()
            )
        });
        return Ok(FileView {
            filename: filename.to_string(),
            kind: "csv",
            content: frame.to_table(VIEW_MAX_ROWS).to_html(TABLE_CLASS),
            note,
        });
    }

    if lower.ends_with(".json") {
        let content = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => serde_json::to_string_pretty(&value)?,
            Err(e) => {
                warn!(file = filename, "Stored JSON is invalid: {}", e);
                text
            }
        };
        return Ok(FileView {
            filename: filename.to_string(),
            kind: "json",
            content,
            note: None,
        });
    }

    Ok(FileView {
        filename: filename.to_string(),
        kind: "text",
        content: text,
        note: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::studies::tests::{seed_study, seed_user};
    use axum::http::StatusCode;
    use txdata_common::db::init_memory_database;

    const SOURCE: &str = "Age,Score,Gender\n30,4,F\n41,2,M\n25,5,F\n38,3,M\n";

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Workspace,
        workspace: Workspace,
        study: Study,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_database().await.unwrap();
        let user = seed_user(&pool, "lena").await;
        let study = seed_study(&pool, user, "wellbeing").await;
        let store = Workspace::new(dir.path().join("projects"));
        store
            .save_file(user, &study.project_code, &study.source_filename(), SOURCE.as_bytes())
            .await
            .unwrap();
        Fixture {
            workspace: Workspace::new(dir.path().join("workspaces")),
            _dir: dir,
            store,
            study,
        }
    }

    fn request(json: &str) -> SimulationRequest {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_map_generated_once() {
        let f = fixture().await;
        let first = ensure_column_map(&f.store, &f.study).await.unwrap();
        assert!(first.generated);
        assert_eq!(first.keys, vec!["q1", "q2", "q3"]);
        assert_eq!(first.column_map.get("q2").map(String::as_str), Some("Score"));

        let second = ensure_column_map(&f.store, &f.study).await.unwrap();
        assert!(!second.generated);

        let again = recreate_column_map(&f.store, &f.study).await.unwrap();
        assert!(again.generated);
    }

    #[tokio::test]
    async fn test_run_stores_simulated_with_question_headers() {
        let f = fixture().await;
        let run = run_simulation(
            &f.store,
            &f.workspace,
            &f.study,
            &request(r#"{"method": "standard", "n_samples": 12, "seed": 7}"#),
        )
        .await
        .unwrap();
        assert_eq!(run.rows, 12);
        assert_eq!(run.simulated_file, "simulated_wellbeing.csv");
        assert_eq!(run.plotted_keys, vec!["q1", "q2"]);

        let text = f
            .store
            .get_file(f.study.user_id, &f.study.project_code, &run.simulated_file)
            .await
            .unwrap()
            .unwrap();
        assert!(text.starts_with("Age,Score,Gender"));

        let results = results(&f.store, &f.workspace, &f.study).await.unwrap();
        assert_eq!(results.total_rows, 12);
        assert_eq!(results.plots.len(), 2);
        assert_eq!(results.plots[1].question_text, "Score");
        assert!(results.plots[0].plot.starts_with("data:image/svg+xml;base64,"));
    }

    #[tokio::test]
    async fn test_remix_plots_start_and_previous_key() {
        let f = fixture().await;
        let run = run_simulation(
            &f.store,
            &f.workspace,
            &f.study,
            &request(r#"{"method": "remix", "start_key": "q3", "end_key": "q3", "n_samples": 5, "seed": 1}"#),
        )
        .await
        .unwrap();
        // q3 is text, so only the numeric neighbour gets a plot.
        assert_eq!(run.plotted_keys, vec!["q2"]);
    }

    #[tokio::test]
    async fn test_missing_source_and_results() {
        let f = fixture().await;
        let err = results(&f.store, &f.workspace, &f.study).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        f.store
            .delete_file(f.study.user_id, &f.study.project_code, &f.study.source_filename())
            .await
            .unwrap();
        let err = ensure_column_map(&f.store, &f.study).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_view_file_kinds() {
        let f = fixture().await;
        ensure_column_map(&f.store, &f.study).await.unwrap();

        let csv = view_file(&f.store, &f.workspace, &f.study, "wellbeing.csv").await.unwrap();
        assert_eq!(csv.kind, "csv");
        assert!(csv.content.contains("<th>Score</th>"));
        assert!(csv.note.is_none());

        let json = view_file(&f.store, &f.workspace, &f.study, "wellbeing.json").await.unwrap();
        assert_eq!(json.kind, "json");
        assert!(json.content.contains("\"q1\": \"Age\""));

        let err = view_file(&f.store, &f.workspace, &f.study, "nope.csv").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_view_file_keeps_question_map_order() {
        let f = fixture().await;
        let headers: Vec<String> = (1..=12).map(|i| format!("Item {}", i)).collect();
        let row: Vec<String> = (1..=12).map(|i| i.to_string()).collect();
        let csv = format!("{}\n{}\n", headers.join(","), row.join(","));
        f.store
            .save_file(f.study.user_id, &f.study.project_code, &f.study.source_filename(), csv.as_bytes())
            .await
            .unwrap();
        ensure_column_map(&f.store, &f.study).await.unwrap();

        let view = view_file(&f.store, &f.workspace, &f.study, &f.study.map_filename)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&view.content).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 12);
        assert_eq!(&keys[..3], &["q1", "q2", "q3"]);
        assert_eq!(keys[11], "q12");
    }
}
