//! Encoding workflow of a study: page data, the encoding run and its results

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};
use txdata_common::frame::Table;
use txdata_common::{Frame, OrderedMap, QuestionMap};

use super::{manager, Codebook, DataEncoder, EncodingWarning};
use crate::analysis::{AnalysisManager, TABLE_CLASS};
use crate::db::encoders::{self, ColumnEncoding, Definition, Prototype};
use crate::db::studies::Study;
use crate::error::{ApiError, ApiResult};
use crate::simulation;
use crate::workspace::Workspace;

const DEFINITIONS_PREVIEW_ROWS: usize = 50;
const ORIGINAL_PREVIEW_ROWS: usize = 10;

/// Which CSV an encoding run reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingSource {
    #[default]
    Simulated,
    Original,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefinitionsPage {
    pub study: Study,
    pub definitions: Vec<Definition>,
    pub prototypes: Vec<Prototype>,
    pub preview: Option<Table>,
    pub has_results: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignPage {
    pub study: Study,
    pub column_map: QuestionMap,
    pub columns: Vec<ColumnEncoding>,
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EncodingRun {
    pub input_file: String,
    pub encoded_file: String,
    pub codebook_file: String,
    pub rows: usize,
    pub columns: usize,
    pub warnings: Vec<EncodingWarning>,
    pub skipped_columns: Vec<String>,
    pub learned_definitions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EncodingResults {
    pub encoded: Table,
    pub encoded_html: String,
    /// Encoded column → question text
    pub question_texts: OrderedMap<String>,
    pub original_preview: Option<Table>,
}

pub async fn definitions_page(pool: &SqlitePool, store: &Workspace, study: Study) -> ApiResult<DefinitionsPage> {
    let definitions = encoders::list_definitions(pool, study.id).await?;
    let prototypes = encoders::list_prototypes(pool).await?;

    let preview = match store
        .get_file(study.user_id, &study.project_code, &study.source_filename())
        .await?
    {
        Some(text) => match Frame::from_csv_str(&text) {
            Ok(frame) => Some(frame.to_table(DEFINITIONS_PREVIEW_ROWS)),
            Err(e) => {
                warn!(study_id = study.id, "Source preview unavailable: {}", e);
                None
            }
        },
        None => None,
    };
    let has_results = store
        .exists(study.user_id, &study.project_code, &study.encoded_filename())
        .await?;

    Ok(DefinitionsPage {
        study,
        definitions,
        prototypes,
        preview,
        has_results,
    })
}

/// Column assignment data; columns are initialized from the question map first
pub async fn assign_page(pool: &SqlitePool, store: &Workspace, study: Study) -> ApiResult<AssignPage> {
    let map = simulation::ensure_column_map(store, &study).await?;
    manager::initialize_columns_for_study(pool, study.id, &map.column_map).await?;
    let columns = manager::get_column_configs_for_study(pool, study.id).await?;
    let definitions = encoders::list_definitions(pool, study.id).await?;
    Ok(AssignPage {
        study,
        column_map: map.column_map,
        columns,
        definitions,
    })
}

/// Encode the study's data with its assigned definitions
///
/// Learned value maps are written back before any file is stored, so an
/// incompatible map (409) leaves the previous results untouched. A
/// successful run drops the session's analysis working copy.
pub async fn run_encoding(
    pool: &SqlitePool,
    store: &Workspace,
    workspace: &Workspace,
    study: &Study,
    source: EncodingSource,
) -> ApiResult<EncodingRun> {
    let input_file = match source {
        EncodingSource::Simulated => study.simulated_filename(),
        EncodingSource::Original => study.source_filename(),
    };
    let text = store
        .get_file(study.user_id, &study.project_code, &input_file)
        .await?
        .ok_or_else(|| match source {
            EncodingSource::Simulated => ApiError::BadRequest(format!(
                "Simulated data '{}' not found. Run bootstrap simulation first.",
                input_file
            )),
            EncodingSource::Original => ApiError::BadRequest(format!("Source data '{}' not found.", input_file)),
        })?;

    let config = manager::generate_encoder_config(pool, store, study).await?;
    if config.column_map.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Question map '{}' not found. Generate the column map from the Simulation page first.",
            study.map_filename
        )));
    }

    let frame = Frame::from_csv_with_names(&text, &config.column_map.keys())?;
    let outcome = DataEncoder::new(frame, config).encode();

    let learned_definitions = manager::update_definition_configurations(pool, study.id, &outcome.learned_maps).await?;

    let encoded_file = study.encoded_filename();
    let codebook_file = study.codebook_filename();
    let csv = outcome.frame.to_csv_string()?;
    store
        .save_file(study.user_id, &study.project_code, &encoded_file, csv.as_bytes())
        .await?;
    store
        .save_file(
            study.user_id,
            &study.project_code,
            &codebook_file,
            outcome.codebook.to_json_pretty()?.as_bytes(),
        )
        .await?;

    AnalysisManager::reset(workspace, study).await?;

    if !outcome.warnings.is_empty() {
        warn!(
            study_id = study.id,
            columns = outcome.warnings.len(),
            "Encoding left unmapped values"
        );
    }
    info!(
        study_id = study.id,
        input = %input_file,
        rows = outcome.frame.n_rows(),
        columns = outcome.frame.n_cols(),
        "Encoding complete"
    );

    Ok(EncodingRun {
        input_file,
        encoded_file,
        codebook_file,
        rows: outcome.frame.n_rows(),
        columns: outcome.frame.n_cols(),
        warnings: outcome.warnings,
        skipped_columns: outcome.skipped_columns,
        learned_definitions,
    })
}

pub async fn results(store: &Workspace, study: &Study) -> ApiResult<EncodingResults> {
    let encoded_file = study.encoded_filename();
    let codebook_file = study.codebook_filename();
    let missing = || {
        ApiError::NotFound(format!(
            "Encoded results not found ('{}', '{}'). Run the encoding first.",
            encoded_file, codebook_file
        ))
    };
    let encoded_text = store
        .get_file(study.user_id, &study.project_code, &encoded_file)
        .await?
        .ok_or_else(missing)?;
    let codebook_text = store
        .get_file(study.user_id, &study.project_code, &codebook_file)
        .await?
        .ok_or_else(missing)?;

    let encoded = Frame::from_csv_str(&encoded_text)?;
    let codebook = Codebook::from_json(&codebook_text)?;
    let question_texts = encoded
        .column_names()
        .into_iter()
        .map(|name| {
            let text = codebook
                .get(&name)
                .map(|entry| entry.question_text.clone())
                .unwrap_or_else(|| name.clone());
            (name, text)
        })
        .collect();

    let original_preview = store
        .get_file(study.user_id, &study.project_code, &study.source_filename())
        .await?
        .and_then(|text| Frame::from_csv_str(&text).ok())
        .map(|frame| frame.to_table(ORIGINAL_PREVIEW_ROWS));

    let table = encoded.to_table(encoded.n_rows());
    Ok(EncodingResults {
        encoded_html: table.to_html(TABLE_CLASS),
        encoded: table,
        question_texts,
        original_preview,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::studies::tests::{seed_study, seed_user};
    use axum::http::StatusCode;
    use serde_json::json;
    use txdata_common::config::default_prototypes;
    use txdata_common::db::init_memory_database;

    const SOURCE: &str = "How satisfied are you?,Gender,Student?\n\
                          Agree,F,yes\n\
                          Strongly Agree,M,no\n\
                          Neutral,F,yes\n";

    struct Fixture {
        _dir: tempfile::TempDir,
        pool: SqlitePool,
        store: Workspace,
        workspace: Workspace,
        study: Study,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_database().await.unwrap();
        manager::seed_prototypes(&pool, &default_prototypes()).await.unwrap();
        let user = seed_user(&pool, "omar").await;
        let study = seed_study(&pool, user, "campus").await;
        let store = Workspace::new(dir.path().join("projects"));
        store
            .save_file(user, &study.project_code, &study.source_filename(), SOURCE.as_bytes())
            .await
            .unwrap();
        Fixture {
            workspace: Workspace::new(dir.path().join("workspaces")),
            _dir: dir,
            pool,
            store,
            study,
        }
    }

    async fn assign_all(f: &Fixture) {
        let page = assign_page(&f.pool, &f.store, f.study.clone()).await.unwrap();
        let ids: Vec<i64> = page.columns.iter().map(|c| c.id).collect();
        manager::apply_definition_to_columns(
            &f.pool,
            f.study.id,
            &ids[0..1],
            "Agreement",
            &json!({"map": {"Neutral": 3, "Agree": 4, "Strongly Agree": 5}, "is_reverse": false}),
            "5-Point Likert",
        )
        .await
        .unwrap();
        manager::apply_definition_to_columns(&f.pool, f.study.id, &ids[1..2], "Gender", &json!({}), "Nominal Categories")
            .await
            .unwrap();
        manager::apply_definition_to_columns(&f.pool, f.study.id, &ids[2..3], "YesNo", &json!({}), "Yes/No Binary")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_assign_page_initializes_columns() {
        let f = fixture().await;
        let page = assign_page(&f.pool, &f.store, f.study.clone()).await.unwrap();
        assert_eq!(page.columns.len(), 3);
        assert_eq!(page.columns[0].original_name, "How satisfied are you?");
        assert_eq!(page.column_map.keys(), vec!["q1", "q2", "q3"]);

        let page = definitions_page(&f.pool, &f.store, f.study.clone()).await.unwrap();
        assert!(!page.has_results);
        assert_eq!(page.prototypes.len(), 5);
        assert_eq!(page.preview.unwrap().rows.len(), 3);
    }

    #[tokio::test]
    async fn test_simulated_input_required() {
        let f = fixture().await;
        let err = run_encoding(&f.pool, &f.store, &f.workspace, &f.study, EncodingSource::Simulated)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "Invalid request: Simulated data 'simulated_campus.csv' not found. Run bootstrap simulation first."
        );
    }

    #[tokio::test]
    async fn test_missing_map_rejected() {
        let f = fixture().await;
        let err = run_encoding(&f.pool, &f.store, &f.workspace, &f.study, EncodingSource::Original)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_encode_original_and_read_results() {
        let f = fixture().await;
        assign_all(&f).await;

        let run = run_encoding(&f.pool, &f.store, &f.workspace, &f.study, EncodingSource::Original)
            .await
            .unwrap();
        assert_eq!(run.encoded_file, "campus_encoded.csv");
        assert_eq!(run.codebook_file, "campus_codebook.json");
        assert_eq!(run.rows, 3);
        assert!(run.warnings.is_empty());
        assert_eq!(run.learned_definitions, 1);

        let gender = encoders::find_definition_by_name(&f.pool, f.study.id, "Gender")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gender.configuration["value_map"], json!({"0": "F", "1": "M"}));

        let results = results(&f.store, &f.study).await.unwrap();
        assert_eq!(results.encoded.columns, vec!["q1", "q2", "q3"]);
        assert_eq!(results.encoded.rows[1], vec!["5", "1", "0"]);
        assert_eq!(
            results.question_texts.get("q1").map(String::as_str),
            Some("How satisfied are you?")
        );
        assert_eq!(results.original_preview.unwrap().rows.len(), 3);

        let page = definitions_page(&f.pool, &f.store, f.study.clone()).await.unwrap();
        assert!(page.has_results);
    }

    #[tokio::test]
    async fn test_reencoding_discards_analysis_working_copy() {
        let f = fixture().await;
        assign_all(&f).await;
        run_encoding(&f.pool, &f.store, &f.workspace, &f.study, EncodingSource::Original)
            .await
            .unwrap();

        let working = f.study.analysis_filename();
        f.workspace
            .save_file(f.study.user_id, &f.study.project_code, &working, b"q1,q2,q3\n9,9,9\n")
            .await
            .unwrap();

        run_encoding(&f.pool, &f.store, &f.workspace, &f.study, EncodingSource::Original)
            .await
            .unwrap();
        assert!(!f
            .workspace
            .exists(f.study.user_id, &f.study.project_code, &working)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_results_missing() {
        let f = fixture().await;
        let err = results(&f.store, &f.study).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
