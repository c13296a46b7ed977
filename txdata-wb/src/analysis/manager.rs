//! Session working copy of a study's encoded data
//!
//! The encoded CSV in the project store is copied into the session workspace
//! on first use. Composite variables and tampering modify that copy only;
//! `reset` throws it away.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};
use txdata_common::{Cell, Column, Frame, Table};

use super::{catalog, AnalysisRequest, AnalysisResult, AnalysisRun, Analyzer};
use crate::bootstrap::DataBootstrapper;
use crate::db::studies::Study;
use crate::encoding::manager::get_column_map;
use crate::encoding::Codebook;
use crate::error::{ApiError, ApiResult};
use crate::workspace::Workspace;

const CATEGORICAL_MAX_UNIQUE: usize = 10;

/// Variables offered by the analysis dashboard
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct VariableTypes {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
}

pub struct AnalysisManager<'a> {
    store: &'a Workspace,
    workspace: &'a Workspace,
    study: &'a Study,
    data: Frame,
    codebook: Codebook,
}

impl<'a> AnalysisManager<'a> {
    /// Load the working copy, seeding it from the encoded file when absent
    pub async fn load(store: &'a Workspace, workspace: &'a Workspace, study: &'a Study) -> ApiResult<Self> {
        let (user_id, code) = (study.user_id, study.project_code.as_str());
        let working = study.analysis_filename();

        let text = match workspace.get_file(user_id, code, &working).await? {
            Some(text) => text,
            None => {
                let text = store
                    .get_file(user_id, code, &study.encoded_filename())
                    .await?
                    .ok_or_else(|| {
                        ApiError::NotFound(
                            "Encoded data not found. Please generate the encoded file from the Encoding Workflow first."
                                .to_string(),
                        )
                    })?;
                workspace.save_file(user_id, code, &working, text.as_bytes()).await?;
                debug!(study_id = study.id, "Seeded analysis working copy");
                text
            }
        };
        let data = Frame::from_csv_str(&text)?;

        let codebook = match store.get_file(user_id, code, &study.codebook_filename()).await? {
            Some(text) => Codebook::from_json(&text).unwrap_or_else(|e| {
                warn!(study_id = study.id, "Codebook is invalid: {}", e);
                Codebook::new()
            }),
            None => Codebook::new(),
        };

        Ok(Self {
            store,
            workspace,
            study,
            data,
            codebook,
        })
    }

    /// Delete the session working copy; the next load starts from the encoded file
    pub async fn reset(workspace: &Workspace, study: &Study) -> ApiResult<bool> {
        let removed = workspace
            .delete_file(study.user_id, &study.project_code, &study.analysis_filename())
            .await?;
        info!(study_id = study.id, removed, "Reset analysis data");
        Ok(removed)
    }

    pub fn data(&self) -> &Frame {
        &self.data
    }

    pub fn codebook(&self) -> &Codebook {
        &self.codebook
    }

    pub fn variable_types(&self) -> VariableTypes {
        let mut types = VariableTypes::default();
        for column in self.data.columns() {
            let numeric = column.is_numeric();
            if numeric {
                types.numeric.push(column.name.clone());
            }
            if !numeric || column.n_unique() <= CATEGORICAL_MAX_UNIQUE {
                types.categorical.push(column.name.clone());
            }
        }
        types.numeric.sort();
        types.categorical.sort();
        types
    }

    /// First rows with coded values replaced by their codebook labels
    pub fn labeled_data(&self, max_rows: usize) -> Table {
        let head = self.data.head(max_rows);
        let mut table = Table::new(head.column_names());
        for row in 0..head.n_rows() {
            table.push_row(
                head.columns()
                    .iter()
                    .map(|c| {
                        let text = c.values[row].display();
                        self.codebook
                            .get(&c.name)
                            .and_then(|e| e.value_map.get(&text))
                            .cloned()
                            .unwrap_or(text)
                    })
                    .collect(),
            );
        }
        table
    }

    async fn persist(&self) -> ApiResult<()> {
        let text = self.data.to_csv_string()?;
        self.workspace
            .save_file(
                self.study.user_id,
                &self.study.project_code,
                &self.study.analysis_filename(),
                text.as_bytes(),
            )
            .await?;
        Ok(())
    }

    /// Add the row mean of `sources` as a new column; missing values are skipped
    pub async fn create_composite_variable(&mut self, name: &str, sources: &[String]) -> ApiResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::BadRequest("New variable name cannot be empty.".to_string()));
        }
        if self.data.has_column(name) {
            return Err(ApiError::BadRequest(format!("Variable '{}' already exists.", name)));
        }
        if sources.is_empty() {
            return Err(ApiError::BadRequest(
                "You must select at least one source variable.".to_string(),
            ));
        }
        let columns = sources
            .iter()
            .map(|source| match self.data.column(source) {
                Some(c) if c.is_numeric() => Ok(c.as_f64_vec()),
                _ => Err(ApiError::BadRequest(format!(
                    "Source variable '{}' must be numeric to be included in a composite score.",
                    source
                ))),
            })
            .collect::<ApiResult<Vec<_>>>()?;

        let means: Vec<Option<f64>> = (0..self.data.n_rows())
            .map(|row| {
                let present: Vec<f64> = columns.iter().filter_map(|c| c[row]).collect();
                crate::stats::mean(&present)
            })
            .collect();
        self.data.push_column(Column::from_numbers(name, &means))?;
        self.persist().await?;

        info!(study_id = self.study.id, variable = name, sources = sources.len(), "Created composite variable");
        Ok(format!("Successfully created composite variable '{}'.", name))
    }

    /// Overwrite `num_rows` distinct random rows of `column` with `new_value`
    ///
    /// Returns the affected row indices in ascending order.
    pub async fn run_data_tampering(
        &mut self,
        column: &str,
        new_value: &str,
        num_rows: usize,
        seed: Option<u64>,
    ) -> ApiResult<Vec<usize>> {
        let n_rows = self.data.n_rows();
        if num_rows < 1 || num_rows > n_rows {
            return Err(ApiError::BadRequest(format!(
                "Number of rows must be between 1 and {}.",
                n_rows
            )));
        }
        let target = self
            .data
            .column_mut(column)
            .ok_or_else(|| ApiError::BadRequest(format!("Column '{}' not found.", column)))?;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut rows = rand::seq::index::sample(&mut rng, n_rows, num_rows).into_vec();
        rows.sort_unstable();
        let value = Cell::parse(new_value);
        for &row in &rows {
            target.values[row] = value.clone();
        }
        self.persist().await?;

        warn!(
            study_id = self.study.id,
            column,
            rows = rows.len(),
            "Tampered with analysis data"
        );
        Ok(rows)
    }

    /// Run one analysis from the catalog
    pub async fn run(&self, run: &AnalysisRun) -> ApiResult<AnalysisResult> {
        let figure_title = run.figure_title.as_deref();
        let result = match &run.request {
            AnalysisRequest::ComparisonPlot { variable } => self.comparison_plot(variable, figure_title).await?,
            request => Analyzer::new(&self.data, &self.codebook)
                .with_figure_title(figure_title)
                .run(request)?,
        };
        debug!(study_id = self.study.id, title = %result.title, "Analysis complete");
        Ok(result)
    }

    async fn comparison_plot(&self, key: &str, figure_title: Option<&str>) -> ApiResult<AnalysisResult> {
        let (user_id, code) = (self.study.user_id, self.study.project_code.as_str());
        let source = self
            .store
            .require_file(user_id, code, &self.study.source_filename(), || {
                format!("Source data '{}' not found.", self.study.source_filename())
            })
            .await?;
        let simulated = self
            .store
            .require_file(user_id, code, &self.study.simulated_filename(), || {
                format!(
                    "Simulated data '{}' not found. Run bootstrap simulation first.",
                    self.study.simulated_filename()
                )
            })
            .await?;

        let map = get_column_map(self.store, self.study).await?;
        let bootstrapper = DataBootstrapper::new(&source, Some(map))?;
        let simulated = Frame::from_csv_with_names(&simulated, &bootstrapper.keys())?;
        Ok(catalog::comparison_plot(
            bootstrapper.data(),
            &simulated,
            key,
            bootstrapper.question_text(key),
            figure_title,
        )?)
    }
}
