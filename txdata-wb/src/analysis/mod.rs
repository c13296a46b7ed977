//! Statistical analysis over a study's encoded data
//!
//! [`manager::AnalysisManager`] owns the session working copy of the data;
//! [`catalog::Analyzer`] runs one requested analysis over a frame and its
//! codebook.

pub mod catalog;
pub mod manager;

use serde::{Deserialize, Serialize};
use txdata_common::frame::Table;

pub use catalog::Analyzer;
pub use manager::{AnalysisManager, VariableTypes};

/// CSS classes of rendered result tables
pub const TABLE_CLASS: &str = "table table-sm table-striped";

/// A titled secondary table (contingency table, model summary, ...)
#[derive(Debug, Clone, Serialize)]
pub struct ExtraTable {
    pub title: String,
    pub table: Table,
    pub html: String,
}

/// Output of one analysis
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub title: String,
    pub stats_table: Table,
    pub stats_table_html: String,
    /// SVG chart as a data URI
    pub plot: Option<String>,
    pub interpretation: String,
    pub extra_tables: Vec<ExtraTable>,
}

impl AnalysisResult {
    pub fn new(title: impl Into<String>, stats_table: Table, interpretation: impl Into<String>) -> Self {
        let stats_table_html = stats_table.to_html(TABLE_CLASS);
        Self {
            title: title.into(),
            stats_table,
            stats_table_html,
            plot: None,
            interpretation: interpretation.into(),
            extra_tables: Vec::new(),
        }
    }

    /// Attach an SVG chart (stored as a data URI)
    pub fn with_plot(mut self, svg: &str) -> Self {
        self.plot = Some(crate::charts::to_data_uri(svg));
        self
    }

    pub fn with_extra(mut self, title: impl Into<String>, table: Table) -> Self {
        let html = table.to_html(TABLE_CLASS);
        self.extra_tables.push(ExtraTable {
            title: title.into(),
            table,
            html,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotType {
    #[default]
    Bar,
    Pie,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarOrientation {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieStyle {
    #[default]
    Pie,
    Donut,
}

fn default_popmean() -> f64 {
    3.0
}

/// One analysis from the catalog, tagged by `analysis_type`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "analysis_type", rename_all = "snake_case")]
pub enum AnalysisRequest {
    Descriptive {
        variable: String,
    },
    CategoricalDescriptive {
        variable: String,
        #[serde(default)]
        plot_type: PlotType,
        #[serde(default)]
        bar_orientation: BarOrientation,
        #[serde(default)]
        pie_style: PieStyle,
    },
    OrdinalAnalysis {
        variable: String,
    },
    MultiDescriptive {
        variables: Vec<String>,
    },
    DescriptiveRanking {
        variables: Vec<String>,
    },
    /// `variable` is the source key whose `<key>_*` dummy columns are counted
    MultiCategoryDescriptive {
        variable: String,
    },
    ComparativeMultiCategory {
        variable: String,
        group: String,
    },
    Correlation {
        var1: String,
        var2: String,
    },
    BivariateCorrelation {
        x_vars: Vec<String>,
        y_var: String,
    },
    CorrelationMatrix {
        row_vars: Vec<String>,
        col_vars: Vec<String>,
    },
    OneSampleTtest {
        variable: String,
        #[serde(default = "default_popmean")]
        popmean: f64,
    },
    Ttest {
        continuous: String,
        group: String,
    },
    Anova {
        dependent: String,
        independent: String,
    },
    Chi2 {
        var1: String,
        var2: String,
    },
    CronbachAlpha {
        variables: Vec<String>,
    },
    LinearRegression {
        x_vars: Vec<String>,
        y_var: String,
    },
    LikertDistribution {
        variables: Vec<String>,
    },
    ComparisonPlot {
        variable: String,
    },
}

/// Request body for running an analysis
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRun {
    #[serde(flatten)]
    pub request: AnalysisRequest,
    /// Overrides the default chart title
    #[serde(default)]
    pub figure_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tags() {
        let run: AnalysisRun = serde_json::from_str(
            r#"{"analysis_type": "one_sample_ttest", "variable": "q1", "figure_title": "T"}"#,
        )
        .unwrap();
        assert_eq!(
            run.request,
            AnalysisRequest::OneSampleTtest {
                variable: "q1".to_string(),
                popmean: 3.0
            }
        );
        assert_eq!(run.figure_title.as_deref(), Some("T"));

        let run: AnalysisRun = serde_json::from_str(
            r#"{"analysis_type": "categorical_descriptive", "variable": "q2", "plot_type": "pie", "pie_style": "donut"}"#,
        )
        .unwrap();
        assert!(matches!(
            run.request,
            AnalysisRequest::CategoricalDescriptive {
                plot_type: PlotType::Pie,
                pie_style: PieStyle::Donut,
                bar_orientation: BarOrientation::Horizontal,
                ..
            }
        ));

        assert!(serde_json::from_str::<AnalysisRun>(r#"{"analysis_type": "chi2", "var1": "a", "var2": "b"}"#).is_ok());
        assert!(serde_json::from_str::<AnalysisRun>(r#"{"analysis_type": "nope"}"#).is_err());
    }
}
