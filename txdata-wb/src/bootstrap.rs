//! Bootstrap simulation of survey data
//!
//! The source CSV is loaded with its columns renamed to the short keys of
//! the question map, then resampled with replacement. Three methods:
//!
//! - standard: whole rows are drawn
//! - remix: a contiguous block of keys is drawn independently of the rest
//! - deep remix: every column is drawn independently
//!
//! A fixed seed makes every method reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, info};
use txdata_common::{Error, Frame, QuestionMap, Result};

use crate::charts;

/// Resampling method selected by the caller
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BootstrapMethod {
    Standard,
    Remix { start_key: String, end_key: String },
    DeepRemix,
}

pub struct DataBootstrapper {
    column_map: QuestionMap,
    map_generated: bool,
    data: Frame,
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn draw(rng: &mut StdRng, rows: usize, n: usize) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..rows)).collect()
}

impl DataBootstrapper {
    /// Load source CSV text, generating a question map when none is stored
    pub fn new(csv_text: &str, stored_map: Option<QuestionMap>) -> Result<Self> {
        let mut data = Frame::from_csv_str(csv_text)?;
        let headers = data.column_names();

        let (column_map, map_generated) = match stored_map {
            Some(map) if !map.is_empty() => (map, false),
            _ => {
                info!(columns = headers.len(), "Generating question map from headers");
                (QuestionMap::from_headers(&headers), true)
            }
        };

        if column_map.values() == headers {
            let positional = column_map
                .keys()
                .into_iter()
                .zip(&headers)
                .map(|(key, header)| (header.clone(), key))
                .collect();
            data.rename_columns(&positional);
        } else {
            debug!("Headers differ from question map order; renaming by question text");
            data.rename_columns(&column_map.reversed());
            let mapped: Vec<String> = column_map
                .keys()
                .into_iter()
                .filter(|key| data.has_column(key))
                .collect();
            data = data.select(&mapped)?;
        }

        Ok(Self {
            column_map,
            map_generated,
            data,
        })
    }

    pub fn column_map(&self) -> &QuestionMap {
        &self.column_map
    }

    /// True when the map was generated here and still needs persisting
    pub fn map_generated(&self) -> bool {
        self.map_generated
    }

    pub fn keys(&self) -> Vec<String> {
        self.column_map.keys()
    }

    /// Source data with key-named columns
    pub fn data(&self) -> &Frame {
        &self.data
    }

    pub fn question_text<'a>(&'a self, key: &'a str) -> &'a str {
        self.column_map.question_text(key)
    }

    fn check_request(&self, n: usize) -> Result<()> {
        if n < 1 {
            return Err(Error::InvalidInput(
                "Number of samples must be at least 1.".to_string(),
            ));
        }
        if self.data.n_rows() == 0 {
            return Err(Error::InvalidInput(
                "Source data has no rows to resample.".to_string(),
            ));
        }
        Ok(())
    }

    pub fn run(&self, method: &BootstrapMethod, n: usize, seed: Option<u64>) -> Result<Frame> {
        match method {
            BootstrapMethod::Standard => self.bootstrap(n, seed),
            BootstrapMethod::Remix { start_key, end_key } => self.bootstrap_remix(n, start_key, end_key, seed),
            BootstrapMethod::DeepRemix => self.bootstrap_deep_remix(n, seed),
        }
    }

    /// `n` whole rows drawn with replacement
    pub fn bootstrap(&self, n: usize, seed: Option<u64>) -> Result<Frame> {
        self.check_request(n)?;
        let mut rng = rng_for(seed);
        let indices = draw(&mut rng, self.data.n_rows(), n);
        info!(n, "Standard bootstrap complete");
        Ok(self.data.take_rows(&indices))
    }

    /// Resample keys `start..=end` (map order) independently of the other columns
    pub fn bootstrap_remix(&self, n: usize, start_key: &str, end_key: &str, seed: Option<u64>) -> Result<Frame> {
        self.check_request(n)?;
        let position = |key: &str| {
            self.column_map
                .position(key)
                .ok_or_else(|| Error::InvalidInput(format!("Column key '{}' not found in the question map.", key)))
        };
        let start = position(start_key)?;
        let end = position(end_key)?;
        if start > end {
            return Err(Error::InvalidInput(
                "Start column must come before end column.".to_string(),
            ));
        }

        let remix_keys: Vec<String> = self.column_map.keys()[start..=end].to_vec();
        let mut rng = rng_for(seed);
        let remix_rows = draw(&mut rng, self.data.n_rows(), n);
        let fixed_rows = draw(&mut rng, self.data.n_rows(), n);

        let remixed = self.data.take_rows(&remix_rows);
        let fixed = self.data.take_rows(&fixed_rows);
        let columns = self
            .column_map
            .keys()
            .iter()
            .filter_map(|key| {
                let source = if remix_keys.contains(key) { &remixed } else { &fixed };
                source.column(key).cloned()
            })
            .collect();

        info!(n, start_key, end_key, "Remix bootstrap complete");
        Frame::from_columns(columns)
    }

    /// Every column drawn independently
    pub fn bootstrap_deep_remix(&self, n: usize, seed: Option<u64>) -> Result<Frame> {
        self.check_request(n)?;
        let mut rng = rng_for(seed);
        let rows = self.data.n_rows();
        let columns = self
            .data
            .columns()
            .iter()
            .map(|column| {
                let indices = draw(&mut rng, rows, n);
                let values = indices.iter().map(|i| column.values[*i].clone()).collect();
                txdata_common::Column::new(column.name.clone(), values)
            })
            .collect();

        info!(n, "Deep remix bootstrap complete");
        Frame::from_columns(columns)
    }

    /// Keys whose original and simulated distributions are plotted after a run
    pub fn plotted_keys(&self, method: &BootstrapMethod) -> Vec<String> {
        let keys = self.keys();
        match method {
            BootstrapMethod::Remix { start_key, .. } => match self.column_map.position(start_key) {
                Some(0) => vec![start_key.clone()],
                Some(pos) => vec![keys[pos - 1].clone(), start_key.clone()],
                None => Vec::new(),
            },
            _ => keys.into_iter().take(2).collect(),
        }
    }

    /// KDE of original vs simulated values as SVG; `None` for non-numeric columns
    pub fn plot_comparison(&self, simulated: &Frame, key: &str) -> Result<Option<String>> {
        let original = self
            .data
            .column(key)
            .ok_or_else(|| Error::NotFound(format!("Column key '{}' not found in the source data.", key)))?;
        let Some(simulated) = simulated.column(key) else {
            return Err(Error::NotFound(format!(
                "Column key '{}' not found in the simulated data.",
                key
            )));
        };
        if !original.is_numeric() || !simulated.is_numeric() {
            debug!(key, "Skipping comparison plot for non-numeric column");
            return Ok(None);
        }

        let title = format!("Distribution Comparison: {}", self.question_text(key));
        let svg = charts::kde_comparison(
            &[
                ("Original".to_string(), original.numeric_values()),
                ("Simulated".to_string(), simulated.numeric_values()),
            ],
            &title,
            key,
        );
        Ok(Some(svg))
    }
}

/// File name of a stored comparison plot
pub fn comparison_plot_filename(key: &str) -> String {
    format!("comparison_{}.svg", key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Age,Gender,Score,Rating\n20,F,1,a\n30,M,2,b\n40,F,3,c\n50,M,4,d\n";

    fn bootstrapper() -> DataBootstrapper {
        DataBootstrapper::new(CSV, None).unwrap()
    }

    #[test]
    fn test_generated_map_and_rename() {
        let b = bootstrapper();
        assert!(b.map_generated());
        assert_eq!(b.keys(), vec!["q1", "q2", "q3", "q4"]);
        assert_eq!(b.data().column_names(), vec!["q1", "q2", "q3", "q4"]);
        assert_eq!(b.question_text("q2"), "Gender");
        assert_eq!(b.question_text("q9"), "q9");
    }

    #[test]
    fn test_stored_map_renames_by_text_when_order_differs() {
        let mut map = QuestionMap::new();
        map.insert("q2", "Gender".to_string());
        map.insert("q1", "Age".to_string());
        map.insert("q3", "Score".to_string());
        map.insert("q4", "Rating".to_string());
        let b = DataBootstrapper::new(CSV, Some(map)).unwrap();
        assert!(!b.map_generated());
        assert_eq!(b.data().column("q1").unwrap().values[0].as_f64(), Some(20.0));
        assert_eq!(b.data().column("q2").unwrap().values[0].as_text().as_deref(), Some("F"));
        assert_eq!(b.data().column_names(), vec!["q2", "q1", "q3", "q4"]);
    }

    #[test]
    fn test_simulated_columns_follow_map_order() {
        let mut map = QuestionMap::new();
        map.insert("q2", "Gender".to_string());
        map.insert("q1", "Age".to_string());
        map.insert("q3", "Score".to_string());
        map.insert("q4", "Rating".to_string());
        let b = DataBootstrapper::new(CSV, Some(map)).unwrap();

        let expected = vec!["q2", "q1", "q3", "q4"];
        assert_eq!(b.bootstrap_remix(8, "q1", "q3", Some(4)).unwrap().column_names(), expected);
        assert_eq!(b.bootstrap(8, Some(4)).unwrap().column_names(), expected);
        assert_eq!(b.bootstrap_deep_remix(8, Some(4)).unwrap().column_names(), expected);
    }

    #[test]
    fn test_seeded_bootstrap_is_reproducible() {
        let b = bootstrapper();
        let first = b.bootstrap(25, Some(7)).unwrap();
        let second = b.bootstrap(25, Some(7)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.n_rows(), 25);

        // Whole rows are kept together.
        let ages = first.column("q1").unwrap().as_f64_vec();
        let scores = first.column("q3").unwrap().as_f64_vec();
        for (age, score) in ages.iter().zip(&scores) {
            assert_eq!(age.unwrap() / 10.0 - 1.0, score.unwrap());
        }
    }

    #[test]
    fn test_remix_validation_and_column_order() {
        let b = bootstrapper();
        let remixed = b.bootstrap_remix(10, "q2", "q3", Some(1)).unwrap();
        assert_eq!(remixed.column_names(), vec!["q1", "q2", "q3", "q4"]);
        assert_eq!(remixed.n_rows(), 10);

        let err = b.bootstrap_remix(10, "q3", "q2", Some(1)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: Start column must come before end column.");
        let err = b.bootstrap_remix(10, "q1", "q7", Some(1)).unwrap_err();
        assert!(err.to_string().contains("q7"));
    }

    #[test]
    fn test_deep_remix_and_sample_count() {
        let b = bootstrapper();
        let deep = b.bootstrap_deep_remix(50, Some(3)).unwrap();
        assert_eq!(deep.n_rows(), 50);
        assert!(b.bootstrap(0, None).is_err());
    }

    #[test]
    fn test_empty_source_rejected() {
        let b = DataBootstrapper::new("Age,Gender\n", None).unwrap();
        assert!(b.bootstrap(5, Some(1)).is_err());
    }

    #[test]
    fn test_plotted_keys() {
        let b = bootstrapper();
        assert_eq!(b.plotted_keys(&BootstrapMethod::Standard), vec!["q1", "q2"]);
        assert_eq!(b.plotted_keys(&BootstrapMethod::DeepRemix), vec!["q1", "q2"]);
        let remix = BootstrapMethod::Remix {
            start_key: "q3".to_string(),
            end_key: "q4".to_string(),
        };
        assert_eq!(b.plotted_keys(&remix), vec!["q2", "q3"]);
        let from_first = BootstrapMethod::Remix {
            start_key: "q1".to_string(),
            end_key: "q2".to_string(),
        };
        assert_eq!(b.plotted_keys(&from_first), vec!["q1"]);
    }

    #[test]
    fn test_plot_comparison_skips_text_columns() {
        let b = bootstrapper();
        let sim = b.bootstrap(20, Some(2)).unwrap();
        assert!(b.plot_comparison(&sim, "q1").unwrap().unwrap().contains("Simulated"));
        assert!(b.plot_comparison(&sim, "q2").unwrap().is_none());
        assert!(b.plot_comparison(&sim, "q9").is_err());
    }

    #[test]
    fn test_method_deserializes_from_tag() {
        let m: BootstrapMethod =
            serde_json::from_str(r#"{"method": "remix", "start_key": "q1", "end_key": "q2"}"#).unwrap();
        assert!(matches!(m, BootstrapMethod::Remix { .. }));
        let m: BootstrapMethod = serde_json::from_str(r#"{"method": "deep_remix"}"#).unwrap();
        assert_eq!(m, BootstrapMethod::DeepRemix);
    }
}
