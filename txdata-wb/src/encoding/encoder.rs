//! DataEncoder: turns raw survey answers into numeric codes
//!
//! Operates on a frame whose columns are already named with short keys.
//! Passes run in a fixed order: Likert, Ordinal, Binary, Nominal,
//! NominalMulti. Each pass writes codebook entries; mapping passes report
//! values the definition does not know; Nominal columns without a stored
//! value map are factorized and the discovered map is returned for
//! persistence.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use txdata_common::frame::format_number;
use txdata_common::{Cell, Column, Frame, OrderedMap};

use super::{Codebook, CodebookEntry, EncoderConfig, EncoderType, EncodingWarning, LearnedMaps};

const DEFAULT_POSITIVE_VALUES: [&str; 4] = ["yes", "true", "1", "y"];

const LIKERT_CONFIG_ERROR: &str =
    "Configuration Error: Likert definition for this column is missing a valid 'map' object.";

/// Result of an encoding run
#[derive(Debug, Clone)]
pub struct EncodeOutcome {
    pub frame: Frame,
    pub codebook: Codebook,
    pub warnings: Vec<EncodingWarning>,
    pub learned_maps: LearnedMaps,
    /// Configured keys absent from the input frame
    pub skipped_columns: Vec<String>,
}

/// Collapse whitespace runs, trim and lowercase
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lowercased ASCII alphanumerics of a category, used in dummy column names
pub fn sanitize_category(category: &str) -> String {
    category
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn value_as_code(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_as_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct DataEncoder {
    frame: Frame,
    config: EncoderConfig,
    codebook: Codebook,
    warnings: Vec<EncodingWarning>,
    learned_maps: LearnedMaps,
    skipped: Vec<String>,
}

impl DataEncoder {
    pub fn new(frame: Frame, config: EncoderConfig) -> Self {
        Self {
            frame,
            config,
            codebook: Codebook::new(),
            warnings: Vec::new(),
            learned_maps: LearnedMaps::new(),
            skipped: Vec::new(),
        }
    }

    /// Run every pass and return the encoded frame and its metadata
    pub fn encode(mut self) -> EncodeOutcome {
        debug!(
            rows = self.frame.n_rows(),
            cols = self.frame.n_cols(),
            "Starting encoding"
        );

        for encoder_type in EncoderType::ALL {
            for (key, configuration) in self.config.columns_for(encoder_type) {
                if !self.frame.has_column(&key) {
                    warn!("Column key '{}' not found in the input data. Skipping.", key);
                    if !self.skipped.contains(&key) {
                        self.skipped.push(key);
                    }
                    continue;
                }
                match encoder_type {
                    EncoderType::Likert => self.encode_likert(&key, &configuration),
                    EncoderType::Ordinal => self.encode_ordinal(&key, &configuration),
                    EncoderType::Binary => self.encode_binary(&key, &configuration),
                    EncoderType::Nominal => self.encode_nominal(&key, &configuration),
                    EncoderType::NominalMulti => self.encode_nominal_multi(&key, &configuration),
                }
            }
        }

        debug!(
            warnings = self.warnings.len(),
            learned = self.learned_maps.len(),
            "Encoding complete"
        );

        EncodeOutcome {
            frame: self.frame,
            codebook: self.codebook,
            warnings: self.warnings,
            learned_maps: self.learned_maps,
            skipped_columns: self.skipped,
        }
    }

    fn question_text(&self, key: &str) -> String {
        self.config
            .column_map
            .get(key)
            .cloned()
            .unwrap_or_else(|| "N/A".to_string())
    }

    /// Map values through `definition` (label → code), matching on normalized text
    ///
    /// Unknown values become missing and are reported once per column with
    /// their original spellings, sorted.
    fn smart_map(&mut self, key: &str, definition: &[(String, f64)], codebook_type: &str) {
        let normalized: HashMap<String, f64> = definition
            .iter()
            .map(|(label, code)| (normalize_text(label), *code))
            .collect();

        let Some(column) = self.frame.column_mut(key) else {
            return;
        };

        let mut unmapped: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for cell in column.values.iter_mut() {
            let Some(text) = cell.as_text() else {
                continue;
            };
            match normalized.get(&normalize_text(&text)) {
                Some(code) => *cell = Cell::Number(*code),
                None => {
                    if seen.insert(text.clone()) {
                        unmapped.push(text);
                    }
                    *cell = Cell::Missing;
                }
            }
        }

        if !unmapped.is_empty() {
            unmapped.sort();
            self.warnings.push(EncodingWarning {
                column_key: key.to_string(),
                unmapped_values: unmapped,
            });
        }

        let mut value_map = OrderedMap::new();
        for (label, code) in definition {
            value_map.insert(format_number(*code), label.clone());
        }
        self.codebook.insert(
            key,
            CodebookEntry {
                question_text: self.question_text(key),
                encoder_type: codebook_type.to_string(),
                value_map,
            },
        );
    }

    fn encode_likert(&mut self, key: &str, configuration: &Value) {
        let entries: Option<Vec<(String, f64)>> = configuration
            .get("map")
            .and_then(Value::as_object)
            .filter(|m| !m.is_empty())
            .and_then(|m| {
                m.iter()
                    .map(|(label, code)| value_as_code(code).map(|c| (label.clone(), c)))
                    .collect()
            });

        let Some(mut entries) = entries else {
            warn!("Likert configuration for '{}' is missing a valid 'map' object. Skipping.", key);
            self.warnings.push(EncodingWarning {
                column_key: key.to_string(),
                unmapped_values: vec![LIKERT_CONFIG_ERROR.to_string()],
            });
            return;
        };

        let is_reverse = configuration
            .get("is_reverse")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if is_reverse {
            let min = entries.iter().map(|(_, c)| *c).fold(f64::INFINITY, f64::min);
            let max = entries.iter().map(|(_, c)| *c).fold(f64::NEG_INFINITY, f64::max);
            for (_, code) in entries.iter_mut() {
                *code = min + max - *code;
            }
        }

        self.smart_map(key, &entries, "Likert");
    }

    fn encode_ordinal(&mut self, key: &str, configuration: &Value) {
        let order: Vec<(String, f64)> = configuration
            .get("order")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (value_as_label(v), i as f64))
                    .collect()
            })
            .unwrap_or_default();

        self.smart_map(key, &order, "Ordinal");
    }

    fn encode_binary(&mut self, key: &str, configuration: &Value) {
        let positives: HashSet<String> = match configuration
            .get("positive_values")
            .and_then(Value::as_array)
        {
            Some(values) if !values.is_empty() => values
                .iter()
                .map(|v| normalize_text(&value_as_label(v)))
                .collect(),
            _ => DEFAULT_POSITIVE_VALUES.iter().map(|s| s.to_string()).collect(),
        };

        if let Some(column) = self.frame.column_mut(key) {
            for cell in column.values.iter_mut() {
                if let Some(text) = cell.as_text() {
                    let code = if positives.contains(&normalize_text(&text)) { 1.0 } else { 0.0 };
                    *cell = Cell::Number(code);
                }
            }
        }

        let mut value_map = OrderedMap::new();
        value_map.insert("0", "No/False".to_string());
        value_map.insert("1", "Yes/True".to_string());
        self.codebook.insert(
            key,
            CodebookEntry {
                question_text: self.question_text(key),
                encoder_type: "Binary".to_string(),
                value_map,
            },
        );
    }

    fn encode_nominal(&mut self, key: &str, configuration: &Value) {
        let stored: Option<Vec<(String, f64)>> = configuration
            .get("value_map")
            .and_then(Value::as_object)
            .filter(|m| !m.is_empty())
            .map(|m| {
                m.iter()
                    .filter_map(|(code, label)| {
                        code.trim().parse::<f64>().ok().map(|c| (value_as_label(label), c))
                    })
                    .collect()
            });

        if let Some(mut definition) = stored {
            definition.sort_by(|a, b| a.1.total_cmp(&b.1));
            self.smart_map(key, &definition, "Nominal (Factorized)");
            return;
        }

        let Some(column) = self.frame.column_mut(key) else {
            return;
        };

        let mut codes: HashMap<String, f64> = HashMap::new();
        let mut learned = OrderedMap::new();
        for cell in column.values.iter_mut() {
            let Some(text) = cell.as_text() else {
                continue;
            };
            let next = codes.len() as f64;
            let code = *codes.entry(text.clone()).or_insert_with(|| {
                learned.insert(format_number(next), text.clone());
                next
            });
            *cell = Cell::Number(code);
        }

        self.codebook.insert(
            key,
            CodebookEntry {
                question_text: self.question_text(key),
                encoder_type: "Nominal (Factorized)".to_string(),
                value_map: learned.clone(),
            },
        );
        self.learned_maps.insert(key, learned);
    }

    fn encode_nominal_multi(&mut self, key: &str, configuration: &Value) {
        let categories: Vec<String> = configuration
            .get("categories")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(value_as_label).collect())
            .unwrap_or_default();
        if categories.is_empty() {
            return;
        }

        let Some(source) = self.frame.remove_column(key) else {
            return;
        };

        let selections: Vec<HashSet<String>> = source
            .values
            .iter()
            .map(|cell| {
                cell.as_text()
                    .map(|text| {
                        text.split(',')
                            .map(normalize_text)
                            .filter(|t| !t.is_empty())
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();

        let original_question = self
            .config
            .column_map
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string());

        for category in &categories {
            let wanted = normalize_text(category);
            let name = format!("{}_{}", key, sanitize_category(category));
            let values = selections
                .iter()
                .map(|picked| Cell::Number(if picked.contains(&wanted) { 1.0 } else { 0.0 }))
                .collect();

            self.frame.remove_column(&name);
            // Lengths match the source column, so the push cannot fail.
            if let Err(e) = self.frame.push_column(Column::new(name.clone(), values)) {
                warn!("Could not add dummy column '{}': {}", name, e);
                continue;
            }

            let mut value_map = OrderedMap::new();
            value_map.insert("0", "Not Present".to_string());
            value_map.insert("1", "Present".to_string());
            self.codebook.insert(
                name,
                CodebookEntry {
                    question_text: format!("{} (Category: {})", original_question, category),
                    encoder_type: "Binary (from Multi-Select)".to_string(),
                    value_map,
                },
            );
        }
    }
}
