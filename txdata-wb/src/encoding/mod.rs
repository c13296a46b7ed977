//! Survey encoding: configuration resolution and the data encoder
//!
//! A study's columns are assigned *definitions* (named configurations built
//! on a seeded *prototype*). [`manager`] resolves those assignments into an
//! [`EncoderConfig`]; [`encoder::DataEncoder`] applies it to a frame whose
//! columns are short keys and produces numeric codes plus a codebook.

pub mod encoder;
pub mod manager;
pub mod workflow;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use txdata_common::{OrderedMap, QuestionMap};

pub use encoder::{DataEncoder, EncodeOutcome};

/// Encoder kinds, declared in the order the encoder applies them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EncoderType {
    Likert,
    Ordinal,
    Binary,
    Nominal,
    NominalMulti,
}

impl EncoderType {
    /// Pass order used by the encoder
    pub const ALL: [EncoderType; 5] = [
        EncoderType::Likert,
        EncoderType::Ordinal,
        EncoderType::Binary,
        EncoderType::Nominal,
        EncoderType::NominalMulti,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EncoderType::Likert => "Likert",
            EncoderType::Ordinal => "Ordinal",
            EncoderType::Binary => "Binary",
            EncoderType::Nominal => "Nominal",
            EncoderType::NominalMulti => "NominalMulti",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for EncoderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved encoding plan: `{encoder_type: {column_key: configuration}}` plus the question map
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EncoderConfig {
    #[serde(flatten)]
    pub by_type: BTreeMap<EncoderType, OrderedMap<Value>>,
    pub column_map: QuestionMap,
}

impl EncoderConfig {
    pub fn new(column_map: QuestionMap) -> Self {
        Self {
            by_type: BTreeMap::new(),
            column_map,
        }
    }

    /// Add (or replace) a column's configuration under an encoder type
    pub fn insert(&mut self, encoder_type: EncoderType, column_key: &str, configuration: Value) {
        self.by_type
            .entry(encoder_type)
            .or_default()
            .insert(column_key, configuration);
    }

    pub fn columns_for(&self, encoder_type: EncoderType) -> Vec<(String, Value)> {
        self.by_type
            .get(&encoder_type)
            .map(|cols| cols.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.values().all(|cols| cols.is_empty())
    }
}

/// Codebook entry for one output column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodebookEntry {
    pub question_text: String,
    pub encoder_type: String,
    /// Code (as text) → label
    pub value_map: OrderedMap<String>,
}

/// Output column → codebook entry, in encoding order
pub type Codebook = OrderedMap<CodebookEntry>;

/// A column whose data held values the definition does not know
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingWarning {
    pub column_key: String,
    pub unmapped_values: Vec<String>,
}

/// Value maps discovered while encoding: column key → {code: category}
pub type LearnedMaps = OrderedMap<OrderedMap<String>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encoder_type_names() {
        for t in EncoderType::ALL {
            assert_eq!(EncoderType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EncoderType::parse("likert"), None);
    }

    #[test]
    fn test_config_serializes_grouped_by_type() {
        let mut config = EncoderConfig::new(QuestionMap::from_headers(&["Q".to_string()]));
        config.insert(EncoderType::Binary, "q1", json!({}));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value, json!({"Binary": {"q1": {}}, "column_map": {"q1": "Q"}}));
    }
}
