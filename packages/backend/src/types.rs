use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Separator between schema and option in a multiselect result key
pub const OPTION_KEY_SEPARATOR: &str = "::";

/// Key under which a schema (or one multiselect option) stores its result
pub fn result_key(schema_name: &str, option_name: Option<&str>) -> String {
    match option_name {
        Some(option) => format!("{schema_name}{OPTION_KEY_SEPARATOR}{option}"),
        None => schema_name.to_string(),
    }
}

/// Latest MACE output for one schema or multiselect option.
///
/// Field names are the on-disk cache format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaceResult {
    pub schema_name: String,
    pub competence_scores: BTreeMap<String, f64>,
    pub predicted_labels: BTreeMap<String, String>,
    pub label_entropy: BTreeMap<String, f64>,
    pub label_mapping: BTreeMap<usize, String>,
    pub num_annotators: usize,
    pub num_instances: usize,
    pub timestamp: String,
    pub log_likelihood: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_name: Option<String>,
}

impl MaceResult {
    pub fn key(&self) -> String {
        result_key(&self.schema_name, self.option_name.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerState {
    pub enabled: bool,
    pub trigger_every_n: usize,
    pub last_trigger_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub schema_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_name: Option<String>,
    pub num_annotators: usize,
    pub num_instances: usize,
    pub labels: Vec<String>,
    pub timestamp: String,
    pub log_likelihood: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub trigger: TriggerState,
    pub schemas: BTreeMap<String, SchemaSummary>,
    /// Mean competence per user across every result they appear in
    pub annotator_competence: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPrediction {
    pub label: String,
    pub entropy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaPredictions {
    pub key: String,
    pub predictions: BTreeMap<String, ItemPrediction>,
    pub label_mapping: BTreeMap<usize, String>,
}
