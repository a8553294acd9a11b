//! Read-only views over the latest MACE results.
//!
//! Every query takes a short read lock and returns owned data.

use std::collections::BTreeMap;

use crate::manager::MaceManager;
use crate::types::{ItemPrediction, MaceResult, ResultsSummary, SchemaPredictions, SchemaSummary};

impl MaceManager {
    /// result key -> competence, for every result the user appears in
    pub fn get_competence(&self, user_id: &str) -> BTreeMap<String, f64> {
        self.state
            .read()
            .results
            .iter()
            .filter_map(|(key, result)| {
                result
                    .competence_scores
                    .get(user_id)
                    .map(|&score| (key.clone(), score))
            })
            .collect()
    }

    pub fn get_prediction(&self, item_id: &str, result_key: &str) -> Option<String> {
        self.state
            .read()
            .results
            .get(result_key)
            .and_then(|result| result.predicted_labels.get(item_id).cloned())
    }

    pub fn get_result(&self, result_key: &str) -> Option<MaceResult> {
        self.state.read().results.get(result_key).cloned()
    }

    pub fn result_keys(&self) -> Vec<String> {
        self.state.read().results.keys().cloned().collect()
    }

    pub fn get_results_summary(&self) -> ResultsSummary {
        let trigger = self.trigger_state();
        let state = self.state.read();

        let schemas = state
            .results
            .iter()
            .map(|(key, result)| {
                let summary = SchemaSummary {
                    schema_name: result.schema_name.clone(),
                    option_name: result.option_name.clone(),
                    num_annotators: result.num_annotators,
                    num_instances: result.num_instances,
                    labels: result.label_mapping.values().cloned().collect(),
                    timestamp: result.timestamp.clone(),
                    log_likelihood: result.log_likelihood,
                };
                (key.clone(), summary)
            })
            .collect();

        let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for result in state.results.values() {
            for (user, &score) in &result.competence_scores {
                let entry = totals.entry(user.clone()).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }
        let annotator_competence = totals
            .into_iter()
            .map(|(user, (sum, n))| (user, sum / n as f64))
            .collect();

        ResultsSummary {
            trigger,
            schemas,
            annotator_competence,
        }
    }

    /// Predictions with entropy for one result key, optionally narrowed to one item.
    ///
    /// `None` when the key has no result.
    pub fn get_predictions_for_schema(
        &self,
        result_key: &str,
        item_id: Option<&str>,
    ) -> Option<SchemaPredictions> {
        let state = self.state.read();
        let result = state.results.get(result_key)?;

        let predictions = result
            .predicted_labels
            .iter()
            .filter(|(item, _)| item_id.map_or(true, |wanted| wanted == item.as_str()))
            .map(|(item, label)| {
                let prediction = ItemPrediction {
                    label: label.clone(),
                    entropy: result.label_entropy.get(item).copied().unwrap_or(0.0),
                };
                (item.clone(), prediction)
            })
            .collect();

        Some(SchemaPredictions {
            key: result_key.to_string(),
            predictions,
            label_mapping: result.label_mapping.clone(),
        })
    }

    /// Records in the store holding at least one value; drives the trigger
    pub fn count_total_annotations(&self) -> usize {
        self.store().total_annotations()
    }
}
