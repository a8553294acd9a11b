//! Mapping between per-user annotation records and the dense matrix the
//! algorithm consumes, and back again.

use std::collections::{BTreeMap, BTreeSet};

use mace_algo::{entropy, AnnotationMatrix, MaceFit};
use thiserror::Error;

use crate::store::{AnnotationStore, AnnotationValue, ItemAnnotations, SchemaDef};
use crate::types::MaceResult;

/// item -> annotator -> raw label
pub type SchemaAnnotations = BTreeMap<String, BTreeMap<String, String>>;

pub const SELECTED: &str = "1";
pub const NOT_SELECTED: &str = "0";

/// Active label of one user's record for `schema`.
///
/// With `option`, the record is read as a multiselect checkbox: `"1"` when
/// the option is selected, `"0"` when the schema was annotated without it.
pub fn extract_annotation(
    record: &ItemAnnotations,
    schema: &SchemaDef,
    option: Option<&str>,
) -> Option<String> {
    let values = record.get(&schema.name)?;

    if let Some(option) = option {
        if values.values().all(|v| *v == AnnotationValue::Missing) {
            return None;
        }
        let selected = values.get(option).map(|v| v.is_selected()).unwrap_or(false);
        return Some(if selected { SELECTED } else { NOT_SELECTED }.to_string());
    }

    let (key, value) = values.iter().find(|(_, v)| v.is_selected())?;
    match value.as_label() {
        Some(label) if schema.labels.iter().any(|l| l == label) => Some(label.to_string()),
        _ => Some(key.clone()),
    }
}

/// Gather one schema (or one multiselect option) across every user
pub fn collect_schema_annotations(
    store: &dyn AnnotationStore,
    schema: &SchemaDef,
    option: Option<&str>,
) -> SchemaAnnotations {
    let mut collected = SchemaAnnotations::new();

    for user_id in store.user_ids() {
        let Some(items) = store.user_annotations(&user_id) else {
            continue;
        };
        for (item_id, record) in &items {
            if let Some(label) = extract_annotation(record, schema, option) {
                collected
                    .entry(item_id.clone())
                    .or_default()
                    .insert(user_id.clone(), label);
            }
        }
    }

    collected
}

// ==================== Label Mapping ====================

/// Sorted bijection between label strings and dense indices
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelMapping {
    labels: Vec<String>,
}

impl LabelMapping {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        Self {
            labels: set.into_iter().collect(),
        }
    }

    pub fn binary() -> Self {
        Self::new([NOT_SELECTED, SELECTED])
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.binary_search_by(|l| l.as_str().cmp(label)).ok()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn to_map(&self) -> BTreeMap<usize, String> {
        self.labels.iter().cloned().enumerate().collect()
    }
}

// ==================== Matrix Build ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    /// Labels seen among eligible items
    Observed,
    /// Exactly {"0", "1"}
    Binary,
}

/// Why a schema or option is not run. Not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ineligible {
    #[error("only {found} distinct label value(s)")]
    TooFewLabels { found: usize },
    #[error("{eligible} eligible item(s), {required} required")]
    TooFewItems { eligible: usize, required: usize },
}

#[derive(Debug, Clone)]
pub struct MatrixBuild {
    pub matrix: AnnotationMatrix,
    pub items: Vec<String>,
    pub annotators: Vec<String>,
    pub labels: LabelMapping,
    /// Distinct label values actually voted on eligible items
    pub observed_labels: usize,
    /// Items dropped for having too few annotators
    pub skipped_items: usize,
}

/// Dense matrix over items with at least `min_annotations_per_item` annotators
pub fn build_matrix(
    annotations: &SchemaAnnotations,
    min_annotations_per_item: usize,
    vocabulary: Vocabulary,
) -> MatrixBuild {
    let eligible: Vec<(&String, &BTreeMap<String, String>)> = annotations
        .iter()
        .filter(|(_, votes)| votes.len() >= min_annotations_per_item)
        .collect();
    let skipped_items = annotations.len() - eligible.len();

    let observed = LabelMapping::new(
        eligible
            .iter()
            .flat_map(|(_, votes)| votes.values().map(String::as_str)),
    );
    let observed_labels = observed.len();
    let labels = match vocabulary {
        Vocabulary::Binary => LabelMapping::binary(),
        Vocabulary::Observed => observed,
    };
    let annotators: Vec<String> = eligible
        .iter()
        .flat_map(|(_, votes)| votes.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let items: Vec<String> = eligible.iter().map(|(item, _)| (*item).clone()).collect();

    let mut matrix = AnnotationMatrix::new(items.len(), annotators.len(), labels.len());
    for (i, (_, votes)) in eligible.iter().enumerate() {
        for (annotator, label) in votes.iter() {
            let (Ok(j), Some(k)) = (annotators.binary_search(annotator), labels.index_of(label))
            else {
                tracing::debug!(
                    annotator = %annotator,
                    label = %label,
                    "vote outside vocabulary dropped"
                );
                continue;
            };
            if let Err(err) = matrix.set(i, j, k) {
                tracing::debug!(error = %err, "vote rejected by matrix");
            }
        }
    }

    MatrixBuild {
        matrix,
        items,
        annotators,
        labels,
        observed_labels,
        skipped_items,
    }
}

impl MatrixBuild {
    /// Counts the values voted, not the vocabulary, so an option nobody
    /// ticked (or everybody ticked) is not run
    pub fn check_eligibility(&self, min_items: usize) -> Result<(), Ineligible> {
        if self.observed_labels < 2 {
            return Err(Ineligible::TooFewLabels {
                found: self.observed_labels,
            });
        }
        if self.items.is_empty() || self.items.len() < min_items {
            return Err(Ineligible::TooFewItems {
                eligible: self.items.len(),
                required: min_items.max(1),
            });
        }
        Ok(())
    }

    /// Map dense fit output back to item ids, annotator ids and label strings
    pub fn to_result(
        &self,
        fit: &MaceFit,
        schema_name: &str,
        option_name: Option<&str>,
    ) -> MaceResult {
        let entropies = entropy(&fit.marginals);

        let competence_scores = self
            .annotators
            .iter()
            .cloned()
            .zip(fit.competence.iter().copied())
            .collect();

        let mut predicted_labels = BTreeMap::new();
        let mut label_entropy = BTreeMap::new();
        for (idx, item) in self.items.iter().enumerate() {
            if let Some(label) = fit
                .predicted_labels
                .get(idx)
                .and_then(|&k| self.labels.label(k))
            {
                predicted_labels.insert(item.clone(), label.to_string());
            }
            if let Some(&h) = entropies.get(idx) {
                label_entropy.insert(item.clone(), h);
            }
        }

        MaceResult {
            schema_name: schema_name.to_string(),
            competence_scores,
            predicted_labels,
            label_entropy,
            label_mapping: self.labels.to_map(),
            num_annotators: self.annotators.len(),
            num_instances: self.items.len(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            log_likelihood: fit.log_likelihood,
            option_name: option_name.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, LabelValues};

    fn record(schema: &str, values: &[(&str, AnnotationValue)]) -> ItemAnnotations {
        let labels: LabelValues = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        ItemAnnotations::from([(schema.to_string(), labels)])
    }

    fn votes(rows: &[(&str, &[(&str, &str)])]) -> SchemaAnnotations {
        rows.iter()
            .map(|(item, v)| {
                (
                    item.to_string(),
                    v.iter().map(|(u, l)| (u.to_string(), l.to_string())).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn categorical_extraction_returns_active_label() {
        let schema = SchemaDef::new("sentiment", "radio", &["neg", "neu", "pos"]);
        let rec = record(
            "sentiment",
            &[("neg", false.into()), ("pos", true.into())],
        );
        assert_eq!(extract_annotation(&rec, &schema, None), Some("pos".to_string()));

        // value naming a declared label wins over the key
        let rec = record("sentiment", &[("selection", "neu".into())]);
        assert_eq!(extract_annotation(&rec, &schema, None), Some("neu".to_string()));

        let rec = record("sentiment", &[("pos", "0".into()), ("neg", "".into())]);
        assert_eq!(extract_annotation(&rec, &schema, None), None);

        let other = record("topic", &[("x", true.into())]);
        assert_eq!(extract_annotation(&other, &schema, None), None);
    }

    #[test]
    fn multiselect_extraction_is_binary() {
        let schema = SchemaDef::new("topics", "multiselect", &["a", "b", "c"]);
        let rec = record("topics", &[("a", true.into()), ("b", "false".into())]);

        assert_eq!(extract_annotation(&rec, &schema, Some("a")), Some("1".to_string()));
        assert_eq!(extract_annotation(&rec, &schema, Some("b")), Some("0".to_string()));
        assert_eq!(extract_annotation(&rec, &schema, Some("c")), Some("0".to_string()));

        let untouched = record("other", &[("a", true.into())]);
        assert_eq!(extract_annotation(&untouched, &schema, Some("a")), None);

        let blank = record("topics", &[("a", AnnotationValue::Missing)]);
        assert_eq!(extract_annotation(&blank, &schema, Some("a")), None);
    }

    #[test]
    fn collect_groups_by_item_then_user() {
        let store = InMemoryStore::new();
        store.set("u1", "i1", "s", "x", true);
        store.set("u2", "i1", "s", "y", true);
        store.set("u2", "i2", "s", "x", true);
        let schema = SchemaDef::new("s", "radio", &["x", "y"]);

        let collected = collect_schema_annotations(&store, &schema, None);
        assert_eq!(collected.len(), 2);
        assert_eq!(collected["i1"]["u1"], "x");
        assert_eq!(collected["i1"]["u2"], "y");
        assert_eq!(collected["i2"].len(), 1);
    }

    #[test]
    fn label_mapping_is_sorted_bijection() {
        let mapping = LabelMapping::new(["pos", "neg", "neu", "neg"]);
        assert_eq!(mapping.labels(), &["neg", "neu", "pos"]);
        assert_eq!(mapping.index_of("neu"), Some(1));
        assert_eq!(mapping.label(2), Some("pos"));
        assert_eq!(mapping.index_of("missing"), None);
        assert_eq!(mapping.to_map()[&0], "neg");
    }

    #[test]
    fn build_matrix_filters_items_below_floor() {
        let annotations = votes(&[
            ("i1", &[("u1", "a"), ("u2", "a"), ("u3", "b")]),
            ("i2", &[("u1", "b"), ("u2", "b")]),
            ("i3", &[("u4", "c")]),
        ]);

        let build = build_matrix(&annotations, 2, Vocabulary::Observed);
        assert_eq!(build.items, vec!["i1", "i2"]);
        assert_eq!(build.annotators, vec!["u1", "u2", "u3"]);
        assert_eq!(build.labels.labels(), &["a", "b"]);
        assert_eq!(build.skipped_items, 1);
        assert_eq!(build.matrix.get(0, 2), Some(1));
        assert_eq!(build.matrix.get(1, 2), None);
        assert_eq!(build.matrix.observation_count(), 5);
    }

    #[test]
    fn binary_vocabulary_is_forced() {
        let annotations = votes(&[
            ("i1", &[("u1", "1"), ("u2", "1")]),
            ("i2", &[("u1", "0"), ("u2", "1")]),
        ]);
        let build = build_matrix(&annotations, 1, Vocabulary::Binary);
        assert_eq!(build.labels.labels(), &["0", "1"]);
        assert_eq!(build.observed_labels, 2);
        assert!(build.check_eligibility(1).is_ok());
    }

    #[test]
    fn unticked_option_is_ineligible() {
        let annotations = votes(&[
            ("i1", &[("u1", "0"), ("u2", "0")]),
            ("i2", &[("u1", "0"), ("u2", "0")]),
        ]);
        let build = build_matrix(&annotations, 1, Vocabulary::Binary);
        assert_eq!(build.labels.labels(), &["0", "1"]);
        assert_eq!(
            build.check_eligibility(1),
            Err(Ineligible::TooFewLabels { found: 1 })
        );
    }

    #[test]
    fn eligibility_guard() {
        let one_label = votes(&[("i1", &[("u1", "a"), ("u2", "a")])]);
        let build = build_matrix(&one_label, 1, Vocabulary::Observed);
        assert_eq!(
            build.check_eligibility(1),
            Err(Ineligible::TooFewLabels { found: 1 })
        );

        let two_items = votes(&[
            ("i1", &[("u1", "a"), ("u2", "b")]),
            ("i2", &[("u1", "a"), ("u2", "a")]),
        ]);
        let build = build_matrix(&two_items, 2, Vocabulary::Observed);
        assert_eq!(
            build.check_eligibility(3),
            Err(Ineligible::TooFewItems { eligible: 2, required: 3 })
        );
        assert!(build.check_eligibility(2).is_ok());
    }

    #[test]
    fn to_result_maps_indices_back() {
        let annotations = votes(&[
            ("i1", &[("u1", "pos"), ("u2", "pos")]),
            ("i2", &[("u1", "neg"), ("u2", "neg")]),
        ]);
        let build = build_matrix(&annotations, 2, Vocabulary::Observed);
        let fit = MaceFit {
            predicted_labels: vec![1, 0],
            competence: vec![0.9, 0.8],
            marginals: vec![vec![0.1, 0.9], vec![1.0, 0.0]],
            log_likelihood: -2.0,
            best_restart: 0,
        };

        let result = build.to_result(&fit, "sentiment", None);
        assert_eq!(result.predicted_labels["i1"], "pos");
        assert_eq!(result.predicted_labels["i2"], "neg");
        assert_eq!(result.competence_scores["u2"], 0.8);
        assert!(result.label_entropy["i1"] > result.label_entropy["i2"]);
        assert_eq!(result.num_instances, 2);
        assert_eq!(result.num_annotators, 2);
        assert_eq!(result.key(), "sentiment");
    }
}
