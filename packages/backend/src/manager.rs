//! MACE orchestration: when to recompute, what to compute, where results go.
//!
//! One computation at a time. The run lock is held for the whole computation;
//! the state lock only for reads and the final merge, so queries never wait
//! on EM iterations.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use mace_algo::Mace;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{ResultCache, ResultTable};
use crate::config::MaceConfig;
use crate::error::Result;
use crate::extract::{build_matrix, collect_schema_annotations, Vocabulary};
use crate::store::{AnnotationStore, SchemaDef, SchemaKind};
use crate::types::{result_key, MaceResult, TriggerState};

#[derive(Debug, Default)]
pub(crate) struct ManagerState {
    pub(crate) results: ResultTable,
    pub(crate) last_trigger_count: usize,
}

pub struct MaceManager {
    config: MaceConfig,
    schemas: Vec<SchemaDef>,
    store: Arc<dyn AnnotationStore>,
    cache: Option<ResultCache>,
    engine: Mace,
    run_lock: Mutex<()>,
    pub(crate) state: RwLock<ManagerState>,
}

impl MaceManager {
    /// Build the manager and reload any cached results
    pub fn new(
        config: MaceConfig,
        schemas: Vec<SchemaDef>,
        store: Arc<dyn AnnotationStore>,
    ) -> Self {
        let cache = config
            .cache_results
            .then(|| ResultCache::new(config.cache_path()));
        let results = cache.as_ref().map(load_cached).unwrap_or_default();
        let engine = Mace::new(config.algorithm_options());

        info!(
            enabled = config.enabled,
            trigger_every_n = config.trigger_every_n,
            schemas = schemas.len(),
            cached_results = results.len(),
            "MACE manager initialized"
        );

        Self {
            config,
            schemas,
            store,
            cache,
            engine,
            run_lock: Mutex::new(()),
            state: RwLock::new(ManagerState {
                results,
                last_trigger_count: 0,
            }),
        }
    }

    pub fn config(&self) -> &MaceConfig {
        &self.config
    }

    pub fn schemas(&self) -> &[SchemaDef] {
        &self.schemas
    }

    pub(crate) fn store(&self) -> &dyn AnnotationStore {
        self.store.as_ref()
    }

    pub fn trigger_state(&self) -> TriggerState {
        TriggerState {
            enabled: self.config.enabled,
            trigger_every_n: self.config.trigger_every_n,
            last_trigger_count: self.state.read().last_trigger_count,
        }
    }

    // ==================== Trigger ====================

    /// Recompute once `trigger_every_n` new annotations have accumulated.
    ///
    /// Returns whether a run completed. Never fails: errors are logged and
    /// reported as `false`. Also `false` while another run is in flight.
    pub fn check_and_run(&self, total_annotations: usize) -> bool {
        if !self.config.enabled || self.config.trigger_every_n == 0 {
            return false;
        }

        let Some(_running) = self.run_lock.try_lock() else {
            debug!(total_annotations, "MACE run already in progress, trigger skipped");
            return false;
        };

        {
            let mut state = self.state.write();
            let pending = total_annotations.saturating_sub(state.last_trigger_count);
            if pending < self.config.trigger_every_n {
                return false;
            }
            // Advanced before running so a failing run cannot hot-loop
            state.last_trigger_count = total_annotations;
        }

        info!(total_annotations, "MACE trigger crossed, recomputing");
        match self.run_all_locked() {
            Ok(results) => {
                info!(results = results.len(), "MACE triggered run finished");
                true
            }
            Err(err) => {
                warn!(error = %err, "MACE triggered run failed");
                false
            }
        }
    }

    /// [`check_and_run`](Self::check_and_run) against the store's own count
    pub fn check_and_run_from_store(&self) -> bool {
        self.check_and_run(self.count_total_annotations())
    }

    /// Run the trigger on the blocking pool so the caller never waits on EM
    pub fn spawn_check_and_run(
        self: &Arc<Self>,
        total_annotations: usize,
    ) -> tokio::task::JoinHandle<bool> {
        let manager = Arc::clone(self);
        tokio::task::spawn_blocking(move || manager.check_and_run(total_annotations))
    }

    // ==================== Runs ====================

    /// Run every eligible schema and option, merge into the table, flush the cache.
    ///
    /// Returns only the results produced by this run.
    pub fn run_all_schemas(&self) -> Result<ResultTable> {
        let _running = self.run_lock.lock();
        self.run_all_locked()
    }

    fn run_all_locked(&self) -> Result<ResultTable> {
        let started = Instant::now();
        let mut fresh = ResultTable::new();

        for schema in &self.schemas {
            let Some(kind) = schema.kind() else {
                debug!(
                    schema = %schema.name,
                    annotation_type = %schema.annotation_type,
                    "annotation type not supported by MACE, skipped"
                );
                continue;
            };

            match kind {
                SchemaKind::Multiselect => {
                    for option in self.multiselect_options(schema) {
                        self.run_problem_logged(schema, Some(&option), &mut fresh);
                    }
                }
                SchemaKind::Radio | SchemaKind::Select | SchemaKind::Likert => {
                    self.run_problem_logged(schema, None, &mut fresh);
                }
            }
        }

        let snapshot = {
            let mut state = self.state.write();
            state
                .results
                .extend(fresh.iter().map(|(k, v)| (k.clone(), v.clone())));
            state.results.clone()
        };

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.save(&snapshot) {
                warn!(error = %err, path = %cache.path().display(), "failed to write MACE cache");
            }
        }

        info!(
            results = fresh.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "MACE run complete"
        );
        Ok(fresh)
    }

    fn run_problem_logged(&self, schema: &SchemaDef, option: Option<&str>, out: &mut ResultTable) {
        let key = result_key(&schema.name, option);
        match self.run_problem(schema, option) {
            Ok(Some(result)) => {
                debug!(
                    key = %key,
                    instances = result.num_instances,
                    annotators = result.num_annotators,
                    log_likelihood = result.log_likelihood,
                    "MACE result computed"
                );
                out.insert(key, result);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(key = %key, error = %err, "MACE run failed for schema, omitted");
            }
        }
    }

    /// `Ok(None)` when the schema or option is not eligible
    fn run_problem(&self, schema: &SchemaDef, option: Option<&str>) -> Result<Option<MaceResult>> {
        let annotations = collect_schema_annotations(self.store(), schema, option);
        let vocabulary = if option.is_some() {
            Vocabulary::Binary
        } else {
            Vocabulary::Observed
        };
        let build = build_matrix(&annotations, self.config.min_annotations_per_item, vocabulary);

        if let Err(reason) = build.check_eligibility(self.config.min_items) {
            debug!(
                key = %result_key(&schema.name, option),
                reason = %reason,
                skipped_items = build.skipped_items,
                "not eligible for MACE"
            );
            return Ok(None);
        }

        let fit = self.engine.fit(&build.matrix)?;
        Ok(Some(build.to_result(&fit, &schema.name, option)))
    }

    /// Declared options, or every option key seen in the store when none are declared
    fn multiselect_options(&self, schema: &SchemaDef) -> Vec<String> {
        if !schema.labels.is_empty() {
            return schema.labels.clone();
        }

        let mut seen = BTreeSet::new();
        for user_id in self.store.user_ids() {
            let Some(items) = self.store.user_annotations(&user_id) else {
                continue;
            };
            for record in items.values() {
                if let Some(values) = record.get(&schema.name) {
                    seen.extend(values.keys().cloned());
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Drop every in-memory result and reset the trigger counter
    pub fn clear_results(&self) {
        let _running = self.run_lock.lock();
        let mut state = self.state.write();
        state.results.clear();
        state.last_trigger_count = 0;
    }
}

fn load_cached(cache: &ResultCache) -> ResultTable {
    match cache.load() {
        Ok(Some(table)) => {
            info!(path = %cache.path().display(), results = table.len(), "MACE cache loaded");
            table
        }
        Ok(None) => {
            debug!(path = %cache.path().display(), "no MACE cache, cold start");
            ResultTable::new()
        }
        Err(err) => {
            warn!(path = %cache.path().display(), error = %err, "MACE cache unreadable, cold start");
            ResultTable::new()
        }
    }
}
