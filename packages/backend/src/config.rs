use std::path::PathBuf;

use mace_algo::{
    MaceOptions, DEFAULT_ALPHA, DEFAULT_BETA, DEFAULT_NUM_ITERS, DEFAULT_NUM_RESTARTS,
    DEFAULT_SEED,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub annotations_file: Option<PathBuf>,
    pub mace: MaceConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let annotations_file = std::env::var("MACE_ANNOTATIONS_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Self {
            log_level,
            annotations_file,
            mace: MaceConfig::from_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaceConfig {
    pub enabled: bool,
    /// New annotations required before a recompute; 0 disables the trigger
    pub trigger_every_n: usize,
    pub min_annotations_per_item: usize,
    pub min_items: usize,
    pub num_restarts: usize,
    pub num_iters: usize,
    pub alpha: f64,
    pub beta: f64,
    pub seed: u64,
    pub parallel_restarts: bool,
    pub output_dir: PathBuf,
    pub cache_results: bool,
}

impl Default for MaceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_every_n: 10,
            min_annotations_per_item: 3,
            min_items: 5,
            num_restarts: DEFAULT_NUM_RESTARTS,
            num_iters: DEFAULT_NUM_ITERS,
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            seed: DEFAULT_SEED,
            parallel_restarts: false,
            output_dir: PathBuf::from("annotation_output/mace"),
            cache_results: true,
        }
    }
}

impl MaceConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MACE_ENABLED") {
            config.enabled = parse_flag(&val).unwrap_or(false);
        }
        if let Some(val) = env_parse("MACE_TRIGGER_EVERY_N") {
            config.trigger_every_n = val;
        }
        if let Some(val) = env_parse::<usize>("MACE_MIN_ANNOTATIONS_PER_ITEM") {
            config.min_annotations_per_item = val.max(1);
        }
        if let Some(val) = env_parse("MACE_MIN_ITEMS") {
            config.min_items = val;
        }
        if let Some(val) = env_parse::<usize>("MACE_NUM_RESTARTS") {
            config.num_restarts = val.clamp(1, 100);
        }
        if let Some(val) = env_parse::<usize>("MACE_NUM_ITERS") {
            config.num_iters = val.clamp(1, 1000);
        }
        if let Some(val) = env_parse::<f64>("MACE_ALPHA").filter(|v| *v > 0.0) {
            config.alpha = val;
        }
        if let Some(val) = env_parse::<f64>("MACE_BETA").filter(|v| *v > 0.0) {
            config.beta = val;
        }
        if let Some(val) = env_parse("MACE_SEED") {
            config.seed = val;
        }
        if let Ok(val) = std::env::var("MACE_PARALLEL_RESTARTS") {
            config.parallel_restarts = parse_flag(&val).unwrap_or(false);
        }
        if let Ok(val) = std::env::var("MACE_OUTPUT_DIR") {
            if !val.trim().is_empty() {
                config.output_dir = PathBuf::from(val);
            }
        }
        if let Ok(val) = std::env::var("MACE_CACHE_RESULTS") {
            config.cache_results = parse_flag(&val).unwrap_or(true);
        }

        config
    }

    pub fn algorithm_options(&self) -> MaceOptions {
        MaceOptions {
            num_restarts: self.num_restarts,
            num_iters: self.num_iters,
            alpha: self.alpha,
            beta: self.beta,
            seed: self.seed,
            parallel: self.parallel_restarts,
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.output_dir.join(crate::cache::CACHE_FILE_NAME)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
