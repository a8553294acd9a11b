use std::sync::Arc;

use mace_backend::config::Config;
use mace_backend::logging::init_tracing;
use mace_backend::{JsonFileStore, MaceError, MaceManager};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level);

    if let Err(err) = run(config).await {
        tracing::error!(error = %err, "mace-backend failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), MaceError> {
    let path = config
        .annotations_file
        .clone()
        .ok_or_else(|| MaceError::Config("MACE_ANNOTATIONS_FILE is not set".to_string()))?;

    let store = Arc::new(JsonFileStore::open(&path)?);
    let schemas = store.schemas();
    if schemas.is_empty() {
        tracing::warn!(path = %path.display(), "annotation export declares no schemas");
    }

    let manager = Arc::new(MaceManager::new(config.mace.clone(), schemas, store));
    let total = manager.count_total_annotations();
    tracing::info!(total_annotations = total, "annotations loaded");

    let ran = if config.mace.enabled {
        manager
            .spawn_check_and_run(total)
            .await
            .map_err(|e| MaceError::Config(format!("MACE task aborted: {e}")))?
    } else {
        tracing::info!("MACE_ENABLED is off, running once on demand");
        let manager = Arc::clone(&manager);
        tokio::task::spawn_blocking(move || manager.run_all_schemas())
            .await
            .map_err(|e| MaceError::Config(format!("MACE task aborted: {e}")))??;
        true
    };
    tracing::info!(ran, results = manager.result_keys().len(), "MACE pass finished");

    let summary = serde_json::to_string_pretty(&manager.get_results_summary())?;
    println!("{summary}");
    Ok(())
}
