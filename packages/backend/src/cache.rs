use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{MaceError, Result};
use crate::types::MaceResult;

pub const CACHE_FILE_NAME: &str = "mace_results.json";

/// result key -> latest result
pub type ResultTable = BTreeMap<String, MaceResult>;

/// Durable JSON copy of the result table.
///
/// Single writer: callers serialize saves through the manager's run lock.
#[derive(Debug, Clone)]
pub struct ResultCache {
    path: PathBuf,
}

impl ResultCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CACHE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, results: &ResultTable) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MaceError::io(parent, e))?;
        }

        let payload = serde_json::to_string_pretty(results)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, payload).map_err(|e| MaceError::io(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| MaceError::io(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), results = results.len(), "MACE cache saved");
        Ok(())
    }

    /// `Ok(None)` when no cache exists yet; `Err` when it exists but is unreadable
    pub fn load(&self) -> Result<Option<ResultTable>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MaceError::io(&self.path, e)),
        };
        let table: ResultTable = serde_json::from_str(&contents)?;
        Ok(Some(table))
    }
}
