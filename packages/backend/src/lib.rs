//! Multi-Annotator Competence Estimation for an annotation backend.
//!
//! [`manager::MaceManager`] decides when to recompute, pulls annotations from
//! an [`store::AnnotationStore`], runs `mace-algo` per schema and keeps the
//! latest results in memory and on disk.

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod manager;
pub mod query;
pub mod store;
pub mod types;

pub use config::{Config, MaceConfig};
pub use error::{MaceError, Result};
pub use manager::MaceManager;
pub use store::{AnnotationStore, AnnotationValue, InMemoryStore, JsonFileStore, SchemaDef};
pub use types::{MaceResult, ResultsSummary};
