//! Annotation store boundary.
//!
//! Raw annotation values are decided into [`AnnotationValue`] once, when they
//! enter the process; everything downstream matches on the closed set.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MaceError, Result};

/// label -> value, for one schema on one item
pub type LabelValues = BTreeMap<String, AnnotationValue>;
/// schema -> labels, for one item
pub type ItemAnnotations = BTreeMap<String, LabelValues>;
/// item -> schemas, for one user
pub type UserAnnotations = BTreeMap<String, ItemAnnotations>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum AnnotationValue {
    Boolean(bool),
    StringLabel(String),
    Missing,
}

impl AnnotationValue {
    /// Everything counts as selected except false, "false", "0", "" and missing
    pub fn is_selected(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::StringLabel(s) => !matches!(s.as_str(), "" | "false" | "0"),
            Self::Missing => false,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::StringLabel(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<Value> for AnnotationValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => {
                if n.as_f64() == Some(0.0) {
                    Self::Boolean(false)
                } else {
                    Self::StringLabel(n.to_string())
                }
            }
            Value::String(s) => Self::StringLabel(s),
            other => Self::StringLabel(other.to_string()),
        }
    }
}

impl From<AnnotationValue> for Value {
    fn from(value: AnnotationValue) -> Self {
        match value {
            AnnotationValue::Boolean(b) => Value::Bool(b),
            AnnotationValue::StringLabel(s) => Value::String(s),
            AnnotationValue::Missing => Value::Null,
        }
    }
}

impl From<bool> for AnnotationValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for AnnotationValue {
    fn from(value: &str) -> Self {
        Self::StringLabel(value.to_string())
    }
}

// ==================== Schemas ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Radio,
    Select,
    Likert,
    Multiselect,
}

impl SchemaKind {
    /// `None` for annotation types MACE cannot model (text, span, slider, ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "radio" => Some(Self::Radio),
            "select" => Some(Self::Select),
            "likert" => Some(Self::Likert),
            "multiselect" => Some(Self::Multiselect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDef {
    pub name: String,
    pub annotation_type: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl SchemaDef {
    pub fn new(name: &str, annotation_type: &str, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            annotation_type: annotation_type.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn kind(&self) -> Option<SchemaKind> {
        SchemaKind::parse(&self.annotation_type)
    }
}

// ==================== Store ====================

/// Read-only view of the per-user annotation records
pub trait AnnotationStore: Send + Sync {
    fn user_ids(&self) -> Vec<String>;

    /// `None` when the user is unknown to the store
    fn user_annotations(&self, user_id: &str) -> Option<UserAnnotations>;

    /// Count of (user, item, schema) records holding at least one value
    fn total_annotations(&self) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    users: RwLock<BTreeMap<String, UserAnnotations>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_users(users: BTreeMap<String, UserAnnotations>) -> Self {
        Self {
            users: RwLock::new(users),
        }
    }

    pub fn set(
        &self,
        user_id: &str,
        item_id: &str,
        schema: &str,
        label: &str,
        value: impl Into<AnnotationValue>,
    ) {
        self.users
            .write()
            .entry(user_id.to_string())
            .or_default()
            .entry(item_id.to_string())
            .or_default()
            .entry(schema.to_string())
            .or_default()
            .insert(label.to_string(), value.into());
    }
}

impl AnnotationStore for InMemoryStore {
    fn user_ids(&self) -> Vec<String> {
        self.users.read().keys().cloned().collect()
    }

    fn user_annotations(&self, user_id: &str) -> Option<UserAnnotations> {
        self.users.read().get(user_id).cloned()
    }

    fn total_annotations(&self) -> usize {
        self.users
            .read()
            .values()
            .flat_map(|items| items.values())
            .flat_map(|schemas| schemas.values())
            .filter(|labels| labels.values().any(|v| *v != AnnotationValue::Missing))
            .count()
    }
}

/// On-disk export: schema definitions plus user -> item -> schema -> label -> value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationExport {
    #[serde(default)]
    pub schemas: Vec<SchemaDef>,
    #[serde(default)]
    pub annotations: BTreeMap<String, UserAnnotations>,
}

impl AnnotationExport {
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| MaceError::io(path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Store backed by a JSON export file, read once at open
pub struct JsonFileStore {
    schemas: Vec<SchemaDef>,
    inner: InMemoryStore,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let export = AnnotationExport::read(&path)?;
        tracing::info!(
            path = %path.display(),
            users = export.annotations.len(),
            schemas = export.schemas.len(),
            "annotation export loaded"
        );
        Ok(Self {
            schemas: export.schemas,
            inner: InMemoryStore::from_users(export.annotations),
        })
    }

    pub fn schemas(&self) -> Vec<SchemaDef> {
        self.schemas.clone()
    }
}

impl AnnotationStore for JsonFileStore {
    fn user_ids(&self) -> Vec<String> {
        self.inner.user_ids()
    }

    fn user_annotations(&self, user_id: &str) -> Option<UserAnnotations> {
        self.inner.user_annotations(user_id)
    }

    fn total_annotations(&self) -> usize {
        self.inner.total_annotations()
    }
}
