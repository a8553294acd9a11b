//! Common Types and Constants
//!
//! Shared data structures used by the MACE engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==================== Constants ====================

/// Sentinel marking a cell with no annotation
pub const MISSING: i32 = -1;

/// Numerical stability epsilon
pub const EPSILON: f64 = 1e-10;

/// Default Beta prior on the knowing/guessing pseudo-counts
pub const DEFAULT_ALPHA: f64 = 0.5;

/// Default Dirichlet prior on the guessing distribution
pub const DEFAULT_BETA: f64 = 0.5;

/// Default number of random restarts
pub const DEFAULT_NUM_RESTARTS: usize = 10;

/// Default number of EM iterations per restart
pub const DEFAULT_NUM_ITERS: usize = 50;

/// Default restart seed
pub const DEFAULT_SEED: u64 = 42;

// ==================== Errors ====================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MaceError {
    #[error("at least 2 labels are required, got {0}")]
    TooFewLabels(usize),

    #[error("annotation matrix has no instances")]
    NoInstances,

    #[error("annotation matrix has no annotators")]
    NoAnnotators,

    #[error("matrix has {actual} cells, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("label {label} at ({instance}, {annotator}) is outside 0..{num_labels}")]
    LabelOutOfRange {
        instance: usize,
        annotator: usize,
        label: i32,
        num_labels: usize,
    },
}

// ==================== Annotation Matrix ====================

/// Instances × annotators vote matrix, row-major.
///
/// Each cell holds a dense label index in `0..num_labels` or [`MISSING`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotationMatrix {
    num_instances: usize,
    num_annotators: usize,
    num_labels: usize,
    cells: Vec<i32>,
}

impl AnnotationMatrix {
    /// Create an all-missing matrix
    pub fn new(num_instances: usize, num_annotators: usize, num_labels: usize) -> Self {
        Self {
            num_instances,
            num_annotators,
            num_labels,
            cells: vec![MISSING; num_instances * num_annotators],
        }
    }

    /// Build from rows of raw cells; every non-missing cell must be a valid label
    pub fn from_rows(rows: &[Vec<i32>], num_labels: usize) -> Result<Self, MaceError> {
        let num_instances = rows.len();
        let num_annotators = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut matrix = Self::new(num_instances, num_annotators, num_labels);

        for (i, row) in rows.iter().enumerate() {
            if row.len() != num_annotators {
                return Err(MaceError::ShapeMismatch {
                    expected: num_instances * num_annotators,
                    actual: rows.iter().map(|r| r.len()).sum(),
                });
            }
            for (j, &cell) in row.iter().enumerate() {
                if cell == MISSING {
                    continue;
                }
                if cell < 0 || cell as usize >= num_labels {
                    return Err(MaceError::LabelOutOfRange {
                        instance: i,
                        annotator: j,
                        label: cell,
                        num_labels,
                    });
                }
                matrix.cells[i * num_annotators + j] = cell;
            }
        }

        Ok(matrix)
    }

    pub fn num_instances(&self) -> usize {
        self.num_instances
    }

    pub fn num_annotators(&self) -> usize {
        self.num_annotators
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Label given by `annotator` to `instance`, if any
    pub fn get(&self, instance: usize, annotator: usize) -> Option<usize> {
        let cell = *self.cells.get(instance * self.num_annotators + annotator)?;
        if cell == MISSING {
            None
        } else {
            usize::try_from(cell).ok()
        }
    }

    /// Record a vote. Out-of-range coordinates or labels are rejected.
    pub fn set(&mut self, instance: usize, annotator: usize, label: usize) -> Result<(), MaceError> {
        if label >= self.num_labels {
            return Err(MaceError::LabelOutOfRange {
                instance,
                annotator,
                label: label as i32,
                num_labels: self.num_labels,
            });
        }
        if instance >= self.num_instances || annotator >= self.num_annotators {
            return Err(MaceError::ShapeMismatch {
                expected: self.cells.len(),
                actual: instance * self.num_annotators + annotator + 1,
            });
        }
        self.cells[instance * self.num_annotators + annotator] = label as i32;
        Ok(())
    }

    /// Number of non-missing cells
    pub fn observation_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c != MISSING).count()
    }

    /// Reject shapes the engine cannot fit
    pub fn validate(&self) -> Result<(), MaceError> {
        if self.num_labels < 2 {
            return Err(MaceError::TooFewLabels(self.num_labels));
        }
        if self.num_instances == 0 {
            return Err(MaceError::NoInstances);
        }
        if self.num_annotators == 0 {
            return Err(MaceError::NoAnnotators);
        }
        if self.cells.len() != self.num_instances * self.num_annotators {
            return Err(MaceError::ShapeMismatch {
                expected: self.num_instances * self.num_annotators,
                actual: self.cells.len(),
            });
        }
        // Deserialized matrices bypass `set`, so cell values are checked here too
        if let Some((idx, &label)) = self
            .cells
            .iter()
            .enumerate()
            .find(|(_, cell)| {
                let c = **cell;
                c != MISSING && (c < 0 || c as usize >= self.num_labels)
            })
        {
            return Err(MaceError::LabelOutOfRange {
                instance: idx / self.num_annotators,
                annotator: idx % self.num_annotators,
                label,
                num_labels: self.num_labels,
            });
        }
        Ok(())
    }
}

// ==================== Engine Types ====================

/// MACE configuration options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaceOptions {
    /// Independent random initializations
    pub num_restarts: usize,
    /// EM iterations per restart
    pub num_iters: usize,
    /// Beta prior pseudo-count for knowing/guessing
    pub alpha: f64,
    /// Dirichlet prior pseudo-count for theta
    pub beta: f64,
    /// Base seed; restart r uses `seed + r`
    pub seed: u64,
    /// Run restarts on the rayon pool
    pub parallel: bool,
}

impl Default for MaceOptions {
    fn default() -> Self {
        Self {
            num_restarts: DEFAULT_NUM_RESTARTS,
            num_iters: DEFAULT_NUM_ITERS,
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            seed: DEFAULT_SEED,
            parallel: false,
        }
    }
}

/// Per-annotator variational pseudo-counts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariationalParameters {
    /// `[knowing, guessing]` per annotator
    pub spamming: Vec<[f64; 2]>,
    /// Guessing distribution pseudo-counts, `num_labels` per annotator
    pub theta: Vec<Vec<f64>>,
}

/// Output of one restart
#[derive(Clone, Debug, PartialEq)]
pub struct RestartOutcome {
    pub marginals: Vec<Vec<f64>>,
    pub params: VariationalParameters,
    pub log_likelihood: f64,
}

/// Result of a full fit (best restart)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaceFit {
    /// Argmax label per instance
    pub predicted_labels: Vec<usize>,
    /// Normalized knowing mass per annotator, in [0, 1]
    pub competence: Vec<f64>,
    /// Posterior over the true label, one row per instance
    pub marginals: Vec<Vec<f64>>,
    /// Log-likelihood of the winning restart
    pub log_likelihood: f64,
    /// Index of the winning restart
    pub best_restart: usize,
}
