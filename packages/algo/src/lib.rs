//! # mace-algo - Multi-Annotator Competence Estimation
//!
//! Pure Rust implementation of MACE: variational-Bayes EM that infers, from a
//! sparse matrix of noisy annotator votes,
//!
//! - a posterior distribution over each instance's true label
//! - a competence score in [0, 1] per annotator
//!
//! ## Design
//!
//! - **Pure** - no knowledge of schemas, user ids or storage
//! - **Deterministic** - a fixed seed governs restart initialization only
//! - **Parallel restarts** - restarts are independent and can run on rayon
//!
//! ## Modules
//!
//! - [`mace`] - EM engine, restarts, entropy
//! - [`sanitize`] - digamma, log-sum-exp, probability clipping
//! - [`types`] - matrix, options, results and constants
//!
//! ## Example
//!
//! ```rust
//! use mace_algo::{AnnotationMatrix, Mace, MaceOptions, MISSING};
//!
//! let matrix = AnnotationMatrix::from_rows(
//!     &[vec![0, 0, 1], vec![1, 1, 1], vec![0, MISSING, 0]],
//!     2,
//! )
//! .unwrap();
//! let fit = Mace::new(MaceOptions::default()).fit(&matrix).unwrap();
//! assert_eq!(fit.predicted_labels, vec![0, 1, 0]);
//! ```

pub mod mace;
pub mod sanitize;
pub mod types;

pub use mace::{entropy, Mace};
pub use types::*;
