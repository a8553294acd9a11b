//! Property-Based Tests for the MACE engine
//!
//! Invariants for every valid matrix (num_labels >= 2, annotators >= 1):
//! - Output shapes match the matrix
//! - Competence stays in [0, 1]
//! - Every marginal row sums to 1
//! - Log-likelihood and entropy are finite
//! - Same seed, same answer

use proptest::prelude::*;

use mace_algo::{entropy, AnnotationMatrix, Mace, MaceOptions, MISSING};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_matrix() -> impl Strategy<Value = AnnotationMatrix> {
    (1usize..=12, 1usize..=6, 2usize..=5).prop_flat_map(|(instances, annotators, labels)| {
        let cell = prop_oneof![
            1 => Just(MISSING),
            3 => (0..labels as i32),
        ];
        proptest::collection::vec(
            proptest::collection::vec(cell, annotators),
            instances,
        )
        .prop_map(move |rows| {
            AnnotationMatrix::from_rows(&rows, labels).expect("generated cells are in range")
        })
    })
}

fn fast_options(seed: u64) -> MaceOptions {
    MaceOptions {
        num_restarts: 3,
        num_iters: 8,
        seed,
        ..Default::default()
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fit_outputs_are_well_formed(matrix in arb_matrix(), seed in 0u64..1000) {
        let fit = Mace::new(fast_options(seed)).fit(&matrix).unwrap();

        prop_assert_eq!(fit.predicted_labels.len(), matrix.num_instances());
        prop_assert_eq!(fit.competence.len(), matrix.num_annotators());
        prop_assert!(fit.log_likelihood.is_finite());

        for &label in &fit.predicted_labels {
            prop_assert!(label < matrix.num_labels());
        }
        for &c in &fit.competence {
            prop_assert!((0.0..=1.0).contains(&c));
        }
        for row in &fit.marginals {
            let sum: f64 = row.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-6, "row sums to {}", sum);
        }
        for h in entropy(&fit.marginals) {
            prop_assert!(h.is_finite() && h >= 0.0);
        }
    }

    #[test]
    fn fit_is_deterministic(matrix in arb_matrix(), seed in 0u64..1000) {
        let engine = Mace::new(fast_options(seed));
        let a = engine.fit(&matrix).unwrap();
        let b = engine.fit(&matrix).unwrap();

        prop_assert_eq!(a.predicted_labels, b.predicted_labels);
        prop_assert_eq!(a.competence, b.competence);
        prop_assert_eq!(a.log_likelihood.to_bits(), b.log_likelihood.to_bits());
    }

    #[test]
    fn unanimous_votes_are_recovered(
        truth in proptest::collection::vec(0usize..3, 4..10),
        annotators in 2usize..5,
    ) {
        let rows: Vec<Vec<i32>> = truth
            .iter()
            .map(|&t| vec![t as i32; annotators])
            .collect();
        let matrix = AnnotationMatrix::from_rows(&rows, 3).unwrap();
        let fit = Mace::new(MaceOptions {
            num_restarts: 5,
            num_iters: 30,
            ..Default::default()
        })
        .fit(&matrix)
        .unwrap();

        prop_assert_eq!(fit.predicted_labels, truth);
        for &c in &fit.competence {
            prop_assert!(c > 0.7, "competence {} should be > 0.7", c);
        }
    }
}
