//! MACE: Multi-Annotator Competence Estimation
//!
//! Variational-Bayes EM that jointly infers the true label of every instance
//! and how trustworthy each annotator is.
//!
//! Generative story per vote:
//! - Annotator j either *knows* the answer (probability p_know) and emits the
//!   true label, or *guesses* and emits a label drawn from its own
//!   distribution θ_j
//! - p_know ~ Beta(α, α), θ_j ~ Dirichlet(β)
//!
//! Inference:
//! - E-step combines both hypotheses with expected-log parameters
//!   (ψ(count) - ψ(sum)) and normalizes per instance
//! - M-step re-accumulates pseudo-counts from the posterior marginals
//! - Several random restarts; the one with the best log-likelihood wins

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::sanitize::{
    argmax, clip_probability, digamma, fill_uniform, log_sum_exp2, safe_ln,
    sanitize_distribution, softmax_in_place,
};
use crate::types::{
    AnnotationMatrix, MaceError, MaceFit, MaceOptions, RestartOutcome, VariationalParameters,
    EPSILON,
};

// ==================== Sparse View ====================

/// Observations indexed both ways so neither step scans missing cells
struct Observations {
    num_labels: usize,
    /// (annotator, label) per instance
    by_instance: Vec<Vec<(usize, usize)>>,
    /// (instance, label) per annotator
    by_annotator: Vec<Vec<(usize, usize)>>,
}

impl Observations {
    fn from_matrix(matrix: &AnnotationMatrix) -> Self {
        let mut by_instance = vec![Vec::new(); matrix.num_instances()];
        let mut by_annotator = vec![Vec::new(); matrix.num_annotators()];

        for i in 0..matrix.num_instances() {
            for j in 0..matrix.num_annotators() {
                if let Some(label) = matrix.get(i, j) {
                    by_instance[i].push((j, label));
                    by_annotator[j].push((i, label));
                }
            }
        }

        Self {
            num_labels: matrix.num_labels(),
            by_instance,
            by_annotator,
        }
    }

    fn num_instances(&self) -> usize {
        self.by_instance.len()
    }

    fn num_annotators(&self) -> usize {
        self.by_annotator.len()
    }
}

/// Expected log parameters for one annotator
struct ExpectedLogs {
    know: f64,
    guess: f64,
    theta: Vec<f64>,
}

impl ExpectedLogs {
    fn from_counts(spamming: &[f64; 2], theta: &[f64]) -> Self {
        let spam_total = digamma(spamming[0] + spamming[1]);
        let theta_total = digamma(theta.iter().sum());
        Self {
            know: digamma(spamming[0]) - spam_total,
            guess: digamma(spamming[1]) - spam_total,
            theta: theta.iter().map(|&t| digamma(t) - theta_total).collect(),
        }
    }
}

// ==================== Engine ====================

/// MACE engine
///
/// Stateless between fits: all variational state lives inside a restart.
#[derive(Clone, Debug, Default)]
pub struct Mace {
    options: MaceOptions,
}

impl Mace {
    pub fn new(options: MaceOptions) -> Self {
        let options = MaceOptions {
            num_restarts: options.num_restarts.max(1),
            alpha: options.alpha.max(EPSILON),
            beta: options.beta.max(EPSILON),
            ..options
        };
        Self { options }
    }

    pub fn options(&self) -> &MaceOptions {
        &self.options
    }

    /// Fit the model and keep the restart with the highest log-likelihood
    pub fn fit(&self, matrix: &AnnotationMatrix) -> Result<MaceFit, MaceError> {
        matrix.validate()?;
        let observations = Observations::from_matrix(matrix);

        let seeds: Vec<u64> = (0..self.options.num_restarts as u64)
            .map(|r| self.options.seed.wrapping_add(r))
            .collect();

        let outcomes: Vec<RestartOutcome> = if self.options.parallel {
            seeds
                .par_iter()
                .map(|&seed| self.restart(&observations, seed))
                .collect()
        } else {
            seeds
                .iter()
                .map(|&seed| self.restart(&observations, seed))
                .collect()
        };

        let mut best_idx = 0;
        let mut best_ll = f64::NEG_INFINITY;
        for (idx, outcome) in outcomes.iter().enumerate() {
            let ll = if outcome.log_likelihood.is_finite() {
                outcome.log_likelihood
            } else {
                f64::NEG_INFINITY
            };
            if ll > best_ll {
                best_ll = ll;
                best_idx = idx;
            }
        }

        let best = outcomes
            .into_iter()
            .nth(best_idx)
            .ok_or(MaceError::NoInstances)?;

        let predicted_labels = best.marginals.iter().map(|row| argmax(row)).collect();
        let competence = best
            .params
            .spamming
            .iter()
            .map(competence_from_counts)
            .collect();

        Ok(MaceFit {
            predicted_labels,
            competence,
            marginals: best.marginals,
            log_likelihood: if best_ll.is_finite() { best_ll } else { f64::MIN },
            best_restart: best_idx,
        })
    }

    /// One independent restart from `seed`; no state is shared between restarts
    pub fn run_one_restart(
        &self,
        matrix: &AnnotationMatrix,
        seed: u64,
    ) -> Result<RestartOutcome, MaceError> {
        matrix.validate()?;
        Ok(self.restart(&Observations::from_matrix(matrix), seed))
    }

    fn restart(&self, obs: &Observations, seed: u64) -> RestartOutcome {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut params = self.initialize(obs, &mut rng);
        let mut marginals = vec![vec![0.0; obs.num_labels]; obs.num_instances()];

        for _ in 0..self.options.num_iters {
            e_step(obs, &params, &mut marginals);
            params = self.m_step(obs, &marginals);
        }
        // Marginals consistent with the final parameters
        e_step(obs, &params, &mut marginals);

        let log_likelihood = log_likelihood(obs, &params, &marginals);
        RestartOutcome {
            marginals,
            params,
            log_likelihood,
        }
    }

    fn initialize(&self, obs: &Observations, rng: &mut ChaCha8Rng) -> VariationalParameters {
        let alpha = self.options.alpha;
        let beta = self.options.beta;
        let mut spamming = Vec::with_capacity(obs.num_annotators());
        let mut theta = Vec::with_capacity(obs.num_annotators());

        for _ in 0..obs.num_annotators() {
            spamming.push([alpha + rng.gen::<f64>(), alpha + rng.gen::<f64>()]);
            theta.push(
                (0..obs.num_labels)
                    .map(|_| beta + rng.gen::<f64>())
                    .collect(),
            );
        }

        VariationalParameters { spamming, theta }
    }

    /// Re-accumulate pseudo-counts from the marginals.
    ///
    /// Annotators without observations keep prior-only counts.
    fn m_step(&self, obs: &Observations, marginals: &[Vec<f64>]) -> VariationalParameters {
        let alpha = self.options.alpha;
        let beta = self.options.beta;
        let mut spamming = Vec::with_capacity(obs.num_annotators());
        let mut theta = Vec::with_capacity(obs.num_annotators());

        for votes in &obs.by_annotator {
            let mut know = alpha;
            let mut guess = alpha;
            let mut guess_counts = vec![beta; obs.num_labels];

            for &(instance, label) in votes {
                let agreed = marginals[instance][label];
                know += agreed;
                guess += 1.0 - agreed;
                guess_counts[label] += 1.0 - agreed;
            }

            spamming.push([know.max(EPSILON), guess.max(EPSILON)]);
            guess_counts.iter_mut().for_each(|c| *c = c.max(EPSILON));
            theta.push(guess_counts);
        }

        VariationalParameters { spamming, theta }
    }
}

/// Posterior over the true label of every instance given current parameters
fn e_step(obs: &Observations, params: &VariationalParameters, marginals: &mut [Vec<f64>]) {
    let expected: Vec<ExpectedLogs> = params
        .spamming
        .iter()
        .zip(&params.theta)
        .map(|(s, t)| ExpectedLogs::from_counts(s, t))
        .collect();

    for (row, votes) in marginals.iter_mut().zip(&obs.by_instance) {
        if votes.is_empty() {
            fill_uniform(row);
            continue;
        }

        row.iter_mut().for_each(|v| *v = 0.0);
        for &(annotator, label) in votes {
            let e = &expected[annotator];
            let guessed = e.guess + e.theta[label];
            let knew_or_guessed = log_sum_exp2(e.know, guessed);
            for (t, score) in row.iter_mut().enumerate() {
                *score += if t == label { knew_or_guessed } else { guessed };
            }
        }

        softmax_in_place(row);
        sanitize_distribution(row);
    }
}

/// Expected log-likelihood of the votes under normalized point estimates
fn log_likelihood(obs: &Observations, params: &VariationalParameters, marginals: &[Vec<f64>]) -> f64 {
    let p_know: Vec<f64> = params.spamming.iter().map(competence_from_counts).collect();
    let theta_hat: Vec<Vec<f64>> = params
        .theta
        .iter()
        .map(|counts| {
            let total: f64 = counts.iter().sum::<f64>().max(EPSILON);
            counts.iter().map(|c| c / total).collect()
        })
        .collect();

    let mut ll = 0.0;
    for (row, votes) in marginals.iter().zip(&obs.by_instance) {
        for (t, &weight) in row.iter().enumerate() {
            if weight <= 0.0 {
                continue;
            }
            let mut per_label = 0.0;
            for &(annotator, label) in votes {
                let knew = if t == label { p_know[annotator] } else { 0.0 };
                let guessed = (1.0 - p_know[annotator]) * theta_hat[annotator][label];
                per_label += safe_ln(knew + guessed);
            }
            ll += weight * per_label;
        }
    }
    ll
}

fn competence_from_counts(spamming: &[f64; 2]) -> f64 {
    let total = spamming[0] + spamming[1];
    if total > 0.0 && total.is_finite() {
        (spamming[0] / total).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

/// Shannon entropy (nats) of each marginal row, probabilities clipped to [ε, 1]
pub fn entropy(marginals: &[Vec<f64>]) -> Vec<f64> {
    marginals
        .iter()
        .map(|row| {
            row.iter()
                .map(|&p| {
                    let p = clip_probability(p);
                    -p * p.ln()
                })
                .sum::<f64>()
                .max(0.0)
        })
        .collect()
}

// ==================== Tests ====================
